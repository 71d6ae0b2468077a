//! Directory gateway — resolves a work email to an employee record.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::error::DirectoryError;
use crate::models::DirectoryRecord;

/// Looks employees up by email.
///
/// Callers treat every error the same way: the email cannot be resolved.
#[async_trait]
pub trait DirectoryGateway: Send + Sync {
    async fn employee(&self, email: &str) -> Result<DirectoryRecord, DirectoryError>;
}

/// Directory gateway backed by the HTTP employee service
/// (`GET {base_url}{email}` returning a JSON record).
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpDirectory {
    pub fn new(base_url: &str) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DirectoryError::Request(format!("invalid base URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::Request(format!(
                "base URL cannot carry a path: {base_url}"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DirectoryError::Request(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    /// Append the email as the last (percent-encoded) path segment.
    fn employee_url(&self, email: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(email);
        }
        url
    }
}

#[async_trait]
impl DirectoryGateway for HttpDirectory {
    async fn employee(&self, email: &str) -> Result<DirectoryRecord, DirectoryError> {
        let url = self.employee_url(email);
        tracing::debug!(%url, "Directory lookup");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound {
                email: email.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DirectoryError::Request(format!(
                "directory returned {status}"
            )));
        }

        resp.json::<DirectoryRecord>()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))
    }
}
