//! HTTP endpoint behind the emailed activation link.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use reqwest::Url;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::auth::AuthService;
use crate::error::AuthError;
use crate::models::ChannelIdentity;

/// Shared state for activation routes.
#[derive(Clone)]
pub struct ActivationRouteState {
    pub auth: Arc<AuthService>,
}

/// Query of `GET /v1/auth`. Everything is optional here so that missing
/// values produce our own 400 body.
#[derive(Debug, Deserialize)]
pub struct ActivationParams {
    token: Option<String>,
    mtype: Option<String>,
    mid: Option<String>,
    chatid: Option<String>,
    redirect: Option<String>,
}

/// Validated activation request.
#[derive(Debug)]
struct ActivationRequest {
    identity: ChannelIdentity,
    token: String,
    redirect: Url,
}

impl ActivationParams {
    fn validate(self) -> Result<ActivationRequest, String> {
        let token = non_empty(self.token, "token")?;
        let channel = non_empty(self.mtype, "mtype")?;
        let user_id = parse_id(self.mid, "mid")?;
        let chat_id = parse_id(self.chatid, "chatid")?;
        let raw_redirect = non_empty(self.redirect, "redirect")?;
        let redirect = Url::parse(&raw_redirect)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| format!("invalid redirect: {raw_redirect}"))?;

        Ok(ActivationRequest {
            identity: ChannelIdentity::new(channel, user_id, chat_id),
            token,
            redirect,
        })
    }
}

fn non_empty(value: Option<String>, name: &str) -> Result<String, String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(format!("missing parameter: {name}")),
    }
}

fn parse_id(value: Option<String>, name: &str) -> Result<i64, String> {
    let raw = non_empty(value, name)?;
    raw.parse()
        .map_err(|_| format!("invalid {name}: {raw}"))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// GET /v1/auth
///
/// Consumes the token and redirects (303) to `redirect`. 400 for bad
/// parameters or a rejected token, 500 when storage fails.
async fn activate(
    State(state): State<ActivationRouteState>,
    Query(params): Query<ActivationParams>,
) -> Response {
    let req = match params.validate() {
        Ok(req) => req,
        Err(message) => {
            tracing::debug!(%message, "Rejected activation request");
            return error_response(StatusCode::BAD_REQUEST, message);
        }
    };

    match state.auth.activate_account(&req.identity, &req.token).await {
        Ok(()) => Redirect::to(req.redirect.as_str()).into_response(),
        Err(AuthError::InvalidToken) => {
            error_response(StatusCode::BAD_REQUEST, "invalid or already used token")
        }
        Err(e) => {
            tracing::error!(error = %e, "Activation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "activation failed")
        }
    }
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the activation HTTP routes.
pub fn activation_routes(state: ActivationRouteState) -> Router {
    Router::new()
        .route("/v1/auth", get(activate))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
