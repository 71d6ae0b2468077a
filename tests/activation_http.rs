//! Integration tests for the activation endpoint.
//!
//! Each test serves the real routes on a random port and follows the
//! emailed link with an HTTP client that does not chase redirects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::timeout;

use birthday_bot::activation::{ActivationRouteState, activation_routes};
use birthday_bot::auth::{AccountService, AuthService};
use birthday_bot::error::NotifyError;
use birthday_bot::models::{ChannelIdentity, Organization, Person};
use birthday_bot::notify::Notifier;
use birthday_bot::store::LibSqlBackend;

/// Maximum time any request may take before the test counts as hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const REDIRECT: &str = "https://t.me/GPMHappyBBot";

/// Keeps every email instead of sending it.
#[derive(Default)]
struct Outbox {
    bodies: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for Outbox {
    async fn send_email(&self, _to: &str, _subject: &str, body: &str) -> Result<(), NotifyError> {
        self.bodies.lock().await.push(body.to_string());
        Ok(())
    }
}

struct Server {
    base: String,
    auth: Arc<AuthService>,
    outbox: Arc<Outbox>,
    client: reqwest::Client,
}

async fn start_server() -> Server {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let outbox = Arc::new(Outbox::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let auth = Arc::new(AuthService::new(store, outbox.clone(), base.clone(), REDIRECT));
    let app = activation_routes(ActivationRouteState { auth: auth.clone() });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    Server {
        base,
        auth,
        outbox,
        client,
    }
}

impl Server {
    async fn get(&self, url: &str) -> reqwest::Response {
        timeout(TEST_TIMEOUT, self.client.get(url).send())
            .await
            .expect("request timed out")
            .expect("request failed")
    }

    /// Register Jane and return the link from her activation email.
    async fn register(&self, identity: &ChannelIdentity) -> String {
        let person = Person {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            patronymic: String::new(),
            birth_date: NaiveDate::from_ymd_opt(1990, 3, 14).unwrap(),
            email: "jane@gazprom-media.ru".into(),
        };
        let org = Organization {
            id: 0,
            name: "Gazprom Media".into(),
            city: "Moscow".into(),
            office: "Main Office".into(),
            department: "Go Dev".into(),
        };
        self.auth
            .register_new_user(&person, identity, &org)
            .await
            .unwrap();

        let bodies = self.outbox.bodies.lock().await;
        bodies[0]
            .lines()
            .find(|l| l.starts_with(&self.base))
            .expect("activation link in email")
            .to_string()
    }
}

#[tokio::test]
async fn activation_link_redirects_and_activates() {
    let server = start_server().await;
    let me = ChannelIdentity::new("telegram", 11, 22);
    let link = server.register(&me).await;
    assert!(!server.auth.is_activated(&me).await.unwrap());

    let resp = server.get(&link).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()["location"], REDIRECT);
    assert!(server.auth.is_activated(&me).await.unwrap());
}

#[tokio::test]
async fn replayed_link_is_rejected() {
    let server = start_server().await;
    let me = ChannelIdentity::new("telegram", 11, 22);
    let link = server.register(&me).await;
    assert_eq!(server.get(&link).await.status(), StatusCode::SEE_OTHER);

    let resp = server.get(&link).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("token"));
    assert!(server.auth.is_activated(&me).await.unwrap());
}

#[tokio::test]
async fn link_for_another_identity_is_rejected() {
    let server = start_server().await;
    let me = ChannelIdentity::new("telegram", 11, 22);
    let link = server.register(&me).await;

    let mut forged = Url::parse(&link).unwrap();
    let pairs: Vec<(String, String)> = forged
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "mid" { "12".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    forged.query_pairs_mut().clear().extend_pairs(pairs);

    let resp = server.get(forged.as_str()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(!server.auth.is_activated(&me).await.unwrap());
}

#[tokio::test]
async fn malformed_query_is_bad_request() {
    let server = start_server().await;

    for query in [
        "",
        "?token=abc&mtype=telegram&mid=x&chatid=1&redirect=https://t.me/x",
        "?token=abc&mtype=telegram&mid=1&chatid=1",
        "?token=abc&mtype=telegram&mid=1&chatid=1&redirect=ftp://t.me/x",
    ] {
        let resp = server.get(&format!("{}/v1/auth{query}", server.base)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "query {query:?}");
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let server = start_server().await;

    let resp = server.get(&format!("{}/health", server.base)).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
