//! Shared fixtures: a fake Notion API and scripted message sources.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use serde_json::Value;
use tokio::net::TcpListener;

use recruiter_sync::config::NotionConfig;
use recruiter_sync::error::SourceError;
use recruiter_sync::source::{FetchScope, MessageSource, RawMessage};

pub const OWNER: &str = "me@gmail.com";

/// What the fake Notion server has seen.
#[derive(Clone, Default)]
pub struct FakeNotion {
    pub pages: Arc<Mutex<Vec<Value>>>,
    pub auth_headers: Arc<Mutex<Vec<String>>>,
    pub version_headers: Arc<Mutex<Vec<String>>>,
    /// Answer page creation with HTTP 500 while set.
    pub failing: Arc<AtomicBool>,
}

impl FakeNotion {
    pub fn page_count(&self) -> usize {
        self.pages.lock().unwrap().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

async fn create_page(
    State(fake): State<FakeNotion>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    fake.auth_headers.lock().unwrap().push(header("authorization"));
    fake.version_headers.lock().unwrap().push(header("notion-version"));

    if fake.failing.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "object": "error", "message": "boom" })),
        );
    }

    let mut pages = fake.pages.lock().unwrap();
    pages.push(body);
    let id = format!("page-{}", pages.len());
    (StatusCode::OK, Json(serde_json::json!({ "object": "page", "id": id })))
}

async fn users_me() -> impl IntoResponse {
    Json(serde_json::json!({ "object": "user", "name": "integration" }))
}

/// Start a fake Notion API on a random port, return (config, recorder).
pub async fn start_fake_notion() -> (NotionConfig, FakeNotion) {
    let fake = FakeNotion::default();
    let app = Router::new()
        .route("/v1/pages", post(create_page))
        .route("/v1/users/me", get(users_me))
        .with_state(fake.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let config = NotionConfig {
        api_key: SecretString::from("secret_integration".to_string()),
        database_id: "db-integration".into(),
        api_url: format!("http://127.0.0.1:{port}"),
    };
    (config, fake)
}

/// Source that returns the same scripted batch on every fetch.
pub struct ScriptedSource {
    pub key: String,
    pub messages: Mutex<Vec<RawMessage>>,
    pub fetches: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(messages: Vec<RawMessage>) -> Self {
        Self {
            key: "imap:me@gmail.com/Recruiters".into(),
            messages: Mutex::new(messages),
            fetches: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, message: RawMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    fn source_key(&self) -> String {
        self.key.clone()
    }

    async fn fetch(&self, _scope: &FetchScope) -> Result<Vec<RawMessage>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.messages.lock().unwrap().clone())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn message(id: &str, sender: &str, subject: &str, body: &str) -> RawMessage {
    RawMessage {
        message_id: id.into(),
        sender: sender.into(),
        subject: subject.into(),
        body_text: body.into(),
        body_html: String::new(),
        received_at: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
        in_reply_to: String::new(),
        references: String::new(),
        thread_topic: String::new(),
    }
}
