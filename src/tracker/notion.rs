//! Notion tracking store — creates one database page per contact.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::config::NotionConfig;
use crate::error::TrackerError;
use crate::pipeline::types::ParsedContact;
use crate::tracker::TrackingStore;

const NOTION_VERSION: &str = "2022-06-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TRACKER_NAME: &str = "notion";

/// Notion REST client bound to one database.
pub struct NotionClient {
    api_key: SecretString,
    database_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl NotionClient {
    pub fn new(config: &NotionConfig) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| request_failed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            database_id: config.database_id.clone(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.api_url(path))
            .bearer_auth(self.api_key.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
    }

    /// Create the page and return its id.
    pub async fn create_page(&self, contact: &ParsedContact) -> Result<String, TrackerError> {
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": page_properties(contact),
        });

        let resp = self
            .request(reqwest::Method::POST, "pages")
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TrackerError::Api {
                tracker: TRACKER_NAME.into(),
                status: status.as_u16(),
                body,
            });
        }

        let page: Value = resp.json().await.map_err(|e| TrackerError::InvalidResponse {
            tracker: TRACKER_NAME.into(),
            reason: e.to_string(),
        })?;

        page.get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| TrackerError::InvalidResponse {
                tracker: TRACKER_NAME.into(),
                reason: "page response has no id".into(),
            })
    }
}

#[async_trait]
impl TrackingStore for NotionClient {
    fn name(&self) -> &str {
        TRACKER_NAME
    }

    async fn create(&self, contact: &ParsedContact) -> Option<String> {
        match self.create_page(contact).await {
            Ok(page_id) => {
                info!(
                    page_id = %page_id,
                    recruiter = %contact.recruiter_name,
                    company = %contact.company,
                    "Created Notion entry"
                );
                Some(page_id)
            }
            Err(e) => {
                error!(
                    recruiter = %contact.recruiter_name,
                    company = %contact.company,
                    error = %e,
                    "Failed to create Notion entry"
                );
                None
            }
        }
    }

    async fn health_check(&self) -> Result<(), TrackerError> {
        let resp = self
            .request(reqwest::Method::GET, "users/me")
            .send()
            .await
            .map_err(|e| request_failed(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TrackerError::Api {
                tracker: TRACKER_NAME.into(),
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }
}

fn request_failed(reason: String) -> TrackerError {
    TrackerError::RequestFailed {
        tracker: TRACKER_NAME.into(),
        reason,
    }
}

fn rich_text(content: &str) -> Value {
    json!({ "rich_text": [{ "text": { "content": content } }] })
}

/// Database page properties for a contact.
pub fn page_properties(contact: &ParsedContact) -> Value {
    json!({
        "Recruiter Name": { "title": [{ "text": { "content": contact.recruiter_name } }] },
        "Company": rich_text(&contact.company),
        "Position": rich_text(&contact.position),
        "Location": rich_text(&contact.location),
        "Status": { "select": { "name": contact.status.as_str() } },
        "Email": { "email": contact.recruiter_email },
        "Date Received": {
            "date": { "start": contact.date_received.format("%Y-%m-%d").to_string() }
        },
    })
}
