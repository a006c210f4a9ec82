//! PostgREST-backed message store (`/rest/v1`).

use async_trait::async_trait;
use dailychat_common::{ChatError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use crate::message::{Message, MessagePatch, NewMessage, PageQuery, UserProfile};

use super::MessageStore;

/// Columns fetched for the feed, including the sender's display name.
const MESSAGE_SELECT: &str = "*,users!messages_send_by_fkey(display_name)";

/// Message store talking to a Supabase project's REST endpoint.
pub struct RestStore {
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    messages_table: String,
    users_table: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("messages_table", &self.messages_table)
            .finish()
    }
}

impl RestStore {
    pub fn new(project_url: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ChatError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: project_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
            messages_table: "messages".to_string(),
            users_table: "users".to_string(),
            http,
        })
    }

    /// Act as a signed-in user instead of the anonymous role.
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    pub fn with_messages_table(mut self, table: &str) -> Self {
        self.messages_table = table.to_string();
        self
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| ChatError::Transport(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {bearer}"))
                .map_err(|e| ChatError::Transport(format!("invalid authorization header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));
        Ok(headers)
    }
}

/// Query-string parameters for a page of one room.
pub(crate) fn page_params(room: Option<&str>, query: &PageQuery) -> Vec<(String, String)> {
    let mut params = vec![
        ("select".to_string(), MESSAGE_SELECT.to_string()),
        (
            "order".to_string(),
            format!("created_at.{}", query.order.as_str()),
        ),
        ("limit".to_string(), query.limit.to_string()),
    ];
    params.push(match room {
        Some(room) => ("room_name".to_string(), format!("eq.{room}")),
        None => ("room_name".to_string(), "is.null".to_string()),
    });
    if let Some(before) = query.before {
        params.push((
            "created_at".to_string(),
            format!("lt.{}", before.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
        ));
    }
    params
}

/// Pull PostgREST's `message` out of an error body, else return the body.
pub(crate) fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {}", body.trim())
            }
        })
}

async fn check(resp: reqwest::Response) -> std::result::Result<reqwest::Response, String> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(error_message(status, &body))
}

#[async_trait]
impl MessageStore for RestStore {
    async fn query_messages(&self, room: Option<&str>, query: &PageQuery) -> Result<Vec<Message>> {
        let resp = self
            .http
            .get(self.endpoint(&self.messages_table))
            .headers(self.headers()?)
            .query(&page_params(room, query))
            .send()
            .await
            .map_err(|e| ChatError::Query(e.to_string()))?;
        let resp = check(resp).await.map_err(ChatError::Query)?;
        let rows: Vec<Message> = resp
            .json()
            .await
            .map_err(|e| ChatError::Query(format!("malformed message rows: {e}")))?;
        debug!(room = ?room, rows = rows.len(), "Fetched messages");
        Ok(rows)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<()> {
        let resp = self
            .http
            .post(self.endpoint(&self.messages_table))
            .headers(self.headers()?)
            .json(&[message])
            .send()
            .await
            .map_err(|e| ChatError::MutationRejected(e.to_string()))?;
        check(resp).await.map_err(ChatError::MutationRejected)?;
        Ok(())
    }

    async fn update_message(&self, id: &str, patch: &MessagePatch) -> Result<()> {
        let resp = self
            .http
            .patch(self.endpoint(&self.messages_table))
            .headers(self.headers()?)
            .query(&[("id", format!("eq.{id}"))])
            .json(patch)
            .send()
            .await
            .map_err(|e| ChatError::MutationRejected(e.to_string()))?;
        check(resp).await.map_err(ChatError::MutationRejected)?;
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.endpoint(&self.messages_table))
            .headers(self.headers()?)
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .map_err(|e| ChatError::MutationRejected(e.to_string()))?;
        check(resp).await.map_err(ChatError::MutationRejected)?;
        Ok(())
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut headers = self.headers()?;
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=minimal"),
        );
        let resp = self
            .http
            .post(self.endpoint(&self.users_table))
            .headers(headers)
            .json(&[profile])
            .send()
            .await
            .map_err(|e| ChatError::MutationRejected(e.to_string()))?;
        check(resp).await.map_err(ChatError::MutationRejected)?;
        Ok(())
    }
}
