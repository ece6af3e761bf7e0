use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace};

use super::models::{
    non_empty_cursor, Channel, ChannelsResponse, CursorPage, Envelope, HistoryPage,
    HistoryResponse, Message, RepliesResponse, User, UsersResponse,
};
use super::{ApiError, HistoryRequest, SlackApi};
use crate::constants::{DEFAULT_RETRY_AFTER_SECS, USER_AGENT};

/// Page size used for directory listings.
const DIRECTORY_PAGE_SIZE: usize = 200;

/// Slack Web API client over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpSlackClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpSlackClient {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}/{method}", self.base_url);
        trace!(method, ?query, "Calling Slack API");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| ApiError::Remote(format!("{method}: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited {
                retry_after_secs: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Remote(format!(
                "{method} failed with status {status}"
            )));
        }

        let retry_after_secs = retry_after(response.headers());
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::Remote(format!("{method}: invalid response body: {e}")))?;

        let envelope = Envelope::deserialize(&body)
            .map_err(|e| ApiError::Remote(format!("{method}: malformed envelope: {e}")))?;
        if !envelope.ok {
            let error = envelope.error.unwrap_or_else(|| "unknown_error".to_string());
            if error == "ratelimited" {
                return Err(ApiError::RateLimited { retry_after_secs });
            }
            return Err(ApiError::Remote(format!("{method}: {error}")));
        }

        serde_json::from_value(body)
            .map_err(|e| ApiError::Remote(format!("{method}: unexpected payload: {e}")))
    }
}

#[async_trait]
impl SlackApi for HttpSlackClient {
    async fn history(&self, request: &HistoryRequest) -> Result<HistoryPage, ApiError> {
        let mut query = vec![
            ("channel", request.channel.clone()),
            ("limit", request.limit.to_string()),
        ];
        if let Some(cursor) = &request.cursor {
            query.push(("cursor", cursor.clone()));
        }
        if let Some(latest) = &request.latest {
            query.push(("latest", latest.clone()));
        }

        let resp: HistoryResponse = self.call("conversations.history", &query).await?;
        debug!(
            channel = %request.channel,
            messages = resp.messages.len(),
            has_more = resp.has_more,
            "Fetched history page"
        );
        Ok(resp.into())
    }

    async fn replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        let query = [
            ("channel", channel.to_string()),
            ("ts", thread_ts.to_string()),
            ("limit", limit.to_string()),
        ];
        let resp: RepliesResponse = self.call("conversations.replies", &query).await?;
        debug!(channel, thread_ts, replies = resp.messages.len(), "Fetched thread");
        Ok(resp.messages)
    }

    async fn channels(&self, cursor: Option<&str>) -> Result<CursorPage<Channel>, ApiError> {
        let query = directory_query(cursor);
        let resp: ChannelsResponse = self.call("conversations.list", &query).await?;
        Ok(CursorPage {
            items: resp.channels,
            next_cursor: non_empty_cursor(resp.response_metadata),
        })
    }

    async fn users(&self, cursor: Option<&str>) -> Result<CursorPage<User>, ApiError> {
        let query = directory_query(cursor);
        let resp: UsersResponse = self.call("users.list", &query).await?;
        Ok(CursorPage {
            items: resp.members,
            next_cursor: non_empty_cursor(resp.response_metadata),
        })
    }
}

fn directory_query(cursor: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", DIRECTORY_PAGE_SIZE.to_string())];
    if let Some(cursor) = cursor {
        query.push(("cursor", cursor.to_string()));
    }
    query
}

/// Read the advised wait from a `Retry-After` header, in whole seconds.
fn retry_after(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}
