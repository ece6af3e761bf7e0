//! Slack Web API access.
//!
//! The pipeline only talks to Slack through the [`SlackApi`] trait, so the
//! HTTP client can be swapped for an in-memory fake in tests.

mod client;
pub mod memory;
pub mod models;
pub mod rate_control;

use async_trait::async_trait;
use thiserror::Error;

pub use client::HttpSlackClient;
pub use memory::InMemorySlack;
pub use models::{Channel, CursorPage, HistoryPage, Message, Reaction, User, UserProfile};
pub use rate_control::{RateLimitedCaller, Sleeper, TokioSleeper};

/// Outcome of a single failed API call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The server rejected the call and advised waiting before retrying.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("{0}")]
    Remote(String),
}

/// Parameters for one `conversations.history` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub channel: String,
    pub limit: usize,
    pub cursor: Option<String>,
    /// Upper time bound (epoch seconds) forwarded as `latest`.
    pub latest: Option<String>,
}

/// The subset of the Slack Web API the statistics pipeline needs.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Fetch one page of channel history, newest first.
    async fn history(&self, request: &HistoryRequest) -> Result<HistoryPage, ApiError>;

    /// Fetch up to `limit` messages of the thread rooted at `thread_ts`.
    async fn replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError>;

    /// List one page of public channels.
    async fn channels(&self, cursor: Option<&str>) -> Result<CursorPage<Channel>, ApiError>;

    /// List one page of workspace members.
    async fn users(&self, cursor: Option<&str>) -> Result<CursorPage<User>, ApiError>;
}
