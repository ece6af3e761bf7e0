//! Slack Web API payloads used by the statistics pipeline.
//!
//! Only the fields the pipeline depends on are modelled. Optional fields
//! that Slack omits (reactions, thread markers, the author on some bot and
//! system messages) deserialize to `None` rather than failing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single channel or thread message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message timestamp, also its identifier. Seconds since the epoch,
    /// encoded as a decimal string (e.g. `"1512085950.000200"`).
    pub ts: String,
    /// Author id. Absent for some system and bot messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<Reaction>>,
    /// Root timestamp of the thread this message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl Message {
    /// Parse the timestamp as fractional epoch seconds.
    #[must_use]
    pub fn epoch_secs(&self) -> Option<f64> {
        self.ts.parse().ok()
    }

    /// Timestamp as a UTC date-time, if it parses.
    #[must_use]
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.epoch_secs().and_then(epoch_to_datetime)
    }

    /// Find the named reaction on this message.
    #[must_use]
    pub fn reaction(&self, name: &str) -> Option<&Reaction> {
        self.reactions.as_deref()?.iter().find(|r| r.name == name)
    }

    #[must_use]
    pub fn has_reaction(&self, name: &str) -> bool {
        self.reaction(name).is_some()
    }
}

/// An emoji reaction attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub name: String,
    #[serde(default)]
    pub count: u64,
}

/// One page of channel history, newest message first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub has_more: bool,
    /// Continuation cursor. Present only when `has_more` is set.
    pub next_cursor: Option<String>,
}

/// A page of directory entries plus the cursor to the next page.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Common `ok`/`error` envelope every Web API response carries.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

impl From<HistoryResponse> for HistoryPage {
    fn from(resp: HistoryResponse) -> Self {
        let next_cursor = if resp.has_more {
            non_empty_cursor(resp.response_metadata)
        } else {
            None
        };
        Self {
            messages: resp.messages,
            has_more: resp.has_more,
            next_cursor,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepliesResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelsResponse {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UsersResponse {
    #[serde(default)]
    pub members: Vec<User>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

pub(crate) fn non_empty_cursor(meta: Option<ResponseMetadata>) -> Option<String> {
    meta.map(|m| m.next_cursor).filter(|c| !c.is_empty())
}

/// Convert fractional epoch seconds into a UTC date-time.
#[must_use]
pub fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}
