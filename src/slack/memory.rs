//! In-memory [`SlackApi`] backed by fixed channel contents.
//!
//! Serves history pages by offset cursor, replays scripted rate-limit
//! rejections, and records every request it sees. Test support for the
//! paginator, thread expansion, and collectors.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{ApiError, Channel, CursorPage, HistoryPage, HistoryRequest, Message, SlackApi, User};

#[derive(Debug)]
pub struct InMemorySlack {
    history: HashMap<String, Vec<Message>>,
    threads: HashMap<String, Vec<Message>>,
    channels: Vec<Channel>,
    users: Vec<User>,
    directory_page_size: usize,
    rate_limits: Mutex<VecDeque<u64>>,
    history_requests: Mutex<Vec<HistoryRequest>>,
    reply_requests: Mutex<Vec<(String, usize)>>,
}

impl Default for InMemorySlack {
    fn default() -> Self {
        Self {
            history: HashMap::new(),
            threads: HashMap::new(),
            channels: Vec::new(),
            users: Vec::new(),
            directory_page_size: 100,
            rate_limits: Mutex::new(VecDeque::new()),
            history_requests: Mutex::new(Vec::new()),
            reply_requests: Mutex::new(Vec::new()),
        }
    }
}

impl InMemorySlack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a channel's history. `messages` must be newest first.
    #[must_use]
    pub fn with_history(mut self, channel: &str, messages: Vec<Message>) -> Self {
        self.history.insert(channel.to_string(), messages);
        self
    }

    /// Set the replies returned for the thread rooted at `thread_ts`.
    #[must_use]
    pub fn with_thread(mut self, thread_ts: &str, replies: Vec<Message>) -> Self {
        self.threads.insert(thread_ts.to_string(), replies);
        self
    }

    #[must_use]
    pub fn with_channel(mut self, id: &str, name: &str) -> Self {
        self.channels.push(Channel {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: User) -> Self {
        self.users.push(user);
        self
    }

    #[must_use]
    pub fn with_directory_page_size(mut self, size: usize) -> Self {
        self.directory_page_size = size.max(1);
        self
    }

    /// Reject the next call with a rate limit advising `retry_after_secs`.
    /// Repeated calls queue further rejections.
    #[must_use]
    pub fn rate_limit_next(self, retry_after_secs: u64) -> Self {
        lock(&self.rate_limits).push_back(retry_after_secs);
        self
    }

    /// Every history request received, in order.
    #[must_use]
    pub fn history_requests(&self) -> Vec<HistoryRequest> {
        lock(&self.history_requests).clone()
    }

    /// Every `(thread_ts, limit)` replies request received, in order.
    #[must_use]
    pub fn reply_requests(&self) -> Vec<(String, usize)> {
        lock(&self.reply_requests).clone()
    }

    fn take_rate_limit(&self) -> Result<(), ApiError> {
        match lock(&self.rate_limits).pop_front() {
            Some(retry_after_secs) => Err(ApiError::RateLimited { retry_after_secs }),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_offset(cursor: Option<&str>) -> Result<usize, ApiError> {
    cursor.map_or(Ok(0), |c| {
        c.parse()
            .map_err(|_| ApiError::Remote("invalid_cursor".to_string()))
    })
}

fn page_of<T: Clone>(items: &[T], offset: usize, limit: usize) -> (Vec<T>, Option<String>) {
    let start = offset.min(items.len());
    let end = start.saturating_add(limit).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());
    (items[start..end].to_vec(), next)
}

#[async_trait]
impl SlackApi for InMemorySlack {
    async fn history(&self, request: &HistoryRequest) -> Result<HistoryPage, ApiError> {
        lock(&self.history_requests).push(request.clone());
        self.take_rate_limit()?;

        let messages = self
            .history
            .get(&request.channel)
            .ok_or_else(|| ApiError::Remote("channel_not_found".to_string()))?;
        let offset = parse_offset(request.cursor.as_deref())?;
        let (messages, next_cursor) = page_of(messages, offset, request.limit);

        Ok(HistoryPage {
            messages,
            has_more: next_cursor.is_some(),
            next_cursor,
        })
    }

    async fn replies(
        &self,
        _channel: &str,
        thread_ts: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        lock(&self.reply_requests).push((thread_ts.to_string(), limit));
        self.take_rate_limit()?;

        let replies = self
            .threads
            .get(thread_ts)
            .ok_or_else(|| ApiError::Remote("thread_not_found".to_string()))?;
        Ok(replies.iter().take(limit).cloned().collect())
    }

    async fn channels(&self, cursor: Option<&str>) -> Result<CursorPage<Channel>, ApiError> {
        self.take_rate_limit()?;
        let (items, next_cursor) =
            page_of(&self.channels, parse_offset(cursor)?, self.directory_page_size);
        Ok(CursorPage { items, next_cursor })
    }

    async fn users(&self, cursor: Option<&str>) -> Result<CursorPage<User>, ApiError> {
        self.take_rate_limit()?;
        let (items, next_cursor) =
            page_of(&self.users, parse_offset(cursor)?, self.directory_page_size);
        Ok(CursorPage { items, next_cursor })
    }
}
