//! Bounded backward traversal of a channel's history.
//!
//! Pages come back newest first. Traversal stops at whichever comes first:
//! the message budget is spent, the API reports no more pages, or a message
//! older than the start date is reached. The last two can happen mid-page.

use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{debug, info};

use crate::constants::{DATE_FORMAT, HISTORY_PAGE_SIZE};
use crate::error::{Result, StatsError};
use crate::slack::models::epoch_to_datetime;
use crate::slack::{HistoryRequest, Message, RateLimitedCaller, SlackApi};

/// Parse a `DD-MM-YYYY` date.
///
/// # Errors
///
/// Returns [`StatsError::InvalidDate`] if `value` is not in that format.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| StatsError::InvalidDate {
        value: value.to_string(),
        source: e,
    })
}

/// Epoch seconds of midnight UTC at the start of `date`.
#[must_use]
pub fn day_start_epoch(date: NaiveDate) -> f64 {
    date.and_hms_opt(0, 0, 0)
        .map_or(0.0, |dt| dt.and_utc().timestamp() as f64)
}

/// Epoch seconds of midnight UTC at the end of `date`, used as an
/// inclusive upper bound.
#[must_use]
pub fn day_end_epoch(date: NaiveDate) -> f64 {
    date.checked_add_days(Days::new(1))
        .map_or(f64::MAX, day_start_epoch)
}

/// How far a traversal got.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraversalSummary {
    /// Messages examined, including the one that tripped the date cutoff.
    pub scanned: usize,
    /// Timestamp of the last message examined, or the current time when the
    /// channel yielded nothing.
    pub boundary: DateTime<Utc>,
}

/// Walks a channel's history one page at a time.
pub struct HistoryPaginator<'a> {
    api: &'a dyn SlackApi,
    caller: &'a RateLimitedCaller,
    channel: String,
    oldest: f64,
    latest: Option<String>,
    max_messages: usize,
    page_size: usize,
    cursor: Option<String>,
    scanned: usize,
    boundary: Option<f64>,
    done: bool,
}

impl<'a> HistoryPaginator<'a> {
    /// Traverse `channel` back to `oldest` (epoch seconds), examining at most
    /// `max_messages` messages.
    #[must_use]
    pub fn new(
        api: &'a dyn SlackApi,
        caller: &'a RateLimitedCaller,
        channel: &str,
        oldest: f64,
        max_messages: usize,
    ) -> Self {
        Self {
            api,
            caller,
            channel: channel.to_string(),
            oldest,
            latest: None,
            max_messages,
            page_size: HISTORY_PAGE_SIZE,
            cursor: None,
            scanned: 0,
            boundary: None,
            done: false,
        }
    }

    /// Only fetch messages posted before `latest` (epoch seconds).
    #[must_use]
    pub fn with_latest(mut self, latest: f64) -> Self {
        self.latest = Some(format!("{latest:.6}"));
        self
    }

    /// Override the per-request page size (clamped to 1..=500).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, HISTORY_PAGE_SIZE);
        self
    }

    /// Fetch the next page of in-range messages.
    ///
    /// Returns `Ok(None)` once traversal has finished. A returned page may be
    /// shorter than what the API sent if the budget or date cutoff was hit
    /// partway through it.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails after the rate-limit retry.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Message>>> {
        if self.done || self.scanned >= self.max_messages {
            self.done = true;
            return Ok(None);
        }

        let request = HistoryRequest {
            channel: self.channel.clone(),
            limit: self.page_size.min(self.max_messages - self.scanned),
            cursor: self.cursor.take(),
            latest: self.latest.clone(),
        };
        let api = self.api;
        let page = self
            .caller
            .call("conversations.history", || api.history(&request))
            .await?;

        let mut in_range = Vec::with_capacity(page.messages.len());
        for message in page.messages {
            if self.scanned >= self.max_messages {
                debug!(max_messages = self.max_messages, "Message budget reached");
                self.done = true;
                break;
            }
            self.scanned += 1;

            let ts = message.epoch_secs();
            if ts.is_some() {
                self.boundary = ts;
            }
            if ts.is_some_and(|ts| ts < self.oldest) {
                debug!(ts = %message.ts, "Reached start date");
                self.done = true;
                break;
            }
            in_range.push(message);
        }

        match page.next_cursor {
            Some(cursor) if page.has_more && !self.done => self.cursor = Some(cursor),
            _ => self.done = true,
        }

        debug!(
            channel = %self.channel,
            yielded = in_range.len(),
            scanned = self.scanned,
            done = self.done,
            "History page processed"
        );
        Ok(Some(in_range))
    }

    /// Counters so far. Final once [`next_page`](Self::next_page) has
    /// returned `None`.
    #[must_use]
    pub fn summary(&self) -> TraversalSummary {
        TraversalSummary {
            scanned: self.scanned,
            boundary: self
                .boundary
                .and_then(epoch_to_datetime)
                .unwrap_or_else(Utc::now),
        }
    }

    /// Drain every page into one vector and log the traversal summary.
    ///
    /// # Errors
    ///
    /// Returns the first API error encountered.
    pub async fn collect_all(mut self) -> Result<(Vec<Message>, TraversalSummary)> {
        let mut messages = Vec::new();
        while let Some(page) = self.next_page().await? {
            messages.extend(page);
        }
        let summary = self.summary();
        info!(
            scanned = summary.scanned,
            boundary = %summary.boundary,
            "History traversal complete"
        );
        Ok((messages, summary))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::slack::InMemorySlack;

    fn msg(ts: u64) -> Message {
        Message {
            ts: format!("{ts}.000100"),
            user: Some("U1".to_string()),
            text: format!("message {ts}"),
            reactions: None,
            thread_ts: None,
        }
    }

    /// Newest-first messages with timestamps `newest, newest-1, ..., oldest`.
    fn history(newest: u64, oldest: u64) -> Vec<Message> {
        (oldest..=newest).rev().map(msg).collect()
    }

    async fn drain(paginator: &mut HistoryPaginator<'_>) -> Vec<Vec<Message>> {
        let mut pages = Vec::new();
        while let Some(page) = paginator.next_page().await.unwrap() {
            pages.push(page);
        }
        pages
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date("05-03-2024").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert!(matches!(
            parse_date("2024-03-05"),
            Err(StatsError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_day_bounds() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!((day_start_epoch(date) - 1_704_067_200.0).abs() < f64::EPSILON);
        assert!((day_end_epoch(date) - 1_704_153_600.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_walks_all_pages() {
        let api = InMemorySlack::new().with_history("C1", history(1000, 991));
        let caller = RateLimitedCaller::new();
        let mut paginator = HistoryPaginator::new(&api, &caller, "C1", 0.0, 100).with_page_size(4);

        let pages = drain(&mut paginator).await;
        let sizes: Vec<usize> = pages.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(paginator.summary().scanned, 10);

        let cursors: Vec<Option<String>> =
            api.history_requests().into_iter().map(|r| r.cursor).collect();
        assert_eq!(
            cursors,
            vec![None, Some("4".to_string()), Some("8".to_string())]
        );
    }

    #[tokio::test]
    async fn test_never_exceeds_budget() {
        for max in [0, 1, 3, 4, 5, 9, 10, 11, 50] {
            let api = InMemorySlack::new().with_history("C1", history(1000, 971));
            let caller = RateLimitedCaller::new();
            let mut paginator =
                HistoryPaginator::new(&api, &caller, "C1", 0.0, max).with_page_size(4);

            let yielded: usize = drain(&mut paginator).await.iter().map(Vec::len).sum();
            assert_eq!(yielded, max.min(30), "max_messages = {max}");
            assert!(paginator.summary().scanned <= max);
        }
    }

    /// Ignores the requested limit and always answers with a full page.
    struct OversizedPages {
        page: Vec<Message>,
    }

    #[async_trait::async_trait]
    impl SlackApi for OversizedPages {
        async fn history(
            &self,
            _request: &HistoryRequest,
        ) -> Result<crate::slack::HistoryPage, crate::slack::ApiError> {
            Ok(crate::slack::HistoryPage {
                messages: self.page.clone(),
                has_more: true,
                next_cursor: Some("next".to_string()),
            })
        }

        async fn replies(
            &self,
            _channel: &str,
            _thread_ts: &str,
            _limit: usize,
        ) -> Result<Vec<Message>, crate::slack::ApiError> {
            Ok(Vec::new())
        }

        async fn channels(
            &self,
            _cursor: Option<&str>,
        ) -> Result<crate::slack::CursorPage<crate::slack::Channel>, crate::slack::ApiError> {
            Ok(crate::slack::CursorPage {
                items: Vec::new(),
                next_cursor: None,
            })
        }

        async fn users(
            &self,
            _cursor: Option<&str>,
        ) -> Result<crate::slack::CursorPage<crate::slack::User>, crate::slack::ApiError> {
            Ok(crate::slack::CursorPage {
                items: Vec::new(),
                next_cursor: None,
            })
        }
    }

    #[tokio::test]
    async fn test_budget_holds_when_server_overfills_page() {
        let api = OversizedPages {
            page: history(1000, 991),
        };
        let caller = RateLimitedCaller::new();
        let mut paginator = HistoryPaginator::new(&api, &caller, "C1", 0.0, 4);

        let pages = drain(&mut paginator).await;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].len(), 4);
        assert_eq!(pages[0][3].ts, "997.000100");
        assert_eq!(paginator.summary().scanned, 4);
    }

    #[tokio::test]
    async fn test_requests_shrink_to_remaining_budget() {
        let api = InMemorySlack::new().with_history("C1", history(1000, 901));
        let caller = RateLimitedCaller::new();
        let paginator = HistoryPaginator::new(&api, &caller, "C1", 0.0, 7).with_page_size(5);

        let (messages, _) = paginator.collect_all().await.unwrap();
        assert_eq!(messages.len(), 7);
        let limits: Vec<usize> = api.history_requests().iter().map(|r| r.limit).collect();
        assert_eq!(limits, vec![5, 2]);
    }

    #[tokio::test]
    async fn test_stops_mid_page_at_start_date() {
        let api = InMemorySlack::new().with_history("C1", history(1000, 981));
        let caller = RateLimitedCaller::new();
        // 995.0001 onwards are in range; 994.0001 is the first older message.
        let mut paginator =
            HistoryPaginator::new(&api, &caller, "C1", 995.0, 100).with_page_size(4);

        let pages = drain(&mut paginator).await;
        let yielded: Vec<&Message> = pages.iter().flatten().collect();

        assert_eq!(yielded.len(), 6);
        assert!(yielded.iter().all(|m| m.epoch_secs().unwrap() >= 995.0));
        // Scanned includes the message that tripped the cutoff.
        assert_eq!(paginator.summary().scanned, 7);
        // No page past the cutoff page is requested.
        assert_eq!(api.history_requests().len(), 2);
        assert_eq!(
            paginator.summary().boundary,
            epoch_to_datetime(994.0001).unwrap()
        );
    }

    #[tokio::test]
    async fn test_cutoff_applies_to_first_page() {
        let api = InMemorySlack::new().with_history("C1", history(1000, 991));
        let caller = RateLimitedCaller::new();
        let paginator = HistoryPaginator::new(&api, &caller, "C1", 999.0, 100);

        let (messages, summary) = paginator.collect_all().await.unwrap();
        let ts: Vec<&str> = messages.iter().map(|m| m.ts.as_str()).collect();
        assert_eq!(ts, vec!["1000.000100", "999.000100"]);
        assert_eq!(summary.scanned, 3);
    }

    #[tokio::test]
    async fn test_empty_channel_boundary_falls_back_to_now() {
        let api = InMemorySlack::new().with_history("C1", Vec::new());
        let caller = RateLimitedCaller::new();
        let before = Utc::now();
        let paginator = HistoryPaginator::new(&api, &caller, "C1", 0.0, 100);

        let (messages, summary) = paginator.collect_all().await.unwrap();
        assert!(messages.is_empty());
        assert_eq!(summary.scanned, 0);
        assert!(summary.boundary >= before);
    }

    #[tokio::test]
    async fn test_latest_is_forwarded() {
        let api = InMemorySlack::new().with_history("C1", history(10, 1));
        let caller = RateLimitedCaller::new();
        let paginator =
            HistoryPaginator::new(&api, &caller, "C1", 0.0, 100).with_latest(1_704_153_600.0);

        paginator.collect_all().await.unwrap();
        assert_eq!(
            api.history_requests()[0].latest.as_deref(),
            Some("1704153600.000000")
        );
    }

    #[tokio::test]
    async fn test_rate_limited_page_is_retried() {
        #[derive(Default)]
        struct NoSleep;
        #[async_trait::async_trait]
        impl crate::slack::Sleeper for NoSleep {
            async fn sleep(&self, _duration: std::time::Duration) {}
        }

        let api = InMemorySlack::new()
            .with_history("C1", history(10, 1))
            .rate_limit_next(2);
        let caller = RateLimitedCaller::with_sleeper(Arc::new(NoSleep));
        let paginator = HistoryPaginator::new(&api, &caller, "C1", 0.0, 100);

        let (messages, _) = paginator.collect_all().await.unwrap();
        assert_eq!(messages.len(), 10);
        assert_eq!(api.history_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_remote_error_propagates() {
        let api = InMemorySlack::new();
        let caller = RateLimitedCaller::new();
        let mut paginator = HistoryPaginator::new(&api, &caller, "missing", 0.0, 100);

        let err = paginator.next_page().await.unwrap_err();
        assert!(matches!(err, StatsError::Remote(ref m) if m == "channel_not_found"));
    }
}
