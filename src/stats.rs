//! End-to-end statistics collection for one channel.
//!
//! Wires the paginator, thread expansion, and the aggregation folds
//! together. Each run compiles its pattern before the first history
//! request, so a bad pattern fails it without touching the API.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{
    fold_by_author, fold_by_pattern, order, AuthorAggregate, FilterChain, PatternAggregate, Tally,
};
use crate::constants::MAX_MESSAGES;
use crate::error::Result;
use crate::history::{day_end_epoch, day_start_epoch, HistoryPaginator, TraversalSummary};
use crate::pattern::PatternCache;
use crate::slack::{RateLimitedCaller, SlackApi};
use crate::threads::ThreadExpander;

/// Date range and budget shared by both aggregation modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Oldest day included.
    pub from: NaiveDate,
    /// Newest day included, if bounded.
    pub to: Option<NaiveDate>,
    pub max_messages: usize,
}

impl Window {
    #[must_use]
    pub fn since(from: NaiveDate) -> Self {
        Self {
            from,
            to: None,
            max_messages: MAX_MESSAGES,
        }
    }
}

/// Optional filters for counting messages by author.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorFilters {
    pub reaction: Option<String>,
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorReport {
    /// Authors by descending message count.
    pub entries: Vec<(String, AuthorAggregate)>,
    #[serde(skip)]
    pub summary: TraversalSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternReport {
    /// Matched text by descending occurrence count.
    pub entries: Vec<(String, PatternAggregate)>,
    #[serde(skip)]
    pub summary: TraversalSummary,
}

/// Collects statistics through a shared API handle, caller, and pattern cache.
pub struct StatsCollector<'a> {
    api: &'a dyn SlackApi,
    caller: &'a RateLimitedCaller,
    patterns: &'a PatternCache,
}

impl<'a> StatsCollector<'a> {
    #[must_use]
    pub fn new(
        api: &'a dyn SlackApi,
        caller: &'a RateLimitedCaller,
        patterns: &'a PatternCache,
    ) -> Self {
        Self {
            api,
            caller,
            patterns,
        }
    }

    fn paginator(&self, channel: &str, window: &Window) -> HistoryPaginator<'a> {
        let paginator = HistoryPaginator::new(
            self.api,
            self.caller,
            channel,
            day_start_epoch(window.from),
            window.max_messages,
        );
        match window.to {
            Some(to) => paginator.with_latest(day_end_epoch(to)),
            None => paginator,
        }
    }

    /// Count channel messages per author. Thread replies are not included.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter pattern is invalid or the API fails.
    pub async fn by_author(
        &self,
        channel: &str,
        window: &Window,
        filters: &AuthorFilters,
    ) -> Result<AuthorReport> {
        let filters = FilterChain {
            reaction: filters.reaction.clone(),
            pattern: filters
                .pattern
                .as_deref()
                .map(|p| self.patterns.compile(p))
                .transpose()?,
        };

        info!(channel, from = %window.from, "Aggregating messages by author");
        let mut paginator = self.paginator(channel, window);
        let mut tally = Tally::new();
        while let Some(page) = paginator.next_page().await? {
            tally = page
                .iter()
                .fold(tally, |state, message| fold_by_author(state, message, &filters));
        }

        let summary = paginator.summary();
        info!(
            scanned = summary.scanned,
            boundary = %summary.boundary,
            authors = tally.len(),
            "Author aggregation complete"
        );
        Ok(AuthorReport {
            entries: order(tally),
            summary,
        })
    }

    /// Count occurrences of the text matched by `pattern` across channel
    /// messages and the replies of threads rooted in the range.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is invalid or the API fails.
    pub async fn by_pattern(
        &self,
        channel: &str,
        window: &Window,
        pattern: &str,
    ) -> Result<PatternReport> {
        let regex = self.patterns.compile(pattern)?;
        let expander = ThreadExpander::new(self.api, self.caller);

        info!(channel, from = %window.from, pattern, "Aggregating messages by pattern");
        let mut paginator = self.paginator(channel, window);
        let mut tally = Tally::new();
        while let Some(page) = paginator.next_page().await? {
            for message in &page {
                tally = fold_by_pattern(tally, message, &regex);
                if message.thread_ts.as_deref() == Some(message.ts.as_str()) {
                    let replies = expander.expand(message, channel).await?;
                    debug!(thread_ts = %message.ts, replies = replies.len(), "Scanning thread");
                    tally = replies
                        .iter()
                        .fold(tally, |state, reply| fold_by_pattern(state, reply, &regex));
                }
            }
        }

        let summary = paginator.summary();
        info!(
            scanned = summary.scanned,
            boundary = %summary.boundary,
            distinct = tally.len(),
            "Pattern aggregation complete"
        );
        Ok(PatternReport {
            entries: order(tally),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatsError;
    use crate::slack::{InMemorySlack, Message, Reaction};
    use tokio_util::sync::CancellationToken;

    /// 2024-01-02 00:00:00 UTC
    const JAN_2: u64 = 1_704_153_600;

    fn msg(offset: u64, user: &str, text: &str) -> Message {
        Message {
            ts: format!("{}.000100", JAN_2 + offset),
            user: Some(user.to_string()),
            text: text.to_string(),
            reactions: None,
            thread_ts: None,
        }
    }

    fn window() -> Window {
        Window::since(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
    }

    fn counts<A: crate::aggregate::Counted>(entries: &[(String, A)]) -> Vec<(&str, usize)> {
        entries.iter().map(|(k, a)| (k.as_str(), a.count())).collect()
    }

    #[tokio::test]
    async fn test_by_author_scenario() {
        let api = InMemorySlack::new().with_history(
            "C1",
            vec![msg(30, "A", "one"), msg(20, "A", "two"), msg(10, "B", "three")],
        );
        let caller = RateLimitedCaller::new();
        let cache = PatternCache::new();
        let collector = StatsCollector::new(&api, &caller, &cache);

        let report = collector
            .by_author("C1", &window(), &AuthorFilters::default())
            .await
            .unwrap();

        assert_eq!(counts(&report.entries), vec![("A", 2), ("B", 1)]);
        assert_eq!(report.summary.scanned, 3);
    }

    #[tokio::test]
    async fn test_by_author_excludes_messages_before_start() {
        let mut old = msg(0, "B", "old news");
        old.ts = format!("{}.000000", JAN_2 - 60);
        let api = InMemorySlack::new().with_history(
            "C1",
            vec![msg(30, "A", "new"), old, msg(0, "B", "never reached")],
        );
        let caller = RateLimitedCaller::new();
        let cache = PatternCache::new();
        let collector = StatsCollector::new(&api, &caller, &cache);

        let report = collector
            .by_author("C1", &window(), &AuthorFilters::default())
            .await
            .unwrap();

        assert_eq!(counts(&report.entries), vec![("A", 1)]);
    }

    #[tokio::test]
    async fn test_by_author_with_filters() {
        let mut celebrated = msg(30, "A", "release 1.2 shipped");
        celebrated.reactions = Some(vec![Reaction {
            name: "tada".to_string(),
            count: 4,
        }]);
        let mut unrelated = msg(20, "B", "lunch");
        unrelated.reactions = celebrated.reactions.clone();
        let api = InMemorySlack::new().with_history(
            "C1",
            vec![celebrated, unrelated, msg(10, "A", "release 1.3 planned")],
        );
        let caller = RateLimitedCaller::new();
        let cache = PatternCache::new();
        let collector = StatsCollector::new(&api, &caller, &cache);

        let filters = AuthorFilters {
            reaction: Some("tada".to_string()),
            pattern: Some("release".to_string()),
        };
        let report = collector.by_author("C1", &window(), &filters).await.unwrap();

        assert_eq!(counts(&report.entries), vec![("A", 1)]);
        assert_eq!(report.entries[0].1.posts[0].text, "release 1.2 shipped");
    }

    #[tokio::test]
    async fn test_invalid_pattern_fails_before_fetching() {
        let api = InMemorySlack::new().with_history("C1", vec![msg(1, "A", "x")]);
        let caller = RateLimitedCaller::new();
        let cache = PatternCache::new();
        let collector = StatsCollector::new(&api, &caller, &cache);

        let err = collector
            .by_pattern("C1", &window(), "foo(")
            .await
            .unwrap_err();
        assert!(matches!(err, StatsError::InvalidPattern { .. }));
        assert!(api.history_requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_makes_no_requests() {
        let mut root = msg(30, "A", "@alice");
        root.thread_ts = Some(root.ts.clone());
        let api = InMemorySlack::new()
            .with_history("C1", vec![root.clone()])
            .with_thread(&root.ts, vec![root.clone()]);
        let token = CancellationToken::new();
        token.cancel();
        let caller = RateLimitedCaller::new().with_cancellation(token);
        let cache = PatternCache::new();
        let collector = StatsCollector::new(&api, &caller, &cache);

        let err = collector
            .by_author("C1", &window(), &AuthorFilters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StatsError::Cancelled));

        let err = collector
            .by_pattern("C1", &window(), "@[a-z]+")
            .await
            .unwrap_err();
        assert!(matches!(err, StatsError::Cancelled));

        assert!(api.history_requests().is_empty());
        assert!(api.reply_requests().is_empty());
    }

    #[tokio::test]
    async fn test_by_pattern_scenario() {
        let api = InMemorySlack::new().with_history(
            "C1",
            vec![
                msg(30, "A", "see foo123 now"),
                msg(20, "B", "no match here"),
                msg(10, "A", "foo42 again"),
            ],
        );
        let caller = RateLimitedCaller::new();
        let cache = PatternCache::new();
        let collector = StatsCollector::new(&api, &caller, &cache);

        let report = collector
            .by_pattern("C1", &window(), r"foo\d+")
            .await
            .unwrap();

        assert_eq!(counts(&report.entries), vec![("foo123", 1), ("foo42", 1)]);
    }

    #[tokio::test]
    async fn test_by_pattern_scans_thread_replies_once() {
        let mut root = msg(30, "A", "thoughts @alice?");
        root.thread_ts = Some(root.ts.clone());
        let echo = root.clone();
        let mut reply = msg(40, "B", "agree with @alice");
        reply.thread_ts = Some(root.ts.clone());

        let api = InMemorySlack::new()
            .with_history("C1", vec![root.clone(), msg(10, "C", "ping @bob")])
            .with_thread(&root.ts, vec![echo, reply]);
        let caller = RateLimitedCaller::new();
        let cache = PatternCache::new();
        let collector = StatsCollector::new(&api, &caller, &cache);

        let report = collector
            .by_pattern("C1", &window(), r"@[a-zA-Z0-9]{3,}")
            .await
            .unwrap();

        assert_eq!(counts(&report.entries), vec![("@alice", 2), ("@bob", 1)]);
        assert_eq!(api.reply_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_pattern_compiled_once_across_runs() {
        let api = InMemorySlack::new().with_history("C1", vec![msg(1, "A", "foo1")]);
        let caller = RateLimitedCaller::new();
        let cache = PatternCache::new();
        let collector = StatsCollector::new(&api, &caller, &cache);

        collector.by_pattern("C1", &window(), r"foo\d").await.unwrap();
        collector.by_pattern("C1", &window(), r"foo\d").await.unwrap();
        let filters = AuthorFilters {
            reaction: None,
            pattern: Some(r"foo\d".to_string()),
        };
        collector.by_author("C1", &window(), &filters).await.unwrap();

        assert_eq!(cache.compilations(), 1);
    }

    #[tokio::test]
    async fn test_end_date_is_forwarded() {
        let api = InMemorySlack::new().with_history("C1", Vec::new());
        let caller = RateLimitedCaller::new();
        let cache = PatternCache::new();
        let collector = StatsCollector::new(&api, &caller, &cache);

        let window = Window {
            to: NaiveDate::from_ymd_opt(2024, 1, 2),
            ..window()
        };
        collector
            .by_author("C1", &window, &AuthorFilters::default())
            .await
            .unwrap();

        assert_eq!(
            api.history_requests()[0].latest.as_deref(),
            Some("1704240000.000000")
        );
    }
}
