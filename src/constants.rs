//! Shared constants used across the application.

/// Hard ceiling on the number of history messages scanned in one run.
pub const MAX_MESSAGES: usize = 10_000;

/// Largest page size `conversations.history` accepts.
pub const HISTORY_PAGE_SIZE: usize = 500;

/// Replies fetched per thread. Threads are not paginated past this.
pub const THREAD_REPLY_LIMIT: usize = 1_000;

/// Wait used when a rate-limited response carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Default Slack Web API base URL.
pub const SLACK_API_URL: &str = "https://slack.com/api";

/// Pattern used to count `@user` mentions when none is configured.
pub const DEFAULT_MENTION_PATTERN: &str = "@[a-zA-Z0-9]{3,}";

/// Date format accepted for `SLACK_SEARCH_FROM` / `SLACK_SEARCH_TO`.
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// User agent sent with every API request.
pub const USER_AGENT: &str = concat!("slack-channel-stats/", env!("CARGO_PKG_VERSION"));
