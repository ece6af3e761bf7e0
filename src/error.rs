use thiserror::Error;

/// Errors produced while collecting channel statistics.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("remote API error: {0}")]
    Remote(String),
    #[error("cannot find channel {0}")]
    ChannelNotFound(String),
    #[error("invalid date '{value}', expected DD-MM-YYYY: {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("interrupted before the run finished")]
    Cancelled,
}

pub type Result<T, E = StatsError> = std::result::Result<T, E>;
