use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use crate::constants::{DEFAULT_MENTION_PATTERN, MAX_MESSAGES, SLACK_API_URL};
use crate::history::parse_date;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Which statistic to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsMode {
    /// Message counts per author
    Authors,
    /// Per-author posts carrying a given reaction
    Reactions,
    /// Frequency of pattern matches, thread replies included
    Mentions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Slack
    pub slack_token: String,
    pub slack_api_url: String,
    pub channel_name: String,
    pub http_timeout: Duration,

    // Traversal window
    pub search_from: NaiveDate,
    pub search_to: Option<NaiveDate>,
    pub max_messages: usize,

    // Statistic
    pub mode: StatsMode,
    pub pattern: Option<String>,
    pub reaction: Option<String>,
    pub output_format: OutputFormat,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Slack
            slack_token: required_env("SLACK_API_TOKEN")?,
            slack_api_url: env_or_default("SLACK_API_URL", SLACK_API_URL),
            channel_name: required_env("SLACK_CHANNEL_NAME")?,
            http_timeout: Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 30)?),

            // Traversal window
            search_from: parse_env_date("SLACK_SEARCH_FROM", &required_env("SLACK_SEARCH_FROM")?)?,
            search_to: optional_env("SLACK_SEARCH_TO")
                .map(|v| parse_env_date("SLACK_SEARCH_TO", &v))
                .transpose()?,
            max_messages: parse_env_usize("MAX_MESSAGES", MAX_MESSAGES)?,

            // Statistic
            mode: parse_mode(&env_or_default("STATS_MODE", "authors"))?,
            pattern: optional_env("STATS_PATTERN"),
            reaction: optional_env("STATS_REACTION"),
            output_format: parse_output_format(&env_or_default("OUTPUT_FORMAT", "text"))?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slack_token.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "SLACK_API_TOKEN".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if let Err(e) = url::Url::parse(&self.slack_api_url) {
            return Err(ConfigError::InvalidValue {
                name: "SLACK_API_URL".to_string(),
                message: e.to_string(),
            });
        }
        if self.max_messages == 0 || self.max_messages > MAX_MESSAGES {
            return Err(ConfigError::InvalidValue {
                name: "MAX_MESSAGES".to_string(),
                message: format!("must be between 1 and {MAX_MESSAGES}"),
            });
        }
        if let Some(to) = self.search_to {
            if to < self.search_from {
                return Err(ConfigError::InvalidValue {
                    name: "SLACK_SEARCH_TO".to_string(),
                    message: "must not be before SLACK_SEARCH_FROM".to_string(),
                });
            }
        }
        if self.mode == StatsMode::Reactions && self.reaction.is_none() {
            return Err(ConfigError::InvalidValue {
                name: "STATS_REACTION".to_string(),
                message: "required when STATS_MODE is 'reactions'".to_string(),
            });
        }
        Ok(())
    }

    /// Pattern to count in mentions mode.
    #[must_use]
    pub fn mention_pattern(&self) -> &str {
        self.pattern.as_deref().unwrap_or(DEFAULT_MENTION_PATTERN)
    }

    /// The pattern the selected mode will compile, if any.
    #[must_use]
    pub fn active_pattern(&self) -> Option<&str> {
        match self.mode {
            StatsMode::Authors | StatsMode::Reactions => self.pattern.as_deref(),
            StatsMode::Mentions => Some(self.mention_pattern()),
        }
    }

    /// Minimal valid configuration for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            slack_token: "xoxb-test".to_string(),
            slack_api_url: SLACK_API_URL.to_string(),
            channel_name: "general".to_string(),
            http_timeout: Duration::from_secs(5),
            search_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            search_to: None,
            max_messages: MAX_MESSAGES,
            mode: StatsMode::Authors,
            pattern: None,
            reaction: None,
            output_format: OutputFormat::Text,
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_date(name: &str, value: &str) -> Result<NaiveDate, ConfigError> {
    parse_date(value).map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        message: e.to_string(),
    })
}

fn parse_mode(value: &str) -> Result<StatsMode, ConfigError> {
    match value.to_lowercase().as_str() {
        "authors" => Ok(StatsMode::Authors),
        "reactions" => Ok(StatsMode::Reactions),
        "mentions" => Ok(StatsMode::Mentions),
        _ => Err(ConfigError::InvalidValue {
            name: "STATS_MODE".to_string(),
            message: format!("must be 'authors', 'reactions' or 'mentions', got '{value}'"),
        }),
    }
}

fn parse_output_format(value: &str) -> Result<OutputFormat, ConfigError> {
    match value.to_lowercase().as_str() {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        _ => Err(ConfigError::InvalidValue {
            name: "OUTPUT_FORMAT".to_string(),
            message: format!("must be 'text' or 'json', got '{value}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("authors").unwrap(), StatsMode::Authors);
        assert_eq!(parse_mode("REACTIONS").unwrap(), StatsMode::Reactions);
        assert_eq!(parse_mode("Mentions").unwrap(), StatsMode::Mentions);
        assert!(parse_mode("users").is_err());
    }

    #[test]
    fn test_parse_output_format() {
        assert_eq!(parse_output_format("json").unwrap(), OutputFormat::Json);
        assert_eq!(parse_output_format("TEXT").unwrap(), OutputFormat::Text);
        assert!(parse_output_format("yaml").is_err());
    }

    #[test]
    fn test_parse_env_date() {
        assert_eq!(
            parse_env_date("SLACK_SEARCH_FROM", "31-12-2023").unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );
        let err = parse_env_date("SLACK_SEARCH_FROM", "2023/12/31").unwrap_err();
        assert!(err.to_string().contains("SLACK_SEARCH_FROM"));
    }

    #[test]
    fn test_validate() {
        assert!(Config::for_testing().validate().is_ok());

        let config = Config {
            max_messages: MAX_MESSAGES + 1,
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_messages: 0,
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());

        let config = Config {
            mode: StatsMode::Reactions,
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());

        let config = Config {
            search_to: NaiveDate::from_ymd_opt(2023, 6, 1),
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());

        let config = Config {
            slack_api_url: "not a url".to_string(),
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mention_pattern_default() {
        assert_eq!(Config::for_testing().mention_pattern(), DEFAULT_MENTION_PATTERN);
        let config = Config {
            pattern: Some("#[a-z]+".to_string()),
            ..Config::for_testing()
        };
        assert_eq!(config.mention_pattern(), "#[a-z]+");
    }

    #[test]
    fn test_active_pattern_per_mode() {
        assert_eq!(Config::for_testing().active_pattern(), None);

        let mentions = Config {
            mode: StatsMode::Mentions,
            ..Config::for_testing()
        };
        assert_eq!(mentions.active_pattern(), Some(DEFAULT_MENTION_PATTERN));

        let filtered = Config {
            mode: StatsMode::Reactions,
            pattern: Some("deploy".to_string()),
            reaction: Some("tada".to_string()),
            ..Config::for_testing()
        };
        assert_eq!(filtered.active_pattern(), Some("deploy"));
    }
}
