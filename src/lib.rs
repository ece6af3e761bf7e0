//! Slack channel statistics.
//!
//! Walks a channel's message history through the rate-limited Slack Web API
//! and aggregates it into per-author message counts, per-author reaction
//! breakdowns, or frequencies of text matching a pattern (thread replies
//! included).

pub mod aggregate;
pub mod config;
pub mod constants;
pub mod directory;
pub mod error;
pub mod history;
pub mod pattern;
pub mod report;
pub mod slack;
pub mod stats;
pub mod threads;

pub use error::{Result, StatsError};
