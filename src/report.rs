//! Plain-text rendering of aggregation results.

use std::fmt::Write as _;

use crate::aggregate::ReactionSummary;
use crate::directory::UserDirectory;
use crate::history::TraversalSummary;
use crate::stats::{AuthorReport, PatternReport};

/// One-line traversal summary.
#[must_use]
pub fn render_summary(summary: &TraversalSummary) -> String {
    format!(
        "Scanned {} messages back to {}",
        summary.scanned,
        summary.boundary.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Authors by message count.
#[must_use]
pub fn render_authors(report: &AuthorReport, users: &UserDirectory, channel: &str) -> String {
    let mut out = format!("Posters in channel {channel}\n");
    for (author, aggregate) in &report.entries {
        let _ = writeln!(
            out,
            "{} posted {} messages",
            users.name_or_id(author),
            aggregate.count
        );
    }
    out
}

/// Per-author posts that received `reaction`, with each post's text and
/// reaction count.
#[must_use]
pub fn render_reactions(
    summaries: &[ReactionSummary],
    users: &UserDirectory,
    channel: &str,
    reaction: &str,
) -> String {
    let mut out = format!("Posters in channel {channel} with reaction :{reaction}:\n");
    for summary in summaries {
        let _ = writeln!(
            out,
            "{} had {} posts with {reaction}",
            users.name_or_id(&summary.author),
            summary.posts.len()
        );
        for post in &summary.posts {
            out.push_str("------ Post:\n");
            for line in post.text.lines() {
                let _ = writeln!(out, "        {line}");
            }
            let _ = writeln!(out, "------ {reaction} count: {}", post.count);
        }
        let _ = writeln!(
            out,
            "-------> Total {reaction} reactions: {}\n",
            summary.total_reactions
        );
    }
    out
}

/// Matched text by frequency. Keys that look like `@id` mentions are
/// resolved to display names when the id is known.
#[must_use]
pub fn render_mentions(report: &PatternReport, users: &UserDirectory, channel: &str) -> String {
    let mut out = format!("Most mentioned in channel {channel}\n");
    for (key, aggregate) in &report.entries {
        let id = key.strip_prefix('@').unwrap_or(key);
        let _ = writeln!(
            out,
            "{} mentioned in {} messages",
            users.name_or_id(id),
            aggregate.count
        );
    }
    out
}
