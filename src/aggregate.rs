//! Folding messages into per-key tallies, and ordering the results.
//!
//! Both aggregation modes are plain folds of the form
//! `(state, &Message) -> state`, so they can be driven by the paginator or
//! by an iterator in tests.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;

use crate::slack::Message;

/// Anything carrying a tally count.
pub trait Counted {
    fn count(&self) -> usize;
}

/// Messages attributed to one author.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorAggregate {
    pub count: usize,
    /// Every counted message, in the order it was seen.
    pub posts: Vec<Message>,
}

impl Counted for AuthorAggregate {
    fn count(&self) -> usize {
        self.count
    }
}

/// Occurrences of one matched text segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatternAggregate {
    pub count: usize,
}

impl Counted for PatternAggregate {
    fn count(&self) -> usize {
        self.count
    }
}

/// A keyed tally that remembers first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally<A> {
    index: HashMap<String, usize>,
    entries: Vec<(String, A)>,
}

impl<A> Default for Tally<A> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<A> Tally<A> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_or_insert_with(&mut self, key: &str, init: impl FnOnce() -> A) -> (&mut A, bool) {
        if let Some(&i) = self.index.get(key) {
            return (&mut self.entries[i].1, false);
        }
        self.index.insert(key.to_string(), self.entries.len());
        self.entries.push((key.to_string(), init()));
        let last = self.entries.len() - 1;
        (&mut self.entries[last].1, true)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&A> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &A)> {
        self.entries.iter().map(|(k, a)| (k.as_str(), a))
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<(String, A)> {
        self.entries
    }
}

/// Conditions a message must meet to be counted by author.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    /// Message must carry this reaction.
    pub reaction: Option<String>,
    /// Message text must contain a match.
    pub pattern: Option<Arc<Regex>>,
}

impl FilterChain {
    /// Whether `message` passes every configured filter. Messages without an
    /// author never pass.
    #[must_use]
    pub fn accepts(&self, message: &Message) -> bool {
        if message.user.is_none() {
            return false;
        }
        if let Some(reaction) = &self.reaction {
            if !message.has_reaction(reaction) {
                return false;
            }
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(&message.text) {
                return false;
            }
        }
        true
    }
}

/// Count `message` against its author if it passes `filters`.
#[must_use]
pub fn fold_by_author(
    mut state: Tally<AuthorAggregate>,
    message: &Message,
    filters: &FilterChain,
) -> Tally<AuthorAggregate> {
    let Some(author) = message.user.as_deref().filter(|_| filters.accepts(message)) else {
        return state;
    };

    let (aggregate, created) = state.entry_or_insert_with(author, || AuthorAggregate {
        count: 1,
        posts: Vec::new(),
    });
    if !created {
        aggregate.count += 1;
    }
    aggregate.posts.push(message.clone());
    state
}

/// Count the first match of `pattern` in `message`'s text, keyed by the
/// whole matched text. Messages without a match leave `state` unchanged.
#[must_use]
pub fn fold_by_pattern(
    mut state: Tally<PatternAggregate>,
    message: &Message,
    pattern: &Regex,
) -> Tally<PatternAggregate> {
    if let Some(found) = pattern.find(&message.text) {
        let (aggregate, created) =
            state.entry_or_insert_with(found.as_str(), || PatternAggregate { count: 1 });
        if !created {
            aggregate.count += 1;
        }
    }
    state
}

/// Sort a tally by descending count. Equal counts keep first-seen order.
#[must_use]
pub fn order<A: Counted>(tally: Tally<A>) -> Vec<(String, A)> {
    let mut entries = tally.into_entries();
    entries.sort_by_key(|(_, aggregate)| Reverse(aggregate.count()));
    entries
}

/// One post carrying the reaction of interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionPost {
    pub text: String,
    /// How many times the reaction was added to this post.
    pub count: u64,
}

/// An author's posts that received a given reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionSummary {
    pub author: String,
    pub posts: Vec<ReactionPost>,
    pub total_reactions: u64,
}

/// For each author, collect the retained posts carrying `reaction`.
///
/// Authors with no such post are omitted; the input order is kept.
#[must_use]
pub fn reaction_breakdown(
    entries: &[(String, AuthorAggregate)],
    reaction: &str,
) -> Vec<ReactionSummary> {
    entries
        .iter()
        .filter_map(|(author, aggregate)| {
            let posts: Vec<ReactionPost> = aggregate
                .posts
                .iter()
                .filter_map(|post| {
                    post.reaction(reaction).map(|r| ReactionPost {
                        text: post.text.clone(),
                        count: r.count,
                    })
                })
                .collect();
            if posts.is_empty() {
                return None;
            }
            let total_reactions = posts.iter().map(|p| p.count).sum();
            Some(ReactionSummary {
                author: author.clone(),
                posts,
                total_reactions,
            })
        })
        .collect()
}
