//! Channel and user directory lookups, resolved once at startup.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::{Result, StatsError};
use crate::slack::{RateLimitedCaller, SlackApi, User};

/// Resolve a channel name (without `#`) to its id.
///
/// # Errors
///
/// Returns [`StatsError::ChannelNotFound`] if no channel has that name, or
/// an API error if listing fails.
pub async fn resolve_channel_id(
    api: &dyn SlackApi,
    caller: &RateLimitedCaller,
    name: &str,
) -> Result<String> {
    let name = name.trim_start_matches('#');
    let mut cursor: Option<String> = None;
    loop {
        let current = cursor.take();
        let page = caller
            .call("conversations.list", || api.channels(current.as_deref()))
            .await?;

        if let Some(channel) = page.items.into_iter().find(|c| c.name == name) {
            debug!(name, id = %channel.id, "Resolved channel");
            return Ok(channel.id);
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Err(StatsError::ChannelNotFound(name.to_string())),
        }
    }
}

/// Display names of workspace members, keyed by user id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDirectory {
    names: HashMap<String, String>,
}

impl UserDirectory {
    /// Fetch every workspace member.
    ///
    /// # Errors
    ///
    /// Returns an API error if listing fails.
    pub async fn load(api: &dyn SlackApi, caller: &RateLimitedCaller) -> Result<Self> {
        let mut directory = Self::default();
        let mut cursor: Option<String> = None;
        loop {
            let current = cursor.take();
            let page = caller
                .call("users.list", || api.users(current.as_deref()))
                .await?;
            directory.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        info!(users = directory.names.len(), "Loaded user directory");
        Ok(directory)
    }

    pub fn extend(&mut self, users: impl IntoIterator<Item = User>) {
        self.names
            .extend(users.into_iter().map(|u| (u.id.clone(), display_name(&u))));
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Display name for `id`, falling back to the id itself.
    #[must_use]
    pub fn name_or_id<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).unwrap_or(id)
    }
}

/// `handle(First Last)`, with placeholders for missing profile names.
#[must_use]
pub fn display_name(user: &User) -> String {
    let first = user.profile.first_name.as_deref().unwrap_or("Fulano");
    let last = user.profile.last_name.as_deref().unwrap_or("de tal");
    format!("{}({first} {last})", user.name)
}
