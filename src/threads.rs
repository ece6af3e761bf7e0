//! Thread reply expansion.

use tracing::trace;

use crate::constants::THREAD_REPLY_LIMIT;
use crate::error::Result;
use crate::slack::{Message, RateLimitedCaller, SlackApi};

/// Fetches the replies of threaded messages.
///
/// Only the first [`THREAD_REPLY_LIMIT`] replies of a thread are fetched;
/// longer threads are not paginated further.
pub struct ThreadExpander<'a> {
    api: &'a dyn SlackApi,
    caller: &'a RateLimitedCaller,
    limit: usize,
}

impl<'a> ThreadExpander<'a> {
    #[must_use]
    pub fn new(api: &'a dyn SlackApi, caller: &'a RateLimitedCaller) -> Self {
        Self {
            api,
            caller,
            limit: THREAD_REPLY_LIMIT,
        }
    }

    /// Replies to `root`, excluding the echo of the root message itself.
    ///
    /// Returns an empty list without calling the API when `root` is not part
    /// of a thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the replies call fails after the rate-limit retry.
    pub async fn expand(&self, root: &Message, channel: &str) -> Result<Vec<Message>> {
        let Some(thread_ts) = root.thread_ts.as_deref() else {
            return Ok(Vec::new());
        };

        let api = self.api;
        let limit = self.limit;
        let replies = self
            .caller
            .call("conversations.replies", || {
                api.replies(channel, thread_ts, limit)
            })
            .await?;

        let replies: Vec<Message> = replies
            .into_iter()
            .filter(|reply| reply.ts != thread_ts)
            .collect();
        trace!(thread_ts, replies = replies.len(), "Expanded thread");
        Ok(replies)
    }
}
