//! Single-retry rate-limit handling for Slack API calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::ApiError;
use crate::error::{Result, StatsError};

/// Something that can suspend the caller for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Invokes API operations, absorbing one rate-limit rejection per call.
///
/// On a rate-limited response the caller waits exactly the server-advised
/// delay and retries once. A second failure of any kind, or any
/// non-rate-limit failure, is returned as [`StatsError::Remote`].
#[derive(Clone)]
pub struct RateLimitedCaller {
    sleeper: Arc<dyn Sleeper>,
    cancel: Option<CancellationToken>,
}

impl RateLimitedCaller {
    #[must_use]
    pub fn new() -> Self {
        Self::with_sleeper(Arc::new(TokioSleeper))
    }

    #[must_use]
    pub fn with_sleeper(sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            sleeper,
            cancel: None,
        }
    }

    /// Abort in-flight requests and rate-limit waits when `token` is
    /// cancelled. No request is started once it has been.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run `operation`, retrying once after a rate-limit rejection.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Remote`] for non-rate-limit failures or when the
    /// retry also fails, and [`StatsError::Cancelled`] if the call or the
    /// wait is interrupted.
    pub async fn call<T, F, Fut>(&self, name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        match self.attempt(&operation).await? {
            Ok(value) => Ok(value),
            Err(ApiError::RateLimited { retry_after_secs }) => {
                warn!(operation = name, retry_after_secs, "Rate limited, waiting to retry");
                self.wait(Duration::from_secs(retry_after_secs)).await?;
                info!(operation = name, "Retrying after rate limit");
                self.attempt(&operation).await?.map_err(|e| match e {
                    ApiError::RateLimited { .. } => {
                        StatsError::Remote(format!("{name}: still rate limited after retry"))
                    }
                    ApiError::Remote(msg) => StatsError::Remote(msg),
                })
            }
            Err(ApiError::Remote(msg)) => Err(StatsError::Remote(msg)),
        }
    }

    async fn attempt<T, F, Fut>(&self, operation: &F) -> Result<Result<T, ApiError>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let Some(token) = &self.cancel else {
            return Ok(operation().await);
        };
        if token.is_cancelled() {
            return Err(StatsError::Cancelled);
        }
        tokio::select! {
            () = token.cancelled() => Err(StatsError::Cancelled),
            result = operation() => Ok(result),
        }
    }

    async fn wait(&self, duration: Duration) -> Result<()> {
        match &self.cancel {
            Some(token) => tokio::select! {
                () = token.cancelled() => Err(StatsError::Cancelled),
                () = self.sleeper.sleep(duration) => Ok(()),
            },
            None => {
                self.sleeper.sleep(duration).await;
                Ok(())
            }
        }
    }
}

impl Default for RateLimitedCaller {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitedCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedCaller")
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}
