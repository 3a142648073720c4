//! Retry executor
//!
//! [`RetryExecutor`] runs a fallible operation until it succeeds, fails
//! permanently, runs out of attempts, or its cancellation scope is cancelled
//! while waiting between attempts:
//!
//! ```text
//! Idle -> Attempting -> Success
//!                    -> PermanentFailure
//!                    -> Exhausted
//!                    -> Cancelled
//! ```
//!
//! Attempts are strictly sequential and run on the caller's task. The only
//! suspension point the executor adds is the delay between attempts, and a
//! running attempt is never interrupted.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//!
//! use msx_retry::testing::ManualClock;
//! use msx_retry::{RetryConfig, RetryExecutor, TransientError};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let config = RetryConfig::builder()
//!     .attempts(3)
//!     .delay(Duration::from_millis(500))
//!     .build()
//!     .expect("valid config");
//! let executor =
//!     RetryExecutor::with_clock(CancellationToken::new(), config, ManualClock::auto_advance());
//!
//! let mut calls = 0;
//! let value = executor
//!     .execute(|| {
//!         calls += 1;
//!         let attempt = calls;
//!         async move {
//!             if attempt < 3 {
//!                 Err(TransientError::new("connection refused"))
//!             } else {
//!                 Ok(attempt)
//!             }
//!         }
//!     })
//!     .await
//!     .expect("third attempt succeeds");
//!
//! assert_eq!(value, 3);
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, TryFutureExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Span};

use super::backoff::Backoff;
use super::classify::{Failure, Unclassified};
use super::clock::{sleep_until_cancelled, Clock, SystemClock, WaitId};
use crate::config::RetryConfig;

/// Terminal failure of a retry session
///
/// Every variant except [`RetryError::NoAttempts`] carries the operation's
/// last error exactly as the operation returned it.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation returned a permanent failure
    #[error("failed with permanent failure after {attempts} attempt(s): {source}")]
    Permanent {
        /// Invocations made, including the failing one
        attempts: u32,
        /// The permanent failure
        source: E,
    },

    /// Every allowed attempt failed
    #[error("failed, no more attempts after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Invocations made
        attempts: u32,
        /// Failure of the final attempt
        source: E,
    },

    /// The cancellation scope fired while waiting for the next attempt
    #[error("cancelled after {attempts} attempt(s): {source}")]
    Cancelled {
        /// Invocations made before cancellation
        attempts: u32,
        /// Failure of the last attempt made
        source: E,
    },

    /// The configuration allows zero attempts, so nothing ran
    #[error("no attempts configured")]
    NoAttempts,
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
            Self::NoAttempts => 0,
        }
    }

    /// The operation's last error, if it ran at all
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            Self::Permanent { source, .. }
            | Self::Exhausted { source, .. }
            | Self::Cancelled { source, .. } => Some(source),
            Self::NoAttempts => None,
        }
    }

    /// Give back the operation's last error unchanged
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Permanent { source, .. }
            | Self::Exhausted { source, .. }
            | Self::Cancelled { source, .. } => Some(source),
            Self::NoAttempts => None,
        }
    }

    /// Whether the session stopped on a permanent failure
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }

    /// Whether the session used up its attempt budget
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Whether the session was cancelled between attempts
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Convert the carried error, keeping the variant and attempt count
    pub fn map_source<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            Self::Permanent { attempts, source } => {
                RetryError::Permanent { attempts, source: f(source) }
            }
            Self::Exhausted { attempts, source } => {
                RetryError::Exhausted { attempts, source: f(source) }
            }
            Self::Cancelled { attempts, source } => {
                RetryError::Cancelled { attempts, source: f(source) }
            }
            Self::NoAttempts => RetryError::NoAttempts,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of a retry session including result and summary statistics
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Terminal result
    pub result: RetryResult<T, E>,
    /// Invocations made
    pub attempts: u32,
    /// Sum of all completed delays
    pub total_delay: Duration,
    /// Each completed delay, in order
    pub delays: Vec<Duration>,
    /// Time from the first attempt to the terminal result, on the
    /// executor's clock
    pub elapsed: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    fn new(
        result: RetryResult<T, E>,
        attempts: u32,
        delays: Vec<Duration>,
        elapsed: Duration,
    ) -> Self {
        let total_delay =
            delays.iter().fold(Duration::ZERO, |total, delay| total.saturating_add(*delay));
        Self { result, attempts, total_delay, delays, elapsed }
    }

    /// Consume the outcome and return only the result
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }

    /// Average delay between attempts
    pub fn average_delay(&self) -> Duration {
        match u32::try_from(self.delays.len()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(count) => self.total_delay / count,
        }
    }
}

/// Runs an operation under a retry policy
///
/// The executor holds no per-session state, so one instance can serve many
/// concurrent [`execute`](Self::execute) calls. Sessions that share a
/// [`ManualClock`](crate::testing::ManualClock) should use distinct
/// [`WaitId`]s to be woken independently.
#[derive(Debug)]
pub struct RetryExecutor<C = SystemClock> {
    config: RetryConfig,
    backoff: Backoff,
    cancel: CancellationToken,
    clock: Arc<C>,
    span: Span,
    wait_id: WaitId,
}

impl RetryExecutor<SystemClock> {
    /// Create an executor that sleeps on the tokio timer
    pub fn new(cancel: CancellationToken, config: RetryConfig) -> Self {
        Self::with_clock(cancel, config, SystemClock)
    }
}

impl<C: Clock> RetryExecutor<C> {
    /// Create an executor that sleeps on `clock`
    pub fn with_clock(cancel: CancellationToken, config: RetryConfig, clock: C) -> Self {
        Self {
            backoff: Backoff::from(&config),
            config,
            cancel,
            clock: Arc::new(clock),
            span: tracing::info_span!("retry"),
            wait_id: WaitId::RETRY_DELAY,
        }
    }

    /// Log under `span` instead of the default `retry` span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Sleep under `id` between attempts
    pub fn with_wait_id(mut self, id: WaitId) -> Self {
        self.wait_id = id;
        self
    }

    /// The configuration this executor runs with
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// The cancellation scope checked between attempts
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Failure + fmt::Display,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation whose error type has no [`Failure`] impl
    ///
    /// Every failure is treated as transient. The error is handed back
    /// exactly as the operation returned it.
    pub async fn execute_unclassified<F, Fut, T, E>(&self, mut operation: F) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute(|| operation().map_err(Unclassified))
            .await
            .map_err(|error| error.map_source(Unclassified::into_inner))
    }

    /// Execute an operation with retry logic and return outcome statistics
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Failure + fmt::Display,
    {
        let max_attempts = self.config.attempts;
        let started = self.clock.now();
        let mut delays = Vec::new();

        if max_attempts == 0 {
            warn!(parent: &self.span, "Retry configured with zero attempts, operation not run");
            return RetryOutcome::new(Err(RetryError::NoAttempts), 0, delays, Duration::ZERO);
        }

        let mut attempts_made = 0;
        let mut current_delay = self.backoff.initial_delay();
        let mut last_error: Option<E> = None;

        while attempts_made < max_attempts {
            if let Some(error) = last_error.take() {
                current_delay = self.backoff.next_delay(current_delay, attempts_made);
                warn!(
                    parent: &self.span,
                    attempt = attempts_made,
                    max_attempts,
                    delay = ?current_delay,
                    error = %error,
                    "Attempt failed, retrying"
                );
                debug!(
                    parent: &self.span,
                    delay = ?current_delay,
                    wait_id = %self.wait_id,
                    "Backing off before attempt {}",
                    attempts_made + 1
                );

                let slept =
                    sleep_until_cancelled(self.clock.as_ref(), current_delay, self.wait_id, &self.cancel)
                        .await;
                if slept.is_err() {
                    warn!(
                        parent: &self.span,
                        attempts = attempts_made,
                        error = %error,
                        "Retry cancelled"
                    );
                    let cancelled = RetryError::Cancelled { attempts: attempts_made, source: error };
                    return RetryOutcome::new(
                        Err(cancelled),
                        attempts_made,
                        delays,
                        self.elapsed_since(started),
                    );
                }
                delays.push(current_delay);
            }

            match operation().await {
                Ok(value) => {
                    if attempts_made > 0 {
                        debug!(
                            parent: &self.span,
                            "Operation succeeded after {} retries", attempts_made
                        );
                    }
                    return RetryOutcome::new(
                        Ok(value),
                        attempts_made + 1,
                        delays,
                        self.elapsed_since(started),
                    );
                }
                Err(error) if error.is_permanent() => {
                    let attempts = attempts_made + 1;
                    error!(
                        parent: &self.span,
                        attempts,
                        error = %error,
                        "Retry failed with permanent failure"
                    );
                    let permanent = RetryError::Permanent { attempts, source: error };
                    return RetryOutcome::new(
                        Err(permanent),
                        attempts,
                        delays,
                        self.elapsed_since(started),
                    );
                }
                Err(error) => {
                    last_error = Some(error);
                    attempts_made += 1;
                }
            }
        }

        let result = match last_error {
            Some(error) => {
                error!(
                    parent: &self.span,
                    attempts = attempts_made,
                    error = %error,
                    "Retry failed, no more attempts"
                );
                Err(RetryError::Exhausted { attempts: attempts_made, source: error })
            }
            None => Err(RetryError::NoAttempts),
        };
        RetryOutcome::new(result, attempts_made, delays, self.elapsed_since(started))
    }

    fn elapsed_since(&self, started: Instant) -> Duration {
        self.clock.now().saturating_duration_since(started)
    }
}

/// Build an executor on the system clock and run `operation` once under it
pub async fn retry<F, Fut, T, E>(
    cancel: CancellationToken,
    config: RetryConfig,
    operation: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Failure + fmt::Display,
{
    RetryExecutor::new(cancel, config).execute(operation).await
}

/// Decorate `action` so each call runs it under a retry policy
///
/// The returned function takes the cancellation scope of the session and
/// hands it to every attempt, so the action can observe it too.
///
/// ```rust
/// use msx_retry::{retry_action, PermanentError, RetryConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let lookup = retry_action(RetryConfig::default(), |_cancel: CancellationToken| async {
///     Err::<(), _>(PermanentError::new("no such service"))
/// });
///
/// let err = lookup(CancellationToken::new()).await.expect_err("permanent failure");
/// assert_eq!(err.attempts(), 1);
/// # });
/// ```
pub fn retry_action<F, Fut, T, E>(
    config: RetryConfig,
    action: F,
) -> impl Fn(CancellationToken) -> BoxFuture<'static, RetryResult<T, E>>
where
    F: FnMut(CancellationToken) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Failure + fmt::Display + Send + 'static,
{
    move |cancel: CancellationToken| {
        let config = config.clone();
        let mut action = action.clone();
        async move {
            let executor = RetryExecutor::new(cancel, config);
            let session = executor.cancellation_token();
            executor.execute(|| action(session.clone())).await
        }
        .boxed()
    }
}
