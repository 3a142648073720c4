//! Operation decorators that classify failures
//!
//! Wrapping an operation with [`mark_transient`] or [`mark_permanent`] leaves
//! its successes alone and wraps every error it returns, so the executor
//! treats them accordingly without the operation knowing about retries.

use std::future::Future;

use futures::future::{MapErr, TryFutureExt};

use super::classify::{BoxError, PermanentError, TransientError};

/// Decorate `operation` so all of its failures are retried
pub fn mark_transient<F, Fut, T, E>(
    mut operation: F,
) -> impl FnMut() -> MapErr<Fut, fn(E) -> TransientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    let wrap: fn(E) -> TransientError = |error| TransientError::new(error);
    move || operation().map_err(wrap)
}

/// Decorate `operation` so any failure stops the retry loop
pub fn mark_permanent<F, Fut, T, E>(
    mut operation: F,
) -> impl FnMut() -> MapErr<Fut, fn(E) -> PermanentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    let wrap: fn(E) -> PermanentError = |error| PermanentError::new(error);
    move || operation().map_err(wrap)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::RetryConfig;
    use crate::resilience::classify::Failure;
    use crate::resilience::retry::RetryExecutor;
    use crate::testing::ManualClock;

    fn original() -> io::Error {
        io::Error::new(io::ErrorKind::TimedOut, "original error")
    }

    #[tokio::test]
    async fn test_mark_transient_wraps_errors() {
        let mut op = mark_transient(|| async { Err::<(), _>(original()) });

        let err = op().await.expect_err("wrapped");
        assert!(!err.is_permanent());
        assert!(err.cause().is::<io::Error>());
    }

    #[tokio::test]
    async fn test_mark_permanent_wraps_errors() {
        let mut op = mark_permanent(|| async { Err::<(), _>(original()) });

        let err = op().await.expect_err("wrapped");
        assert!(err.is_permanent());
        assert_eq!(err.to_string(), "original error");
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let mut op = mark_permanent(|| async { Ok::<_, io::Error>(42) });
        assert_eq!(op().await.expect("success"), 42);
    }

    #[tokio::test]
    async fn test_permanent_decorator_stops_executor() {
        let config = RetryConfig { attempts: 5, ..RetryConfig::default() };
        let clock = ManualClock::auto_advance();
        let executor = RetryExecutor::with_clock(CancellationToken::new(), config, clock.clone());
        let calls = AtomicU32::new(0);

        let err = executor
            .execute(mark_permanent(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(original()) }
            }))
            .await
            .expect_err("permanent failure");

        assert!(err.is_permanent());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());

        let cause = err.into_source().expect("source").into_cause();
        assert!(cause.downcast_ref::<io::Error>().is_some());
    }
}
