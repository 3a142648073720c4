//! Time abstraction for retry delays
//!
//! The executor never sleeps directly; it asks a [`Clock`] to wait, racing
//! that wait against the session's [`CancellationToken`]. Production code
//! uses [`SystemClock`]; tests substitute
//! [`ManualClock`](crate::testing::ManualClock) to drive delays without real
//! time passing.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Identifies a logical sleeper on a clock
///
/// Test clocks key their sleepers by this id so one retry session can be
/// woken without affecting others sharing the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaitId(pub u64);

impl WaitId {
    /// Default id for the delay between retry attempts
    pub const RETRY_DELAY: WaitId = WaitId(1);
}

impl fmt::Display for WaitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wait#{}", self.0)
    }
}

/// Trait for time operations used by the retry executor
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Wait for `duration`
    ///
    /// `id` names the sleeper; real clocks ignore it.
    async fn sleep(&self, duration: Duration, id: WaitId);
}

/// Real clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration, _id: WaitId) {
        tokio::time::sleep(duration).await;
    }
}

/// Implement Clock for Arc<T> where T: Clock for convenient sharing
#[async_trait]
impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    async fn sleep(&self, duration: Duration, id: WaitId) {
        (**self).sleep(duration, id).await;
    }
}

/// A wait was abandoned because its cancellation scope was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sleep cancelled")]
pub struct Cancelled;

/// Sleep on `clock` unless `cancel` fires first
///
/// An already-cancelled token returns immediately without touching the clock.
pub async fn sleep_until_cancelled<C>(
    clock: &C,
    duration: Duration,
    id: WaitId,
    cancel: &CancellationToken,
) -> Result<(), Cancelled>
where
    C: Clock + ?Sized,
{
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        _ = clock.sleep(duration, id) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_now() {
        let clock = SystemClock;
        let now1 = clock.now();
        let now2 = clock.now();
        assert!(now2 >= now1, "System clock should advance");
    }

    #[tokio::test]
    async fn test_system_clock_sleep_elapses() {
        let start = Instant::now();
        SystemClock.sleep(Duration::from_millis(20), WaitId::RETRY_DELAY).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_sleep_until_cancelled_completes() {
        let cancel = CancellationToken::new();
        let result =
            sleep_until_cancelled(&SystemClock, Duration::from_millis(1), WaitId(7), &cancel).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_sleep_until_cancelled_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = Instant::now();
        let result =
            sleep_until_cancelled(&SystemClock, Duration::from_secs(60), WaitId(7), &cancel).await;

        assert_eq!(result, Err(Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sleep_until_cancelled_interrupts_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result =
            sleep_until_cancelled(&SystemClock, Duration::from_secs(60), WaitId(7), &cancel).await;

        assert_eq!(result, Err(Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_arc_clock_delegates() {
        let clock = Arc::new(SystemClock);
        let cancel = CancellationToken::new();
        let result = sleep_until_cancelled(&clock, Duration::ZERO, WaitId(2), &cancel).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_wait_id_display() {
        assert_eq!(WaitId::RETRY_DELAY.to_string(), "wait#1");
    }
}
