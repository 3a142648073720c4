//! Manually driven clock for deterministic retry tests
//!
//! [`ManualClock`] never consults real time. Sleepers park until the test
//! moves virtual time past their deadline with [`ManualClock::advance`], or
//! wakes them by id with [`ManualClock::trigger`]. Every requested sleep is
//! recorded so tests can assert the exact delay progression.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use msx_retry::testing::ManualClock;
//! use msx_retry::{Clock, WaitId};
//!
//! # tokio_test::block_on(async {
//! let clock = ManualClock::auto_advance();
//! clock.sleep(Duration::from_secs(5), WaitId::RETRY_DELAY).await;
//!
//! assert_eq!(clock.elapsed(), Duration::from_secs(5));
//! assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
//! # });
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::resilience::{Clock, WaitId};

/// Clock whose time only moves when a test says so
///
/// Clones share the same virtual time and sleepers.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    elapsed: Duration,
    auto_advance: bool,
    sleepers: Vec<Sleeper>,
    queued_triggers: HashMap<WaitId, usize>,
    history: Vec<(WaitId, Duration)>,
}

#[derive(Debug)]
struct Sleeper {
    id: WaitId,
    deadline: Duration,
    wake: oneshot::Sender<()>,
}

impl State {
    /// Drop sleepers whose future was abandoned (e.g. by cancellation)
    fn prune(&mut self) {
        self.sleepers.retain(|sleeper| !sleeper.wake.is_closed());
    }

    fn wake_expired(&mut self) {
        let elapsed = self.elapsed;
        let (expired, waiting): (Vec<_>, Vec<_>) =
            self.sleepers.drain(..).partition(|sleeper| sleeper.deadline <= elapsed);
        self.sleepers = waiting;
        for sleeper in expired {
            let _ = sleeper.wake.send(());
        }
    }
}

impl ManualClock {
    /// Create a clock whose sleepers wait for `advance` or `trigger`
    pub fn new() -> Self {
        Self { start: Instant::now(), state: Arc::new(Mutex::new(State::default())) }
    }

    /// Create a clock where every sleep advances virtual time by its own
    /// duration and returns immediately
    pub fn auto_advance() -> Self {
        let clock = Self::new();
        clock.state.lock().auto_advance = true;
        clock
    }

    /// Move virtual time forward, waking every sleeper whose deadline passed
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.elapsed = state.elapsed.saturating_add(duration);
        state.wake_expired();
    }

    /// Wake the oldest sleeper registered under `id`
    ///
    /// Returns `false` when nobody was sleeping under `id`; the trigger is
    /// then queued and the next sleep under `id` returns immediately.
    pub fn trigger(&self, id: WaitId) -> bool {
        let mut state = self.state.lock();
        state.prune();

        match state.sleepers.iter().position(|sleeper| sleeper.id == id) {
            Some(index) => {
                let sleeper = state.sleepers.remove(index);
                let _ = sleeper.wake.send(());
                true
            }
            None => {
                *state.queued_triggers.entry(id).or_insert(0) += 1;
                false
            }
        }
    }

    /// Number of sleepers currently parked under `id`
    pub fn pending_sleepers(&self, id: WaitId) -> usize {
        let mut state = self.state.lock();
        state.prune();
        state.sleepers.iter().filter(|sleeper| sleeper.id == id).count()
    }

    /// Wait (in real time) until at least `count` sleepers are parked under
    /// `id`
    pub async fn until_sleeping(&self, id: WaitId, count: usize) {
        while self.pending_sleepers(id) < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Virtual time elapsed since the clock was created
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Every requested sleep duration, in request order
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().history.iter().map(|(_, duration)| *duration).collect()
    }

    /// Drain the recorded sleep durations, in request order
    pub fn take_sleeps(&self) -> Vec<Duration> {
        std::mem::take(&mut self.state.lock().history)
            .into_iter()
            .map(|(_, duration)| duration)
            .collect()
    }

    /// Requested sleep durations for a single sleeper id
    #[must_use]
    pub fn sleeps_for(&self, id: WaitId) -> Vec<Duration> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|(sleeper, _)| *sleeper == id)
            .map(|(_, duration)| *duration)
            .collect()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration, id: WaitId) {
        let woken = {
            let mut state = self.state.lock();
            state.history.push((id, duration));
            state.prune();

            if state.auto_advance {
                state.elapsed = state.elapsed.saturating_add(duration);
                state.wake_expired();
                return;
            }

            if let Some(queued) = state.queued_triggers.get_mut(&id) {
                *queued -= 1;
                if *queued == 0 {
                    state.queued_triggers.remove(&id);
                }
                return;
            }

            let deadline = state.elapsed.saturating_add(duration);
            if deadline <= state.elapsed {
                return;
            }

            let (wake, woken) = oneshot::channel();
            state.sleepers.push(Sleeper { id, deadline, wake });
            woken
        };

        let _ = woken.await;
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for testing::time.

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::resilience::sleep_until_cancelled;

    const A: WaitId = WaitId(10);
    const B: WaitId = WaitId(20);

    #[tokio::test]
    async fn test_advance_wakes_expired_sleepers() {
        let clock = ManualClock::new();
        let sleeper = clock.clone();
        let handle = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(60), A).await });

        clock.until_sleeping(A, 1).await;
        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.pending_sleepers(A), 1, "deadline not reached yet");

        clock.advance(Duration::from_secs(30));
        handle.await.expect("sleeper finishes");
        assert_eq!(clock.pending_sleepers(A), 0);
        assert_eq!(clock.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_trigger_wakes_only_matching_id() {
        let clock = ManualClock::new();
        let (first, second) = (clock.clone(), clock.clone());
        let a = tokio::spawn(async move { first.sleep(Duration::from_secs(60), A).await });
        let b = tokio::spawn(async move { second.sleep(Duration::from_secs(60), B).await });

        clock.until_sleeping(A, 1).await;
        clock.until_sleeping(B, 1).await;

        assert!(clock.trigger(A));
        a.await.expect("sleeper A finishes");
        assert_eq!(clock.pending_sleepers(B), 1, "B must keep sleeping");

        assert!(clock.trigger(B));
        b.await.expect("sleeper B finishes");
        assert_eq!(clock.elapsed(), Duration::ZERO, "triggers do not move time");
    }

    #[tokio::test]
    async fn test_trigger_before_sleep_is_queued() {
        let clock = ManualClock::new();
        assert!(!clock.trigger(A));

        clock.sleep(Duration::from_secs(60), A).await;
        assert_eq!(clock.pending_sleepers(A), 0);
    }

    #[tokio::test]
    async fn test_zero_sleep_returns_immediately() {
        let clock = ManualClock::new();
        clock.sleep(Duration::ZERO, A).await;
        assert_eq!(clock.sleeps(), vec![Duration::ZERO]);
    }

    #[tokio::test]
    async fn test_auto_advance_records_history() {
        let clock = ManualClock::auto_advance();
        let start = clock.now();

        clock.sleep(Duration::from_millis(500), A).await;
        clock.sleep(Duration::from_millis(1500), B).await;

        assert_eq!(clock.now().duration_since(start), Duration::from_millis(2000));
        assert_eq!(clock.sleeps_for(A), vec![Duration::from_millis(500)]);
        assert_eq!(clock.sleeps_for(B), vec![Duration::from_millis(1500)]);
    }

    #[tokio::test]
    async fn test_take_sleeps_drains_history() {
        let clock = ManualClock::auto_advance();
        clock.sleep(Duration::from_millis(500), A).await;
        clock.sleep(Duration::from_millis(1000), A).await;

        assert_eq!(
            clock.take_sleeps(),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
        assert!(clock.sleeps().is_empty());
        assert_eq!(clock.elapsed(), Duration::from_millis(1500), "time is kept");
    }

    #[tokio::test]
    async fn test_cancelled_sleeper_is_pruned() {
        let clock = ManualClock::new();
        let cancel = CancellationToken::new();
        let (sleeper, token) = (clock.clone(), cancel.clone());
        let handle = tokio::spawn(async move {
            sleep_until_cancelled(&sleeper, Duration::from_secs(60), A, &token).await
        });

        clock.until_sleeping(A, 1).await;
        cancel.cancel();

        let result = handle.await.expect("task completes");
        assert!(result.is_err());
        assert_eq!(clock.pending_sleepers(A), 0);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_secs(5));
        assert_eq!(other.elapsed(), Duration::from_secs(5));
    }
}
