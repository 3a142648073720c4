//! Testing utilities
//!
//! - **[`time`]**: [`ManualClock`], a clock driven by the test instead of the
//!   wall clock
//!
//! Enabled with `runtime`; downstream crates opt in through `test-utils`.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use msx_retry::testing::ManualClock;
//! use msx_retry::WaitId;
//!
//! let clock = ManualClock::new();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.elapsed(), Duration::from_secs(5));
//! assert_eq!(clock.pending_sleepers(WaitId::RETRY_DELAY), 0);
//! ```

pub mod time;

pub use time::ManualClock;
