//! Retry building blocks
//!
//! Leaf first:
//! - **[`classify`]**: transient vs permanent failures
//! - **[`backoff`]**: delay before the next attempt
//! - **[`clock`]**: cancellable sleeps behind a swappable clock
//! - **[`retry`]**: the executor tying the above together
//! - **[`decorate`]**: wrappers that classify an operation's failures
//!
//! Classification and backoff math live in the foundation tier; everything
//! that sleeps or logs needs `runtime`.

pub mod backoff;
pub mod classify;
#[cfg(feature = "runtime")]
pub mod clock;
#[cfg(feature = "runtime")]
pub mod decorate;
#[cfg(feature = "runtime")]
pub mod retry;

pub use backoff::{Backoff, Delays};
pub use classify::{
    classify, AnyFailure, BoxError, Classification, Failure, FailureError, FailureExt,
    PermanentError, TransientError, Unclassified,
};
#[cfg(feature = "runtime")]
pub use clock::{sleep_until_cancelled, Cancelled, Clock, SystemClock, WaitId};
#[cfg(feature = "runtime")]
pub use decorate::{mark_permanent, mark_transient};
#[cfg(feature = "runtime")]
pub use retry::{retry, retry_action, RetryError, RetryExecutor, RetryOutcome, RetryResult};
