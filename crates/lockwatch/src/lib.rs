//! Mutex wrapper that reports stalled acquisitions and suspected deadlocks.
//!
//! [`DiagnosticMutex`] behaves like a plain mutex, except that a caller stuck
//! in [`DiagnosticMutex::lock`] wakes up once per poll interval (one second by
//! default) and logs where it is waiting and which call site currently holds
//! the lock. Once the number of stalls exceeds the configured [`RetryLimit`],
//! the configured [`FailurePolicy`] fires: exit the process, panic with a
//! catchable [`PossibleDeadlock`], or log and keep waiting.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lockwatch::DiagnosticMutex;
//!
//! // Three stalls tolerated, then exit(1).
//! let accounts = Arc::new(DiagnosticMutex::new("accounts", Vec::<u64>::new(), 3, true));
//!
//! let mut guard = accounts.lock();
//! guard.push(42);
//! guard.unlock();
//! ```
//!
//! All events go through [`tracing`] under the `lockwatch` target: TRACE for
//! attempts, acquisitions and releases, ERROR for stalls and failures. This
//! crate never installs a subscriber.
//!
//! # Cargo features
//!
//! | Feature | Effect |
//! |---------|--------|
//! | `diagnostics` *(default)* | Stall polling, holder tracking and failure policies. |
//! | *(none)* | [`DiagnosticMutex`] compiles to a `parking_lot::Mutex` pass-through. |
//!
//! # Environment
//!
//! [`Config::from_env`] reads `LOCKWATCH_RETRY_LIMIT`,
//! `LOCKWATCH_FAILURE_POLICY`, `LOCKWATCH_POLL_INTERVAL_MS` and
//! `LOCKWATCH_ACQUIRE_MODE`.

#[doc(hidden)]
pub use parking_lot;

mod config;
mod holder;
mod policy;
mod site;
mod watch;

pub use config::{AcquireMode, Config, ConfigError, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL};
pub use holder::{HolderSlot, holder_label};
pub use policy::{FailurePolicy, PossibleDeadlock, RetryLimit};
pub use site::CallSite;
pub use watch::StallWatch;

#[cfg(not(feature = "diagnostics"))]
mod disabled;
#[cfg(feature = "diagnostics")]
mod enabled;

#[cfg(not(feature = "diagnostics"))]
pub use disabled::*;
#[cfg(feature = "diagnostics")]
pub use enabled::*;
