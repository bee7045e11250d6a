//! Tokio-backed lockwatch surface.
//!
//! [`AsyncDiagnosticMutex`] follows the same protocol as
//! [`lockwatch::DiagnosticMutex`], with a spawned task standing in for the
//! acquisition thread and `tokio::time` driving the poll interval. Stall
//! accounting, failure policies and configuration are shared with the
//! blocking mutex and re-exported here.

#[doc(hidden)]
pub use tokio;

pub use lockwatch::{
    AcquireMode, CallSite, Config, ConfigError, FailurePolicy, PossibleDeadlock, RetryLimit,
};

#[cfg(not(feature = "diagnostics"))]
mod disabled;
#[cfg(feature = "diagnostics")]
mod enabled;

#[cfg(not(feature = "diagnostics"))]
pub use disabled::*;
#[cfg(feature = "diagnostics")]
pub use enabled::*;
