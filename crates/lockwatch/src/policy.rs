use std::any::Any;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::{CallSite, ConfigError, holder_label};

/// How many stalls an acquisition may accumulate before the failure policy
/// fires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetryLimit {
    /// Wait forever; the failure policy never fires.
    #[default]
    Unbounded,
    /// Fire once the stall count exceeds this many intervals.
    Stalls(NonZeroU32),
}

impl RetryLimit {
    pub fn is_exceeded_by(self, stalls: u32) -> bool {
        match self {
            RetryLimit::Unbounded => false,
            RetryLimit::Stalls(limit) => stalls > limit.get(),
        }
    }

    pub fn get(self) -> Option<u32> {
        match self {
            RetryLimit::Unbounded => None,
            RetryLimit::Stalls(limit) => Some(limit.get()),
        }
    }
}

/// Zero and negative counts mean "wait forever".
impl From<i64> for RetryLimit {
    fn from(retries: i64) -> Self {
        u32::try_from(retries.max(0))
            .ok()
            .and_then(NonZeroU32::new)
            .map_or(RetryLimit::Unbounded, RetryLimit::Stalls)
    }
}

impl From<i32> for RetryLimit {
    fn from(retries: i32) -> Self {
        RetryLimit::from(i64::from(retries))
    }
}

impl From<u32> for RetryLimit {
    fn from(retries: u32) -> Self {
        NonZeroU32::new(retries).map_or(RetryLimit::Unbounded, RetryLimit::Stalls)
    }
}

/// A lock acquisition that stalled past its retry limit.
///
/// This is what [`FailurePolicy::Panic`] unwinds with; recover it from a
/// panic payload with [`PossibleDeadlock::from_panic_payload`].
#[derive(Clone, Debug, thiserror::Error)]
#[error(
    "Possible deadlock - can't acquire lock at {waiter} for {threshold:?}, locked by {}",
    holder_label(.holder)
)]
pub struct PossibleDeadlock {
    /// Name the lock was created with.
    pub lock: &'static str,
    /// Where the stalled caller is waiting.
    pub waiter: CallSite,
    /// Where the current holder acquired the lock, if known.
    pub holder: Option<CallSite>,
    /// Stalls counted so far, including the one that triggered this.
    pub stalls: u32,
    /// Retry limit expressed as wall time (`limit * poll interval`).
    pub threshold: Duration,
}

impl PossibleDeadlock {
    pub fn from_panic_payload(payload: &(dyn Any + Send)) -> Option<&PossibleDeadlock> {
        payload.downcast_ref::<PossibleDeadlock>()
    }
}

type Callback = Arc<dyn Fn(&PossibleDeadlock) + Send + Sync>;

/// What happens once an acquisition stalls past its [`RetryLimit`].
///
/// Policies that return (`Log`, and `Custom` callbacks that return) leave the
/// caller waiting; the stall counter is not reset, so the policy fires again
/// on every following interval until the lock is acquired.
#[derive(Clone, Default)]
pub enum FailurePolicy {
    /// Log at ERROR level, then `exit(1)`.
    Exit,
    /// Log at ERROR level, then `panic_any` with the [`PossibleDeadlock`].
    Panic,
    /// Log at ERROR level and keep waiting.
    #[default]
    Log,
    Custom(Callback),
}

impl FailurePolicy {
    pub fn custom(callback: impl Fn(&PossibleDeadlock) + Send + Sync + 'static) -> Self {
        FailurePolicy::Custom(Arc::new(callback))
    }

    /// `true` selects [`FailurePolicy::Exit`], `false` [`FailurePolicy::Log`].
    pub fn from_abort_flag(abort_on_failure: bool) -> Self {
        if abort_on_failure {
            FailurePolicy::Exit
        } else {
            FailurePolicy::Log
        }
    }

    pub fn trigger(&self, failure: PossibleDeadlock) {
        if let FailurePolicy::Custom(callback) = self {
            callback(&failure);
            return;
        }

        error!(
            target: "lockwatch",
            lock = failure.lock,
            stalls = failure.stalls,
            "{failure}"
        );
        match self {
            FailurePolicy::Exit => std::process::exit(1),
            FailurePolicy::Panic => std::panic::panic_any(failure),
            FailurePolicy::Log | FailurePolicy::Custom(_) => {}
        }
    }
}

impl fmt::Debug for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Exit => f.write_str("Exit"),
            FailurePolicy::Panic => f.write_str("Panic"),
            FailurePolicy::Log => f.write_str("Log"),
            FailurePolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exit" | "abort" => Ok(FailurePolicy::Exit),
            "panic" => Ok(FailurePolicy::Panic),
            "log" => Ok(FailurePolicy::Log),
            other => Err(ConfigError::UnknownPolicy(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(holder: Option<&str>) -> PossibleDeadlock {
        PossibleDeadlock {
            lock: "test.lock",
            waiter: CallSite::new("waiter.rs:10"),
            holder: holder.map(CallSite::new),
            stalls: 3,
            threshold: Duration::from_secs(2),
        }
    }

    #[test]
    fn non_positive_retries_are_unbounded() {
        assert_eq!(RetryLimit::from(0i64), RetryLimit::Unbounded);
        assert_eq!(RetryLimit::from(-5i64), RetryLimit::Unbounded);
        assert_eq!(RetryLimit::from(0u32), RetryLimit::Unbounded);
        assert!(!RetryLimit::Unbounded.is_exceeded_by(u32::MAX));
    }

    #[test]
    fn limit_is_exceeded_only_past_the_count() {
        let limit = RetryLimit::from(2i32);
        assert_eq!(limit.get(), Some(2));
        assert!(!limit.is_exceeded_by(1));
        assert!(!limit.is_exceeded_by(2));
        assert!(limit.is_exceeded_by(3));
    }

    #[test]
    fn huge_retry_counts_saturate_to_unbounded() {
        assert_eq!(RetryLimit::from(i64::MAX), RetryLimit::Unbounded);
    }

    #[test]
    fn message_names_waiter_holder_and_threshold() {
        assert_eq!(
            failure(Some("holder.rs:4")).to_string(),
            "Possible deadlock - can't acquire lock at waiter.rs:10 for 2s, locked by holder.rs:4"
        );
        assert!(failure(None).to_string().ends_with("locked by <unknown>"));
    }

    #[test]
    fn panic_policy_unwinds_with_the_failure() {
        let payload = std::panic::catch_unwind(|| FailurePolicy::Panic.trigger(failure(None)))
            .expect_err("panic policy should unwind");
        let failure = PossibleDeadlock::from_panic_payload(payload.as_ref())
            .expect("payload should be a PossibleDeadlock");
        assert_eq!(failure.stalls, 3);
    }

    #[test]
    fn custom_policy_receives_the_failure() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let policy = FailurePolicy::custom(move |f| sink.lock().push(f.to_string()));

        policy.trigger(failure(Some("h.rs:1")));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("Possible deadlock"));
    }

    #[test]
    fn policies_parse_from_names() {
        assert!(matches!("exit".parse::<FailurePolicy>(), Ok(FailurePolicy::Exit)));
        assert!(matches!("ABORT".parse::<FailurePolicy>(), Ok(FailurePolicy::Exit)));
        assert!(matches!(" panic ".parse::<FailurePolicy>(), Ok(FailurePolicy::Panic)));
        assert!(matches!("log".parse::<FailurePolicy>(), Ok(FailurePolicy::Log)));
        assert!(matches!(
            "shrug".parse::<FailurePolicy>(),
            Err(ConfigError::UnknownPolicy(name)) if name == "shrug"
        ));
    }
}
