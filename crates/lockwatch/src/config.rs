use std::str::FromStr;
use std::time::Duration;

use crate::{FailurePolicy, RetryLimit};

/// Default stall period: one second.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest stall period [`Config::poll_interval`] accepts.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

const ENV_RETRY_LIMIT: &str = "LOCKWATCH_RETRY_LIMIT";
const ENV_FAILURE_POLICY: &str = "LOCKWATCH_FAILURE_POLICY";
const ENV_POLL_INTERVAL_MS: &str = "LOCKWATCH_POLL_INTERVAL_MS";
const ENV_ACQUIRE_MODE: &str = "LOCKWATCH_ACQUIRE_MODE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown failure policy `{0}` (expected exit, abort, panic or log)")]
    UnknownPolicy(String),
    #[error("unknown acquire mode `{0}` (expected spawned or polling)")]
    UnknownAcquireMode(String),
    #[error("{var}: `{value}` is not a valid {expected}")]
    InvalidValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// How the underlying lock is acquired while stalls are being reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AcquireMode {
    /// A dedicated thread (or task) blocks on the lock and hands the guard
    /// back; the caller only waits on the hand-off. A caller that gives up
    /// leaves the attempt running until it acquires, at which point the
    /// undeliverable guard is released.
    #[default]
    Spawned,
    /// The caller retries a timed acquisition once per interval. Nothing is
    /// left running when the caller gives up.
    Polling,
}

impl FromStr for AcquireMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spawned" => Ok(AcquireMode::Spawned),
            "polling" => Ok(AcquireMode::Polling),
            other => Err(ConfigError::UnknownAcquireMode(other.to_owned())),
        }
    }
}

/// Settings shared by every acquisition on one lock.
#[derive(Clone, Debug)]
pub struct Config {
    pub retry_limit: RetryLimit,
    pub policy: FailurePolicy,
    pub poll_interval: Duration,
    pub acquire_mode: AcquireMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry_limit: RetryLimit::Unbounded,
            policy: FailurePolicy::Log,
            poll_interval: DEFAULT_POLL_INTERVAL,
            acquire_mode: AcquireMode::Spawned,
        }
    }
}

impl Config {
    /// `retry_limit <= 0` waits forever. `abort_on_failure` picks
    /// [`FailurePolicy::Exit`] over [`FailurePolicy::Log`].
    pub fn new(retry_limit: i64, abort_on_failure: bool) -> Self {
        Self {
            retry_limit: RetryLimit::from(retry_limit),
            policy: FailurePolicy::from_abort_flag(abort_on_failure),
            ..Self::default()
        }
    }

    pub fn retry_limit(mut self, retry_limit: impl Into<RetryLimit>) -> Self {
        self.retry_limit = retry_limit.into();
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Clamped to at least [`MIN_POLL_INTERVAL`].
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn acquire_mode(mut self, acquire_mode: AcquireMode) -> Self {
        self.acquire_mode = acquire_mode;
        self
    }

    /// Wall time after which the failure policy fires, if it ever does.
    pub fn threshold(&self) -> Option<Duration> {
        self.retry_limit
            .get()
            .map(|limit| self.poll_interval.saturating_mul(limit))
    }

    /// Defaults overridden by `LOCKWATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Like [`Config::from_env`], reading variables through `lookup`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = non_empty(lookup(ENV_RETRY_LIMIT)) {
            let retries: i64 = value.parse().map_err(|_| ConfigError::InvalidValue {
                var: ENV_RETRY_LIMIT,
                value: value.clone(),
                expected: "integer",
            })?;
            config.retry_limit = RetryLimit::from(retries);
        }
        if let Some(value) = non_empty(lookup(ENV_FAILURE_POLICY)) {
            config.policy = value.parse()?;
        }
        if let Some(value) = non_empty(lookup(ENV_POLL_INTERVAL_MS)) {
            let millis = value
                .parse::<u64>()
                .ok()
                .filter(|millis| *millis > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    var: ENV_POLL_INTERVAL_MS,
                    value: value.clone(),
                    expected: "positive number of milliseconds",
                })?;
            config.poll_interval = Duration::from_millis(millis);
        }
        if let Some(value) = non_empty(lookup(ENV_ACQUIRE_MODE)) {
            config.acquire_mode = value.parse()?;
        }

        #[cfg(not(feature = "diagnostics"))]
        warn_settings_ignored(&lookup);

        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(not(feature = "diagnostics"))]
fn warn_settings_ignored(lookup: &impl Fn(&str) -> Option<String>) {
    static WARNED: std::sync::Once = std::sync::Once::new();

    let any_set = [
        ENV_RETRY_LIMIT,
        ENV_FAILURE_POLICY,
        ENV_POLL_INTERVAL_MS,
        ENV_ACQUIRE_MODE,
    ]
    .into_iter()
    .any(|key| non_empty(lookup(key)).is_some());

    if any_set {
        WARNED.call_once(|| {
            tracing::warn!(
                target: "lockwatch",
                "LOCKWATCH_* settings are set, but the `diagnostics` feature of lockwatch is \
                 disabled; locks will not report stalls in this build"
            );
        });
    }
}
