use std::backtrace::Backtrace;

use tracing::error;

use crate::{CallSite, Config, HolderSlot, PossibleDeadlock, holder_label};

/// Stall bookkeeping for a single pending acquisition.
///
/// The waiting side calls [`StallWatch::stalled`] every time a poll interval
/// elapses without the lock being handed over. Both the blocking and the
/// async mutex drive the same watch, so they report identically.
pub struct StallWatch<'a> {
    lock: &'static str,
    waiter: &'a CallSite,
    holder: &'a HolderSlot,
    config: &'a Config,
    stalls: u32,
}

impl<'a> StallWatch<'a> {
    pub fn new(
        lock: &'static str,
        waiter: &'a CallSite,
        holder: &'a HolderSlot,
        config: &'a Config,
    ) -> Self {
        Self {
            lock,
            waiter,
            holder,
            config,
            stalls: 0,
        }
    }

    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    /// Records one elapsed interval and reports it.
    ///
    /// Past the retry limit this hands a [`PossibleDeadlock`] to the failure
    /// policy, which may not return. The holder slot is only read for the
    /// snapshot; it is not held while the policy runs.
    pub fn stalled(&mut self) {
        let holder = self.holder.snapshot();
        self.stalls = self.stalls.saturating_add(1);

        if !self.config.retry_limit.is_exceeded_by(self.stalls) {
            error!(
                target: "lockwatch",
                lock = self.lock,
                stalls = self.stalls,
                "lock is stuck at {}, waiting for lock from {}",
                self.waiter,
                holder_label(&holder)
            );
            return;
        }

        let backtrace = Backtrace::force_capture();
        error!(
            target: "lockwatch",
            lock = self.lock,
            at = %self.waiter,
            "stalled acquisition stack:\n{backtrace}"
        );

        self.config.policy.trigger(PossibleDeadlock {
            lock: self.lock,
            waiter: self.waiter.clone(),
            holder,
            stalls: self.stalls,
            threshold: self.config.threshold().unwrap_or_default(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::FailurePolicy;

    fn recording_config(retry_limit: i64) -> (Config, Arc<Mutex<Vec<PossibleDeadlock>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let config = Config::default()
            .retry_limit(retry_limit)
            .poll_interval(Duration::from_millis(500))
            .policy(FailurePolicy::custom(move |f| sink.lock().push(f.clone())));
        (config, seen)
    }

    #[test]
    fn policy_fires_on_every_stall_past_the_limit() {
        let (config, seen) = recording_config(2);
        let waiter = CallSite::new("waiter.rs:1");
        let holder = HolderSlot::new();
        holder.record(CallSite::new("holder.rs:9"));

        let mut watch = StallWatch::new("test.watch", &waiter, &holder, &config);
        for _ in 0..5 {
            watch.stalled();
        }

        assert_eq!(watch.stalls(), 5);
        let seen = seen.lock();
        let stalls: Vec<u32> = seen.iter().map(|f| f.stalls).collect();
        assert_eq!(stalls, vec![3, 4, 5]);
        assert_eq!(seen[0].holder, Some(CallSite::new("holder.rs:9")));
        assert_eq!(seen[0].waiter, waiter);
        assert_eq!(seen[0].threshold, Duration::from_secs(1));
    }

    #[test]
    fn unbounded_limit_never_fires() {
        let (config, seen) = recording_config(0);
        let waiter = CallSite::new("waiter.rs:1");
        let holder = HolderSlot::new();

        let mut watch = StallWatch::new("test.watch", &waiter, &holder, &config);
        for _ in 0..100 {
            watch.stalled();
        }

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn snapshot_tracks_holder_changes_between_stalls() {
        let (config, seen) = recording_config(1);
        let waiter = CallSite::new("waiter.rs:1");
        let holder = HolderSlot::new();

        let mut watch = StallWatch::new("test.watch", &waiter, &holder, &config);
        watch.stalled();
        watch.stalled();
        holder.record(CallSite::new("late.rs:3"));
        watch.stalled();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].holder, None);
        assert_eq!(seen[1].holder, Some(CallSite::new("late.rs:3")));
    }
}
