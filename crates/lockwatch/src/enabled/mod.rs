use std::backtrace::Backtrace;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use tracing::{Level, trace, warn};

use crate::{AcquireMode, CallSite, Config, HolderSlot, StallWatch, holder_label};


type OwnedGuard<T> = ArcMutexGuard<RawMutex, T>;

/// A `parking_lot::Mutex` that reports stalled acquisitions.
///
/// See the [crate-level](crate) documentation for the reporting protocol.
/// Locking is not reentrant: locking twice from one thread stalls like any
/// other contended acquisition, and is reported as such.
pub struct DiagnosticMutex<T> {
    name: &'static str,
    inner: Arc<Mutex<T>>,
    holder: HolderSlot,
    config: Config,
}

impl<T> DiagnosticMutex<T> {
    /// `retry_limit <= 0` waits forever; otherwise, once more than
    /// `retry_limit` one-second stalls have elapsed, the process exits
    /// (`abort_on_failure`) or an error is logged on every further stall.
    pub fn new(name: &'static str, value: T, retry_limit: i64, abort_on_failure: bool) -> Self {
        Self::with_config(name, value, Config::new(retry_limit, abort_on_failure))
    }

    pub fn with_config(name: &'static str, value: T, config: Config) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(value)),
            holder: HolderSlot::new(),
            config,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Where the current holder acquired the lock, `None` when unlocked.
    pub fn holder(&self) -> Option<CallSite> {
        self.holder.snapshot()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    fn release(&self, released_at: Option<CallSite>) {
        let locked_at = self.holder.clear();
        trace!(
            target: "lockwatch",
            lock = self.name,
            "release lock locked at {}, at {}",
            holder_label(&locked_at),
            released_at
                .as_ref()
                .map_or("<guard drop>", CallSite::as_str)
        );
    }
}

impl<T: Send + 'static> DiagnosticMutex<T> {
    /// Blocks until the lock is acquired, reporting every poll interval spent
    /// waiting. Never gives up on its own; only the failure policy can end
    /// the wait early.
    #[track_caller]
    pub fn lock(&self) -> DiagnosticMutexGuard<'_, T> {
        self.lock_with_source(CallSite::caller())
    }

    pub fn lock_with_source(&self, site: CallSite) -> DiagnosticMutexGuard<'_, T> {
        trace!(target: "lockwatch", lock = self.name, "attempting lock acquisition at {site}");

        let guard = match self.inner.try_lock_arc() {
            Some(guard) => guard,
            None => match self.config.acquire_mode {
                AcquireMode::Spawned => self.acquire_spawned(&site),
                AcquireMode::Polling => self.acquire_polling(&site),
            },
        };

        if tracing::enabled!(target: "lockwatch", Level::TRACE) {
            let backtrace = Backtrace::force_capture();
            trace!(target: "lockwatch", lock = self.name, "lock acquired at {site}\n{backtrace}");
        }
        self.holder.record(site.clone());

        DiagnosticMutexGuard {
            mutex: self,
            guard,
            locked_at: site,
            released_at: None,
        }
    }

    fn acquire_spawned(&self, site: &CallSite) -> OwnedGuard<T> {
        let (tx, rx) = mpsc::sync_channel::<OwnedGuard<T>>(1);
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("lockwatch:{}", self.name))
            .spawn(move || {
                let guard = inner.lock_arc();
                // A waiter that gave up dropped `rx`; the guard comes back in
                // the error and is released here.
                let _ = tx.send(guard);
            });
        if let Err(e) = spawned {
            warn!(
                target: "lockwatch",
                lock = self.name,
                %e,
                "failed to spawn acquisition thread, falling back to polling"
            );
            return self.acquire_polling(site);
        }

        let mut watch = StallWatch::new(self.name, site, &self.holder, &self.config);
        loop {
            match rx.recv_timeout(self.config.poll_interval) {
                Ok(guard) => return guard,
                Err(RecvTimeoutError::Timeout) => watch.stalled(),
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(
                        target: "lockwatch",
                        lock = self.name,
                        "acquisition thread exited without the lock, falling back to polling"
                    );
                    return self.acquire_polling(site);
                }
            }
        }
    }

    fn acquire_polling(&self, site: &CallSite) -> OwnedGuard<T> {
        let mut watch = StallWatch::new(self.name, site, &self.holder, &self.config);
        loop {
            if let Some(guard) = self.inner.try_lock_arc_for(self.config.poll_interval) {
                return guard;
            }
            watch.stalled();
        }
    }
}

impl<T: Default> Default for DiagnosticMutex<T> {
    fn default() -> Self {
        Self::with_config("unnamed", T::default(), Config::default())
    }
}

impl<T> fmt::Debug for DiagnosticMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticMutex")
            .field("name", &self.name)
            .field("holder", &self.holder.snapshot())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a [`DiagnosticMutex`]; the lock is released on drop.
///
/// Prefer [`DiagnosticMutexGuard::unlock`] over an implicit drop: it records
/// the releasing call site in the release event.
#[must_use = "if unused the DiagnosticMutex will immediately unlock"]
pub struct DiagnosticMutexGuard<'a, T> {
    mutex: &'a DiagnosticMutex<T>,
    guard: OwnedGuard<T>,
    locked_at: CallSite,
    released_at: Option<CallSite>,
}

impl<T> DiagnosticMutexGuard<'_, T> {
    #[track_caller]
    pub fn unlock(mut self) {
        self.released_at = Some(CallSite::caller());
    }

    /// The call site that acquired this guard.
    pub fn locked_at(&self) -> &CallSite {
        &self.locked_at
    }
}

impl<T> Deref for DiagnosticMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for DiagnosticMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

// Runs before the `guard` field drops, so the holder is cleared while the
// lock is still held.
impl<T> Drop for DiagnosticMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.release(self.released_at.take());
    }
}

impl<T: fmt::Debug> fmt::Debug for DiagnosticMutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.guard, f)
    }
}
