use std::backtrace::Backtrace;
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use lockwatch::{AcquireMode, CallSite, Config, HolderSlot, StallWatch, holder_label};
use tokio::sync::{Mutex, OwnedMutexGuard, oneshot};
use tracing::{Level, trace, warn};


/// A `tokio::sync::Mutex` that reports stalled acquisitions.
///
/// Same reporting protocol as [`lockwatch::DiagnosticMutex`]: every poll
/// interval spent waiting is logged with the current holder, and the failure
/// policy fires once the retry limit is exceeded. A [`FailurePolicy::Panic`]
/// unwinds the task awaiting the lock.
///
/// [`FailurePolicy::Panic`]: lockwatch::FailurePolicy::Panic
pub struct AsyncDiagnosticMutex<T> {
    name: &'static str,
    inner: Arc<Mutex<T>>,
    holder: HolderSlot,
    config: Config,
}

impl<T> AsyncDiagnosticMutex<T> {
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

    pub fn holder(&self) -> Option<CallSite> {
        self.holder.snapshot()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
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

impl<T: Send + 'static> AsyncDiagnosticMutex<T> {
    /// Waits for the lock, reporting every poll interval spent waiting.
    ///
    /// The call site is captured when `lock` is called, not when the future
    /// is first polled. Dropping the future gives up the wait; in
    /// [`AcquireMode::Spawned`] the background task still acquires the lock
    /// once and releases it right away.
    #[track_caller]
    pub fn lock(&self) -> impl Future<Output = AsyncDiagnosticMutexGuard<'_, T>> + '_ {
        self.lock_with_source(CallSite::caller())
    }

    pub async fn lock_with_source(&self, site: CallSite) -> AsyncDiagnosticMutexGuard<'_, T> {
        trace!(target: "lockwatch", lock = self.name, "attempting lock acquisition at {site}");

        let guard = match Arc::clone(&self.inner).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => match self.config.acquire_mode {
                AcquireMode::Spawned => self.acquire_spawned(&site).await,
                AcquireMode::Polling => self.acquire_polling(&site).await,
            },
        };

        if tracing::enabled!(target: "lockwatch", Level::TRACE) {
            let backtrace = Backtrace::force_capture();
            trace!(target: "lockwatch", lock = self.name, "lock acquired at {site}\n{backtrace}");
        }
        self.holder.record(site.clone());

        AsyncDiagnosticMutexGuard {
            mutex: self,
            guard,
            locked_at: site,
            released_at: None,
        }
    }

    async fn acquire_spawned(&self, site: &CallSite) -> OwnedMutexGuard<T> {
        let (tx, mut rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let guard = inner.lock_owned().await;
            // Fails only if the waiter is gone; the guard is dropped with the
            // error, releasing the lock.
            let _ = tx.send(guard);
        });

        let mut watch = StallWatch::new(self.name, site, &self.holder, &self.config);
        loop {
            tokio::select! {
                acquired = &mut rx => match acquired {
                    Ok(guard) => return guard,
                    Err(_) => {
                        warn!(
                            target: "lockwatch",
                            lock = self.name,
                            "acquisition task ended without the lock, falling back to polling"
                        );
                        return self.acquire_polling(site).await;
                    }
                },
                _ = tokio::time::sleep(self.config.poll_interval) => watch.stalled(),
            }
        }
    }

    async fn acquire_polling(&self, site: &CallSite) -> OwnedMutexGuard<T> {
        let mut watch = StallWatch::new(self.name, site, &self.holder, &self.config);
        loop {
            let attempt = Arc::clone(&self.inner).lock_owned();
            match tokio::time::timeout(self.config.poll_interval, attempt).await {
                Ok(guard) => return guard,
                Err(_) => watch.stalled(),
            }
        }
    }
}

impl<T> fmt::Debug for AsyncDiagnosticMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDiagnosticMutex")
            .field("name", &self.name)
            .field("holder", &self.holder.snapshot())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to an [`AsyncDiagnosticMutex`]; released on drop.
#[must_use = "if unused the AsyncDiagnosticMutex will immediately unlock"]
pub struct AsyncDiagnosticMutexGuard<'a, T> {
    mutex: &'a AsyncDiagnosticMutex<T>,
    guard: OwnedMutexGuard<T>,
    locked_at: CallSite,
    released_at: Option<CallSite>,
}

impl<T> AsyncDiagnosticMutexGuard<'_, T> {
    #[track_caller]
    pub fn unlock(mut self) {
        self.released_at = Some(CallSite::caller());
    }

    pub fn locked_at(&self) -> &CallSite {
        &self.locked_at
    }
}

impl<T> Deref for AsyncDiagnosticMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for AsyncDiagnosticMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for AsyncDiagnosticMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.release(self.released_at.take());
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncDiagnosticMutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.guard, f)
    }
}
