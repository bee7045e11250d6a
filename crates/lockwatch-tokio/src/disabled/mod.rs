use std::fmt;
use std::ops::{Deref, DerefMut};

use lockwatch::{CallSite, Config};

/// Pass-through `tokio::sync::Mutex` wrapper, keeping the diagnostic API for parity.
pub struct AsyncDiagnosticMutex<T> {
    name: &'static str,
    inner: tokio::sync::Mutex<T>,
    config: Config,
}

impl<T> AsyncDiagnosticMutex<T> {
    #[inline]
    pub fn new(name: &'static str, value: T, retry_limit: i64, abort_on_failure: bool) -> Self {
        Self::with_config(name, value, Config::new(retry_limit, abort_on_failure))
    }

    #[inline]
    pub fn with_config(name: &'static str, value: T, config: Config) -> Self {
        Self {
            name,
            inner: tokio::sync::Mutex::new(value),
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
        None
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

// Bounds match the diagnostic build.
impl<T: Send + 'static> AsyncDiagnosticMutex<T> {
    #[inline]
    pub async fn lock(&self) -> AsyncDiagnosticMutexGuard<'_, T> {
        AsyncDiagnosticMutexGuard(self.inner.lock().await)
    }

    #[inline]
    pub async fn lock_with_source(&self, _site: CallSite) -> AsyncDiagnosticMutexGuard<'_, T> {
        self.lock().await
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncDiagnosticMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

#[must_use = "if unused the AsyncDiagnosticMutex will immediately unlock"]
pub struct AsyncDiagnosticMutexGuard<'a, T>(tokio::sync::MutexGuard<'a, T>);

impl<T> AsyncDiagnosticMutexGuard<'_, T> {
    #[inline]
    pub fn unlock(self) {}
}

impl<T> Deref for AsyncDiagnosticMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for AsyncDiagnosticMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncDiagnosticMutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}
