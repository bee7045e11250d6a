use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::{CallSite, Config};

/// Pass-through `parking_lot::Mutex` wrapper, keeping the diagnostic API for parity.
pub struct DiagnosticMutex<T> {
    name: &'static str,
    inner: parking_lot::Mutex<T>,
    config: Config,
}

impl<T> DiagnosticMutex<T> {
    #[inline]
    pub fn new(name: &'static str, value: T, retry_limit: i64, abort_on_failure: bool) -> Self {
        Self::with_config(name, value, Config::new(retry_limit, abort_on_failure))
    }

    #[inline]
    pub fn with_config(name: &'static str, value: T, config: Config) -> Self {
        Self {
            name,
            inner: parking_lot::Mutex::new(value),
            config,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Holders are not tracked in this build.
    pub fn holder(&self) -> Option<CallSite> {
        None
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

// Bounds match the diagnostic build.
impl<T: Send + 'static> DiagnosticMutex<T> {
    #[inline]
    pub fn lock(&self) -> DiagnosticMutexGuard<'_, T> {
        DiagnosticMutexGuard(self.inner.lock())
    }

    #[inline]
    pub fn lock_with_source(&self, _site: CallSite) -> DiagnosticMutexGuard<'_, T> {
        self.lock()
    }
}

impl<T: Default> Default for DiagnosticMutex<T> {
    fn default() -> Self {
        Self::with_config("unnamed", T::default(), Config::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for DiagnosticMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

#[must_use = "if unused the DiagnosticMutex will immediately unlock"]
pub struct DiagnosticMutexGuard<'a, T>(parking_lot::MutexGuard<'a, T>);

impl<T> DiagnosticMutexGuard<'_, T> {
    #[inline]
    pub fn unlock(self) {}
}

impl<T> Deref for DiagnosticMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for DiagnosticMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for DiagnosticMutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}
