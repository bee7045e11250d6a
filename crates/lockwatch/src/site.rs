use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Human-readable identity of the code that locked or is waiting on a lock.
///
/// Usually `file:line` of the caller, captured through `#[track_caller]`.
/// Any label can be injected with [`CallSite::new`], which keeps callers that
/// wrap the lock (and tests) independent of real stack frames.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CallSite(Arc<str>);

impl CallSite {
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self(label.into())
    }

    /// The location of the caller of the function this is invoked from.
    #[track_caller]
    pub fn caller() -> Self {
        Self::from_location(Location::caller())
    }

    pub fn from_location(location: &Location<'_>) -> Self {
        Self(format!("{}:{}", location.file(), location.line()).into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl From<&'static Location<'static>> for CallSite {
    fn from(location: &'static Location<'static>) -> Self {
        Self::from_location(location)
    }
}
