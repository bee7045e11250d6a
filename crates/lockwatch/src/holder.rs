use parking_lot::RwLock;

use crate::CallSite;

const UNKNOWN_HOLDER: &str = "<unknown>";

/// Where the current holder of a lock acquired it.
///
/// Guarded by its own reader/writer lock, never by the lock it describes, so
/// stalled waiters can always read it while the primary lock is contended.
/// Snapshots may lag behind the primary lock by one transition.
#[derive(Default)]
pub struct HolderSlot(RwLock<Option<CallSite>>);

impl HolderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<CallSite> {
        self.0.read().clone()
    }

    pub fn record(&self, site: CallSite) {
        *self.0.write() = Some(site);
    }

    /// Clears the slot, returning the site that was recorded.
    pub fn clear(&self) -> Option<CallSite> {
        self.0.write().take()
    }
}

impl std::fmt::Debug for HolderSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HolderSlot").field(&self.snapshot()).finish()
    }
}

/// Renders an optional holder for log lines and failure messages.
pub fn holder_label(holder: &Option<CallSite>) -> &str {
    holder.as_ref().map_or(UNKNOWN_HOLDER, CallSite::as_str)
}
