pub mod async_stall;
pub mod exit_on_deadlock;
pub mod panic_on_deadlock;
pub mod stall_then_recover;

use std::time::Duration;

/// How long holders in the recovering scenarios keep their lock.
pub(crate) const HOLD: Duration = Duration::from_secs(4);
