use lockwatch::{Config, DiagnosticMutex, FailurePolicy, PossibleDeadlock};
use std::panic::{self, AssertUnwindSafe};

use crate::AnyResult;

pub fn run(retry_limit: i64) -> AnyResult<()> {
    let registry = DiagnosticMutex::with_config(
        "demo.registry",
        (),
        Config::new(retry_limit, false).policy(FailurePolicy::Panic),
    );

    let first = registry.lock();
    println!("locked demo.registry; locking it again from the same thread should panic");

    let payload = match panic::catch_unwind(AssertUnwindSafe(|| registry.lock().unlock())) {
        Ok(()) => return Err("second lock of demo.registry unexpectedly succeeded".to_owned()),
        Err(payload) => payload,
    };
    let failure = PossibleDeadlock::from_panic_payload(payload.as_ref())
        .ok_or_else(|| "second lock panicked with an unexpected payload".to_owned())?;
    println!("recovered: {failure}");

    first.unlock();
    registry.lock().unlock();
    println!("demo.registry is usable again after the holder released it");
    Ok(())
}
