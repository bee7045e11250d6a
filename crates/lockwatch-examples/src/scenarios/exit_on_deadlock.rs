use lockwatch::DiagnosticMutex;

use crate::AnyResult;

pub fn run(retry_limit: i64) -> AnyResult<()> {
    let registry = DiagnosticMutex::new("demo.registry", (), retry_limit, true);

    let first = registry.lock();
    println!(
        "locked demo.registry at {}; locking it again from the same thread, the process should exit",
        first.locked_at()
    );
    let _second = registry.lock();

    Err("second lock of demo.registry unexpectedly succeeded".to_owned())
}
