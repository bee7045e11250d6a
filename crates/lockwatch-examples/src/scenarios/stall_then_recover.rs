use lockwatch::DiagnosticMutex;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use super::HOLD;
use crate::AnyResult;

pub fn run(retry_limit: i64) -> AnyResult<()> {
    let ledger = Arc::new(DiagnosticMutex::new(
        "demo.ledger",
        Vec::<u64>::new(),
        retry_limit,
        false,
    ));
    let (locked_tx, locked_rx) = mpsc::channel::<()>();

    let holder = thread::Builder::new()
        .name("demo.holder".to_owned())
        .spawn({
            let ledger = Arc::clone(&ledger);
            move || {
                let mut guard = ledger.lock();
                guard.push(1);
                let _ = locked_tx.send(());
                println!("holder locked demo.ledger; releasing in {HOLD:?}");
                thread::sleep(HOLD);
                guard.unlock();
            }
        })
        .map_err(|e| format!("failed to spawn holder thread: {e}"))?;

    locked_rx
        .recv()
        .map_err(|e| format!("holder thread never locked demo.ledger: {e}"))?;

    println!(
        "waiter attempting demo.ledger; expect a stall report every second and a possible-deadlock error past {retry_limit} stall(s)"
    );
    let mut guard = ledger.lock();
    guard.push(2);
    println!("waiter acquired demo.ledger after the holder released it: {:?}", *guard);
    guard.unlock();

    holder
        .join()
        .map_err(|_| "holder thread panicked".to_owned())
}
