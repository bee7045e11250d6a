use lockwatch_tokio::AsyncDiagnosticMutex;
use std::sync::Arc;
use tokio::sync::oneshot;

use super::HOLD;
use crate::AnyResult;

pub async fn run(retry_limit: i64) -> AnyResult<()> {
    let queue = Arc::new(AsyncDiagnosticMutex::new(
        "demo.queue",
        Vec::<&'static str>::new(),
        retry_limit,
        false,
    ));
    let (locked_tx, locked_rx) = oneshot::channel::<()>();

    let holder = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move {
            let mut guard = queue.lock().await;
            guard.push("holder");
            let _ = locked_tx.send(());
            println!("holder task locked demo.queue; releasing in {HOLD:?}");
            tokio::time::sleep(HOLD).await;
            guard.unlock();
        }
    });

    locked_rx
        .await
        .map_err(|e| format!("holder task never locked demo.queue: {e}"))?;

    println!("waiter task attempting demo.queue; expect a stall report every second");
    let mut guard = queue.lock().await;
    guard.push("waiter");
    println!("waiter task acquired demo.queue: {:?}", *guard);
    guard.unlock();

    holder
        .await
        .map_err(|e| format!("holder task failed: {e}"))
}
