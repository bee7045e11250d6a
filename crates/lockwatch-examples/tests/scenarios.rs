use std::process::{Command, Output};

fn run_scenario(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lockwatch-examples"))
        .args(args)
        .env("RUST_LOG", "lockwatch=error")
        .output()
        .expect("failed to run lockwatch-examples")
}

#[test]
fn exit_on_deadlock_terminates_with_status_one() {
    let output = run_scenario(&["exit-on-deadlock"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1), "stderr:\n{stderr}");
    assert!(stderr.contains("Possible deadlock"), "stderr:\n{stderr}");
    assert!(
        stderr.contains("stalled acquisition stack"),
        "stderr:\n{stderr}"
    );
}

#[test]
fn panic_on_deadlock_is_recovered_in_process() {
    let output = run_scenario(&["panic-on-deadlock"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "stderr:\n{stderr}");
    assert!(
        stdout.contains("recovered: Possible deadlock"),
        "stdout:\n{stdout}"
    );
    assert!(stdout.contains("usable again"), "stdout:\n{stdout}");
}

#[test]
fn stall_then_recover_reports_and_acquires() {
    let output = run_scenario(&["stall-then-recover"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "stderr:\n{stderr}");
    assert!(stderr.contains("Possible deadlock"), "stderr:\n{stderr}");
    assert!(
        stdout.contains("waiter acquired demo.ledger"),
        "stdout:\n{stdout}"
    );
}

#[test]
fn async_stall_reports_and_acquires() {
    let output = run_scenario(&["async-stall"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "stderr:\n{stderr}");
    assert!(stderr.contains("Possible deadlock"), "stderr:\n{stderr}");
    assert!(
        stdout.contains("waiter task acquired demo.queue"),
        "stdout:\n{stdout}"
    );
}
