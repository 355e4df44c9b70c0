#![cfg(unix)]

use fox::error::{Error, Result};
use fox::process::{
    ChildProcessRegistry, CommandRunner, Invocation, OsSignaller, RegistryCommandRunner,
    Signaller, SpawnOptions, TerminationSignal, TerminationState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn sleeper() -> SpawnOptions {
    SpawnOptions::new("sleep").arg("30")
}

fn shell(script: &str) -> SpawnOptions {
    SpawnOptions::new("sh").args(["-c", script]).capture(true)
}

/// Fails delivery for the second process it is asked to signal, but still
/// kills it so its close event arrives.
struct FlakySignaller {
    calls: AtomicUsize,
}

impl Signaller for FlakySignaller {
    fn send(&self, pid: u32, signal: TerminationSignal) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
            OsSignaller.send(pid, TerminationSignal::Kill)?;
            return Err(Error::SignalDelivery {
                pid,
                reason: "simulated failure".to_string(),
            });
        }
        OsSignaller.send(pid, signal)
    }
}

#[tokio::test]
async fn test_kill_all_empties_registry() -> Result<()> {
    let registry = ChildProcessRegistry::new();
    let handles = vec![
        registry.spawn(sleeper())?,
        registry.spawn(sleeper())?,
        registry.spawn(sleeper())?,
    ];
    assert_eq!(registry.len(), 3);

    let report = registry.kill_all(TerminationSignal::Terminate).await;

    assert_eq!(report.signaled, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.closed, 3);
    assert!(registry.is_empty());
    for handle in &handles {
        assert_eq!(handle.termination_state(), TerminationState::Closed);
        assert!(!handle.exit().map(|e| e.success).unwrap_or(true));
    }

    Ok(())
}

#[tokio::test]
async fn test_kill_all_continues_past_failed_signal() -> Result<()> {
    let registry = ChildProcessRegistry::with_signaller(Arc::new(FlakySignaller {
        calls: AtomicUsize::new(0),
    }));
    for _ in 0..3 {
        registry.spawn(sleeper())?;
    }

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        registry.kill_all(TerminationSignal::Terminate),
    )
    .await
    .expect("kill_all hung");

    assert_eq!(report.signaled, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.closed, 3);
    assert!(registry.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_kill_all_with_nothing_registered() {
    let registry = ChildProcessRegistry::new();
    let report = registry.kill_all(TerminationSignal::Interrupt).await;
    assert_eq!(report, Default::default());
}

#[tokio::test]
async fn test_process_leaves_registry_on_exit() -> Result<()> {
    let registry = ChildProcessRegistry::new();
    let handle = registry.spawn(shell("echo Listening on port 8080"))?;

    handle.wait_for_output("Listening on port").await?;
    let exit = handle.wait_closed().await;

    assert_eq!(exit.code, Some(0));
    assert!(exit.success);
    assert!(!registry.contains(&handle));
    // Exited on its own, never signalled
    assert_eq!(handle.termination_state(), TerminationState::Closed);
    assert_eq!(handle.stdout(), "Listening on port 8080\n");

    Ok(())
}

#[tokio::test]
async fn test_wait_for_output_fails_when_process_exits_first() -> Result<()> {
    let registry = ChildProcessRegistry::new();
    let handle = registry.spawn(shell("echo booting; echo broken >&2; exit 3"))?;

    let result = handle.wait_for_output("Listening on port").await;

    assert!(matches!(result, Err(Error::Process(_))));
    assert_eq!(handle.exit().and_then(|e| e.code), Some(3));
    assert_eq!(handle.stderr(), "broken\n");

    Ok(())
}

#[tokio::test]
async fn test_remove_is_idempotent() -> Result<()> {
    let registry = ChildProcessRegistry::new();
    let handle = registry.spawn(sleeper())?;

    assert!(registry.remove(&handle));
    assert!(!registry.remove(&handle));
    assert!(registry.is_empty());

    // Removed handles can still be signalled directly
    registry.signal(&handle, TerminationSignal::Kill)?;
    assert_eq!(handle.termination_state(), TerminationState::SignalSent);
    handle.wait_closed().await;
    assert!(handle.is_closed());

    Ok(())
}

#[tokio::test]
async fn test_fork_message_channel() -> Result<()> {
    let registry = ChildProcessRegistry::new();
    let handle = registry.fork(shell("read line; echo got $line"))?;
    assert!(handle.has_message_channel().await);

    handle.send_message("rs").await?;
    handle.wait_closed().await;

    assert_eq!(handle.stdout(), "got rs\n");

    Ok(())
}

#[tokio::test]
async fn test_spawned_process_has_no_message_channel() -> Result<()> {
    let registry = ChildProcessRegistry::new();
    let handle = registry.spawn(sleeper())?;

    assert!(!handle.has_message_channel().await);
    assert!(matches!(
        handle.send_message("rs").await,
        Err(Error::Process(_))
    ));

    registry.kill_all(TerminationSignal::Kill).await;
    Ok(())
}

#[tokio::test]
async fn test_wait_idle() -> Result<()> {
    let registry = ChildProcessRegistry::new();
    registry.spawn(shell("sleep 0.1"))?;
    registry.spawn(shell("sleep 0.2"))?;

    tokio::time::timeout(Duration::from_secs(10), registry.wait_idle())
        .await
        .expect("registry never became idle");
    assert!(registry.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_spawn_missing_program() {
    let registry = ChildProcessRegistry::new();
    let result = registry.spawn(SpawnOptions::new("fox-no-such-program"));

    assert!(matches!(result, Err(Error::Process(_))));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_registry_command_runner() -> Result<()> {
    let registry = ChildProcessRegistry::new();
    let runner = RegistryCommandRunner::new(registry.clone());

    let invocation = Invocation::new("sh", ["-c", "echo out; echo err >&2; exit 2"])
        .with_env(vec![("FOX_TEST".to_string(), "1".to_string())]);
    let output = runner.run(&invocation).await?;

    assert_eq!(output.code, Some(2));
    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
    assert!(registry.is_empty());

    let err = output.check(&invocation).unwrap_err();
    assert!(err.to_string().contains("exited with status 2: err"));

    let env = Invocation::new("sh", ["-c", "echo $FOX_TEST"])
        .with_env(vec![("FOX_TEST".to_string(), "yes".to_string())]);
    assert_eq!(runner.run(&env).await?.stdout, "yes\n");

    Ok(())
}

#[tokio::test]
async fn test_passthrough_command_keeps_no_output() -> Result<()> {
    let registry = ChildProcessRegistry::new();
    let runner = RegistryCommandRunner::new(registry.clone());

    // Stands in for `pm2 logs`: output goes to the terminal, nothing is buffered
    let invocation =
        Invocation::new("sh", ["-c", "echo following; echo warning >&2"]).passthrough();
    assert!(!invocation.capture);
    let output = runner.run(&invocation).await?;

    assert_eq!(output.code, Some(0));
    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty());
    assert!(registry.is_empty());
    Ok(())
}
