use fox::error::Result;
use fox::server::{ServerLifecycleEvent, ServerLifecycleManager, ServerStatus};

#[test]
fn test_unknown_server_is_idle() -> Result<()> {
    let manager = ServerLifecycleManager::new();

    assert_eq!(manager.get_status("shop")?, ServerStatus::Idle);
    assert!(manager.get_server_events("shop", None)?.is_empty());

    Ok(())
}

#[test]
fn test_server_lifecycle() -> Result<()> {
    let manager = ServerLifecycleManager::new();

    manager.record_event("shop", ServerLifecycleEvent::Starting, None)?;
    assert_eq!(manager.get_status("shop")?, ServerStatus::Starting);

    manager.record_event("shop", ServerLifecycleEvent::Started, None)?;
    assert_eq!(manager.get_status("shop")?, ServerStatus::Running);

    manager.record_event("shop", ServerLifecycleEvent::Reloading, None)?;
    assert_eq!(manager.get_status("shop")?, ServerStatus::Reloading);

    manager.record_event("shop", ServerLifecycleEvent::Reloaded, None)?;
    assert_eq!(manager.get_status("shop")?, ServerStatus::Running);

    manager.record_event("shop", ServerLifecycleEvent::Stopping, None)?;
    manager.record_event("shop", ServerLifecycleEvent::Stopped, None)?;
    assert_eq!(manager.get_status("shop")?, ServerStatus::Stopped);

    let events = manager.get_server_events("shop", None)?;
    assert_eq!(events.len(), 6);
    assert_eq!(events[0].event, ServerLifecycleEvent::Starting);
    assert_eq!(events[5].event, ServerLifecycleEvent::Stopped);

    Ok(())
}

#[test]
fn test_failure_details_and_limits() -> Result<()> {
    let manager = ServerLifecycleManager::new();

    manager.record_event("shop", ServerLifecycleEvent::Starting, None)?;
    manager.record_event(
        "shop",
        ServerLifecycleEvent::Failed,
        Some("Server 'shop' is already started".to_string()),
    )?;
    manager.record_event("blog", ServerLifecycleEvent::Starting, None)?;

    assert_eq!(manager.get_status("shop")?, ServerStatus::Failed);
    assert_eq!(manager.get_status("blog")?, ServerStatus::Starting);

    let last = manager.get_server_events("shop", Some(1))?;
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].event, ServerLifecycleEvent::Failed);
    assert_eq!(
        last[0].details.as_deref(),
        Some("Server 'shop' is already started")
    );

    manager.clear_events()?;
    assert!(manager.get_server_events("shop", None)?.is_empty());
    // Statuses survive clearing the history
    assert_eq!(manager.get_status("shop")?, ServerStatus::Failed);

    Ok(())
}
