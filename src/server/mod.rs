/// Server lifecycle tracking for fox.
///
/// Every operation the [`ServerController`](crate::ServerController)
/// dispatches moves a server through the state machine below, and each
/// transition is recorded here:
///
/// ```text
/// idle ──start──▶ starting ──▶ running | failed
/// running ──stop──▶ stopping ──▶ stopped | failed
/// running ──restart/reload──▶ reloading ──▶ running | failed
/// ```
///
/// # Examples
///
/// ```
/// use fox::server::{ServerLifecycleEvent, ServerLifecycleManager, ServerStatus};
///
/// let manager = ServerLifecycleManager::new();
/// manager.record_event("shop", ServerLifecycleEvent::Starting, None).unwrap();
/// manager.record_event("shop", ServerLifecycleEvent::Started, None).unwrap();
/// assert_eq!(manager.get_status("shop").unwrap(), ServerStatus::Running);
/// ```
pub mod lifecycle;

pub use lifecycle::{ServerEvent, ServerLifecycleEvent, ServerLifecycleManager, ServerStatus};
