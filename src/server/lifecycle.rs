use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Limit on remembered events.
const MAX_EVENTS: usize = 1000;

/// Status of a managed server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerStatus {
    /// Nothing has been done yet
    #[default]
    Idle,
    /// Server is starting
    Starting,
    /// Server is running
    Running,
    /// Server is restarting or reloading in place
    Reloading,
    /// Server is stopping
    Stopping,
    /// Server has stopped
    Stopped,
    /// Last operation failed
    Failed,
}

/// Server lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLifecycleEvent {
    /// Start requested
    Starting,
    /// Server started
    Started,
    /// Stop requested
    Stopping,
    /// Server stopped
    Stopped,
    /// Restart or reload requested
    Reloading,
    /// Server restarted or reloaded
    Reloaded,
    /// Server failed
    Failed,
}

impl ServerLifecycleEvent {
    fn status(self) -> ServerStatus {
        match self {
            Self::Starting => ServerStatus::Starting,
            Self::Started | Self::Reloaded => ServerStatus::Running,
            Self::Stopping => ServerStatus::Stopping,
            Self::Stopped => ServerStatus::Stopped,
            Self::Reloading => ServerStatus::Reloading,
            Self::Failed => ServerStatus::Failed,
        }
    }
}

/// Server lifecycle event
#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// Server name
    pub name: String,
    /// Event type
    pub event: ServerLifecycleEvent,
    /// Event timestamp
    pub timestamp: Instant,
    /// Event details
    pub details: Option<String>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Other(format!("Failed to lock server {}", what)))
}

/// Records status transitions per server name.
#[derive(Clone)]
pub struct ServerLifecycleManager {
    /// Server events
    events: Arc<Mutex<Vec<ServerEvent>>>,
    /// Server statuses
    statuses: Arc<Mutex<HashMap<String, ServerStatus>>>,
}

impl ServerLifecycleManager {
    /// Create a new server lifecycle manager
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            statuses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a server event
    pub fn record_event(
        &self,
        name: &str,
        event: ServerLifecycleEvent,
        details: Option<String>,
    ) -> Result<()> {
        {
            let mut statuses = lock(&self.statuses, "statuses")?;
            statuses.insert(name.to_string(), event.status());
        }

        {
            let mut events = lock(&self.events, "events")?;

            events.push(ServerEvent {
                name: name.to_string(),
                event,
                timestamp: Instant::now(),
                details,
            });

            if events.len() > MAX_EVENTS {
                events.remove(0);
            }
        }

        tracing::trace!(server_name = %name, ?event, "Recorded lifecycle event");
        Ok(())
    }

    /// Get server status. Unknown servers are `Idle`.
    pub fn get_status(&self, name: &str) -> Result<ServerStatus> {
        let statuses = lock(&self.statuses, "statuses")?;

        Ok(statuses.get(name).copied().unwrap_or_default())
    }

    /// Get recent events for a server, oldest first
    pub fn get_server_events(&self, name: &str, limit: Option<usize>) -> Result<Vec<ServerEvent>> {
        let events = lock(&self.events, "events")?;

        let mut server_events: Vec<ServerEvent> =
            events.iter().filter(|e| e.name == name).cloned().collect();

        if let Some(limit) = limit {
            let skip = server_events.len().saturating_sub(limit);
            server_events.drain(..skip);
        }

        Ok(server_events)
    }

    /// Clear events
    pub fn clear_events(&self) -> Result<()> {
        let mut events = lock(&self.events, "events")?;

        events.clear();

        Ok(())
    }
}

impl Default for ServerLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
