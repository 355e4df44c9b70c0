//! Uniform start/stop/restart/reload/logs/clear over the three backends.

use crate::backend::{GlobalPackages, NodeBackend, NodemonBackend, Pm2Backend, ProcessBackend};
use crate::config::{ControllerKind, ServerConfig};
use crate::error::{Error, Result};
use crate::process::{ChildProcessRegistry, CommandRunner, RegistryCommandRunner};
use crate::server::{ServerLifecycleEvent, ServerLifecycleManager};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Operations the controller dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Prepare,
    Start,
    Stop,
    Restart,
    Reload,
    Logs,
    Clear,
}

impl Operation {
    fn pending_event(self) -> Option<ServerLifecycleEvent> {
        match self {
            Self::Start => Some(ServerLifecycleEvent::Starting),
            Self::Stop | Self::Clear => Some(ServerLifecycleEvent::Stopping),
            Self::Restart | Self::Reload => Some(ServerLifecycleEvent::Reloading),
            Self::Prepare | Self::Logs => None,
        }
    }

    fn done_event(self) -> Option<ServerLifecycleEvent> {
        match self {
            Self::Start => Some(ServerLifecycleEvent::Started),
            Self::Stop | Self::Clear => Some(ServerLifecycleEvent::Stopped),
            Self::Restart | Self::Reload => Some(ServerLifecycleEvent::Reloaded),
            Self::Prepare | Self::Logs => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prepare => "prepare",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reload => "reload",
            Self::Logs => "logs",
            Self::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// Picks the backend named by a [`ServerConfig`] and runs operations on it.
///
/// The dispatch table is built once. Operations through one controller are
/// serialized, and a failed backend operation is returned as-is, never
/// retried.
///
/// # Examples
///
/// ```no_run
/// use fox::{ChildProcessRegistry, ServerController};
/// use fox::config::ServerConfig;
///
/// # async fn demo() -> fox::Result<()> {
/// let controller = ServerController::new(ChildProcessRegistry::new());
/// let config = ServerConfig { controller: "pm2".to_string(), ..ServerConfig::default() };
/// controller.start(&config).await?;
/// controller.reload(&config).await?;
/// # Ok(())
/// # }
/// ```
pub struct ServerController {
    backends: HashMap<ControllerKind, Arc<dyn ProcessBackend>>,
    lifecycle: ServerLifecycleManager,
    op_lock: Mutex<()>,
}

impl ServerController {
    /// Controller with the node, nodemon and pm2 backends, all spawning
    /// through `registry`.
    pub fn new(registry: ChildProcessRegistry) -> Self {
        let runner: Arc<dyn CommandRunner> =
            Arc::new(RegistryCommandRunner::new(registry.clone()));
        let packages = GlobalPackages::new(Arc::clone(&runner));

        let backends: [Arc<dyn ProcessBackend>; 3] = [
            Arc::new(NodeBackend::new(registry.clone(), Arc::clone(&runner))),
            Arc::new(NodemonBackend::new(registry, packages.clone())),
            Arc::new(Pm2Backend::new(runner, packages)),
        ];
        Self::with_backends(backends)
    }

    /// Controller over an explicit set of backends. A later backend of the
    /// same kind replaces an earlier one.
    pub fn with_backends(backends: impl IntoIterator<Item = Arc<dyn ProcessBackend>>) -> Self {
        let backends = backends
            .into_iter()
            .map(|backend| (backend.kind(), backend))
            .collect();
        Self {
            backends,
            lifecycle: ServerLifecycleManager::new(),
            op_lock: Mutex::new(()),
        }
    }

    /// Status history of the servers this controller touched
    pub fn lifecycle(&self) -> &ServerLifecycleManager {
        &self.lifecycle
    }

    fn backend(&self, config: &ServerConfig) -> Result<Arc<dyn ProcessBackend>> {
        let kind = config.controller_kind().map_err(|e| {
            tracing::error!(
                controller = %config.effective_controller(),
                server_name = %config.name,
                "Unknown controller in configuration"
            );
            e
        })?;
        self.backends.get(&kind).cloned().ok_or_else(|| {
            tracing::error!(controller = %kind, "No backend registered for controller");
            Error::UnknownController(kind.to_string())
        })
    }

    fn record(&self, config: &ServerConfig, event: ServerLifecycleEvent, details: Option<String>) {
        if let Err(e) = self.lifecycle.record_event(&config.name, event, details) {
            tracing::warn!(error = %e, "Failed to record lifecycle event");
        }
    }

    #[tracing::instrument(
        skip(self, config),
        fields(server_name = %config.name, controller = %config.effective_controller())
    )]
    async fn dispatch(&self, config: &ServerConfig, operation: Operation) -> Result<()> {
        let backend = self.backend(config)?;
        let _guard = self.op_lock.lock().await;

        if let Some(event) = operation.pending_event() {
            self.record(config, event, None);
        }

        tracing::debug!("Dispatching to backend");
        let result = match operation {
            Operation::Prepare => backend.ensure_prerequisites().await,
            Operation::Start => backend.start(config).await,
            Operation::Stop => backend.stop(config).await,
            Operation::Restart => backend.restart(config).await,
            Operation::Reload => backend.reload(config).await,
            Operation::Logs => backend.logs(config).await,
            Operation::Clear => backend.clear(config).await,
        };

        match &result {
            Ok(()) => {
                if let Some(event) = operation.done_event() {
                    self.record(config, event, None);
                }
            }
            Err(e) => {
                // The caller reports `e`
                tracing::warn!(error = %e, "Backend operation failed");
                if operation.pending_event().is_some() {
                    self.record(config, ServerLifecycleEvent::Failed, Some(e.to_string()));
                }
            }
        }
        result
    }

    /// Makes sure the backend's process manager is installed.
    pub async fn ensure_prerequisites(&self, config: &ServerConfig) -> Result<()> {
        self.dispatch(config, Operation::Prepare).await
    }

    /// Starts the server.
    pub async fn start(&self, config: &ServerConfig) -> Result<()> {
        self.dispatch(config, Operation::Start).await
    }

    /// Stops the server.
    pub async fn stop(&self, config: &ServerConfig) -> Result<()> {
        self.dispatch(config, Operation::Stop).await
    }

    /// Restarts the server.
    pub async fn restart(&self, config: &ServerConfig) -> Result<()> {
        self.dispatch(config, Operation::Restart).await
    }

    /// Reloads the server without downtime.
    pub async fn reload(&self, config: &ServerConfig) -> Result<()> {
        self.dispatch(config, Operation::Reload).await
    }

    /// Shows server logs.
    pub async fn logs(&self, config: &ServerConfig) -> Result<()> {
        self.dispatch(config, Operation::Logs).await
    }

    /// Removes the server from its process manager.
    pub async fn clear(&self, config: &ServerConfig) -> Result<()> {
        self.dispatch(config, Operation::Clear).await
    }
}
