use super::{ProcessBackend, READINESS_MARKER};
use crate::config::{ControllerKind, ServerConfig};
use crate::error::{Error, Result};
use crate::process::{
    ChildProcessRegistry, CommandRunner, Invocation, ProcessHandle, SpawnOptions,
    TerminationSignal,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::{Arc, Mutex};

/// Runs the server as a plain `node <entry>` child of fox.
///
/// The server lives only as long as this fox process; stop works on the
/// servers started by this backend instance.
pub struct NodeBackend {
    registry: ChildProcessRegistry,
    runner: Arc<dyn CommandRunner>,
    program: String,
    leading_args: Vec<String>,
    started: Mutex<Vec<ProcessHandle>>,
}

impl NodeBackend {
    pub fn new(registry: ChildProcessRegistry, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            registry,
            runner,
            program: "node".to_string(),
            leading_args: Vec::new(),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Runs servers with `program`, passing `leading_args` before the entry
    /// point, instead of `node`.
    pub fn with_program<I, S>(mut self, program: impl Into<String>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.leading_args = leading_args.into_iter().map(Into::into).collect();
        self
    }

    fn take_running(&self) -> Vec<ProcessHandle> {
        let mut started = self
            .started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        started.retain(|h| !h.is_closed());
        std::mem::take(&mut *started)
    }
}

#[async_trait]
impl ProcessBackend for NodeBackend {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Node
    }

    async fn ensure_prerequisites(&self) -> Result<()> {
        let invocation = Invocation::new("node", ["--version"]);
        let output = self.runner.run(&invocation).await?.check(&invocation)?;
        tracing::debug!(version = %output.stdout.trim(), "Found node");
        Ok(())
    }

    #[tracing::instrument(skip(self, config), fields(server_name = %config.name))]
    async fn start(&self, config: &ServerConfig) -> Result<()> {
        let options = SpawnOptions::new(&self.program)
            .args(self.leading_args.iter().cloned())
            .arg(config.path.to_string_lossy())
            .envs(config.process_env())
            .cwd(config.project_dir())
            .capture(true)
            .echo(true);

        let handle = self.registry.spawn(options)?;
        self.started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle.clone());

        tracing::info!(pid = handle.pid(), "Waiting for node server to listen");
        handle.wait_for_output(READINESS_MARKER).await?;
        tracing::info!(pid = handle.pid(), "Node server is listening");
        Ok(())
    }

    #[tracing::instrument(skip(self, config), fields(server_name = %config.name))]
    async fn stop(&self, config: &ServerConfig) -> Result<()> {
        let running = self.take_running();
        if running.is_empty() {
            tracing::warn!("No node server started by this process");
            return Err(Error::NotRunning);
        }

        for handle in &running {
            if let Err(e) = self.registry.signal(handle, TerminationSignal::Interrupt) {
                tracing::warn!(pid = handle.pid(), error = %e, "Failed to interrupt node server");
            }
        }
        join_all(running.iter().map(|h| h.wait_closed())).await;
        tracing::info!("Node server stopped");
        Ok(())
    }
}
