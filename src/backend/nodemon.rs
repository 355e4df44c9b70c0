use super::{GlobalPackages, ProcessBackend, READINESS_MARKER};
use crate::config::{ControllerKind, ServerConfig};
use crate::error::{Error, Result};
use crate::process::{ChildProcessRegistry, ProcessHandle, SpawnOptions, TerminationSignal};
use async_trait::async_trait;
use std::sync::Mutex;

/// Paths nodemon never watches.
const IGNORED: &[&str] = &[".git/", "node_modules/**/node_modules"];

/// nodemon's restart command on stdin.
const RESTART_COMMAND: &str = "rs";

/// Runs the server under `nodemon`, restarting it on file changes.
pub struct NodemonBackend {
    registry: ChildProcessRegistry,
    packages: GlobalPackages,
    program: String,
    leading_args: Vec<String>,
    current: Mutex<Option<ProcessHandle>>,
}

impl NodemonBackend {
    pub fn new(registry: ChildProcessRegistry, packages: GlobalPackages) -> Self {
        Self {
            registry,
            packages,
            program: "nodemon".to_string(),
            leading_args: Vec::new(),
            current: Mutex::new(None),
        }
    }

    /// Launches `program` with `leading_args` ahead of the
    /// [`arguments`](Self::arguments) instead of the global `nodemon`.
    pub fn with_program<I, S>(mut self, program: impl Into<String>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.leading_args = leading_args.into_iter().map(Into::into).collect();
        self
    }

    /// Arguments passed to nodemon for `config`.
    pub fn arguments(config: &ServerConfig) -> Vec<String> {
        let mut args = Vec::new();
        for ignored in IGNORED {
            args.push("--ignore".to_string());
            args.push(ignored.to_string());
        }
        let watched = [config.path.clone(), config.config_dir()]
            .into_iter()
            .chain(config.watch.iter().cloned());
        for path in watched {
            args.push("--watch".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        args.push(config.path.to_string_lossy().into_owned());
        args
    }

    fn current(&self) -> Option<ProcessHandle> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .filter(|h| !h.is_closed())
    }
}

#[async_trait]
impl ProcessBackend for NodemonBackend {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Nodemon
    }

    async fn ensure_prerequisites(&self) -> Result<()> {
        self.packages.ensure("nodemon").await
    }

    #[tracing::instrument(skip(self, config), fields(server_name = %config.name))]
    async fn start(&self, config: &ServerConfig) -> Result<()> {
        if let Some(handle) = self.current() {
            tracing::warn!(pid = handle.pid(), "nodemon already running");
            return Err(Error::AlreadyRunning(config.name.clone()));
        }

        self.packages.ensure("nodemon").await?;

        let options = SpawnOptions::new(&self.program)
            .args(self.leading_args.iter().cloned())
            .args(Self::arguments(config))
            .envs(config.process_env())
            .cwd(config.project_dir())
            .capture(true)
            .echo(true);
        let handle = self.registry.fork(options)?;
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle.clone());

        if !config.wait_for_ready {
            tracing::info!(pid = handle.pid(), "nodemon started, not waiting for readiness");
            return Ok(());
        }

        tracing::info!(pid = handle.pid(), "Waiting for server under nodemon to listen");
        handle.wait_for_output(READINESS_MARKER).await?;
        tracing::info!(pid = handle.pid(), "Server under nodemon is listening");
        Ok(())
    }

    #[tracing::instrument(skip(self, config), fields(server_name = %config.name))]
    async fn stop(&self, config: &ServerConfig) -> Result<()> {
        let handle = self.current().ok_or(Error::NotRunning)?;

        self.registry.signal(&handle, TerminationSignal::Interrupt)?;
        handle.wait_closed().await;
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        tracing::info!("nodemon stopped");
        Ok(())
    }

    #[tracing::instrument(skip(self, config), fields(server_name = %config.name))]
    async fn restart(&self, config: &ServerConfig) -> Result<()> {
        let handle = self.current().ok_or(Error::NotRunning)?;
        handle.send_message(RESTART_COMMAND).await?;
        tracing::info!("Asked nodemon to restart");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_arguments_watch_entry_and_config_dir() {
        let config = ServerConfig {
            path: PathBuf::from("/srv/shop/server.js"),
            watch: vec![PathBuf::from("/srv/shop/lib")],
            ..ServerConfig::default()
        };

        assert_eq!(
            NodemonBackend::arguments(&config),
            vec![
                "--ignore",
                ".git/",
                "--ignore",
                "node_modules/**/node_modules",
                "--watch",
                "/srv/shop/server.js",
                "--watch",
                "/srv/shop/config",
                "--watch",
                "/srv/shop/lib",
                "/srv/shop/server.js",
            ]
        );
    }
}
