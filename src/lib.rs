/*!
 # fox

 Scaffold, start, stop and manage Node.js web servers.

 ## Overview

 fox provides functionality to:
 - Run a server under plain `node`, under `nodemon`, or detached under `pm2`
 - Start, stop, restart, reload, tail and clear servers through one interface
 - Install missing process managers globally through `npm`
 - Run the one-time install activation against a freshly started server
 - Generate new server projects

 ## Basic Usage

 ```no_run
 use fox::{Fox, Result};

 #[tokio::main]
 async fn main() -> Result<()> {
     // Load fox.json from the project
     let fox = Fox::from_config_file("fox.json")?;

     // Start the server with the configured controller
     fox.start().await?;

     // Keep foreground servers attached until they exit
     fox.wait_idle().await;

     Ok(())
 }
 ```

 ## Features

 - **Three backends**: node, nodemon and pm2 behind the
   [`ProcessBackend`](backend::ProcessBackend) trait
 - **Child process tracking**: every subprocess is registered and can be interrupted in bulk
 - **Bounded polling**: readiness checks with a fixed interval and attempt budget
 - **Install orchestration**: start, probe, activate, stop, probe, relaunch
 - **Configuration**: JSON or YAML config files with defaults for every field

 ## License

 This project is licensed under the terms in the LICENSE file.
*/

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod install;
pub mod poller;
pub mod process;
pub mod scaffold;
pub mod server;

pub use config::Config;
pub use controller::ServerController;
pub use error::{Error, Result};
pub use install::{InstallOrchestrator, InstallSession};
pub use process::{ChildProcessRegistry, KillReport, TerminationSignal};
pub use server::ServerStatus;

use std::path::Path;
use std::sync::Arc;

/// Manage one fox server project.
///
/// This struct is the main entry point: it owns the configuration, the
/// registry every child process is spawned through, and the controller that
/// dispatches to the configured backend.
/// Server operations are instrumented with `tracing` spans.
pub struct Fox {
    /// Configuration
    config: Config,
    /// Every child process fox spawned
    registry: ChildProcessRegistry,
    /// Backend dispatch
    controller: Arc<ServerController>,
}

impl Fox {
    /// Create a fox instance from a configuration file path
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = Config::from_file(path)?;
        Ok(Self::new(config))
    }

    /// Create a fox instance from a configuration
    #[tracing::instrument(skip(config), fields(server_name = %config.server.name))]
    pub fn new(config: Config) -> Self {
        let registry = ChildProcessRegistry::new();
        let controller = Arc::new(ServerController::new(registry.clone()));
        Self::with_parts(config, registry, controller)
    }

    /// Create a fox instance from already built parts
    pub fn with_parts(
        config: Config,
        registry: ChildProcessRegistry,
        controller: Arc<ServerController>,
    ) -> Self {
        Self {
            config,
            registry,
            controller,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Child process registry
    pub fn registry(&self) -> &ChildProcessRegistry {
        &self.registry
    }

    /// Backend dispatch
    pub fn controller(&self) -> &Arc<ServerController> {
        &self.controller
    }

    /// Validate the configuration and start the server
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        config::validate_config(&self.config)?;
        config::validate_for_start(&self.config.server)?;
        self.controller.start(&self.config.server).await
    }

    /// Stop the server
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        self.controller.stop(&self.config.server).await
    }

    /// Restart the server
    #[tracing::instrument(skip(self))]
    pub async fn restart(&self) -> Result<()> {
        self.controller.restart(&self.config.server).await
    }

    /// Reload the server without downtime
    #[tracing::instrument(skip(self))]
    pub async fn reload(&self) -> Result<()> {
        self.controller.reload(&self.config.server).await
    }

    /// Show server logs
    #[tracing::instrument(skip(self))]
    pub async fn logs(&self) -> Result<()> {
        self.controller.logs(&self.config.server).await
    }

    /// Remove the server from its process manager
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        self.controller.clear(&self.config.server).await
    }

    /// Start the server and run the install sequence against it
    #[tracing::instrument(skip(self))]
    pub async fn install(&self) -> Result<InstallSession> {
        config::validate_config(&self.config)?;
        config::validate_for_start(&self.config.server)?;
        let controller = Arc::clone(&self.controller);
        let orchestrator = InstallOrchestrator::with_defaults(controller, self.registry.clone())?;
        orchestrator
            .run(&self.config.server, &self.config.install)
            .await
    }

    /// Interrupt every child process and wait for all of them to close
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self, signal: TerminationSignal) -> KillReport {
        self.registry.kill_all(signal).await
    }

    /// Wait until no child process is left
    pub async fn wait_idle(&self) {
        self.registry.wait_idle().await
    }
}
