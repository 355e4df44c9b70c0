//! The install sequence run once per deployment.
//!
//! 1. start the server
//! 2. wait until it answers
//! 3. `POST /install.json?access_token=<key>` to seed it
//! 4. stop it
//! 5. wait until it stops answering
//! 6. relaunch fox detached in daemon mode
//!
//! A failure in steps 1 to 3 ends the sequence and is returned unchanged.
//! Once step 3 succeeds, steps 4 to 6 all run and their failures are only
//! logged: a half-installed server left running is worse than a cleanup
//! that partly fails.

use crate::config::{InstallConfig, ServerConfig};
use crate::controller::ServerController;
use crate::error::{Error, Result};
use crate::poller::ReadinessPoller;
use crate::process::{ChildProcessRegistry, SpawnOptions};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Path of the activation endpoint.
pub const INSTALL_PATH: &str = "/install.json";

/// Body returned by the activation endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
}

impl InstallResponse {
    /// Interprets a response body. The absence of `error` means success.
    ///
    /// # Examples
    ///
    /// ```
    /// use fox::install::InstallResponse;
    ///
    /// let err = InstallResponse::check(200, r#"{"error":"bad key","status":403}"#).unwrap_err();
    /// assert_eq!(err.to_string(), "(403) bad key");
    /// assert!(InstallResponse::check(200, r#"{"users":3}"#).is_ok());
    /// ```
    pub fn check(http_status: u16, body: &str) -> Result<()> {
        if body.trim().is_empty() && (200..300).contains(&http_status) {
            return Ok(());
        }
        let response: InstallResponse = serde_json::from_str(body).map_err(|e| {
            Error::Serialization(format!(
                "Install endpoint returned invalid JSON ({}): {}",
                http_status, e
            ))
        })?;
        match response.error {
            Some(message) => Err(Error::RemoteRejected {
                status: response.status.unwrap_or(http_status),
                message,
            }),
            None => Ok(()),
        }
    }
}

/// Calls the install activation endpoint.
#[async_trait]
pub trait InstallClient: Send + Sync {
    async fn activate(&self, host_uri: &str, install_key: &str) -> Result<()>;
}

/// [`InstallClient`] over HTTP.
#[derive(Clone)]
pub struct HttpInstallClient {
    client: Client,
}

impl HttpInstallClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl InstallClient for HttpInstallClient {
    #[tracing::instrument(skip(self, install_key))]
    async fn activate(&self, host_uri: &str, install_key: &str) -> Result<()> {
        let url = format!("{}{}", host_uri.trim_end_matches('/'), INSTALL_PATH);
        let response = self
            .client
            .post(&url)
            .query(&[("access_token", install_key)])
            .send()
            .await
            .map_err(|e| Error::Http(format!("Install request to {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("Failed to read install response: {}", e)))?;
        tracing::debug!(status, "Install endpoint answered");

        InstallResponse::check(status, &body)
    }
}

/// Brings the server back after an install.
#[async_trait]
pub trait Relauncher: Send + Sync {
    /// Returns the PID of the relaunched process.
    async fn relaunch(&self, config: &ServerConfig) -> Result<u32>;
}

/// Relaunches this executable as `fox start -m --<env> [-c <file>]`,
/// detached, from the directory the configuration was loaded in.
pub struct DaemonRelauncher {
    registry: ChildProcessRegistry,
    program: PathBuf,
}

impl DaemonRelauncher {
    /// Relauncher for the currently running executable.
    pub fn new(registry: ChildProcessRegistry) -> Result<Self> {
        Ok(Self::with_program(registry, std::env::current_exe()?))
    }

    pub fn with_program(registry: ChildProcessRegistry, program: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            program: program.into(),
        }
    }

    /// Arguments of the relaunched command.
    pub fn arguments(config: &ServerConfig) -> Vec<String> {
        let mut args = vec![
            "start".to_string(),
            "-m".to_string(),
            config.env.flag().to_string(),
        ];
        if let Some(source) = &config.source {
            args.push("-c".to_string());
            args.push(source.to_string_lossy().into_owned());
        }
        args
    }
}

#[async_trait]
impl Relauncher for DaemonRelauncher {
    async fn relaunch(&self, config: &ServerConfig) -> Result<u32> {
        let options = SpawnOptions::new(self.program.to_string_lossy())
            .args(Self::arguments(config))
            .cwd(config.base_dir());
        self.registry.spawn_detached(options)
    }
}

/// How an install run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Success,
    Timeout,
    RemoteRejected,
    Failed,
}

impl InstallOutcome {
    fn from_error(error: &Error) -> Self {
        match error {
            Error::Timeout(_) => Self::Timeout,
            Error::RemoteRejected { .. } => Self::RemoteRejected,
            _ => Self::Failed,
        }
    }
}

/// State of one install run.
#[derive(Debug, Clone)]
pub struct InstallSession {
    pub server: ServerConfig,
    pub install_key: String,
    /// Readiness probes left unused when the server came up
    pub attempts_remaining: u32,
    pub outcome: Option<InstallOutcome>,
}

/// Drives the install sequence.
pub struct InstallOrchestrator {
    controller: Arc<ServerController>,
    poller: ReadinessPoller,
    client: Arc<dyn InstallClient>,
    relauncher: Arc<dyn Relauncher>,
}

impl InstallOrchestrator {
    pub fn new(
        controller: Arc<ServerController>,
        poller: ReadinessPoller,
        client: Arc<dyn InstallClient>,
        relauncher: Arc<dyn Relauncher>,
    ) -> Self {
        Self {
            controller,
            poller,
            client,
            relauncher,
        }
    }

    /// Orchestrator talking HTTP and relaunching the current executable.
    pub fn with_defaults(
        controller: Arc<ServerController>,
        registry: ChildProcessRegistry,
    ) -> Result<Self> {
        Ok(Self::new(
            controller,
            ReadinessPoller::http()?,
            Arc::new(HttpInstallClient::new()?),
            Arc::new(DaemonRelauncher::new(registry)?),
        ))
    }

    /// Runs the whole sequence for `server`.
    ///
    /// # Errors
    ///
    /// Whatever step 1, 2 or 3 failed with, unchanged.
    #[tracing::instrument(
        skip(self, server, install),
        fields(server_name = %server.name, host_uri = %install.host_uri)
    )]
    pub async fn run(
        &self,
        server: &ServerConfig,
        install: &InstallConfig,
    ) -> Result<InstallSession> {
        let mut session = InstallSession {
            server: server.clone(),
            install_key: install.install_key.clone(),
            attempts_remaining: install.max_attempts,
            outcome: None,
        };

        if let Err(e) = self.activate(&mut session, install).await {
            let outcome = InstallOutcome::from_error(&e);
            // The caller reports `e`
            tracing::warn!(error = %e, ?outcome, "Install aborted");
            session.outcome = Some(outcome);
            return Err(e);
        }

        self.settle(&session, install).await;
        session.outcome = Some(InstallOutcome::Success);
        tracing::info!("Install complete");
        Ok(session)
    }

    async fn activate(&self, session: &mut InstallSession, install: &InstallConfig) -> Result<()> {
        let interval = Duration::from_millis(install.interval_ms);

        tracing::info!("Starting server for install");
        self.controller.start(&session.server).await?;

        let probes = self
            .poller
            .wait_until_up(&install.host_uri, install.max_attempts, interval)
            .await?;
        session.attempts_remaining = install.max_attempts.saturating_sub(probes);

        tracing::info!("Activating install");
        self.client
            .activate(&install.host_uri, &session.install_key)
            .await
    }

    async fn settle(&self, session: &InstallSession, install: &InstallConfig) {
        let interval = Duration::from_millis(install.interval_ms);

        if let Err(e) = self.controller.stop(&session.server).await {
            tracing::warn!(error = %e, "Failed to stop server after install");
        }

        if let Err(e) = self
            .poller
            .wait_until_down(&install.host_uri, install.max_attempts, interval)
            .await
        {
            tracing::warn!(error = %e, "Server did not confirm shutdown");
        }

        match self.relauncher.relaunch(&session.server).await {
            Ok(pid) => tracing::info!(pid, "Relaunched server in daemon mode"),
            Err(e) => tracing::error!(error = %e, "Failed to relaunch server"),
        }
    }
}
