use super::{GlobalPackages, ProcessBackend};
use crate::config::{ControllerKind, ExecMode, ServerConfig};
use crate::error::{Error, Result};
use crate::process::{CommandOutput, CommandRunner, Invocation};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const PM2: &str = "pm2";

/// One entry of `pm2 jlist`. Only the fields fox reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct Pm2Process {
    pub name: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub pm2_env: Pm2Env,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pm2Env {
    #[serde(default)]
    pub status: String,
}

impl Pm2Process {
    pub fn is_online(&self) -> bool {
        self.pm2_env.status == "online"
    }

    /// Parses `pm2 jlist` output. pm2 sometimes prints log lines before the
    /// JSON array, so parsing is attempted from each `[` in turn.
    pub fn parse_list(output: &str) -> Result<Vec<Pm2Process>> {
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        for (start, _) in output.match_indices('[') {
            if let Ok(processes) = serde_json::from_str::<Vec<Pm2Process>>(&output[start..]) {
                return Ok(processes);
            }
        }
        Err(Error::Serialization(format!(
            "Failed to parse pm2 jlist output: {}",
            output.trim()
        )))
    }
}

/// Runs the server under pm2: detached, clustered, with zero-downtime reload.
///
/// Readiness is not observable through pm2's output; callers that need to
/// know the server is up poll it over HTTP.
pub struct Pm2Backend {
    runner: Arc<dyn CommandRunner>,
    packages: GlobalPackages,
}

impl Pm2Backend {
    pub fn new(runner: Arc<dyn CommandRunner>, packages: GlobalPackages) -> Self {
        Self { runner, packages }
    }

    /// Arguments for `pm2 start`.
    pub fn start_arguments(config: &ServerConfig) -> Vec<String> {
        let mut args = vec![
            "start".to_string(),
            config.path.to_string_lossy().into_owned(),
            "-i".to_string(),
            config.instances.to_string(),
            "--name".to_string(),
            config.name.clone(),
        ];
        if config.exec_mode == ExecMode::Fork {
            args.push("-x".to_string());
        }
        args.extend(["--", "-p", "test"].map(String::from));
        args
    }

    async fn run(&self, invocation: Invocation) -> Result<CommandOutput> {
        self.runner.run(&invocation).await?.check(&invocation)
    }

    async fn pm2<const N: usize>(&self, args: [&str; N]) -> Result<CommandOutput> {
        self.run(Invocation::new(PM2, args).streaming()).await
    }

    /// `pm2 jlist`, parsed.
    pub async fn list(&self) -> Result<Vec<Pm2Process>> {
        let output = self.run(Invocation::new(PM2, ["jlist"])).await?;
        Pm2Process::parse_list(&output.stdout)
    }
}

#[async_trait]
impl ProcessBackend for Pm2Backend {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Pm2
    }

    async fn ensure_prerequisites(&self) -> Result<()> {
        self.packages.ensure(PM2).await
    }

    #[tracing::instrument(skip(self, config), fields(server_name = %config.name))]
    async fn start(&self, config: &ServerConfig) -> Result<()> {
        self.packages.ensure(PM2).await?;

        let processes = self.list().await?;
        if let Some(existing) = processes
            .iter()
            .find(|p| p.name == config.name && p.is_online())
        {
            tracing::warn!(pid = ?existing.pid, "Server already online under pm2");
            return Err(Error::AlreadyRunning(config.name.clone()));
        }

        let invocation = Invocation::new(PM2, Self::start_arguments(config))
            .with_env(config.process_env())
            .in_dir(config.project_dir())
            .streaming();
        self.run(invocation).await?;
        tracing::info!(instances = config.instances, "Server started under pm2");
        Ok(())
    }

    #[tracing::instrument(skip(self, config), fields(server_name = %config.name))]
    async fn stop(&self, config: &ServerConfig) -> Result<()> {
        self.pm2(["stop", config.name.as_str()]).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, config), fields(server_name = %config.name))]
    async fn restart(&self, config: &ServerConfig) -> Result<()> {
        self.pm2(["gracefulReload", config.name.as_str()]).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, config), fields(server_name = %config.name))]
    async fn reload(&self, config: &ServerConfig) -> Result<()> {
        self.pm2(["reload", config.name.as_str()]).await?;
        Ok(())
    }

    async fn logs(&self, _config: &ServerConfig) -> Result<()> {
        // Runs until interrupted, so the exit status means nothing.
        let invocation = Invocation::new(PM2, ["logs"]).passthrough();
        self.runner.run(&invocation).await?;
        Ok(())
    }

    /// stop, flush, delete, kill. Failures of the first two are remembered
    /// but don't prevent the rest; a failed delete ends the sequence. The
    /// first failure is returned.
    #[tracing::instrument(skip(self, config), fields(server_name = %config.name))]
    async fn clear(&self, config: &ServerConfig) -> Result<()> {
        let mut first_error = None;

        if let Err(e) = self.pm2(["stop", config.name.as_str()]).await {
            tracing::warn!(error = %e, "pm2 stop failed, continuing");
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.pm2(["flush"]).await {
            tracing::warn!(error = %e, "pm2 flush failed, continuing");
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.pm2(["delete", config.name.as_str()]).await {
            tracing::error!(error = %e, "pm2 delete failed");
            return Err(first_error.unwrap_or(e));
        }
        if let Err(e) = self.pm2(["kill"]).await {
            tracing::warn!(error = %e, "pm2 kill failed");
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!("pm2 cleared");
                Ok(())
            }
        }
    }
}
