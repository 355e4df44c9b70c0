//! fox command-line entry point.
//!
//! Parses arguments, loads the project configuration, applies flag
//! overrides and dispatches to the library. Every failure path, help
//! included, exits with status 1.

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use fox::config::{Config, Environment};
use fox::process::{ChildProcessRegistry, RegistryCommandRunner};
use fox::scaffold::Scaffold;
use fox::{Fox, TerminationSignal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

/// Scaffold, start, stop and manage Node.js web servers.
#[derive(Debug, Parser)]
#[command(name = "fox", version)]
#[command(about = "Scaffold, start, stop and manage Node.js web servers")]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Enable debug output
    #[arg(short = 'v', long = "verbose", visible_alias = "debug", global = true)]
    verbose: bool,

    /// Run in the local environment
    #[arg(
        short = 'l',
        long = "local",
        global = true,
        conflicts_with_all = ["development", "production"]
    )]
    local: bool,

    /// Run in the development environment
    #[arg(
        short = 'd',
        long = "dev",
        visible_alias = "development",
        global = true,
        conflicts_with = "production"
    )]
    development: bool,

    /// Run in the production environment
    #[arg(short = 'p', long = "prod", visible_alias = "production", global = true)]
    production: bool,

    /// Run the install sequence after starting
    #[arg(short = 'i', long = "install", global = true)]
    install: bool,

    /// Stay in the foreground, never daemonize
    #[arg(short = 's', long = "single", global = true, conflicts_with = "daemon")]
    single: bool,

    /// Run detached under pm2
    #[arg(short = 'm', long = "daemon", global = true)]
    daemon: bool,

    /// Configuration file (default: fox.json, fox.yaml or fox.yml)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a new server project
    New {
        /// Project and directory name
        name: String,
    },
    /// Start the server
    Start,
    /// Stop the server
    Stop,
    /// Restart the server
    Restart,
    /// Reload the server without downtime
    Reload,
    /// Show server logs
    Logs,
    /// Remove the server from its process manager
    Clear,
    /// Print usage
    #[command(visible_alias = "h")]
    Help,
}

impl Cli {
    fn environment(&self) -> Option<Environment> {
        if self.production {
            Some(Environment::Production)
        } else if self.development {
            Some(Environment::Development)
        } else if self.local {
            Some(Environment::Local)
        } else {
            None
        }
    }

    /// Applies environment and daemon flags on top of the loaded file.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(env) = self.environment() {
            config.server.env = env;
        }
        if self.daemon {
            config.server.daemon = true;
        } else if self.single {
            config.server.daemon = false;
        }
    }

    fn load_config(&self, dir: &std::path::Path) -> anyhow::Result<Config> {
        let mut config = Config::discover(self.config.as_deref(), dir)
            .context("Failed to load configuration")?;
        self.apply_overrides(&mut config);
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).with_target(verbose).init();
}

fn print_usage() {
    if let Err(e) = Cli::command().print_help() {
        eprintln!("{}", e);
    }
    println!();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help, --version and invalid input all end up here
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if already_reported(&e) {
                tracing::debug!("{:?}", e);
            } else if cli.verbose {
                tracing::error!("{:?}", e);
            } else {
                tracing::error!("{:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

/// Errors the library logs where they happen.
fn already_reported(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<fox::Error>(),
        Some(fox::Error::UnknownController(_))
    )
}

/// Runs the selected command. `Ok(false)` means usage was printed.
async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let Some(command) = &cli.command else {
        print_usage();
        return Ok(false);
    };

    let cwd = std::env::current_dir().context("Failed to read current directory")?;

    match command {
        Command::Help => {
            print_usage();
            Ok(false)
        }
        Command::New { name } => {
            new_project(cli, &cwd, name).await?;
            Ok(true)
        }
        Command::Start => {
            let fox = Fox::new(cli.load_config(&cwd)?);
            if cli.install {
                let session = fox.install().await?;
                tracing::info!(server_name = %session.server.name, "Server installed");
            } else {
                fox.start().await?;
                attach(&fox).await;
            }
            Ok(true)
        }
        Command::Stop => {
            Fox::new(cli.load_config(&cwd)?).stop().await?;
            Ok(true)
        }
        Command::Restart => {
            Fox::new(cli.load_config(&cwd)?).restart().await?;
            Ok(true)
        }
        Command::Reload => {
            Fox::new(cli.load_config(&cwd)?).reload().await?;
            Ok(true)
        }
        Command::Logs => {
            let fox = Fox::new(cli.load_config(&cwd)?);
            fox.logs().await?;
            attach(&fox).await;
            Ok(true)
        }
        Command::Clear => {
            Fox::new(cli.load_config(&cwd)?).clear().await?;
            Ok(true)
        }
    }
}

async fn new_project(cli: &Cli, cwd: &std::path::Path, name: &str) -> anyhow::Result<()> {
    let registry = ChildProcessRegistry::new();
    let scaffold = Scaffold::new(Arc::new(RegistryCommandRunner::new(registry.clone())));
    let dir = scaffold
        .create(cwd, name)
        .await
        .with_context(|| format!("Failed to create project '{}'", name))?;
    tracing::info!(project_dir = %dir.display(), "Project created");

    if cli.install {
        let mut config = Config::from_file(dir.join("fox.json"))?;
        cli.apply_overrides(&mut config);
        let fox = Fox::new(config);
        fox.install().await?;
        tracing::info!(server_name = %name, "Server installed");
    } else {
        println!("\n  cd {} && fox start\n", name);
    }
    Ok(())
}

/// Keeps foreground servers attached until they exit or Ctrl-C arrives.
async fn attach(fox: &Fox) {
    if fox.registry().is_empty() {
        return;
    }
    tokio::select! {
        _ = fox.wait_idle() => {
            tracing::info!("All server processes exited");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Interrupted, stopping server processes");
            let report = fox.shutdown(TerminationSignal::Interrupt).await;
            tracing::info!(
                signaled = report.signaled,
                failed = report.failed,
                closed = report.closed,
                "Server processes stopped"
            );
        }
    }
}
