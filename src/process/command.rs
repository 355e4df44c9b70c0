//! Running tool subcommands (`npm`, `pm2`, `node`) to completion.

use crate::error::{Error, Result};
use crate::process::registry::{ChildProcessRegistry, SpawnOptions};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

/// One tool command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable
    pub program: String,
    /// Arguments, order-sensitive
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Echo output to the terminal while it runs
    pub stream: bool,
    /// Keep output for the returned [`CommandOutput`]. When off the command
    /// writes straight to our stdout and stderr.
    pub capture: bool,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            cwd: None,
            stream: false,
            capture: true,
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Inherits the terminal instead of capturing, for commands that follow
    /// output until interrupted.
    pub fn passthrough(mut self) -> Self {
        self.stream = true;
        self.capture = false;
        self
    }

    /// True when program and arguments equal the given ones exactly.
    pub fn is(&self, program: &str, args: &[&str]) -> bool {
        self.program == program && self.args.iter().map(String::as_str).eq(args.iter().copied())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What a finished command produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turns a non-zero exit into [`Error::Process`].
    pub fn check(self, invocation: &Invocation) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let status = self
            .code
            .map(|c| format!("status {}", c))
            .unwrap_or_else(|| "a signal".to_string());
        let detail = self.stderr.trim();
        Err(Error::Process(if detail.is_empty() {
            format!("`{}` exited with {}", invocation, status)
        } else {
            format!("`{}` exited with {}: {}", invocation, status, detail)
        }))
    }
}

/// Runs a command to completion.
///
/// The seam between backends and the operating system: tests substitute a
/// mock and assert on the exact command lines.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `invocation` and wait for it to exit.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runs commands as registered children of a [`ChildProcessRegistry`], so an
/// interrupt reaches them too.
#[derive(Clone)]
pub struct RegistryCommandRunner {
    registry: ChildProcessRegistry,
}

impl RegistryCommandRunner {
    pub fn new(registry: ChildProcessRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl CommandRunner for RegistryCommandRunner {
    #[tracing::instrument(skip(self), fields(command = %invocation))]
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let mut options = SpawnOptions::new(&invocation.program)
            .args(invocation.args.iter().cloned())
            .envs(invocation.env.iter().cloned())
            .capture(invocation.capture)
            .echo(invocation.stream);
        if let Some(dir) = &invocation.cwd {
            options = options.cwd(dir);
        }

        let handle = self.registry.spawn(options)?;
        let exit = handle.wait_closed().await;
        tracing::debug!(code = ?exit.code, "Command finished");

        Ok(CommandOutput {
            code: exit.code,
            stdout: handle.stdout(),
            stderr: handle.stderr(),
        })
    }
}
