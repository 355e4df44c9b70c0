//! Globally installed npm packages.

use crate::error::{Error, Result};
use crate::process::{CommandRunner, Invocation};
use std::sync::Arc;

/// Checks for and installs global npm packages such as `pm2` and `nodemon`.
#[derive(Clone)]
pub struct GlobalPackages {
    runner: Arc<dyn CommandRunner>,
}

impl GlobalPackages {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// `npm list <package> -g`; installed when it exits cleanly and lists
    /// the package.
    pub async fn is_installed(&self, package: &str) -> Result<bool> {
        let invocation = Invocation::new("npm", ["list", package, "-g"]);
        let output = self.runner.run(&invocation).await?;
        let listed = output.stdout.contains(&format!("{}@", package));
        tracing::debug!(package, code = ?output.code, listed, "Checked global package");
        Ok(output.success() && listed)
    }

    /// `npm install <package> -g`, output streamed to the terminal.
    pub async fn install(&self, package: &str) -> Result<()> {
        tracing::info!(package, "Installing global package");
        let invocation = Invocation::new("npm", ["install", package, "-g"]).streaming();
        self.runner.run(&invocation).await?.check(&invocation)?;
        Ok(())
    }

    /// Installs `package` if it is missing, then checks once more.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolMissing`] if the package is still absent after
    /// the install attempt.
    #[tracing::instrument(skip(self))]
    pub async fn ensure(&self, package: &str) -> Result<()> {
        if self.is_installed(package).await? {
            return Ok(());
        }

        tracing::warn!(package, "Global package missing");
        self.install(package).await?;

        if self.is_installed(package).await? {
            Ok(())
        } else {
            tracing::error!(package, "Package still missing after install");
            Err(Error::ToolMissing(package.to_string()))
        }
    }
}
