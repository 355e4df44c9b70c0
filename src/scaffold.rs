//! `fox new`: generating a server project.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::process::{CommandRunner, Invocation};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

const PACKAGE_JSON: &str = include_str!("../templates/package.json");
const SERVER_JS: &str = include_str!("../templates/server.js");
const GITIGNORE: &str = include_str!("../templates/gitignore");

const DEFAULT_PORT: u16 = 8080;

fn render(template: &str, name: &str) -> String {
    template.replace("{{name}}", name)
}

/// Checks a project name is usable as an npm package and directory name.
pub fn validate_project_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.starts_with('_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::ConfigInvalid(format!(
            "'{}' is not a valid project name (use lowercase letters, digits, '-', '_' and '.')",
            name
        )))
    }
}

/// Creates new projects and installs their dependencies.
pub struct Scaffold {
    runner: Arc<dyn CommandRunner>,
}

impl Scaffold {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Writes the project files for `name` under `parent` and returns the
    /// project directory. Fails if the directory exists and isn't empty.
    pub fn write_project(parent: &Path, name: &str) -> Result<PathBuf> {
        validate_project_name(name)?;

        let dir = parent.join(name);
        if dir.exists() && fs::read_dir(&dir)?.next().is_some() {
            return Err(Error::ConfigValidation(format!(
                "Directory '{}' already exists and is not empty",
                dir.display()
            )));
        }
        fs::create_dir_all(dir.join("config"))?;

        fs::write(dir.join("package.json"), render(PACKAGE_JSON, name))?;
        fs::write(dir.join("server.js"), render(SERVER_JS, name))?;
        fs::write(dir.join(".gitignore"), GITIGNORE)?;
        fs::write(
            dir.join("config").join("app.json"),
            serde_json::to_string_pretty(&serde_json::json!({ "port": DEFAULT_PORT }))
                .map_err(|e| Error::Serialization(e.to_string()))?,
        )?;

        let mut config = Config::default();
        config.server.name = name.to_string();
        config.server.path = PathBuf::from("server.js");
        config.install.host_uri = format!("http://localhost:{}", DEFAULT_PORT);
        config.install.install_key = Uuid::new_v4().simple().to_string();
        let config_json = serde_json::to_string_pretty(&config)
            .map_err(|e| Error::Serialization(format!("Failed to write fox.json: {}", e)))?;
        fs::write(dir.join("fox.json"), config_json)?;

        tracing::info!(project_dir = %dir.display(), "Project files written");
        Ok(dir)
    }

    /// `npm install`, then `bower install` when the project has a `bower.json`.
    pub async fn install_dependencies(&self, dir: &Path) -> Result<()> {
        let npm = Invocation::new("npm", ["install"]).in_dir(dir).streaming();
        self.runner.run(&npm).await?.check(&npm)?;

        if dir.join("bower.json").is_file() {
            let bower = Invocation::new("bower", ["install"]).in_dir(dir).streaming();
            self.runner.run(&bower).await?.check(&bower)?;
        }

        tracing::info!(project_dir = %dir.display(), "Dependencies installed");
        Ok(())
    }

    /// Writes the project and installs its dependencies.
    #[tracing::instrument(skip(self, parent))]
    pub async fn create(&self, parent: &Path, name: &str) -> Result<PathBuf> {
        let dir = Self::write_project(parent, name)?;
        self.install_dependencies(&dir).await?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_names() {
        assert!(validate_project_name("shop").is_ok());
        assert!(validate_project_name("my-shop.v2").is_ok());
        assert!(validate_project_name("").is_err());
        assert!(validate_project_name("Shop").is_err());
        assert!(validate_project_name("../shop").is_err());
        assert!(validate_project_name(".hidden").is_err());
    }

    #[test]
    fn test_render_replaces_every_placeholder() {
        let rendered = render(SERVER_JS, "shop");
        assert!(!rendered.contains("{{name}}"));
        assert!(rendered.contains("Listening on port"));
    }
}
