use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File names probed, in order, when no config path is given.
pub const CONFIG_FILE_NAMES: &[&str] = &["fox.json", "fox.yaml", "fox.yml"];

/// The process manager that runs a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerKind {
    /// Plain `node <entry>`.
    Node,
    /// `nodemon`, restarting on file changes.
    Nodemon,
    /// `pm2`, detached and clustered.
    Pm2,
}

impl ControllerKind {
    /// Name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Nodemon => "nodemon",
            Self::Pm2 => "pm2",
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControllerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "node" => Ok(Self::Node),
            "nodemon" => Ok(Self::Nodemon),
            "pm2" => Ok(Self::Pm2),
            other => Err(Error::UnknownController(other.to_string())),
        }
    }
}

/// Deployment environment, exported to the server as `NODE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Development,
    Production,
}

impl Environment {
    /// Value for `NODE_ENV`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    /// CLI flag selecting this environment.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Local => "--local",
            Self::Development => "--development",
            Self::Production => "--production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// pm2 execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    #[default]
    Cluster,
    Fork,
}

/// Everything a backend needs to start a server.
///
/// `controller` is kept as the raw string from the configuration so that an
/// unrecognized value can be reported by the controller at dispatch time
/// instead of failing the whole file.
///
/// # Examples
///
/// ```
/// use fox::config::{ControllerKind, ServerConfig};
///
/// let mut config = ServerConfig::default();
/// assert_eq!(config.controller_kind().unwrap(), ControllerKind::Nodemon);
///
/// config.daemon = true;
/// assert_eq!(config.effective_controller(), "pm2");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Backend name: `node`, `nodemon` or `pm2`.
    pub controller: String,

    /// Path to the server entry point. Made absolute by [`Config::resolve_paths`].
    pub path: PathBuf,

    /// Active environment.
    pub env: Environment,

    /// Process name, used as the pm2 `--name`.
    pub name: String,

    /// Cluster worker count.
    pub instances: u32,

    /// pm2 execution mode.
    pub exec_mode: ExecMode,

    /// Run detached under pm2 regardless of `controller`.
    pub daemon: bool,

    /// Wait for the readiness marker when starting under nodemon.
    pub wait_for_ready: bool,

    /// Extra paths nodemon should watch besides the entry and config dir.
    pub watch: Vec<PathBuf>,

    /// Extra environment variables for the server process.
    pub vars: HashMap<String, String>,

    /// Absolute path of the file this configuration was loaded from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            controller: ControllerKind::Nodemon.as_str().to_string(),
            path: PathBuf::from("server.js"),
            env: Environment::default(),
            name: "fox".to_string(),
            instances: 1,
            exec_mode: ExecMode::default(),
            daemon: false,
            wait_for_ready: true,
            watch: Vec::new(),
            vars: HashMap::new(),
            source: None,
        }
    }
}

impl ServerConfig {
    /// The controller that will actually run the server. Daemon mode always
    /// means pm2.
    pub fn effective_controller(&self) -> &str {
        if self.daemon {
            ControllerKind::Pm2.as_str()
        } else {
            &self.controller
        }
    }

    /// Parses [`effective_controller`](Self::effective_controller).
    pub fn controller_kind(&self) -> Result<ControllerKind> {
        self.effective_controller().parse()
    }

    /// Environment variables to pass to the server, `NODE_ENV` included.
    pub fn process_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.sort();
        env.push(("NODE_ENV".to_string(), self.env.as_str().to_string()));
        env
    }

    /// Directory holding the entry point.
    pub fn project_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// The `config` directory next to the entry point.
    pub fn config_dir(&self) -> PathBuf {
        self.project_dir().join("config")
    }

    /// Directory a fresh `fox` should run from to load this same
    /// configuration: where the source file lives, else the project
    /// directory.
    pub fn base_dir(&self) -> PathBuf {
        self.source
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.project_dir())
    }
}

/// Install activation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallConfig {
    /// Base URL of the running server.
    pub host_uri: String,

    /// Shared secret sent as `access_token`.
    pub install_key: String,

    /// Readiness/liveness probes before giving up.
    pub max_attempts: u32,

    /// Milliseconds between probes.
    pub interval_ms: u64,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            host_uri: "http://localhost:8080".to_string(),
            install_key: "fox-install".to_string(),
            max_attempts: 30,
            interval_ms: 2000,
        }
    }
}

/// Main configuration for fox.
///
/// # JSON Schema
///
/// ```json
/// {
///   "server": {
///     "controller": "pm2",
///     "path": "server.js",
///     "env": "production",
///     "name": "shop",
///     "instances": 4,
///     "execMode": "cluster",
///     "vars": { "PORT": "8080" }
///   },
///   "install": {
///     "hostUri": "http://localhost:8080",
///     "installKey": "secret",
///     "maxAttempts": 30,
///     "intervalMs": 2000
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Install activation settings.
    pub install: InstallConfig,
}

impl Config {
    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, anything else as
    /// JSON. A relative entry `path` is resolved against the file's directory
    /// and the file's absolute path is kept in [`ServerConfig::source`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] if the file can't be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::path::absolute(path.as_ref())?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let mut config = if is_yaml {
            Self::parse_from_yaml(&content)?
        } else {
            Self::parse_from_str(&content)?
        };

        let base = match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => std::env::current_dir()?,
        };
        config.resolve_paths(&base);
        config.server.source = Some(path);
        Ok(config)
    }

    /// Loads `path` if given, else the first of [`CONFIG_FILE_NAMES`] found in
    /// `dir`, else defaults resolved against `dir`.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                tracing::debug!(config_path = %candidate.display(), "Found configuration file");
                return Self::from_file(candidate);
            }
        }
        tracing::debug!("No configuration file found, using defaults");
        let mut config = Self::default();
        config.resolve_paths(dir);
        Ok(config)
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// Makes relative server and watch paths absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.server.path.is_relative() {
            self.server.path = base.join(&self.server.path);
        }
        for watch in &mut self.server.watch {
            if watch.is_relative() {
                *watch = base.join(&*watch);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse_from_str(r#"{ "server": { "controller": "pm2" } }"#).unwrap();

        assert_eq!(config.server.controller, "pm2");
        assert_eq!(config.server.name, "fox");
        assert_eq!(config.server.instances, 1);
        assert_eq!(config.install.max_attempts, 30);
        assert_eq!(config.server.source, None);
    }

    #[test]
    fn test_unknown_controller_is_kept_raw() {
        let config =
            Config::parse_from_str(r#"{ "server": { "controller": "forever" } }"#).unwrap();

        assert_eq!(config.server.controller, "forever");
        assert!(matches!(
            config.server.controller_kind(),
            Err(Error::UnknownController(ref c)) if c == "forever"
        ));
    }

    #[test]
    fn test_node_env_is_last() {
        let mut server = ServerConfig::default();
        server.env = Environment::Production;
        server.vars.insert("NODE_ENV".to_string(), "ignored".to_string());
        server.vars.insert("PORT".to_string(), "8080".to_string());

        let env = server.process_env();
        assert_eq!(
            env.last(),
            Some(&("NODE_ENV".to_string(), "production".to_string()))
        );
    }
}
