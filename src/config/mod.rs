//! Configuration module for fox.
//!
//! This module handles parsing, validation, and access to the settings a
//! backend needs to start a server, plus the install activation settings.
//! Configuration can be loaded from JSON or YAML files; every field has a
//! default so an empty file (or no file at all) is usable.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use fox::config::Config;
//!
//! let config = Config::from_file("fox.json").unwrap();
//! println!("Server '{}' uses the {} controller", config.server.name, config.server.controller);
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use fox::config::{Config, Environment, ServerConfig};
//!
//! let server = ServerConfig {
//!     controller: "pm2".to_string(),
//!     path: "/srv/app/server.js".into(),
//!     env: Environment::Production,
//!     instances: 4,
//!     ..ServerConfig::default()
//! };
//! let config = Config { server, ..Config::default() };
//! assert_eq!(config.server.controller, "pm2");
//! ```
mod parser;
pub mod validator;

pub use parser::{
    Config, ControllerKind, Environment, ExecMode, InstallConfig, ServerConfig,
    CONFIG_FILE_NAMES,
};
pub use validator::{validate_config, validate_for_start};
