//! Process backends.
//!
//! A backend knows how to drive one process manager. All three implement
//! [`ProcessBackend`]; operations a manager has no equivalent for return
//! [`Error::NotImplemented`] from the trait's default methods.
//!
//! | operation | node | nodemon | pm2 |
//! |-----------|------|---------|-----|
//! | start     | yes  | yes     | yes |
//! | stop      | yes  | yes     | yes |
//! | restart   |      | yes     | yes |
//! | reload    |      |         | yes |
//! | logs      |      |         | yes |
//! | clear     |      |         | yes |
use crate::config::{ControllerKind, ServerConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;

mod node;
mod nodemon;
pub mod npm;
mod pm2;

pub use node::NodeBackend;
pub use nodemon::NodemonBackend;
pub use npm::GlobalPackages;
pub use pm2::{Pm2Backend, Pm2Process};

/// Text a node server prints once it accepts connections.
///
/// Startup detection for the node and nodemon backends is a plain substring
/// search for this in the server's stdout.
pub const READINESS_MARKER: &str = "Listening on port";

fn not_implemented(kind: ControllerKind, operation: &'static str) -> Error {
    Error::NotImplemented {
        backend: kind.as_str(),
        operation,
    }
}

/// Capability set of a process manager.
#[async_trait]
pub trait ProcessBackend: Send + Sync {
    /// Which controller this backend implements.
    fn kind(&self) -> ControllerKind;

    /// Make sure the process manager itself is available.
    async fn ensure_prerequisites(&self) -> Result<()> {
        Ok(())
    }

    /// Start the server and return once it is up.
    async fn start(&self, config: &ServerConfig) -> Result<()>;

    /// Stop the server.
    async fn stop(&self, config: &ServerConfig) -> Result<()>;

    /// Restart the server.
    async fn restart(&self, _config: &ServerConfig) -> Result<()> {
        Err(not_implemented(self.kind(), "restart"))
    }

    /// Reload the server without downtime.
    async fn reload(&self, _config: &ServerConfig) -> Result<()> {
        Err(not_implemented(self.kind(), "reload"))
    }

    /// Show server logs.
    async fn logs(&self, _config: &ServerConfig) -> Result<()> {
        Err(not_implemented(self.kind(), "logs"))
    }

    /// Stop the server and remove every trace of it from the process manager.
    async fn clear(&self, _config: &ServerConfig) -> Result<()> {
        Err(not_implemented(self.kind(), "clear"))
    }
}
