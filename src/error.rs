/// Error handling module for fox.
///
/// This module defines the error types used throughout the library.
/// Backend errors travel through the [`ServerController`](crate::ServerController)
/// unchanged, so callers can match on the variant that the process manager
/// produced.
///
/// # Example
///
/// ```
/// use fox::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::AlreadyRunning(name)) => println!("'{}' is already online", name),
///         Err(Error::RemoteRejected { .. }) => println!("Install was refused"),
///         Err(Error::Timeout(msg)) => println!("Gave up waiting: {}", msg),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur while managing fox servers.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read or parse a configuration file.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but holds values that can't be used.
    ///
    /// This error occurs when:
    /// - The server name is empty
    /// - The worker count is zero
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Configuration refers to something missing on disk.
    #[error("Config validation error: {0}")]
    ConfigValidation(String),

    /// The `controller` field names no known backend.
    #[error("Unknown controller '{0}', expected one of: node, nodemon, pm2")]
    UnknownController(String),

    /// A required global tool is still missing after one install attempt.
    #[error("Required tool '{0}' is not installed")]
    ToolMissing(String),

    /// A process with the configured name is already online.
    #[error("Server '{0}' is already started")]
    AlreadyRunning(String),

    /// The operation needs a running server and there is none.
    #[error("Not running")]
    NotRunning,

    /// The selected backend does not support the requested operation.
    #[error("'{operation}' is not implemented for the {backend} controller")]
    NotImplemented {
        /// Backend name.
        backend: &'static str,
        /// Operation name.
        operation: &'static str,
    },

    /// The install activation endpoint answered with an `error` field.
    #[error("({status}) {message}")]
    RemoteRejected {
        /// Status reported by the server, or the HTTP status.
        status: u16,
        /// Message from the `error` field.
        message: String,
    },

    /// A readiness or liveness poll exhausted its attempts.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A termination signal could not be delivered.
    #[error("Failed to signal process {pid}: {reason}")]
    SignalDelivery {
        /// Target process ID.
        pid: u32,
        /// OS error text.
        reason: String,
    },

    /// Spawning or running a subprocess failed.
    ///
    /// This error occurs when:
    /// - The executable can't be found
    /// - A tool subcommand exits with a non-zero status
    /// - A server exits before printing its readiness marker
    #[error("Process error: {0}")]
    Process(String),

    /// An HTTP request failed before a response was read.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Error in serializing or deserializing data.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for fox operations.
pub type Result<T> = std::result::Result<T, Error>;
