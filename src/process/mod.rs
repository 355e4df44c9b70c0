//! Child process management.
//!
//! Every subprocess fox launches, whether a server or a one-shot tool
//! command, goes through a [`ChildProcessRegistry`] so that an interrupt can
//! bring all of them down together.
//!
//! # Components
//!
//! * `registry` - spawning, tracking and bulk termination
//! * `handle` - a single child process, its captured output and shutdown state
//! * `signal` - signal delivery, injectable for tests
//! * `command` - running tool subcommands to completion
//!
//! # Examples
//!
//! ```no_run
//! use fox::process::{ChildProcessRegistry, SpawnOptions, TerminationSignal};
//!
//! # async fn demo() -> fox::Result<()> {
//! let registry = ChildProcessRegistry::new();
//! let handle = registry.spawn(SpawnOptions::new("node").arg("server.js").capture(true))?;
//! handle.wait_for_output("Listening on port").await?;
//!
//! let report = registry.kill_all(TerminationSignal::Interrupt).await;
//! assert_eq!(report.closed, 1);
//! assert!(registry.is_empty());
//! # Ok(())
//! # }
//! ```
pub mod command;
mod handle;
mod registry;
mod signal;

pub use command::{CommandOutput, CommandRunner, Invocation, RegistryCommandRunner};
pub use handle::{
    ExitInfo, HandleId, OutputStream, ProcessHandle, TerminationState, OUTPUT_LIMIT,
};
pub use registry::{ChildProcessRegistry, KillReport, SpawnOptions};
pub use signal::{OsSignaller, Signaller, TerminationSignal};
