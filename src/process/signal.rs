//! Termination signal delivery.

use crate::error::{Error, Result};
use std::fmt;

/// Signals the registry knows how to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationSignal {
    /// SIGINT. What nodemon and node servers treat as "quit".
    #[default]
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGKILL.
    Kill,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Kill => "SIGKILL",
        };
        f.write_str(name)
    }
}

/// Sends a signal to a process ID.
///
/// Injected into the registry so delivery failures can be simulated.
pub trait Signaller: Send + Sync {
    /// Deliver `signal` to `pid`.
    fn send(&self, pid: u32, signal: TerminationSignal) -> Result<()>;
}

/// Delivers signals through the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignaller;

#[cfg(unix)]
impl Signaller for OsSignaller {
    fn send(&self, pid: u32, signal: TerminationSignal) -> Result<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let sig = match signal {
            TerminationSignal::Interrupt => Signal::SIGINT,
            TerminationSignal::Terminate => Signal::SIGTERM,
            TerminationSignal::Kill => Signal::SIGKILL,
        };
        signal::kill(Pid::from_raw(pid as i32), sig).map_err(|e| Error::SignalDelivery {
            pid,
            reason: e.to_string(),
        })
    }
}

#[cfg(not(unix))]
impl Signaller for OsSignaller {
    fn send(&self, pid: u32, _signal: TerminationSignal) -> Result<()> {
        Err(Error::SignalDelivery {
            pid,
            reason: "signals are only supported on unix".to_string(),
        })
    }
}
