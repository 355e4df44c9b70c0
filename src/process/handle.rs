use crate::error::{Error, Result};
use async_process::ChildStdin;
use futures_lite::io::AsyncWriteExt;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use uuid::Uuid;

/// Bytes of each output stream a handle keeps. Older lines are dropped
/// first, so a long-running server holds only its recent output.
pub const OUTPUT_LIMIT: usize = 256 * 1024;

/// Unique identifier for a spawned child process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(Uuid);

impl HandleId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a process is in its shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationState {
    /// Running, nobody asked it to stop
    NotSignaled,
    /// A termination signal was delivered, close not yet observed
    SignalSent,
    /// The process exited and its output streams were drained
    Closed,
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Whether the exit status counts as success
    pub success: bool,
}

/// Which output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

struct HandleInner {
    id: HandleId,
    pid: u32,
    command: String,
    stdout: Mutex<String>,
    stderr: Mutex<String>,
    state: Mutex<TerminationState>,
    exit: Mutex<Option<ExitInfo>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    // Bumped on every output line and on close.
    progress: watch::Sender<u64>,
}

/// A child process spawned through the
/// [`ChildProcessRegistry`](crate::process::ChildProcessRegistry).
///
/// Handles are cheap to clone; every clone observes the same buffers and
/// state. The registry drops its own reference before the close becomes
/// observable through [`wait_closed`](Self::wait_closed).
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<HandleInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Appends `line` and drops whole lines from the front past [`OUTPUT_LIMIT`].
fn push_line(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    buffer.push('\n');
    if buffer.len() <= OUTPUT_LIMIT {
        return;
    }
    let excess = buffer.len() - OUTPUT_LIMIT;
    // A newline byte is always a char boundary
    let cut = buffer.as_bytes()[excess..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(buffer.len(), |i| excess + i + 1);
    buffer.drain(..cut);
}

impl ProcessHandle {
    pub(crate) fn new(pid: u32, command: String, stdin: Option<ChildStdin>) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            inner: Arc::new(HandleInner {
                id: HandleId::new(),
                pid,
                command,
                stdout: Mutex::new(String::new()),
                stderr: Mutex::new(String::new()),
                state: Mutex::new(TerminationState::NotSignaled),
                exit: Mutex::new(None),
                stdin: tokio::sync::Mutex::new(stdin),
                progress,
            }),
        }
    }

    /// Registry key
    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    /// OS process ID
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// Command line the process was started with
    pub fn command(&self) -> &str {
        &self.inner.command
    }

    /// Captured standard output, the last [`OUTPUT_LIMIT`] bytes at most
    pub fn stdout(&self) -> String {
        lock(&self.inner.stdout).clone()
    }

    /// Captured standard error, the last [`OUTPUT_LIMIT`] bytes at most
    pub fn stderr(&self) -> String {
        lock(&self.inner.stderr).clone()
    }

    /// Current termination state
    pub fn termination_state(&self) -> TerminationState {
        *lock(&self.inner.state)
    }

    /// Exit information once closed
    pub fn exit(&self) -> Option<ExitInfo> {
        *lock(&self.inner.exit)
    }

    /// Whether the close event has fired
    pub fn is_closed(&self) -> bool {
        self.exit().is_some()
    }

    /// Whether the process was forked with a message channel
    pub async fn has_message_channel(&self) -> bool {
        self.inner.stdin.lock().await.is_some()
    }

    pub(crate) fn append(&self, stream: OutputStream, line: &str) {
        let buffer = match stream {
            OutputStream::Stdout => &self.inner.stdout,
            OutputStream::Stderr => &self.inner.stderr,
        };
        push_line(&mut lock(buffer), line);
        self.inner.progress.send_modify(|n| *n += 1);
    }

    pub(crate) fn mark_signaled(&self) {
        let mut state = lock(&self.inner.state);
        if *state == TerminationState::NotSignaled {
            *state = TerminationState::SignalSent;
        }
    }

    pub(crate) fn mark_closed(&self, exit: ExitInfo) {
        *lock(&self.inner.exit) = Some(exit);
        *lock(&self.inner.state) = TerminationState::Closed;
        self.inner.progress.send_modify(|n| *n += 1);
    }

    /// Waits for the close event.
    pub async fn wait_closed(&self) -> ExitInfo {
        let mut progress = self.inner.progress.subscribe();
        loop {
            if let Some(exit) = self.exit() {
                return exit;
            }
            // The sender lives as long as `self`, so this never errors.
            let _ = progress.changed().await;
        }
    }

    /// Waits until captured stdout contains `marker`.
    ///
    /// This is how node and nodemon servers signal readiness. It relies on the
    /// server printing a fixed string, so a server that words its startup
    /// line differently will never be seen as ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] if the process closes before the marker
    /// appears.
    pub async fn wait_for_output(&self, marker: &str) -> Result<()> {
        let mut progress = self.inner.progress.subscribe();
        loop {
            if lock(&self.inner.stdout).contains(marker) {
                return Ok(());
            }
            if let Some(exit) = self.exit() {
                return Err(Error::Process(format!(
                    "'{}' exited ({}) before printing '{}'",
                    self.command(),
                    exit.code
                        .map(|c| format!("code {}", c))
                        .unwrap_or_else(|| "by signal".to_string()),
                    marker
                )));
            }
            let _ = progress.changed().await;
        }
    }

    /// Writes one line to the process's message channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] if the process was spawned without a channel
    /// or the write fails.
    pub async fn send_message(&self, message: &str) -> Result<()> {
        let mut guard = self.inner.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| {
            Error::Process(format!("'{}' has no message channel", self.command()))
        })?;

        let mut line = message.to_string();
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Process(format!("Failed to write to stdin: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| Error::Process(format!("Failed to flush stdin: {}", e)))?;
        Ok(())
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.inner.id)
            .field("pid", &self.inner.pid)
            .field("command", &self.inner.command)
            .field("state", &self.termination_state())
            .finish()
    }
}
