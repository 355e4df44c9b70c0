use crate::error::{Error, Result};
use crate::process::handle::{ExitInfo, HandleId, OutputStream, ProcessHandle};
use crate::process::signal::{OsSignaller, Signaller, TerminationSignal};
use async_process::{Child, Command, Stdio};
use futures::future::join_all;
use futures_lite::io::{AsyncBufReadExt, AsyncRead, BufReader};
use futures_lite::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long to keep reading output after a process exits. Grandchildren that
/// inherited the pipes (pm2's daemon, for one) can hold them open forever.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// What to launch and how to wire its standard streams.
///
/// # Examples
///
/// ```
/// use fox::process::SpawnOptions;
///
/// let options = SpawnOptions::new("node")
///     .arg("/srv/app/server.js")
///     .env("NODE_ENV", "production")
///     .capture(true)
///     .echo(true);
/// assert_eq!(options.command_line(), "node /srv/app/server.js");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Executable name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Pipe stdout/stderr into the handle's buffers
    pub capture: bool,
    /// Also copy captured lines to our own stdout/stderr
    pub echo: bool,
}

impl SpawnOptions {
    /// Options for `program` with no arguments, output inherited.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets several environment variables.
    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Sets the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Capture output into the handle.
    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Echo captured output to the parent's streams.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Program and arguments joined with spaces.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        command
    }
}

/// Outcome of [`ChildProcessRegistry::kill_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KillReport {
    /// Handles the signal was delivered to
    pub signaled: usize,
    /// Handles whose signal delivery failed
    pub failed: usize,
    /// Close events observed
    pub closed: usize,
}

type HandleMap = Arc<Mutex<HashMap<HandleId, ProcessHandle>>>;

fn lock(map: &HandleMap) -> MutexGuard<'_, HashMap<HandleId, ProcessHandle>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tracks every live child process spawned by fox.
///
/// Each spawned process removes itself from the registry when it closes, no
/// matter who stopped it. [`kill_all`](Self::kill_all) signals everything
/// still registered and waits for all of it to close.
///
/// All methods that spawn must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct ChildProcessRegistry {
    handles: HandleMap,
    signaller: Arc<dyn Signaller>,
}

impl ChildProcessRegistry {
    /// Create a registry delivering signals through the OS
    pub fn new() -> Self {
        Self::with_signaller(Arc::new(OsSignaller))
    }

    /// Create a registry with a custom signal sender
    pub fn with_signaller(signaller: Arc<dyn Signaller>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(HashMap::new())),
            signaller,
        }
    }

    /// Launches a subprocess and registers it.
    ///
    /// With `capture` set, stdout and stderr are read line by line into the
    /// handle, otherwise they are inherited. Stdin is closed.
    #[tracing::instrument(skip(self, options), fields(command = %options.command_line()))]
    pub fn spawn(&self, options: SpawnOptions) -> Result<ProcessHandle> {
        self.launch(options, false)
    }

    /// Launches a subprocess with a message channel and registers it.
    ///
    /// Same as [`spawn`](Self::spawn) except stdin stays open; write to it
    /// with [`ProcessHandle::send_message`].
    #[tracing::instrument(skip(self, options), fields(command = %options.command_line()))]
    pub fn fork(&self, options: SpawnOptions) -> Result<ProcessHandle> {
        self.launch(options, true)
    }

    /// Launches a process that outlives fox. It is not registered and
    /// [`kill_all`](Self::kill_all) never touches it.
    #[tracing::instrument(skip(self, options), fields(command = %options.command_line()))]
    pub fn spawn_detached(&self, options: SpawnOptions) -> Result<u32> {
        let mut command = options.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = command.spawn().map_err(|e| {
            Error::Process(format!("Failed to start '{}': {}", options.program, e))
        })?;
        let pid = child.id();
        tracing::info!(pid, "Started detached process");
        Ok(pid)
    }

    fn launch(&self, options: SpawnOptions, channel: bool) -> Result<ProcessHandle> {
        let mut command = options.to_command();
        command.stdin(if channel { Stdio::piped() } else { Stdio::null() });
        if options.capture {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        let mut child = command.spawn().map_err(|e| {
            tracing::error!(error = %e, "Failed to spawn process");
            Error::Process(format!("Failed to start '{}': {}", options.program, e))
        })?;

        let handle = ProcessHandle::new(child.id(), options.command_line(), child.stdin.take());
        lock(&self.handles).insert(handle.id(), handle.clone());
        tracing::debug!(pid = handle.pid(), handle_id = %handle.id(), "Registered child process");

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump(
                stdout,
                handle.clone(),
                OutputStream::Stdout,
                options.echo,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump(
                stderr,
                handle.clone(),
                OutputStream::Stderr,
                options.echo,
            )));
        }

        tokio::spawn(reap(child, readers, handle.clone(), Arc::clone(&self.handles)));

        Ok(handle)
    }

    /// Removes a handle without signalling it. Removing an absent handle is a
    /// no-op; returns whether anything was removed.
    pub fn remove(&self, handle: &ProcessHandle) -> bool {
        let removed = lock(&self.handles).remove(&handle.id()).is_some();
        if !removed {
            tracing::debug!(pid = handle.pid(), "Handle already removed from registry");
        }
        removed
    }

    /// Sends `signal` to one handle. A closed handle is left alone: its PID
    /// may already belong to another process.
    pub fn signal(&self, handle: &ProcessHandle, signal: TerminationSignal) -> Result<()> {
        if handle.is_closed() {
            tracing::debug!(pid = handle.pid(), %signal, "Process already closed, not signalling");
            return Ok(());
        }
        tracing::debug!(pid = handle.pid(), %signal, "Sending signal");
        self.signaller.send(handle.pid(), signal)?;
        handle.mark_signaled();
        Ok(())
    }

    /// Signals every registered process, then waits for all of them to close.
    ///
    /// Signals go out back to back without waiting for earlier closes. A
    /// failed delivery is logged and counted; the remaining handles are still
    /// signalled and every close is still awaited. Handles that closed after
    /// the snapshot are not signalled but still count as closed.
    #[tracing::instrument(skip(self))]
    pub async fn kill_all(&self, signal: TerminationSignal) -> KillReport {
        let handles = self.handles();
        if handles.is_empty() {
            tracing::debug!("No child processes to stop");
            return KillReport::default();
        }

        tracing::info!(count = handles.len(), "Stopping child processes");
        let mut report = KillReport::default();
        for handle in &handles {
            if handle.is_closed() {
                continue;
            }
            match self.signal(handle, signal) {
                Ok(()) => report.signaled += 1,
                Err(e) => {
                    tracing::warn!(pid = handle.pid(), error = %e, "Failed to deliver signal");
                    report.failed += 1;
                }
            }
        }

        report.closed = join_all(handles.iter().map(|h| h.wait_closed()))
            .await
            .len();
        tracing::info!(?report, "Child processes stopped");
        report
    }

    /// Resolves once no registered process is left.
    pub async fn wait_idle(&self) {
        loop {
            let handles = self.handles();
            if handles.is_empty() {
                return;
            }
            join_all(handles.iter().map(|h| h.wait_closed())).await;
        }
    }

    /// Snapshot of the registered handles
    pub fn handles(&self) -> Vec<ProcessHandle> {
        lock(&self.handles).values().cloned().collect()
    }

    /// Whether `handle` is still registered
    pub fn contains(&self, handle: &ProcessHandle) -> bool {
        lock(&self.handles).contains_key(&handle.id())
    }

    /// Number of registered handles
    pub fn len(&self) -> usize {
        lock(&self.handles).len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ChildProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn pump<R>(reader: R, handle: ProcessHandle, stream: OutputStream, echo: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => {
                if echo {
                    match stream {
                        OutputStream::Stdout => println!("{}", line),
                        OutputStream::Stderr => eprintln!("{}", line),
                    }
                }
                handle.append(stream, &line);
            }
            Err(e) => {
                tracing::debug!(pid = handle.pid(), error = %e, "Stopped reading output");
                break;
            }
        }
    }
}

async fn reap(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    handle: ProcessHandle,
    handles: HandleMap,
) {
    let exit = match child.status().await {
        Ok(status) => ExitInfo {
            code: status.code(),
            success: status.success(),
        },
        Err(e) => {
            tracing::warn!(pid = handle.pid(), error = %e, "Failed to wait for process");
            ExitInfo {
                code: None,
                success: false,
            }
        }
    };

    if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, join_all(readers))
        .await
        .is_err()
    {
        tracing::debug!(pid = handle.pid(), "Output still open after exit");
    }

    // Leave the registry before anyone can observe the close.
    lock(&handles).remove(&handle.id());
    tracing::debug!(pid = handle.pid(), code = ?exit.code, "Child process closed");
    handle.mark_closed(exit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::handle::TerminationState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSignaller {
        sent: AtomicUsize,
    }

    impl Signaller for CountingSignaller {
        fn send(&self, _pid: u32, _signal: TerminationSignal) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A handle whose process exited but which is still in the map, as
    /// between a snapshot and the reaper's removal.
    fn closed_handle(registry: &ChildProcessRegistry) -> ProcessHandle {
        let handle = ProcessHandle::new(4242, "node server.js".to_string(), None);
        handle.mark_closed(ExitInfo {
            code: Some(0),
            success: true,
        });
        lock(&registry.handles).insert(handle.id(), handle.clone());
        handle
    }

    #[tokio::test]
    async fn test_kill_all_skips_closed_handles() {
        let signaller = Arc::new(CountingSignaller::default());
        let registry = ChildProcessRegistry::with_signaller(signaller.clone());
        let handle = closed_handle(&registry);

        let report = registry.kill_all(TerminationSignal::Kill).await;

        assert_eq!(signaller.sent.load(Ordering::SeqCst), 0);
        assert_eq!(report.signaled, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.closed, 1);
        assert_eq!(handle.termination_state(), TerminationState::Closed);
    }

    #[test]
    fn test_signal_ignores_closed_handle() {
        let signaller = Arc::new(CountingSignaller::default());
        let registry = ChildProcessRegistry::with_signaller(signaller.clone());
        let handle = closed_handle(&registry);

        registry.signal(&handle, TerminationSignal::Interrupt).unwrap();

        assert_eq!(signaller.sent.load(Ordering::SeqCst), 0);
    }
}
