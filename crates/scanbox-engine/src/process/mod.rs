//! Process-based engine execution.
//!
//! [`ProcessRunner`] starts the engine in a fresh process group with stdin
//! closed, drains stdout and stderr on dedicated threads so a chatty engine
//! never blocks on a full pipe, and polls for exit. On timeout or
//! cancellation the whole group is killed so helper processes the engine
//! forked do not outlive the scan.

use std::io::{self, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::runner::{ENGINE_ENV, EngineCommand, EngineInvocation, EngineRunner};

/// Tracing target for engine process operations.
const PROCESS_TARGET: &str = "scanbox_engine::process";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Longest wait a deadline can express; larger budgets are clamped to it.
const LONGEST_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Runs engine commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EngineRunner for ProcessRunner {
    fn run(
        &self,
        command: &EngineCommand,
        cancel: &CancelToken,
    ) -> Result<EngineInvocation, EngineError> {
        let mut child = spawn(command)?;
        let stdout_reader = child.stdout.take().map(drain);
        let stderr_reader = child.stderr.take().map(drain);

        let waited = wait_for_exit(&mut child, command.timeout(), cancel);
        // Anything the engine left running would keep the pipes open.
        signal_group(&child);

        let stdout = collect(stdout_reader)?;
        let stderr = collect(stderr_reader)?;
        let status = waited?;

        debug!(
            target: PROCESS_TARGET,
            program = %command.program().display(),
            ?status,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "engine process exited"
        );

        if status.success() {
            Ok(EngineInvocation::new(command, stdout, stderr, status.code()))
        } else {
            Err(EngineError::Execution {
                status: status.code(),
                stderr,
            })
        }
    }
}

fn spawn(command: &EngineCommand) -> Result<Child, EngineError> {
    debug!(
        target: PROCESS_TARGET,
        program = %command.program().display(),
        args = ?command.args(),
        timeout_secs = command.timeout().as_secs(),
        "spawning engine process"
    );

    Command::new(command.program())
        .args(command.args())
        .current_dir(command.workdir())
        .envs(ENGINE_ENV)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|source| EngineError::Spawn {
            program: command.program().to_path_buf(),
            source: source.into(),
        })
}

fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        pipe.read_to_end(&mut buffer)?;
        Ok(buffer)
    })
}

fn collect(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> Result<Vec<u8>, EngineError> {
    let Some(handle) = handle else {
        return Ok(Vec::new());
    };
    handle
        .join()
        .map_err(|_| EngineError::io(io::Error::other("pipe reader thread panicked")))?
        .map_err(EngineError::io)
}

/// Waits for the child to exit, killing its group on timeout or cancellation.
fn wait_for_exit(
    child: &mut Child,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<ExitStatus, EngineError> {
    let deadline = deadline_after(timeout);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(error) => {
                terminate(child);
                return Err(EngineError::io(error));
            }
        }
        if cancel.is_cancelled() {
            debug!(target: PROCESS_TARGET, pid = child.id(), "engine run cancelled");
            terminate(child);
            return Err(EngineError::Cancelled);
        }
        if Instant::now() >= deadline {
            warn!(
                target: PROCESS_TARGET,
                pid = child.id(),
                timeout_secs = timeout.as_secs(),
                "engine timed out, killing process group"
            );
            terminate(child);
            return Err(EngineError::Timeout { timeout });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Returns the instant `timeout` from now.
///
/// Budgets too large for the platform clock are clamped rather than allowed
/// to overflow.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(LONGEST_WAIT))
        .unwrap_or(now)
}

/// Kills the child's process group and reaps the child.
pub(crate) fn terminate(child: &mut Child) {
    signal_group(child);
    drop(child.kill());
    drop(child.wait());
}

/// Sends `SIGKILL` to every process in the child's group.
///
/// Children are spawned as group leaders, so the group id equals the pid.
fn signal_group(child: &Child) {
    let Ok(raw) = i32::try_from(child.id()) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => warn!(
            target: PROCESS_TARGET,
            pid = raw,
            %errno,
            "failed to signal engine process group"
        ),
    }
}
