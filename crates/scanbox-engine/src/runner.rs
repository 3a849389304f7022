//! The seam between scan orchestration and engine processes.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::EngineError;

/// Extra environment passed to every engine process.
pub const ENGINE_ENV: [(&str, &str); 2] = [
    ("SEMGREP_MCP", "true"),
    ("SEMGREP_USER_AGENT_APPEND", "(scanbox)"),
];

/// A fully described engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: PathBuf,
    args: Vec<OsString>,
    workdir: PathBuf,
    timeout: Duration,
}

impl EngineCommand {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
            timeout,
        }
    }

    /// Builds the one-shot scan of `target` with the given rule configuration.
    ///
    /// Produces `scan --json --experimental --config <config> <target>`.
    #[must_use]
    pub fn scan(program: &Path, config: &OsStr, target: &Path, timeout: Duration) -> Self {
        Self::new(program, target, timeout)
            .arg("scan")
            .arg("--json")
            .arg("--experimental")
            .arg("--config")
            .arg(config)
            .arg(target)
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Executable to run.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments in order.
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Working directory of the process.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Wall-clock budget for the run.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Record of a completed engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    program: PathBuf,
    args: Vec<OsString>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i32>,
}

impl EngineInvocation {
    /// Assembles an invocation record.
    #[must_use]
    pub fn new(
        command: &EngineCommand,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        exit_code: Option<i32>,
    ) -> Self {
        Self {
            program: command.program.clone(),
            args: command.args.clone(),
            stdout,
            stderr,
            exit_code,
        }
    }

    /// Executable that ran.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments it ran with.
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Captured stdout.
    #[must_use]
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// Captured stdout as lossy UTF-8.
    #[must_use]
    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Captured stderr.
    #[must_use]
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Exit code, when the process exited normally.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

/// Runs engine commands to completion.
///
/// The production implementation is [`ProcessRunner`](crate::ProcessRunner).
/// Tests substitute doubles that return canned invocations.
pub trait EngineRunner: Send + Sync {
    /// Runs `command`, honouring its timeout and `cancel`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Execution`] for a nonzero exit,
    /// [`EngineError::Timeout`] or [`EngineError::Cancelled`] when the run
    /// was cut short, and [`EngineError::Spawn`] when it never started.
    fn run(
        &self,
        command: &EngineCommand,
        cancel: &CancelToken,
    ) -> Result<EngineInvocation, EngineError>;
}
