//! Persistent, authenticated engine sessions.
//!
//! An [`EngineSession`] keeps one engine process alive across scans and talks
//! to it over newline-delimited JSON-RPC on stdio. Calls are serialized
//! through a mutex over the channel; each call owns a deadline that covers
//! both waiting for the channel and waiting for the response.
//!
//! Transport-level failures (a timed-out call, a closed channel, or a line that
//! is not a protocol response) kill the process and leave the session
//! [`SessionState::Degraded`]. Engine-reported errors and undecodable reports
//! are returned to the caller and the session stays ready.

mod error;
mod state;
mod transport;
mod wire;

use std::env;
use std::fmt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use scanbox_core::ScanResult;
use serde_json::Value;
use tracing::{debug, info, warn};

pub use self::error::SessionError;
pub use self::state::SessionState;
use self::transport::{LineTransport, ReceiveError};
use self::wire::{
    AuthenticateParams, AuthenticateResult, METHOD_AUTHENTICATE, METHOD_SCAN_FILES,
    METHOD_SHUTDOWN, ScanFilesParams, WireFile, WireRequest, WireResponse, decode_report,
};
use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::process::{ProcessRunner, deadline_after, terminate};
use crate::runner::{ENGINE_ENV, EngineCommand, EngineRunner};

const SESSION_TARGET: &str = "scanbox_engine::session";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// How to launch and authenticate a session engine.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSettings {
    args: Vec<String>,
    token: Option<String>,
    startup_timeout: Duration,
    workdir: PathBuf,
}

impl SessionSettings {
    /// Settings with the default `mcp --pro` arguments, a 30 second startup
    /// budget, and the system temporary directory as working directory.
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            args: vec!["mcp".to_owned(), "--pro".to_owned()],
            token,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            workdir: env::temp_dir(),
        }
    }

    /// Replaces the arguments the session process is started with.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Sets the budget for the version check and the handshake together.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Sets the working directory of the session process.
    #[must_use]
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Arguments the session process is started with.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Startup budget.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("args", &self.args)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("startup_timeout", &self.startup_timeout)
            .field("workdir", &self.workdir)
            .finish()
    }
}

/// One file submitted to a session scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    /// Absolute path of the materialized file.
    pub path: PathBuf,
    /// File content.
    pub content: String,
}

/// A session that serves scans.
///
/// Implemented by [`EngineSession`]; tests substitute scripted doubles.
pub trait ScanSession: Send + Sync {
    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Scans `files` with the rule configuration `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] describing why the call failed. Transport
    /// failures also move the session to [`SessionState::Degraded`].
    fn scan_files(
        &self,
        files: &[SessionFile],
        config: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<ScanResult, SessionError>;

    /// Stops the session. Idempotent.
    fn shutdown(&self);
}

/// Starts sessions for a located engine.
pub trait SessionLauncher: Send + Sync {
    /// Starts and authenticates a session backed by `program`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Authentication`] when the session cannot be
    /// brought to [`SessionState::Ready`].
    fn launch(&self, program: &Path) -> Result<Arc<dyn ScanSession>, SessionError>;
}

/// Launches [`EngineSession`]s with fixed settings.
#[derive(Debug, Clone)]
pub struct EngineSessionLauncher {
    settings: SessionSettings,
}

impl EngineSessionLauncher {
    /// Creates a launcher.
    #[must_use]
    pub const fn new(settings: SessionSettings) -> Self {
        Self { settings }
    }
}

impl SessionLauncher for EngineSessionLauncher {
    fn launch(&self, program: &Path) -> Result<Arc<dyn ScanSession>, SessionError> {
        let session = EngineSession::new(program, self.settings.clone());
        session.start()?;
        Ok(Arc::new(session))
    }
}

struct Channel {
    child: Child,
    transport: LineTransport,
}

/// A long-lived engine process speaking the session protocol.
pub struct EngineSession {
    program: PathBuf,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    channel: Mutex<Option<Channel>>,
}

impl EngineSession {
    /// Creates a session in [`SessionState::NotStarted`].
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, settings: SessionSettings) -> Self {
        Self {
            program: program.into(),
            settings,
            state: Mutex::new(SessionState::NotStarted),
            channel: Mutex::new(None),
        }
    }

    /// Checks session support, spawns the engine, and authenticates.
    ///
    /// Any failure leaves the session [`SessionState::Stopped`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] when called on a session that has
    /// already been started, and [`SessionError::Authentication`] for every
    /// start failure.
    pub fn start(&self) -> Result<(), SessionError> {
        {
            let mut state = self.lock_state();
            if *state != SessionState::NotStarted {
                return Err(SessionError::NotReady { state: *state });
            }
            *state = SessionState::Starting;
        }

        match self.establish() {
            Ok(channel) => {
                *self.lock_channel() = Some(channel);
                self.set_state(SessionState::Ready);
                info!(
                    target: SESSION_TARGET,
                    program = %self.program.display(),
                    "engine session ready"
                );
                Ok(())
            }
            Err(error) => {
                self.set_state(SessionState::Stopped);
                warn!(target: SESSION_TARGET, %error, "engine session failed to start");
                Err(error)
            }
        }
    }

    fn establish(&self) -> Result<Channel, SessionError> {
        let deadline = deadline_after(self.settings.startup_timeout);
        let token = self
            .settings
            .token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| SessionError::authentication("no session token configured"))?;

        self.check_session_support()?;

        let mut child = Command::new(&self.program)
            .args(&self.settings.args)
            .current_dir(&self.settings.workdir)
            .envs(ENGINE_ENV)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|error| {
                SessionError::authentication(format!("failed to start session engine: {error}"))
            })?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            terminate(&mut child);
            return Err(SessionError::authentication("session engine stdio unavailable"));
        };
        let mut channel = Channel {
            child,
            transport: LineTransport::new(stdout, stdin),
        };

        match authenticate(&mut channel, token, deadline) {
            Ok(()) => Ok(channel),
            Err(reason) => {
                terminate(&mut channel.child);
                Err(SessionError::authentication(reason))
            }
        }
    }

    fn check_session_support(&self) -> Result<(), SessionError> {
        let check = EngineCommand::new(
            &self.program,
            &self.settings.workdir,
            self.settings.startup_timeout,
        )
        .arg("--pro")
        .arg("--version");
        match ProcessRunner::new().run(&check, &CancelToken::new()) {
            Ok(invocation) => {
                debug!(
                    target: SESSION_TARGET,
                    version = %invocation.stdout_text().trim(),
                    "engine supports sessions"
                );
                Ok(())
            }
            Err(EngineError::Execution { status, .. }) => Err(SessionError::authentication(
                format!(
                    "engine does not support sessions (--pro --version exited with {})",
                    status.map_or_else(|| "a signal".to_owned(), |code| code.to_string())
                ),
            )),
            Err(error) => Err(SessionError::authentication(format!(
                "session support check failed: {error}"
            ))),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_channel(&self) -> MutexGuard<'_, Option<Channel>> {
        self.channel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: SessionState) {
        *self.lock_state() = next;
    }

    /// Waits for the channel until `deadline`, giving up early on
    /// cancellation or when another caller has degraded the session.
    fn acquire_channel(
        &self,
        deadline: Instant,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<MutexGuard<'_, Option<Channel>>, SessionError> {
        loop {
            match self.channel.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {}
            }
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            let state = self.state();
            if state != SessionState::Ready {
                return Err(SessionError::NotReady { state });
            }
            if Instant::now() >= deadline {
                return Err(SessionError::QueueTimeout { timeout });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Kills the process and marks the session degraded.
    fn degrade(&self, slot: &mut Option<Channel>, error: &SessionError) {
        warn!(target: SESSION_TARGET, %error, "engine session degraded");
        if let Some(mut channel) = slot.take() {
            terminate(&mut channel.child);
        }
        let mut state = self.lock_state();
        if *state != SessionState::Stopped {
            *state = SessionState::Degraded;
        }
    }

    fn call(
        &self,
        slot: &mut Option<Channel>,
        request: &WireRequest<'_>,
        deadline: Instant,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Value, SessionError> {
        let state = self.state();
        let Some(channel) = slot.as_mut().filter(|_| state == SessionState::Ready) else {
            return Err(SessionError::NotReady { state });
        };
        let line = serde_json::to_string(request).map_err(|error| SessionError::Malformed {
            reason: error.to_string(),
        })?;
        if let Err(error) = channel.transport.send(&line) {
            debug!(target: SESSION_TARGET, %error, "failed to write session request");
            let failure = SessionError::ChannelClosed;
            self.degrade(slot, &failure);
            return Err(failure);
        }

        match await_response(channel, request.id, deadline, timeout, cancel) {
            Ok(Reply::Result(value)) => Ok(value),
            Ok(Reply::Error { code, message }) => Err(SessionError::Engine { code, message }),
            Err(SessionError::Cancelled) => {
                debug!(target: SESSION_TARGET, id = request.id, "session call abandoned");
                Err(SessionError::Cancelled)
            }
            Err(failure) => {
                self.degrade(slot, &failure);
                Err(failure)
            }
        }
    }
}

impl ScanSession for EngineSession {
    fn state(&self) -> SessionState {
        *self.lock_state()
    }

    fn scan_files(
        &self,
        files: &[SessionFile],
        config: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<ScanResult, SessionError> {
        let deadline = deadline_after(timeout);
        let state = self.state();
        if state != SessionState::Ready {
            return Err(SessionError::NotReady { state });
        }

        let mut slot = self.acquire_channel(deadline, timeout, cancel)?;
        let wire_params = ScanFilesParams {
            files: files
                .iter()
                .map(|file| WireFile {
                    file: file.path.to_string_lossy(),
                    content: &file.content,
                })
                .collect(),
            config,
        };
        let params = serde_json::to_value(wire_params).map_err(|error| SessionError::Malformed {
            reason: error.to_string(),
        })?;
        let request = WireRequest::new(METHOD_SCAN_FILES, Some(params));
        debug!(
            target: SESSION_TARGET,
            id = request.id,
            files = files.len(),
            "sending session scan"
        );

        let result = self.call(&mut slot, &request, deadline, timeout, cancel)?;
        Ok(decode_report(result)?)
    }

    fn shutdown(&self) {
        let mut slot = self.lock_channel();
        self.set_state(SessionState::Stopped);
        let Some(mut channel) = slot.take() else {
            return;
        };
        let request = WireRequest::new(METHOD_SHUTDOWN, None);
        if let Ok(line) = serde_json::to_string(&request) {
            drop(channel.transport.send(&line));
        }
        let grace_end = Instant::now() + SHUTDOWN_GRACE;
        while Instant::now() < grace_end {
            if matches!(channel.child.try_wait(), Ok(Some(_))) {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        terminate(&mut channel.child);
        info!(target: SESSION_TARGET, "engine session stopped");
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if let Some(mut channel) = self.lock_channel().take() {
            terminate(&mut channel.child);
        }
    }
}

enum Reply {
    Result(Value),
    Error { code: i64, message: String },
}

/// Reads lines until the response for `id` arrives, skipping others.
fn await_response(
    channel: &Channel,
    id: i64,
    deadline: Instant,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<Reply, SessionError> {
    loop {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SessionError::Timeout { timeout });
        }
        let line = match channel.transport.receive(remaining.min(POLL_INTERVAL)) {
            Ok(line) => line,
            Err(ReceiveError::Timeout(_)) => continue,
            Err(ReceiveError::Closed) => return Err(SessionError::ChannelClosed),
            Err(ReceiveError::Io(error)) => {
                return Err(SessionError::Malformed {
                    reason: error.to_string(),
                });
            }
        };
        let response: WireResponse =
            serde_json::from_str(&line).map_err(|error| SessionError::Malformed {
                reason: error.to_string(),
            })?;
        if response.id != Some(id) {
            debug!(
                target: SESSION_TARGET,
                expected = id,
                received = ?response.id,
                "skipping unrelated session response"
            );
            continue;
        }
        if let Some(error) = response.error {
            return Ok(Reply::Error {
                code: error.code,
                message: error.message,
            });
        }
        return Ok(Reply::Result(response.result.unwrap_or(Value::Null)));
    }
}

/// Runs the token handshake. Errors are reasons for an authentication failure.
fn authenticate(channel: &mut Channel, token: &str, deadline: Instant) -> Result<(), String> {
    let params = serde_json::to_value(AuthenticateParams { token }).map_err(|e| e.to_string())?;
    let request = WireRequest::new(METHOD_AUTHENTICATE, Some(params));
    let line = serde_json::to_string(&request).map_err(|e| e.to_string())?;
    channel
        .transport
        .send(&line)
        .map_err(|error| format!("failed to send credentials: {error}"))?;

    let budget = deadline.saturating_duration_since(Instant::now());
    let reply = await_response(channel, request.id, deadline, budget, &CancelToken::new())
        .map_err(|error| format!("no handshake response: {error}"))?;
    match reply {
        Reply::Error { message, .. } => Err(format!("engine rejected credentials: {message}")),
        Reply::Result(value) => {
            let result: AuthenticateResult = serde_json::from_value(value).unwrap_or_default();
            if result.authenticated {
                Ok(())
            } else {
                Err("engine rejected credentials".to_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests;
