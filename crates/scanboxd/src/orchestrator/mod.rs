//! Scan request orchestration.
//!
//! [`ScanOrchestrator`] drives one request from validation to a normalized
//! result: it materializes the files into a fresh workspace, runs the engine
//! one-shot or through the shared session, strips workspace paths from the
//! report, and tears the workspace down on every exit path.

use std::borrow::Cow;
use std::env;
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use scanbox_config::{Config, ExecutionMode};
use scanbox_core::{
    FilePayload, RuleSpec, ScanRequest, ScanResult, parse_engine_output, redact_rule_files,
    strip,
};
use scanbox_engine::{
    CancelToken, EngineCommand, EngineLocator, EngineRunner, EngineSessionLauncher,
    ProcessRunner, ScanSession, SessionError, SessionFile, SessionLauncher, SessionSettings,
    SessionState,
};
use scanbox_workspace::{Workspace, WorkspaceManager, read_local_files};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ScanError;
use crate::reporter::{ScanReporter, StructuredScanReporter};
use crate::schema::{NoSchemaSource, SchemaFetcher};

const ORCHESTRATOR_TARGET: &str = "scanboxd::orchestrator";

/// How a successful scan was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// A dedicated engine process.
    OneShot,
    /// The shared engine session.
    Session,
    /// A dedicated engine process because the session was unavailable.
    Fallback,
}

impl ScanMode {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneShot => "one_shot",
            Self::Session => "session",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    /// Normalized engine report.
    pub result: ScanResult,
    /// How the engine was run.
    pub mode: ScanMode,
}

enum SessionSlot {
    /// No launch has been attempted since startup or the last restart.
    Idle,
    Active(Arc<dyn ScanSession>),
    /// The last launch failed; requests run one-shot until a restart.
    Failed,
}

/// Runs scan requests against the engine.
///
/// The orchestrator is shared across request threads. Each request gets its
/// own workspace; only the engine session is shared.
pub struct ScanOrchestrator {
    config: Config,
    locator: &'static EngineLocator,
    workspaces: WorkspaceManager,
    runner: Arc<dyn EngineRunner>,
    launcher: Arc<dyn SessionLauncher>,
    reporter: Arc<dyn ScanReporter>,
    schema: Arc<dyn SchemaFetcher>,
    session: Mutex<SessionSlot>,
}

impl ScanOrchestrator {
    /// Creates an orchestrator with the production collaborators.
    ///
    /// The session launcher only sees the token set directly in `config`; use
    /// [`Self::with_launcher`] to supply a token resolved from elsewhere.
    #[must_use]
    pub fn new(config: Config, locator: &'static EngineLocator) -> Self {
        let workspaces = config
            .workspace_dir()
            .map_or_else(WorkspaceManager::new, WorkspaceManager::with_parent);
        let settings = session_settings(&config, config.session_token.clone());
        Self {
            config,
            locator,
            workspaces,
            runner: Arc::new(ProcessRunner::new()),
            launcher: Arc::new(EngineSessionLauncher::new(settings)),
            reporter: Arc::new(StructuredScanReporter::new()),
            schema: Arc::new(NoSchemaSource),
            session: Mutex::new(SessionSlot::Idle),
        }
    }

    /// Replaces the one-shot runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn EngineRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replaces the session launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn SessionLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replaces the lifecycle reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ScanReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces the rule schema source.
    #[must_use]
    pub fn with_schema_fetcher(mut self, schema: Arc<dyn SchemaFetcher>) -> Self {
        self.schema = schema;
        self
    }

    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Scans `request`.
    ///
    /// # Errors
    ///
    /// Returns a [`ScanError`] describing the first step that failed. The
    /// workspace is removed whether or not the scan succeeds.
    pub fn scan(&self, request: &ScanRequest) -> Result<ScanOutcome, ScanError> {
        self.scan_with_cancel(request, &CancelToken::new())
    }

    /// Scans `request`, stopping early when `cancel` is triggered.
    ///
    /// # Errors
    ///
    /// As for [`Self::scan`], plus [`ScanError::Cancelled`].
    pub fn scan_with_cancel(
        &self,
        request: &ScanRequest,
        cancel: &CancelToken,
    ) -> Result<ScanOutcome, ScanError> {
        let request_id = Uuid::new_v4();
        let files = request.files.len() + request.local_files.len();
        self.reporter.scan_started(request_id, files);
        let outcome = self.run(request_id, request, cancel);
        match &outcome {
            Ok(success) => self.reporter.scan_completed(request_id, success),
            Err(error) => self.reporter.scan_failed(request_id, error),
        }
        outcome
    }

    fn run(
        &self,
        request_id: Uuid,
        request: &ScanRequest,
        cancel: &CancelToken,
    ) -> Result<ScanOutcome, ScanError> {
        request.validate()?;
        let timeout = request
            .timeout()
            .unwrap_or_else(|| self.config.default_timeout());

        let payloads = request_payloads(request)?;
        let mut workspace = self.workspaces.acquire(request_id)?;
        let materialized = workspace.materialize(&payloads)?;
        let rule_config = match &request.rule {
            RuleSpec::Auto => "auto".to_owned(),
            RuleSpec::Config(reference) => reference.clone(),
            RuleSpec::Inline(rules) => workspace
                .write_rule_file(rules)?
                .to_string_lossy()
                .into_owned(),
        };
        let engine = self.locator.locate()?.path().to_path_buf();

        let job = Job {
            request_id,
            engine: &engine,
            workspace: &workspace,
            rule_config: &rule_config,
            timeout,
            cancel,
        };
        let (raw, mode) = match self.config.execution_mode() {
            ExecutionMode::OneShot => (self.run_one_shot(&job)?, ScanMode::OneShot),
            ExecutionMode::Session => {
                let files: Vec<SessionFile> = materialized
                    .into_iter()
                    .zip(payloads.iter())
                    .map(|(path, file)| SessionFile {
                        path,
                        content: file.content.clone(),
                    })
                    .collect();
                self.run_in_session(&job, &files)?
            }
        };

        let normalized = strip(
            redact_rule_files(raw, workspace.rule_files()),
            workspace.root(),
        );
        for warning in &normalized.warnings {
            self.reporter.normalization_warning(request_id, warning);
        }
        drop(workspace);
        Ok(ScanOutcome {
            result: normalized.result,
            mode,
        })
    }

    fn run_one_shot(&self, job: &Job<'_>) -> Result<ScanResult, ScanError> {
        let command = EngineCommand::scan(
            job.engine,
            OsStr::new(job.rule_config),
            job.workspace.root(),
            job.timeout,
        );
        let invocation = self
            .runner
            .run(&command, job.cancel)
            .map_err(|error| ScanError::from_engine(error, job.workspace))?;
        Ok(parse_engine_output(&invocation.stdout_text())?)
    }

    fn run_in_session(
        &self,
        job: &Job<'_>,
        files: &[SessionFile],
    ) -> Result<(ScanResult, ScanMode), ScanError> {
        let Some(session) = self.session_for(job.engine)? else {
            return self.fall_back(job, "engine session is not available");
        };
        match session.scan_files(files, job.rule_config, job.timeout, job.cancel) {
            Ok(result) => Ok((result, ScanMode::Session)),
            Err(error) if warrants_fallback(&error) => self.fall_back(job, &error.to_string()),
            Err(error) => Err(ScanError::from_session(error, job.workspace)),
        }
    }

    fn fall_back(
        &self,
        job: &Job<'_>,
        reason: &str,
    ) -> Result<(ScanResult, ScanMode), ScanError> {
        self.reporter.session_fallback(job.request_id, reason);
        Ok((self.run_one_shot(job)?, ScanMode::Fallback))
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionSlot> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the shared session, launching it on first use.
    ///
    /// `Ok(None)` means requests should run one-shot.
    fn session_for(&self, engine: &Path) -> Result<Option<Arc<dyn ScanSession>>, ScanError> {
        let mut slot = self.lock_session();
        if let SessionSlot::Active(session) = &*slot {
            return Ok((!session.state().is_unusable()).then(|| Arc::clone(session)));
        }
        if matches!(*slot, SessionSlot::Failed) {
            return Ok(None);
        }
        match self.launcher.launch(engine) {
            Ok(session) => {
                self.reporter.session_started();
                *slot = SessionSlot::Active(Arc::clone(&session));
                Ok(Some(session))
            }
            Err(error) => {
                *slot = SessionSlot::Failed;
                Err(launch_failure(error))
            }
        }
    }

    /// State of the shared session.
    ///
    /// A failed launch reads as [`SessionState::Stopped`].
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        match &*self.lock_session() {
            SessionSlot::Idle => SessionState::NotStarted,
            SessionSlot::Active(session) => session.state(),
            SessionSlot::Failed => SessionState::Stopped,
        }
    }

    /// Replaces a degraded, stopped, or failed session with a fresh one.
    ///
    /// A ready session is left running.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::EngineNotFound`] when the engine cannot be
    /// located and [`ScanError::Authentication`] when the new session fails to
    /// start.
    pub fn restart_session(&self) -> Result<SessionState, ScanError> {
        let mut slot = self.lock_session();
        if let SessionSlot::Active(session) = &*slot {
            let state = session.state();
            if !state.is_unusable() {
                return Ok(state);
            }
            session.shutdown();
        }
        *slot = SessionSlot::Idle;

        let engine = self.locator.locate()?.path().to_path_buf();
        match self.launcher.launch(&engine) {
            Ok(session) => {
                self.reporter.session_started();
                let state = session.state();
                *slot = SessionSlot::Active(session);
                Ok(state)
            }
            Err(error) => {
                *slot = SessionSlot::Failed;
                Err(launch_failure(error))
            }
        }
    }

    /// Stops the shared session, if one is running.
    pub fn shutdown(&self) {
        let mut slot = self.lock_session();
        if let SessionSlot::Active(session) = &*slot {
            session.shutdown();
        }
        *slot = SessionSlot::Idle;
    }

    /// Lists the languages the located engine can scan.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::EngineNotFound`] when no engine is installed, and
    /// the mapped engine failure when the listing command fails.
    pub fn supported_languages(&self) -> Result<Vec<String>, ScanError> {
        let engine = self.locator.locate()?.path().to_path_buf();
        let command = EngineCommand::new(engine, env::temp_dir(), self.config.default_timeout())
            .arg("show")
            .arg("supported-languages");
        let invocation = self
            .runner
            .run(&command, &CancelToken::new())
            .map_err(ScanError::from_engine_unscoped)?;
        let languages = invocation
            .stdout_text()
            .lines()
            .map(str::trim)
            .filter(|language| !language.is_empty())
            .map(str::to_owned)
            .collect();
        Ok(languages)
    }

    /// Returns the rule file JSON schema.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::SchemaUnavailable`] when no source can supply it.
    pub fn rule_schema(&self) -> Result<Value, ScanError> {
        Ok(self.schema.rule_schema()?)
    }

    /// Returns the YAML of a registry rule.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::SchemaUnavailable`] when no source can supply it.
    pub fn rule_yaml(&self, rule_id: &str) -> Result<String, ScanError> {
        Ok(self.schema.rule_yaml(rule_id)?)
    }
}

impl fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("execution_mode", &self.config.execution_mode())
            .field("session_state", &self.session_state())
            .finish_non_exhaustive()
    }
}

/// Submitted payloads followed by the request's local files.
fn request_payloads(request: &ScanRequest) -> Result<Cow<'_, [FilePayload]>, ScanError> {
    if request.local_files.is_empty() {
        return Ok(Cow::Borrowed(&request.files));
    }
    let mut payloads = request.files.clone();
    payloads.extend(read_local_files(&request.local_files)?);
    Ok(Cow::Owned(payloads))
}

/// Per-request inputs shared by both execution paths.
struct Job<'a> {
    request_id: Uuid,
    engine: &'a Path,
    workspace: &'a Workspace,
    rule_config: &'a str,
    timeout: Duration,
    cancel: &'a CancelToken,
}

/// Session failures after which the request is retried one-shot.
fn warrants_fallback(error: &SessionError) -> bool {
    let fallback = matches!(
        error,
        SessionError::Timeout { .. }
            | SessionError::ChannelClosed
            | SessionError::Malformed { .. }
            | SessionError::NotReady { .. }
    );
    if fallback {
        warn!(target: ORCHESTRATOR_TARGET, %error, "session call failed");
    } else {
        debug!(target: ORCHESTRATOR_TARGET, %error, "session call returned an error");
    }
    fallback
}

fn launch_failure(error: SessionError) -> ScanError {
    match error {
        SessionError::Authentication { reason } => ScanError::Authentication { reason },
        other => ScanError::Authentication {
            reason: other.to_string(),
        },
    }
}

/// Session settings derived from configuration and a resolved token.
#[must_use]
pub fn session_settings(config: &Config, token: Option<String>) -> SessionSettings {
    SessionSettings::new(token).with_startup_timeout(config.session_startup_timeout())
}
