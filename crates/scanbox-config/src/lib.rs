//! Shared configuration for the scanbox daemon and its libraries.
//!
//! [`Config`] is loaded through `ortho_config`, which layers built-in defaults,
//! an optional configuration file, `SCANBOX_*` environment variables, and
//! command-line flags, in increasing order of precedence. Every field is
//! optional on the wire; accessors apply the defaults from this crate so
//! callers never have to repeat them.

mod credentials;
mod defaults;
mod modes;

use std::path::Path;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use credentials::{
    APP_TOKEN_ENV, CredentialsError, SETTINGS_FILE_ENV, SessionToken, TokenSource,
    resolve_session_token, resolve_session_token_from,
};
pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_MAX_CONCURRENT_SCANS, DEFAULT_SESSION_STARTUP_TIMEOUT_SECS,
    DEFAULT_TIMEOUT_SECS,
    default_execution_mode, default_log_filter, default_log_format,
    default_session_startup_timeout, default_timeout,
};
pub use modes::{ExecutionMode, LogFormat, ModeParseError};

/// Runtime configuration shared by the daemon and the scan libraries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SCANBOX")]
pub struct Config {
    /// Engine executable tried before the built-in install locations.
    pub engine_path: Option<Utf8PathBuf>,
    /// Whether requests use one-shot processes or a persistent session.
    pub execution_mode: Option<ExecutionMode>,
    /// Timeout applied when a request does not carry its own.
    pub default_timeout_secs: Option<u64>,
    /// Budget for starting and authenticating an engine session.
    pub session_startup_timeout_secs: Option<u64>,
    /// Upper bound on scans running at once in the daemon.
    pub max_concurrent_scans: Option<u64>,
    /// Token presented during the session handshake.
    pub session_token: Option<String>,
    /// Parent directory for per-request workspaces; the system temp dir when
    /// unset.
    pub workspace_dir: Option<Utf8PathBuf>,
    /// `tracing` filter expression.
    pub log_filter: Option<String>,
    /// Log output format.
    pub log_format: Option<LogFormat>,
}

impl Config {
    /// Returns the configured engine override, if any.
    #[must_use]
    pub fn engine_path(&self) -> Option<&Path> {
        self.engine_path.as_deref().map(camino::Utf8Path::as_std_path)
    }

    /// Returns the resolved execution mode.
    #[must_use]
    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode.unwrap_or_else(default_execution_mode)
    }

    /// Returns the default per-request timeout.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout_secs
            .filter(|secs| *secs > 0)
            .map_or_else(default_timeout, Duration::from_secs)
    }

    /// Returns the session startup budget.
    #[must_use]
    pub fn session_startup_timeout(&self) -> Duration {
        self.session_startup_timeout_secs
            .filter(|secs| *secs > 0)
            .map_or_else(default_session_startup_timeout, Duration::from_secs)
    }

    /// Returns how many scans may run at once; never zero.
    #[must_use]
    pub fn max_concurrent_scans(&self) -> usize {
        self.max_concurrent_scans
            .filter(|count| *count > 0)
            .and_then(|count| usize::try_from(count).ok())
            .unwrap_or(DEFAULT_MAX_CONCURRENT_SCANS)
    }

    /// Returns the parent directory for workspaces, if overridden.
    #[must_use]
    pub fn workspace_dir(&self) -> Option<&Path> {
        self.workspace_dir.as_deref().map(camino::Utf8Path::as_std_path)
    }

    /// Returns the log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Returns the log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn accessors_apply_defaults() {
        let config = Config::default();

        assert_eq!(config.execution_mode(), ExecutionMode::OneShot);
        assert_eq!(config.default_timeout(), default_timeout());
        assert_eq!(
            config.session_startup_timeout(),
            default_session_startup_timeout()
        );
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert!(config.engine_path().is_none());
        assert!(config.workspace_dir().is_none());
        assert_eq!(config.max_concurrent_scans(), DEFAULT_MAX_CONCURRENT_SCANS);
    }

    #[rstest]
    #[case::unset(None, DEFAULT_MAX_CONCURRENT_SCANS)]
    #[case::zero(Some(0), DEFAULT_MAX_CONCURRENT_SCANS)]
    #[case::explicit(Some(2), 2)]
    fn concurrency_limit_is_never_zero(
        #[case] configured: Option<u64>,
        #[case] expected: usize,
    ) {
        let config = Config {
            max_concurrent_scans: configured,
            ..Config::default()
        };

        assert_eq!(config.max_concurrent_scans(), expected);
    }

    #[rstest]
    fn zero_timeouts_fall_back_to_defaults() {
        let config = Config {
            default_timeout_secs: Some(0),
            session_startup_timeout_secs: Some(0),
            ..Config::default()
        };

        assert_eq!(config.default_timeout(), default_timeout());
        assert_eq!(
            config.session_startup_timeout(),
            default_session_startup_timeout()
        );
    }

    #[rstest]
    fn explicit_values_are_returned() {
        let config = Config {
            engine_path: Some(Utf8PathBuf::from("/opt/engine/bin/semgrep")),
            execution_mode: Some(ExecutionMode::Session),
            default_timeout_secs: Some(5),
            log_filter: Some("debug".to_owned()),
            log_format: Some(LogFormat::Compact),
            ..Config::default()
        };

        assert_eq!(
            config.engine_path(),
            Some(Path::new("/opt/engine/bin/semgrep"))
        );
        assert_eq!(config.execution_mode(), ExecutionMode::Session);
        assert_eq!(config.default_timeout(), Duration::from_secs(5));
        assert_eq!(config.log_filter(), "debug");
        assert_eq!(config.log_format(), LogFormat::Compact);
    }
}
