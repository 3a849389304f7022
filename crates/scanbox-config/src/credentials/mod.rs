//! Resolution of the token used to authenticate engine sessions.
//!
//! The token is looked up in priority order: the explicit configuration value,
//! the engine's own `SEMGREP_APP_TOKEN` environment variable, and finally the
//! `api_token` key of the engine's user settings file. The settings file lives
//! at `SEMGREP_SETTINGS_FILE` when set, otherwise under `.semgrep/settings.yml`
//! inside `XDG_CONFIG_HOME` (when it names a directory) or the home directory.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::Config;

/// Environment variable carrying the engine's application token.
pub const APP_TOKEN_ENV: &str = "SEMGREP_APP_TOKEN";

/// Environment variable overriding the engine settings file location.
pub const SETTINGS_FILE_ENV: &str = "SEMGREP_SETTINGS_FILE";

const XDG_CONFIG_HOME_ENV: &str = "XDG_CONFIG_HOME";
const SETTINGS_DIR: &str = ".semgrep";
const SETTINGS_FILENAME: &str = "settings.yml";

/// Where a [`SessionToken`] was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// The `session_token` configuration value.
    Config,
    /// The [`APP_TOKEN_ENV`] environment variable.
    Environment,
    /// The engine's user settings file.
    SettingsFile,
}

/// Secret used in the session authentication handshake.
///
/// The `Debug` implementation redacts the value so tokens never reach logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    value: String,
    source: TokenSource,
}

impl SessionToken {
    /// Wraps a token value.
    #[must_use]
    pub fn new(value: impl Into<String>, source: TokenSource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    /// Returns the secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.value.as_str()
    }

    /// Returns where the token came from.
    #[must_use]
    pub const fn source(&self) -> TokenSource {
        self.source
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Errors raised while reading the engine settings file.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The settings file exists but could not be read.
    #[error("failed to read engine settings file: {source}")]
    Read {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The settings file is not valid YAML.
    #[error("engine settings file is malformed: {message}")]
    Malformed {
        /// Parser diagnostic.
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct EngineSettings {
    #[serde(default)]
    api_token: Option<String>,
}

/// Resolves the session token using the process environment.
///
/// # Errors
///
/// Returns [`CredentialsError`] when a settings file exists but cannot be read
/// or parsed.
pub fn resolve_session_token(config: &Config) -> Result<Option<SessionToken>, CredentialsError> {
    let home = dirs::home_dir();
    resolve_session_token_from(
        config.session_token.as_deref(),
        |key| std::env::var(key).ok(),
        home.as_deref(),
    )
}

/// Resolves the session token from explicit inputs.
///
/// `lookup` reads environment variables and `home` is the user's home
/// directory, which keeps resolution deterministic under test.
///
/// # Errors
///
/// Returns [`CredentialsError`] when a settings file exists but cannot be read
/// or parsed.
pub fn resolve_session_token_from<F>(
    configured: Option<&str>,
    lookup: F,
    home: Option<&Path>,
) -> Result<Option<SessionToken>, CredentialsError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = configured.filter(|value| !value.trim().is_empty()) {
        return Ok(Some(SessionToken::new(value, TokenSource::Config)));
    }

    if let Some(value) = lookup(APP_TOKEN_ENV) {
        return Ok(Some(SessionToken::new(value, TokenSource::Environment)));
    }

    let Some(path) = settings_file_path(&lookup, home) else {
        return Ok(None);
    };
    if !path.is_file() {
        return Ok(None);
    }

    let text = fs::read_to_string(&path).map_err(|source| CredentialsError::Read { source })?;
    let settings: EngineSettings =
        serde_saphyr::from_str(&text).map_err(|error| CredentialsError::Malformed {
            message: error.to_string(),
        })?;

    Ok(settings
        .api_token
        .filter(|token| !token.trim().is_empty())
        .map(|token| SessionToken::new(token, TokenSource::SettingsFile)))
}

fn settings_file_path<F>(lookup: &F, home: Option<&Path>) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(explicit) = lookup(SETTINGS_FILE_ENV) {
        return Some(PathBuf::from(explicit));
    }

    let parent = lookup(XDG_CONFIG_HOME_ENV)
        .map(PathBuf::from)
        .filter(|dir| dir.is_dir())
        .or_else(|| home.map(Path::to_path_buf))?;

    Some(parent.join(SETTINGS_DIR).join(SETTINGS_FILENAME))
}
