//! Scan requests as submitted by callers.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const REGISTRY_PREFIXES: [&str; 2] = ["p/", "r/"];
const AUTO_CONFIG: &str = "auto";

/// Longest per-request timeout a caller may ask for, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// One in-memory source file supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    /// Relative path of the file inside the scanned tree.
    pub path: String,
    /// Full text of the file.
    pub content: String,
}

impl FilePayload {
    /// Builds a payload from a relative path and its content.
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Which rules the engine should apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RuleSpec {
    /// Let the engine pick rules for the detected languages.
    #[default]
    Auto,
    /// A registry reference (`p/…`, `r/…`), `auto`, or an absolute rule path.
    Config(String),
    /// Literal YAML rule text supplied with the request.
    Inline(String),
}

impl RuleSpec {
    /// Checks that the rule source is usable before any work is done.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::RulePathTraversal`] for rule paths containing
    /// `..`, and [`RequestError::InvalidRule`] when a configuration reference
    /// is neither a registry reference nor a normalized absolute path, or when
    /// inline text is not a YAML document with a non-empty `rules` list.
    pub fn validate(&self) -> Result<(), RequestError> {
        match self {
            Self::Auto => Ok(()),
            Self::Config(reference) => validate_config_reference(reference),
            Self::Inline(text) => validate_inline_rules(text),
        }
    }
}

/// A request to scan a set of in-memory or host-local files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Files to materialize and scan.
    #[serde(default)]
    pub files: Vec<FilePayload>,
    /// Absolute paths on the daemon's host whose contents are scanned under
    /// their base names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_files: Vec<PathBuf>,
    /// Rule source; defaults to [`RuleSpec::Auto`].
    #[serde(default)]
    pub rule: RuleSpec,
    /// Wall-clock budget in seconds; the daemon default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ScanRequest {
    /// Creates a request using automatic rule selection and the default
    /// timeout.
    #[must_use]
    pub const fn new(files: Vec<FilePayload>) -> Self {
        Self {
            files,
            local_files: Vec::new(),
            rule: RuleSpec::Auto,
            timeout_secs: None,
        }
    }

    /// Adds host-local files to read at scan time.
    #[must_use]
    pub fn with_local_files(mut self, paths: Vec<PathBuf>) -> Self {
        self.local_files = paths;
        self
    }

    /// Replaces the rule source.
    #[must_use]
    pub fn with_rule(mut self, rule: RuleSpec) -> Self {
        self.rule = rule;
        self
    }

    /// Sets an explicit timeout, rounded down to whole seconds.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Returns the request's own timeout, if it carries one.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Validates the request shape.
    ///
    /// File names are checked separately when the workspace is materialized,
    /// so that every path goes through the same containment check.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the request names no files at all, for
    /// a local path that is relative or contains `..`, for a zero timeout or
    /// one above [`MAX_TIMEOUT_SECS`], and for an unusable rule source.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.files.is_empty() && self.local_files.is_empty() {
            return Err(RequestError::NoFiles);
        }
        self.local_files
            .iter()
            .try_for_each(|path| validate_local_path(path))?;
        match self.timeout_secs {
            Some(0) => return Err(RequestError::ZeroTimeout),
            Some(secs) if secs > MAX_TIMEOUT_SECS => {
                return Err(RequestError::TimeoutTooLong {
                    max_secs: MAX_TIMEOUT_SECS,
                });
            }
            _ => {}
        }
        self.rule.validate()
    }
}

/// Reasons a request is rejected before any work starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The request carries no files.
    #[error("scan request contains no files")]
    NoFiles,
    /// The request timeout is zero.
    #[error("scan timeout must be greater than zero")]
    ZeroTimeout,
    /// The request timeout exceeds the permitted maximum.
    #[error("scan timeout must not exceed {max_secs} seconds")]
    TimeoutTooLong {
        /// Largest accepted timeout, in seconds.
        max_secs: u64,
    },
    /// A host-local file path is relative or not normalized.
    #[error("invalid local file '{path}': {reason}")]
    LocalPath {
        /// The path, as supplied.
        path: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A rule file path climbs out of its directory with `..`.
    #[error("rule path '{reference}' contains '..' segments")]
    RulePathTraversal {
        /// The configuration reference, as supplied.
        reference: String,
    },
    /// The rule source is unusable.
    #[error("invalid rule source: {reason}")]
    InvalidRule {
        /// Human-readable reason.
        reason: String,
    },
}

impl RequestError {
    fn invalid_rule(reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            reason: reason.into(),
        }
    }
}

fn validate_local_path(path: &Path) -> Result<(), RequestError> {
    let reject = |reason: &str| RequestError::LocalPath {
        path: path.display().to_string(),
        reason: reason.to_owned(),
    };
    if !path.is_absolute() {
        return Err(reject("must be an absolute path"));
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(reject("contains '..' segments"));
    }
    if path.file_name().is_none() {
        return Err(reject("does not name a file"));
    }
    Ok(())
}

fn validate_config_reference(reference: &str) -> Result<(), RequestError> {
    if reference == AUTO_CONFIG
        || REGISTRY_PREFIXES
            .iter()
            .any(|prefix| reference.starts_with(prefix))
    {
        return Ok(());
    }
    let path = Path::new(reference);
    if !path.is_absolute() {
        return Err(RequestError::invalid_rule(format!(
            "'{reference}' is not a registry reference or an absolute path"
        )));
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(RequestError::RulePathTraversal {
            reference: reference.to_owned(),
        });
    }
    // `components()` folds away `.` and repeated separators, so check the text.
    let normalized = reference
        .split('/')
        .skip(1)
        .all(|segment| !segment.is_empty() && segment != ".");
    if !normalized {
        return Err(RequestError::invalid_rule(format!(
            "'{reference}' must be a normalized absolute path"
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
struct RuleDocument {
    rules: Vec<RuleEntry>,
}

#[derive(Deserialize)]
struct RuleEntry {
    id: String,
}

fn validate_inline_rules(text: &str) -> Result<(), RequestError> {
    let document: RuleDocument = serde_saphyr::from_str(text)
        .map_err(|error| RequestError::invalid_rule(format!("inline rules: {error}")))?;
    if document.rules.is_empty() {
        return Err(RequestError::invalid_rule("inline rules list is empty"));
    }
    if document.rules.iter().any(|rule| rule.id.trim().is_empty()) {
        return Err(RequestError::invalid_rule("every inline rule needs an id"));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
