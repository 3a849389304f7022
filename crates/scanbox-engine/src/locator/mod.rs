//! Discovery of an installed engine executable.
//!
//! [`EngineLocator`] tries an ordered list of candidates and caches the first
//! one whose `--version` succeeds. Only success is cached: a failed lookup is
//! retried on the next call so installing the engine does not require a
//! restart.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::EngineNotFound;
use crate::process::ProcessRunner;
use crate::runner::{EngineCommand, EngineRunner};

const LOCATOR_TARGET: &str = "scanbox_engine::locator";

/// File name of the engine executable.
pub const ENGINE_NAME: &str = "semgrep";

/// Well-known install locations, tried after the search path.
pub const INSTALL_LOCATIONS: [&str; 6] = [
    "/usr/local/bin/semgrep",
    "/usr/bin/semgrep",
    "/opt/homebrew/bin/semgrep",
    "/opt/semgrep/bin/semgrep",
    "/home/linuxbrew/.linuxbrew/bin/semgrep",
    "/snap/bin/semgrep",
];

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

const REMEDIATION_HINTS: [&str; 3] = [
    "install it with `pip install semgrep`",
    "install it with `brew install semgrep`",
    "point SCANBOX_ENGINE_PATH at an existing executable",
];

static SHARED: OnceCell<EngineLocator> = OnceCell::new();

/// An engine executable that answered `--version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedEngine {
    path: PathBuf,
    version: String,
}

impl LocatedEngine {
    /// Path of the executable.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trimmed first line of its `--version` output.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

#[derive(Debug, Clone)]
enum CandidateSource {
    /// Override, then the search path, then [`INSTALL_LOCATIONS`].
    Standard { override_path: Option<PathBuf> },
    /// Exactly these paths.
    Fixed(Vec<PathBuf>),
}

/// Finds and caches the engine executable.
#[derive(Debug)]
pub struct EngineLocator {
    source: CandidateSource,
    located: OnceCell<LocatedEngine>,
}

impl EngineLocator {
    /// Creates a locator that tries `override_path` before the standard
    /// locations.
    #[must_use]
    pub const fn new(override_path: Option<PathBuf>) -> Self {
        Self {
            source: CandidateSource::Standard { override_path },
            located: OnceCell::new(),
        }
    }

    /// Creates a locator that only tries `candidates`, in order.
    #[must_use]
    pub const fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self {
            source: CandidateSource::Fixed(candidates),
            located: OnceCell::new(),
        }
    }

    /// Returns the process-wide locator.
    ///
    /// `override_path` only takes effect on the first call.
    #[must_use]
    pub fn shared(override_path: Option<&Path>) -> &'static Self {
        SHARED.get_or_init(|| Self::new(override_path.map(Path::to_path_buf)))
    }

    /// Candidate paths in search order, without duplicates.
    #[must_use]
    pub fn candidates(&self) -> Vec<PathBuf> {
        let ordered = match &self.source {
            CandidateSource::Fixed(paths) => paths.clone(),
            CandidateSource::Standard { override_path } => override_path
                .iter()
                .cloned()
                .chain(search_path_candidate(env::var_os("PATH").as_deref()))
                .chain(INSTALL_LOCATIONS.iter().map(PathBuf::from))
                .collect(),
        };
        let mut unique = Vec::with_capacity(ordered.len());
        for path in ordered {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        unique
    }

    /// Returns the cached engine, probing candidates on first use.
    ///
    /// # Errors
    ///
    /// Returns [`EngineNotFound`] when no candidate exists and answers
    /// `--version` successfully. The failure is not cached.
    pub fn locate(&self) -> Result<&LocatedEngine, EngineNotFound> {
        self.located.get_or_try_init(|| self.discover())
    }

    fn discover(&self) -> Result<LocatedEngine, EngineNotFound> {
        let candidates = self.candidates();
        for candidate in &candidates {
            if !candidate.is_file() {
                continue;
            }
            match engine_version(candidate) {
                Some(version) => {
                    info!(
                        target: LOCATOR_TARGET,
                        path = %candidate.display(),
                        version = %version,
                        "located scan engine"
                    );
                    return Ok(LocatedEngine {
                        path: candidate.clone(),
                        version,
                    });
                }
                None => debug!(
                    target: LOCATOR_TARGET,
                    path = %candidate.display(),
                    "candidate rejected: --version failed"
                ),
            }
        }
        Err(EngineNotFound::new(
            candidates,
            REMEDIATION_HINTS.iter().map(|hint| (*hint).to_owned()).collect(),
        ))
    }
}

fn search_path_candidate(path_var: Option<&OsStr>) -> Option<PathBuf> {
    env::split_paths(path_var?)
        .map(|dir| dir.join(ENGINE_NAME))
        .find(|candidate| candidate.is_file())
}

fn engine_version(candidate: &Path) -> Option<String> {
    let command =
        EngineCommand::new(candidate, env::temp_dir(), VERSION_CHECK_TIMEOUT).arg("--version");
    let invocation = ProcessRunner::new()
        .run(&command, &CancelToken::new())
        .ok()?;
    Some(
        invocation
            .stdout_text()
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_owned(),
    )
}
