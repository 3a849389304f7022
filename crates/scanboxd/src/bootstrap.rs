//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use scanbox_config::{Config, CredentialsError, SessionToken, resolve_session_token};
use scanbox_engine::{EngineLocator, EngineSessionLauncher};
use thiserror::Error;
use tracing::info;

use crate::orchestrator::{ScanOrchestrator, session_settings};
use crate::reporter::ScanReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

const BOOTSTRAP_TARGET: &str = "scanboxd::bootstrap";

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when no configuration can be produced.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that returns a fixed configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Creates a loader returning `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The engine settings file could not be read for a session token.
    #[error("failed to resolve session token: {source}")]
    Credentials {
        /// Underlying credentials error.
        #[source]
        source: CredentialsError,
    },
}

/// A bootstrapped daemon, ready to serve requests.
#[derive(Debug)]
pub struct Daemon {
    orchestrator: Arc<ScanOrchestrator>,
    telemetry: TelemetryHandle,
}

impl Daemon {
    /// The shared orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> Arc<ScanOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// Loads configuration, installs telemetry, resolves the session token, and
/// wires an orchestrator around the process-wide engine locator. The engine
/// itself is not located until the first request needs it.
///
/// # Errors
///
/// Returns [`BootstrapError`] for the first step that fails.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn ScanReporter>,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    let token = resolve_session_token(&config)
        .map_err(|source| BootstrapError::Credentials { source })?;

    info!(
        target: BOOTSTRAP_TARGET,
        execution_mode = %config.execution_mode(),
        log_format = %config.log_format(),
        token_source = ?token.as_ref().map(SessionToken::source),
        "daemon bootstrap completed"
    );

    let settings = session_settings(&config, token.map(|value| value.expose().to_owned()));
    let locator = EngineLocator::shared(config.engine_path());
    let orchestrator = ScanOrchestrator::new(config, locator)
        .with_launcher(Arc::new(EngineSessionLauncher::new(settings)))
        .with_reporter(reporter);

    Ok(Daemon {
        orchestrator: Arc::new(orchestrator),
        telemetry,
    })
}
