//! Scan daemon for the scanbox workspace.
//!
//! The daemon accepts in-memory source files, materializes them into a
//! single-use workspace, runs the static-analysis engine over them, and returns
//! a report whose paths are relative to the submitted tree. The engine runs
//! either as a dedicated process per request or through one long-lived,
//! authenticated session shared by every request.
//!
//! [`ScanOrchestrator`] is the entry point for embedding. The `scanboxd`
//! binary wraps it in a line-oriented request loop (see [`serve`]) after
//! [`bootstrap_with`] has loaded configuration and installed telemetry.
//!
//! Lifecycle events are surfaced through the [`ScanReporter`] observer so
//! operators can see session start-up, fallbacks to one-shot scans, and
//! failures without reading engine output.

mod bootstrap;
mod error;
mod orchestrator;
mod reporter;
mod schema;
mod serve;
pub mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use error::ScanError;
pub use orchestrator::{ScanMode, ScanOrchestrator, ScanOutcome, session_settings};
pub use reporter::{RecordingScanReporter, ScanEvent, ScanReporter, StructuredScanReporter};
pub use schema::{NoSchemaSource, SchemaFetcher, SchemaUnavailable};
pub use serve::serve;

#[cfg(test)]
mod tests;
