//! Locating and running the external scan engine.
//!
//! Two execution paths are provided:
//!
//! - One-shot runs through the [`EngineRunner`] seam. [`ProcessRunner`]
//!   spawns the engine in its own process group and kills the whole group on
//!   timeout or cancellation.
//! - Persistent sessions through [`EngineSession`], which keeps an
//!   authenticated engine alive and exchanges line-delimited JSON-RPC with it.
//!
//! [`EngineLocator`] finds the executable both paths use.

mod cancel;
mod error;
mod locator;
mod process;
mod runner;
mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod fake_engine;

#[cfg(test)]
mod tests;

pub use cancel::CancelToken;
pub use error::{EngineError, EngineNotFound};
pub use locator::{ENGINE_NAME, EngineLocator, INSTALL_LOCATIONS, LocatedEngine};
pub use process::ProcessRunner;
pub use runner::{ENGINE_ENV, EngineCommand, EngineInvocation, EngineRunner};
pub use session::{
    EngineSession, EngineSessionLauncher, ScanSession, SessionError, SessionFile,
    SessionLauncher, SessionSettings, SessionState,
};
