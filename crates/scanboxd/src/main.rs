//! `scanboxd` binary: serves scan requests from stdin.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use scanboxd::{StructuredScanReporter, SystemConfigLoader, bootstrap_with, serve};

fn main() -> ExitCode {
    let daemon = match bootstrap_with(
        &SystemConfigLoader,
        Arc::new(StructuredScanReporter::new()),
    ) {
        Ok(daemon) => daemon,
        Err(error) => {
            drop(writeln!(io::stderr().lock(), "scanboxd: {error}"));
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = daemon.orchestrator();
    let served = serve(&orchestrator, io::stdin().lock(), io::stdout());
    orchestrator.shutdown();

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(target: "scanboxd", %error, "failed to read requests");
            ExitCode::FAILURE
        }
    }
}
