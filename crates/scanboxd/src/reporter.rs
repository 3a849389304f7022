//! Structured reporting of scan lifecycle events.

use std::sync::{Arc, Mutex};

use scanbox_core::NormalizationWarning;
use uuid::Uuid;

use crate::error::ScanError;
use crate::orchestrator::{ScanMode, ScanOutcome};

const REPORTER_TARGET: &str = "scanboxd::reporter";

/// Observer trait used to surface scan lifecycle events to telemetry sinks.
pub trait ScanReporter: Send + Sync {
    /// Invoked when a request is accepted.
    fn scan_started(&self, request_id: Uuid, files: usize);

    /// Invoked when a request succeeds.
    fn scan_completed(&self, request_id: Uuid, outcome: &ScanOutcome);

    /// Invoked when a request fails.
    fn scan_failed(&self, request_id: Uuid, error: &ScanError);

    /// Invoked when an engine session becomes ready.
    fn session_started(&self);

    /// Invoked when a request falls back from the session to a one-shot run.
    fn session_fallback(&self, request_id: Uuid, reason: &str);

    /// Invoked for each path the normalizer could not make relative.
    fn normalization_warning(&self, request_id: Uuid, warning: &NormalizationWarning);
}

impl<T> ScanReporter for Arc<T>
where
    T: ScanReporter,
{
    fn scan_started(&self, request_id: Uuid, files: usize) {
        (**self).scan_started(request_id, files);
    }

    fn scan_completed(&self, request_id: Uuid, outcome: &ScanOutcome) {
        (**self).scan_completed(request_id, outcome);
    }

    fn scan_failed(&self, request_id: Uuid, error: &ScanError) {
        (**self).scan_failed(request_id, error);
    }

    fn session_started(&self) {
        (**self).session_started();
    }

    fn session_fallback(&self, request_id: Uuid, reason: &str) {
        (**self).session_fallback(request_id, reason);
    }

    fn normalization_warning(&self, request_id: Uuid, warning: &NormalizationWarning) {
        (**self).normalization_warning(request_id, warning);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredScanReporter;

impl StructuredScanReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ScanReporter for StructuredScanReporter {
    fn scan_started(&self, request_id: Uuid, files: usize) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "scan_started",
            %request_id,
            files,
            "scan started"
        );
    }

    fn scan_completed(&self, request_id: Uuid, outcome: &ScanOutcome) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "scan_completed",
            %request_id,
            mode = %outcome.mode,
            findings = outcome.result.findings.len(),
            engine_errors = outcome.result.errors.len(),
            "scan completed"
        );
    }

    fn scan_failed(&self, request_id: Uuid, error: &ScanError) {
        tracing::warn!(
            target: REPORTER_TARGET,
            event = "scan_failed",
            %request_id,
            kind = error.kind(),
            %error,
            "scan failed"
        );
    }

    fn session_started(&self) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "session_started",
            "engine session started"
        );
    }

    fn session_fallback(&self, request_id: Uuid, reason: &str) {
        tracing::warn!(
            target: REPORTER_TARGET,
            event = "session_fallback",
            %request_id,
            reason,
            "engine session unavailable, falling back to one-shot scan"
        );
    }

    fn normalization_warning(&self, request_id: Uuid, warning: &NormalizationWarning) {
        tracing::warn!(
            target: REPORTER_TARGET,
            event = "normalization_warning",
            %request_id,
            field = warning.field,
            "engine reported a path outside the workspace"
        );
    }
}

/// A lifecycle event captured by [`RecordingScanReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// See [`ScanReporter::scan_started`].
    Started {
        /// Request identifier.
        request_id: Uuid,
        /// Number of submitted files.
        files: usize,
    },
    /// See [`ScanReporter::scan_completed`].
    Completed {
        /// Request identifier.
        request_id: Uuid,
        /// How the scan ran.
        mode: ScanMode,
    },
    /// See [`ScanReporter::scan_failed`].
    Failed {
        /// Request identifier.
        request_id: Uuid,
        /// Wire label of the error.
        kind: &'static str,
    },
    /// See [`ScanReporter::session_started`].
    SessionStarted,
    /// See [`ScanReporter::session_fallback`].
    Fallback {
        /// Request identifier.
        request_id: Uuid,
        /// Why the session was bypassed.
        reason: String,
    },
    /// See [`ScanReporter::normalization_warning`].
    NormalizationWarning {
        /// Request identifier.
        request_id: Uuid,
        /// Result field holding the path.
        field: &'static str,
    },
}

/// Reporter that keeps every event in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct RecordingScanReporter {
    events: Mutex<Vec<ScanEvent>>,
}

impl RecordingScanReporter {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events recorded so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<ScanEvent> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ScanEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: ScanEvent) {
        self.lock().push(event);
    }
}

impl ScanReporter for RecordingScanReporter {
    fn scan_started(&self, request_id: Uuid, files: usize) {
        self.record(ScanEvent::Started { request_id, files });
    }

    fn scan_completed(&self, request_id: Uuid, outcome: &ScanOutcome) {
        self.record(ScanEvent::Completed {
            request_id,
            mode: outcome.mode,
        });
    }

    fn scan_failed(&self, request_id: Uuid, error: &ScanError) {
        self.record(ScanEvent::Failed {
            request_id,
            kind: error.kind(),
        });
    }

    fn session_started(&self) {
        self.record(ScanEvent::SessionStarted);
    }

    fn session_fallback(&self, request_id: Uuid, reason: &str) {
        self.record(ScanEvent::Fallback {
            request_id,
            reason: reason.to_owned(),
        });
    }

    fn normalization_warning(&self, request_id: Uuid, warning: &NormalizationWarning) {
        self.record(ScanEvent::NormalizationWarning {
            request_id,
            field: warning.field,
        });
    }
}
