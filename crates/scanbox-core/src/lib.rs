//! Core data model for sandboxed scan execution.
//!
//! This crate holds the types exchanged between the scan orchestrator and its
//! callers, together with the two pure transformations applied to engine
//! output before it leaves the process:
//!
//! - [`parse_engine_output`] turns the engine's JSON document into a typed
//!   [`ScanResult`]. Output that does not parse is a [`ParseError`], never an
//!   execution failure.
//! - [`strip`] rewrites workspace-absolute paths into workspace-relative ones
//!   so the caller never learns where its files were materialized.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use scanbox_core::{parse_engine_output, strip};
//!
//! let raw = r#"{"results":[{"check_id":"demo","path":"/tmp/ws/app.py",
//!   "start":{"line":1,"col":1},"end":{"line":1,"col":4},
//!   "extra":{"message":"m","severity":"ERROR"}}],"errors":[],
//!   "paths":{"scanned":["/tmp/ws/app.py"]}}"#;
//! let result = parse_engine_output(raw)?;
//! let normalized = strip(result, Path::new("/tmp/ws"));
//! assert_eq!(normalized.result.findings[0].path, "app.py");
//! assert_eq!(normalized.result.scanned_paths, vec!["app.py".to_owned()]);
//! # Ok::<(), scanbox_core::ParseError>(())
//! ```

mod engine_output;
mod normalize;
mod request;
mod result;

pub use engine_output::{ParseError, parse_engine_output, parse_engine_value};
pub use normalize::{
    INLINE_RULES_LABEL, NormalizationWarning, Normalized, redact_rule_files, redact_text,
    scrub_text, strip,
};
pub use request::{FilePayload, MAX_TIMEOUT_SECS, RequestError, RuleSpec, ScanRequest};
pub use result::{EngineDiagnostic, Finding, Position, ScanResult, Severity, SkippedPath};
