//! Line-delimited JSON-RPC messages exchanged with a session engine.

use std::borrow::Cow;
use std::sync::atomic::{AtomicI64, Ordering};

use scanbox_core::{ParseError, ScanResult, parse_engine_output, parse_engine_value};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) const METHOD_AUTHENTICATE: &str = "authenticate";
pub(crate) const METHOD_SCAN_FILES: &str = "scanFiles";
pub(crate) const METHOD_SHUTDOWN: &str = "shutdown";

static REQUEST_ID: AtomicI64 = AtomicI64::new(1);

pub(crate) fn next_request_id() -> i64 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Serialize)]
pub(crate) struct WireRequest<'a> {
    jsonrpc: &'static str,
    pub(crate) id: i64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> WireRequest<'a> {
    pub(crate) fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: next_request_id(),
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    #[serde(default)]
    pub(crate) id: Option<i64>,
    #[serde(default)]
    pub(crate) result: Option<Value>,
    #[serde(default)]
    pub(crate) error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireError {
    pub(crate) code: i64,
    pub(crate) message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AuthenticateParams<'a> {
    pub(crate) token: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuthenticateResult {
    #[serde(default)]
    pub(crate) authenticated: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScanFilesParams<'a> {
    pub(crate) files: Vec<WireFile<'a>>,
    pub(crate) config: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireFile<'a> {
    pub(crate) file: Cow<'a, str>,
    pub(crate) content: &'a str,
}

/// Decodes a `scanFiles` result, which is either the report itself or a
/// string holding the report.
pub(crate) fn decode_report(result: Value) -> Result<ScanResult, ParseError> {
    match result {
        Value::String(text) => parse_engine_output(&text),
        other => parse_engine_value(other),
    }
}
