//! Line-oriented request loop for the daemon binary.
//!
//! Each input line carries one JSON [`ScanRequest`] plus an optional `id`
//! chosen by the caller. A fixed pool of scoped workers, sized by
//! [`Config::max_concurrent_scans`](scanbox_config::Config::max_concurrent_scans),
//! takes lines from a bounded queue, so reading stalls while every worker is
//! busy. Each request produces exactly one response line:
//!
//! ```text
//! {"id":…,"ok":{"result":…,"mode":"one_shot"}}
//! {"id":…,"error":{"kind":"engine_timeout","message":"…"}}
//! ```
//!
//! Responses are written as requests finish, so their order may differ from
//! the input order.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;
use std::thread;

use crossbeam_channel::Sender;
use scanbox_core::ScanRequest;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::orchestrator::{ScanOrchestrator, ScanOutcome};

const SERVE_TARGET: &str = "scanboxd::serve";

/// Wire label for lines that are not valid requests.
const INVALID_REQUEST: &str = "invalid_request";

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Response<'a> {
    Ok { id: &'a Value, ok: &'a ScanOutcome },
    Error { id: &'a Value, error: ErrorBody },
}

/// Serves requests read from `input` until end of input.
///
/// Blank lines are ignored. Returns once every accepted request has been
/// answered.
///
/// # Errors
///
/// Returns the first error raised while reading `input`. Requests already
/// queued are still answered. Failures writing a response are logged and do
/// not stop the loop.
pub fn serve<R, W>(orchestrator: &ScanOrchestrator, input: R, output: W) -> io::Result<()>
where
    R: BufRead,
    W: Write + Send,
{
    let workers = orchestrator.config().max_concurrent_scans();
    let output = Mutex::new(output);
    let (lines, queue) = crossbeam_channel::bounded::<String>(workers);
    thread::scope(|scope| {
        for _ in 0..workers {
            let pending = queue.clone();
            let sink = &output;
            scope.spawn(move || {
                for text in pending {
                    handle_line(orchestrator, &text, sink);
                }
            });
        }
        drop(queue);
        debug!(target: SERVE_TARGET, workers, "serving requests");

        let fed = feed(input, &lines);
        drop(lines);
        debug!(target: SERVE_TARGET, "input closed; waiting for in-flight requests");
        fed
    })
}

fn feed<R: BufRead>(input: R, lines: &Sender<String>) -> io::Result<()> {
    for line in input.lines() {
        let text = line?;
        if text.trim().is_empty() {
            continue;
        }
        if lines.send(text).is_err() {
            warn!(target: SERVE_TARGET, "no workers left to take requests");
            break;
        }
    }
    Ok(())
}

fn handle_line<W: Write>(orchestrator: &ScanOrchestrator, text: &str, output: &Mutex<W>) {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(error) => {
            warn!(target: SERVE_TARGET, %error, "request line is not JSON");
            write_error(output, &Value::Null, INVALID_REQUEST, error.to_string());
            return;
        }
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);

    let request = match serde_json::from_value::<ScanRequest>(value) {
        Ok(request) => request,
        Err(error) => {
            warn!(target: SERVE_TARGET, %error, "request line is not a scan request");
            write_error(output, &id, INVALID_REQUEST, error.to_string());
            return;
        }
    };

    match orchestrator.scan(&request) {
        Ok(outcome) => write_response(output, &Response::Ok { id: &id, ok: &outcome }),
        Err(error) => write_scan_error(output, &id, &error),
    }
}

fn write_scan_error<W: Write>(output: &Mutex<W>, id: &Value, error: &ScanError) {
    write_error(output, id, error.kind(), error.to_string());
}

fn write_error<W: Write>(output: &Mutex<W>, id: &Value, kind: &'static str, message: String) {
    write_response(
        output,
        &Response::Error {
            id,
            error: ErrorBody { kind, message },
        },
    );
}

fn write_response<W: Write>(output: &Mutex<W>, response: &Response<'_>) {
    let mut writer = output
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let written = serde_json::to_writer(&mut *writer, response)
        .map_err(io::Error::from)
        .and_then(|()| writer.write_all(b"\n"))
        .and_then(|()| writer.flush());
    if let Err(error) = written {
        warn!(target: SERVE_TARGET, %error, "failed to write response");
    }
}
