//! Newline-delimited message transport over a child's stdio.
//!
//! A reader thread forwards each stdout line over a channel so callers can
//! wait for a response with a deadline instead of blocking on the pipe.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use thiserror::Error;

/// Why no line was received.
#[derive(Debug, Error)]
pub(crate) enum ReceiveError {
    #[error("no line within {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("channel closed")]
    Closed,
    #[error("failed to read from engine: {0}")]
    Io(#[from] io::Error),
}

pub(crate) struct LineTransport {
    writer: Box<dyn Write + Send>,
    lines: Receiver<io::Result<String>>,
}

impl LineTransport {
    pub(crate) fn new(reader: impl Read + Send + 'static, writer: impl Write + Send + 'static) -> Self {
        let (sender, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(reader).lines() {
                let failed = line.is_err();
                if sender.send(line).is_err() || failed {
                    break;
                }
            }
        });
        Self {
            writer: Box::new(writer),
            lines,
        }
    }

    /// Writes `message` followed by a newline and flushes.
    pub(crate) fn send(&mut self, message: &str) -> io::Result<()> {
        self.writer.write_all(message.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    /// Waits up to `timeout` for the next line.
    pub(crate) fn receive(&self, timeout: Duration) -> Result<String, ReceiveError> {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => Ok(line?),
            Err(RecvTimeoutError::Timeout) => Err(ReceiveError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ReceiveError::Closed),
        }
    }
}
