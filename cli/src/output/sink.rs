//! `StdoutSink`: writes instance output to stdout, one line at a time.

use std::io::Write as _;

use crate::application::ports::LogSink;

pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn line(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::debug!("cannot write instance output: {e}");
        }
    }
}
