//! Output sinks and the `--debug` exchange dump

use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::client::{header_pairs, request_headers, CallResult, RequestBody};
use crate::config::CallConfig;
use crate::error::Result;

/// Where processed bytes end up
pub enum OutputSink {
    Stdout(io::Stdout),
    File(File),
}

impl OutputSink {
    /// Standard output, or `path` created and truncated
    pub fn open(path: Option<&Path>) -> io::Result<Self> {
        match path {
            Some(path) => File::create(path).map(OutputSink::File),
            None => Ok(OutputSink::Stdout(io::stdout())),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Stdout(out) => out.write(buf),
            OutputSink::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Stdout(out) => out.flush(),
            OutputSink::File(file) => file.flush(),
        }
    }
}

/// Pass-through writer that counts what went through it
pub struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Copy `bytes` to `output` unchanged and flush
pub fn write_processed<W: Write>(mut output: W, bytes: &[u8]) -> io::Result<()> {
    output.write_all(bytes)?;
    output.flush()
}

/// What was put on the wire, with credentials masked
#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body_bytes: usize,
}

impl RequestSummary {
    pub fn new(config: &CallConfig, body: &RequestBody) -> Result<Self> {
        let mut headers = header_pairs(&request_headers(config, body.len())?);
        if config.auth().is_some() {
            headers.push(("authorization".to_string(), "Basic <redacted>".to_string()));
        }

        Ok(Self {
            method: "POST",
            url: config.endpoint().to_string(),
            headers,
            body_bytes: body.len(),
        })
    }
}

/// Write the full request/response structure as pretty JSON
pub fn dump_exchange<W: Write>(
    mut writer: W,
    request: &RequestSummary,
    call: &CallResult,
) -> Result<()> {
    let dump = json!({
        "request": request,
        "response": {
            "status": call.response.status_line(),
            "protocol": call.response.version,
            "headers": call.response.headers,
            "body_bytes": call.body.len(),
        },
        "attempts": call.retry_log.attempts,
        "retries": call.retry_log.failures,
    });

    serde_json::to_writer_pretty(&mut writer, &dump).map_err(io::Error::from)?;
    writeln!(writer)?;
    Ok(())
}

/// Write the response body and whatever was decoded from it before the
/// base64 error, each verbatim under a one-line heading
pub fn dump_decode_failure<W: Write>(mut writer: W, raw: &[u8], partial: &[u8]) -> io::Result<()> {
    writeln!(writer, "--- response body ({} bytes) ---", raw.len())?;
    writer.write_all(raw)?;
    writeln!(writer)?;
    writeln!(
        writer,
        "--- decoded before the error ({} bytes) ---",
        partial.len()
    )?;
    writer.write_all(partial)?;
    writeln!(writer)?;
    writer.flush()
}
