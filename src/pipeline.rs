//! One invocation end to end: expand, call, decode, flatten, write

use std::borrow::Cow;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::{CallResult, RequestBody, SoapClient};
use crate::config::{CallConfig, FlattenMode};
use crate::decode;
use crate::error::{ErrorCode, Result, SoapCallError};
use crate::flatten::{self, MarkupDialect};
use crate::output::{
    dump_decode_failure, dump_exchange, write_processed, CountingWriter, RequestSummary,
};
use crate::retry::RetryPolicy;
use crate::template::{RuntimeHost, TemplateExpander};

/// What a successful run produced
#[derive(Debug)]
pub struct Outcome {
    pub call: CallResult,
    pub request: RequestSummary,
    /// Bytes written to the output sink
    pub processed_bytes: u64,
}

pub struct Pipeline {
    client: SoapClient,
    expander: TemplateExpander,
}

impl Pipeline {
    pub fn new(client: SoapClient, expander: TemplateExpander) -> Self {
        Self { client, expander }
    }

    /// Default retry policy, real processes and the real environment
    pub fn production() -> Result<Self> {
        Ok(Self::new(
            SoapClient::new(RetryPolicy::default())?,
            TemplateExpander::new(Arc::new(RuntimeHost::production())),
        ))
    }

    /// Turn the raw input into the request body, expanding it when asked to
    pub async fn build_body(&self, config: &CallConfig, input: Vec<u8>) -> Result<RequestBody> {
        if !config.request_template() {
            return Ok(RequestBody::from(input));
        }

        let template = String::from_utf8(input).map_err(|e| {
            SoapCallError::template_with_code(
                ErrorCode::TEMPLATE_NOT_UTF8,
                format!("request template is not valid UTF-8: {e}"),
            )
        })?;

        // Helpers may block on child processes
        let expander = self.expander.clone();
        let rendered = tokio::task::spawn_blocking(move || expander.expand(&template))
            .await
            .map_err(|e| {
                SoapCallError::template_with_code(
                    ErrorCode::TEMPLATE_GENERIC,
                    format!("template expansion task failed: {e}"),
                )
            })??;

        Ok(RequestBody::from(rendered))
    }

    /// Run the whole chain.
    ///
    /// `open_sink` is only invoked once a response has been received, so a
    /// failed call never creates or truncates the output file. With `--debug`
    /// the exchange is dumped to `diagnostics` before the body is processed,
    /// and a body that fails to decode is dumped there along with the bytes
    /// decoded before the error.
    pub async fn run<F, W>(
        &self,
        config: &CallConfig,
        input: Vec<u8>,
        open_sink: F,
        diagnostics: &mut dyn Write,
    ) -> Result<Outcome>
    where
        F: FnOnce() -> io::Result<W>,
        W: Write,
    {
        let body = self.build_body(config, input).await?;
        let request = RequestSummary::new(config, &body)?;

        let call = self.client.call(config, body).await?;
        info!(
            "{} answered {} with {} bytes after {} attempt(s)",
            config.endpoint(),
            call.response.status_line(),
            call.body.len(),
            call.retry_log.attempts
        );
        log_retries(&call);

        if config.debug() {
            dump_exchange(&mut *diagnostics, &request, &call)?;
        }

        let sink = open_sink()?;
        let processed_bytes =
            transform(config, &call.body, BufWriter::new(sink)).or_else(|err| {
                if let SoapCallError::Decode { raw, partial, .. } = &err {
                    if config.debug() {
                        dump_decode_failure(&mut *diagnostics, raw, partial)?;
                    }
                }
                Err(err)
            })?;
        debug!("Wrote {} processed bytes", processed_bytes);

        Ok(Outcome {
            call,
            request,
            processed_bytes,
        })
    }
}

/// Apply the decode and flatten stages to a response body.
///
/// Returns the number of bytes written. Output already written when a later
/// stage fails is left in place.
pub fn transform<W: Write>(config: &CallConfig, raw: &[u8], output: W) -> Result<u64> {
    let payload: Cow<'_, [u8]> = if config.base64() {
        decode::extract_report_bytes(raw)?
    } else {
        Cow::Borrowed(raw)
    };

    let mut output = CountingWriter::new(output);
    match dialect_for(config.flatten()) {
        Some(dialect) => {
            let stats = flatten::flatten(dialect, config.flatten_key(), &payload[..], &mut output)?;
            debug!(
                "Flatten produced {} record(s), max depth {}",
                stats.records, stats.max_depth
            );
        }
        None => write_processed(&mut output, &payload)?,
    }

    Ok(output.written())
}

fn dialect_for(mode: FlattenMode) -> Option<MarkupDialect> {
    match mode {
        FlattenMode::None => None,
        FlattenMode::Xml => Some(MarkupDialect::Xml),
        FlattenMode::Html => Some(MarkupDialect::Html),
    }
}

fn log_retries(call: &CallResult) {
    if call.retry_log.is_empty() {
        return;
    }
    warn!(
        "Call succeeded after {} failed attempt(s)",
        call.retry_log.failures.len()
    );
    for line in call.retry_log.to_string().lines() {
        warn!("{}", line);
    }
}
