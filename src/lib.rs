//! # soapcall
//!
//! POST a SOAP request, retry transport failures with backoff, and turn the
//! response into something a shell pipeline can use.
//!
//! ## Usage
//!
//! ```bash
//! soapcall --endpoint URL [--soapaction ACTION] [--infile PATH | --infiletemplate PATH]
//!          [--base64] [--flatten-xml | --flatten-html] [--flatten-key KEY] [--outfile PATH]
//! ```
//!
//! ## Modules
//!
//! - `cli` - Argument parsing and conversion into a validated invocation
//! - `config` - Immutable per-call settings and endpoint validation
//! - `template` - Request template expansion with process and environment helpers
//! - `retry` - Backoff policy and the log of failed attempts
//! - `client` - The HTTP caller and its fixed SOAP header set
//! - `decode` - Extraction of the base64 report embedded in a response
//! - `flatten` - Streaming XML/HTML to `path value` conversion
//! - `output` - Output sinks and the debug exchange dump
//! - `pipeline` - Wires the stages together for one invocation
//! - `subprocess` - Process launching abstraction with a mock for tests
//! - `error` - Error type and stable error codes
pub mod cli;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod flatten;
pub mod output;
pub mod pipeline;
pub mod retry;
pub mod subprocess;
pub mod template;

pub use error::{ErrorCode, Result, SoapCallError};
