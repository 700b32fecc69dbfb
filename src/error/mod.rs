use thiserror::Error;

use crate::client::ResponseMeta;
use crate::retry::RetryLog;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// The error type for every stage of a soapcall invocation.
///
/// The display form always starts with `[E<code>] <stage>:` so callers and log
/// readers can tell a request that was never sent from one that was sent but
/// failed, and from a response that arrived but could not be interpreted.
#[derive(Error, Debug)]
pub enum SoapCallError {
    #[error("[E{code:04}] config: {message}")]
    Config { code: u16, message: String },

    #[error("[E{code:04}] template: {message}")]
    Template { code: u16, message: String },

    #[error("[E{code:04}] transport: {message}")]
    Transport {
        code: u16,
        message: String,
        /// Response metadata, when the failure happened after headers arrived
        response: Option<Box<ResponseMeta>>,
        retry_log: RetryLog,
    },

    #[error("[E4001] decode: {message}")]
    Decode {
        message: String,
        /// The response bytes as received
        raw: Vec<u8>,
        /// Whatever could be decoded before the first invalid position
        partial: Vec<u8>,
    },

    #[error("[E{code:04}] markup: {message}")]
    MalformedMarkup { code: u16, message: String },

    #[error("[E9001] io: {0}")]
    Io(#[from] std::io::Error),
}

impl SoapCallError {
    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
        }
    }

    /// Create a template error with specific code
    pub fn template_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Template {
            code,
            message: message.into(),
        }
    }

    /// Create a transport error carrying whatever was obtained before the failure
    pub fn transport(
        code: u16,
        message: impl Into<String>,
        response: Option<ResponseMeta>,
        retry_log: RetryLog,
    ) -> Self {
        Self::Transport {
            code,
            message: message.into(),
            response: response.map(Box::new),
            retry_log,
        }
    }

    /// Create a markup error with specific code
    pub fn markup(code: u16, message: impl Into<String>) -> Self {
        Self::MalformedMarkup {
            code,
            message: message.into(),
        }
    }

    /// Get the numeric code of this error
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Template { code, .. }
            | Self::Transport { code, .. }
            | Self::MalformedMarkup { code, .. } => *code,
            Self::Decode { .. } => ErrorCode::DECODE_INVALID_BASE64,
            Self::Io(_) => ErrorCode::IO_GENERIC,
        }
    }

    /// Name of the pipeline stage that raised this error
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Template { .. } => "template",
            Self::Transport { .. } => "transport",
            Self::Decode { .. } => "decode",
            Self::MalformedMarkup { .. } => "markup",
            Self::Io(_) => "io",
        }
    }

    /// True when the request never left the process
    pub fn is_pre_send(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Template { .. })
    }

    /// The retry log attached to a transport failure
    pub fn retry_log(&self) -> Option<&RetryLog> {
        match self {
            Self::Transport { retry_log, .. } => Some(retry_log),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SoapCallError>;
