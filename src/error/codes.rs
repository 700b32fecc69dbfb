/// Error code registry for soapcall
///
/// Error codes are organized by the pipeline stage that raised them:
/// - 1000-1999: Configuration errors (the call was never attempted)
/// - 2000-2999: Template errors (the call was never attempted)
/// - 3000-3999: Transport errors (sent, but no usable response)
/// - 4000-4999: Decode errors (received, but could not be interpreted)
/// - 5000-5999: Markup errors (received, but could not be interpreted)
/// - 9000-9999: Other errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_MISSING_REQUIRED: u16 = 1001;
    pub const CONFIG_INVALID_ENDPOINT: u16 = 1002;
    pub const CONFIG_INVALID_AUTH: u16 = 1003;
    pub const CONFIG_CONFLICTING_OPTIONS: u16 = 1004;
    pub const CONFIG_INVALID_HEADER: u16 = 1005;

    // Template errors (2000-2999)
    pub const TEMPLATE_GENERIC: u16 = 2000;
    pub const TEMPLATE_PARSE: u16 = 2001;
    pub const TEMPLATE_RENDER: u16 = 2002;
    pub const TEMPLATE_HELPER_FAILED: u16 = 2003;
    pub const TEMPLATE_NOT_UTF8: u16 = 2004;

    // Transport errors (3000-3999)
    pub const TRANSPORT_RETRIES_EXHAUSTED: u16 = 3001;
    pub const TRANSPORT_BODY_READ: u16 = 3002;
    pub const TRANSPORT_CLIENT_BUILD: u16 = 3003;

    // Decode errors (4000-4999)
    pub const DECODE_INVALID_BASE64: u16 = 4001;

    // Markup errors (5000-5999)
    pub const MARKUP_UNBALANCED: u16 = 5001;
    pub const MARKUP_TOKENIZER: u16 = 5002;

    // Other errors (9000-9999)
    pub const IO_GENERIC: u16 = 9001;
}

/// Describe what an error code means, for `--debug` output and logs
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        ErrorCode::CONFIG_MISSING_REQUIRED => "A required option is missing",
        ErrorCode::CONFIG_INVALID_ENDPOINT => "The endpoint is not a valid URL",
        ErrorCode::CONFIG_INVALID_AUTH => "Authentication options are invalid",
        ErrorCode::CONFIG_CONFLICTING_OPTIONS => "Options that cannot be combined were given",
        ErrorCode::CONFIG_INVALID_HEADER => "A header value contains invalid characters",
        ErrorCode::TEMPLATE_GENERIC => "Template expansion failed",
        ErrorCode::TEMPLATE_PARSE => "The request template could not be parsed",
        ErrorCode::TEMPLATE_RENDER => "The request template could not be rendered",
        ErrorCode::TEMPLATE_HELPER_FAILED => "A template helper failed",
        ErrorCode::TEMPLATE_NOT_UTF8 => "The request template is not valid UTF-8",
        ErrorCode::TRANSPORT_RETRIES_EXHAUSTED => "Every attempt to send the request failed",
        ErrorCode::TRANSPORT_BODY_READ => "The response body could not be read",
        ErrorCode::TRANSPORT_CLIENT_BUILD => "The HTTP client could not be created",
        ErrorCode::DECODE_INVALID_BASE64 => "The embedded report is not valid base64",
        ErrorCode::MARKUP_UNBALANCED => "A closing tag has no matching opening tag",
        ErrorCode::MARKUP_TOKENIZER => "The markup tokenizer rejected the input",
        ErrorCode::IO_GENERIC => "Reading input or writing output failed",
        _ => "Unknown error code",
    }
}
