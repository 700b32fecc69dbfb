//! SOAP-over-HTTP caller with retries

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE,
    HOST,
};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::CallConfig;
use crate::error::{ErrorCode, Result, SoapCallError};
use crate::retry::{RetryLog, RetryPolicy};

pub const SOAP_CONTENT_TYPE: &str = "text/xml;charset=UTF-8";

static SOAP_ACTION: HeaderName = HeaderName::from_static("soapaction");

/// Bytes sent as the request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody(Vec<u8>);

impl RequestBody {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

/// Status line, protocol and headers of the last response received
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMeta {
    pub status: u16,
    pub status_text: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseMeta {
    fn from_response(response: &reqwest::Response) -> Self {
        let status = response.status();
        Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            version: format!("{:?}", response.version()),
            headers: header_pairs(response.headers()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `"200 OK"` style status line
    pub fn status_line(&self) -> String {
        if self.status_text.is_empty() {
            self.status.to_string()
        } else {
            format!("{} {}", self.status, self.status_text)
        }
    }
}

/// Everything a completed exchange produced
#[derive(Debug, Clone)]
pub struct CallResult {
    pub body: Vec<u8>,
    pub response: ResponseMeta,
    pub retry_log: RetryLog,
}

/// Issues one logical POST per call, retrying transport failures
pub struct SoapClient {
    http: Client,
    policy: RetryPolicy,
}

impl SoapClient {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let http = Client::builder().build().map_err(|e| {
            SoapCallError::transport(
                ErrorCode::TRANSPORT_CLIENT_BUILD,
                format!("failed to create HTTP client: {e}"),
                None,
                RetryLog::default(),
            )
        })?;

        Ok(Self { http, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `body` to the configured endpoint.
    ///
    /// Only failures to complete the exchange are retried. Any HTTP status,
    /// including 5xx, is returned to the caller as-is.
    pub async fn call(&self, config: &CallConfig, body: RequestBody) -> Result<CallResult> {
        let endpoint = config.endpoint();
        let headers = request_headers(config, body.len())?;
        let context = format!("POST {endpoint}");

        debug!("Sending {} bytes to {}", body.len(), endpoint);

        let (outcome, retry_log) = self
            .policy
            .execute(&context, |attempt| {
                debug!("Attempt {} for {}", attempt, endpoint);
                let mut request = self
                    .http
                    .post(endpoint.clone())
                    .headers(headers.clone())
                    .body(body.as_bytes().to_vec());
                if let Some(auth) = config.auth() {
                    request = request.basic_auth(&auth.username, Some(&auth.password));
                }
                async move { request.send().await.map_err(|e| error_chain(&e)) }
            })
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(last_error) => {
                return Err(SoapCallError::transport(
                    ErrorCode::TRANSPORT_RETRIES_EXHAUSTED,
                    format!(
                        "{} failed after {} attempt(s): {}",
                        context, retry_log.attempts, last_error
                    ),
                    None,
                    retry_log,
                ))
            }
        };

        let meta = ResponseMeta::from_response(&response);
        if !meta.is_success() {
            warn!("{} returned {}", endpoint, meta.status_line());
        }

        match response.bytes().await {
            Ok(bytes) => {
                debug!("Received {} bytes ({})", bytes.len(), meta.status_line());
                Ok(CallResult {
                    body: bytes.to_vec(),
                    response: meta,
                    retry_log,
                })
            }
            Err(e) => Err(SoapCallError::transport(
                ErrorCode::TRANSPORT_BODY_READ,
                format!("reading response body failed: {}", error_chain(&e)),
                Some(meta),
                retry_log,
            )),
        }
    }
}

/// The fixed header set sent with every attempt
pub fn request_headers(config: &CallConfig, content_length: usize) -> Result<HeaderMap> {
    let endpoint = config.endpoint();
    let mut headers = HeaderMap::new();

    headers.insert(CONTENT_TYPE, HeaderValue::from_static(SOAP_CONTENT_TYPE));
    headers.insert(
        SOAP_ACTION.clone(),
        header_value(&format!("\"{}\"", config.soap_action()))?,
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
    // Empty on purpose: compressed responses are never decoded here
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(""));
    headers.insert(HOST, header_value(&host_header(endpoint)?)?);
    headers.insert(CONNECTION, HeaderValue::from_static("Keep-Alive"));

    Ok(headers)
}

fn host_header(endpoint: &Url) -> Result<String> {
    let host = endpoint.host_str().ok_or_else(|| {
        SoapCallError::config_with_code(
            ErrorCode::CONFIG_INVALID_ENDPOINT,
            format!("endpoint '{endpoint}' has no host"),
        )
    })?;

    Ok(match endpoint.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        SoapCallError::config_with_code(
            ErrorCode::CONFIG_INVALID_HEADER,
            format!("invalid header value {value:?}: {e}"),
        )
    })
}

pub(crate) fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// reqwest's top-level message hides the interesting part in its sources
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> CallConfig {
        CallConfig::builder(endpoint)
            .soap_action("urn:GetReport")
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_headers() {
        let headers = request_headers(&config("http://example.com:8080/ws"), 123).unwrap();

        assert_eq!(headers[CONTENT_TYPE], "text/xml;charset=UTF-8");
        assert_eq!(headers["soapaction"], "\"urn:GetReport\"");
        assert_eq!(headers[CONTENT_LENGTH], "123");
        assert_eq!(headers[ACCEPT_ENCODING], "");
        assert_eq!(headers[HOST], "example.com:8080");
        assert_eq!(headers[CONNECTION], "Keep-Alive");
        assert!(headers.get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_host_header_omits_default_port() {
        let headers = request_headers(&config("https://example.com:443/ws"), 0).unwrap();
        assert_eq!(headers[HOST], "example.com");
    }

    #[test]
    fn test_empty_soap_action_is_still_quoted() {
        let config = CallConfig::builder("http://example.com/").build().unwrap();
        let headers = request_headers(&config, 0).unwrap();
        assert_eq!(headers["soapaction"], "\"\"");
    }

    #[test]
    fn test_invalid_soap_action_is_config_error() {
        let config = CallConfig::builder("http://example.com/")
            .soap_action("bad\naction")
            .build()
            .unwrap();
        let err = request_headers(&config, 0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_HEADER);
    }

    #[test]
    fn test_status_line() {
        let meta = ResponseMeta {
            status: 500,
            status_text: "Internal Server Error".to_string(),
            version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
        };
        assert_eq!(meta.status_line(), "500 Internal Server Error");
        assert!(!meta.is_success());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_exhausts_attempts() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = SoapClient::new(RetryPolicy::immediate(3)).unwrap();

        let err = client
            .call(
                &config(&format!("http://127.0.0.1:{port}/ws")),
                RequestBody::from("<x/>".to_string()),
            )
            .await
            .unwrap_err();

        match err {
            SoapCallError::Transport {
                code,
                response,
                retry_log,
                ..
            } => {
                assert_eq!(code, ErrorCode::TRANSPORT_RETRIES_EXHAUSTED);
                assert!(response.is_none());
                assert_eq!(retry_log.attempts, 3);
                assert_eq!(retry_log.failures.len(), 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
