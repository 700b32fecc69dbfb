//! Resolved configuration for one invocation

use serde::Serialize;
use std::fmt;
use url::Url;

use crate::error::{ErrorCode, Result, SoapCallError};

/// Which tokenizer the flatten engine uses, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlattenMode {
    #[default]
    None,
    Xml,
    Html,
}

impl FlattenMode {
    /// Resolve the two CLI switches; XML wins when both are set
    pub fn from_flags(xml: bool, html: bool) -> Self {
        if xml {
            FlattenMode::Xml
        } else if html {
            FlattenMode::Html
        } else {
            FlattenMode::None
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable settings for a single call
#[derive(Debug, Clone)]
pub struct CallConfig {
    endpoint: Url,
    soap_action: String,
    request_template: bool,
    flatten: FlattenMode,
    flatten_key: String,
    base64: bool,
    auth: Option<BasicAuth>,
    debug: bool,
}

impl CallConfig {
    pub fn builder(endpoint: impl Into<String>) -> CallConfigBuilder {
        CallConfigBuilder::new(endpoint)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn soap_action(&self) -> &str {
        &self.soap_action
    }

    pub fn request_template(&self) -> bool {
        self.request_template
    }

    pub fn flatten(&self) -> FlattenMode {
        self.flatten
    }

    pub fn flatten_key(&self) -> &str {
        &self.flatten_key
    }

    pub fn base64(&self) -> bool {
        self.base64
    }

    pub fn auth(&self) -> Option<&BasicAuth> {
        self.auth.as_ref()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

pub struct CallConfigBuilder {
    endpoint: String,
    soap_action: String,
    request_template: bool,
    flatten: FlattenMode,
    flatten_key: String,
    base64: bool,
    auth: Option<BasicAuth>,
    debug: bool,
}

impl CallConfigBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            soap_action: String::new(),
            request_template: false,
            flatten: FlattenMode::None,
            flatten_key: String::new(),
            base64: false,
            auth: None,
            debug: false,
        }
    }

    pub fn soap_action(mut self, action: impl Into<String>) -> Self {
        self.soap_action = action.into();
        self
    }

    pub fn request_template(mut self, enabled: bool) -> Self {
        self.request_template = enabled;
        self
    }

    pub fn flatten(mut self, mode: FlattenMode) -> Self {
        self.flatten = mode;
        self
    }

    pub fn flatten_key(mut self, key: impl Into<String>) -> Self {
        self.flatten_key = key.into();
        self
    }

    pub fn base64(mut self, enabled: bool) -> Self {
        self.base64 = enabled;
        self
    }

    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(BasicAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> Result<CallConfig> {
        let endpoint = parse_endpoint(&self.endpoint)?;

        if let Some(auth) = &self.auth {
            if auth.username.is_empty() {
                return Err(SoapCallError::config_with_code(
                    ErrorCode::CONFIG_INVALID_AUTH,
                    "basic auth requires a username",
                ));
            }
        }

        Ok(CallConfig {
            endpoint,
            soap_action: self.soap_action,
            request_template: self.request_template,
            flatten: self.flatten,
            flatten_key: self.flatten_key,
            base64: self.base64,
            auth: self.auth,
            debug: self.debug,
        })
    }
}

/// Parse an endpoint and make sure it can be sent to
pub fn parse_endpoint(raw: &str) -> Result<Url> {
    if raw.trim().is_empty() {
        return Err(SoapCallError::config_with_code(
            ErrorCode::CONFIG_MISSING_REQUIRED,
            "endpoint is required",
        ));
    }

    let url = Url::parse(raw).map_err(|e| {
        SoapCallError::config_with_code(
            ErrorCode::CONFIG_INVALID_ENDPOINT,
            format!("invalid endpoint '{raw}': {e}"),
        )
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SoapCallError::config_with_code(
            ErrorCode::CONFIG_INVALID_ENDPOINT,
            format!("unsupported endpoint scheme '{}'", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(SoapCallError::config_with_code(
            ErrorCode::CONFIG_INVALID_ENDPOINT,
            format!("endpoint '{raw}' has no host"),
        ));
    }

    Ok(url)
}
