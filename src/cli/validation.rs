//! Turning parsed arguments into a validated invocation

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use super::args::Cli;
use crate::config::{CallConfig, FlattenMode};
use crate::error::{ErrorCode, Result, SoapCallError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    None,
    Basic,
}

impl AuthType {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(AuthType::None),
            "basic" => Ok(AuthType::Basic),
            other => Err(SoapCallError::config_with_code(
                ErrorCode::CONFIG_INVALID_AUTH,
                format!("unknown authtype '{other}' (expected 'basic' or 'none')"),
            )),
        }
    }
}

/// Where the request body is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    /// Read the whole input into memory
    pub fn read(&self) -> io::Result<Vec<u8>> {
        match self {
            InputSource::Stdin => {
                let mut buf = Vec::new();
                io::stdin().lock().read_to_end(&mut buf)?;
                Ok(buf)
            }
            InputSource::File(path) => fs::read(path),
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Stdin => f.write_str("<stdin>"),
            InputSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Everything the binary needs to run one call
#[derive(Debug, Clone)]
pub struct Invocation {
    pub config: CallConfig,
    pub input: InputSource,
    pub outfile: Option<PathBuf>,
}

impl Cli {
    pub fn into_config(self) -> Result<Invocation> {
        if self.infile.is_some() && self.infiletemplate.is_some() {
            return Err(SoapCallError::config_with_code(
                ErrorCode::CONFIG_CONFLICTING_OPTIONS,
                "--infile and --infiletemplate cannot be used together",
            ));
        }

        let template = self.template || self.infiletemplate.is_some();
        let input = match self.infiletemplate.or(self.infile) {
            Some(path) => InputSource::File(path),
            None => InputSource::Stdin,
        };

        let mut builder = CallConfig::builder(self.endpoint)
            .soap_action(self.soapaction)
            .request_template(template)
            .flatten(FlattenMode::from_flags(self.flatten_xml, self.flatten_html))
            .flatten_key(self.flatten_key)
            .base64(self.base64)
            .debug(self.debug);

        if AuthType::parse(&self.authtype)? == AuthType::Basic {
            match (self.username, self.password) {
                (Some(username), Some(password)) => {
                    builder = builder.basic_auth(username, password);
                }
                _ => {
                    return Err(SoapCallError::config_with_code(
                        ErrorCode::CONFIG_INVALID_AUTH,
                        "--authtype basic requires --username and --password",
                    ))
                }
            }
        }

        Ok(Invocation {
            config: builder.build()?,
            input,
            outfile: self.outfile,
        })
    }
}
