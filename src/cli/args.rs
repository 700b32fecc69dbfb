//! CLI argument structures

use clap::Parser;
use std::path::PathBuf;

/// Send a SOAP request and post-process the response
#[derive(Parser, Debug)]
#[command(name = "soapcall")]
#[command(about = "soapcall - POST a SOAP request, then decode and flatten the response", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Endpoint URL the request is POSTed to
    #[arg(long, value_name = "URL")]
    pub endpoint: String,

    /// Value of the SOAPAction header (sent quoted)
    #[arg(long, value_name = "ACTION", default_value = "")]
    pub soapaction: String,

    /// Read the request body from a file instead of stdin
    #[arg(long, value_name = "PATH")]
    pub infile: Option<PathBuf>,

    /// Read the request body from a file and expand it as a template
    #[arg(long, value_name = "PATH")]
    pub infiletemplate: Option<PathBuf>,

    /// Expand the request body as a template before sending
    #[arg(long)]
    pub template: bool,

    /// Flatten the response as XML
    #[arg(long = "flatten-xml", alias = "flattenXML")]
    pub flatten_xml: bool,

    /// Flatten the response as HTML
    #[arg(long = "flatten-html", alias = "flattenHTML")]
    pub flatten_html: bool,

    /// Only print values at this path, or records whose value starts with a key ending in '/'
    #[arg(long = "flatten-key", alias = "flattenKey", value_name = "KEY", default_value = "")]
    pub flatten_key: String,

    /// Write processed output to a file instead of stdout
    #[arg(long, value_name = "PATH")]
    pub outfile: Option<PathBuf>,

    /// Decode the base64 payload between <reportBytes> markers
    #[arg(long)]
    pub base64: bool,

    /// Authentication scheme: basic or none
    #[arg(long, value_name = "TYPE", default_value = "none")]
    pub authtype: String,

    /// Username for basic auth
    #[arg(long)]
    pub username: Option<String>,

    /// Password for basic auth
    #[arg(long)]
    pub password: Option<String>,

    /// Dump the full request/response exchange to stderr
    #[arg(long)]
    pub debug: bool,
}
