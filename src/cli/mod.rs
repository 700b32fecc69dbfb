//! Command-line surface
//!
//! - Argument parsing structures
//! - Conversion into a validated [`Invocation`]
//! - Log level selection

pub mod args;
pub mod validation;

pub use args::Cli;
pub use validation::{AuthType, InputSource, Invocation};

/// Default tracing filter for a `-v` count; `RUST_LOG` takes precedence
pub fn get_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace,hyper=debug,reqwest=debug", // -vvv traces everything but the HTTP internals
    }
}
