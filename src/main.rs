use anyhow::Context;
use clap::Parser;
use soapcall::cli::{get_log_level, Cli};
use soapcall::error::describe_error_code;
use soapcall::output::OutputSink;
use soapcall::pipeline::Pipeline;
use soapcall::SoapCallError;
use tracing::{debug, error, trace, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(get_log_level(cli.verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2) // Show target module for -vv and above
        .with_thread_ids(cli.verbose >= 3) // Show thread IDs for -vvv
        .with_line_number(cli.verbose >= 3) // Show line numbers for -vvv
        .init();

    debug!("soapcall started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<SoapCallError>() {
            Some(err) => error!(
                "Fatal {} error ({}): {:#}",
                err.stage(),
                describe_error_code(err.code()),
                e
            ),
            None => error!("Fatal error: {:#}", e),
        }
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let invocation = cli.into_config()?;
    let input = invocation
        .input
        .read()
        .with_context(|| format!("failed to read request from {}", invocation.input))?;
    debug!("Read {} request bytes from {}", input.len(), invocation.input);

    let pipeline = Pipeline::production()?;
    let outfile = invocation.outfile.as_deref();

    let outcome = pipeline
        .run(
            &invocation.config,
            input,
            || OutputSink::open(outfile),
            &mut std::io::stderr(),
        )
        .await
        .inspect_err(log_failure_details)?;

    if !outcome.call.response.is_success() {
        warn!(
            "Processed a non-success response: {}",
            outcome.call.response.status_line()
        );
    }
    debug!("Done, {} bytes of output", outcome.processed_bytes);
    Ok(())
}

fn log_failure_details(err: &SoapCallError) {
    if let Some(log) = err.retry_log().filter(|log| !log.is_empty()) {
        for line in log.to_string().lines() {
            warn!("{}", line);
        }
    }
    if let SoapCallError::Decode { raw, partial, .. } = err {
        warn!(
            "Response body was {} bytes, {} bytes decoded before the error (use --debug to dump both)",
            raw.len(),
            partial.len()
        );
    }
}
