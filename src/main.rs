//! # Quiver Arrow - Main Entry Point
//!
//! 1. **Parse arguments** and **initialize logging**
//! 2. **Build the configuration**; with `--init-only`, stop here
//! 3. **Forward Ctrl-C** to the run as a stop request. The collaborator lives
//!    in its own process group and does not see the terminal's SIGINT.
//! 4. **Run** the operation and report the single terminal error, if any
//!
//! Exit status is 0 on success and 1 on any failure.

use anyhow::{Context, Result};
use clap::Parser;
use quiver_arrow::{
    logging::init_logging, results::print_config, signal::StopReason, ArrowRunner, Args,
    OperationConfig,
};
use tracing::{debug, error, warn};

const PROGRAM: &str = "quiver-arrow";

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Held until exit so the file writer is flushed.
    let guard = match init_logging(PROGRAM, args.quiet, args.verbose, args.log_file.as_deref())
        .context("Failed to initialize logging")
    {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}: {:#}", PROGRAM, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        drop(guard);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    debug!("Arguments: {:?}", args);

    let config = OperationConfig::from_args(&args)?;

    if config.verbose {
        print_config(&config);
    }

    if args.init_only {
        debug!("Initialization complete; exiting");
        return Ok(());
    }

    let runner = ArrowRunner::new(config);

    let signals = runner.signals();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping the operation");
            signals.request_stop(StopReason::Cancelled);
        }
    });

    let summary = runner.run().await?;
    debug!(
        "{} messages at {} messages/s",
        summary.results.message_count, summary.results.message_rate
    );

    Ok(())
}
