//! # Quiver Arrow
//!
//! Supervisor core of a messaging performance test. An arrow does not speak
//! any messaging protocol itself: it launches an external collaborator
//! program that sends or receives messages and writes one line per transfer
//! to its stdout. The arrow captures that stream, watches the process while
//! it runs, and condenses the outcome into throughput and latency figures.
//!
//! ## Architecture Overview
//!
//! - `config` / `cli`: validated operation configuration from the command line
//! - `controller`: spawns the collaborator in its own process group and owns it
//! - `monitor`: periodic snapshots of progress and resource usage; stall timeout
//! - `transfers`: incremental reader over the growing transfer log
//! - `statistics`: final rate and latency figures from the full log
//! - `results`: the persisted summary and console reports
//! - `arrow`: the run driver tying the above together
//!
//! ## Data Flow
//!
//! ```text
//! config -> controller spawns collaborator -> transfer log grows
//!                                          -> monitor polls log + /proc
//!        -> process exits -> statistics re-read the log -> summary.json
//! ```
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use quiver_arrow::{ArrowRunner, Args, OperationConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = Args::parse_from(["quiver-arrow", "receive", "//broker:5672/q0", "-m", "10k"]);
//!     let config = OperationConfig::from_args(&args)?;
//!
//!     let summary = ArrowRunner::new(config).run().await?;
//!     println!("Rate: {} messages/s", summary.results.message_rate);
//!     Ok(())
//! }
//! ```

/// Process CPU and memory sampling behind a mockable trait
pub mod accounting;

/// The run driver
///
/// Spawns the monitor, runs the controller, joins both and produces the
/// persisted summary. Surfaces the first terminal error of the run.
pub mod arrow;

/// Command-line interface
///
/// Argument parsing with clap, including `k`/`m` suffixed integer values.
pub mod cli;

/// Validated configuration of one operation
pub mod config;

/// Collaborator process lifecycle
///
/// Spawns the collaborator with stdout redirected into the transfer log,
/// polls it for exit and terminates its process group on request.
pub mod controller;

pub mod error;

pub mod logging;

/// Watchdog loop producing per-tick snapshots and enforcing the stall timeout
pub mod monitor;

/// The summary artifact and console reports
pub mod results;

/// One-shot lifecycle signals shared between controller and monitor
pub mod signal;

/// Final throughput and latency figures
pub mod statistics;

/// Transfer record parsing and the incremental log reader
pub mod transfers;

pub mod utils;

pub use arrow::ArrowRunner;
pub use cli::Args;
pub use config::{Implementation, Operation, OperationConfig};
pub use error::{ArrowError, Result};
pub use results::{ResultSummary, SummaryPersister};
pub use statistics::OperationResults;

/// The current version of quiver-arrow
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// Kept as strings because they are fed to clap as `default_value`s and go
/// through the same unit-suffix parsing as user input.
pub mod defaults {
    /// Default number of messages to send or receive
    pub const MESSAGES: &str = "1m";

    /// Default messaging implementation
    pub const IMPLEMENTATION: &str = "qpid-proton-python";

    /// Default message body size in bytes
    pub const BYTES: &str = "100";

    /// Default credit window of a receiver
    pub const CREDIT: &str = "1k";

    /// Default stall timeout in seconds
    pub const TIMEOUT: &str = "10";
}
