//! # Statistics Engine
//!
//! Computes the final results of an operation from the complete transfer
//! log, once the collaborator has exited. The monitor's snapshots are not
//! used: the log is re-read from the start so the figures cover every record.
//!
//! Latency is `receive_time - send_time` in whatever unit the collaborator
//! logs. No unit conversion and no clamping happens here; negative values
//! (clock skew between hosts) are kept and reported as a warning.

use crate::config::Operation;
use crate::controller::RunTiming;
use crate::error::{ArrowError, Result};
use crate::transfers::{parse_receive, parse_send, read_transfer_log, TransferRecord};
use crate::utils::{calculate_mean, calculate_percentiles};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Percentile levels reported for receivers.
pub const QUARTILES: [f64; 4] = [25.0, 50.0, 75.0, 100.0];

/// Aggregate results of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResults {
    pub message_count: u64,
    /// Messages per second over the whole run, rounded
    pub message_rate: u64,
    /// Mean latency (receivers only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_latency: Option<f64>,
    /// 25th, 50th, 75th and 100th latency percentiles (receivers only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_latency_by_quartile: Option<[f64; 4]>,
}

/// `round(count / duration)`.
///
/// A duration that rounds to zero milliseconds has no meaningful rate and is
/// an error rather than an infinite or zero result.
pub fn message_rate(count: u64, duration: f64) -> Result<u64> {
    if !duration.is_finite() || (duration * 1000.0).round() <= 0.0 {
        return Err(ArrowError::UndefinedRate { duration });
    }
    Ok((count as f64 / duration).round() as u64)
}

pub fn sender_results(records: &[TransferRecord], duration: f64) -> Result<OperationResults> {
    if records.is_empty() {
        return Err(ArrowError::NoTransfers);
    }

    let message_count = records.len() as u64;
    Ok(OperationResults {
        message_count,
        message_rate: message_rate(message_count, duration)?,
        message_latency: None,
        message_latency_by_quartile: None,
    })
}

pub fn receiver_results(records: &[TransferRecord], duration: f64) -> Result<OperationResults> {
    let latencies: Vec<f64> = records
        .iter()
        .filter_map(TransferRecord::latency)
        .map(|latency| latency as f64)
        .collect();

    let message_latency = calculate_mean(&latencies).ok_or(ArrowError::NoTransfers)?;

    let negative = records.iter().filter(|r| r.has_negative_latency()).count();
    if negative > 0 {
        warn!(
            "{} of {} records have a negative latency; sender and receiver clocks may disagree",
            negative,
            records.len()
        );
    }

    let quartiles = calculate_percentiles(&latencies, &QUARTILES);
    let message_count = latencies.len() as u64;

    Ok(OperationResults {
        message_count,
        message_rate: message_rate(message_count, duration)?,
        message_latency: Some(message_latency),
        message_latency_by_quartile: Some([
            quartiles[0].1,
            quartiles[1].1,
            quartiles[2].1,
            quartiles[3].1,
        ]),
    })
}

pub fn compute_sender_results<P: AsRef<Path>>(
    transfers_file: P,
    timing: &RunTiming,
) -> Result<OperationResults> {
    let records = read_transfer_log(transfers_file, parse_send)?;
    sender_results(&records, timing.duration())
}

pub fn compute_receiver_results<P: AsRef<Path>>(
    transfers_file: P,
    timing: &RunTiming,
) -> Result<OperationResults> {
    let records = read_transfer_log(transfers_file, parse_receive)?;
    receiver_results(&records, timing.duration())
}

pub fn compute_results<P: AsRef<Path>>(
    operation: Operation,
    transfers_file: P,
    timing: &RunTiming,
) -> Result<OperationResults> {
    match operation {
        Operation::Send => compute_sender_results(transfers_file, timing),
        Operation::Receive => compute_receiver_results(transfers_file, timing),
    }
}
