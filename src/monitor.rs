//! # Monitor (Watchdog) Loop
//!
//! The monitor runs beside the controller for the lifetime of the
//! collaborator process. Once per tick it:
//!
//! 1. samples CPU time and resident memory of the process,
//! 2. drains the records appended to the transfer log since the last tick,
//! 3. derives a [`Snapshot`] from the previous one plus those records,
//! 4. appends the snapshot to the series and to the snapshot log,
//! 5. prints a status line (receivers only, unless quiet),
//! 6. checks for a stall.
//!
//! ## Stall Detection
//!
//! The timeout is a no-progress threshold, not a deadline. A
//! [`TimeoutCheckpoint`] remembers when the message total last grew; once it
//! has been flat for longer than the timeout the monitor fires `stop` and
//! ends with [`ArrowError::TimedOut`].
//!
//! ## States
//!
//! `WaitingForStart → Running → (TimedOut | Ended)`

use crate::accounting::{ProcessAccounting, ProcessUsage};
use crate::config::{Operation, OperationConfig};
use crate::error::{ArrowError, Result};
use crate::signal::{Signals, StopReason};
use crate::transfers::{TransferRecord, TransferStream};
use crate::utils::{calculate_mean, current_timestamp_secs, format_decimal, format_thousands};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default interval between snapshots.
pub const TICK: Duration = Duration::from_secs(1);

/// Bytes per "MB" in status lines, matching existing Quiver result output.
const RSS_MB: f64 = 1000.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    WaitingForStart,
    Running,
    TimedOut,
    Ended,
}

/// One periodic sample of progress and resource usage.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Records seen since the run started
    pub message_total: u64,
    /// Records seen since the previous snapshot
    pub message_count: u64,
    /// `message_count` per second over the interval, rounded
    pub message_rate: u64,
    /// Mean latency over the interval (receivers with traffic only)
    pub latency: Option<f64>,
    /// User CPU seconds
    pub utime: f64,
    /// System CPU seconds
    pub stime: f64,
    /// Resident set size in bytes
    pub rss: u64,
}

impl Snapshot {
    /// The zero point taken when the process starts.
    pub fn baseline(timestamp: f64, usage: ProcessUsage) -> Self {
        Self {
            timestamp,
            message_total: 0,
            message_count: 0,
            message_rate: 0,
            latency: None,
            utime: usage.utime,
            stime: usage.stime,
            rss: usage.rss,
        }
    }

    /// Derive the next snapshot from `previous` and the records that arrived
    /// in between.
    pub fn next(
        previous: &Snapshot,
        timestamp: f64,
        usage: ProcessUsage,
        records: &[TransferRecord],
        operation: Operation,
    ) -> Self {
        let period = timestamp - previous.timestamp;
        let message_count = records.len() as u64;
        let message_rate = if period > 0.0 {
            (message_count as f64 / period).round() as u64
        } else {
            0
        };

        let latency = match operation {
            Operation::Receive if message_count > 0 => {
                let latencies: Vec<f64> = records
                    .iter()
                    .filter_map(TransferRecord::latency)
                    .map(|l| l as f64)
                    .collect();
                calculate_mean(&latencies)
            }
            _ => None,
        };

        Self {
            timestamp,
            message_total: previous.message_total + message_count,
            message_count,
            message_rate,
            latency,
            utime: usage.utime,
            stime: usage.stime,
            rss: usage.rss,
        }
    }

    /// CPU utilization over the interval since `previous`, in percent.
    pub fn cpu_percent(&self, previous: &Snapshot) -> f64 {
        let elapsed = self.timestamp - previous.timestamp;
        if elapsed <= 0.0 {
            return 0.0;
        }
        let cpu = (self.utime + self.stime) - (previous.utime + previous.stime);
        cpu / elapsed * 100.0
    }

    /// `timestamp,message_total,message_count,message_rate,utime,stime,rss`
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.timestamp,
            self.message_total,
            self.message_count,
            self.message_rate,
            self.utime,
            self.stime,
            self.rss
        )
    }

    pub fn status_line(&self, previous: &Snapshot) -> String {
        let total = format_thousands(self.message_total as i64);
        let rate = format!("{} messages/s", format_thousands(self.message_rate as i64));
        let latency = match self.latency {
            Some(latency) => format!("{} ms avg latency", format_decimal(latency, 1)),
            None => "-".to_string(),
        };
        let cpu = format!("{} %", format_decimal(self.cpu_percent(previous), 1));
        let rss = format!("{} MB", format_decimal(self.rss as f64 / RSS_MB, 1));

        format!(
            "* {:>12} {:>24} {:>28} {:>10} {:>12}",
            total, rate, latency, cpu, rss
        )
    }
}

/// Append-only, time-ordered series of snapshots.
///
/// Never empty: it starts with the baseline, so the predecessor of any new
/// snapshot is always available by index.
#[derive(Debug, Clone)]
pub struct SnapshotSeries {
    snapshots: Vec<Snapshot>,
}

impl SnapshotSeries {
    pub fn new(baseline: Snapshot) -> Self {
        Self {
            snapshots: vec![baseline],
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn latest(&self) -> &Snapshot {
        &self.snapshots[self.snapshots.len() - 1]
    }

    /// The snapshot before the one at `index`, if any.
    pub fn previous(&self, index: usize) -> Option<&Snapshot> {
        index.checked_sub(1).and_then(|i| self.snapshots.get(i))
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    /// Snapshots taken on ticks, without the baseline.
    pub fn ticks(&self) -> &[Snapshot] {
        &self.snapshots[1..]
    }
}

/// The snapshot log file, one CSV line per tick.
pub struct SnapshotLog {
    file: File,
}

impl SnapshotLog {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file })
    }

    pub fn append(&mut self, snapshot: &Snapshot) -> Result<()> {
        writeln!(self.file, "{}", snapshot.to_csv_line())?;
        self.file.flush()?;
        Ok(())
    }
}

/// Remembers when the message total last grew.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutCheckpoint {
    pub timestamp: f64,
    pub message_total: u64,
}

impl TimeoutCheckpoint {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            message_total: 0,
        }
    }

    /// Record the state at `now`. Returns `true` when the total has not
    /// grown for longer than `timeout` seconds.
    pub fn check(&mut self, now: f64, message_total: u64, timeout: f64) -> bool {
        if message_total == self.message_total && now - self.timestamp > timeout {
            return true;
        }

        if message_total > self.message_total {
            self.timestamp = now;
        }
        self.message_total = message_total;
        false
    }
}

/// What the monitor saw by the time the process ended.
#[derive(Debug)]
pub struct MonitorReport {
    pub state: MonitorState,
    /// `None` if the process never started
    pub snapshots: Option<SnapshotSeries>,
}

pub struct Monitor<A: ProcessAccounting> {
    operation: Operation,
    transfers_file: PathBuf,
    snapshots_file: PathBuf,
    timeout: Duration,
    quiet: bool,
    tick: Duration,
    accounting: A,
    state: MonitorState,
}

impl<A: ProcessAccounting> Monitor<A> {
    pub fn new(config: &OperationConfig, accounting: A) -> Self {
        Self {
            operation: config.operation,
            transfers_file: config.transfers_file(),
            snapshots_file: config.snapshots_file(),
            timeout: config.timeout_duration(),
            quiet: config.quiet,
            tick: TICK,
            accounting,
            state: MonitorState::WaitingForStart,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Watch the operation until `ended` fires or the stall timeout trips.
    ///
    /// Any failure other than a timeout also fires `stop`, so the process
    /// does not outlive a broken monitor.
    pub async fn run(mut self, signals: Arc<Signals>) -> Result<MonitorReport> {
        let result = self.watch(&signals).await;

        if let Err(e) = &result {
            if !matches!(e, ArrowError::TimedOut { .. }) {
                signals.request_stop(StopReason::MonitorFailed);
            }
        }

        result
    }

    async fn watch(&mut self, signals: &Signals) -> Result<MonitorReport> {
        let started = tokio::select! {
            biased;
            started = signals.started.wait() => started,
            _ = signals.ended.wait() => {
                self.state = MonitorState::Ended;
                return Ok(MonitorReport { state: self.state, snapshots: None });
            }
        };
        let pid = started.process.pid;

        let mut stream = TransferStream::open(&self.transfers_file)?;
        let mut snapshot_log = SnapshotLog::create(&self.snapshots_file)?;
        let parser = self.operation.parser();
        let timeout = self.timeout.as_secs_f64();

        let usage = self.accounting.sample(pid).unwrap_or_default();
        let mut series = SnapshotSeries::new(Snapshot::baseline(started.start_time, usage));
        let mut checkpoint = TimeoutCheckpoint::new(started.start_time);
        self.state = MonitorState::Running;

        while tokio::time::timeout(self.tick, signals.ended.wait())
            .await
            .is_err()
        {
            let now = current_timestamp_secs();

            match self.accounting.sample(pid) {
                Ok(usage) => {
                    let records = stream.read_records(parser)?;
                    let snapshot =
                        Snapshot::next(series.latest(), now, usage, &records, self.operation);
                    snapshot_log.append(&snapshot)?;

                    if self.operation == Operation::Receive && !self.quiet {
                        println!("{}", snapshot.status_line(series.latest()));
                    }

                    series.push(snapshot);
                }
                // Records stay in the log and are counted on the next tick.
                Err(e) if e.is_recoverable() => debug!("Skipping snapshot: {}", e),
                Err(e) => return Err(e),
            }

            if checkpoint.check(now, series.latest().message_total, timeout) {
                self.state = MonitorState::TimedOut;
                signals.request_stop(StopReason::TimedOut);
                return Err(ArrowError::TimedOut {
                    operation: self.operation,
                });
            }
        }

        self.state = MonitorState::Ended;
        Ok(MonitorReport {
            state: self.state,
            snapshots: Some(series),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfers::parse_receive;

    fn usage(utime: f64, stime: f64, rss: u64) -> ProcessUsage {
        ProcessUsage { utime, stime, rss }
    }

    #[test]
    fn test_next_snapshot_uses_interval_delta() {
        let base = Snapshot::baseline(100.0, usage(0.0, 0.0, 1024));
        let records = vec![
            parse_receive("m1,1000,1010").unwrap(),
            parse_receive("m2,1050,1055").unwrap(),
        ];

        let first = Snapshot::next(&base, 102.0, usage(1.0, 0.5, 2048), &records, Operation::Receive);
        assert_eq!(first.message_total, 2);
        assert_eq!(first.message_count, 2);
        assert_eq!(first.message_rate, 1);
        assert_eq!(first.latency, Some(7.5));
        assert_eq!(first.rss, 2048);

        let second = Snapshot::next(&first, 103.0, usage(1.0, 0.5, 2048), &[], Operation::Receive);
        assert_eq!(second.message_total, 2);
        assert_eq!(second.message_count, 0);
        assert_eq!(second.message_rate, 0);
        assert_eq!(second.latency, None);
    }

    #[test]
    fn test_sender_snapshots_have_no_latency() {
        let base = Snapshot::baseline(0.0, ProcessUsage::default());
        let records = vec![crate::transfers::parse_send("m1,1000").unwrap()];
        let snap = Snapshot::next(&base, 1.0, ProcessUsage::default(), &records, Operation::Send);
        assert_eq!(snap.latency, None);
        assert_eq!(snap.message_rate, 1);
    }

    #[test]
    fn test_cpu_percent_and_csv_line() {
        let base = Snapshot::baseline(10.0, usage(1.0, 1.0, 0));
        let snap = Snapshot::next(&base, 12.0, usage(1.5, 1.5, 4096), &[], Operation::Send);
        assert_eq!(snap.cpu_percent(&base), 50.0);
        assert_eq!(snap.to_csv_line(), "12,0,0,0,1.5,1.5,4096");
    }

    #[test]
    fn test_series_lookback() {
        let mut series = SnapshotSeries::new(Snapshot::baseline(0.0, ProcessUsage::default()));
        let next = Snapshot::next(series.latest(), 1.0, ProcessUsage::default(), &[], Operation::Send);
        series.push(next);

        assert_eq!(series.len(), 2);
        assert_eq!(series.ticks().len(), 1);
        assert_eq!(series.previous(1).unwrap().timestamp, 0.0);
        assert!(series.previous(0).is_none());
        assert_eq!(series.latest().timestamp, 1.0);
    }

    #[test]
    fn test_checkpoint_only_moves_on_progress() {
        let mut checkpoint = TimeoutCheckpoint::new(0.0);

        assert!(!checkpoint.check(1.0, 5, 2.0));
        assert_eq!(checkpoint.timestamp, 1.0);

        assert!(!checkpoint.check(2.0, 5, 2.0));
        assert!(!checkpoint.check(3.0, 5, 2.0));
        assert_eq!(checkpoint.timestamp, 1.0);

        assert!(checkpoint.check(3.5, 5, 2.0));
    }

    #[test]
    fn test_checkpoint_stalls_without_any_traffic() {
        let mut checkpoint = TimeoutCheckpoint::new(0.0);
        assert!(!checkpoint.check(5.0, 0, 10.0));
        assert!(checkpoint.check(10.5, 0, 10.0));
    }

    #[test]
    fn test_status_line_format() {
        let base = Snapshot::baseline(0.0, usage(0.0, 0.0, 0));
        let records = vec![parse_receive("m1,1000,1010").unwrap()];
        let snap = Snapshot::next(
            &base,
            1.0,
            usage(0.25, 0.25, 10 * 1000 * 1024),
            &records,
            Operation::Receive,
        );
        let line = snap.status_line(&base);

        assert!(line.starts_with("* "));
        assert!(line.contains("1 messages/s"));
        assert!(line.contains("10.0 ms avg latency"));
        assert!(line.contains("50.0 %"));
        assert!(line.contains("10.0 MB"));
    }
}
