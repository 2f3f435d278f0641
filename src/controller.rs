//! # Operation Controller
//!
//! Owns the collaborator process for the whole run. The controller spawns it
//! in a fresh process group with stdout redirected into the transfer log,
//! polls it for liveness, terminates the whole group when `stop` fires, and
//! turns the exit status into a result.
//!
//! The controller is the only component that touches the [`Child`]. Others
//! learn about the process through the [`Signals`]: `started` carries the
//! pid, `ended` carries the time exit was observed.
//!
//! [`Child`]: tokio::process::Child

use crate::config::{Operation, OperationConfig};
use crate::error::{ArrowError, ExitReason, Result};
use crate::signal::{ProcessHandle, Signals};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Liveness poll granularity; also bounds how quickly `stop` is acted on.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Start and end of a successful run, in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunTiming {
    pub process: ProcessHandle,
    pub start_time: f64,
    pub end_time: f64,
}

impl RunTiming {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

pub struct OperationController {
    operation: Operation,
    impl_file: PathBuf,
    args: Vec<String>,
    transfers_file: PathBuf,
    poll_interval: Duration,
    terminate: fn(u32) -> Result<()>,
}

impl OperationController {
    pub fn new(config: &OperationConfig) -> Self {
        Self {
            operation: config.operation,
            impl_file: config.impl_file.clone(),
            args: config.collaborator_args(),
            transfers_file: config.transfers_file(),
            poll_interval: POLL_INTERVAL,
            terminate: terminate_group,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the collaborator to completion.
    ///
    /// `ended` is guaranteed to be set when this returns, whether or not the
    /// process could be started, so nobody waits on it forever.
    pub async fn run(&self, signals: &Signals) -> Result<RunTiming> {
        let result = self.supervise(signals).await;
        signals.mark_ended();
        result
    }

    async fn supervise(&self, signals: &Signals) -> Result<RunTiming> {
        // Truncate-then-write: a rerun into the same directory starts clean.
        let log = File::create(&self.transfers_file)?;

        let mut cmd = Command::new(&self.impl_file);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::inherit())
            .process_group(0);

        let mut child = cmd.spawn().map_err(|source| ArrowError::ProcessSpawn {
            path: self.impl_file.clone(),
            source,
        })?;

        let pid = child
            .id()
            .ok_or_else(|| ArrowError::Internal("process exited before its pid was read".into()))?;
        let started = signals.mark_started(ProcessHandle { pid, pgid: pid });
        debug!("Process {} ({}) started", pid, self.operation);

        let mut terminated = false;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }

            if !terminated {
                if let Some(reason) = signals.stop.get() {
                    warn!("Stopping process group {} ({:?})", pid, reason);
                    // The child is still ours to reap, so a failed signal
                    // does not end the wait.
                    if let Err(e) = (self.terminate)(started.process.pgid) {
                        error!("Failed to stop process group {}: {}", pid, e);
                    }
                    terminated = true;
                }
            }

            sleep(self.poll_interval).await;
        };

        let end_time = signals.mark_ended();

        if status.success() {
            debug!("Process {} ({}) exited normally", pid, self.operation);
            Ok(RunTiming {
                process: started.process,
                start_time: started.start_time,
                end_time,
            })
        } else {
            Err(ArrowError::ProcessExit {
                pid,
                operation: self.operation,
                reason: exit_reason(&status),
            })
        }
    }
}

/// Send SIGTERM to every process in the group.
///
/// A group that is already gone is not an error: the exit will be picked up
/// by the next liveness poll.
fn terminate_group(pgid: u32) -> Result<()> {
    match killpg(Pid::from_raw(pgid as i32), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(ArrowError::Io(e.into())),
    }
}

fn exit_reason(status: &ExitStatus) -> ExitReason {
    match (status.code(), status.signal()) {
        (Some(code), _) => ExitReason::Code(code),
        (None, Some(signal)) => ExitReason::Signal(signal),
        (None, None) => ExitReason::Unknown,
    }
}
