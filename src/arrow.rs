//! # Arrow Runner
//!
//! Drives one send or receive operation from start to summary:
//!
//! 1. the [`Monitor`] is spawned as a task and waits for `started`,
//! 2. the [`OperationController`] runs the collaborator to completion,
//! 3. the monitor is joined,
//! 4. the full transfer log is turned into [`OperationResults`],
//! 5. the [`ResultSummary`] is persisted.
//!
//! The first failure wins. A monitor failure is reported ahead of the
//! controller's, since a stall timeout is what made the controller terminate
//! the process in the first place.
//!
//! [`OperationResults`]: crate::statistics::OperationResults

use crate::accounting::{ProcStatAccounting, ProcessAccounting};
use crate::config::{Operation, OperationConfig};
use crate::controller::{OperationController, POLL_INTERVAL};
use crate::error::{ArrowError, Result};
use crate::monitor::{Monitor, TICK};
use crate::results::{print_results, ResultSummary, SummaryPersister};
use crate::signal::Signals;
use crate::statistics::compute_results;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct ArrowRunner<A: ProcessAccounting + 'static = ProcStatAccounting> {
    config: OperationConfig,
    signals: Arc<Signals>,
    accounting: A,
    tick: Duration,
    poll_interval: Duration,
}

impl ArrowRunner<ProcStatAccounting> {
    pub fn new(config: OperationConfig) -> Self {
        Self {
            config,
            signals: Signals::new(),
            accounting: ProcStatAccounting::new(),
            tick: TICK,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl<A: ProcessAccounting + 'static> ArrowRunner<A> {
    /// Replace the process accounting source.
    pub fn with_accounting<B: ProcessAccounting + 'static>(self, accounting: B) -> ArrowRunner<B> {
        ArrowRunner {
            config: self.config,
            signals: self.signals,
            accounting,
            tick: self.tick,
            poll_interval: self.poll_interval,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn config(&self) -> &OperationConfig {
        &self.config
    }

    /// Lifecycle signals of this run. Setting `stop` from outside cancels it.
    pub fn signals(&self) -> Arc<Signals> {
        self.signals.clone()
    }

    pub async fn run(self) -> Result<ResultSummary> {
        let config = self.config;
        let signals = self.signals;

        info!(
            "Starting {} operation with {} ({})",
            config.operation, config.implementation, config.id
        );

        let monitor = Monitor::new(&config, self.accounting).with_tick(self.tick);
        let monitor_task = tokio::spawn(monitor.run(signals.clone()));

        let controller =
            OperationController::new(&config).with_poll_interval(self.poll_interval);
        let outcome = controller.run(&signals).await;

        let report = monitor_task
            .await
            .map_err(|e| ArrowError::Internal(format!("Monitor task failed: {}", e)))??;
        let timing = outcome?;

        if let Some(snapshots) = &report.snapshots {
            debug!("Monitor recorded {} snapshots", snapshots.ticks().len());
        }

        let transfers_file = config.transfers_file();
        if std::fs::metadata(&transfers_file)?.len() == 0 {
            return Err(ArrowError::NoTransfers);
        }

        let results = compute_results(config.operation, &transfers_file, &timing)?;

        if config.operation == Operation::Receive && !config.quiet {
            print_results(&results, timing.duration());
        }

        let summary = ResultSummary::new(&config, results);
        SummaryPersister::new(config.summary_file()).save(&summary)?;

        Ok(summary)
    }
}
