use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::dispatch::DispatchGroup;
use crate::core::hooks::{HookSet, matcher};
use crate::core::process::{ProcessRecord, ProcessStore};
use crate::core::state::PollState;

/// Counts from one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// In-flight processes that settled this cycle.
    pub settled: usize,
    /// Rows past the cursor.
    pub new_rows: usize,
    /// Newly tracked in-flight processes.
    pub tracked: usize,
    pub dispatched: usize,
}

/// Walks the process table incrementally and hands settled rows to the matcher.
///
/// The poll state lives behind an async mutex that a cycle holds from start to
/// finish, so whoever locks it after the loop exits sees a completed cycle.
pub struct ChangePoller {
    store: Arc<dyn ProcessStore>,
    hooks: Arc<HookSet>,
    dispatch: Arc<DispatchGroup>,
    state: Arc<Mutex<PollState>>,
}

impl ChangePoller {
    pub fn new(
        store: Arc<dyn ProcessStore>,
        hooks: Arc<HookSet>,
        dispatch: Arc<DispatchGroup>,
        state: PollState,
    ) -> Self {
        Self {
            store,
            hooks,
            dispatch,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> Arc<Mutex<PollState>> {
        self.state.clone()
    }

    /// Skips the historical backlog by starting the cursor at the current
    /// maximum id.
    pub async fn prime_cursor(&self) -> Result<i64> {
        let max = self
            .store
            .max_process_id()
            .await
            .context("Failed to read the highest process id")?;
        let mut state = self.state.lock().await;
        state.last_poll_process_id = max;
        info!("Primed poll cursor at process id {}", max);
        Ok(max)
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut state = self.state.lock().await;
        let mut report = CycleReport::default();

        self.scan_in_flight(&mut state, &mut report).await?;
        self.scan_new(&mut state, &mut report).await?;
        state.last_poll_timestamp = Some(Utc::now());

        info!(
            "Poll complete at {} (cursor: {}, in flight: {})",
            state
                .last_poll_timestamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            state.last_poll_process_id,
            state.executing_processes.len()
        );
        debug!(
            "Cycle: {} new, {} newly tracked, {} settled, {} webhook(s) queued",
            report.new_rows, report.tracked, report.settled, report.dispatched
        );
        Ok(report)
    }

    async fn scan_in_flight(&self, state: &mut PollState, report: &mut CycleReport) -> Result<()> {
        if state.executing_processes.is_empty() {
            return Ok(());
        }

        let records = self
            .store
            .processes_by_ids(&state.executing_processes)
            .await
            .context("Failed to look up in-flight processes")?;

        for record in records {
            if record.is_executing() {
                continue;
            }
            if state.untrack(record.id) {
                debug!("Process {} settled as '{}'", record.id, record.status);
                report.settled += 1;
                report.dispatched += self.route(record);
            }
        }
        Ok(())
    }

    async fn scan_new(&self, state: &mut PollState, report: &mut CycleReport) -> Result<()> {
        let records = self
            .store
            .processes_above(state.last_poll_process_id)
            .await
            .context("Failed to fetch new processes")?;

        report.new_rows = records.len();
        let batch_max = records.iter().map(|r| r.id).max();

        for record in records {
            if record.is_executing() {
                if state.track(record.id) {
                    debug!("Tracking in-flight process {}", record.id);
                    report.tracked += 1;
                }
                continue;
            }
            report.dispatched += self.route(record);
        }

        if let Some(max) = batch_max {
            state.advance_cursor(max);
        }
        Ok(())
    }

    /// Submits one delivery per matching hook. Returns how many were submitted.
    fn route(&self, record: ProcessRecord) -> usize {
        let record = Arc::new(record);
        let mut fired = 0;
        for hook in self.hooks.iter() {
            if matcher::evaluate(&record, hook) {
                self.dispatch.submit(record.clone(), hook.clone());
                fired += 1;
            }
        }
        fired
    }

    /// Polls every `interval` until `cancel` fires. A running cycle always
    /// finishes before the loop checks for cancellation again.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.run_cycle().await {
                error!("Poll cycle failed: {:#}", e);
            }
        }
        info!("Poll loop stopped");
    }
}
