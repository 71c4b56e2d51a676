//! Scheduler for the fetch → extract → push loop.
//!
//! Two states, both of which lead back to a fetch:
//!
//! - `Running`: the last cycle completed (even if it found nothing or the
//!   push failed). Next cycle after the normal interval.
//! - `BackoffAfterError`: the last cycle hit an unexpected error. Next
//!   cycle after the shorter backoff delay.
//!
//! There is no retry limit. The loop only ends when the shutdown future
//! resolves.

use anyhow::Result;
use chrono::{DateTime, Local};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::scraper::{PageSource, RateExtractor};
use crate::storage::SignalStore;
use crate::types::TradingPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    BackoffAfterError,
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Summary of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_number: u64,
    /// The page could not be fetched; no extraction happened.
    pub fetch_failed: bool,
    pub signals_found: usize,
    pub profitable: usize,
    pub write_attempted: bool,
    pub write_succeeded: bool,
    pub timestamp: DateTime<Local>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    source: Box<dyn PageSource>,
    extractor: Box<dyn RateExtractor>,
    store: Box<dyn SignalStore>,
    pairs: Vec<TradingPair>,
    config: SchedulerConfig,
    state: SchedulerState,
    cycle_count: u64,
}

impl Scheduler {
    pub fn new(
        source: Box<dyn PageSource>,
        extractor: Box<dyn RateExtractor>,
        store: Box<dyn SignalStore>,
        pairs: Vec<TradingPair>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            source,
            extractor,
            store,
            pairs,
            config,
            state: SchedulerState::Running,
            cycle_count: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// How long to wait before the next cycle in the current state.
    pub fn next_delay(&self) -> Duration {
        match self.state {
            SchedulerState::Running => Duration::from_secs(self.config.interval_secs),
            SchedulerState::BackoffAfterError => {
                Duration::from_secs(self.config.error_backoff_secs)
            }
        }
    }

    /// Run a single fetch → extract → push cycle.
    ///
    /// Fetch failures and failed pushes are absorbed here; only errors
    /// nothing else handles come back as `Err`.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycle_count += 1;
        let timestamp = Local::now();
        info!(cycle = self.cycle_count, "🔎 Scraping funding rates...");

        let page = match self.source.fetch_page().await {
            Ok(page) => Some(page),
            Err(e) => {
                error!(error = %e, "✗ Scraping error");
                None
            }
        };

        let signals = match &page {
            Some(text) => self.extractor.extract(text, &self.pairs)?,
            None => Vec::new(),
        };

        let mut report = CycleReport {
            cycle_number: self.cycle_count,
            fetch_failed: page.is_none(),
            signals_found: signals.len(),
            profitable: signals.iter().filter(|s| s.profitable).count(),
            write_attempted: false,
            write_succeeded: false,
            timestamp,
        };

        if signals.is_empty() {
            warn!("⚠️  No signals found");
            return Ok(report);
        }

        info!(count = signals.len(), "Pushing signals...");
        report.write_attempted = true;
        report.write_succeeded = self.store.write(&signals).await;

        Ok(report)
    }

    /// Run one cycle, update the state and return the delay before the
    /// next one.
    pub async fn step(&mut self) -> Duration {
        match self.run_cycle().await {
            Ok(report) => {
                log_cycle_report(&report);
                self.state = SchedulerState::Running;
            }
            Err(e) => {
                error!(error = %e, "✗ Error in main loop");
                self.state = SchedulerState::BackoffAfterError;
            }
        }
        self.next_delay()
    }

    /// Loop until `shutdown` resolves. Shutdown is honoured both during a
    /// cycle and while sleeping.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let delay = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                delay = self.step() => delay,
            };

            info!(
                secs = delay.as_secs(),
                state = ?self.state,
                "⏰ Next run in {} min {} s",
                delay.as_secs() / 60,
                delay.as_secs() % 60
            );

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(cycles = self.cycle_count, "✋ Bot stopped");
    }
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle_number,
        fetch_failed = report.fetch_failed,
        signals = report.signals_found,
        profitable = report.profitable,
        pushed = report.write_succeeded,
        "Cycle complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
