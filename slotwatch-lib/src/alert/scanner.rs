use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::admin::AdminLookup;
use super::history::{AlertRecord, AlertStore};
use crate::config::AlertConfig;
use crate::slots::SlotStore;
use crate::telemetry::Metrics;

/// Outcome of one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Users at or above the threshold
    pub qualified: usize,
    pub skipped_admins: usize,
    pub persisted: usize,
    pub failed: usize,
}

/// Background task recording users with many concurrently active slots.
pub struct AlertScanner {
    slots: Arc<SlotStore>,
    store: Arc<dyn AlertStore>,
    admins: Arc<dyn AdminLookup>,
    config: AlertConfig,
    metrics: Option<Arc<Metrics>>,
}

impl AlertScanner {
    pub fn new(
        slots: Arc<SlotStore>,
        store: Arc<dyn AlertStore>,
        admins: Arc<dyn AdminLookup>,
        config: AlertConfig,
    ) -> Self {
        Self { slots, store, admins, config, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run one cycle now.
    ///
    /// The ranking is taken under the store's read lock, which is released
    /// before any admin lookup or history write happens.
    pub async fn scan_once(&self) -> ScanReport {
        let users = self
            .slots
            .high_active_users(self.config.window_secs, self.config.threshold);
        let mut report = ScanReport { qualified: users.len(), ..ScanReport::default() };

        if users.is_empty() {
            debug!("High activity scan found no users above threshold");
            self.observe(&report);
            return report;
        }

        let now = self.slots.now_secs();
        let mut batch = Vec::with_capacity(users.len());
        for user in users {
            if self.admins.is_admin(user.user_id).await {
                report.skipped_admins += 1;
                continue;
            }
            batch.push(AlertRecord::new(
                user.user_id,
                user.username,
                user.active_slots,
                self.config.window_secs,
                now,
            ));
        }

        if !batch.is_empty() {
            let total = batch.len();
            match self.store.append_batch(batch).await {
                Ok(written) => report.persisted = written,
                Err(e) => {
                    warn!(error = %e, "Alert records dropped until next scan");
                    report.failed = e.failed;
                    report.persisted = total.saturating_sub(e.failed);
                }
            }
        }

        info!(
            qualified = report.qualified,
            skipped_admins = report.skipped_admins,
            persisted = report.persisted,
            failed = report.failed,
            "High activity scan finished"
        );
        self.observe(&report);
        report
    }

    /// Scan every `scan_interval_secs` until `shutdown` is cancelled.
    ///
    /// The first scan happens one interval after start. Cycles run one after
    /// another in this task, so a slow cycle delays the next one instead of
    /// overlapping it; ticks missed meanwhile are skipped.
    pub async fn run(self, shutdown: CancellationToken) {
        let period = Duration::from_secs(self.config.scan_interval_secs.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = period.as_secs(),
            window_secs = self.config.window_secs,
            threshold = self.config.threshold,
            "High activity scanner started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.scan_once().await;
                }
            }
        }

        info!("High activity scanner stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    fn observe(&self, report: &ScanReport) {
        if let Some(m) = &self.metrics {
            m.record_alert_scan(report.persisted, report.failed, report.skipped_admins);
        }
    }
}
