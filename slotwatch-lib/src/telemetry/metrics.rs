use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

use crate::slots::RecordOutcome;

pub mod labels {
    pub const OUTCOME: &str = "outcome";
    pub const ROUTE: &str = "route";
    pub const STATUS_CODE: &str = "status_code";
    pub const REASON: &str = "reason";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

pub mod values {
    pub const REASON_INVALID_USER: &str = "invalid_user";
    pub const REASON_INELIGIBLE_PATH: &str = "ineligible_path";
}

#[derive(Clone)]
pub struct Metrics {
    // Slot store
    pub record_task_total: Counter<u64>,
    pub record_task_ignored_total: Counter<u64>,
    pub slots_allocated: Gauge<u64>,

    // Alert scanner
    pub alert_scans_total: Counter<u64>,
    pub alert_records_persisted_total: Counter<u64>,
    pub alert_records_failed_total: Counter<u64>,
    pub alert_admins_skipped_total: Counter<u64>,

    // Management API
    pub api_requests_total: Counter<u64>,

    // Build info
    pub build_info: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            record_task_total: meter
                .u64_counter("slotwatch_record_task_total")
                .with_description("Requests assigned to a task slot, by outcome")
                .build(),
            record_task_ignored_total: meter
                .u64_counter("slotwatch_record_task_ignored_total")
                .with_description("Requests not recorded, by reason")
                .build(),
            slots_allocated: meter
                .u64_gauge("slotwatch_slots_allocated")
                .with_description("Number of allocated task slots")
                .build(),

            alert_scans_total: meter
                .u64_counter("slotwatch_alert_scans_total")
                .with_description("Completed high activity scans")
                .build(),
            alert_records_persisted_total: meter
                .u64_counter("slotwatch_alert_records_persisted_total")
                .with_description("Alert records written to the history store")
                .build(),
            alert_records_failed_total: meter
                .u64_counter("slotwatch_alert_records_failed_total")
                .with_description("Alert records dropped after a history store failure")
                .build(),
            alert_admins_skipped_total: meter
                .u64_counter("slotwatch_alert_admins_skipped_total")
                .with_description("Qualifying administrators left out of alert records")
                .build(),

            api_requests_total: meter
                .u64_counter("slotwatch_api_requests_total")
                .with_description("Management API requests")
                .build(),

            build_info: meter
                .u64_gauge("slotwatch_build_info")
                .with_description("Build information")
                .build(),
        }
    }

    pub fn set_build_info(&self) {
        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(
                    labels::RUST_VERSION,
                    option_env!("CARGO_PKG_RUST_VERSION").unwrap_or("unknown"),
                ),
            ],
        );
    }

    pub fn record_task(&self, outcome: &RecordOutcome, slots_allocated: usize) {
        self.record_task_total
            .add(1, &[KeyValue::new(labels::OUTCOME, outcome.as_str())]);
        self.slots_allocated.record(slots_allocated as u64, &[]);
    }

    pub fn record_task_ignored(&self, reason: &'static str) {
        self.record_task_ignored_total
            .add(1, &[KeyValue::new(labels::REASON, reason)]);
    }

    pub fn record_alert_scan(&self, persisted: usize, failed: usize, skipped_admins: usize) {
        self.alert_scans_total.add(1, &[]);
        self.alert_records_persisted_total
            .add(persisted as u64, &[]);
        self.alert_records_failed_total.add(failed as u64, &[]);
        self.alert_admins_skipped_total
            .add(skipped_admins as u64, &[]);
    }

    pub fn record_api_request(&self, route: &'static str, status_code: u16) {
        self.api_requests_total.add(
            1,
            &[
                KeyValue::new(labels::ROUTE, route),
                KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
            ],
        );
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("slotwatch");
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}
