use prometheus::Registry;
use std::sync::Arc;

use crate::alert::AlertStore;
use crate::config::ApiConfig;
use crate::ingest::IngestFilter;
use crate::slots::SlotStore;
use crate::telemetry::Metrics;

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct ApiState {
    pub slots: Arc<SlotStore>,
    pub history: Arc<dyn AlertStore>,
    pub ingest: Arc<IngestFilter>,
    pub limits: ApiConfig,
    pub metrics: Option<Arc<Metrics>>,
    pub registry: Option<Registry>,
}

impl ApiState {
    pub fn new(slots: Arc<SlotStore>, history: Arc<dyn AlertStore>, ingest: IngestFilter) -> Self {
        Self {
            slots,
            history,
            ingest: Arc::new(ingest),
            limits: ApiConfig::default(),
            metrics: None,
            registry: None,
        }
    }

    pub fn with_limits(mut self, limits: ApiConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>, registry: Option<Registry>) -> Self {
        self.metrics = metrics;
        self.registry = registry;
        self
    }
}
