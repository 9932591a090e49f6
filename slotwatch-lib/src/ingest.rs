//! Which requests reach the slot store, and with what text.
//!
//! Only conversational endpoints are recorded. The raw request body is the
//! fingerprint input; when it was not captured the requested model name
//! stands in for it.

use std::borrow::Cow;

use crate::config::{IngestConfig, PathRule};
use crate::slots::{RecordOutcome, SlotStore, UserId};

/// One request as seen by the gateway.
#[derive(Debug, Clone, Copy)]
pub struct TaskRequest<'a> {
    pub user_id: UserId,
    pub username: &'a str,
    pub path: &'a str,
    pub body: Option<&'a [u8]>,
    pub model: &'a str,
}

/// What happened to a request offered to the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestDecision {
    Recorded(RecordOutcome),
    /// User id was zero or negative
    InvalidUser,
    /// Path is not a conversational endpoint
    IneligiblePath,
}

impl IngestDecision {
    pub fn is_recorded(&self) -> bool {
        matches!(self, IngestDecision::Recorded(_))
    }
}

#[derive(Debug, Clone)]
pub struct IngestFilter {
    rules: Vec<PathRule>,
}

impl IngestFilter {
    pub fn new(rules: Vec<PathRule>) -> Self {
        Self { rules }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.paths.clone())
    }

    /// True when `path` contains every fragment of at least one rule.
    pub fn is_eligible(&self, path: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.contains.iter().all(|f| path.contains(f.as_str())))
    }

    /// Fingerprint input for a request: the body, or the model name when the
    /// body is missing or empty.
    pub fn task_text<'a>(body: Option<&'a [u8]>, model: &'a str) -> Cow<'a, str> {
        match body {
            Some(bytes) if !bytes.is_empty() => String::from_utf8_lossy(bytes),
            _ => Cow::Borrowed(model),
        }
    }

    pub fn record(&self, store: &SlotStore, request: &TaskRequest<'_>) -> IngestDecision {
        if request.user_id <= 0 {
            return IngestDecision::InvalidUser;
        }
        if !self.is_eligible(request.path) {
            return IngestDecision::IneligiblePath;
        }

        let text = Self::task_text(request.body, request.model);
        IngestDecision::Recorded(store.record_task(request.user_id, request.username, &text))
    }
}

impl Default for IngestFilter {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}
