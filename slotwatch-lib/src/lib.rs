#![forbid(unsafe_code)]

pub mod alert;
pub mod api;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod service;
pub mod slots;
pub mod telemetry;

pub use alert::{AlertScanner, AlertStore, JsonlAlertStore, MemoryAlertStore, StaticAdmins};
pub use config::{load_from_path, Config};
pub use error::{Result, SlotwatchError};
pub use fingerprint::{distance, Fingerprint, Fingerprinter};
pub use ingest::IngestFilter;
pub use slots::{RecordOutcome, SlotStats, SlotStore, UserActivity, UserId};
