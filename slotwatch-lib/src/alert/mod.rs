//! High-activity alerts.
//!
//! The [`AlertScanner`] periodically asks the slot store which users hold at
//! least `threshold` active slots, drops administrators, and appends one
//! [`AlertRecord`] per remaining user to an [`AlertStore`]. Storage failures
//! are logged and dropped; they never reach the slot store or stop the loop.
//!
//! # Configuration
//!
//! ```toml
//! admins = [1]
//!
//! [alert]
//! enabled = true
//! scan_interval_secs = 600
//! window_secs = 600
//! threshold = 5
//!
//! [history]
//! backend = "jsonl"
//! path = "/var/lib/slotwatch/alerts.jsonl"
//! ```

mod admin;
mod history;
mod jsonl;
mod scanner;

pub use admin::{AdminLookup, StaticAdmins};
pub use history::{
    AlertRecord, AlertStore, BatchError, HistoryQuery, MemoryAlertStore, DEFAULT_HISTORY_LIMIT,
};
pub use jsonl::JsonlAlertStore;
pub use scanner::{AlertScanner, ScanReport};
