mod loader;
mod types;

pub use loader::{load_from_path, load_from_str};
pub use types::{
    AlertConfig, ApiConfig, Config, HistoryBackend, HistoryConfig, IngestConfig, LoggingConfig,
    PathRule, SlotConfig, TelemetryConfig,
};
