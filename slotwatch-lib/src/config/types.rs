use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address and port the management API listens on
    /// Example: "127.0.0.1:7300"
    pub listen: SocketAddr,
    /// Slot store sizing and matching
    #[serde(default)]
    pub slots: SlotConfig,
    /// High-activity alert scanner
    #[serde(default)]
    pub alert: AlertConfig,
    /// Where alert snapshots are kept
    #[serde(default)]
    pub history: HistoryConfig,
    /// Which requests are recorded
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Management API limits
    #[serde(default)]
    pub api: ApiConfig,
    /// User ids excluded from alert persistence
    /// Default: empty
    #[serde(default)]
    pub admins: Vec<i64>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Slot store configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SlotConfig {
    /// Maximum number of slots across all users
    /// Default: 1000
    #[serde(default = "default_global_capacity")]
    pub global_capacity: usize,
    /// Maximum number of slots a single user may hold
    /// Must not exceed `global_capacity`
    /// Default: 50
    #[serde(default = "default_per_user_capacity")]
    pub per_user_capacity: usize,
    /// Maximum Hamming distance at which two fingerprints are the same task
    /// Range: 0..=64
    /// Default: 5
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: u32,
    /// Window used by stats and by rank queries without an explicit window
    /// Default: 30
    #[serde(default = "default_window_secs")]
    pub default_window_secs: i64,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            global_capacity: default_global_capacity(),
            per_user_capacity: default_per_user_capacity(),
            similarity_threshold: default_similarity_threshold(),
            default_window_secs: default_window_secs(),
        }
    }
}

/// Alert scanner configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AlertConfig {
    /// Run the background scanner
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between two scans
    /// Default: 600
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Trailing window each scan looks at
    /// Default: 600
    #[serde(default = "default_alert_window_secs")]
    pub window_secs: i64,
    /// Minimum active slots for a user to be recorded
    /// Default: 5
    #[serde(default = "default_alert_threshold")]
    pub threshold: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: default_scan_interval_secs(),
            window_secs: default_alert_window_secs(),
            threshold: default_alert_threshold(),
        }
    }
}

/// History store backend
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// Bounded in-process store, lost on restart
    #[default]
    Memory,
    /// Append-only JSON lines file
    Jsonl,
}

/// History store configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: HistoryBackend,
    /// File path, required when backend = "jsonl"
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Records kept by the memory backend before the oldest are dropped
    /// Default: 10000
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { backend: HistoryBackend::default(), path: None, max_records: default_max_records() }
    }
}

/// A request path is eligible when it contains every fragment of a rule
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PathRule {
    pub contains: Vec<String>,
}

impl PathRule {
    fn new(fragments: &[&str]) -> Self {
        Self { contains: fragments.iter().map(|s| s.to_string()).collect() }
    }
}

/// Ingest configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IngestConfig {
    /// Conversational endpoints whose requests are recorded
    /// Default: chat/completions, completions, responses, messages, generateContent
    #[serde(default = "default_path_rules")]
    pub paths: Vec<PathRule>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { paths: default_path_rules() }
    }
}

/// Management API configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ApiConfig {
    /// Largest request body accepted by the record endpoint, in bytes
    /// Default: 4194304 (4 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Upper bound for the rank window parameter
    /// Default: 3600
    #[serde(default = "default_max_window_secs")]
    pub max_window_secs: i64,
    /// Rank entries returned when no limit is given
    /// Default: 50
    #[serde(default = "default_rank_limit")]
    pub default_rank_limit: usize,
    /// Upper bound for the rank limit parameter
    /// Default: 200
    #[serde(default = "default_max_rank_limit")]
    pub max_rank_limit: usize,
    /// Upper bound for the history limit parameter
    /// Default: 1000
    #[serde(default = "default_max_history_limit")]
    pub max_history_limit: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            max_window_secs: default_max_window_secs(),
            default_rank_limit: default_rank_limit(),
            max_rank_limit: default_max_rank_limit(),
            max_history_limit: default_max_history_limit(),
        }
    }
}

/// Logging configuration
/// Controls application-level structured logging (stdout/stderr)
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    /// Can be overridden at runtime via RUST_LOG environment variable
    /// Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Show module path (target) in log messages
    /// Default: false
    #[serde(default)]
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), show_target: false }
    }
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Export Prometheus metrics at `/metrics` on the management listener
    /// Default: false
    #[serde(default)]
    pub metrics_enabled: bool,
    /// OpenTelemetry internal log level
    /// Default: "warn"
    #[serde(default = "default_otel_log_level")]
    pub otel_log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { metrics_enabled: false, otel_log_level: default_otel_log_level() }
    }
}

fn default_true() -> bool {
    true
}

fn default_global_capacity() -> usize {
    1000
}

fn default_per_user_capacity() -> usize {
    50
}

fn default_similarity_threshold() -> u32 {
    5
}

fn default_window_secs() -> i64 {
    30
}

fn default_scan_interval_secs() -> u64 {
    600
}

fn default_alert_window_secs() -> i64 {
    600
}

fn default_alert_threshold() -> usize {
    5
}

fn default_max_records() -> usize {
    10_000
}

fn default_path_rules() -> Vec<PathRule> {
    vec![
        PathRule::new(&["/chat/completions"]),
        PathRule::new(&["/v1/completions"]),
        PathRule::new(&["/v1/responses"]),
        PathRule::new(&["/v1/messages"]),
        PathRule::new(&["/v1beta/models/", "generateContent"]),
    ]
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_max_window_secs() -> i64 {
    3600
}

fn default_rank_limit() -> usize {
    50
}

fn default_max_rank_limit() -> usize {
    200
}

fn default_max_history_limit() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_log_level() -> String {
    "warn".to_string()
}
