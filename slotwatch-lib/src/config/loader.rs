use std::fs;
use std::path::Path;

use crate::config::{Config, HistoryBackend};
use crate::error::{Result, SlotwatchError};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| SlotwatchError::Config(format!("Failed to read config file: {e}")))?;
    load_from_str(&txt)
}

pub fn load_from_str(txt: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(txt)
        .map_err(|e| SlotwatchError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<()> {
    let slots = &cfg.slots;
    if slots.global_capacity == 0 {
        return Err(SlotwatchError::Config("slots.global_capacity must be > 0".into()));
    }
    if slots.per_user_capacity == 0 {
        return Err(SlotwatchError::Config("slots.per_user_capacity must be > 0".into()));
    }
    if slots.per_user_capacity > slots.global_capacity {
        return Err(SlotwatchError::Config(format!(
            "slots.per_user_capacity ({}) exceeds slots.global_capacity ({})",
            slots.per_user_capacity, slots.global_capacity
        )));
    }
    if slots.similarity_threshold > 64 {
        return Err(SlotwatchError::Config(
            "slots.similarity_threshold must be between 0 and 64".into(),
        ));
    }
    if slots.default_window_secs <= 0 {
        return Err(SlotwatchError::Config("slots.default_window_secs must be > 0".into()));
    }

    if cfg.alert.scan_interval_secs == 0 {
        return Err(SlotwatchError::Config("alert.scan_interval_secs must be > 0".into()));
    }
    if cfg.alert.window_secs <= 0 {
        return Err(SlotwatchError::Config("alert.window_secs must be > 0".into()));
    }

    if cfg.history.backend == HistoryBackend::Jsonl && cfg.history.path.is_none() {
        return Err(SlotwatchError::Config(
            "history.path is required when backend = \"jsonl\"".into(),
        ));
    }

    if cfg.ingest.paths.iter().any(|rule| {
        rule.contains.is_empty() || rule.contains.iter().any(|f| f.trim().is_empty())
    }) {
        return Err(SlotwatchError::Config(
            "ingest.paths rules need at least one non-empty fragment".into(),
        ));
    }

    if cfg.api.max_window_secs <= 0 || cfg.api.max_rank_limit == 0 {
        return Err(SlotwatchError::Config(
            "api.max_window_secs and api.max_rank_limit must be > 0".into(),
        ));
    }

    Ok(())
}
