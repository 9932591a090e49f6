#![forbid(unsafe_code)]

use clap::Parser;
use slotwatch_lib::config::load_from_path;
use slotwatch_lib::service;
use slotwatch_lib::telemetry::init_tracing;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Active task slot tracking for API gateways")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "SLOTWATCH_CONFIG",
        default_value = "config/slotwatch.toml"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            let _ = init_tracing("info", false, "warn");
            error!(%err, path = %cli.config.display(), "failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(err) = init_tracing(
        &cfg.logging.level,
        cfg.logging.show_target,
        &cfg.telemetry.otel_log_level,
    ) {
        eprintln!("failed to initialize tracing: {err}");
        std::process::exit(1);
    }

    info!(listen = %cfg.listen, admins = cfg.admins.len(), "configuration loaded");

    if let Err(err) = service::run(Arc::new(cfg)).await {
        error!(%err, "slotwatch exited with error");
        std::process::exit(1);
    }
}
