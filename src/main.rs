// src/main.rs

//! Binary entry point. One executable serves both roles of the fabric:
//! started plain it runs the nexus, started with `--minion` it runs a
//! worker agent.

use anyhow::Result;
use hivelink::config::Config;
use hivelink::core::state::LogReloadHandle;
use hivelink::server;
use std::env;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|arg| arg == "--version") {
        println!("HiveLink version {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    for flag in ["--config", "--port"] {
        if args.last().map(String::as_str) == Some(flag) {
            eprintln!("{flag} requires a value");
            std::process::exit(1);
        }
    }

    match args.first().map(String::as_str) {
        Some("--minion") => run_minion(args.get(1).map(String::as_str)).await,
        _ => run_nexus(&args).await,
    }
}

/// Worker-agent mode. Logging here is plain, with the connection-lifecycle
/// modules verbose by default so a misbehaving agent explains itself.
async fn run_minion(config_path: Option<&str>) -> Result<()> {
    let Some(config_path) = config_path else {
        eprintln!("Usage: hivelink --minion /path/to/minion.toml");
        std::process::exit(1);
    };

    let directives = env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,hivelink::core::minion=debug".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(directives)
        .compact()
        .with_ansi(true)
        .init();

    if let Err(e) = hivelink::minion::run(config_path).await {
        error!("Minion runtime error: {}", e);
        return Err(e);
    }
    Ok(())
}

/// Nexus mode. The log filter sits behind a reload layer whose handle
/// travels into the server state, so operators can change the level on a
/// running coordinator.
async fn run_nexus(args: &[String]) -> Result<()> {
    let config_path = flag_value(args, "--config").unwrap_or("config.toml");
    let mut config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    if let Some(port) = flag_value(args, "--port") {
        match port.parse::<u16>() {
            Ok(port) => config.port = port,
            Err(_) => {
                eprintln!("Invalid port number: {port}");
                std::process::exit(1);
            }
        }
    }

    let log_reload_handle = init_nexus_logging(&config);

    if let Err(e) = server::run(config, log_reload_handle).await {
        error!("Nexus runtime error: {}", e);
        return Err(e);
    }
    Ok(())
}

/// Installs the nexus subscriber: a reloadable `EnvFilter` (`RUST_LOG`
/// wins over the configured level) under a compact fmt layer. The returned
/// handle is what `ServerState::set_log_level` swaps at runtime.
fn init_nexus_logging(config: &Config) -> LogReloadHandle {
    let directives = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, handle) = reload::Layer::new(EnvFilter::new(directives));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();
    Arc::new(handle)
}

/// The value following `flag`, if both are present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|pair| pair[0] == flag)
        .map(|pair| pair[1].as_str())
}
