//! Shore-side driftlink server: reads a config file, opens the bonded
//! primary/backup UDP links toward the boat client, and runs the
//! reliability + bonding loop until interrupted.

use std::env;
use std::fs;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use driftlink_bonding::runtime::RoleRuntime;
use driftlink_bonding::stdio_host::StdioHost;
use driftlink_transport::config::DriftlinkConfig;

fn usage() -> &'static str {
    "usage: driftlink-server --config <path.toml>\n\
     env: DRIFTLINK_CONFIG can supply the path instead of --config"
}

fn parse_config_path(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            return iter.next().cloned();
        }
        if let Some(value) = arg.strip_prefix("--config=") {
            return Some(value.to_string());
        }
    }
    env::var("DRIFTLINK_CONFIG").ok()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", usage());
        return ExitCode::SUCCESS;
    }

    let Some(config_path) = parse_config_path(&args) else {
        eprintln!("{}", usage());
        return ExitCode::FAILURE;
    };

    let text = match fs::read_to_string(&config_path) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("failed to read config {config_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = match DriftlinkConfig::from_toml(&text) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("invalid config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let host = Box::new(StdioHost::new());
    let mut runtime = match RoleRuntime::new(&config, host) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        handler_flag.store(false, Ordering::Relaxed);
    }) {
        tracing::error!("failed to install signal handler: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!("driftlink-server running, active link: {:?}", runtime.active_link());
    runtime.run(running);
    tracing::info!("driftlink-server shut down");
    ExitCode::SUCCESS
}
