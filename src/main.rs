use std::fs;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use strum_macros::{Display, EnumString};
use tokio::runtime::{Builder, Runtime};

use crate::charger::Charger;
use crate::charger::registry::Registry;
use crate::config::Config;

mod charger;
mod config;
mod logging;
mod time_util;

const CONFIG_FILE: &str = "ariston_charger.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
enum Command {
    Status,
    BoostOn,
    BoostOff,
}

struct NamedCharger {
    name: String,
    charger: Box<dyn Charger>,
}

fn main() {
    let _logging_handle = match logging::init_logging() {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    let config_file = args.get(1).map(String::as_str).unwrap_or(CONFIG_FILE);
    let command = args.get(2)
        .map(|arg| Command::from_str(arg).map_err(|_| format!("Unknown command '{}', expected status, boost-on or boost-off", arg)))
        .transpose()?;

    let config = fs::read_to_string(config_file)
        .map_err(|e| format!("Unable to read config file {}: {}", config_file, e))?;
    let config: Config = toml::from_str(&config)
        .map_err(|e| format!("Error reading config file {}: {}", config_file, e))?;

    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .enable_io()
        .build()
        .map_err(|e| format!("Failed to build runtime: {}", e))?;

    let registry = Registry::with_defaults();
    let chargers = create_chargers(&rt, &registry, &config)?;
    if chargers.is_empty() {
        warn!("No chargers configured in {}", config_file);
        return Ok(());
    }

    match command {
        Some(command) => rt.block_on(run_command(&chargers, command)),
        None => {
            main_loop(&rt, &chargers, *config.get_poll_interval());
            Ok(())
        }
    }
}

fn create_chargers(rt: &Runtime, registry: &Registry, config: &Config) -> Result<Vec<NamedCharger>, String> {
    let mut chargers = Vec::new();
    for entry in config.get_chargers() {
        info!("Creating {} charger '{}'", entry.get_type(), entry.get_name());
        let charger = rt.block_on(registry.create(entry.get_type(), entry.get_other()))
            .map_err(|e| format!("Failed to create charger '{}': {}", entry.get_name(), e))?;
        chargers.push(NamedCharger {
            name: entry.get_name().to_owned(),
            charger,
        });
    }
    Ok(chargers)
}

async fn run_command(chargers: &[NamedCharger], command: Command) -> Result<(), String> {
    let mut failed = 0;
    for named in chargers {
        let result = match command {
            Command::Status => {
                log_status(named).await;
                continue;
            }
            Command::BoostOn => named.charger.enable(true).await,
            Command::BoostOff => named.charger.enable(false).await,
        };
        match result {
            Ok(()) => info!("{}: {} done", named.name, command),
            Err(e) => {
                error!("{}: {} failed: {}", named.name, command, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(format!("{} of {} chargers failed to {}", failed, chargers.len(), command));
    }
    Ok(())
}

async fn log_status(named: &NamedCharger) {
    match named.charger.status().await {
        Ok(status) => info!("{}: status {} (charging: {})", named.name, status, status.is_charging()),
        Err(e) => error!("{}: failed to read status: {}", named.name, e),
    }
    match named.charger.enabled().await {
        Ok(enabled) => info!("{}: enabled {}", named.name, enabled),
        Err(e) => error!("{}: failed to read enabled state: {}", named.name, e),
    }
}

fn main_loop(rt: &Runtime, chargers: &[NamedCharger], poll_interval: Duration) {
    let should_exit = Arc::new(AtomicBool::new(false));

    {
        let should_exit = should_exit.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!("Received termination signal.");
            should_exit.store(true, Ordering::Relaxed);
        }) {
            warn!("Failed to attach kill handler, stop with SIGKILL: {}", e);
        }
    }

    info!("Polling {} chargers every {}s", chargers.len(), poll_interval.as_secs());
    loop {
        for named in chargers {
            rt.block_on(log_status(named));
        }

        if wait_or_exit(poll_interval, &should_exit) {
            info!("Stopped.");
            return;
        }
    }
}

/// Sleeps for `duration`, returning early with true if we've been asked to exit.
fn wait_or_exit(duration: Duration, should_exit: &AtomicBool) -> bool {
    let start = Instant::now();
    loop {
        if should_exit.load(Ordering::Relaxed) {
            return true;
        }
        let elapsed = start.elapsed();
        if elapsed >= duration {
            return false;
        }
        sleep((duration - elapsed).min(Duration::from_millis(250)));
    }
}
