//! pifan daemon (pifand)
//!
//! Reads the SoC temperature at a fixed interval and drives a PWM fan on a
//! GPIO pin, through pigpiod or the kernel PWM class.
//!
//! # Lifecycle
//! - **Starting**: resolve and validate options, connect the backend
//! - **Running**: sample, compute, actuate until SIGINT/SIGTERM
//! - **Stopping**: fan to 0% and release the backend on every exit path
//!
//! Fatal errors end in one log line naming the error kind and a non-zero
//! exit code (2 configuration, 3 connection, 4 actuation).

mod fan_control;
mod log_file;
mod shutdown;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use fan_control::ControlLoop;
use log_file::RotatingFile;
use pf_core::constants::{defaults, env, paths};
use pf_core::{
    connect_backend, load_config, open_sensor, resolve_config_path, Backend, DaemonConfig,
    TracingSink,
};
use pf_error::PifanError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "pifand")]
#[command(version)]
#[command(about = "Temperature-driven PWM fan control for single-board computers")]
struct Cli {
    /// Options file (defaults to $PIFAN_CONFIG, then /data/options.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overrides $PIFAN_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the options, print them as JSON and exit
    #[arg(long)]
    check_config: bool,

    /// Run a single control iteration, then turn the fan off and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        eprintln!("PANIC at {}: {}", location, panic_info);
        eprintln!("Fan will be turned off while unwinding");
    }));

    let cli = Cli::parse();

    let source = resolve_config_path(cli.config.as_deref());
    let loaded = load_config(&source);

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var(env::LOG_LEVEL).ok())
        .unwrap_or_else(|| defaults::LOG_LEVEL.to_string());
    let log_file = loaded
        .as_ref()
        .ok()
        .and_then(|c| c.log_file.as_deref().map(|p| (p.to_path_buf(), c.log_max_bytes)));

    let log_target = match init_logging(&log_level, log_file.as_ref()) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("FATAL: logging setup failed: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("STARTUP: pifand {} starting", VERSION);
    info!("STARTUP: Logging to {}", log_target);
    info!("STARTUP: Options from {:?}", source.path);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => fatal(&e),
    };
    if source.falls_back_to_defaults() {
        warn!("CONFIG: {:?} not found - using built-in defaults", source.path);
    }
    for warning in config.control.warnings() {
        warn!("CONFIG: {}", warning);
    }

    if cli.check_config {
        match serde_json::to_string_pretty(&config) {
            Ok(json) => println!("{}", json),
            Err(e) => fatal(&PifanError::from(e)),
        }
        return;
    }

    if let Err(e) = run(config, cli.once).await {
        fatal(&e);
    }
    info!("SHUTDOWN: pifand stopped");
}

async fn run(config: DaemonConfig, once: bool) -> pf_error::Result<()> {
    // SAFETY: geteuid has no preconditions
    if config.backend == Backend::Sysfs && unsafe { libc::geteuid() } != 0 {
        warn!("STARTUP: Not running as root - writes under {:?} may fail", config.pwm_chip);
    }

    // Before any hardware access: a stop during connect or the first
    // sample must still reach the loop
    let shutdown_rx = shutdown::install()?;

    let sensor = open_sensor(&config);
    info!("STARTUP: Reading temperature from {:?}", sensor.path());

    let mut control = ControlLoop::start(config.control.clone(), sensor, TracingSink, |_| {
        connect_backend(&config)
    })?
    .with_escalation(config.sensor_escalation());
    if once {
        control = control.with_iteration_limit(1);
    }

    let reason = control.run(shutdown_rx).await?;
    info!("SHUTDOWN: Control loop ended ({:?})", reason);
    Ok(())
}

/// Install the global subscriber
///
/// journald when its socket exists, stdout otherwise; the optional JSON
/// file layer is added to either.
fn init_logging(level: &str, log_file: Option<&(PathBuf, u64)>) -> anyhow::Result<&'static str> {
    let filter = EnvFilter::try_new(level)
        .with_context(|| format!("invalid log filter {:?}", level))?;

    let file_layer = match log_file {
        Some((path, max_bytes)) => {
            let writer = RotatingFile::open(path, *max_bytes)
                .with_context(|| format!("cannot open log file {:?}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(Mutex::new(writer)),
            )
        }
        None => None,
    };

    let journald = if Path::new(paths::JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(layer) => Some(layer),
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
                None
            }
        }
    } else {
        None
    };
    let target = if journald.is_some() { "systemd journal" } else { "stdout" };
    let stdout = journald.is_none().then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_level(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(journald)
        .with(stdout)
        .try_init()
        .context("a global subscriber is already installed")?;

    Ok(target)
}

fn fatal(err: &PifanError) -> ! {
    error!(kind = %err.kind(), "FATAL: {} error: {}", err.kind(), err);
    std::process::exit(err.exit_code());
}
