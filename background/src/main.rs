//! Long-lived background context.
//!
//! Serves newline-delimited JSON requests from stdin and writes one JSON response per line
//! to stdout. Logs go to stderr.

use clipshelf_core::types::{Config, ServiceConfig};
use clipshelf_core::{ClipShelf, ContextKind, DatabaseHub, OpenOptions, RequestRouter};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod worker;

/// Upper bound on how long a due sweep may wait for the worker to notice it.
const MAX_MAINTENANCE_TICK: Duration = Duration::from_secs(60);

/// Returns the data directory.
///
/// Uses `CLIPSHELF_DATA_DIR` if set, otherwise `~/.clipshelf`.
fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CLIPSHELF_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home).join(".clipshelf");
    }

    // Fallback to current directory
    PathBuf::from(".clipshelf")
}

fn main() -> ExitCode {
    let base_path = data_dir();
    let (service, load_error) = match ServiceConfig::load(&ServiceConfig::path(&base_path)) {
        Ok(service) => (service, None),
        Err(e) => (ServiceConfig::default(), Some(e)),
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(service.log_level.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    if let Some(e) = load_error {
        warn!(error = %e, "failed to load service config; using defaults");
    }
    for problem in service.validate() {
        warn!(problem = %problem, "invalid service config value replaced by default");
    }
    let config = Config {
        base_path,
        service: service.with_defaults_for_invalid(),
    };

    info!(data_dir = %config.base_path.display(), "starting clipshelf background");

    let hub = DatabaseHub::new(
        config.db_path(),
        OpenOptions::from(&config.service.coordination),
    );
    let shelf = match ClipShelf::open(&hub, &config, ContextKind::Background) {
        Ok(shelf) => shelf,
        Err(e) => {
            error!(error = %e, "failed to open shelf");
            return ExitCode::FAILURE;
        }
    };

    let tick = config.service.maintenance.interval().min(MAX_MAINTENANCE_TICK);
    let worker = worker::start(RequestRouter::new(shelf), tick);

    let stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    for line in stdin.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "failed to read request");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let Some(response) = worker.request(line) else {
            error!("worker stopped unexpectedly");
            return ExitCode::FAILURE;
        };

        let written = serde_json::to_writer(&mut stdout, &response)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(stdout))
            .and_then(|()| stdout.flush());
        if let Err(e) = written {
            error!(error = %e, "failed to write response");
            break;
        }
    }

    worker.shutdown();
    info!("clipshelf background stopped");
    ExitCode::SUCCESS
}
