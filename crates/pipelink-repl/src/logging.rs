//! Logging setup
//!
//! Default sink is stderr. When a log directory is configured, output
//! goes to a timestamped file instead and older files are pruned so at
//! most `max_log_files` remain. `RUST_LOG` overrides the configured
//! filter when set.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "pipelink_";
const LOG_FILE_SUFFIX: &str = ".log";

/// Installs the global subscriber. Call once, before any other work.
pub fn init(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match &config.log_dir {
        Some(dir) => {
            let path = prepare_log_file(dir, config.max_log_files)?;
            let file = fs::File::create(&path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
            info!(path = %path.display(), "logging to file");
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    if let Some(host_log) = &config.host_log_file {
        info!("the host application log is at {host_log:?}");
    }
    Ok(())
}

/// Picks the next timestamped log file path, pruning old files first so
/// the directory never holds more than `max_log_files` logs.
fn prepare_log_file(dir: &Path, max_log_files: usize) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    prune_old_logs(dir, max_log_files)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    Ok(dir.join(format!("{LOG_FILE_PREFIX}{timestamp}{LOG_FILE_SUFFIX}")))
}

/// Deletes the oldest logs so that after one more file is created, at
/// most `max_log_files` remain. Timestamped names sort chronologically,
/// so lexicographic order is age order.
fn prune_old_logs(dir: &Path, max_log_files: usize) -> anyhow::Result<()> {
    let mut logs: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read log directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| {
                    name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_SUFFIX)
                })
        })
        .collect();
    logs.sort();

    if logs.len() >= max_log_files {
        let excess = logs.len() - max_log_files + 1;
        for stale in logs.into_iter().take(excess) {
            // A file already gone or held open elsewhere is not worth
            // failing startup over
            let _ = fs::remove_file(stale);
        }
    }
    Ok(())
}
