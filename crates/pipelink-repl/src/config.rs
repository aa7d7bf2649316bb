//! Environment-variable configuration
//!
//! Everything is read once at startup. The pipe name is the only
//! setting the RPC layer itself cares about; its absence disables the
//! service rather than failing the process.

use std::path::PathBuf;

use pipelink_rpc::PIPE_NAME_ENV;

pub const LOG_LEVEL_ENV: &str = "PIPELINK_LOG_LEVEL";
pub const LOG_DIR_ENV: &str = "PIPELINK_LOG_DIR";
pub const LOG_MAX_FILES_ENV: &str = "PIPELINK_LOG_MAX_FILES";
pub const HOST_LOG_FILE_ENV: &str = "PIPELINK_HOST_LOG_FILE";

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_MAX_LOG_FILES: usize = 10;

/// Startup configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Local-IPC channel name; `None` disables the RPC service
    pub pipe_name: Option<String>,
    /// Log filter, `tracing` `EnvFilter` syntax
    pub log_level: String,
    /// Directory for timestamped log files; `None` logs to stderr
    pub log_dir: Option<PathBuf>,
    /// How many log files to keep in `log_dir`
    pub max_log_files: usize,
    /// Path of the host application's own log, surfaced at startup
    pub host_log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipe_name: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_dir: None,
            max_log_files: DEFAULT_MAX_LOG_FILES,
            host_log_file: None,
        }
    }
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary lookup, so tests never
    /// have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        Self {
            pipe_name: lookup(PIPE_NAME_ENV).filter(|name| !name.is_empty()),
            log_level: lookup(LOG_LEVEL_ENV).unwrap_or(defaults.log_level),
            log_dir: lookup(LOG_DIR_ENV).map(PathBuf::from),
            // An unparseable count falls back to the default
            max_log_files: lookup(LOG_MAX_FILES_ENV)
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.max_log_files),
            host_log_file: lookup(HOST_LOG_FILE_ENV),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_empty_environment() {
        let config = Config::from_lookup(|_| None);
        assert!(config.pipe_name.is_none());
        assert_eq!(config.log_level, "info");
        assert!(config.log_dir.is_none());
        assert_eq!(config.max_log_files, 10);
        assert!(config.host_log_file.is_none());
    }

    #[test]
    fn test_all_settings_read() {
        let config = Config::from_lookup(lookup_from(&[
            (PIPE_NAME_ENV, "my-pipe"),
            (LOG_LEVEL_ENV, "debug"),
            (LOG_DIR_ENV, "/var/log/pipelink"),
            (LOG_MAX_FILES_ENV, "3"),
            (HOST_LOG_FILE_ENV, "/var/log/host/app.log"),
        ]));
        assert_eq!(config.pipe_name.as_deref(), Some("my-pipe"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/pipelink")));
        assert_eq!(config.max_log_files, 3);
        assert_eq!(config.host_log_file.as_deref(), Some("/var/log/host/app.log"));
    }

    #[test]
    fn test_empty_pipe_name_counts_as_unset() {
        let config = Config::from_lookup(lookup_from(&[(PIPE_NAME_ENV, "")]));
        assert!(config.pipe_name.is_none());
    }

    #[test]
    fn test_bad_max_files_falls_back_to_default() {
        let config = Config::from_lookup(lookup_from(&[(LOG_MAX_FILES_ENV, "many")]));
        assert_eq!(config.max_log_files, 10);
    }
}
