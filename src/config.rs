//! Parser configuration from environment variables

use std::env;

/// Interval used when none (or zero) is configured, in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Longest supported window, in seconds (one day)
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Configuration for the query analytics parser
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct QanConfig {
    /// Window length in seconds (0 means `DEFAULT_INTERVAL_SECS`)
    pub interval: u64,

    /// Attach one literal example query to every class
    pub example_queries: bool,

    /// Maximum number of classes per report before folding into LRQ
    pub report_limit: usize,

    /// Identifier stamped on every report
    pub instance_uuid: String,

    /// Collections whose documents are never aggregated
    pub exclude_collections: Vec<String>,

    /// Input channel capacity (profile documents)
    pub input_buffer: usize,

    /// Report channel capacity
    pub report_buffer: usize,

    /// JSONL report destination, stdout when unset
    pub output_path: Option<String>,

    /// How often the runtime logs parser status, in seconds
    pub status_log_secs: u64,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for QanConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL_SECS,
            example_queries: false,
            report_limit: 200,
            instance_uuid: String::new(),
            exclude_collections: vec!["system.profile".to_string()],
            input_buffer: 10_000,
            report_buffer: 1,
            output_path: None,
            status_log_secs: 30,
        }
    }
}

impl QanConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `QAN_INTERVAL_SECS` (default: 60)
    /// - `QAN_EXAMPLE_QUERIES` (default: false)
    /// - `QAN_REPORT_LIMIT` (default: 200)
    /// - `QAN_INSTANCE_UUID` (default: empty)
    /// - `QAN_EXCLUDE_COLLECTIONS` (comma-separated, default: system.profile)
    /// - `QAN_INPUT_BUFFER` (default: 10000)
    /// - `QAN_REPORT_BUFFER` (default: 1)
    /// - `QAN_OUTPUT_PATH` (default: stdout)
    /// - `QAN_STATUS_LOG_SECS` (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            interval: parse_var("QAN_INTERVAL_SECS").unwrap_or(defaults.interval),

            example_queries: env::var("QAN_EXAMPLE_QUERIES")
                .ok()
                .and_then(|s| s.to_lowercase().parse().ok())
                .unwrap_or(defaults.example_queries),

            report_limit: parse_var("QAN_REPORT_LIMIT").unwrap_or(defaults.report_limit),

            instance_uuid: env::var("QAN_INSTANCE_UUID").unwrap_or(defaults.instance_uuid),

            exclude_collections: env::var("QAN_EXCLUDE_COLLECTIONS")
                .map(|s| {
                    s.split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.exclude_collections),

            input_buffer: parse_var("QAN_INPUT_BUFFER").unwrap_or(defaults.input_buffer),

            report_buffer: parse_var("QAN_REPORT_BUFFER").unwrap_or(defaults.report_buffer),

            output_path: env::var("QAN_OUTPUT_PATH").ok().filter(|p| !p.is_empty()),

            status_log_secs: parse_var("QAN_STATUS_LOG_SECS").unwrap_or(defaults.status_log_secs),
        }
    }

    /// Window length actually used by the worker
    pub fn interval_secs(&self) -> u64 {
        if self.interval == 0 {
            DEFAULT_INTERVAL_SECS
        } else {
            self.interval
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval > MAX_INTERVAL_SECS {
            return Err(ConfigError::InvalidValue(format!(
                "QAN_INTERVAL_SECS must be at most {} (got {})",
                MAX_INTERVAL_SECS, self.interval
            )));
        }

        if self.report_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "QAN_REPORT_LIMIT must be at least 1".to_string(),
            ));
        }

        if self.input_buffer == 0 || self.report_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "channel buffers must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
