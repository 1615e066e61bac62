//! Casino configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use crate::{db::DatabaseConfig, engine::DEFAULT_TOLERANCE, store::timeouts::DEFAULT_WRITE_TIMEOUT};
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

/// Where the casino keeps its persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local map, lost on exit
    Memory,
    /// JSON state file plus transaction journal
    File,
    /// PostgreSQL tables
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::Invalid {
                var: "CASINO_STORE".to_string(),
                reason: format!("unknown backend '{other}' (expected memory, file or postgres)"),
            }),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Postgres => "postgres",
        };
        write!(f, "{repr}")
    }
}

/// Retry and timeout settings for the ledger's persistence worker
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Delay before the first retry; doubles on every further failure
    pub retry_base: Duration,
    /// Upper bound for the retry delay
    pub retry_max: Duration,
    /// Give up on a batch after this many attempts (`None` retries forever)
    pub max_attempts: Option<u32>,
    /// Bound on a single store write
    pub write_timeout: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            retry_base: Duration::from_millis(50),
            retry_max: Duration::from_millis(5000),
            max_attempts: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Complete casino configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct CasinoConfig {
    /// Persistence backend
    pub backend: StoreBackend,
    /// State file used by the file backend
    pub state_file: PathBuf,
    /// Database configuration used by the postgres backend
    pub database: DatabaseConfig,
    /// Persistence worker settings
    pub persistence: PersistenceConfig,
    /// How often display readers poll the store
    pub reconcile_interval: Duration,
    /// Number of transactions kept in memory
    pub history_limit: usize,
    /// Allowed deviation of a paytable's probability sum from 1
    pub paytable_tolerance: f64,
}

impl CasinoConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `backend_override` - Optional backend override (from CLI args)
    /// * `state_file_override` - Optional state file override (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<CasinoConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but cannot be understood
    pub fn from_env(
        backend_override: Option<StoreBackend>,
        state_file_override: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let backend = match backend_override {
            Some(backend) => backend,
            None => match std::env::var("CASINO_STORE") {
                Ok(value) => value.parse()?,
                Err(_) => StoreBackend::File,
            },
        };

        let state_file = state_file_override
            .or_else(|| std::env::var("CASINO_STATE_FILE").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("pocket_casino.json"));

        let max_attempts: u32 = parse_env_or("PERSIST_MAX_ATTEMPTS", 0);

        let persistence = PersistenceConfig {
            retry_base: Duration::from_millis(parse_env_or("PERSIST_RETRY_BASE_MS", 50)),
            retry_max: Duration::from_millis(parse_env_or("PERSIST_RETRY_MAX_MS", 5000)),
            max_attempts: (max_attempts > 0).then_some(max_attempts),
            write_timeout: Duration::from_millis(parse_env_or("PERSIST_WRITE_TIMEOUT_MS", 5000)),
        };

        let config = CasinoConfig {
            backend,
            state_file,
            database: DatabaseConfig::from_env(),
            persistence,
            reconcile_interval: Duration::from_millis(parse_env_or("RECONCILE_INTERVAL_MS", 250)),
            history_limit: parse_env_or("LEDGER_HISTORY_LIMIT", 500),
            paytable_tolerance: parse_env_or("PAYTABLE_TOLERANCE", DEFAULT_TOLERANCE),
        };

        Ok(config)
    }

    /// Configuration for tests and throwaway sessions: in-memory store, fast retries
    pub fn in_memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            persistence: PersistenceConfig {
                retry_base: Duration::from_millis(5),
                retry_max: Duration::from_millis(50),
                ..PersistenceConfig::default()
            },
            reconcile_interval: Duration::from_millis(25),
            ..Self::default()
        }
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persistence.retry_base.is_zero() {
            return Err(ConfigError::Invalid {
                var: "PERSIST_RETRY_BASE_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.persistence.retry_max < self.persistence.retry_base {
            return Err(ConfigError::Invalid {
                var: "PERSIST_RETRY_MAX_MS".to_string(),
                reason: format!(
                    "Must be at least the base retry delay ({} ms)",
                    self.persistence.retry_base.as_millis()
                ),
            });
        }

        if self.persistence.write_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "PERSIST_WRITE_TIMEOUT_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.reconcile_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "RECONCILE_INTERVAL_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.history_limit == 0 {
            return Err(ConfigError::Invalid {
                var: "LEDGER_HISTORY_LIMIT".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if !self.paytable_tolerance.is_finite()
            || self.paytable_tolerance <= 0.0
            || self.paytable_tolerance >= 0.1
        {
            return Err(ConfigError::Invalid {
                var: "PAYTABLE_TOLERANCE".to_string(),
                reason: "Must be within (0, 0.1)".to_string(),
            });
        }

        if self.backend == StoreBackend::File && self.state_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "CASINO_STATE_FILE".to_string(),
                hint: "Set a path such as ./pocket_casino.json".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for CasinoConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            state_file: PathBuf::from("pocket_casino.json"),
            database: DatabaseConfig::default(),
            persistence: PersistenceConfig::default(),
            reconcile_interval: Duration::from_millis(250),
            history_limit: 500,
            paytable_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Parse an environment variable, falling back to `default` when unset or malformed
pub(crate) fn parse_env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
