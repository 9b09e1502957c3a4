//! Configuration management with validation and defaults

use crate::errors::{ConfigurationError, CrashResult};
use crate::games::clock::DISPLAY_CAP;
use crate::games::types::GameSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    /// Settings row seeded when storage has no active settings
    pub game: GameSettings,
    pub seed: SeedConfig,
    pub monitoring: MonitoringConfig,
}

/// HTTP listener configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Rocksdb,
    Memory,
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    /// How long a unit waits for a row lock held by another unit
    pub lock_timeout_ms: i64,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Rocksdb,
            data_directory: "./DB/crash_data".to_string(),
            write_buffer_size_mb: 64,
            lock_timeout_ms: 2000,
            clear_on_start: false, // Production default: preserve data
        }
    }
}

/// Settlement engine tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sweep_interval_ms: u64,
    pub display_cap: f64,
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 100,
            display_cap: DISPLAY_CAP,
            history_limit: 20,
        }
    }
}

impl EngineConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Demo accounts created at startup when missing
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub users: Vec<SeedUser>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedUser {
    pub username: String,
    pub balance: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    crate::storage::DEFAULT_CURRENCY.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// `EnvFilter` directive used when RUST_LOG is unset
    pub log_filter: String,
    pub enable_metrics: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_filter: "crashline=info,tower_http=info".to_string(),
            enable_metrics: true,
        }
    }
}

impl CrashConfig {
    /// In-memory storage and a fast sweep, for tests
    pub fn testing() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                clear_on_start: true,
                ..Default::default()
            },
            engine: EngineConfig {
                sweep_interval_ms: 10,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_filter: "crashline=debug".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load from a TOML file; absent sections fall back to defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> CrashResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("{}: {}", path.display(), e))
        })?;
        let config: CrashConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.engine.sweep_interval_ms == 0 {
            return Err(invalid("engine.sweep_interval_ms", "must be > 0"));
        }
        if self.engine.display_cap <= 1.0 {
            return Err(invalid("engine.display_cap", "must be > 1.0"));
        }
        if self.engine.history_limit == 0 {
            return Err(invalid("engine.history_limit", "must be > 0"));
        }
        if self.storage.lock_timeout_ms <= 0 {
            return Err(invalid("storage.lock_timeout_ms", "must be > 0"));
        }
        if self.storage.backend == StorageBackend::Rocksdb && self.storage.data_directory.is_empty() {
            return Err(invalid("storage.data_directory", "required for the rocksdb backend"));
        }
        self.game
            .validate()
            .map_err(|reason| invalid("game", &reason))?;
        for user in &self.seed.users {
            if user.username.trim().is_empty() {
                return Err(invalid("seed.users.username", "must not be empty"));
            }
            if user.balance < 0.0 {
                return Err(invalid("seed.users.balance", "must not be negative"));
            }
        }
        Ok(())
    }

    /// True when the configured crash point can never be reached below the display cap
    pub fn crash_point_unreachable(&self) -> bool {
        self.game.max_multiplier > self.engine.display_cap
    }
}

fn invalid(field: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = CrashConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.sweep_interval(), Duration::from_millis(100));
        assert_eq!(config.server.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_testing_config_is_valid() {
        let config = CrashConfig::testing();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_invalid_sweep_interval() {
        let mut config = CrashConfig::default();
        config.engine.sweep_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_game_settings() {
        let mut config = CrashConfig::default();
        config.game.max_multiplier = 5000.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_crash_point_hits_display_cap() {
        // 100.0 equals the display cap, so the sweep still fires at the cap
        let mut config = CrashConfig::default();
        assert!(!config.crash_point_unreachable());
        config.game.max_multiplier = 150.0;
        assert!(config.crash_point_unreachable());
    }

    #[test]
    fn test_partial_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[storage]
backend = "memory"

[game]
max_multiplier = 2.0
min_bet_amount = 10.0
max_bet_amount = 500.0
multiplier_speed = 0.5
is_active = true

[[seed.users]]
username = "demo"
balance = 1000.0
"#
        )
        .unwrap();

        let config = CrashConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.game.max_multiplier, 2.0);
        assert_eq!(config.seed.users.len(), 1);
        assert_eq!(config.seed.users[0].currency, "IDR");
        assert_eq!(config.engine.sweep_interval_ms, 100);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = CrashConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("Configuration error"));
    }
}
