use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where room key pairs are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustodyBackend {
    Memory,
    Vault { url: String, token: String, mount: String },
}

/// Key custody configuration
#[derive(Debug, Clone)]
pub struct CustodyConfig {
    pub backend: CustodyBackend,
    pub timeout_ms: u64,
    pub key_bits: usize,
}

/// Settlement watcher configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub poll_interval_ms: u64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub custody: CustodyConfig,
    pub watcher: WatcherConfig,
    pub log_level: String,
    pub log_format: String,
    pub environment: String,
    pub operator_account: String,
    pub audit_log_dir: PathBuf,
}

impl CustodyConfig {
    /// Create custody config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let backend = match env::var("CUSTODY_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => CustodyBackend::Memory,
            "vault" => {
                let url = env::var("VAULT_URL")
                    .map_err(|_| "VAULT_URL environment variable is required for the vault backend")?;
                let token = env::var("VAULT_TOKEN")
                    .map_err(|_| "VAULT_TOKEN environment variable is required for the vault backend")?;
                let mount = env::var("VAULT_MOUNT").unwrap_or_else(|_| "secret".to_string());
                CustodyBackend::Vault { url, token, mount }
            }
            other => {
                return Err(format!(
                    "Invalid CUSTODY_BACKEND: {}. Must be one of: [\"memory\", \"vault\"]",
                    other
                ))
            }
        };

        let timeout_ms = parse_or("CUSTODY_TIMEOUT_MS", env::var("CUSTODY_TIMEOUT_MS").ok(), 2000u64)?;
        let key_bits = parse_or("ROOM_KEY_BITS", env::var("ROOM_KEY_BITS").ok(), 2048usize)?;

        let config = Self {
            backend,
            timeout_ms,
            key_bits,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("CUSTODY_TIMEOUT_MS must be greater than 0".to_string());
        }
        if !(1024..=4096).contains(&self.key_bits) || self.key_bits % 256 != 0 {
            return Err(format!(
                "Invalid ROOM_KEY_BITS: {}. Must be a multiple of 256 between 1024 and 4096",
                self.key_bits
            ));
        }
        Ok(())
    }

    /// Get custody call timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            backend: CustodyBackend::Memory,
            timeout_ms: 2000,
            key_bits: 2048,
        }
    }
}

impl WatcherConfig {
    pub fn from_env() -> Result<Self, String> {
        let poll_interval_ms = parse_or(
            "WATCHER_POLL_INTERVAL_MS",
            env::var("WATCHER_POLL_INTERVAL_MS").ok(),
            1000u64,
        )?;

        if poll_interval_ms == 0 {
            return Err("WATCHER_POLL_INTERVAL_MS must be greater than 0".to_string());
        }

        Ok(Self { poll_interval_ms })
    }

    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let custody = CustodyConfig::from_env()?;
        let watcher = WatcherConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let operator_account = env::var("OPERATOR_ACCOUNT").ok();

        let audit_log_dir = env::var("AUDIT_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./logs"));

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_FORMAT: {}. Must be one of: {:?}",
                log_format, valid_log_formats
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        let environment = environment.to_lowercase();
        if !valid_environments.contains(&environment.as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        let operator_account = match operator_account {
            Some(account) if !account.trim().is_empty() => account.trim().to_string(),
            _ if environment == "production" => {
                return Err("OPERATOR_ACCOUNT environment variable is required in production".to_string())
            }
            _ => "operator".to_string(),
        };

        Ok(Self {
            custody,
            watcher,
            log_level: log_level.to_lowercase(),
            log_format: log_format.to_lowercase(),
            environment,
            operator_account,
            audit_log_dir,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            custody: CustodyConfig::default(),
            watcher: WatcherConfig::default(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            environment: "development".to_string(),
            operator_account: "operator".to_string(),
            audit_log_dir: PathBuf::from("./logs"),
        }
    }
}

/// Parse a numeric setting, falling back to `default` only when it is unset
fn parse_or<T: FromStr>(name: &str, value: Option<String>, default: T) -> Result<T, String> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("Invalid {}: {:?} is not a number", name, raw)),
    }
}
