use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub finalize: FinalizeConfig,
    #[serde(default)]
    pub stub: StubConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote scoring service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the service, e.g. "http://127.0.0.1:7010/api/v1"
    pub base_url: String,
    /// Per-request timeout in seconds (default: 15)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Retry attempts for transient failures (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// First backoff delay in milliseconds (default: 500)
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling in milliseconds (default: 10000)
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
}

fn default_base_url() -> String {
    format!("http://127.0.0.1:{}/api/v1", default_stub_port())
}

fn default_timeout() -> u64 {
    15
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_base_delay() -> u64 {
    500
}

fn default_retry_max_delay() -> u64 {
    10_000 // 10 seconds
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding persisted wizard state and logs
    pub state: String,
}

/// Terminal step of the wizard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeConfig {
    /// Minimum time the loading state stays visible before redirecting (default: 1500)
    #[serde(default = "default_min_loading")]
    pub min_loading_ms: u64,
    /// Base of the per-record detail view; the record id is appended as the last segment
    #[serde(default = "default_detail_base")]
    pub detail_base: String,
}

fn default_min_loading() -> u64 {
    1500
}

fn default_detail_base() -> String {
    "/recommendations".to_string()
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            min_loading_ms: default_min_loading(),
            detail_base: default_detail_base(),
        }
    }
}

/// Local stub of the scoring service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StubConfig {
    #[serde(default = "default_stub_port")]
    pub port: u16,
}

fn default_stub_port() -> u16 {
    7010
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            port: default_stub_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to log to file in interactive mode (false = stderr for debugging)
    #[serde(default = "default_log_to_file")]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_to_file() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: default_log_to_file(),
        }
    }
}

impl Config {
    /// Path to the project config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".scholar-wizard/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so the wizard works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // Project config in .scholar-wizard/
        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        // User config in ~/.config/scholar-wizard/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("scholar-wizard").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with SCHOLAR_WIZARD_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("SCHOLAR_WIZARD")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to .scholar-wizard/config.toml
    pub fn save(&self) -> Result<()> {
        let config_path = Self::project_config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(&config_path, toml_str).context("Failed to write config file")?;

        Ok(())
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.state);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            paths: PathsConfig {
                state: ".scholar-wizard".to_string(), // Relative to cwd
            },
            finalize: FinalizeConfig::default(),
            stub: StubConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
