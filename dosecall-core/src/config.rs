//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/dosecall/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/dosecall/` (~/.config/dosecall/)
//! - Data: `$XDG_DATA_HOME/dosecall/` (~/.local/share/dosecall/)
//! - State/Logs: `$XDG_STATE_HOME/dosecall/` (~/.local/state/dosecall/)

use crate::error::{Error, Result};
use crate::twiml;
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Telephony provider credentials and endpoints
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Public callback URLs handed to the provider
    #[serde(default)]
    pub callbacks: CallbackConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telephony provider configuration
///
/// When credentials are present, webhook processing will send the backup
/// text message and perform live-call redirects; without them, sessions are
/// still reconciled locally.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Account SID
    pub account_sid: Option<String>,

    /// Auth token
    pub auth_token: Option<String>,

    /// Number text messages and calls originate from (E.164)
    pub from_number: Option<String>,

    /// Provider REST API base URL
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Body of the backup text message
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            base_url: default_provider_base_url(),
            timeout_secs: default_provider_timeout(),
            fallback_message: default_fallback_message(),
        }
    }
}

impl ProviderConfig {
    /// Check if the provider is fully configured
    pub fn is_ready(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.account_sid.is_none() {
            return Err(Error::Config(
                "provider.account_sid is required".to_string(),
            ));
        }
        if self.auth_token.is_none() {
            return Err(Error::Config("provider.auth_token is required".to_string()));
        }
        if self.from_number.is_none() {
            return Err(Error::Config(
                "provider.from_number is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_provider_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_fallback_message() -> String {
    twiml::VOICEMAIL_MESSAGE.to_string()
}

/// Publicly reachable webhook URLs, embedded into voice documents so the
/// provider knows where to deliver gather results.
#[derive(Debug, Deserialize, Clone)]
pub struct CallbackConfig {
    /// Base URL of this service (e.g. `https://dosecall.example.com`)
    #[serde(default = "default_callback_base_url")]
    pub base_url: String,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            base_url: default_callback_base_url(),
        }
    }
}

impl CallbackConfig {
    /// URL receiving gathered speech results
    pub fn speech_url(&self) -> String {
        format!("{}/webhook/speech", self.base_url.trim_end_matches('/'))
    }

    /// URL reached when the gather times out
    pub fn no_response_url(&self) -> String {
        format!("{}/webhook/no-response", self.base_url.trim_end_matches('/'))
    }
}

fn default_callback_base_url() -> String {
    "http://localhost:3000".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/dosecall/config.toml` (~/.config/dosecall/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("dosecall").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/dosecall/` (~/.local/share/dosecall/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("dosecall")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/dosecall/` (~/.local/state/dosecall/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("dosecall")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/dosecall/data.db` (~/.local/share/dosecall/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.provider.account_sid.is_none());
        assert!(!config.provider.is_ready());
        assert_eq!(config.provider.base_url, "https://api.twilio.com");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[provider]
account_sid = "AC_example"
auth_token = "secret"
from_number = "+15550001111"

[callbacks]
base_url = "https://dosecall.example.com"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert!(config.provider.is_ready());
        assert_eq!(config.provider.account_sid.as_deref(), Some("AC_example"));
        assert_eq!(
            config.callbacks.speech_url(),
            "https://dosecall.example.com/webhook/speech"
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_provider_validation() {
        let config = ProviderConfig::default();
        assert!(config.validate().is_err());

        let config = ProviderConfig {
            account_sid: Some("AC_example".to_string()),
            auth_token: Some("secret".to_string()),
            from_number: Some("+15550001111".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_ready());
    }

    #[test]
    fn test_callback_urls_strip_trailing_slash() {
        let callbacks = CallbackConfig {
            base_url: "https://dosecall.example.com/".to_string(),
        };
        assert_eq!(
            callbacks.no_response_url(),
            "https://dosecall.example.com/webhook/no-response"
        );
    }
}
