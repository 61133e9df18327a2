// Configuration management for the tether CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/tether/config.json
// - Linux: ~/.config/tether/config.json
// - Windows: %APPDATA%\tether\config.json

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether_core::protocol::Framing;
use tether_core::transport::{LinkOptions, TextEncoding, DEFAULT_BUFFER_SIZE};
use tether_core::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Remote endpoint, `host:port` (a `tcp://` prefix is accepted)
    pub address: String,

    /// Receive buffer size in bytes
    pub buffer_size: usize,

    /// Text encoding used on the wire
    pub encoding: TextEncoding,

    /// Retry settings
    pub retry: RetryConfig,

    /// Reply validation for `ask`
    pub framing: FramingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Tries made by `connect`
    pub connect_attempts: u32,

    /// Attempts made by `send` and `ask`
    pub exchange_attempts: u32,

    /// Pause between attempts in milliseconds
    pub cooldown_ms: u64,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramingConfig {
    /// Required reply prefix; empty accepts any
    pub expected_header: String,

    /// Minimum reply length in characters
    pub min_length: usize,

    /// Maximum reply length in characters
    pub max_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7878".to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            encoding: TextEncoding::default(),
            retry: RetryConfig::default(),
            framing: FramingConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            exchange_attempts: 3,
            cooldown_ms: 1000,
            timeout_ms: 5000,
        }
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            expected_header: String::new(),
            min_length: 0,
            max_length: 4096,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("tether");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Load config from `path`, writing defaults there if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value in memory; callers persist with `save`
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "address" => {
                anyhow::ensure!(!value.is_empty(), "Address must not be empty");
                self.address = value.to_string();
            }
            "buffer_size" => {
                let size: usize = value.parse().context("Invalid number")?;
                anyhow::ensure!(size > 0, "Buffer size must be greater than zero");
                self.buffer_size = size;
            }
            "encoding" => {
                self.encoding = value
                    .parse()
                    .with_context(|| format!("Invalid encoding: {}", value))?;
            }
            "connect_attempts" => {
                self.retry.connect_attempts = value.parse().context("Invalid number")?;
            }
            "exchange_attempts" => {
                self.retry.exchange_attempts = value.parse().context("Invalid number")?;
            }
            "cooldown_ms" => {
                self.retry.cooldown_ms = value.parse().context("Invalid number")?;
            }
            "timeout_ms" => {
                let timeout: u64 = value.parse().context("Invalid number")?;
                anyhow::ensure!(timeout > 0, "Timeout must be greater than zero");
                self.retry.timeout_ms = timeout;
            }
            "expected_header" => {
                self.framing.expected_header = value.to_string();
            }
            "min_length" => {
                self.framing.min_length = value.parse().context("Invalid number")?;
            }
            "max_length" => {
                self.framing.max_length = value.parse().context("Invalid number")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "address" => Some(self.address.clone()),
            "buffer_size" => Some(self.buffer_size.to_string()),
            "encoding" => Some(self.encoding.to_string()),
            "connect_attempts" => Some(self.retry.connect_attempts.to_string()),
            "exchange_attempts" => Some(self.retry.exchange_attempts.to_string()),
            "cooldown_ms" => Some(self.retry.cooldown_ms.to_string()),
            "timeout_ms" => Some(self.retry.timeout_ms.to_string()),
            "expected_header" => Some(self.framing.expected_header.clone()),
            "min_length" => Some(self.framing.min_length.to_string()),
            "max_length" => Some(self.framing.max_length.to_string()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let header = if self.framing.expected_header.is_empty() {
            "(any)".to_string()
        } else {
            format!("{:?}", self.framing.expected_header)
        };
        vec![
            ("address".to_string(), self.address.clone()),
            ("buffer_size".to_string(), self.buffer_size.to_string()),
            ("encoding".to_string(), self.encoding.to_string()),
            ("connect_attempts".to_string(), self.retry.connect_attempts.to_string()),
            ("exchange_attempts".to_string(), self.retry.exchange_attempts.to_string()),
            ("cooldown_ms".to_string(), format!("{}ms", self.retry.cooldown_ms)),
            ("timeout_ms".to_string(), format!("{}ms", self.retry.timeout_ms)),
            ("expected_header".to_string(), header),
            ("min_length".to_string(), self.framing.min_length.to_string()),
            ("max_length".to_string(), self.framing.max_length.to_string()),
        ]
    }

    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            buffer_size: self.buffer_size,
            ..LinkOptions::default()
        }
    }

    pub fn connect_policy(&self) -> Result<RetryPolicy> {
        self.policy(self.retry.connect_attempts)
    }

    pub fn exchange_policy(&self) -> Result<RetryPolicy> {
        self.policy(self.retry.exchange_attempts)
    }

    /// Bound on each send and each receive of an `ask`
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.retry.timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.retry.cooldown_ms)
    }

    /// Framing from config, with optional per-command overrides
    pub fn framing(
        &self,
        header: Option<String>,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Result<Framing> {
        Framing::new(
            header.unwrap_or_else(|| self.framing.expected_header.clone()),
            min.unwrap_or(self.framing.min_length),
            max.unwrap_or(self.framing.max_length),
        )
        .context("Invalid reply framing")
    }

    fn policy(&self, attempts: u32) -> Result<RetryPolicy> {
        RetryPolicy::new(
            attempts,
            self.cooldown(),
            self.io_timeout(),
        )
        .context("Invalid retry settings")
    }
}
