//! Configuration management
//!
//! Manages storage location, verification API settings, schedule defaults,
//! server binding and lecturer authentication.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::schedule::BufferDefaults;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where attendance data is kept
    #[serde(default)]
    pub storage: StorageConfig,
    /// Remote face verification settings
    #[serde(default)]
    pub verification: VerificationConfig,
    /// Check-in window defaults and reporting thresholds
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// HTTP server binding
    #[serde(default)]
    pub server: ServerConfig,
    /// Lecturer authentication settings
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory override (defaults to the platform data dir)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Gemini model used for the comparison
    #[serde(default = "default_model")]
    pub model: String,
    /// REST endpoint root
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Seconds to wait for a verdict before giving up
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Accept check-ins when the reference image or the API is unavailable
    #[serde(default)]
    pub demo_mode: bool,
}

fn default_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            demo_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes before start when check-in opens, for courses without their own
    #[serde(default = "default_early_buffer")]
    pub default_early_buffer: u32,
    /// Minutes after start before a check-in counts as late
    #[serde(default = "default_late_buffer")]
    pub default_late_buffer: u32,
    /// Attendance rate (percent) below which a student is flagged
    #[serde(default = "default_risk_threshold")]
    pub risk_threshold: f64,
}

fn default_early_buffer() -> u32 {
    15
}

fn default_late_buffer() -> u32 {
    10
}

fn default_risk_threshold() -> f64 {
    70.0
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_early_buffer: default_early_buffer(),
            default_late_buffer: default_late_buffer(),
            risk_threshold: default_risk_threshold(),
        }
    }
}

impl ScheduleConfig {
    pub fn buffers(&self) -> BufferDefaults {
        BufferDefaults {
            early: self.default_early_buffer,
            late: self.default_late_buffer,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWT secret key (auto-generated if not set)
    pub jwt_secret: Option<String>,
    /// `salt$hash` from `auth::hash_password`, both hex; login is disabled while unset
    pub lecturer_password_hash: Option<String>,
    /// Access token expiration (minutes)
    #[serde(default = "default_token_expiry")]
    pub access_token_expiry_minutes: i64,
}

fn default_token_expiry() -> i64 {
    60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            lecturer_password_hash: None,
            access_token_expiry_minutes: default_token_expiry(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, writing defaults on first use
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from an explicit path, writing defaults if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Directory holding the JSON collections
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => data_dir(),
        }
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "attendify", "attendify")
        .context("Failed to get project directories")
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Show current configuration
pub fn show_config(config: &Config, path: &Path) -> Result<()> {
    println!("Attendify configuration");
    println!("  config file:       {}", path.display());
    println!("  data dir:          {}", config.data_dir()?.display());
    println!();
    println!("  verification model {}", config.verification.model);
    println!("  verification url   {}", config.verification.base_url);
    println!("  timeout            {}s", config.verification.timeout_secs);
    println!("  demo mode          {}", if config.verification.demo_mode { "on" } else { "off" });
    println!(
        "  api key            {}",
        if crate::security::has_api_key() { "configured" } else { "missing" }
    );
    println!();
    println!("  early buffer       {} min", config.schedule.default_early_buffer);
    println!("  late buffer        {} min", config.schedule.default_late_buffer);
    println!("  risk threshold     {}%", config.schedule.risk_threshold);
    println!();
    println!("  server             {}:{}", config.server.host, config.server.port);
    println!(
        "  lecturer login     {}",
        if config.auth.lecturer_password_hash.is_some() { "enabled" } else { "disabled (set a password)" }
    );
    Ok(())
}
