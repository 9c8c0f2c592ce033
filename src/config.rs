use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{DEFAULT_TEAM_SIZE, INVITE_TIMEOUT_MINUTES};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jam: JamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Bot token; without one every platform call is only logged
    #[serde(default)]
    pub token: Option<String>,
    /// REST base URL (default: Discord API v10)
    #[serde(default)]
    pub api_base: Option<String>,
    /// Log platform calls instead of performing them
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: None,
            dry_run: false,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; state is kept in memory when unset
    #[serde(default)]
    pub url: Option<String>,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JamConfig {
    /// Team size used until a community configures its own
    #[serde(default = "default_team_size")]
    pub default_team_size: u32,
    /// Lifetime of an invite's acceptance control
    #[serde(default = "default_invite_timeout")]
    pub invite_timeout_minutes: i64,
    /// Name of the categories team channels are created under
    #[serde(default = "default_team_category")]
    pub team_category: String,
    /// Channels per category before a new one is opened
    #[serde(default = "default_category_capacity")]
    pub category_capacity: usize,
    /// Upper bound on a single queued platform call
    #[serde(default = "default_side_effect_timeout")]
    pub side_effect_timeout_secs: u64,
}

fn default_team_size() -> u32 {
    DEFAULT_TEAM_SIZE
}

fn default_invite_timeout() -> i64 {
    INVITE_TIMEOUT_MINUTES
}

fn default_team_category() -> String {
    "Team".to_string()
}

fn default_category_capacity() -> usize {
    48
}

fn default_side_effect_timeout() -> u64 {
    10
}

impl Default for JamConfig {
    fn default() -> Self {
        Self {
            default_team_size: default_team_size(),
            invite_timeout_minutes: default_invite_timeout(),
            team_category: default_team_category(),
            category_capacity: default_category_capacity(),
            side_effect_timeout_secs: default_side_effect_timeout(),
        }
    }
}

impl JamConfig {
    pub fn invite_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.invite_timeout_minutes)
    }

    pub fn side_effect_timeout(&self) -> Duration {
        Duration::from_secs(self.side_effect_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for a daily-rolling log file
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .set_default("jam.default_team_size", DEFAULT_TEAM_SIZE as i64)?
            .set_default("jam.invite_timeout_minutes", INVITE_TIMEOUT_MINUTES)?
            // config/default.toml, then config/<GAMEJAM_ENV>.toml
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(
                    std::env::var("GAMEJAM_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // GAMEJAM_DISCORD__TOKEN, GAMEJAM_DATABASE__URL, ...
            .add_source(
                Environment::with_prefix("GAMEJAM")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Whether platform calls should only be logged
    pub fn is_dry_run(&self) -> bool {
        self.discord.dry_run || self.discord.token.as_deref().map_or(true, str::is_empty)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.jam.default_team_size == 0 {
            errors.push("jam.default_team_size must be at least 1".to_string());
        }

        if self.jam.invite_timeout_minutes <= 0 {
            errors.push("jam.invite_timeout_minutes must be positive".to_string());
        }

        if self.jam.team_category.trim().is_empty() {
            errors.push("jam.team_category must not be empty".to_string());
        }

        if self.jam.category_capacity < 2 {
            errors.push(
                "jam.category_capacity must leave room for a text and a voice channel".to_string(),
            );
        }

        if self.jam.side_effect_timeout_secs == 0 {
            errors.push("jam.side_effect_timeout_secs must be positive".to_string());
        }

        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be positive".to_string());
        }

        if let Some(url) = &self.database.url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                errors.push(format!("database.url is not a PostgreSQL URL: {url}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
