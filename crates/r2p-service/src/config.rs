//! R2P service configuration.
//!
//! Configuration is loaded from environment variables. The bot token is
//! redacted in Debug output.

use crate::roster::RosterSettings;
use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default Discord REST API base URL.
pub const DEFAULT_DISCORD_API_URL: &str = "https://discord.com/api/v10";

/// Default HTTP ingestion API bind address.
pub const DEFAULT_HTTP_BIND_ADDRESS: &str = "127.0.0.1:8080";

/// Default catalogue file.
pub const DEFAULT_CATALOGUE_PATH: &str = "./data/game_data.json";

/// Default announcement record file.
pub const DEFAULT_ANNOUNCEMENT_PATH: &str = "./data/announcement.json";

/// Default maximum `ready` delay (6 hours).
pub const DEFAULT_MAX_DELAY_SECONDS: u64 = 21_600;

/// Default absolute roster timeout (6 hours).
pub const DEFAULT_ABSOLUTE_TIMEOUT_SECONDS: u64 = 21_600;

/// Default grace for a delayed member offline at their target time (15 minutes).
pub const DEFAULT_ARRIVAL_GRACE_SECONDS: u64 = 900;

/// Default grace for an active member who went offline (5 minutes).
pub const DEFAULT_OFFLINE_GRACE_SECONDS: u64 = 300;

/// Default grace for an active member who left voice (30 minutes).
pub const DEFAULT_VOICE_GRACE_SECONDS: u64 = 1_800;

/// R2P service configuration.
#[derive(Clone)]
pub struct Config {
    /// Discord bot token.
    /// Protected by `SecretString` to prevent accidental logging.
    pub discord_token: SecretString,

    /// Guild (server) the service runs for.
    pub guild_id: u64,

    /// Channel where the announcement is posted.
    pub ready_channel_id: u64,

    /// Role held by every active member.
    pub ready_role_id: u64,

    /// Discord REST API base URL (default: "https://discord.com/api/v10").
    pub discord_api_url: String,

    /// HTTP ingestion API bind address (default: "127.0.0.1:8080").
    pub http_bind_address: String,

    /// Catalogue JSON file.
    pub catalogue_path: PathBuf,

    /// Announcement record JSON file.
    pub announcement_path: PathBuf,

    pub max_delay_seconds: u64,
    pub absolute_timeout_seconds: u64,
    pub arrival_grace_seconds: u64,
    pub offline_grace_seconds: u64,
    pub voice_grace_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("guild_id", &self.guild_id)
            .field("ready_channel_id", &self.ready_channel_id)
            .field("ready_role_id", &self.ready_role_id)
            .field("discord_api_url", &self.discord_api_url)
            .field("http_bind_address", &self.http_bind_address)
            .field("catalogue_path", &self.catalogue_path)
            .field("announcement_path", &self.announcement_path)
            .field("max_delay_seconds", &self.max_delay_seconds)
            .field("absolute_timeout_seconds", &self.absolute_timeout_seconds)
            .field("arrival_grace_seconds", &self.arrival_grace_seconds)
            .field("offline_grace_seconds", &self.offline_grace_seconds)
            .field("voice_grace_seconds", &self.voice_grace_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let discord_token = SecretString::from(required(vars, "R2P_DISCORD_TOKEN")?.to_string());

        let guild_id = parse_id(vars, "R2P_GUILD_ID")?;
        let ready_channel_id = parse_id(vars, "R2P_READY_CHANNEL_ID")?;
        let ready_role_id = parse_id(vars, "R2P_READY_ROLE_ID")?;

        let discord_api_url = vars
            .get("R2P_DISCORD_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_DISCORD_API_URL.to_string());

        let http_bind_address = vars
            .get("R2P_HTTP_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HTTP_BIND_ADDRESS.to_string());

        let catalogue_path = PathBuf::from(
            vars.get("R2P_CATALOGUE_PATH")
                .map_or(DEFAULT_CATALOGUE_PATH, String::as_str),
        );

        let announcement_path = PathBuf::from(
            vars.get("R2P_ANNOUNCEMENT_PATH")
                .map_or(DEFAULT_ANNOUNCEMENT_PATH, String::as_str),
        );

        let max_delay_seconds =
            parse_seconds_var(vars, "R2P_MAX_DELAY_SECONDS", DEFAULT_MAX_DELAY_SECONDS)?;
        let absolute_timeout_seconds = parse_seconds_var(
            vars,
            "R2P_ABSOLUTE_TIMEOUT_SECONDS",
            DEFAULT_ABSOLUTE_TIMEOUT_SECONDS,
        )?;
        let arrival_grace_seconds = parse_seconds_var(
            vars,
            "R2P_ARRIVAL_GRACE_SECONDS",
            DEFAULT_ARRIVAL_GRACE_SECONDS,
        )?;
        let offline_grace_seconds = parse_seconds_var(
            vars,
            "R2P_OFFLINE_GRACE_SECONDS",
            DEFAULT_OFFLINE_GRACE_SECONDS,
        )?;
        let voice_grace_seconds =
            parse_seconds_var(vars, "R2P_VOICE_GRACE_SECONDS", DEFAULT_VOICE_GRACE_SECONDS)?;

        Ok(Config {
            discord_token,
            guild_id,
            ready_channel_id,
            ready_role_id,
            discord_api_url,
            http_bind_address,
            catalogue_path,
            announcement_path,
            max_delay_seconds,
            absolute_timeout_seconds,
            arrival_grace_seconds,
            offline_grace_seconds,
            voice_grace_seconds,
        })
    }

    /// Lifecycle durations for the roster actor.
    #[must_use]
    pub fn roster_settings(&self) -> RosterSettings {
        RosterSettings {
            max_delay: Duration::from_secs(self.max_delay_seconds),
            absolute_timeout: Duration::from_secs(self.absolute_timeout_seconds),
            arrival_grace: Duration::from_secs(self.arrival_grace_seconds),
            offline_grace: Duration::from_secs(self.offline_grace_seconds),
            voice_grace: Duration::from_secs(self.voice_grace_seconds),
        }
    }
}

fn required<'a>(vars: &'a HashMap<String, String>, name: &str) -> Result<&'a str, ConfigError> {
    vars.get(name)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_id(vars: &HashMap<String, String>, name: &str) -> Result<u64, ConfigError> {
    let value = required(vars, name)?;
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("{name}={value}: {e}")))
}

fn parse_seconds_var(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value) = vars.get(name) else {
        return Ok(default);
    };

    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue(format!(
            "{name} must be positive"
        ))),
        Ok(seconds) => Ok(seconds),
        Err(e) => Err(ConfigError::InvalidValue(format!("{name}={value}: {e}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("R2P_DISCORD_TOKEN".to_string(), "bot-token-123".to_string()),
            ("R2P_GUILD_ID".to_string(), "100".to_string()),
            ("R2P_READY_CHANNEL_ID".to_string(), "200".to_string()),
            ("R2P_READY_ROLE_ID".to_string(), "300".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.discord_token.expose_secret(), "bot-token-123");
        assert_eq!(config.guild_id, 100);
        assert_eq!(config.ready_channel_id, 200);
        assert_eq!(config.ready_role_id, 300);
        assert_eq!(config.discord_api_url, DEFAULT_DISCORD_API_URL);
        assert_eq!(config.http_bind_address, DEFAULT_HTTP_BIND_ADDRESS);
        assert_eq!(config.catalogue_path, PathBuf::from(DEFAULT_CATALOGUE_PATH));
        assert_eq!(
            config.announcement_path,
            PathBuf::from(DEFAULT_ANNOUNCEMENT_PATH)
        );
        assert_eq!(config.roster_settings(), RosterSettings::default());
    }

    #[test]
    fn test_from_vars_with_overrides() {
        let mut vars = base_vars();
        vars.insert(
            "R2P_DISCORD_API_URL".to_string(),
            "http://localhost:9999/api/".to_string(),
        );
        vars.insert("R2P_HTTP_BIND_ADDRESS".to_string(), "0.0.0.0:9000".to_string());
        vars.insert("R2P_CATALOGUE_PATH".to_string(), "/tmp/games.json".to_string());
        vars.insert("R2P_OFFLINE_GRACE_SECONDS".to_string(), "60".to_string());
        vars.insert("R2P_MAX_DELAY_SECONDS".to_string(), "3600".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.discord_api_url, "http://localhost:9999/api");
        assert_eq!(config.http_bind_address, "0.0.0.0:9000");
        assert_eq!(config.catalogue_path, PathBuf::from("/tmp/games.json"));

        let settings = config.roster_settings();
        assert_eq!(settings.offline_grace, Duration::from_secs(60));
        assert_eq!(settings.max_delay, Duration::from_secs(3600));
        assert_eq!(settings.voice_grace, Duration::from_secs(1800));
    }

    #[test]
    fn test_missing_token() {
        let mut vars = base_vars();
        vars.remove("R2P_DISCORD_TOKEN");

        let result = Config::from_vars(&vars);
        assert!(matches!(
            result,
            Err(ConfigError::MissingEnvVar(name)) if name == "R2P_DISCORD_TOKEN"
        ));
    }

    #[test]
    fn test_blank_required_value_is_missing() {
        let mut vars = base_vars();
        vars.insert("R2P_GUILD_ID".to_string(), "  ".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_invalid_id() {
        let mut vars = base_vars();
        vars.insert("R2P_READY_ROLE_ID".to_string(), "not-a-number".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_invalid_durations() {
        for value in ["0", "-5", "abc", "1.5"] {
            let mut vars = base_vars();
            vars.insert("R2P_VOICE_GRACE_SECONDS".to_string(), value.to_string());
            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::InvalidValue(_))),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let debug = format!("{config:?}");

        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("bot-token-123"));
    }
}
