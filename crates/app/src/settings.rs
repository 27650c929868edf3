//! Settings for the service, read from `settings.toml` and overridden by
//! `BANKROLL__<SECTION>__<KEY>` environment variables.

use config::{Config, ConfigError, Environment, File};
use engine::{AccessPolicy, DEFAULT_SESSION_TTL_HOURS, DEFAULT_TRIAL_DAYS};
use serde::Deserialize;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PURGE_INTERVAL_MINUTES: u64 = 60;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: Database,
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// How often expired sessions are swept. `0` disables the sweep.
    #[serde(default = "default_purge_interval_minutes")]
    pub purge_interval_minutes: u64,
}

impl Server {
    /// Period between session sweeps, or `None` when the sweep is disabled.
    pub fn purge_interval(&self) -> Option<std::time::Duration> {
        match self.purge_interval_minutes {
            0 => None,
            minutes => Some(std::time::Duration::from_secs(minutes.saturating_mul(60))),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_trial_days() -> i64 {
    DEFAULT_TRIAL_DAYS
}

fn default_session_ttl_hours() -> i64 {
    DEFAULT_SESSION_TTL_HOURS
}

fn default_purge_interval_minutes() -> u64 {
    DEFAULT_PURGE_INTERVAL_MINUTES
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub server: Option<Server>,
    #[serde(default)]
    pub access: AccessPolicy,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(
            Config::builder()
                .add_source(File::with_name("settings").required(false))
                .add_source(
                    Environment::with_prefix("BANKROLL")
                        .separator("__")
                        .try_parsing(true),
                )
                .build()?,
        )
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;
    use engine::FailureMode;

    use super::*;

    fn parse(toml: &str) -> Result<Settings, ConfigError> {
        Settings::from_config(
            Config::builder()
                .add_source(File::from_str(toml, FileFormat::Toml))
                .build()?,
        )
    }

    #[test]
    fn empty_file_uses_defaults() {
        let settings = parse("").unwrap();
        assert_eq!(settings.app.level, "info");
        assert!(settings.server.is_none());
        assert_eq!(settings.access, AccessPolicy::FAIL_OPEN);
    }

    #[test]
    fn full_file() {
        let settings = parse(
            r#"
            [app]
            level = "debug"

            [server]
            bind = "0.0.0.0"
            port = 8080
            database = { sqlite = "bankroll.db" }
            trial_days = 14
            session_ttl_hours = 12

            [access]
            missing_profile = "deny"
            "#,
        )
        .unwrap();

        let server = settings.server.unwrap();
        assert_eq!(server.bind.as_deref(), Some("0.0.0.0"));
        assert_eq!(server.port, 8080);
        assert!(matches!(server.database, Database::Sqlite(ref path) if path == "bankroll.db"));
        assert_eq!(server.trial_days, 14);
        assert_eq!(server.session_ttl_hours, 12);
        assert_eq!(server.purge_interval_minutes, DEFAULT_PURGE_INTERVAL_MINUTES);
        assert_eq!(settings.access.missing_profile, FailureMode::Deny);
        assert_eq!(settings.access.lookup_failure, FailureMode::Grant);
    }

    #[test]
    fn memory_database() {
        let settings = parse("[server]\ndatabase = \"memory\"").unwrap();
        let server = settings.server.unwrap();
        assert!(matches!(server.database, Database::Memory));
        assert_eq!(server.port, DEFAULT_PORT);
        assert_eq!(server.trial_days, DEFAULT_TRIAL_DAYS);
    }

    #[test]
    fn purge_interval() {
        let server = |minutes: u64| {
            parse(&format!(
                "[server]\ndatabase = \"memory\"\npurge_interval_minutes = {minutes}"
            ))
            .unwrap()
            .server
            .unwrap()
        };

        assert_eq!(server(0).purge_interval(), None);
        assert_eq!(
            server(60).purge_interval(),
            Some(std::time::Duration::from_secs(3600))
        );
        assert_eq!(
            server(u64::MAX / 2).purge_interval(),
            Some(std::time::Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn unknown_failure_mode_is_rejected() {
        assert!(parse("[access]\nlookup_failure = \"maybe\"").is_err());
    }
}
