//! Configuration types.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::session::UserId;

/// Default backend location (same host as the bot).
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Bot configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot token. `None` runs the CLI transport instead.
    pub bot_token: Option<SecretString>,
    /// Backend base URL without a trailing slash.
    pub api_base_url: String,
    /// Users allowed to run admin commands: Telegram ids, or `local-user`
    /// for the CLI.
    pub admin_ids: HashSet<UserId>,
    /// Telegram allowlist (usernames or numeric ids, `*` for everyone).
    pub allowed_users: Vec<String>,
    /// Wall-clock bound for each backend call.
    pub request_timeout: Duration,
    /// Sessions idle longer than this are pruned.
    pub session_idle_timeout: Duration,
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Directory for rolling log files, if any.
    pub log_dir: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            admin_ids: HashSet::new(),
            allowed_users: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            session_idle_timeout: Duration::from_secs(3600), // 1 hour
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl BotConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = get("BOT_TOKEN").map(SecretString::from);

        let api_base_url = get("API_BASE_URL")
            .unwrap_or(defaults.api_base_url)
            .trim_end_matches('/')
            .to_string();

        let admin_ids = match get("ADMIN_USER_IDS") {
            Some(raw) => parse_admin_ids(&raw)?,
            None => HashSet::new(),
        };

        let allowed_users = get("TELEGRAM_ALLOWED_USERS")
            .map(|raw| split_list(&raw))
            .unwrap_or(defaults.allowed_users);

        let request_timeout = match get("API_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_secs("API_TIMEOUT_SECS", &raw)?),
            None => defaults.request_timeout,
        };

        let session_idle_timeout = match get("SESSION_IDLE_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_secs("SESSION_IDLE_TIMEOUT_SECS", &raw)?),
            None => defaults.session_idle_timeout,
        };

        Ok(Self {
            bot_token,
            api_base_url,
            admin_ids,
            allowed_users,
            request_timeout,
            session_idle_timeout,
            log_level: get("LOG_LEVEL")
                .map(|l| l.to_lowercase())
                .unwrap_or(defaults.log_level),
            log_dir: get("SPL_SHIELD_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_admin_ids(raw: &str) -> Result<HashSet<UserId>, ConfigError> {
    split_list(raw)
        .into_iter()
        .map(|id| {
            if id.contains(char::is_whitespace) {
                Err(ConfigError::InvalidValue {
                    key: "ADMIN_USER_IDS".into(),
                    message: format!("'{id}' is not a user id"),
                })
            } else {
                Ok(UserId::from(id))
            }
        })
        .collect()
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a positive number of seconds, got '{raw}'"),
        }),
        Ok(secs) => Ok(secs),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_empty() {
        let config = BotConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.bot_token.is_none());
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert!(config.admin_ids.is_empty());
        assert_eq!(config.allowed_users, vec!["*"]);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn reads_all_values() {
        let config = BotConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:ABC"),
            ("API_BASE_URL", "https://api.example.com/"),
            ("ADMIN_USER_IDS", "42, 7"),
            ("TELEGRAM_ALLOWED_USERS", "alice,123"),
            ("API_TIMEOUT_SECS", "10"),
            ("SESSION_IDLE_TIMEOUT_SECS", "60"),
            ("LOG_LEVEL", "DEBUG"),
        ]))
        .unwrap();

        assert_eq!(
            config.bot_token.as_ref().unwrap().expose_secret(),
            "123:ABC"
        );
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert!(config.admin_ids.contains(&UserId::from(42i64)));
        assert!(config.admin_ids.contains(&UserId::from(7i64)));
        assert!(!config.admin_ids.contains(&UserId::from(8i64)));
        assert_eq!(config.allowed_users, vec!["alice", "123"]);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.session_idle_timeout, Duration::from_secs(60));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn admin_ids_include_cli_handles() {
        let config =
            BotConfig::from_lookup(lookup(&[("ADMIN_USER_IDS", "42, local-user")])).unwrap();
        assert!(config.admin_ids.contains(&UserId::from(42i64)));
        assert!(config.admin_ids.contains(&UserId::from("local-user")));
    }

    #[test]
    fn rejects_admin_id_with_spaces() {
        let err = BotConfig::from_lookup(lookup(&[("ADMIN_USER_IDS", "42,bob smith")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ADMIN_USER_IDS"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = BotConfig::from_lookup(lookup(&[("API_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(err.to_string().contains("API_TIMEOUT_SECS"));
    }
}
