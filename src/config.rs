//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::channels::ChatId;
use crate::error::ConfigError;

/// Default location of the form database.
pub const DEFAULT_DB_PATH: &str = "./data/intake-bot.db";

/// Service configuration.
#[derive(Debug)]
pub struct BotConfig {
    /// Bot API token.
    pub bot_token: SecretString,
    /// Chat that receives every confirmed submission.
    pub admin_chat_id: ChatId,
    /// libSQL database file holding in-flight forms.
    pub db_path: PathBuf,
    /// Remove the user's own text message before showing the next screen.
    pub delete_user_messages: bool,
    /// Long-poll timeout for getUpdates.
    pub poll_timeout: Duration,
    /// Usernames or numeric ids allowed to use the bot (`*` = everyone).
    pub allowed_users: Vec<String>,
}

impl BotConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let admin_raw = lookup("INTAKE_ADMIN_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("INTAKE_ADMIN_ID".into()))?;
        let admin_chat_id: ChatId =
            admin_raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "INTAKE_ADMIN_ID".into(),
                    message: format!("{e}"),
                })?;

        let db_path = lookup("INTAKE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let delete_user_messages = match lookup("INTAKE_DELETE_USER_MESSAGES") {
            None => true,
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "INTAKE_DELETE_USER_MESSAGES".into(),
                message: format!("expected true/false, got {raw:?}"),
            })?,
        };

        let poll_timeout_secs: u64 = lookup("INTAKE_POLL_TIMEOUT_SECS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(30);

        let allowed_users: Vec<String> = lookup("INTAKE_ALLOWED_USERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            admin_chat_id,
            db_path,
            delete_user_messages,
            poll_timeout: Duration::from_secs(poll_timeout_secs),
            allowed_users,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
