//! Configuration — loaded once from the environment at startup.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Application configuration.
///
/// Built once in `main` before anything starts serving; a missing required
/// value is a fatal startup error.
#[derive(Clone)]
pub struct AppConfig {
    /// Telegram Bot API token.
    pub telegram_token: SecretString,
    /// Google Sheets spreadsheet id receiving submissions.
    pub sheets_id: String,
    /// OAuth bearer token for the Sheets API.
    pub sheets_token: SecretString,
    /// Path of the local record store database.
    pub db_path: String,
    /// Operator user ids allowed to broadcast.
    pub admin_ids: Vec<String>,
    /// Minimum delay between consecutive broadcast sends.
    pub broadcast_delay: Duration,
}

impl AppConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let telegram_token = require("FORMBOT_TELEGRAM_TOKEN", "Telegram bot token from @BotFather")?;
        let sheets_id = require("FORMBOT_SHEETS_ID", "spreadsheet id from the sheet URL")?;
        let sheets_token = require(
            "FORMBOT_SHEETS_TOKEN",
            "OAuth access token with spreadsheets scope",
        )?;

        let db_path =
            std::env::var("FORMBOT_DB_PATH").unwrap_or_else(|_| "./data/formbot.db".to_string());

        let admin_ids: Vec<String> = std::env::var("FORMBOT_ADMIN_IDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let broadcast_delay_ms: u64 = match std::env::var("FORMBOT_BROADCAST_DELAY_MS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "FORMBOT_BROADCAST_DELAY_MS".into(),
                message: format!("expected integer milliseconds, got {raw:?}"),
            })?,
            Err(_) => 35,
        };

        Ok(Self {
            telegram_token: SecretString::from(telegram_token),
            sheets_id,
            sheets_token: SecretString::from(sheets_token),
            db_path,
            admin_ids,
            broadcast_delay: Duration::from_millis(broadcast_delay_ms),
        })
    }

    /// Check whether a user id is on the operator allow-list.
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_ids.iter().any(|id| id == user_id)
    }
}

fn require(key: &str, hint: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingRequired {
            key: key.into(),
            hint: hint.into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_admins(admins: &[&str]) -> AppConfig {
        AppConfig {
            telegram_token: SecretString::from("token"),
            sheets_id: "sheet".into(),
            sheets_token: SecretString::from("bearer"),
            db_path: ":memory:".into(),
            admin_ids: admins.iter().map(|s| s.to_string()).collect(),
            broadcast_delay: Duration::from_millis(35),
        }
    }

    #[test]
    fn admin_check_exact_match() {
        let config = config_with_admins(&["100", "200"]);
        assert!(config.is_admin("100"));
        assert!(config.is_admin("200"));
        assert!(!config.is_admin("300"));
        assert!(!config.is_admin("10"));
    }

    #[test]
    fn admin_check_empty_list_denies_all() {
        let config = config_with_admins(&[]);
        assert!(!config.is_admin("100"));
        assert!(!config.is_admin(""));
    }
}
