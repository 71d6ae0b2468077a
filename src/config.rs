//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// SMTP settings for activation mail.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Sender address, also used as the SMTP username.
    pub sender: String,
    pub password: SecretString,
}

/// Telegram transport settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
}

/// Birthday reminder settings.
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// How many days before a birthday subscribers are reminded.
    pub days_before: u32,
    /// How often the reminder sweep runs.
    pub interval: Duration,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            days_before: 7,
            interval: Duration::from_secs(86_400), // daily
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub db_path: PathBuf,
    /// Bind address of the activation HTTP server.
    pub http_addr: String,
    /// Externally reachable base URL used to build activation links.
    pub public_url: String,
    /// Where a successful activation redirects the browser.
    pub redirect_url: String,
    /// Directory gateway base URL; the email is appended to it.
    pub directory_url: String,
    /// Upper bound on concurrently handled inbound updates.
    pub max_workers: usize,
    pub mail: MailConfig,
    /// `None` runs the bot on the local CLI channel.
    pub telegram: Option<TelegramConfig>,
    pub reminders: ReminderConfig,
}

impl BotConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = std::env::var("BIRTHDAY_BOT_DB_PATH")
            .unwrap_or_else(|_| "./data/birthday-bot.db".to_string())
            .into();

        let mail = MailConfig {
            smtp_host: env_or("MAIL_SMTP_HOST", "smtp.gmail.com"),
            smtp_port: env_parse("MAIL_SMTP_PORT", 587)?,
            sender: env_required("MAIL_SENDER")?,
            password: SecretString::from(env_required("MAIL_PASSWORD")?),
        };

        let telegram = match std::env::var("TELEGRAM_BOT_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Some(TelegramConfig {
                bot_token: SecretString::from(token),
                poll_timeout_secs: env_parse("TELEGRAM_POLL_TIMEOUT_SECS", 60)?,
            }),
            _ => None,
        };

        let max_workers: usize = env_parse("BIRTHDAY_BOT_MAX_WORKERS", 16)?;
        if max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BIRTHDAY_BOT_MAX_WORKERS".into(),
                message: "must be at least 1".into(),
            });
        }

        let reminders = ReminderConfig {
            days_before: env_parse("BIRTHDAY_BOT_REMINDER_DAYS", 7)?,
            interval: Duration::from_secs(env_parse(
                "BIRTHDAY_BOT_REMINDER_INTERVAL_SECS",
                86_400,
            )?),
        };

        Ok(Self {
            db_path,
            http_addr: env_or("BIRTHDAY_BOT_HTTP_ADDR", "127.0.0.1:2001"),
            public_url: env_or("BIRTHDAY_BOT_PUBLIC_URL", "http://localhost:2001"),
            redirect_url: env_or("BIRTHDAY_BOT_REDIRECT_URL", "https://t.me/GPMHappyBBot"),
            directory_url: env_or(
                "BIRTHDAY_BOT_DIRECTORY_URL",
                "http://localhost:4242/users/user/",
            ),
            max_workers,
            mail,
            telegram,
            reminders,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_required(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_accepts_padded_numbers() {
        let port: u16 = parse_value("MAIL_SMTP_PORT", " 465 ").unwrap();
        assert_eq!(port, 465);
    }

    #[test]
    fn parse_value_reports_key_on_failure() {
        let err = parse_value::<u16>("MAIL_SMTP_PORT", "smtp").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, message } => {
                assert_eq!(key, "MAIL_SMTP_PORT");
                assert!(message.contains("smtp"));
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn reminder_defaults() {
        let r = ReminderConfig::default();
        assert_eq!(r.days_before, 7);
        assert_eq!(r.interval, Duration::from_secs(86_400));
    }
}
