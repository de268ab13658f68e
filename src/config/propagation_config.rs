//! Trading service endpoint and notification sink.

use super::env_reader::EnvReader;
use crate::domain::errors::ConfigError;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct PropagationEnvConfig {
    pub base_url: String,
    pub update_path: String,
    pub health_path: String,
    pub source: String,
}

impl PropagationEnvConfig {
    pub fn from_env(env: &EnvReader) -> Result<Self, ConfigError> {
        let base_url = env.require("TRADING_BOT_URL")?;
        validate_http_url("TRADING_BOT_URL", &base_url)?;

        Ok(Self {
            base_url,
            update_path: env.string("PROPAGATION_PATH", "/api/update-parameters"),
            health_path: env.string("PROPAGATION_HEALTH_PATH", "/health"),
            source: env.string("PROPAGATION_SOURCE", "weekly_auto_optimization"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NotificationEnvConfig {
    /// No URL means notifications are logged only.
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl NotificationEnvConfig {
    pub fn from_env(env: &EnvReader) -> Result<Self, ConfigError> {
        let webhook_url = env.get("DISCORD_WEBHOOK_URL");
        if let Some(url) = &webhook_url {
            validate_http_url("DISCORD_WEBHOOK_URL", url)?;
        }
        Ok(Self {
            webhook_url,
            timeout_secs: env.parse("NOTIFICATION_TIMEOUT_SECONDS", 10)?,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn validate_http_url(key: &str, raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("'{}': {}", raw, e),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trading_bot_url_required() {
        let err = PropagationEnvConfig::from_env(&EnvReader::from_pairs(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { .. }));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let env = EnvReader::from_pairs(&[("TRADING_BOT_URL", "ftp://bot")]);
        assert!(PropagationEnvConfig::from_env(&env).is_err());
        let env = EnvReader::from_pairs(&[("TRADING_BOT_URL", "not a url")]);
        assert!(PropagationEnvConfig::from_env(&env).is_err());
    }

    #[test]
    fn test_propagation_defaults() {
        let env = EnvReader::from_pairs(&[("TRADING_BOT_URL", "https://bot.example.com")]);
        let config = PropagationEnvConfig::from_env(&env).unwrap();
        assert_eq!(config.update_path, "/api/update-parameters");
        assert_eq!(config.health_path, "/health");
        assert_eq!(config.source, "weekly_auto_optimization");
    }

    #[test]
    fn test_webhook_optional() {
        let config = NotificationEnvConfig::from_env(&EnvReader::from_pairs(&[])).unwrap();
        assert!(config.webhook_url.is_none());
        assert_eq!(config.timeout_secs, 10);
    }
}
