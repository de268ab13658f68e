//! Typed access to environment variables.
//!
//! Every sub-config reads through an `EnvReader` so tests can supply
//! variables without touching the process environment.

use crate::domain::errors::ConfigError;
use chrono::{NaiveTime, Weekday};
use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct EnvReader {
    lookup: Lookup,
}

impl EnvReader {
    /// Reads the process environment.
    pub fn process() -> Self {
        Self {
            lookup: Box::new(|key| env::var(key).ok()),
        }
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            lookup: Box::new(move |key| map.get(key).cloned()),
        }
    }

    /// Trimmed value; empty strings count as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn path(&self, key: &str, default: &str) -> PathBuf {
        PathBuf::from(self.string(key, default))
    }

    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingVar {
            key: key.to_string(),
        })
    }

    pub fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|e| invalid(key, &raw, e)),
        }
    }

    pub fn parse_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .and_then(|v| v.to_lowercase().parse::<bool>().ok())
            .unwrap_or(default)
    }

    /// `HH:MM`, interpreted as UTC.
    pub fn parse_time(&self, key: &str, default: &str) -> Result<NaiveTime, ConfigError> {
        let raw = self.string(key, default);
        NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|e| invalid(key, &raw, e))
    }

    /// Accepts `sun`, `Sunday`, `SUNDAY`, ...
    pub fn parse_weekday(&self, key: &str, default: &str) -> Result<Weekday, ConfigError> {
        let raw = self.string(key, default);
        raw.parse::<Weekday>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("'{}' is not a weekday", raw),
        })
    }

    /// Comma-separated list with blanks removed.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn invalid(key: &str, raw: &str, err: impl Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("'{}': {}", raw, err),
    }
}
