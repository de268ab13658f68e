//! Scheduler cadence configuration.

use super::env_reader::EnvReader;
use crate::domain::errors::ConfigError;
use crate::domain::schedule::trigger::Trigger;
use chrono::{NaiveTime, Weekday};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SchedulerEnvConfig {
    pub weekday: Weekday,
    pub run_time: NaiveTime,
    pub health_check_time: NaiveTime,
    pub poll_interval_secs: u64,
    pub cooldown_secs: u64,
}

impl SchedulerEnvConfig {
    pub fn from_env(env: &EnvReader) -> Result<Self, ConfigError> {
        let config = Self {
            weekday: env.parse_weekday("SCHEDULE_WEEKDAY", "sun")?,
            run_time: env.parse_time("SCHEDULE_TIME", "03:00")?,
            health_check_time: env.parse_time("HEALTH_CHECK_TIME", "12:00")?,
            poll_interval_secs: env.parse("SCHEDULER_POLL_SECONDS", 60)?,
            cooldown_secs: env.parse("SCHEDULER_COOLDOWN_SECONDS", 300)?,
        };
        if config.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SCHEDULER_POLL_SECONDS".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(config)
    }

    pub fn pipeline_trigger(&self) -> Trigger {
        Trigger::Weekly {
            weekday: self.weekday,
            time: self.run_time,
        }
    }

    pub fn health_trigger(&self) -> Trigger {
        Trigger::Daily {
            time: self.health_check_time,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_defaults() {
        let config = SchedulerEnvConfig::from_env(&EnvReader::from_pairs(&[])).unwrap();
        assert_eq!(config.weekday, Weekday::Sun);
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.cooldown_secs, 300);
        assert_eq!(config.pipeline_trigger().to_string(), "every Sun at 03:00 UTC");
        assert_eq!(config.health_trigger().to_string(), "daily at 12:00 UTC");
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let env = EnvReader::from_pairs(&[("SCHEDULER_POLL_SECONDS", "0")]);
        assert!(SchedulerEnvConfig::from_env(&env).is_err());
    }
}
