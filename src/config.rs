//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;
use crate::mail::RecencyFilter;

/// Idle delay between poll cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 180;

/// Search window: messages newer than this many days.
pub const DEFAULT_RECENCY_DAYS: u32 = 1;

/// Poll loop configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// The operator's own address. Messages whose sender contains it are skipped.
    pub self_address: String,
    /// How long to idle between cycles.
    pub poll_interval: Duration,
    /// Which mail the search asks for.
    pub recency: RecencyFilter,
    /// How long a message id stays in the seen cache.
    pub seen_retention: Duration,
}

impl PollerConfig {
    /// Build a config with default timings for the given operator address.
    ///
    /// A blank address is rejected: every sender contains the empty string,
    /// so all mail would be treated as self-sent.
    pub fn new(self_address: impl Into<String>) -> Result<Self, ConfigError> {
        let recency = RecencyFilter::days(DEFAULT_RECENCY_DAYS);
        let config = Self {
            self_address: self_address.into().trim().to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            seen_retention: recency.window() * 2,
            recency,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the poll loop relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.self_address.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "MY_EMAIL".to_string(),
                message: "operator address must not be blank".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "AUTODRAFT_POLL_INTERVAL_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        // Shorter than the search window would let evicted ids come back.
        if self.seen_retention < self.recency.window() {
            return Err(ConfigError::InvalidValue {
                key: "AUTODRAFT_SEEN_RETENTION_SECS".to_string(),
                message: format!(
                    "must be at least the recency window ({}s)",
                    self.recency.window().as_secs()
                ),
            });
        }
        Ok(())
    }

    /// Build config from environment variables.
    ///
    /// `MY_EMAIL` is required: without it the self-exclusion rule would be
    /// vacuous, so the loop refuses to start.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let self_address = lookup("MY_EMAIL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("MY_EMAIL".to_string()))?;

        let poll_interval_secs =
            parse_var(&lookup, "AUTODRAFT_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;

        let recency_days = parse_var(&lookup, "AUTODRAFT_RECENCY_DAYS", DEFAULT_RECENCY_DAYS)?;
        if recency_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AUTODRAFT_RECENCY_DAYS".to_string(),
                message: "must be at least one day".to_string(),
            });
        }
        let recency = RecencyFilter::days(recency_days);

        let default_retention = recency.window().as_secs() * 2;
        let retention_secs =
            parse_var(&lookup, "AUTODRAFT_SEEN_RETENTION_SECS", default_retention)?;

        let config = Self {
            self_address,
            poll_interval: Duration::from_secs(poll_interval_secs),
            recency,
            seen_retention: Duration::from_secs(retention_secs),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_operator_address_is_fatal() {
        let err = PollerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "MY_EMAIL"));
    }

    #[test]
    fn blank_operator_address_is_fatal() {
        let err = PollerConfig::from_lookup(lookup(&[("MY_EMAIL", "   ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn defaults_applied() {
        let config = PollerConfig::from_lookup(lookup(&[("MY_EMAIL", "me@me.com")])).unwrap();
        assert_eq!(config.self_address, "me@me.com");
        assert_eq!(config.poll_interval, Duration::from_secs(180));
        assert_eq!(config.recency.query(), "newer_than:1d");
        assert_eq!(config.seen_retention, Duration::from_secs(2 * 86_400));
    }

    #[test]
    fn overrides_parsed() {
        let config = PollerConfig::from_lookup(lookup(&[
            ("MY_EMAIL", "me@me.com"),
            ("AUTODRAFT_POLL_INTERVAL_SECS", "30"),
            ("AUTODRAFT_RECENCY_DAYS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.recency.query(), "newer_than:3d");
        assert_eq!(config.seen_retention, Duration::from_secs(6 * 86_400));
    }

    #[test]
    fn unparsable_interval_rejected() {
        let err = PollerConfig::from_lookup(lookup(&[
            ("MY_EMAIL", "me@me.com"),
            ("AUTODRAFT_POLL_INTERVAL_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "AUTODRAFT_POLL_INTERVAL_SECS"));
    }

    #[test]
    fn zero_interval_rejected() {
        let err = PollerConfig::from_lookup(lookup(&[
            ("MY_EMAIL", "me@me.com"),
            ("AUTODRAFT_POLL_INTERVAL_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "AUTODRAFT_POLL_INTERVAL_SECS"));
    }

    #[test]
    fn new_rejects_blank_operator_address() {
        for blank in ["", "   "] {
            let err = PollerConfig::new(blank).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MY_EMAIL"));
        }
        assert_eq!(PollerConfig::new(" me@me.com ").unwrap().self_address, "me@me.com");
    }

    #[test]
    fn validate_catches_blank_address_set_after_construction() {
        let mut config = PollerConfig::new("me@me.com").unwrap();
        config.self_address = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn retention_shorter_than_window_rejected() {
        let err = PollerConfig::from_lookup(lookup(&[
            ("MY_EMAIL", "me@me.com"),
            ("AUTODRAFT_SEEN_RETENTION_SECS", "60"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
