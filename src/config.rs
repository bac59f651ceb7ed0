//! Relay configuration.
//!
//! Settings come from an optional YAML file and from environment variables,
//! with the environment taking precedence. Everything is validated once into a
//! [`RelayConfig`]; nothing downstream performs fallible lookups.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::breaker::BreakerTarget;
use crate::disposition::DEFAULT_DISABLE_PERIOD_MINUTES;
use crate::error::ConfigError;
use crate::nats::NatsConfig;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// Minimum headroom of the ack deadline over the HTTP timeout
const ACK_WAIT_MARGIN_SECS: u64 = 15;
const DEFAULT_FUNCTION_APP_NAME: &str = "qrelay";
const DEFAULT_CONTROL_STREAM: &str = "RELAY_CONTROL";
const DEFAULT_CONTROL_SUBJECT: &str = "relay.control.disable";

/// Unvalidated settings from one source
///
/// Every field is optional so that sources can be layered with [`RawConfig::merge`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub http_endpoint: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub function_app_name: Option<String>,
    pub function_name: Option<String>,
    pub resource_group_name: Option<String>,
    pub disable_period_minutes: Option<i64>,
    pub nats_url: Option<String>,
    pub stream_name: Option<String>,
    pub subject: Option<String>,
    pub consumer_name: Option<String>,
    pub max_deliver: Option<i64>,
    pub ack_wait_secs: Option<u64>,
    pub batch_size: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub dead_letter_subject: Option<String>,
    pub control_nats_url: Option<String>,
    pub control_stream: Option<String>,
    pub control_subject: Option<String>,
    pub health_port: Option<u16>,
}

impl RawConfig {
    /// Load settings from a YAML file.
    ///
    /// # Errors
    /// Returns error if the file can't be read or contains unknown/invalid fields
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps an environment key to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            http_endpoint: text("HTTP_ENDPOINT"),
            http_timeout_secs: parse_var(&text, "HTTP_TIMEOUT_SECS")?,
            function_app_name: text("FUNCTION_APP_NAME"),
            function_name: text("FUNCTION_NAME"),
            resource_group_name: text("RESOURCE_GROUP_NAME"),
            disable_period_minutes: parse_var(&text, "DISABLE_PERIOD_MINUTES")?,
            nats_url: text("NATS_URL"),
            stream_name: text("NATS_STREAM"),
            subject: text("NATS_SUBJECT"),
            consumer_name: text("NATS_CONSUMER"),
            max_deliver: parse_var(&text, "MAX_DELIVER")?,
            ack_wait_secs: parse_var(&text, "ACK_WAIT_SECS")?,
            batch_size: parse_var(&text, "BATCH_SIZE")?,
            poll_interval_ms: parse_var(&text, "POLL_INTERVAL_MS")?,
            dead_letter_subject: text("DEAD_LETTER_SUBJECT"),
            control_nats_url: text("CONTROL_NATS_URL"),
            control_stream: text("CONTROL_STREAM"),
            control_subject: text("CONTROL_SUBJECT"),
            health_port: parse_var(&text, "HEALTH_PORT")?,
        })
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: RawConfig) -> RawConfig {
        RawConfig {
            http_endpoint: overrides.http_endpoint.or(self.http_endpoint),
            http_timeout_secs: overrides.http_timeout_secs.or(self.http_timeout_secs),
            function_app_name: overrides.function_app_name.or(self.function_app_name),
            function_name: overrides.function_name.or(self.function_name),
            resource_group_name: overrides.resource_group_name.or(self.resource_group_name),
            disable_period_minutes: overrides.disable_period_minutes.or(self.disable_period_minutes),
            nats_url: overrides.nats_url.or(self.nats_url),
            stream_name: overrides.stream_name.or(self.stream_name),
            subject: overrides.subject.or(self.subject),
            consumer_name: overrides.consumer_name.or(self.consumer_name),
            max_deliver: overrides.max_deliver.or(self.max_deliver),
            ack_wait_secs: overrides.ack_wait_secs.or(self.ack_wait_secs),
            batch_size: overrides.batch_size.or(self.batch_size),
            poll_interval_ms: overrides.poll_interval_ms.or(self.poll_interval_ms),
            dead_letter_subject: overrides.dead_letter_subject.or(self.dead_letter_subject),
            control_nats_url: overrides.control_nats_url.or(self.control_nats_url),
            control_stream: overrides.control_stream.or(self.control_stream),
            control_subject: overrides.control_subject.or(self.control_subject),
            health_port: overrides.health_port.or(self.health_port),
        }
    }

    /// Apply defaults and validate.
    pub fn validate(self) -> Result<RelayConfig, ConfigError> {
        let http_endpoint = self.http_endpoint.ok_or(ConfigError::Missing("HttpEndpoint"))?;
        match reqwest::Url::parse(&http_endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::Invalid {
                    key: "HttpEndpoint",
                    value: http_endpoint.clone(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                })
            }
            Err(e) => {
                return Err(ConfigError::Invalid {
                    key: "HttpEndpoint",
                    value: http_endpoint.clone(),
                    reason: e.to_string(),
                })
            }
        }

        let resource_group_name = self
            .resource_group_name
            .ok_or(ConfigError::Missing("ResourceGroupName"))?;

        let disable_period_minutes = match self.disable_period_minutes {
            None => DEFAULT_DISABLE_PERIOD_MINUTES,
            Some(minutes) => u32::try_from(minutes).map_err(|_| ConfigError::Invalid {
                key: "DisablePeriodMinutes",
                value: minutes.to_string(),
                reason: "must be between 0 and 4294967295".to_string(),
            })?,
        };

        let http_timeout_secs = self.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        if http_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "HttpTimeoutSecs",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        // A message must not be redelivered while its HTTP call may still be in flight
        let min_ack_wait_secs = http_timeout_secs.saturating_add(ACK_WAIT_MARGIN_SECS);
        let ack_wait_secs = self.ack_wait_secs.unwrap_or(min_ack_wait_secs);
        if ack_wait_secs < min_ack_wait_secs {
            return Err(ConfigError::Invalid {
                key: "AckWaitSecs",
                value: ack_wait_secs.to_string(),
                reason: format!(
                    "must be at least HttpTimeoutSecs + {} ({})",
                    ACK_WAIT_MARGIN_SECS, min_ack_wait_secs
                ),
            });
        }

        let defaults = NatsConfig::default();
        let nats = NatsConfig {
            url: self.nats_url.unwrap_or(defaults.url),
            stream_name: self.stream_name.unwrap_or(defaults.stream_name),
            subject: self.subject.unwrap_or(defaults.subject),
            consumer_name: self.consumer_name.unwrap_or(defaults.consumer_name),
            max_deliver: self.max_deliver.unwrap_or(defaults.max_deliver),
            ack_wait: Duration::from_secs(ack_wait_secs),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            poll_interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            dead_letter_subject: self
                .dead_letter_subject
                .unwrap_or(defaults.dead_letter_subject),
            max_age: defaults.max_age,
            max_bytes: defaults.max_bytes,
        };
        if nats.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "BatchSize",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let target = BreakerTarget {
            function_app_name: self
                .function_app_name
                .unwrap_or_else(|| DEFAULT_FUNCTION_APP_NAME.to_string()),
            function_name: self
                .function_name
                .unwrap_or_else(|| nats.consumer_name.clone()),
            resource_group_name,
        };

        let control = ControlConfig {
            url: self.control_nats_url.unwrap_or_else(|| nats.url.clone()),
            stream_name: self
                .control_stream
                .unwrap_or_else(|| DEFAULT_CONTROL_STREAM.to_string()),
            subject: self
                .control_subject
                .unwrap_or_else(|| DEFAULT_CONTROL_SUBJECT.to_string()),
        };

        Ok(RelayConfig {
            http_endpoint,
            http_timeout: Duration::from_secs(http_timeout_secs),
            target,
            disable_period_minutes,
            nats,
            control,
            health_port: self.health_port,
        })
    }
}

fn parse_var<T, F>(text: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    text(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Where circuit-break requests are published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlConfig {
    pub url: String,
    pub stream_name: String,
    pub subject: String,
}

/// Validated relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub http_endpoint: String,
    pub http_timeout: Duration,
    pub target: BreakerTarget,
    pub disable_period_minutes: u32,
    pub nats: NatsConfig,
    pub control: ControlConfig,
    pub health_port: Option<u16>,
}

impl RelayConfig {
    /// Load from an optional YAML file plus the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => RawConfig::load_from_file(path)?,
            None => RawConfig::default(),
        };
        file.merge(RawConfig::from_env()?).validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    fn minimal() -> RawConfig {
        RawConfig::from_lookup(lookup(&[
            ("HTTP_ENDPOINT", "http://localhost:8080/ingest"),
            ("RESOURCE_GROUP_NAME", "rg-dev"),
        ]))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = minimal().validate().unwrap();

        assert_eq!(config.disable_period_minutes, 5);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.nats.ack_wait, Duration::from_secs(45));
        assert_eq!(config.target.function_app_name, "qrelay");
        assert_eq!(config.target.function_name, config.nats.consumer_name);
        assert_eq!(config.target.resource_group_name, "rg-dev");
        assert_eq!(config.control.url, config.nats.url);
        assert_eq!(config.control.subject, "relay.control.disable");
        assert_eq!(config.health_port, None);
    }

    #[test]
    fn test_missing_endpoint() {
        let raw = RawConfig::from_lookup(lookup(&[("RESOURCE_GROUP_NAME", "rg")])).unwrap();
        assert!(matches!(raw.validate(), Err(ConfigError::Missing("HttpEndpoint"))));
    }

    #[test]
    fn test_missing_resource_group() {
        let raw = RawConfig::from_lookup(lookup(&[("HTTP_ENDPOINT", "http://x/")])).unwrap();
        assert!(matches!(raw.validate(), Err(ConfigError::Missing("ResourceGroupName"))));
    }

    #[test]
    fn test_blank_values_are_missing() {
        let raw = RawConfig::from_lookup(lookup(&[
            ("HTTP_ENDPOINT", "   "),
            ("RESOURCE_GROUP_NAME", "rg"),
        ]))
        .unwrap();
        assert!(raw.http_endpoint.is_none());
    }

    #[test]
    fn test_invalid_number() {
        let err = RawConfig::from_lookup(lookup(&[("DISABLE_PERIOD_MINUTES", "five")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DISABLE_PERIOD_MINUTES", .. }));
    }

    #[test]
    fn test_negative_cooldown_rejected_zero_allowed() {
        let mut raw = minimal();
        raw.disable_period_minutes = Some(-1);
        assert!(raw.validate().is_err());

        let mut raw = minimal();
        raw.disable_period_minutes = Some(0);
        assert_eq!(raw.validate().unwrap().disable_period_minutes, 0);
    }

    #[test]
    fn test_endpoint_must_be_http() {
        let mut raw = minimal();
        raw.http_endpoint = Some("ftp://example.com/upload".to_string());
        assert!(matches!(raw.validate(), Err(ConfigError::Invalid { key: "HttpEndpoint", .. })));

        let mut raw = minimal();
        raw.http_endpoint = Some("not a url".to_string());
        assert!(raw.validate().is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "http_endpoint: http://file.example/in\nresource_group_name: rg-file\ndisable_period_minutes: 15\nfunction_name: orders"
        )
        .unwrap();

        let from_file = RawConfig::load_from_file(file.path()).unwrap();
        assert_eq!(from_file.disable_period_minutes, Some(15));

        let env = RawConfig::from_lookup(lookup(&[("RESOURCE_GROUP_NAME", "rg-env")])).unwrap();
        let config = from_file.merge(env).validate().unwrap();

        assert_eq!(config.http_endpoint, "http://file.example/in");
        assert_eq!(config.target.resource_group_name, "rg-env");
        assert_eq!(config.target.function_name, "orders");
        assert_eq!(config.disable_period_minutes, 15);
    }

    #[test]
    fn test_unknown_file_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http_endpoint: http://x/\nretries: 3").unwrap();
        assert!(matches!(
            RawConfig::load_from_file(file.path()),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RawConfig::load_from_file("/nonexistent/qrelay.yaml"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_ack_wait_follows_http_timeout() {
        let raw = minimal().merge(RawConfig {
            http_timeout_secs: Some(90),
            ..Default::default()
        });
        let config = raw.validate().unwrap();

        assert_eq!(config.nats.ack_wait, Duration::from_secs(105));
    }

    #[test]
    fn test_ack_wait_shorter_than_http_timeout_rejected() {
        let raw = minimal().merge(RawConfig {
            http_timeout_secs: Some(30),
            ack_wait_secs: Some(30),
            ..Default::default()
        });

        assert!(matches!(
            raw.validate(),
            Err(ConfigError::Invalid { key: "AckWaitSecs", .. })
        ));
    }

    #[test]
    fn test_explicit_ack_wait_with_headroom() {
        let raw = minimal().merge(
            RawConfig::from_lookup(lookup(&[("HTTP_TIMEOUT_SECS", "10"), ("ACK_WAIT_SECS", "120")]))
                .unwrap(),
        );
        let config = raw.validate().unwrap();

        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.nats.ack_wait, Duration::from_secs(120));
    }
}
