//! TOML configuration with environment overrides.
//!
//! Precedence: built-in defaults, then the file, then `FANOUT_*` variables.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::core::codec;
use crate::core::publisher::{PublisherConfig, DEFAULT_ADDRESS, DEFAULT_ROUNDS};
use crate::core::subscriber::{SubscriberConfig, SubscriberId};
use crate::transport::{Address, EndpointOptions};

pub const DEFAULT_CONFIG_PATH: &str = "fanout.toml";

pub const ENV_CONFIG: &str = "FANOUT_CONFIG";
pub const ENV_ADDRESS: &str = "FANOUT_ADDRESS";
pub const ENV_ROUNDS: &str = "FANOUT_ROUNDS";
pub const ENV_RECV_TIMEOUT_MS: &str = "FANOUT_RECV_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PublisherSection {
    pub address: String,
    pub topics: Vec<String>,
    pub rounds: usize,
    pub interval_ms: u64,
    /// Subscribers to wait for before the first message; 0 starts at once.
    pub wait_for_peers: usize,
    pub wait_timeout_ms: u64,
    pub peer_queue_capacity: usize,
}

impl Default for PublisherSection {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            topics: vec![
                "Technology".to_string(),
                "Weather".to_string(),
                "Finance".to_string(),
            ],
            rounds: DEFAULT_ROUNDS,
            interval_ms: 1000,
            wait_for_peers: 0,
            wait_timeout_ms: 10_000,
            peer_queue_capacity: EndpointOptions::default().peer_queue_capacity,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SubscriberSection {
    pub receive_timeout_ms: u64,
    /// Unset means five messages per subscribed topic.
    pub expected_messages: Option<usize>,
}

impl Default for SubscriberSection {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 10_000,
            expected_messages: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DemoSubscriber {
    pub name: String,
    pub topics: Vec<String>,
}

impl DemoSubscriber {
    fn new(name: &str, topics: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DemoSection {
    pub subscribers: Vec<DemoSubscriber>,
}

impl Default for DemoSection {
    fn default() -> Self {
        Self {
            subscribers: vec![
                DemoSubscriber::new("C1", &["Technology"]),
                DemoSubscriber::new("C2", &["Technology", "Weather"]),
                DemoSubscriber::new("C3", &["Finance"]),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub publisher: PublisherSection,
    pub subscriber: SubscriberSection,
    pub demo: DemoSection,
}

/// Reads one TOML file. Missing keys take their defaults; no env overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let raw: String = fs::read_to_string(path)?;
    Config::from_toml_str(&raw)
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        Ok(config)
    }

    /// Loads from `path`, else `$FANOUT_CONFIG`, else `fanout.toml` when it
    /// exists, else the defaults. Environment overrides are applied last and
    /// the result is validated.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let env_path = env::var(ENV_CONFIG).ok();
        let effective_path = path.map(|s| s.to_string()).or(env_path);

        let mut config = match effective_path {
            Some(p) => load_config(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH)?,
            None => Config::default(),
        };

        config.apply_overrides_from(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `FANOUT_*` overrides looked up through `lookup`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_ADDRESS) {
            self.publisher.address = v;
        }

        if let Some(v) = lookup(ENV_ROUNDS) {
            self.publisher.rounds = v
                .parse()
                .map_err(|e| ConfigError::Parse(format!("{ENV_ROUNDS}: {e}")))?;
        }

        if let Some(v) = lookup(ENV_RECV_TIMEOUT_MS) {
            self.subscriber.receive_timeout_ms = v
                .parse()
                .map_err(|e| ConfigError::Parse(format!("{ENV_RECV_TIMEOUT_MS}: {e}")))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.publisher
            .address
            .parse::<Address>()
            .map_err(|e| ConfigError::Invalid(format!("publisher.address: {e}")))?;

        if self.publisher.topics.is_empty() {
            return Err(ConfigError::Invalid("publisher.topics is empty".into()));
        }
        if self.publisher.peer_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "publisher.peer_queue_capacity must be positive".into(),
            ));
        }

        let demo_topics = self
            .demo
            .subscribers
            .iter()
            .flat_map(|s| s.topics.iter());
        for topic in self.publisher.topics.iter().chain(demo_topics) {
            codec::validate_topic(topic).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        for sub in &self.demo.subscribers {
            if sub.name.trim().is_empty() {
                return Err(ConfigError::Invalid("demo subscriber without a name".into()));
            }
        }
        Ok(())
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        let section = &self.publisher;
        PublisherConfig {
            address: section.address.clone(),
            topics: section.topics.clone(),
            rounds: section.rounds,
            interval: Duration::from_millis(section.interval_ms),
            endpoint: EndpointOptions {
                peer_queue_capacity: section.peer_queue_capacity,
                ..EndpointOptions::default()
            },
        }
    }

    /// Settings for one subscriber dialing the configured publisher address.
    pub fn subscriber_config(
        &self,
        name: impl Into<SubscriberId>,
        topics: Vec<String>,
    ) -> SubscriberConfig {
        SubscriberConfig {
            expected_messages: self.subscriber.expected_messages,
            receive_timeout: Duration::from_millis(self.subscriber.receive_timeout_ms),
            ..SubscriberConfig::new(name, self.publisher.address.clone(), topics)
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.publisher.wait_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.publisher.address, "tcp://localhost:56565");
        assert_eq!(cfg.publisher.rounds, 5);
        assert_eq!(cfg.demo.subscribers.len(), 3);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [publisher]
            rounds = 2
            topics = ["A", "B"]

            [subscriber]
            expected_messages = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.publisher.rounds, 2);
        assert_eq!(cfg.publisher.interval_ms, 1000);
        assert_eq!(cfg.subscriber.expected_messages, Some(4));
        assert_eq!(cfg.subscriber.receive_timeout_ms, 10_000);
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = Config::default();
        cfg.apply_overrides_from(|key| match key {
            ENV_ADDRESS => Some("inproc://override".to_string()),
            ENV_ROUNDS => Some("7".to_string()),
            ENV_RECV_TIMEOUT_MS => Some("250".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.publisher.address, "inproc://override");
        assert_eq!(cfg.publisher.rounds, 7);
        assert_eq!(cfg.subscriber.receive_timeout_ms, 250);
    }

    #[test]
    fn unparsable_override_is_reported() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_overrides_from(|key| (key == ENV_ROUNDS).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(msg) if msg.starts_with(ENV_ROUNDS)));
    }

    #[test]
    fn validate_rejects_bad_topics_and_addresses() {
        let mut cfg = Config::default();
        cfg.publisher.topics.push("a|b".into());
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.publisher.address = "localhost:56565".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.demo.subscribers[0].topics = vec![String::new()];
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn role_configs_follow_sections() {
        let mut cfg = Config::default();
        cfg.publisher.interval_ms = 5;
        cfg.subscriber.receive_timeout_ms = 300;

        let publisher = cfg.publisher_config();
        assert_eq!(publisher.interval, Duration::from_millis(5));
        assert_eq!(publisher.topics.len(), 3);

        let subscriber = cfg.subscriber_config("C2", vec!["Technology".into(), "Weather".into()]);
        assert_eq!(subscriber.address, cfg.publisher.address);
        assert_eq!(subscriber.receive_timeout, Duration::from_millis(300));
        assert_eq!(subscriber.expected_count(), 10);
    }
}
