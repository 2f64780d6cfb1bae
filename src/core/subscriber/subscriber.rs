use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::core::codec::{self, Message};
use crate::core::error::{Error, Result};
use crate::core::filter::SubscriptionFilter;
use crate::core::publisher::{DEFAULT_ADDRESS, DEFAULT_ROUNDS};
use crate::transport::{EndpointOptions, SubEndpoint};

/// Name of a subscriber, used in logs and progress output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub String);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        SubscriberId(s.to_owned())
    }
}

impl From<String> for SubscriberId {
    fn from(s: String) -> Self {
        SubscriberId(s)
    }
}

impl AsRef<str> for SubscriberId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub name: SubscriberId,
    pub address: String,
    pub topics: Vec<String>,
    /// Accepted messages after which `run` returns. Defaults to
    /// `DEFAULT_ROUNDS * topics.len()`.
    pub expected_messages: Option<usize>,
    /// Longest wait for the next accepted message.
    pub receive_timeout: Duration,
    pub endpoint: EndpointOptions,
}

impl SubscriberConfig {
    pub fn new(name: impl Into<SubscriberId>, address: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            topics,
            expected_messages: None,
            receive_timeout: Duration::from_secs(10),
            endpoint: EndpointOptions::default(),
        }
    }

    pub fn expected_count(&self) -> usize {
        self.expected_messages
            .unwrap_or(DEFAULT_ROUNDS * self.topics.len())
    }
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self::new("subscriber", DEFAULT_ADDRESS, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberReport {
    pub name: SubscriberId,
    pub received: usize,
    /// Messages that got past the endpoint hint but not the subscription filter.
    pub dropped: usize,
}

/// Owns one dialing endpoint and consumes the messages it subscribed to.
#[derive(Debug)]
pub struct Subscriber {
    config: SubscriberConfig,
    filter: SubscriptionFilter,
    endpoint: SubEndpoint,
    received: usize,
    dropped: usize,
}

impl Subscriber {
    /// Dials the publisher and registers every configured topic, both in the
    /// subscription filter and as a receive hint on the endpoint.
    ///
    /// # Arguments
    /// * `config` - Name, publisher address, topics and receive limits.
    ///
    /// # Errors
    /// `Connect` when the publisher cannot be reached, `Subscription` for a
    /// topic that could never match (empty or containing `|`).
    pub async fn connect(config: SubscriberConfig) -> Result<Self> {
        let mut endpoint = SubEndpoint::dial_with(&config.address, config.endpoint.clone()).await?;
        let mut filter = SubscriptionFilter::new();
        for topic in &config.topics {
            if filter.add_interest(topic.as_str())? {
                endpoint.set_receive_filter(topic);
            }
        }
        info!(
            target: "fanout::subscriber",
            name = %config.name,
            topics = ?config.topics,
            "subscribed"
        );
        Ok(Self {
            config,
            filter,
            endpoint,
            received: 0,
            dropped: 0,
        })
    }

    /// Connects and runs until the expected count is reached.
    ///
    /// # Arguments
    /// * `config` - Same as for [`Subscriber::connect`].
    /// * `on_message` - Called for each accepted message, see [`Subscriber::run`].
    pub async fn run_with<F>(config: SubscriberConfig, on_message: F) -> Result<SubscriberReport>
    where
        F: FnMut(&SubscriberId, &Message),
    {
        let mut subscriber = Self::connect(config).await?;
        let report = subscriber.run(on_message).await;
        subscriber.close();
        report
    }

    pub fn name(&self) -> &SubscriberId {
        &self.config.name
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    pub fn endpoint(&self) -> &SubEndpoint {
        &self.endpoint
    }

    /// Receives until `expected_count` accepted messages were handed to
    /// `on_message`.
    ///
    /// # Arguments
    /// * `on_message` - Called with the subscriber's name and each accepted
    ///   message, in arrival order.
    ///
    /// # Errors
    /// A `Timeout` or `ConnectionClosed` ends the run; there is no retry.
    pub async fn run<F>(&mut self, mut on_message: F) -> Result<SubscriberReport>
    where
        F: FnMut(&SubscriberId, &Message),
    {
        let expected = self.config.expected_count();
        let mut delivered = 0;
        while delivered < expected {
            let message = self.next_message().await?;
            on_message(&self.config.name, &message);
            delivered += 1;
        }
        Ok(self.report())
    }

    /// Next message accepted by the subscription filter.
    ///
    /// The deadline covers the whole call, so a stream of unwanted messages
    /// cannot keep an idle subscriber alive.
    pub async fn next_message(&mut self) -> Result<Message> {
        let within = self.config.receive_timeout;
        let deadline = Instant::now() + within;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(within));
            }
            let raw = match self.endpoint.receive_with_timeout(remaining).await {
                Ok(raw) => raw,
                Err(Error::Timeout(_)) => return Err(Error::Timeout(within)),
                Err(e) => return Err(e),
            };
            let message = codec::decode(&raw)?;
            if !self.filter.accepts_message(&message) {
                self.dropped += 1;
                debug!(
                    target: "fanout::subscriber",
                    name = %self.config.name,
                    topic = %message.topic,
                    "dropping message outside the subscription"
                );
                continue;
            }
            self.received += 1;
            return Ok(message);
        }
    }

    pub fn report(&self) -> SubscriberReport {
        SubscriberReport {
            name: self.config.name.clone(),
            received: self.received,
            dropped: self.dropped,
        }
    }

    pub fn close(&mut self) {
        self.endpoint.close();
    }
}
