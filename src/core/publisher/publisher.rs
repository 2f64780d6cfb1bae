use std::time::Duration;

use tracing::{debug, info};

use crate::core::codec;
use crate::core::error::Result;
use crate::transport::{Broadcast, EndpointOptions, PubEndpoint};

/// Rounds the reference scenario publishes.
pub const DEFAULT_ROUNDS: usize = 5;
pub const DEFAULT_ADDRESS: &str = "tcp://localhost:56565";

/// Everything a publisher needs; nothing is read from globals.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub address: String,
    /// Published in this order, once per round.
    pub topics: Vec<String>,
    pub rounds: usize,
    /// Pause before every message.
    pub interval: Duration,
    pub endpoint: EndpointOptions,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            topics: vec![
                "Technology".to_string(),
                "Weather".to_string(),
                "Finance".to_string(),
            ],
            rounds: DEFAULT_ROUNDS,
            interval: Duration::from_secs(1),
            endpoint: EndpointOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub rounds: usize,
    pub messages_sent: usize,
    /// Sum over all messages of the peers each one was queued for.
    pub deliveries: usize,
}

/// The payload published for `topic`.
pub fn message_for(topic: &str) -> String {
    format!("Message for {topic}")
}

/// Owns one listening endpoint and publishes a fixed topic list round-robin.
///
/// Publishing is fire-and-forget: no acknowledgement is awaited and messages
/// sent while nobody is attached are simply gone.
#[derive(Debug)]
pub struct Publisher {
    config: PublisherConfig,
    endpoint: PubEndpoint,
}

impl Publisher {
    /// Validates the topic list and binds the listening endpoint.
    ///
    /// # Arguments
    /// * `config` - Address, topics and pacing. Every topic must be non-empty
    ///   and free of the `|` separator.
    ///
    /// # Errors
    /// `InvalidTopic` for a bad topic, `Bind` when the address is malformed or
    /// cannot be bound.
    pub async fn bind(config: PublisherConfig) -> Result<Self> {
        for topic in &config.topics {
            codec::validate_topic(topic)?;
        }
        let endpoint = PubEndpoint::listen_with(&config.address, config.endpoint.clone()).await?;
        Ok(Self { config, endpoint })
    }

    /// Binds, publishes every round, then shuts the endpoint down once the
    /// attached subscribers have been sent everything.
    pub async fn run(config: PublisherConfig) -> Result<PublishReport> {
        let publisher = Self::bind(config).await?;
        let report = publisher.publish_rounds().await;
        let drained = publisher.shutdown().await;
        let report = report?;
        drained?;
        Ok(report)
    }

    pub fn endpoint(&self) -> &PubEndpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Encodes and broadcasts a single message to every attached subscriber.
    ///
    /// # Arguments
    /// * `topic` - The topic the message is tagged with.
    /// * `payload` - Arbitrary bytes; may contain further separators.
    ///
    /// # Delivery
    /// Fire-and-forget. Reaching no subscriber at all is still a success; the
    /// returned [`Broadcast`] tells how many peers the message was queued for.
    pub fn publish(&self, topic: &str, payload: impl AsRef<[u8]>) -> Result<Broadcast> {
        let message = codec::encode(topic, payload)?;
        self.endpoint.send(&message)
    }

    /// Publishes `rounds * topics.len()` messages, topics in configured order
    /// within each round, pausing `interval` before every message.
    ///
    /// The first failure ends the run; nothing is retried.
    pub async fn publish_rounds(&self) -> Result<PublishReport> {
        let mut report = PublishReport::default();
        for round in 0..self.config.rounds {
            for topic in &self.config.topics {
                tokio::time::sleep(self.config.interval).await;
                info!(target: "fanout::publisher", round, topic = %topic, "publishing");
                let outcome = self.publish(topic, message_for(topic))?;
                debug!(
                    target: "fanout::publisher",
                    delivered = outcome.delivered,
                    dropped = outcome.dropped,
                    "published"
                );
                report.messages_sent += 1;
                report.deliveries += outcome.delivered;
            }
            report.rounds += 1;
        }
        Ok(report)
    }

    /// Stops accepting subscribers. Messages already published are still
    /// written out in the background.
    pub fn close(&self) {
        self.endpoint.close();
    }

    /// Closes and waits, at most the endpoint send timeout, until every
    /// subscriber has been sent what was published to it.
    pub async fn shutdown(&self) -> Result<()> {
        self.endpoint.shutdown(self.config.endpoint.send_timeout).await
    }
}
