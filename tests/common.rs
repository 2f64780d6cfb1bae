#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use fanout::core::publisher::{Publisher, PublisherConfig};
use fanout::core::subscriber::SubscriberConfig;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = fanout::logging::try_init_logging();
    });
}

/// Upper bound for any single await in a test.
pub const GUARD: Duration = Duration::from_secs(5);

pub fn topics(names: &[&str]) -> Vec<String> {
    names.iter().map(|t| t.to_string()).collect()
}

pub fn publisher_config(address: &str, names: &[&str], rounds: usize) -> PublisherConfig {
    PublisherConfig {
        address: address.to_string(),
        topics: topics(names),
        rounds,
        interval: Duration::from_millis(5),
        ..Default::default()
    }
}

pub fn subscriber_config(name: &str, address: &str, names: &[&str]) -> SubscriberConfig {
    SubscriberConfig {
        receive_timeout: Duration::from_millis(500),
        ..SubscriberConfig::new(name, address, topics(names))
    }
}

/// Binds a publisher; the resolved address is what subscribers should dial.
pub async fn bind_publisher(config: PublisherConfig) -> (Publisher, String) {
    let publisher = Publisher::bind(config).await.expect("bind publisher");
    let address = publisher.endpoint().local_address().to_string();
    (publisher, address)
}
