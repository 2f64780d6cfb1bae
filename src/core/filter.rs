use std::collections::HashSet;

use tracing::trace;

use crate::core::codec::{self, Message};
use crate::core::error::{Error, Result};

/// The topics one subscriber is interested in.
///
/// Matching is exact and case-sensitive; there are no wildcards and no prefix
/// semantics. An empty filter accepts nothing.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    interests: HashSet<String>,
}

impl SubscriptionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `topic`. Returns `false` if it was already present.
    ///
    /// A topic that could never appear in a decoded message (empty, or
    /// containing the separator) is refused.
    pub fn add_interest(&mut self, topic: impl Into<String>) -> Result<bool> {
        let topic = topic.into();
        if let Err(e) = codec::validate_topic(&topic) {
            return Err(Error::Subscription {
                topic,
                reason: e.to_string(),
            });
        }
        let added = self.interests.insert(topic);
        trace!(target: "fanout::filter", added, "interest registered");
        Ok(added)
    }

    /// Decodes the topic of `message` and checks it against the interest set.
    /// Bytes that do not decode are never accepted.
    pub fn accepts(&self, message: &[u8]) -> bool {
        match codec::decode_topic(message) {
            Ok(topic) => self.accepts_topic(topic),
            Err(_) => false,
        }
    }

    pub fn accepts_topic(&self, topic: &str) -> bool {
        self.interests.contains(topic)
    }

    pub fn accepts_message(&self, message: &Message) -> bool {
        self.accepts_topic(&message.topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.interests.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.interests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_of(topics: &[&str]) -> SubscriptionFilter {
        let mut f = SubscriptionFilter::new();
        for t in topics {
            f.add_interest(*t).unwrap();
        }
        f
    }

    #[test]
    fn add_interest_is_idempotent() {
        let mut f = SubscriptionFilter::new();
        assert!(f.add_interest("Weather").unwrap());
        assert!(!f.add_interest("Weather").unwrap());
        assert_eq!(f.len(), 1);
    }

    #[test]
    fn accepts_only_exact_topics() {
        let f = filter_of(&["Weather"]);
        assert!(f.accepts(b"Weather|sunny"));
        assert!(!f.accepts(b"weather|sunny"));
        assert!(!f.accepts(b"WeatherReport|sunny"));
        assert!(!f.accepts(b"Weath|sunny"));
        assert!(!f.accepts(b"Technology|Message for Technology"));
    }

    #[test]
    fn accepts_matches_set_membership() {
        let f = filter_of(&["A", "C"]);
        for (topic, expected) in [("A", true), ("B", false), ("C", true), ("AC", false)] {
            let msg = codec::encode(topic, "p").unwrap();
            assert_eq!(f.accepts(&msg), expected, "topic {topic}");
        }
    }

    #[test]
    fn empty_filter_accepts_nothing() {
        let f = SubscriptionFilter::new();
        assert!(f.is_empty());
        assert!(!f.accepts(b"A|x"));
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        let f = filter_of(&["A"]);
        assert!(!f.accepts(b"A"));
    }

    #[test]
    fn invalid_topics_cannot_be_subscribed() {
        let mut f = SubscriptionFilter::new();
        assert!(matches!(f.add_interest("a|b"), Err(Error::Subscription { .. })));
        assert!(matches!(f.add_interest(""), Err(Error::Subscription { .. })));
        assert!(f.is_empty());
    }
}
