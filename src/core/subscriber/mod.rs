//! fanout Subscriber module.
//!
//! Provides the `Subscriber` role and the `SubscriberId` naming each instance.

#[allow(clippy::module_inception)]
pub mod subscriber;

pub use subscriber::{Subscriber, SubscriberConfig, SubscriberId, SubscriberReport};
