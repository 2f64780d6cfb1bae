//! Publisher module for fanout.
//! Exposes the Publisher role and its configuration.
#[allow(clippy::module_inception)]
pub mod publisher;

pub use publisher::{
    message_for, PublishReport, Publisher, PublisherConfig, DEFAULT_ADDRESS, DEFAULT_ROUNDS,
};
