pub mod codec;
pub mod error;
pub mod filter;
pub mod publisher;
pub mod subscriber;

pub use codec::Message;
pub use error::{Error, Result};
pub use filter::SubscriptionFilter;
