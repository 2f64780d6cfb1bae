//! Transport plumbing: addresses, framing and the two endpoint roles.
//!
//! Supported schemes are `tcp://`, `ipc://` (Unix domain sockets) and
//! `inproc://` (in-memory, same process). All of them are byte streams carrying
//! length-prefixed frames.

pub mod address;
pub mod connection;
pub mod endpoint;
pub mod frame;
mod inproc;
mod listener;

pub use address::{Address, AddressError};
pub use connection::{Broadcast, PeerId};
pub use endpoint::{EndpointOptions, PubEndpoint, SubEndpoint};
pub use frame::FrameError;
