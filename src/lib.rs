//! fanout – a minimal topic-based publish/subscribe core.
//!
//! This crate exports
//!  * `core`      – message codec, subscription filter, publisher and subscriber roles
//!  * `transport` – listen/dial endpoints over `tcp://`, `ipc://` and `inproc://`
//!  * `config`    – TOML-driven runtime configuration
//!  * `logging`   – `tracing` subscriber setup
//!
//! The `fanout` binary under `src/bin/` drives the roles from the command line.

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod logging;
pub mod transport;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use config::{load_config, Config};
pub use crate::core::error::{Error, Result};
pub use crate::core::publisher::{Publisher, PublisherConfig};
pub use crate::core::subscriber::{Subscriber, SubscriberConfig};
