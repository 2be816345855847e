//! In-process event bus for ledger event fan-out
//!
//! Provides pub/sub messaging with:
//! - One topic per ledger event kind
//! - Fire-and-forget publishing (the ledger never blocks on consumers)
//! - Per-subscriber lag handling via `tokio::sync::broadcast`
//! - Observability via Prometheus metrics
//!
//! Downstream consumers (off-chain metadata store, compensation checker)
//! subscribe here and reconcile independently. The byte-level envelope is
//! broker-agnostic so a bridge to an external broker can reuse it.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod subscriber;
pub mod types;

pub use error::{Error, Result};
pub use message::Message;
pub use publisher::Publisher;
pub use subscriber::Subscriber;
pub use types::Topic;
