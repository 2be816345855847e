//! Tradepool Ledger Engine
//!
//! Invoice financing ledger: exporters tokenize shipping invoices, an
//! admin curates them into investment pools, investors fund the pools,
//! and settlement returns principal plus yield.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task applies all mutations in order
//! - **Atomic Commits**: Each operation is one RocksDB write batch
//! - **Event Log**: Every state change appends a sequence-numbered event
//! - **Integer Money**: u64 cents, basis-point shares, floor rounding
//!
//! # Invariants
//!
//! - Statuses move strictly forward; no status is revisited
//! - A pool never holds more capital than its funding target
//! - Investor shares are floored, so payouts never exceed the yield pool
//! - The event log is gapless and totally ordered

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod actor;
pub mod config;
pub mod engine;
pub mod error;
pub mod funding;
pub mod invoice;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod settlement;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use engine::LedgerEngine;
pub use error::{Error, Result};
pub use invoice::InvoiceDraft;
pub use storage::Storage;
pub use types::{
    Address, Amount, EngineEvent, EventRecord, Investment, Invoice, InvoiceId, InvoiceStatus,
    Pool, PoolId, PoolStatus,
};
