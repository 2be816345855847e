//! Main engine orchestration layer
//!
//! Ties together storage, the single-writer actor, the event bus, and
//! metrics into a high-level API.
//!
//! # Example
//!
//! ```no_run
//! use ledger_engine::{Config, LedgerEngine};
//! use ledger_engine::types::Address;
//!
//! #[tokio::main]
//! async fn main() -> ledger_engine::Result<()> {
//!     let config = Config::default();
//!     let engine = LedgerEngine::open(config)?;
//!
//!     engine.register_exporter(Address::new("exp-1")).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_engine_actor, EngineHandle},
    funding,
    invoice::InvoiceDraft,
    metrics::Metrics,
    pool,
    types::{
        Address, Amount, EventRecord, Investment, Invoice, InvoiceId, InvoiceStatus, Pool, PoolId,
        PoolStatus,
    },
    Config, Result, Storage,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Main engine interface
///
/// Mutations are forwarded to the actor and applied in arrival order.
/// Reads hit storage directly; they see the latest committed state and
/// never block the writer.
pub struct LedgerEngine {
    /// Actor handle for mutating operations
    handle: EngineHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Event bus publisher (held for subscriptions)
    publisher: event_bus::Publisher,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl LedgerEngine {
    /// Open the engine with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let publisher = event_bus::Publisher::new(config.event_bus_capacity);
        let metrics = Metrics::new()
            .map_err(|e| crate::Error::Config(format!("metrics registration: {}", e)))?;

        let handle = spawn_engine_actor(
            storage.clone(),
            publisher.clone(),
            metrics.clone(),
            config.admin.clone(),
            config.treasury.clone(),
            config.mailbox_capacity,
        );

        tracing::info!(
            data_dir = %config.data_dir.display(),
            admin = %config.admin,
            "Ledger engine started"
        );

        Ok(Self {
            handle,
            storage,
            publisher,
            metrics,
            config,
        })
    }

    // --- Registry ---

    /// Register the caller as an exporter
    pub async fn register_exporter(&self, caller: Address) -> Result<()> {
        self.handle.register_exporter(caller).await
    }

    /// Register the caller as an investor
    pub async fn register_investor(&self, caller: Address) -> Result<()> {
        self.handle.register_investor(caller).await
    }

    /// Whether an address is a registered exporter
    pub fn is_exporter(&self, address: &Address) -> Result<bool> {
        self.storage.is_registered_exporter(address)
    }

    /// Whether an address is a registered investor
    pub fn is_investor(&self, address: &Address) -> Result<bool> {
        self.storage.is_registered_investor(address)
    }

    /// Whether an address is the configured admin
    pub fn is_admin(&self, address: &Address) -> bool {
        address == &self.config.admin
    }

    // --- Invoices ---

    /// Submit an invoice for the calling exporter
    pub async fn create_invoice(&self, caller: Address, draft: InvoiceDraft) -> Result<InvoiceId> {
        self.handle.create_invoice(caller, draft).await
    }

    /// Approve a pending invoice (admin only)
    pub async fn approve_invoice(&self, caller: Address, invoice_id: InvoiceId) -> Result<()> {
        self.handle.approve_invoice(caller, invoice_id).await
    }

    /// Reject a pending invoice (admin only)
    pub async fn reject_invoice(&self, caller: Address, invoice_id: InvoiceId) -> Result<()> {
        self.handle.reject_invoice(caller, invoice_id).await
    }

    /// Get an invoice by id
    pub fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Invoice> {
        self.storage.get_invoice(invoice_id)
    }

    /// Ids of all invoices submitted by an exporter
    pub fn invoices_by_exporter(&self, exporter: &Address) -> Result<Vec<InvoiceId>> {
        self.storage.invoice_ids_by_exporter(exporter)
    }

    /// Ids of all invoices awaiting review
    pub fn pending_invoices(&self) -> Result<Vec<InvoiceId>> {
        self.storage.invoice_ids_by_status(InvoiceStatus::Pending)
    }

    /// Ids of all approved, not-yet-pooled invoices
    pub fn approved_invoices(&self) -> Result<Vec<InvoiceId>> {
        self.storage.invoice_ids_by_status(InvoiceStatus::Approved)
    }

    // --- Pools ---

    /// Create a pool from approved invoices (admin only)
    pub async fn create_pool(
        &self,
        caller: Address,
        name: String,
        invoice_ids: Vec<InvoiceId>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<PoolId> {
        self.handle
            .create_pool(caller, name, invoice_ids, start_date, end_date)
            .await
    }

    /// Get a pool by id
    pub fn get_pool(&self, pool_id: PoolId) -> Result<Pool> {
        self.storage.get_pool(pool_id)
    }

    /// Ids of all pools accepting investment
    pub fn open_pools(&self) -> Result<Vec<PoolId>> {
        self.storage.pool_ids_by_status(PoolStatus::Open)
    }

    /// Funding progress of a pool in basis points, rounded
    pub fn funding_percentage(&self, pool_id: PoolId) -> Result<u64> {
        pool::funding_percentage(&self.storage, pool_id)
    }

    // --- Funding ---

    /// Invest in an open pool
    pub async fn invest(&self, caller: Address, pool_id: PoolId, amount: Amount) -> Result<()> {
        self.handle.invest(caller, pool_id, amount).await
    }

    /// Earmark raised capital toward one invoice (admin only)
    pub async fn distribute_to_invoice(
        &self,
        caller: Address,
        pool_id: PoolId,
        invoice_id: InvoiceId,
        amount: Amount,
    ) -> Result<()> {
        self.handle
            .distribute_to_invoice(caller, pool_id, invoice_id, amount)
            .await
    }

    /// Whether an invoice may be withdrawn, and how much
    pub fn can_withdraw(&self, invoice_id: InvoiceId) -> Result<(bool, Amount)> {
        funding::can_withdraw(&self.storage, invoice_id)
    }

    /// Release earmarked funds to the invoice's exporter
    pub async fn withdraw_funds(&self, caller: Address, invoice_id: InvoiceId) -> Result<Amount> {
        self.handle.withdraw_funds(caller, invoice_id).await
    }

    /// Get an investor's position in a pool, if any
    pub fn get_investment(
        &self,
        pool_id: PoolId,
        investor: &Address,
    ) -> Result<Option<Investment>> {
        self.storage.get_investment(pool_id, investor)
    }

    /// All investor positions in a pool
    pub fn pool_investments(&self, pool_id: PoolId) -> Result<Vec<Investment>> {
        self.storage.pool_investments(pool_id)
    }

    // --- Settlement ---

    /// Record an importer repayment (admin only)
    pub async fn mark_invoice_paid(&self, caller: Address, invoice_id: InvoiceId) -> Result<()> {
        self.handle.mark_invoice_paid(caller, invoice_id).await
    }

    /// Settle a fully repaid pool (admin only); returns the platform fee
    pub async fn distribute_profits(&self, caller: Address, pool_id: PoolId) -> Result<Amount> {
        self.handle.distribute_profits(caller, pool_id).await
    }

    /// Claim principal plus yield from a settled pool; returns the payout
    pub async fn claim_returns(&self, caller: Address, pool_id: PoolId) -> Result<Amount> {
        self.handle.claim_returns(caller, pool_id).await
    }

    // --- Event log & bus ---

    /// Committed events from a sequence number (inclusive)
    pub fn events_since(&self, sequence: u64) -> Result<Vec<EventRecord>> {
        self.storage.events_since(sequence)
    }

    /// Sequence number of the latest committed event (0 when empty)
    pub fn latest_event_seq(&self) -> Result<u64> {
        self.storage.latest_event_seq()
    }

    /// Subscribe to live events on the bus
    ///
    /// Delivery starts at the next published event; use `events_since` to
    /// backfill history before subscribing.
    pub fn subscribe(&self) -> event_bus::Subscriber {
        self.publisher.subscribe()
    }

    /// Metrics collector for this engine instance
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Engine configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shut down the writer, draining queued operations first
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}
