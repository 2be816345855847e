//! Actor-based concurrency for the engine
//!
//! All mutating operations flow through a single actor task, which gives
//! the engine its total order: operations are applied one at a time in
//! arrival order, each committing one atomic write batch, and events are
//! published to the bus in commit order. Reads go straight to storage and
//! never enter the mailbox.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               EngineHandle (Clone)                   │
//! │          Sends messages to actor mailbox             │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              EngineActor (Single Task)               │
//! │     apply operation → commit WriteBatch → publish    │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ broadcast
//!                       ▼
//!                  bus subscribers
//! ```

use crate::invoice::InvoiceDraft;
use crate::metrics::Metrics;
use crate::types::{Address, Amount, EngineEvent, EventRecord, InvoiceId, PoolId, PoolStatus};
use crate::{funding, invoice, pool, registry, settlement};
use crate::{Error, Result, Storage};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the engine actor
pub enum EngineMessage {
    /// Register an exporter
    RegisterExporter {
        caller: Address,
        response: oneshot::Sender<Result<()>>,
    },

    /// Register an investor
    RegisterInvestor {
        caller: Address,
        response: oneshot::Sender<Result<()>>,
    },

    /// Submit an invoice
    CreateInvoice {
        caller: Address,
        draft: InvoiceDraft,
        response: oneshot::Sender<Result<InvoiceId>>,
    },

    /// Approve a pending invoice
    ApproveInvoice {
        caller: Address,
        invoice_id: InvoiceId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Reject a pending invoice
    RejectInvoice {
        caller: Address,
        invoice_id: InvoiceId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Create a pool from approved invoices
    CreatePool {
        caller: Address,
        name: String,
        invoice_ids: Vec<InvoiceId>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        response: oneshot::Sender<Result<PoolId>>,
    },

    /// Invest in an open pool
    Invest {
        caller: Address,
        pool_id: PoolId,
        amount: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Earmark raised capital toward one invoice
    DistributeToInvoice {
        caller: Address,
        pool_id: PoolId,
        invoice_id: InvoiceId,
        amount: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Release funds to the invoice's exporter
    WithdrawFunds {
        caller: Address,
        invoice_id: InvoiceId,
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Record an importer repayment
    MarkInvoicePaid {
        caller: Address,
        invoice_id: InvoiceId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Settle a fully repaid pool
    DistributeProfits {
        caller: Address,
        pool_id: PoolId,
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Claim principal plus yield from a settled pool
    ClaimReturns {
        caller: Address,
        pool_id: PoolId,
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Shutdown actor
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

impl EngineMessage {
    fn op_name(&self) -> &'static str {
        match self {
            EngineMessage::RegisterExporter { .. } => "register_exporter",
            EngineMessage::RegisterInvestor { .. } => "register_investor",
            EngineMessage::CreateInvoice { .. } => "create_invoice",
            EngineMessage::ApproveInvoice { .. } => "approve_invoice",
            EngineMessage::RejectInvoice { .. } => "reject_invoice",
            EngineMessage::CreatePool { .. } => "create_pool",
            EngineMessage::Invest { .. } => "invest",
            EngineMessage::DistributeToInvoice { .. } => "distribute_to_invoice",
            EngineMessage::WithdrawFunds { .. } => "withdraw_funds",
            EngineMessage::MarkInvoicePaid { .. } => "mark_invoice_paid",
            EngineMessage::DistributeProfits { .. } => "distribute_profits",
            EngineMessage::ClaimReturns { .. } => "claim_returns",
            EngineMessage::Shutdown { .. } => "shutdown",
        }
    }
}

/// Actor that serializes all mutating operations
pub struct EngineActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<EngineMessage>,

    /// Event bus publisher
    publisher: event_bus::Publisher,

    /// Metrics collector
    metrics: Metrics,

    /// Admin address from config
    admin: Address,

    /// Treasury address from config
    treasury: Address,
}

impl EngineActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<EngineMessage>,
        publisher: event_bus::Publisher,
        metrics: Metrics,
        admin: Address,
        treasury: Address,
    ) -> Self {
        Self {
            storage,
            mailbox,
            publisher,
            metrics,
            admin,
            treasury,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut ack = None;
        while let Some(msg) = self.mailbox.recv().await {
            if let EngineMessage::Shutdown { response } = msg {
                tracing::info!("Engine actor shutting down");
                ack = Some(response);
                break;
            }
            self.handle_message(msg);
        }

        // Release storage before acknowledging so a caller may reopen the
        // data directory as soon as shutdown() returns
        drop(self);
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: EngineMessage) {
        let op = msg.op_name();
        let started = Instant::now();
        let mut ok = true;

        match msg {
            EngineMessage::RegisterExporter { caller, response } => {
                let result = registry::register_exporter(&self.storage, &caller);
                ok = result.is_ok();
                let _ = response.send(self.publish(result.map(|events| ((), events))));
            }

            EngineMessage::RegisterInvestor { caller, response } => {
                let result = registry::register_investor(&self.storage, &caller);
                ok = result.is_ok();
                let _ = response.send(self.publish(result.map(|events| ((), events))));
            }

            EngineMessage::CreateInvoice {
                caller,
                draft,
                response,
            } => {
                let result = invoice::create_invoice(&self.storage, &caller, draft);
                ok = result.is_ok();
                let _ = response.send(self.publish(result));
            }

            EngineMessage::ApproveInvoice {
                caller,
                invoice_id,
                response,
            } => {
                let result =
                    invoice::approve_invoice(&self.storage, &self.admin, &caller, invoice_id);
                ok = result.is_ok();
                let _ = response.send(self.publish(result.map(|events| ((), events))));
            }

            EngineMessage::RejectInvoice {
                caller,
                invoice_id,
                response,
            } => {
                let result =
                    invoice::reject_invoice(&self.storage, &self.admin, &caller, invoice_id);
                ok = result.is_ok();
                let _ = response.send(self.publish(result.map(|events| ((), events))));
            }

            EngineMessage::CreatePool {
                caller,
                name,
                invoice_ids,
                start_date,
                end_date,
                response,
            } => {
                let result = pool::create_pool(
                    &self.storage,
                    &self.admin,
                    &caller,
                    name,
                    invoice_ids,
                    start_date,
                    end_date,
                );
                ok = result.is_ok();
                let _ = response.send(self.publish(result));
            }

            EngineMessage::Invest {
                caller,
                pool_id,
                amount,
                response,
            } => {
                let result = funding::invest(&self.storage, pool_id, &caller, amount);
                ok = result.is_ok();
                // Investing in a non-Open pool fails, so Funded after a
                // successful invest means this contribution closed the pool
                if ok {
                    if let Ok(pool) = self.storage.get_pool(pool_id) {
                        if pool.status == PoolStatus::Funded {
                            self.metrics.record_pool_funded();
                        }
                    }
                }
                let _ = response.send(self.publish(result.map(|events| ((), events))));
            }

            EngineMessage::DistributeToInvoice {
                caller,
                pool_id,
                invoice_id,
                amount,
                response,
            } => {
                let result = funding::distribute_to_invoice(
                    &self.storage,
                    &self.admin,
                    &caller,
                    pool_id,
                    invoice_id,
                    amount,
                );
                ok = result.is_ok();
                let _ = response.send(self.publish(result.map(|events| ((), events))));
            }

            EngineMessage::WithdrawFunds {
                caller,
                invoice_id,
                response,
            } => {
                let result = funding::withdraw_funds(&self.storage, &caller, invoice_id);
                ok = result.is_ok();
                let _ = response.send(self.publish(result));
            }

            EngineMessage::MarkInvoicePaid {
                caller,
                invoice_id,
                response,
            } => {
                let result =
                    settlement::mark_invoice_paid(&self.storage, &self.admin, &caller, invoice_id);
                ok = result.is_ok();
                let _ = response.send(self.publish(result.map(|events| ((), events))));
            }

            EngineMessage::DistributeProfits {
                caller,
                pool_id,
                response,
            } => {
                let result = settlement::distribute_profits(
                    &self.storage,
                    &self.admin,
                    &self.treasury,
                    &caller,
                    pool_id,
                );
                ok = result.is_ok();
                let _ = response.send(self.publish(result));
            }

            EngineMessage::ClaimReturns {
                caller,
                pool_id,
                response,
            } => {
                let result = settlement::claim_returns(&self.storage, &caller, pool_id);
                ok = result.is_ok();
                let _ = response.send(self.publish(result));
            }

            EngineMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }

        self.metrics
            .record_operation(op, ok, started.elapsed().as_secs_f64());
    }

    /// Publish committed events to the bus, then pass the value through
    ///
    /// Publication happens after the commit and only after it; a failed
    /// operation commits nothing and publishes nothing.
    fn publish<T>(&self, result: Result<(T, Vec<EventRecord>)>) -> Result<T> {
        let (value, records) = result?;
        for record in records {
            match &record.event {
                EngineEvent::InvestmentMade { amount, .. } => {
                    self.metrics.record_funds_moved("invested", *amount);
                }
                EngineEvent::FundsWithdrawn { amount, .. } => {
                    self.metrics.record_funds_moved("withdrawn", *amount);
                }
                EngineEvent::ProfitsDistributed { fee, .. } => {
                    self.metrics.record_funds_moved("fee", *fee);
                }
                EngineEvent::ReturnsClaimed { amount, .. } => {
                    self.metrics.record_funds_moved("claimed", *amount);
                }
                _ => {}
            }

            let topic = record.event.topic();
            match serde_json::to_value(&record) {
                Ok(payload) => {
                    self.publisher
                        .publish(event_bus::Message::new(topic, record.sequence, payload));
                    self.metrics.record_event_published();
                }
                Err(e) => {
                    tracing::error!(sequence = record.sequence, "Event encoding failed: {}", e);
                }
            }
        }
        Ok(value)
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineMessage>,
}

impl EngineHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<EngineMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        msg: EngineMessage,
        rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Register an exporter
    pub async fn register_exporter(&self, caller: Address) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.call(EngineMessage::RegisterExporter { caller, response: tx }, rx)
            .await
    }

    /// Register an investor
    pub async fn register_investor(&self, caller: Address) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.call(EngineMessage::RegisterInvestor { caller, response: tx }, rx)
            .await
    }

    /// Submit an invoice
    pub async fn create_invoice(&self, caller: Address, draft: InvoiceDraft) -> Result<InvoiceId> {
        let (tx, rx) = oneshot::channel();
        self.call(
            EngineMessage::CreateInvoice {
                caller,
                draft,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Approve a pending invoice
    pub async fn approve_invoice(&self, caller: Address, invoice_id: InvoiceId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.call(
            EngineMessage::ApproveInvoice {
                caller,
                invoice_id,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Reject a pending invoice
    pub async fn reject_invoice(&self, caller: Address, invoice_id: InvoiceId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.call(
            EngineMessage::RejectInvoice {
                caller,
                invoice_id,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Create a pool from approved invoices
    pub async fn create_pool(
        &self,
        caller: Address,
        name: String,
        invoice_ids: Vec<InvoiceId>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<PoolId> {
        let (tx, rx) = oneshot::channel();
        self.call(
            EngineMessage::CreatePool {
                caller,
                name,
                invoice_ids,
                start_date,
                end_date,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Invest in an open pool
    pub async fn invest(&self, caller: Address, pool_id: PoolId, amount: Amount) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.call(
            EngineMessage::Invest {
                caller,
                pool_id,
                amount,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Earmark raised capital toward one invoice
    pub async fn distribute_to_invoice(
        &self,
        caller: Address,
        pool_id: PoolId,
        invoice_id: InvoiceId,
        amount: Amount,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.call(
            EngineMessage::DistributeToInvoice {
                caller,
                pool_id,
                invoice_id,
                amount,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Release funds to the invoice's exporter; returns the released amount
    pub async fn withdraw_funds(&self, caller: Address, invoice_id: InvoiceId) -> Result<Amount> {
        let (tx, rx) = oneshot::channel();
        self.call(
            EngineMessage::WithdrawFunds {
                caller,
                invoice_id,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Record an importer repayment
    pub async fn mark_invoice_paid(&self, caller: Address, invoice_id: InvoiceId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.call(
            EngineMessage::MarkInvoicePaid {
                caller,
                invoice_id,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Settle a fully repaid pool; returns the platform fee paid
    pub async fn distribute_profits(&self, caller: Address, pool_id: PoolId) -> Result<Amount> {
        let (tx, rx) = oneshot::channel();
        self.call(
            EngineMessage::DistributeProfits {
                caller,
                pool_id,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Claim principal plus yield; returns the payout
    pub async fn claim_returns(&self, caller: Address, pool_id: PoolId) -> Result<Amount> {
        let (tx, rx) = oneshot::channel();
        self.call(
            EngineMessage::ClaimReturns {
                caller,
                pool_id,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Shutdown actor, waiting for queued operations to drain
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        let _ = rx.await;
        Ok(())
    }
}

/// Spawn the engine actor
pub fn spawn_engine_actor(
    storage: Arc<Storage>,
    publisher: event_bus::Publisher,
    metrics: Metrics,
    admin: Address,
    treasury: Address,
    mailbox_capacity: usize,
) -> EngineHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = EngineActor::new(storage, rx, publisher, metrics, admin, treasury);

    tokio::spawn(async move {
        actor.run().await;
    });

    EngineHandle::new(tx)
}
