//! Type definitions for the event bus

use serde::{Deserialize, Serialize};

/// Topic, one per ledger event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Exporter self-registration
    ExporterRegistered,
    /// Investor self-registration
    InvestorRegistered,
    /// Invoice submitted by an exporter
    InvoiceCreated,
    /// Invoice approved by admin
    InvoiceApproved,
    /// Invoice rejected by admin
    InvoiceRejected,
    /// Investment pool created from approved invoices
    PoolCreated,
    /// Capital contributed to a pool
    InvestmentMade,
    /// Funds released to an exporter
    FundsWithdrawn,
    /// Importer repayment recorded
    InvoicePaid,
    /// Pool settled: platform fee paid, yield earmarked
    ProfitsDistributed,
    /// Investor claimed principal plus yield
    ReturnsClaimed,
}

impl Topic {
    /// Subject string for this topic
    pub fn subject(&self) -> &'static str {
        match self {
            Topic::ExporterRegistered => "tradepool.registry.exporter",
            Topic::InvestorRegistered => "tradepool.registry.investor",
            Topic::InvoiceCreated => "tradepool.invoice.created",
            Topic::InvoiceApproved => "tradepool.invoice.approved",
            Topic::InvoiceRejected => "tradepool.invoice.rejected",
            Topic::PoolCreated => "tradepool.pool.created",
            Topic::InvestmentMade => "tradepool.pool.investment",
            Topic::FundsWithdrawn => "tradepool.funds.withdrawn",
            Topic::InvoicePaid => "tradepool.invoice.paid",
            Topic::ProfitsDistributed => "tradepool.pool.profits",
            Topic::ReturnsClaimed => "tradepool.pool.claim",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.subject())
    }
}
