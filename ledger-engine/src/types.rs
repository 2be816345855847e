//! Core types for the ledger engine
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Integer money (smallest currency unit, u64 cents)
//! - Fixed-point share arithmetic (basis points, floor rounding)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Invoice identifier (sequential, 1-based)
pub type InvoiceId = u64;

/// Pool identifier (sequential, 1-based)
pub type PoolId = u64;

/// Money amount in the smallest currency unit (cents)
pub type Amount = u64;

/// Basis points denominator: 10,000 bps = 100%
pub const BPS_DENOM: u64 = 10_000;

/// Earmarked investment required before an exporter may withdraw early (70%)
pub const WITHDRAW_THRESHOLD_BPS: u64 = 7_000;

/// Platform fee taken at settlement (1%)
pub const PLATFORM_FEE_BPS: u64 = 100;

/// Investor yield earmarked at settlement (4%)
pub const INVESTOR_YIELD_BPS: u64 = 400;

/// Part-of-whole in basis points, floored
///
/// Floor rounding keeps the "sum of shares never exceeds the whole"
/// invariant provable. Returns 0 for a zero whole.
pub fn bps_floor(part: Amount, whole: Amount) -> u64 {
    if whole == 0 {
        return 0;
    }
    ((part as u128 * BPS_DENOM as u128) / whole as u128) as u64
}

/// Part-of-whole in basis points, rounded half-up (display path)
pub fn bps_rounded(part: Amount, whole: Amount) -> u64 {
    if whole == 0 {
        return 0;
    }
    ((part as u128 * BPS_DENOM as u128 + whole as u128 / 2) / whole as u128) as u64
}

/// Basis-point fraction of an amount, floored
pub fn bps_share(amount: Amount, bps: u64) -> Amount {
    ((amount as u128 * bps as u128) / BPS_DENOM as u128) as u64
}

/// Caller address, pre-authenticated by the host environment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create new address
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invoice status (strictly forward-moving, no status is revisited)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum InvoiceStatus {
    /// Submitted, awaiting admin review
    Pending = 1,
    /// Approved by admin, eligible for pooling
    Approved = 2,
    /// Rejected by admin (terminal)
    Rejected = 3,
    /// Grouped into an investment pool
    InPool = 4,
    /// Loan funds released to the exporter
    Withdrawn = 5,
    /// Importer repayment recorded by admin
    Paid = 6,
    /// Pool settled (terminal)
    Completed = 7,
}

impl InvoiceStatus {
    /// Terminal statuses admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Rejected | InvoiceStatus::Completed)
    }
}

/// A shipping invoice submitted for loan financing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Sequential id, immutable once assigned
    pub id: InvoiceId,

    /// Exporter (owner) address
    pub exporter: Address,

    /// Exporter company name
    pub exporter_company: String,

    /// Importer company name
    pub importer_company: String,

    /// Importer contact
    pub importer_contact: String,

    /// Shipping date
    pub shipping_date: DateTime<Utc>,

    /// Shipping amount (cents)
    pub shipping_amount: Amount,

    /// Requested loan amount (cents, <= shipping_amount)
    pub loan_amount: Amount,

    /// Off-chain document reference (opaque)
    pub document_ref: String,

    /// Capital earmarked toward this invoice so far
    pub amount_invested: Amount,

    /// Cumulative funds released to the exporter
    pub amount_withdrawn: Amount,

    /// Pool this invoice belongs to, once grouped
    pub pool_id: Option<PoolId>,

    /// Current status
    pub status: InvoiceStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Earmarked investment as basis points of the requested loan
    pub fn funded_bps(&self) -> u64 {
        bps_floor(self.amount_invested, self.loan_amount)
    }

    /// Funds owed to the exporter but not yet released
    pub fn withdrawable(&self) -> Amount {
        self.amount_invested.saturating_sub(self.amount_withdrawn)
    }
}

/// Pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PoolStatus {
    /// Accepting investments
    Open = 1,
    /// Fully subscribed; funds auto-distributed to exporters
    Funded = 2,
    /// Profits distributed (terminal)
    Completed = 3,
    /// Cancelled before funding (terminal; reachable only from Open,
    /// no operation exercises it yet)
    Cancelled = 4,
}

/// An investment pool grouping approved invoices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    /// Sequential id, immutable once assigned
    pub id: PoolId,

    /// Pool name
    pub name: String,

    /// Constituent invoice ids (fixed at creation)
    pub invoice_ids: Vec<InvoiceId>,

    /// Funding round start
    pub start_date: DateTime<Utc>,

    /// Funding round end (descriptive metadata, not enforced)
    pub end_date: DateTime<Utc>,

    /// Funding target: sum of constituent loan amounts (fixed at creation)
    pub total_loan_amount: Amount,

    /// Investor capital contributed so far (<= total_loan_amount)
    pub amount_invested: Amount,

    /// Platform fee paid at settlement (set once)
    pub fee_paid: Amount,

    /// Current status
    pub status: PoolStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Pool {
    /// Capital still needed to reach the funding target
    pub fn remaining_capacity(&self) -> Amount {
        self.total_loan_amount.saturating_sub(self.amount_invested)
    }
}

/// A single investor's cumulative position in one pool
///
/// Keyed by (pool id, investor address); repeat contributions accumulate
/// into the same record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    /// Pool this position belongs to
    pub pool_id: PoolId,

    /// Investor address
    pub investor: Address,

    /// Cumulative amount invested
    pub amount: Amount,

    /// Share of the pool total, in basis points (recomputed on every
    /// investment event for the pool)
    pub percentage_bps: u64,

    /// Whether returns were claimed (flips exactly once)
    pub returns_claimed: bool,

    /// First contribution timestamp
    pub created_at: DateTime<Utc>,
}

/// Engine event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EngineEvent {
    /// Exporter self-registered
    ExporterRegistered {
        /// Registered address
        address: Address,
    },
    /// Investor self-registered
    InvestorRegistered {
        /// Registered address
        address: Address,
    },
    /// Invoice submitted
    InvoiceCreated {
        /// New invoice id
        invoice_id: InvoiceId,
        /// Submitting exporter
        exporter: Address,
    },
    /// Invoice approved
    InvoiceApproved {
        /// Invoice id
        invoice_id: InvoiceId,
        /// Approving admin
        admin: Address,
    },
    /// Invoice rejected
    InvoiceRejected {
        /// Invoice id
        invoice_id: InvoiceId,
        /// Rejecting admin
        admin: Address,
    },
    /// Pool created
    PoolCreated {
        /// New pool id
        pool_id: PoolId,
    },
    /// Capital contributed to a pool
    InvestmentMade {
        /// Pool id
        pool_id: PoolId,
        /// Contributing investor
        investor: Address,
        /// Contribution amount
        amount: Amount,
    },
    /// Funds released to an exporter
    FundsWithdrawn {
        /// Invoice id
        invoice_id: InvoiceId,
        /// Receiving exporter
        exporter: Address,
        /// Released amount
        amount: Amount,
    },
    /// Importer repayment recorded
    InvoicePaid {
        /// Invoice id
        invoice_id: InvoiceId,
    },
    /// Pool settled
    ProfitsDistributed {
        /// Pool id
        pool_id: PoolId,
        /// Platform fee paid to the treasury
        fee: Amount,
    },
    /// Investor claimed principal plus yield
    ReturnsClaimed {
        /// Pool id
        pool_id: PoolId,
        /// Claiming investor
        investor: Address,
        /// Paid out amount (principal + yield share)
        amount: Amount,
    },
}

impl EngineEvent {
    /// Bus topic for this event
    pub fn topic(&self) -> event_bus::Topic {
        use event_bus::Topic;
        match self {
            EngineEvent::ExporterRegistered { .. } => Topic::ExporterRegistered,
            EngineEvent::InvestorRegistered { .. } => Topic::InvestorRegistered,
            EngineEvent::InvoiceCreated { .. } => Topic::InvoiceCreated,
            EngineEvent::InvoiceApproved { .. } => Topic::InvoiceApproved,
            EngineEvent::InvoiceRejected { .. } => Topic::InvoiceRejected,
            EngineEvent::PoolCreated { .. } => Topic::PoolCreated,
            EngineEvent::InvestmentMade { .. } => Topic::InvestmentMade,
            EngineEvent::FundsWithdrawn { .. } => Topic::FundsWithdrawn,
            EngineEvent::InvoicePaid { .. } => Topic::InvoicePaid,
            EngineEvent::ProfitsDistributed { .. } => Topic::ProfitsDistributed,
            EngineEvent::ReturnsClaimed { .. } => Topic::ReturnsClaimed,
        }
    }
}

/// A committed, sequence-numbered event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the global event log (1-based, gapless)
    pub sequence: u64,

    /// Commit timestamp
    pub timestamp: DateTime<Utc>,

    /// Event payload
    pub event: EngineEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bps_floor() {
        assert_eq!(bps_floor(7_000_000, 10_000_000), 7_000);
        assert_eq!(bps_floor(6_999_999, 10_000_000), 6_999);
        assert_eq!(bps_floor(1, 3), 3_333);
        assert_eq!(bps_floor(0, 100), 0);
        assert_eq!(bps_floor(5, 0), 0);
    }

    #[test]
    fn test_bps_rounded() {
        assert_eq!(bps_rounded(1, 3), 3_333);
        assert_eq!(bps_rounded(2, 3), 6_667);
        assert_eq!(bps_rounded(100, 100), 10_000);
    }

    #[test]
    fn test_bps_share() {
        // 1% of 10,000,000 cents
        assert_eq!(bps_share(10_000_000, PLATFORM_FEE_BPS), 100_000);
        // 4% of 10,000,000 cents
        assert_eq!(bps_share(10_000_000, INVESTOR_YIELD_BPS), 400_000);
        // Floor: 4% of 3 cents is 0
        assert_eq!(bps_share(3, INVESTOR_YIELD_BPS), 0);
    }

    #[test]
    fn test_bps_no_overflow_at_u64_max() {
        // u64::MAX * 10_000 overflows u64; must go through u128
        assert_eq!(bps_floor(u64::MAX, u64::MAX), BPS_DENOM);
        assert_eq!(bps_share(u64::MAX, BPS_DENOM), u64::MAX);
    }

    #[test]
    fn test_invoice_status_terminal() {
        assert!(InvoiceStatus::Rejected.is_terminal());
        assert!(InvoiceStatus::Completed.is_terminal());
        assert!(!InvoiceStatus::Pending.is_terminal());
        assert!(!InvoiceStatus::Withdrawn.is_terminal());
    }

    #[test]
    fn test_invoice_funded_bps_and_withdrawable() {
        let now = Utc::now();
        let invoice = Invoice {
            id: 1,
            exporter: Address::new("exp-1"),
            exporter_company: "Acme Exports".to_string(),
            importer_company: "Borealis Imports".to_string(),
            importer_contact: "ops@borealis.example".to_string(),
            shipping_date: now,
            shipping_amount: 10_000_000,
            loan_amount: 7_000_000,
            document_ref: "doc-hash".to_string(),
            amount_invested: 4_900_000,
            amount_withdrawn: 0,
            pool_id: Some(1),
            status: InvoiceStatus::InPool,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(invoice.funded_bps(), 7_000);
        assert_eq!(invoice.withdrawable(), 4_900_000);
    }

    #[test]
    fn test_pool_remaining_capacity() {
        let now = Utc::now();
        let pool = Pool {
            id: 1,
            name: "Q3 shipping".to_string(),
            invoice_ids: vec![1, 2],
            start_date: now,
            end_date: now,
            total_loan_amount: 10_000_000,
            amount_invested: 4_000_000,
            fee_paid: 0,
            status: PoolStatus::Open,
            created_at: now,
        };

        assert_eq!(pool.remaining_capacity(), 6_000_000);
    }

    #[test]
    fn test_event_topics() {
        let e = EngineEvent::PoolCreated { pool_id: 1 };
        assert_eq!(e.topic(), event_bus::Topic::PoolCreated);

        let e = EngineEvent::ReturnsClaimed {
            pool_id: 1,
            investor: Address::new("inv-1"),
            amount: 42,
        };
        assert_eq!(e.topic(), event_bus::Topic::ReturnsClaimed);
    }
}
