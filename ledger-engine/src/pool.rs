//! Pool lifecycle: creation from approved invoices, funding progress
//!
//! A pool's invoice set and funding target are fixed at creation. Status
//! machine: `Open → Funded → Completed`, with `Cancelled` representable
//! from `Open` (no operation reaches it yet). Pool start/end dates are
//! descriptive metadata; nothing enforces expiry.

use crate::{
    error::{Error, Result},
    registry::require_admin,
    storage::Storage,
    types::{
        bps_rounded, Address, Amount, EngineEvent, EventRecord, InvoiceId, InvoiceStatus, Pool,
        PoolId, PoolStatus,
    },
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Create a pool from a list of approved invoices (admin only)
///
/// Every referenced invoice is atomically moved to `InPool` and linked to
/// the new pool id in the same commit that stores the pool.
pub fn create_pool(
    storage: &Storage,
    admin: &Address,
    caller: &Address,
    name: String,
    invoice_ids: Vec<InvoiceId>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> Result<(PoolId, Vec<EventRecord>)> {
    require_admin(admin, caller)?;

    if invoice_ids.is_empty() {
        return Err(Error::EmptyPool);
    }

    let unique: HashSet<_> = invoice_ids.iter().collect();
    if unique.len() != invoice_ids.len() {
        return Err(Error::InvalidState(
            "duplicate invoice id in pool".to_string(),
        ));
    }

    let mut invoices = Vec::with_capacity(invoice_ids.len());
    let mut total_loan_amount: Amount = 0;
    for &id in &invoice_ids {
        let invoice = storage.get_invoice(id)?;
        if invoice.status != InvoiceStatus::Approved {
            return Err(Error::InvalidState(format!(
                "invoice {} is not approved",
                id
            )));
        }
        total_loan_amount = total_loan_amount
            .checked_add(invoice.loan_amount)
            .ok_or_else(|| Error::InvalidAmount("pool funding target overflows".to_string()))?;
        invoices.push(invoice);
    }

    let mut txn = storage.begin()?;
    let pool_id = txn.alloc_pool_id();
    let now = Utc::now();

    for mut invoice in invoices {
        invoice.status = InvoiceStatus::InPool;
        invoice.pool_id = Some(pool_id);
        invoice.updated_at = now;
        txn.put_invoice(&invoice, Some(InvoiceStatus::Approved))?;
    }

    let pool = Pool {
        id: pool_id,
        name,
        invoice_ids,
        start_date,
        end_date,
        total_loan_amount,
        amount_invested: 0,
        fee_paid: 0,
        status: PoolStatus::Open,
        created_at: now,
    };
    txn.put_pool(&pool, None)?;
    txn.emit(EngineEvent::PoolCreated { pool_id })?;
    let events = txn.commit()?;

    tracing::info!(
        pool_id,
        invoices = pool.invoice_ids.len(),
        total_loan_amount,
        "Pool created"
    );
    Ok((pool_id, events))
}

/// Funding progress in basis points, rounded half-up
///
/// The zero-target guard is defensive: `create_pool` rejects empty pools
/// and zero-loan invoices cannot be created, so a zero target should never
/// be stored.
pub fn funding_percentage(storage: &Storage, pool_id: PoolId) -> Result<u64> {
    let pool = storage.get_pool(pool_id)?;
    if pool.total_loan_amount == 0 {
        return Err(Error::InvalidAmount(format!(
            "pool {} has a zero funding target",
            pool_id
        )));
    }
    Ok(bps_rounded(pool.amount_invested, pool.total_loan_amount))
}
