//! Funding & distribution engine
//!
//! Accepts investor capital against a pool's funding target and releases
//! it to exporters on two triggers:
//!
//! - **70% threshold**: once an invoice's earmarked investment reaches
//!   7000 bps of its requested loan, the exporter may withdraw early.
//! - **100% full funding**: the investment that brings a pool to its exact
//!   target flips it to `Funded` and releases every invoice's remaining
//!   funds in the same commit. No pool can sit overfunded-but-undistributed:
//!   contributions past the target are rejected outright.
//!
//! Every investment recomputes every investor's share against the new pool
//! total. That is O(investors) per call; pools are small by construction
//! (one funding round over a handful of invoices), so this is a documented
//! scaling bound, not a defect.

use crate::{
    error::{Error, Result},
    registry::require_admin,
    storage::Storage,
    types::{
        bps_floor, Address, Amount, EngineEvent, EventRecord, Investment, InvoiceId,
        InvoiceStatus, PoolId, PoolStatus, WITHDRAW_THRESHOLD_BPS,
    },
};
use chrono::Utc;

/// Contribute capital to an open pool
///
/// Upserts the caller's (pool, investor) record, recomputes all share
/// percentages, and auto-distributes to every invoice if this contribution
/// reaches the funding target exactly.
pub fn invest(
    storage: &Storage,
    pool_id: PoolId,
    caller: &Address,
    amount: Amount,
) -> Result<Vec<EventRecord>> {
    if !storage.is_registered_investor(caller)? {
        return Err(Error::Unauthorized(format!(
            "{} is not a registered investor",
            caller
        )));
    }

    let mut pool = match storage.get_pool(pool_id) {
        Ok(pool) => pool,
        Err(Error::NotFound(_)) => {
            return Err(Error::InvalidState(format!("pool {} is not open", pool_id)))
        }
        Err(e) => return Err(e),
    };
    if pool.status != PoolStatus::Open {
        return Err(Error::InvalidState(format!("pool {} is not open", pool_id)));
    }

    if amount == 0 {
        return Err(Error::InvalidAmount(
            "investment amount must be positive".to_string(),
        ));
    }
    if amount > pool.remaining_capacity() {
        return Err(Error::InvalidAmount(format!(
            "amount {} exceeds remaining funding capacity {}",
            amount,
            pool.remaining_capacity()
        )));
    }

    pool.amount_invested += amount;

    // Upsert the caller's position, then recompute every share against the
    // new pool total. Floor rounding keeps the share sum <= 10000 bps.
    let mut investments = storage.pool_investments(pool_id)?;
    match investments.iter_mut().find(|i| &i.investor == caller) {
        Some(existing) => existing.amount += amount,
        None => investments.push(Investment {
            pool_id,
            investor: caller.clone(),
            amount,
            percentage_bps: 0,
            returns_claimed: false,
            created_at: Utc::now(),
        }),
    }
    for investment in &mut investments {
        investment.percentage_bps = bps_floor(investment.amount, pool.amount_invested);
    }

    let fully_funded = pool.amount_invested == pool.total_loan_amount;
    if fully_funded {
        pool.status = PoolStatus::Funded;
    }

    let mut txn = storage.begin()?;
    for investment in &investments {
        txn.put_investment(investment)?;
    }
    txn.put_pool(&pool, Some(PoolStatus::Open))?;
    txn.emit(EngineEvent::InvestmentMade {
        pool_id,
        investor: caller.clone(),
        amount,
    })?;

    if fully_funded {
        // Full funding means every invoice receives exactly its requested
        // loan; invoices that already withdrew at the 70% threshold are
        // topped up with whatever is still owed.
        let now = Utc::now();
        for &invoice_id in &pool.invoice_ids {
            let mut invoice = storage.get_invoice(invoice_id)?;
            let owed = invoice.loan_amount - invoice.amount_withdrawn;
            let prev = invoice.status;

            invoice.amount_invested = invoice.loan_amount;
            invoice.amount_withdrawn = invoice.loan_amount;
            if invoice.status == InvoiceStatus::InPool {
                invoice.status = InvoiceStatus::Withdrawn;
            }
            invoice.updated_at = now;
            txn.put_invoice(&invoice, Some(prev))?;

            if owed > 0 {
                txn.emit(EngineEvent::FundsWithdrawn {
                    invoice_id,
                    exporter: invoice.exporter.clone(),
                    amount: owed,
                })?;
            }
        }
    }

    let events = txn.commit()?;

    tracing::info!(
        pool_id,
        investor = %caller,
        amount,
        total_invested = pool.amount_invested,
        fully_funded,
        "Investment recorded"
    );
    Ok(events)
}

/// Earmark raised pool capital toward one invoice (admin only)
///
/// Manual distribution path that lets an invoice reach the 70% withdrawal
/// threshold before the whole pool is funded. Does not change the pool's
/// aggregate `amount_invested`: the pool ledger tracks investor capital,
/// this tracks where the admin directed it. Earmarks can never exceed the
/// capital actually raised, nor an invoice's requested loan.
pub fn distribute_to_invoice(
    storage: &Storage,
    admin: &Address,
    caller: &Address,
    pool_id: PoolId,
    invoice_id: InvoiceId,
    amount: Amount,
) -> Result<Vec<EventRecord>> {
    require_admin(admin, caller)?;

    let pool = storage.get_pool(pool_id)?;
    if pool.status != PoolStatus::Open {
        return Err(Error::InvalidState(format!(
            "pool {} is no longer accepting manual distribution",
            pool_id
        )));
    }

    let mut invoice = storage.get_invoice(invoice_id)?;
    if invoice.pool_id != Some(pool_id) {
        return Err(Error::InvalidState(format!(
            "invoice {} does not belong to pool {}",
            invoice_id, pool_id
        )));
    }
    if invoice.status != InvoiceStatus::InPool {
        return Err(Error::InvalidState(format!(
            "invoice {} is not awaiting funding",
            invoice_id
        )));
    }

    if amount == 0 {
        return Err(Error::InvalidAmount(
            "distribution amount must be positive".to_string(),
        ));
    }
    // Subtraction-based caps: `amount` is caller-supplied and may be
    // arbitrarily large, so the sums must never be formed. Earmarks never
    // exceed the loan amount or raised capital, so neither difference
    // underflows.
    if amount > invoice.loan_amount - invoice.amount_invested {
        return Err(Error::InvalidAmount(format!(
            "distribution would exceed invoice {} loan amount",
            invoice_id
        )));
    }

    let mut earmarked: Amount = 0;
    for &id in &pool.invoice_ids {
        earmarked += storage.get_invoice(id)?.amount_invested;
    }
    if amount > pool.amount_invested - earmarked {
        return Err(Error::InvalidAmount(format!(
            "distribution exceeds un-earmarked pool capital ({} of {} already earmarked)",
            earmarked, pool.amount_invested
        )));
    }

    let prev = invoice.status;
    invoice.amount_invested += amount;
    invoice.updated_at = Utc::now();

    let mut txn = storage.begin()?;
    txn.put_invoice(&invoice, Some(prev))?;
    let events = txn.commit()?;

    tracing::info!(
        pool_id,
        invoice_id,
        amount,
        earmarked = invoice.amount_invested,
        "Funds earmarked to invoice"
    );
    Ok(events)
}

/// Withdrawal eligibility for an invoice: `(eligible, withdrawable_amount)`
///
/// Eligible iff the invoice is pooled, not yet withdrawn, and its earmarked
/// investment is at or above 7000 bps of the requested loan.
pub fn can_withdraw(storage: &Storage, invoice_id: InvoiceId) -> Result<(bool, Amount)> {
    let invoice = storage.get_invoice(invoice_id)?;

    let eligible = invoice.status == InvoiceStatus::InPool
        && bps_floor(invoice.amount_invested, invoice.loan_amount) >= WITHDRAW_THRESHOLD_BPS;

    if eligible {
        Ok((true, invoice.withdrawable()))
    } else {
        Ok((false, 0))
    }
}

/// Release earmarked funds to the invoice's exporter
///
/// A second call fails deterministically: the first one moves the invoice
/// to `Withdrawn`, which is no longer eligible.
pub fn withdraw_funds(
    storage: &Storage,
    caller: &Address,
    invoice_id: InvoiceId,
) -> Result<(Amount, Vec<EventRecord>)> {
    let mut invoice = storage.get_invoice(invoice_id)?;
    if &invoice.exporter != caller {
        return Err(Error::Unauthorized(format!(
            "{} does not own invoice {}",
            caller, invoice_id
        )));
    }

    let (eligible, amount) = can_withdraw(storage, invoice_id)?;
    if !eligible {
        return Err(Error::CannotWithdrawYet(format!(
            "invoice {} is below the withdrawal threshold or already withdrawn",
            invoice_id
        )));
    }

    let prev = invoice.status;
    invoice.amount_withdrawn = invoice.amount_invested;
    invoice.status = InvoiceStatus::Withdrawn;
    invoice.updated_at = Utc::now();

    let mut txn = storage.begin()?;
    txn.put_invoice(&invoice, Some(prev))?;
    txn.emit(EngineEvent::FundsWithdrawn {
        invoice_id,
        exporter: caller.clone(),
        amount,
    })?;
    let events = txn.commit()?;

    tracing::info!(invoice_id, exporter = %caller, amount, "Funds withdrawn");
    Ok((amount, events))
}
