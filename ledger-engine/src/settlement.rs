//! Settlement engine: repayment attestation, profit distribution, claims
//!
//! Settlement accounting is deliberately split from investor payout:
//! `distribute_profits` pays the platform fee and earmarks the yield pool
//! in one bounded call, and each investor claims their own share with
//! `claim_returns`. Pushing every payout in one call would grow without
//! bound as investor count grows.

use crate::{
    error::{Error, Result},
    registry::require_admin,
    storage::Storage,
    types::{
        bps_share, Address, Amount, EngineEvent, EventRecord, InvoiceId, InvoiceStatus, PoolId,
        PoolStatus, INVESTOR_YIELD_BPS, PLATFORM_FEE_BPS,
    },
};
use chrono::Utc;

/// Record an importer's off-chain repayment (admin only)
///
/// The engine trusts the admin's attestation; it does not verify the
/// external payment itself.
pub fn mark_invoice_paid(
    storage: &Storage,
    admin: &Address,
    caller: &Address,
    invoice_id: InvoiceId,
) -> Result<Vec<EventRecord>> {
    require_admin(admin, caller)?;

    let mut invoice = storage.get_invoice(invoice_id)?;
    if invoice.status != InvoiceStatus::Withdrawn {
        return Err(Error::InvalidState(format!(
            "invoice {} has not been withdrawn",
            invoice_id
        )));
    }

    let prev = invoice.status;
    invoice.status = InvoiceStatus::Paid;
    invoice.updated_at = Utc::now();

    let mut txn = storage.begin()?;
    txn.put_invoice(&invoice, Some(prev))?;
    txn.emit(EngineEvent::InvoicePaid { invoice_id })?;
    let events = txn.commit()?;

    tracing::info!(invoice_id, "Invoice marked paid");
    Ok(events)
}

/// Settle a pool whose invoices are all repaid (admin only)
///
/// Pays the 1% platform fee to the treasury and completes the pool and its
/// invoices. The 4% investor yield is not pushed here; it stays earmarked
/// for individual `claim_returns` calls.
pub fn distribute_profits(
    storage: &Storage,
    admin: &Address,
    treasury: &Address,
    caller: &Address,
    pool_id: PoolId,
) -> Result<(Amount, Vec<EventRecord>)> {
    require_admin(admin, caller)?;

    let mut pool = storage.get_pool(pool_id)?;
    if matches!(pool.status, PoolStatus::Completed | PoolStatus::Cancelled) {
        return Err(Error::InvalidState(format!(
            "pool {} is already settled",
            pool_id
        )));
    }

    let mut invoices = Vec::with_capacity(pool.invoice_ids.len());
    for &id in &pool.invoice_ids {
        let invoice = storage.get_invoice(id)?;
        if invoice.status != InvoiceStatus::Paid {
            return Err(Error::NotAllInvoicesPaid(format!(
                "invoice {} in pool {} is not paid",
                id, pool_id
            )));
        }
        invoices.push(invoice);
    }

    let fee = bps_share(pool.total_loan_amount, PLATFORM_FEE_BPS);
    let prev = pool.status;
    pool.fee_paid = fee;
    pool.status = PoolStatus::Completed;

    let mut txn = storage.begin()?;
    let now = Utc::now();
    for mut invoice in invoices {
        let prev = invoice.status;
        invoice.status = InvoiceStatus::Completed;
        invoice.updated_at = now;
        txn.put_invoice(&invoice, Some(prev))?;
    }
    txn.put_pool(&pool, Some(prev))?;
    txn.emit(EngineEvent::ProfitsDistributed { pool_id, fee })?;
    let events = txn.commit()?;

    tracing::info!(
        pool_id,
        fee,
        treasury = %treasury,
        yield_pool = bps_share(pool.total_loan_amount, INVESTOR_YIELD_BPS),
        "Profits distributed"
    );
    Ok((fee, events))
}

/// Claim principal plus proportional yield from a settled pool
///
/// Idempotent by construction: the claimed flag makes a second call fail
/// with `AlreadyClaimed`, never double-pay.
pub fn claim_returns(
    storage: &Storage,
    caller: &Address,
    pool_id: PoolId,
) -> Result<(Amount, Vec<EventRecord>)> {
    let pool = storage.get_pool(pool_id)?;
    if pool.status != PoolStatus::Completed {
        return Err(Error::InvalidState(format!(
            "pool {} has not completed settlement",
            pool_id
        )));
    }

    let mut investment = storage
        .get_investment(pool_id, caller)?
        .ok_or_else(|| Error::NotFound(format!("no investment by {} in pool {}", caller, pool_id)))?;
    if investment.returns_claimed {
        return Err(Error::AlreadyClaimed(format!(
            "{} already claimed returns from pool {}",
            caller, pool_id
        )));
    }

    let yield_pool = bps_share(pool.total_loan_amount, INVESTOR_YIELD_BPS);
    let payout = investment.amount + bps_share(yield_pool, investment.percentage_bps);

    investment.returns_claimed = true;

    let mut txn = storage.begin()?;
    txn.put_investment(&investment)?;
    txn.emit(EngineEvent::ReturnsClaimed {
        pool_id,
        investor: caller.clone(),
        amount: payout,
    })?;
    let events = txn.commit()?;

    tracing::info!(pool_id, investor = %caller, payout, "Returns claimed");
    Ok((payout, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::invest;
    use crate::invoice::{approve_invoice, create_invoice, InvoiceDraft};
    use crate::pool::create_pool;
    use crate::registry::{register_exporter, register_investor};
    use crate::Config;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    /// One-invoice pool, fully funded (invoice auto-withdrawn)
    fn funded_pool(storage: &Storage, admin: &Address, loan: Amount) -> (PoolId, InvoiceId) {
        let exporter = Address::new("exp-1");
        if !storage.is_registered_exporter(&exporter).unwrap() {
            register_exporter(storage, &exporter).unwrap();
        }
        let (invoice_id, _) = create_invoice(
            storage,
            &exporter,
            InvoiceDraft {
                exporter_company: "Acme Exports".to_string(),
                importer_company: "Borealis Imports".to_string(),
                importer_contact: "ops@borealis.example".to_string(),
                shipping_date: Utc::now(),
                shipping_amount: loan * 2,
                loan_amount: loan,
                document_ref: "doc".to_string(),
            },
        )
        .unwrap();
        approve_invoice(storage, admin, admin, invoice_id).unwrap();
        let now = Utc::now();
        let (pool_id, _) = create_pool(
            storage,
            admin,
            admin,
            "pool".to_string(),
            vec![invoice_id],
            now,
            now + chrono::Duration::days(30),
        )
        .unwrap();

        let investor = Address::new("inv-1");
        if !storage.is_registered_investor(&investor).unwrap() {
            register_investor(storage, &investor).unwrap();
        }
        invest(storage, pool_id, &investor, loan).unwrap();
        (pool_id, invoice_id)
    }

    #[test]
    fn test_mark_paid_requires_withdrawn() {
        let (storage, _tmp) = test_storage();
        let admin = Address::new("admin");
        let exporter = Address::new("exp-1");
        register_exporter(&storage, &exporter).unwrap();
        let (invoice_id, _) = create_invoice(
            &storage,
            &exporter,
            InvoiceDraft {
                exporter_company: "Acme Exports".to_string(),
                importer_company: "Borealis Imports".to_string(),
                importer_contact: "ops@borealis.example".to_string(),
                shipping_date: Utc::now(),
                shipping_amount: 200,
                loan_amount: 100,
                document_ref: "doc".to_string(),
            },
        )
        .unwrap();

        let err = mark_invoice_paid(&storage, &admin, &admin, invoice_id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_mark_paid() {
        let (storage, _tmp) = test_storage();
        let admin = Address::new("admin");
        let (_, invoice_id) = funded_pool(&storage, &admin, 1_000_000);

        mark_invoice_paid(&storage, &admin, &admin, invoice_id).unwrap();
        assert_eq!(
            storage.get_invoice(invoice_id).unwrap().status,
            InvoiceStatus::Paid
        );

        // Forward-only: cannot mark twice
        let err = mark_invoice_paid(&storage, &admin, &admin, invoice_id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_distribute_profits_requires_all_paid() {
        let (storage, _tmp) = test_storage();
        let admin = Address::new("admin");
        let treasury = Address::new("treasury");
        let (pool_id, _) = funded_pool(&storage, &admin, 1_000_000);

        let err =
            distribute_profits(&storage, &admin, &treasury, &admin, pool_id).unwrap_err();
        assert!(matches!(err, Error::NotAllInvoicesPaid(_)));
    }

    #[test]
    fn test_distribute_profits() {
        let (storage, _tmp) = test_storage();
        let admin = Address::new("admin");
        let treasury = Address::new("treasury");
        let (pool_id, invoice_id) = funded_pool(&storage, &admin, 10_000_000);
        mark_invoice_paid(&storage, &admin, &admin, invoice_id).unwrap();

        let (fee, events) =
            distribute_profits(&storage, &admin, &treasury, &admin, pool_id).unwrap();
        assert_eq!(fee, 100_000); // 1% of 10,000,000

        let pool = storage.get_pool(pool_id).unwrap();
        assert_eq!(pool.status, PoolStatus::Completed);
        assert_eq!(pool.fee_paid, 100_000);
        assert_eq!(
            storage.get_invoice(invoice_id).unwrap().status,
            InvoiceStatus::Completed
        );
        assert!(matches!(
            events[0].event,
            EngineEvent::ProfitsDistributed { fee: 100_000, .. }
        ));

        // Second settlement rejected
        let err =
            distribute_profits(&storage, &admin, &treasury, &admin, pool_id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_claim_returns_sole_investor() {
        let (storage, _tmp) = test_storage();
        let admin = Address::new("admin");
        let treasury = Address::new("treasury");
        let investor = Address::new("inv-1");
        let (pool_id, invoice_id) = funded_pool(&storage, &admin, 10_000_000);
        mark_invoice_paid(&storage, &admin, &admin, invoice_id).unwrap();
        distribute_profits(&storage, &admin, &treasury, &admin, pool_id).unwrap();

        // Principal 10,000,000 + 4% yield at 10,000 bps share
        let (payout, _) = claim_returns(&storage, &investor, pool_id).unwrap();
        assert_eq!(payout, 10_400_000);

        // Claim flag flips exactly once
        let err = claim_returns(&storage, &investor, pool_id).unwrap_err();
        assert!(matches!(err, Error::AlreadyClaimed(_)));
    }

    #[test]
    fn test_claim_before_completion_rejected() {
        let (storage, _tmp) = test_storage();
        let admin = Address::new("admin");
        let investor = Address::new("inv-1");
        let (pool_id, _) = funded_pool(&storage, &admin, 1_000_000);

        let err = claim_returns(&storage, &investor, pool_id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_claim_by_non_investor_rejected() {
        let (storage, _tmp) = test_storage();
        let admin = Address::new("admin");
        let treasury = Address::new("treasury");
        let (pool_id, invoice_id) = funded_pool(&storage, &admin, 1_000_000);
        mark_invoice_paid(&storage, &admin, &admin, invoice_id).unwrap();
        distribute_profits(&storage, &admin, &treasury, &admin, pool_id).unwrap();

        let err = claim_returns(&storage, &Address::new("bystander"), pool_id).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_proportional_yield_split() {
        let (storage, _tmp) = test_storage();
        let admin = Address::new("admin");
        let treasury = Address::new("treasury");
        let exporter = Address::new("exp-1");
        register_exporter(&storage, &exporter).unwrap();
        let (invoice_id, _) = create_invoice(
            &storage,
            &exporter,
            InvoiceDraft {
                exporter_company: "Acme Exports".to_string(),
                importer_company: "Borealis Imports".to_string(),
                importer_contact: "ops@borealis.example".to_string(),
                shipping_date: Utc::now(),
                shipping_amount: 20_000_000,
                loan_amount: 10_000_000,
                document_ref: "doc".to_string(),
            },
        )
        .unwrap();
        approve_invoice(&storage, &admin, &admin, invoice_id).unwrap();
        let now = Utc::now();
        let (pool_id, _) = create_pool(
            &storage,
            &admin,
            &admin,
            "pool".to_string(),
            vec![invoice_id],
            now,
            now,
        )
        .unwrap();

        let alice = Address::new("inv-alice");
        let bob = Address::new("inv-bob");
        register_investor(&storage, &alice).unwrap();
        register_investor(&storage, &bob).unwrap();
        invest(&storage, pool_id, &alice, 7_500_000).unwrap();
        invest(&storage, pool_id, &bob, 2_500_000).unwrap();

        mark_invoice_paid(&storage, &admin, &admin, invoice_id).unwrap();
        distribute_profits(&storage, &admin, &treasury, &admin, pool_id).unwrap();

        // Yield pool is 400,000; alice holds 7500 bps, bob 2500 bps
        let (alice_payout, _) = claim_returns(&storage, &alice, pool_id).unwrap();
        let (bob_payout, _) = claim_returns(&storage, &bob, pool_id).unwrap();
        assert_eq!(alice_payout, 7_500_000 + 300_000);
        assert_eq!(bob_payout, 2_500_000 + 100_000);

        // Claims never exceed principal plus the whole yield pool
        assert!(alice_payout + bob_payout <= 10_000_000 + 400_000);
    }
}
