//! Property-based tests for engine invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Capital conservation: Σ(positions) == pool.amount_invested <= target
//! - Share soundness: floored shares never sum above 10,000 bps
//! - Payout bound: claims never exceed principal plus the yield pool
//! - Loan bound: a loan can never exceed its shipping amount

use chrono::Utc;
use ledger_engine::{
    funding, invoice, pool, registry, settlement,
    types::{bps_share, Amount, INVESTOR_YIELD_BPS, PLATFORM_FEE_BPS},
    Address, Config, Error, InvoiceDraft, InvoiceId, InvoiceStatus, PoolId, Storage,
};
use proptest::prelude::*;
use tempfile::TempDir;

const ADMIN: &str = "admin";
const TREASURY: &str = "treasury";

fn test_storage() -> (Storage, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    (Storage::open(&config).unwrap(), temp_dir)
}

fn draft(loan: Amount) -> InvoiceDraft {
    InvoiceDraft {
        exporter_company: "Acme Exports".to_string(),
        importer_company: "Borealis Imports".to_string(),
        importer_contact: "ops@borealis.example".to_string(),
        shipping_date: Utc::now(),
        shipping_amount: loan.saturating_mul(2),
        loan_amount: loan,
        document_ref: "doc".to_string(),
    }
}

/// Build an open pool from the given loan amounts
fn build_pool(storage: &Storage, loans: &[Amount]) -> (PoolId, Vec<InvoiceId>) {
    let admin = Address::new(ADMIN);
    let exporter = Address::new("exp-1");
    registry::register_exporter(storage, &exporter).unwrap();

    let mut ids = Vec::with_capacity(loans.len());
    for &loan in loans {
        let (id, _) = invoice::create_invoice(storage, &exporter, draft(loan)).unwrap();
        invoice::approve_invoice(storage, &admin, &admin, id).unwrap();
        ids.push(id);
    }

    let now = Utc::now();
    let (pool_id, _) = pool::create_pool(
        storage,
        &admin,
        &admin,
        "pool".to_string(),
        ids.clone(),
        now,
        now + chrono::Duration::days(30),
    )
    .unwrap();
    (pool_id, ids)
}

/// Register `n` investors named inv-0..inv-n
fn investors(storage: &Storage, n: usize) -> Vec<Address> {
    (0..n)
        .map(|i| {
            let addr = Address::new(format!("inv-{}", i));
            registry::register_investor(storage, &addr).unwrap();
            addr
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Capital conservation and share soundness hold under any sequence
    /// of contributions
    #[test]
    fn prop_contributions_conserve_capital(
        loans in prop::collection::vec(1_000u64..1_000_000_000, 1..4),
        contributions in prop::collection::vec((0usize..4, 1u64..600_000_000), 1..10),
    ) {
        let (storage, _tmp) = test_storage();
        let (pool_id, _) = build_pool(&storage, &loans);
        let investors = investors(&storage, 4);

        let target: Amount = loans.iter().sum();
        let mut applied: Amount = 0;
        for (who, amount) in contributions {
            let remaining = target - applied;
            if remaining == 0 {
                break;
            }
            let amount = amount.min(remaining);
            funding::invest(&storage, pool_id, &investors[who], amount).unwrap();
            applied += amount;
        }

        let pool = storage.get_pool(pool_id).unwrap();
        prop_assert_eq!(pool.amount_invested, applied);
        prop_assert!(pool.amount_invested <= target);

        let positions = storage.pool_investments(pool_id).unwrap();
        let position_sum: Amount = positions.iter().map(|p| p.amount).sum();
        prop_assert_eq!(position_sum, pool.amount_invested);

        // Floored shares lose at most one bps per investor and never
        // overshoot the whole
        let share_sum: u64 = positions.iter().map(|p| p.percentage_bps).sum();
        prop_assert!(share_sum <= 10_000);
        if pool.amount_invested == target {
            prop_assert!(share_sum >= 10_000 - positions.len() as u64);
        }
    }

    /// A fully funded, repaid, and settled pool never pays out more than
    /// principal plus the earmarked yield
    #[test]
    fn prop_settlement_payout_bounded(
        loan in 10_000u64..1_000_000_000,
        splits in prop::collection::vec(1u64..400_000_000, 1..5),
    ) {
        let (storage, _tmp) = test_storage();
        let admin = Address::new(ADMIN);
        let treasury = Address::new(TREASURY);
        let (pool_id, invoice_ids) = build_pool(&storage, &[loan]);
        let investors = investors(&storage, splits.len());

        // Apply splits clamped to the target, then top up to full funding
        let mut applied: Amount = 0;
        for (who, amount) in splits.iter().enumerate() {
            let remaining = loan - applied;
            if remaining == 0 {
                break;
            }
            let amount = (*amount).min(remaining);
            funding::invest(&storage, pool_id, &investors[who], amount).unwrap();
            applied += amount;
        }
        if applied < loan {
            funding::invest(&storage, pool_id, &investors[0], loan - applied).unwrap();
        }

        // Full funding auto-released every loan
        for &id in &invoice_ids {
            let inv = storage.get_invoice(id).unwrap();
            prop_assert_eq!(inv.status, InvoiceStatus::Withdrawn);
            prop_assert_eq!(inv.amount_withdrawn, inv.loan_amount);
            settlement::mark_invoice_paid(&storage, &admin, &admin, id).unwrap();
        }

        let (fee, _) =
            settlement::distribute_profits(&storage, &admin, &treasury, &admin, pool_id).unwrap();
        prop_assert_eq!(fee, bps_share(loan, PLATFORM_FEE_BPS));

        let yield_pool = bps_share(loan, INVESTOR_YIELD_BPS);
        let mut payout_sum: Amount = 0;
        for position in storage.pool_investments(pool_id).unwrap() {
            let (payout, _) =
                settlement::claim_returns(&storage, &position.investor, pool_id).unwrap();
            // Every investor gets at least their principal back
            prop_assert!(payout >= position.amount);
            payout_sum += payout;
        }
        prop_assert!(payout_sum <= loan + yield_pool);

        // The event log stayed gapless through the whole lifecycle
        let latest = storage.latest_event_seq().unwrap();
        let events = storage.events_since(1).unwrap();
        prop_assert_eq!(events.len() as u64, latest);
        for (i, record) in events.iter().enumerate() {
            prop_assert_eq!(record.sequence, i as u64 + 1);
        }
    }

    /// An invoice loan above the shipping amount is always rejected, at
    /// or below it always accepted
    #[test]
    fn prop_loan_never_exceeds_shipping(
        shipping in 1u64..1_000_000_000,
        excess in 1u64..1_000_000,
    ) {
        let (storage, _tmp) = test_storage();
        let exporter = Address::new("exp-1");
        registry::register_exporter(&storage, &exporter).unwrap();

        let mut over = draft(shipping);
        over.shipping_amount = shipping;
        over.loan_amount = shipping + excess;
        let err = invoice::create_invoice(&storage, &exporter, over).unwrap_err();
        prop_assert!(matches!(err, Error::InvalidAmount(_)));

        let mut at = draft(shipping);
        at.shipping_amount = shipping;
        at.loan_amount = shipping;
        prop_assert!(invoice::create_invoice(&storage, &exporter, at).is_ok());
    }
}
