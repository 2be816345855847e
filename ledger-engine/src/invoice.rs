//! Invoice lifecycle: creation, approval, rejection
//!
//! Status machine (strictly forward-moving):
//! `Pending → Approved → InPool → Withdrawn → Paid → Completed`, with a
//! terminal `Rejected` branch from `Pending`. Invoices are never deleted.

use crate::{
    error::{Error, Result},
    registry::require_admin,
    storage::Storage,
    types::{Address, Amount, EngineEvent, EventRecord, Invoice, InvoiceId, InvoiceStatus},
};
use chrono::{DateTime, Utc};

/// Caller-supplied invoice fields
#[derive(Debug, Clone)]
pub struct InvoiceDraft {
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
    /// Requested loan amount (cents)
    pub loan_amount: Amount,
    /// Off-chain document reference
    pub document_ref: String,
}

/// Create a new invoice for a registered exporter
pub fn create_invoice(
    storage: &Storage,
    caller: &Address,
    draft: InvoiceDraft,
) -> Result<(InvoiceId, Vec<EventRecord>)> {
    if !storage.is_registered_exporter(caller)? {
        return Err(Error::Unauthorized(format!(
            "{} is not a registered exporter",
            caller
        )));
    }
    if draft.shipping_amount == 0 || draft.loan_amount == 0 {
        return Err(Error::InvalidAmount(
            "shipping and loan amounts must be positive".to_string(),
        ));
    }
    if draft.loan_amount > draft.shipping_amount {
        return Err(Error::InvalidAmount(format!(
            "loan amount {} exceeds shipping amount {}",
            draft.loan_amount, draft.shipping_amount
        )));
    }

    let mut txn = storage.begin()?;
    let id = txn.alloc_invoice_id();
    let now = Utc::now();

    let invoice = Invoice {
        id,
        exporter: caller.clone(),
        exporter_company: draft.exporter_company,
        importer_company: draft.importer_company,
        importer_contact: draft.importer_contact,
        shipping_date: draft.shipping_date,
        shipping_amount: draft.shipping_amount,
        loan_amount: draft.loan_amount,
        document_ref: draft.document_ref,
        amount_invested: 0,
        amount_withdrawn: 0,
        pool_id: None,
        status: InvoiceStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    txn.put_invoice(&invoice, None)?;
    txn.emit(EngineEvent::InvoiceCreated {
        invoice_id: id,
        exporter: caller.clone(),
    })?;
    let events = txn.commit()?;

    tracing::info!(
        invoice_id = id,
        exporter = %caller,
        loan_amount = invoice.loan_amount,
        "Invoice created"
    );
    Ok((id, events))
}

/// Approve a pending invoice (admin only)
pub fn approve_invoice(
    storage: &Storage,
    admin: &Address,
    caller: &Address,
    id: InvoiceId,
) -> Result<Vec<EventRecord>> {
    review_invoice(storage, admin, caller, id, InvoiceStatus::Approved)
}

/// Reject a pending invoice (admin only, terminal)
pub fn reject_invoice(
    storage: &Storage,
    admin: &Address,
    caller: &Address,
    id: InvoiceId,
) -> Result<Vec<EventRecord>> {
    review_invoice(storage, admin, caller, id, InvoiceStatus::Rejected)
}

fn review_invoice(
    storage: &Storage,
    admin: &Address,
    caller: &Address,
    id: InvoiceId,
    verdict: InvoiceStatus,
) -> Result<Vec<EventRecord>> {
    require_admin(admin, caller)?;

    let mut invoice = storage.get_invoice(id)?;
    if invoice.status != InvoiceStatus::Pending {
        return Err(Error::InvalidState(format!(
            "invoice {} is not pending review",
            id
        )));
    }

    let prev = invoice.status;
    invoice.status = verdict;
    invoice.updated_at = Utc::now();

    let mut txn = storage.begin()?;
    txn.put_invoice(&invoice, Some(prev))?;
    txn.emit(match verdict {
        InvoiceStatus::Approved => EngineEvent::InvoiceApproved {
            invoice_id: id,
            admin: caller.clone(),
        },
        _ => EngineEvent::InvoiceRejected {
            invoice_id: id,
            admin: caller.clone(),
        },
    })?;
    let events = txn.commit()?;

    tracing::info!(invoice_id = id, status = ?verdict, "Invoice reviewed");
    Ok(events)
}
