//! Sale submission coordinator.
//!
//! Takes a finalized cart + payment set through validate → decide →
//! direct-submit | enqueue → resolved. Callers get the same receipt shape on
//! every successful path; only the `offline` flag and the id kind differ.
//!
//! Outcome mapping per submission attempt:
//! - offline (or transport-indeterminate direct submit): sale is queued
//!   locally and resolves as an offline success — the sale is never lost to
//!   a flaky link.
//! - explicit business rejection: resolves as an error, nothing recorded.
//! - local storage failure: resolves as an error the operator must see,
//!   since the sale is not recorded anywhere.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{SaleRequest, TransactionBackend};
use crate::connectivity::ConnectivityMonitor;
use crate::error::SubmitError;
use crate::receipt::SaleReceipt;
use crate::store::{OfflineStore, SaleSnapshot};
use crate::totals::{compute_totals, validate_submission, CartLine, PaymentEntry, Totals};

/// A finalized sale as handed over by the register UI: account, cart lines,
/// split payments, optional note.
#[derive(Debug, Clone)]
pub struct SaleDraft {
    pub account_id: i64,
    pub lines: Vec<CartLine>,
    pub payments: Vec<PaymentEntry>,
    pub notes: Option<String>,
}

pub struct SaleCoordinator {
    store: Arc<OfflineStore>,
    backend: Arc<dyn TransactionBackend>,
    connectivity: Arc<ConnectivityMonitor>,
}

impl SaleCoordinator {
    pub fn new(
        store: Arc<OfflineStore>,
        backend: Arc<dyn TransactionBackend>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            store,
            backend,
            connectivity,
        }
    }

    /// Submit a finalized sale.
    ///
    /// Validation runs before any I/O. The durable snapshot — including the
    /// idempotency token and all monetary figures — is frozen here and is
    /// what both the direct call and any later replay transmit.
    pub async fn submit(&self, draft: &SaleDraft) -> Result<SaleReceipt, SubmitError> {
        let totals = compute_totals(&draft.lines, &draft.payments);
        validate_submission(&draft.lines, &draft.payments, &totals)?;

        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let snapshot = build_snapshot(draft, &totals, &created_at);
        let receipt = SaleReceipt::assemble(
            &draft.lines,
            &draft.payments,
            &totals,
            draft.notes.as_deref(),
            &created_at,
        );

        if !self.connectivity.is_online() {
            return self.enqueue(&snapshot, receipt);
        }

        let request = SaleRequest::from_snapshot(&snapshot);
        match self.backend.submit_sale(&request).await {
            Ok(resp) if resp.success => {
                info!(
                    order_id = ?resp.order_id,
                    total = totals.total,
                    "Sale confirmed by transaction service"
                );
                Ok(receipt.confirmed(resp.order_id))
            }
            Ok(resp) => {
                info!(message = %resp.message, "Sale rejected by transaction service");
                Err(SubmitError::RemoteRejected(resp.message))
            }
            Err(e) => {
                // Indeterminate: the service may or may not have applied the
                // sale. Queue it — the idempotency token lets the service
                // deduplicate the replay.
                warn!("Indeterminate submission outcome ({e}); saving sale offline");
                self.enqueue(&snapshot, receipt)
            }
        }
    }

    fn enqueue(
        &self,
        snapshot: &SaleSnapshot,
        receipt: SaleReceipt,
    ) -> Result<SaleReceipt, SubmitError> {
        let local_id = self.store.enqueue_sale(snapshot)?;
        Ok(receipt.queued(local_id))
    }
}

fn build_snapshot(draft: &SaleDraft, totals: &Totals, created_at: &str) -> SaleSnapshot {
    SaleSnapshot {
        account_id: draft.account_id,
        cart: draft.lines.iter().map(CartLine::snapshot).collect(),
        payments: draft.payments.iter().map(PaymentEntry::snapshot).collect(),
        notes: draft.notes.clone(),
        subtotal: totals.subtotal,
        tax: totals.tax,
        total: totals.total,
        total_tendered: totals.total_tendered,
        client_request_id: Uuid::new_v4().to_string(),
        created_at: created_at.to_string(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
