//! Receipt-ready record handed to the printing/export subsystem.
//!
//! Every resolved submission — online or offline — produces one of these.
//! The only differences between the two paths are the `offline` flag and
//! which id is populated: the authoritative order id, or the local queue id
//! standing in until the sale syncs.

use serde::Serialize;

use crate::totals::{CartLine, PaymentEntry, Totals};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub line_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptPayment {
    pub method: String,
    pub amount: f64,
    pub reference: Option<String>,
}

/// Normalized record of a resolved sale, the sole interface to the
/// out-of-scope printing subsystem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleReceipt {
    /// Authoritative order id, when the service confirmed directly.
    pub order_id: Option<i64>,
    /// Local queue id, when the sale was recorded offline.
    pub local_id: Option<i64>,
    pub offline: bool,
    pub lines: Vec<ReceiptLine>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub payments: Vec<ReceiptPayment>,
    pub total_paid: f64,
    pub change: f64,
    pub notes: Option<String>,
    /// ISO 8601 submission timestamp.
    pub created_at: String,
}

impl SaleReceipt {
    /// Assemble the receipt from the submission-time cart, payments and
    /// computed totals. Nothing here is ever re-derived from catalog data.
    pub(crate) fn assemble(
        lines: &[CartLine],
        payments: &[PaymentEntry],
        totals: &Totals,
        notes: Option<&str>,
        created_at: &str,
    ) -> Self {
        Self {
            order_id: None,
            local_id: None,
            offline: false,
            lines: lines
                .iter()
                .map(|l| ReceiptLine {
                    name: l.name.clone(),
                    quantity: l.quantity,
                    unit_price: l.base_price,
                    line_total: l.line_total(),
                })
                .collect(),
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            payments: payments
                .iter()
                .map(|p| ReceiptPayment {
                    method: p.method.clone(),
                    amount: p.amount,
                    reference: p.reference.clone(),
                })
                .collect(),
            total_paid: totals.total_paid,
            change: totals.change_due,
            notes: notes.map(str::to_string),
            created_at: created_at.to_string(),
        }
    }

    pub(crate) fn confirmed(mut self, order_id: Option<i64>) -> Self {
        self.order_id = order_id;
        self.offline = false;
        self
    }

    pub(crate) fn queued(mut self, local_id: i64) -> Self {
        self.local_id = Some(local_id);
        self.offline = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::totals::compute_totals;

    fn sample() -> (Vec<CartLine>, Vec<PaymentEntry>) {
        let lines = vec![CartLine {
            product_id: 1,
            name: "House Blend 250g".to_string(),
            quantity: 2.0,
            base_price: 10.0,
            display_price: 11.0,
            tax_rate: 10.0,
        }];
        let payments = vec![PaymentEntry::cash(22.0, 25.0)];
        (lines, payments)
    }

    #[test]
    fn test_receipt_carries_snapshot_figures() {
        let (lines, payments) = sample();
        let totals = compute_totals(&lines, &payments);

        let receipt = SaleReceipt::assemble(
            &lines,
            &payments,
            &totals,
            Some("regular customer"),
            "2026-08-05T10:15:00.000Z",
        )
        .confirmed(Some(9001));

        assert_eq!(receipt.order_id, Some(9001));
        assert_eq!(receipt.local_id, None);
        assert!(!receipt.offline);
        assert_eq!(receipt.lines.len(), 1);
        assert_eq!(receipt.lines[0].name, "House Blend 250g");
        assert!((receipt.lines[0].line_total - 20.0).abs() < 1e-9);
        assert!((receipt.total - 22.0).abs() < 1e-9);
        assert!((receipt.change - 3.0).abs() < 1e-9);
        assert_eq!(receipt.notes.as_deref(), Some("regular customer"));
    }

    #[test]
    fn test_queued_receipt_uses_local_id_placeholder() {
        let (lines, payments) = sample();
        let totals = compute_totals(&lines, &payments);

        let receipt = SaleReceipt::assemble(&lines, &payments, &totals, None, "t").queued(4);

        assert!(receipt.offline);
        assert_eq!(receipt.local_id, Some(4));
        assert_eq!(receipt.order_id, None);
    }
}
