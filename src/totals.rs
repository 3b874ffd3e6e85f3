//! Cart and payment computation engine.
//!
//! Pure arithmetic over a cart and a set of split payments: per-line totals,
//! subtotal, tax, grand total, total paid, and cash change. No I/O. The same
//! functions back both the live UI preview and the authoritative snapshot
//! written into a queued sale, so results must be deterministic and
//! rerunnable.

use serde::{Deserialize, Serialize};

use crate::error::SubmitError;

/// Rounding tolerance when comparing the cart total against the sum of
/// payments. One cent.
pub const BALANCE_EPSILON: f64 = 0.01;

// ---------------------------------------------------------------------------
// Cart and payment shapes
// ---------------------------------------------------------------------------

/// One cart line as built at the register: a priced product snapshot plus a
/// quantity. `base_price` is tax-exclusive; `display_price` is the
/// tax-inclusive shelf price shown to the customer. Quantities are whole
/// numbers for unit goods and fractional for measured goods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub name: String,
    pub quantity: f64,
    pub base_price: f64,
    pub display_price: f64,
    pub tax_rate: f64,
}

impl CartLine {
    /// Tax-exclusive line total.
    pub fn line_total(&self) -> f64 {
        self.base_price * self.quantity
    }

    /// The durable/wire form of this line. Pricing fields are frozen here so
    /// later catalog changes can never alter a recorded sale.
    pub fn snapshot(&self) -> CartItem {
        CartItem {
            product_id: self.product_id,
            quantity: self.quantity,
            price: self.display_price,
            base_price: self.base_price,
            tax_rate: self.tax_rate,
        }
    }
}

/// Durable cart snapshot entry. This layout is the persistence and wire
/// contract for queued sales; field names must stay stable across client
/// upgrades so older queued rows remain readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    pub quantity: f64,
    pub price: f64,
    pub base_price: f64,
    pub tax_rate: f64,
}

/// One payment toward a sale. `tendered` is set for cash payments only and
/// must be at least `amount`; the applied `amount` never exceeds the
/// outstanding balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub method: String,
    pub amount: f64,
    pub tendered: Option<f64>,
    pub reference: Option<String>,
}

impl PaymentEntry {
    pub fn cash(amount: f64, tendered: f64) -> Self {
        Self {
            method: "Cash".to_string(),
            amount,
            tendered: Some(tendered),
            reference: None,
        }
    }

    pub fn card(method: &str, amount: f64, reference: Option<&str>) -> Self {
        Self {
            method: method.to_string(),
            amount,
            tendered: None,
            reference: reference.map(str::to_string),
        }
    }

    /// Change owed for this entry. Zero for non-cash entries, which carry no
    /// tendered figure.
    pub fn change_due(&self) -> f64 {
        self.tendered
            .map(|t| (t - self.amount).max(0.0))
            .unwrap_or(0.0)
    }

    /// The durable/wire form of this payment.
    pub fn snapshot(&self) -> PaymentRecord {
        PaymentRecord {
            amount: self.amount,
            method: self.method.clone(),
            reference: self.reference.clone(),
        }
    }
}

/// Durable payment snapshot entry ({amount, method, reference}).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub amount: f64,
    pub method: String,
    pub reference: Option<String>,
}

/// Derived monetary figures for one cart + payment set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Totals {
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub total_paid: f64,
    pub total_tendered: f64,
    pub change_due: f64,
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

/// Compute all derived figures for a cart and payment set.
///
/// `subtotal = Σ base_price × quantity`, `tax = Σ line_total × rate/100`,
/// `total = subtotal + tax`, `total_paid = Σ amount`. Cash entries
/// contribute their tendered figure to `total_tendered` and
/// `max(0, tendered − amount)` to `change_due`.
pub fn compute_totals(lines: &[CartLine], payments: &[PaymentEntry]) -> Totals {
    let subtotal: f64 = lines.iter().map(CartLine::line_total).sum();
    let tax: f64 = lines
        .iter()
        .map(|l| l.line_total() * (l.tax_rate / 100.0))
        .sum();
    let total = subtotal + tax;

    let total_paid: f64 = payments.iter().map(|p| p.amount).sum();
    let total_tendered: f64 = payments.iter().map(|p| p.tendered.unwrap_or(p.amount)).sum();
    let change_due: f64 = payments.iter().map(PaymentEntry::change_due).sum();

    Totals {
        subtotal,
        tax,
        total,
        total_paid,
        total_tendered,
        change_due,
    }
}

/// Check whether a sale is permitted to leave the register.
///
/// Requires a positive total, at least one payment, payments balancing the
/// total within [`BALANCE_EPSILON`], non-negative quantities and amounts,
/// and `tendered >= amount` on every cash entry. Runs before any I/O; a
/// failure here means nothing was recorded or transmitted.
pub fn validate_submission(
    lines: &[CartLine],
    payments: &[PaymentEntry],
    totals: &Totals,
) -> Result<(), SubmitError> {
    if let Some(line) = lines.iter().find(|l| l.quantity < 0.0) {
        return Err(SubmitError::Validation(format!(
            "negative quantity for product {}",
            line.product_id
        )));
    }
    if payments.is_empty() {
        return Err(SubmitError::Validation(
            "at least one payment is required".to_string(),
        ));
    }
    if let Some(payment) = payments.iter().find(|p| p.amount < 0.0) {
        return Err(SubmitError::Validation(format!(
            "negative payment amount for method {}",
            payment.method
        )));
    }
    if let Some(payment) = payments
        .iter()
        .find(|p| p.tendered.is_some_and(|t| t < p.amount))
    {
        return Err(SubmitError::Validation(format!(
            "tendered {:.2} is less than applied amount {:.2}",
            payment.tendered.unwrap_or(0.0),
            payment.amount
        )));
    }
    if totals.total <= 0.0 {
        return Err(SubmitError::Validation(
            "sale total must be greater than zero".to_string(),
        ));
    }
    if (totals.total - totals.total_paid).abs() >= BALANCE_EPSILON {
        return Err(SubmitError::Validation(format!(
            "payments {:.2} do not balance total {:.2}",
            totals.total_paid, totals.total
        )));
    }
    Ok(())
}

/// Amount a cash tender actually applies toward the sale: the lesser of the
/// tendered cash and the outstanding balance, never negative.
pub fn applied_cash_amount(total: f64, paid_before: f64, tendered: f64) -> f64 {
    let remaining = total - paid_before;
    tendered.min(remaining).max(0.0)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: i64, base_price: f64, qty: f64, tax_rate: f64) -> CartLine {
        CartLine {
            product_id,
            name: format!("Product {product_id}"),
            quantity: qty,
            base_price,
            display_price: base_price * (1.0 + tax_rate / 100.0),
            tax_rate,
        }
    }

    #[test]
    fn test_reference_scenario_cash_sale() {
        // cart = [{price 10.00, qty 2, tax 10%}], one cash payment tendered 25.00
        let lines = vec![line(1, 10.0, 2.0, 10.0)];
        let applied = applied_cash_amount(22.0, 0.0, 25.0);
        assert!((applied - 22.0).abs() < 1e-9);

        let payments = vec![PaymentEntry::cash(applied, 25.0)];
        let totals = compute_totals(&lines, &payments);

        assert!((totals.subtotal - 20.0).abs() < 1e-9);
        assert!((totals.tax - 2.0).abs() < 1e-9);
        assert!((totals.total - 22.0).abs() < 1e-9);
        assert!((totals.total_paid - 22.0).abs() < 1e-9);
        assert!((totals.total_tendered - 25.0).abs() < 1e-9);
        assert!((totals.change_due - 3.0).abs() < 1e-9);

        validate_submission(&lines, &payments, &totals).expect("balanced sale should validate");
    }

    #[test]
    fn test_total_is_subtotal_plus_tax_across_mixed_cart() {
        let lines = vec![
            line(1, 4.5, 3.0, 19.0),
            line(2, 0.99, 2.5, 7.0),
            line(3, 120.0, 1.0, 0.0),
        ];
        let totals = compute_totals(&lines, &[]);

        let expected_subtotal: f64 = lines.iter().map(|l| l.base_price * l.quantity).sum();
        assert!((totals.subtotal - expected_subtotal).abs() < 1e-9);
        assert!((totals.total - (totals.subtotal + totals.tax)).abs() < 1e-9);
    }

    #[test]
    fn test_computation_is_idempotent() {
        let lines = vec![line(7, 3.25, 4.0, 12.5), line(8, 18.0, 0.5, 19.0)];
        let payments = vec![
            PaymentEntry::card("Credit Card", 10.0, Some("4242")),
            PaymentEntry::cash(11.65, 20.0),
        ];

        let first = compute_totals(&lines, &payments);
        let second = compute_totals(&lines, &payments);
        assert_eq!(first, second);
    }

    #[test]
    fn test_balance_epsilon_boundaries() {
        let lines = vec![line(1, 10.0, 2.0, 10.0)]; // total 22.00
        let totals = compute_totals(&lines, &[]);

        // Paid within epsilon/2 of the total: accepted either side.
        for paid in [
            totals.total + BALANCE_EPSILON / 2.0,
            totals.total - BALANCE_EPSILON / 2.0,
        ] {
            let payments = vec![PaymentEntry::card("Debit Card", paid, None)];
            let t = compute_totals(&lines, &payments);
            assert!(
                validate_submission(&lines, &payments, &t).is_ok(),
                "paid {paid} should balance"
            );
        }

        // Paid off by 2x epsilon: rejected either side.
        for paid in [
            totals.total + BALANCE_EPSILON * 2.0,
            totals.total - BALANCE_EPSILON * 2.0,
        ] {
            let payments = vec![PaymentEntry::card("Debit Card", paid, None)];
            let t = compute_totals(&lines, &payments);
            assert!(
                matches!(
                    validate_submission(&lines, &payments, &t),
                    Err(SubmitError::Validation(_))
                ),
                "paid {paid} should not balance"
            );
        }
    }

    #[test]
    fn test_empty_payment_set_is_rejected() {
        let lines = vec![line(1, 5.0, 1.0, 0.0)];
        let totals = compute_totals(&lines, &[]);
        assert!(matches!(
            validate_submission(&lines, &[], &totals),
            Err(SubmitError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_total_is_rejected_even_when_balanced() {
        let totals = compute_totals(&[], &[]);
        let payments = vec![PaymentEntry::card("Other", 0.0, None)];
        assert!(matches!(
            validate_submission(&[], &payments, &totals),
            Err(SubmitError::Validation(_))
        ));
    }

    #[test]
    fn test_cash_tendered_below_applied_amount_is_rejected() {
        let lines = vec![line(1, 10.0, 1.0, 0.0)];
        let payments = vec![PaymentEntry::cash(10.0, 5.0)];
        let totals = compute_totals(&lines, &payments);
        assert!(matches!(
            validate_submission(&lines, &payments, &totals),
            Err(SubmitError::Validation(_))
        ));
    }

    #[test]
    fn test_applied_cash_never_exceeds_outstanding_balance() {
        // Second payment: 15.00 already paid toward a 22.00 total.
        assert!((applied_cash_amount(22.0, 15.0, 50.0) - 7.0).abs() < 1e-9);
        // Exact tender applies in full.
        assert!((applied_cash_amount(22.0, 0.0, 22.0) - 22.0).abs() < 1e-9);
        // Already overpaid: nothing further applies.
        assert_eq!(applied_cash_amount(22.0, 25.0, 10.0), 0.0);
    }

    #[test]
    fn test_snapshot_freezes_pricing_fields() {
        let l = line(42, 2.5, 3.0, 7.0);
        let item = l.snapshot();
        assert_eq!(item.product_id, 42);
        assert!((item.base_price - 2.5).abs() < 1e-9);
        assert!((item.price - l.display_price).abs() < 1e-9);
        assert!((item.tax_rate - 7.0).abs() < 1e-9);

        let p = PaymentEntry::cash(22.0, 25.0);
        let rec = p.snapshot();
        assert_eq!(rec.method, "Cash");
        assert!((rec.amount - 22.0).abs() < 1e-9);
        assert_eq!(rec.reference, None);
    }
}
