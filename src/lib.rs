//! Tillsync — offline-first sale transaction pipeline.
//!
//! A point-of-sale client core that keeps selling when the network is down:
//! it computes authoritative totals for a cart and split payments, records
//! sales durably on the device when the transaction service is unreachable,
//! and replays them in order — each exactly once per confirmed acceptance —
//! when connectivity returns. Catalog CRUD, authentication, UI, and receipt
//! printing live outside this crate; the remote transaction service is
//! consumed through the [`api::TransactionBackend`] seam.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod catalog;
mod connectivity;
mod coordinator;
mod error;
mod receipt;
mod store;
mod sync;
mod totals;

pub use api::{HttpBackend, SaleRequest, SaleResponse, TransactionBackend};
pub use catalog::{load_products, refresh_product_cache, Product, SellingMethod};
pub use connectivity::ConnectivityMonitor;
pub use coordinator::{SaleCoordinator, SaleDraft};
pub use error::{CatalogError, StorageError, SubmitError, TransportError};
pub use receipt::{ReceiptLine, ReceiptPayment, SaleReceipt};
pub use store::{OfflineStore, PendingSale, SaleSnapshot};
pub use sync::{SyncEngine, SyncReport, SyncStatus};
pub use totals::{
    applied_cash_amount, compute_totals, validate_submission, CartItem, CartLine, PaymentEntry,
    PaymentRecord, Totals, BALANCE_EPSILON,
};

/// Initialize structured logging for the embedding application.
///
/// Honors `RUST_LOG`; defaults to info globally with debug for this crate.
/// Safe to call more than once — later calls are no-ops.
pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tillsync=debug"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
