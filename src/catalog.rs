//! Product catalog projection and offline cache flow.
//!
//! The catalog is owned by the remote service; this module only mirrors it
//! into the local store so carts can be built while offline. Cached stock
//! figures are advisory — the service remains the sole authority for the
//! final stock decrement at confirmation time.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::TransactionBackend;
use crate::connectivity::ConnectivityMonitor;
use crate::error::CatalogError;
use crate::store::OfflineStore;
use crate::totals::CartLine;

use serde::{Deserialize, Serialize};

/// How a product is sold: discrete units or a measured quantity (weight,
/// length, volume).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellingMethod {
    Unit,
    Measured,
}

/// Read-only product projection from the remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Tax-exclusive unit price.
    pub base_price: f64,
    /// Tax-inclusive shelf price.
    pub display_price: f64,
    /// Tax rate in percent.
    pub tax_rate: f64,
    /// Last-known available quantity. Advisory while offline.
    pub total_stock: f64,
    pub selling_method: SellingMethod,
    pub barcode: Option<String>,
    pub unit_type: Option<String>,
}

impl Product {
    /// Build a cart line for this product, freezing its current pricing.
    pub fn cart_line(&self, quantity: f64) -> CartLine {
        CartLine {
            product_id: self.id,
            name: self.name.clone(),
            quantity,
            base_price: self.base_price,
            display_price: self.display_price,
            tax_rate: self.tax_rate,
        }
    }
}

/// Fetch the full catalog from the service and replace the local cache.
/// Returns the number of products cached.
pub async fn refresh_product_cache(
    store: &OfflineStore,
    backend: &Arc<dyn TransactionBackend>,
) -> Result<usize, CatalogError> {
    let products = backend.fetch_all_products().await?;
    store.replace_products(&products)?;
    info!(count = products.len(), "Product cache refreshed");
    Ok(products.len())
}

/// Load products for cart building: from the service when online (also
/// re-priming the cache), from the cache when offline or when the fetch
/// fails mid-flight.
pub async fn load_products(
    store: &OfflineStore,
    backend: &Arc<dyn TransactionBackend>,
    connectivity: &ConnectivityMonitor,
) -> Result<Vec<Product>, CatalogError> {
    if connectivity.is_online() {
        match backend.fetch_all_products().await {
            Ok(products) => {
                store.replace_products(&products)?;
                return Ok(products);
            }
            Err(e) => {
                warn!("Product fetch failed, serving cached catalog: {e}");
            }
        }
    }
    Ok(store.cached_products()?)
}

// ===========================================================================
// Tests
// ===========================================================================
