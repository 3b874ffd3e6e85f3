//! Remote transaction service boundary.
//!
//! The service is the authoritative ledger: it persists orders and
//! decrements stock. This module exposes it as a single trait so the
//! coordinator and the sync engine share the identical submission operation,
//! and tests can script outcomes. `HttpBackend` is the production
//! implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::catalog::Product;
use crate::error::TransportError;
use crate::store::{PendingSale, SaleSnapshot};
use crate::totals::{CartItem, PaymentRecord};

/// Default timeout for service requests. A call that neither confirms nor
/// rejects within this bound resolves as indeterminate.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// The full submission payload: cart and payment snapshots plus the totals
/// computed at the register. Totals travel with the request — the service
/// never recomputes them from its own catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRequest {
    pub account_id: i64,
    pub cart_items: Vec<CartItem>,
    pub payments: Vec<PaymentRecord>,
    pub notes: Option<String>,
    pub total: f64,
    pub tax: f64,
    pub total_tendered: f64,
    /// Device-generated token, stable across replays of the same sale, so
    /// the service can deduplicate a retry after an indeterminate outcome.
    pub client_request_id: String,
}

impl SaleRequest {
    /// Build the request from a durable snapshot. Both the direct-submit
    /// path and the sync replay path go through here, so a queued sale is
    /// transmitted exactly as it would have been online.
    pub fn from_snapshot(snapshot: &SaleSnapshot) -> Self {
        Self {
            account_id: snapshot.account_id,
            cart_items: snapshot.cart.clone(),
            payments: snapshot.payments.clone(),
            notes: snapshot.notes.clone(),
            total: snapshot.total,
            tax: snapshot.tax,
            total_tendered: snapshot.total_tendered,
            client_request_id: snapshot.client_request_id.clone(),
        }
    }

    pub fn from_pending(sale: &PendingSale) -> Self {
        Self::from_snapshot(&sale.snapshot)
    }
}

/// Definitive answer from the service. `success = false` is an explicit
/// business rejection (e.g. insufficient stock), not a transport failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleResponse {
    pub success: bool,
    pub message: String,
    pub order_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// The remote transaction service, reduced to the two operations this core
/// consumes. An `Err` means no definitive response was received — the sale
/// may or may not have been applied remotely.
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    async fn submit_sale(&self, request: &SaleRequest) -> Result<SaleResponse, TransportError>;

    async fn fetch_all_products(&self) -> Result<Vec<Product>, TransportError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Production backend: authenticated HTTPS calls to the transaction service.
pub struct HttpBackend {
    base_url: String,
    api_key: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| TransportError(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: normalize_base_url(base_url),
            api_key: api_key.to_string(),
            client,
        })
    }
}

#[async_trait]
impl TransactionBackend for HttpBackend {
    async fn submit_sale(&self, request: &SaleRequest) -> Result<SaleResponse, TransportError> {
        let url = format!("{}/api/pos/sales", self.base_url);
        debug!(
            client_request_id = %request.client_request_id,
            total = request.total,
            "Submitting sale to transaction service"
        );

        let resp = self
            .client
            .post(&url)
            .header("X-POS-API-Key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError(friendly_error(&self.base_url, &e)))?;

        let status = resp.status();
        if !status.is_success() {
            // A non-2xx answer carries no business verdict; treat it as
            // indeterminate so the sale falls back to the queue.
            return Err(TransportError(status_error(status)));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| TransportError(format!("failed to read response body: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| TransportError(format!("invalid JSON from transaction service: {e}")))
    }

    async fn fetch_all_products(&self) -> Result<Vec<Product>, TransportError> {
        let url = format!("{}/api/pos/products", self.base_url);

        let resp = self
            .client
            .get(&url)
            .header("X-POS-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| TransportError(friendly_error(&self.base_url, &e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError(status_error(status)));
        }

        resp.json()
            .await
            .map_err(|e| TransportError(format!("invalid JSON from transaction service: {e}")))
    }
}

// ---------------------------------------------------------------------------
// URL normalisation and error mapping
// ---------------------------------------------------------------------------

/// Normalise the service base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes and a trailing `/api` segment
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("cannot reach transaction service at {url}");
    }
    if err.is_timeout() {
        return format!("connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("invalid transaction service URL: {url}");
    }
    format!("network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "API key is invalid or expired".to_string(),
        403 => "terminal not authorized".to_string(),
        404 => "transaction service endpoint not found".to_string(),
        s if s >= 500 => format!("transaction service error (HTTP {s})"),
        s => format!("unexpected response from transaction service (HTTP {s})"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
