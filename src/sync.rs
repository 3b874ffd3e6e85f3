//! Background synchronization engine.
//!
//! Drains the queue of offline-recorded sales against the transaction
//! service: triggered when connectivity returns and on a bounded poll
//! interval as a safety net for missed transitions. Entries are replayed
//! strictly in creation order through the same submission operation the
//! online path uses, and removed only after confirmed acceptance.
//!
//! A single-slot lock serializes passes: a trigger that arrives while a pass
//! is running is a no-op, and the next natural trigger picks up whatever
//! remains.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{SaleRequest, TransactionBackend};
use crate::connectivity::ConnectivityMonitor;
use crate::error::StorageError;
use crate::store::OfflineStore;

pub struct SyncEngine {
    store: Arc<OfflineStore>,
    backend: Arc<dyn TransactionBackend>,
    /// Single-slot pass lock; `try_lock` failure means a pass is running.
    pass_lock: Mutex<()>,
    is_running: AtomicBool,
    last_sync: std::sync::Mutex<Option<String>>,
}

/// What one synchronization pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// True when the pass was skipped because another pass held the lock.
    pub skipped: bool,
    pub attempted: usize,
    pub synced: usize,
    pub rejected: usize,
    /// True when a transport failure cut the pass short; remaining entries
    /// stay queued for the next trigger.
    pub stopped_on_transport: bool,
}

/// Operator-facing status snapshot.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SyncStatus {
    pub pending: i64,
    pub last_sync: Option<String>,
    pub loop_running: bool,
}

impl SyncEngine {
    pub fn new(store: Arc<OfflineStore>, backend: Arc<dyn TransactionBackend>) -> Self {
        Self {
            store,
            backend,
            pass_lock: Mutex::new(()),
            is_running: AtomicBool::new(false),
            last_sync: std::sync::Mutex::new(None),
        }
    }

    /// Run one synchronization pass.
    ///
    /// Reads the full queue once at the start, so a sale enqueued mid-pass
    /// lands in this pass or the next but is never read twice. Per entry:
    /// confirmed acceptance removes it; an explicit business rejection is
    /// recorded and the entry stays queued for operator review; a transport
    /// failure stops the pass to preserve creation order and avoid hammering
    /// an unreachable service.
    pub async fn run_pass(&self) -> Result<SyncReport, StorageError> {
        let Ok(_guard) = self.pass_lock.try_lock() else {
            debug!("Sync pass already in progress; ignoring trigger");
            return Ok(SyncReport {
                skipped: true,
                ..SyncReport::default()
            });
        };

        let pending = self.store.list_pending()?;
        let mut report = SyncReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        info!(count = pending.len(), "Starting sync pass over queued sales");

        for sale in pending {
            report.attempted += 1;
            let request = SaleRequest::from_pending(&sale);

            match self.backend.submit_sale(&request).await {
                Ok(resp) if resp.success => {
                    self.store.remove_sale(sale.local_id)?;
                    report.synced += 1;
                    info!(
                        local_id = sale.local_id,
                        order_id = ?resp.order_id,
                        "Queued sale confirmed and removed"
                    );
                }
                Ok(resp) => {
                    // No automatic discard: the entry stays visible until an
                    // operator intervenes.
                    self.store.record_rejection(sale.local_id, &resp.message)?;
                    report.rejected += 1;
                    warn!(
                        local_id = sale.local_id,
                        message = %resp.message,
                        "Queued sale rejected; left queued for review"
                    );
                }
                Err(e) => {
                    report.stopped_on_transport = true;
                    warn!(
                        local_id = sale.local_id,
                        "Transport failure during sync ({e}); stopping pass"
                    );
                    break;
                }
            }
        }

        if let Ok(mut guard) = self.last_sync.lock() {
            *guard = Some(Utc::now().to_rfc3339());
        }

        info!(
            synced = report.synced,
            rejected = report.rejected,
            stopped = report.stopped_on_transport,
            "Sync pass complete"
        );
        Ok(report)
    }

    pub fn status(&self) -> Result<SyncStatus, StorageError> {
        Ok(SyncStatus {
            pending: self.store.pending_count()?,
            last_sync: self.last_sync.lock().ok().and_then(|g| g.clone()),
            loop_running: self.is_running.load(Ordering::SeqCst),
        })
    }

    /// Spawn the background loop: one pass on every became-online transition
    /// and one per poll interval while online. Returns the task handle;
    /// call [`SyncEngine::shutdown`] to stop the loop.
    pub fn spawn(
        self: Arc<Self>,
        connectivity: Arc<ConnectivityMonitor>,
        poll_interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let engine = self;
        engine.is_running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            info!(interval_secs = poll_interval.as_secs(), "Sync loop started");
            let mut transitions = connectivity.subscribe();
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so startup does not
            // race the embedding shell's initial connectivity report.
            ticker.tick().await;

            // Drain anything left over from a previous run when starting
            // online — a transition that happened before we subscribed will
            // not be replayed to us.
            if connectivity.is_online() {
                if let Err(e) = engine.run_pass().await {
                    warn!("Sync pass failed: {e}");
                }
            }

            loop {
                if !engine.is_running.load(Ordering::SeqCst) {
                    break;
                }

                tokio::select! {
                    changed = transitions.changed() => {
                        if changed.is_err() {
                            // Monitor dropped; nothing left to react to.
                            break;
                        }
                        if *transitions.borrow_and_update() {
                            info!("Connectivity restored; draining queued sales");
                            if let Err(e) = engine.run_pass().await {
                                warn!("Sync pass failed: {e}");
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        if connectivity.is_online() {
                            if let Err(e) = engine.run_pass().await {
                                warn!("Sync pass failed: {e}");
                            }
                        }
                    }
                }
            }
            info!("Sync loop stopped");
        })
    }

    /// Stop the background loop after its current iteration.
    pub fn shutdown(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SaleResponse;
    use crate::catalog::Product;
    use crate::error::TransportError;
    use crate::store::SaleSnapshot;
    use crate::totals::{CartItem, PaymentRecord};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Backend double: pops one scripted outcome per call and records the
    /// idempotency token of every request, in arrival order.
    struct ScriptedBackend {
        outcomes: std::sync::Mutex<VecDeque<Result<SaleResponse, TransportError>>>,
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(outcomes: Vec<Result<SaleResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: std::sync::Mutex::new(outcomes.into()),
                seen: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn accepted(order_id: i64) -> Result<SaleResponse, TransportError> {
            Ok(SaleResponse {
                success: true,
                message: "Sale created".to_string(),
                order_id: Some(order_id),
            })
        }

        fn rejected(message: &str) -> Result<SaleResponse, TransportError> {
            Ok(SaleResponse {
                success: false,
                message: message.to_string(),
                order_id: None,
            })
        }

        fn unreachable() -> Result<SaleResponse, TransportError> {
            Err(TransportError("connection reset".to_string()))
        }

        fn seen_tokens(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransactionBackend for ScriptedBackend {
        async fn submit_sale(
            &self,
            request: &SaleRequest,
        ) -> Result<SaleResponse, TransportError> {
            self.seen
                .lock()
                .unwrap()
                .push(request.client_request_id.clone());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(Self::unreachable)
        }

        async fn fetch_all_products(&self) -> Result<Vec<Product>, TransportError> {
            Ok(Vec::new())
        }
    }

    fn test_store() -> (tempfile::TempDir, Arc<OfflineStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = OfflineStore::open(dir.path()).expect("open store");
        (dir, Arc::new(store))
    }

    fn snapshot(client_request_id: &str) -> SaleSnapshot {
        SaleSnapshot {
            account_id: 7,
            cart: vec![CartItem {
                product_id: 1,
                quantity: 2.0,
                price: 11.0,
                base_price: 10.0,
                tax_rate: 10.0,
            }],
            payments: vec![PaymentRecord {
                amount: 22.0,
                method: "Cash".to_string(),
                reference: None,
            }],
            notes: None,
            subtotal: 20.0,
            tax: 2.0,
            total: 22.0,
            total_tendered: 25.0,
            client_request_id: client_request_id.to_string(),
            created_at: "2026-08-05T10:15:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_drains_queue_in_creation_order() {
        let (_dir, store) = test_store();
        for req in ["sale-a", "sale-b", "sale-c"] {
            store.enqueue_sale(&snapshot(req)).unwrap();
        }

        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::accepted(1),
            ScriptedBackend::accepted(2),
            ScriptedBackend::accepted(3),
        ]);
        let engine = SyncEngine::new(store.clone(), backend.clone());

        let report = engine.run_pass().await.expect("pass");

        assert_eq!(report.synced, 3);
        assert!(!report.stopped_on_transport);
        assert_eq!(backend.seen_tokens(), vec!["sale-a", "sale-b", "sale-c"]);
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejection_leaves_entry_queued_and_continues() {
        let (_dir, store) = test_store();
        let first = store.enqueue_sale(&snapshot("sale-1")).unwrap();
        let second = store.enqueue_sale(&snapshot("sale-2")).unwrap();

        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::accepted(41),
            ScriptedBackend::rejected("Insufficient stock for product 1"),
        ]);
        let engine = SyncEngine::new(store.clone(), backend.clone());

        let report = engine.run_pass().await.expect("pass");

        assert_eq!(report.synced, 1);
        assert_eq!(report.rejected, 1);

        // Entry 1 is gone; entry 2 remains, annotated for the operator.
        let pending = store.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].local_id, second);
        assert!(pending.iter().all(|p| p.local_id != first));
        assert_eq!(pending[0].sync_attempts, 1);
        assert_eq!(
            pending[0].last_error.as_deref(),
            Some("Insufficient stock for product 1")
        );
    }

    #[tokio::test]
    async fn test_transport_failure_stops_pass_and_preserves_queue() {
        let (_dir, store) = test_store();
        for req in ["sale-1", "sale-2", "sale-3"] {
            store.enqueue_sale(&snapshot(req)).unwrap();
        }

        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::accepted(1),
            ScriptedBackend::unreachable(),
        ]);
        let engine = SyncEngine::new(store.clone(), backend.clone());

        let report = engine.run_pass().await.expect("pass");

        assert_eq!(report.synced, 1);
        assert!(report.stopped_on_transport);
        // sale-3 was never attempted this pass.
        assert_eq!(backend.seen_tokens(), vec!["sale-1", "sale-2"]);
        assert_eq!(store.pending_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retry_after_transport_failure_delivers_at_least_once() {
        let (_dir, store) = test_store();
        store.enqueue_sale(&snapshot("sale-retry")).unwrap();

        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::unreachable(),
            ScriptedBackend::accepted(77),
        ]);
        let engine = SyncEngine::new(store.clone(), backend.clone());

        let first = engine.run_pass().await.expect("first pass");
        assert!(first.stopped_on_transport);
        assert_eq!(store.pending_count().unwrap(), 1);

        // Next trigger retries the same entry; confirmed success removes it
        // and it is never submitted again.
        let second = engine.run_pass().await.expect("second pass");
        assert_eq!(second.synced, 1);
        assert_eq!(store.pending_count().unwrap(), 0);
        assert_eq!(backend.seen_tokens(), vec!["sale-retry", "sale-retry"]);

        let third = engine.run_pass().await.expect("third pass");
        assert_eq!(third.attempted, 0);
        assert_eq!(backend.seen_tokens().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_noop() {
        let (_dir, store) = test_store();
        store.enqueue_sale(&snapshot("sale-1")).unwrap();

        let backend = ScriptedBackend::new(vec![ScriptedBackend::accepted(1)]);
        let engine = SyncEngine::new(store.clone(), backend.clone());

        // Hold the slot as a running pass would.
        let guard = engine.pass_lock.try_lock().unwrap();
        let report = engine.run_pass().await.expect("pass");
        assert!(report.skipped);
        assert_eq!(store.pending_count().unwrap(), 1);
        drop(guard);

        let report = engine.run_pass().await.expect("pass");
        assert_eq!(report.synced, 1);
    }

    #[tokio::test]
    async fn test_became_online_trigger_drains_queue() {
        let (_dir, store) = test_store();
        store.enqueue_sale(&snapshot("sale-1")).unwrap();

        let backend = ScriptedBackend::new(vec![ScriptedBackend::accepted(1)]);
        let engine = Arc::new(SyncEngine::new(store.clone(), backend.clone()));
        let connectivity = Arc::new(ConnectivityMonitor::new(false));

        let handle = engine
            .clone()
            .spawn(connectivity.clone(), Duration::from_secs(3600));

        connectivity.set_online(true);

        // Wait for the background pass to drain the queue.
        for _ in 0..100 {
            if store.pending_count().unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.pending_count().unwrap(), 0);

        engine.shutdown();
        // A final transition unblocks the select so the loop observes the
        // shutdown flag.
        connectivity.set_online(false);
        let _ = handle.await;

        let status = engine.status().unwrap();
        assert_eq!(status.pending, 0);
        assert!(status.last_sync.is_some());
        assert!(!status.loop_running);
    }
}
