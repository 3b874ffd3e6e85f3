//! Local durable store for queued sales and the offline product cache.
//!
//! Uses rusqlite with WAL mode. Holds two concerns: an append-only queue of
//! sales recorded while the transaction service was unreachable, and a
//! read-only cache of the product catalog for offline cart building. Schema
//! migrations run on open against a `schema_version` table.

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::catalog::Product;
use crate::error::StorageError;
use crate::totals::{CartItem, PaymentRecord};

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Handle to the on-device database. One connection guarded by a mutex; all
/// mutations are single-statement or single-transaction so the enqueue path
/// and the sync path never observe a torn row.
pub struct OfflineStore {
    conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// The immutable snapshot of a completed-at-the-register sale, exactly as it
/// is persisted and later replayed. Monetary figures come from the
/// computation engine at submission time and are never recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleSnapshot {
    pub account_id: i64,
    pub cart: Vec<CartItem>,
    pub payments: Vec<PaymentRecord>,
    pub notes: Option<String>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub total_tendered: f64,
    /// Device-generated idempotency token, sent with every submission of
    /// this sale so the service can deduplicate replays.
    pub client_request_id: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

/// A queued sale awaiting confirmation by the transaction service.
/// `sync_attempts`/`last_error` are operator-visibility bookkeeping written
/// by the sync engine on rejection; they never affect replay eligibility.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSale {
    pub local_id: i64,
    pub snapshot: SaleSnapshot,
    pub sync_attempts: i64,
    pub last_error: Option<String>,
}

impl OfflineStore {
    /// Open (or create) the store at `{data_dir}/tillsync.db`.
    ///
    /// Creates the directory if needed, applies pragmas, and runs pending
    /// migrations. On open failure the file is deleted and reopened once;
    /// a corrupt store is worth less than a working register.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("tillsync.db");
        info!("Opening offline store at {}", db_path.display());

        let conn = match open_and_configure(&db_path) {
            Ok(c) => c,
            Err(first_err) => {
                warn!("Store open failed ({first_err}), deleting and retrying once");
                if db_path.exists() {
                    let _ = fs::remove_file(&db_path);
                    let _ = fs::remove_file(db_path.with_extension("db-wal"));
                    let _ = fs::remove_file(db_path.with_extension("db-shm"));
                }
                open_and_configure(&db_path)
                    .map_err(|e| StorageError::Open(format!("open failed after retry: {e}")))?
            }
        };

        run_migrations(&conn)?;

        info!("Offline store initialized (schema v{CURRENT_SCHEMA_VERSION})");

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Open(format!("store mutex poisoned: {e}")))
    }

    // -----------------------------------------------------------------------
    // Pending sale queue
    // -----------------------------------------------------------------------

    /// Append a sale to the queue. Returns the device-local id.
    ///
    /// If a sale with the same `client_request_id` is already queued, its
    /// existing id is returned instead of inserting a duplicate row.
    pub fn enqueue_sale(&self, snapshot: &SaleSnapshot) -> Result<i64, StorageError> {
        let conn = self.lock_conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM pending_sales WHERE client_request_id = ?1 LIMIT 1",
                params![snapshot.client_request_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(local_id) = existing {
            info!(
                local_id,
                client_request_id = %snapshot.client_request_id,
                "Enqueue deduplicated via client_request_id"
            );
            return Ok(local_id);
        }

        let cart_json = serde_json::to_string(&snapshot.cart)?;
        let payments_json = serde_json::to_string(&snapshot.payments)?;

        conn.execute(
            "INSERT INTO pending_sales \
                (account_id, cart, payments, notes, subtotal, tax, total, \
                 total_tendered, client_request_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                snapshot.account_id,
                cart_json,
                payments_json,
                snapshot.notes,
                snapshot.subtotal,
                snapshot.tax,
                snapshot.total,
                snapshot.total_tendered,
                snapshot.client_request_id,
                snapshot.created_at,
            ],
        )?;

        let local_id = conn.last_insert_rowid();
        info!(
            local_id,
            total = snapshot.total,
            "Sale queued for later synchronization"
        );
        Ok(local_id)
    }

    /// All queued sales in insertion (creation) order.
    pub fn list_pending(&self) -> Result<Vec<PendingSale>, StorageError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, account_id, cart, payments, notes, subtotal, tax, total, \
                    total_tendered, client_request_id, created_at, sync_attempts, last_error \
             FROM pending_sales ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, f64>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, i64>(11)?,
                row.get::<_, Option<String>>(12)?,
            ))
        })?;

        let mut sales = Vec::new();
        for row in rows {
            let (
                local_id,
                account_id,
                cart_json,
                payments_json,
                notes,
                subtotal,
                tax,
                total,
                total_tendered,
                client_request_id,
                created_at,
                sync_attempts,
                last_error,
            ) = row?;

            let cart: Vec<CartItem> =
                serde_json::from_str(&cart_json).map_err(|e| StorageError::Corrupt {
                    local_id,
                    reason: format!("cart snapshot: {e}"),
                })?;
            let payments: Vec<PaymentRecord> =
                serde_json::from_str(&payments_json).map_err(|e| StorageError::Corrupt {
                    local_id,
                    reason: format!("payment snapshot: {e}"),
                })?;

            sales.push(PendingSale {
                local_id,
                snapshot: SaleSnapshot {
                    account_id,
                    cart,
                    payments,
                    notes,
                    subtotal,
                    tax,
                    total,
                    total_tendered,
                    client_request_id,
                    created_at,
                },
                sync_attempts,
                last_error,
            });
        }
        Ok(sales)
    }

    /// Delete a queued sale. Called only after the transaction service has
    /// confirmed acceptance of that exact record.
    pub fn remove_sale(&self, local_id: i64) -> Result<(), StorageError> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM pending_sales WHERE id = ?1", params![local_id])?;
        Ok(())
    }

    /// Record a business rejection against a queued sale without removing
    /// it, so the operator can see what is stuck and why.
    pub fn record_rejection(&self, local_id: i64, error: &str) -> Result<(), StorageError> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE pending_sales \
             SET sync_attempts = sync_attempts + 1, last_error = ?2 \
             WHERE id = ?1",
            params![local_id, error],
        )?;
        Ok(())
    }

    pub fn pending_count(&self) -> Result<i64, StorageError> {
        let conn = self.lock_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM pending_sales", [], |row| row.get(0))?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Product cache
    // -----------------------------------------------------------------------

    /// Replace the entire cached catalog in one transaction. Readers never
    /// observe a partially-replaced cache.
    pub fn replace_products(&self, products: &[Product]) -> Result<(), StorageError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM product_cache", [])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO product_cache (id, data) VALUES (?1, ?2)")?;
            for product in products {
                let data = serde_json::to_string(product)?;
                stmt.execute(params![product.id, data])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All cached products, or an empty list when the cache has never been
    /// primed.
    pub fn cached_products(&self) -> Result<Vec<Product>, StorageError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT id, data FROM product_cache ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut products = Vec::new();
        for row in rows {
            let (id, data) = row?;
            let product: Product =
                serde_json::from_str(&data).map_err(|e| StorageError::Corrupt {
                    local_id: id,
                    reason: format!("cached product: {e}"),
                })?;
            products.push(product);
        }
        Ok(products)
    }
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, StorageError> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    info!("Migrating offline store from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: pending sale queue and product cache.
fn migrate_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        -- pending_sales (append-only queue)
        CREATE TABLE IF NOT EXISTS pending_sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            cart TEXT NOT NULL,
            payments TEXT NOT NULL,
            notes TEXT,
            subtotal REAL NOT NULL DEFAULT 0,
            tax REAL NOT NULL DEFAULT 0,
            total REAL NOT NULL DEFAULT 0,
            total_tendered REAL NOT NULL DEFAULT 0,
            client_request_id TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL
        );

        -- product_cache (read-only catalog projection)
        CREATE TABLE IF NOT EXISTS product_cache (
            id INTEGER PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_pending_sales_created_at
            ON pending_sales(created_at);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;
    Ok(())
}

/// Migration v2: sync bookkeeping for stuck-entry visibility.
fn migrate_v2(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        ALTER TABLE pending_sales ADD COLUMN sync_attempts INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE pending_sales ADD COLUMN last_error TEXT;

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )?;
    Ok(())
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

// ===========================================================================
// Tests
// ===========================================================================
