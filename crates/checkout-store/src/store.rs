//! # Payment Session Store
//!
//! Durable, idempotent persistence of `PaymentSession`. Every mutation
//! runs inside a single `Immediate` transaction: a session and its line
//! items are inserted atomically, and status transitions are checked
//! against the state machine while the write lock is held. Sessions are
//! independent aggregates — the transaction boundary is all the
//! serialization a single session needs.

use crate::schema;
use checkout_core::{
    CheckoutError, CheckoutResult, Currency, LineItem, PaymentSession, PaymentStatus,
    ProductType, SessionStatus,
};
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// Connection pool over the store's SQLite file
pub type DbPool = Pool<SqliteConnectionManager>;

/// Open a pooled store at the given path
pub fn create_pool(database_path: &str) -> CheckoutResult<DbPool> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    Pool::builder()
        .max_size(10)
        .build(manager)
        .map_err(|e| CheckoutError::Storage(e.to_string()))
}

pub(crate) fn db_err(e: rusqlite::Error) -> CheckoutError {
    CheckoutError::Storage(e.to_string())
}

pub(crate) fn pool_err(e: r2d2::Error) -> CheckoutError {
    CheckoutError::Storage(e.to_string())
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

/// Durable record of payment sessions and their transitions
#[derive(Clone)]
pub struct PaymentSessionStore {
    pool: DbPool,
}

impl PaymentSessionStore {
    /// Wrap a pool, initializing the schema if needed
    pub fn new(pool: DbPool) -> CheckoutResult<Self> {
        let conn = pool.get().map_err(pool_err)?;
        schema::init_db(&conn).map_err(db_err)?;
        drop(conn);
        Ok(Self { pool })
    }

    /// Single-connection in-memory store (tests, local runs)
    pub fn in_memory() -> CheckoutResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| CheckoutError::Storage(e.to_string()))?;
        Self::new(pool)
    }

    pub(crate) fn conn(&self) -> CheckoutResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(pool_err)
    }

    /// Create a session in `pending`/`unpaid` with its line items, in one
    /// transaction. Partial writes are never observable.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub fn create(
        &self,
        user_id: Option<i64>,
        items: Vec<LineItem>,
        currency: Currency,
    ) -> CheckoutResult<PaymentSession> {
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        for item in &items {
            if item.quantity == 0 {
                return Err(CheckoutError::InvalidLineItem(format!(
                    "{}: quantity must be at least 1",
                    item.product_id
                )));
            }
            if item.unit_amount_minor < 0 {
                return Err(CheckoutError::InvalidLineItem(format!(
                    "{}: negative unit amount",
                    item.product_id
                )));
            }
        }

        let session = PaymentSession::new(user_id, items, currency);

        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        tx.execute(
            "INSERT INTO payment_sessions
                 (session_id, user_id, amount_total_minor, currency, payment_status,
                  status, created_at, updated_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &session.session_id,
                session.user_id,
                session.amount_total_minor,
                session.currency.as_str(),
                session.payment_status.as_str(),
                session.status.as_str(),
                ts(session.created_at),
                ts(session.updated_at),
                "{}",
            ],
        )
        .map_err(db_err)?;

        for (position, item) in session.items.iter().enumerate() {
            tx.execute(
                "INSERT INTO line_items
                     (session_id, position, product_id, product_type, name,
                      unit_amount_minor, quantity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    &session.session_id,
                    position as i64,
                    &item.product_id,
                    item.product_type.as_str(),
                    &item.name,
                    item.unit_amount_minor,
                    item.quantity,
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;

        info!(
            "created session {} ({} {})",
            session.session_id, session.amount_total_minor, session.currency
        );
        Ok(session)
    }

    /// Look up a session with its line items
    pub fn find(&self, session_id: &str) -> CheckoutResult<Option<PaymentSession>> {
        let conn = self.conn()?;
        load_session(&conn, session_id)
    }

    /// Apply a status change if it is legal per the state machine.
    ///
    /// Returns `true` when state changed, `false` for an idempotent
    /// no-op (the session is already in the target state). Illegal
    /// transitions fail with `IllegalTransition` and are logged, never
    /// silently applied.
    #[instrument(skip(self))]
    pub fn transition(
        &self,
        session_id: &str,
        new_payment_status: PaymentStatus,
        new_status: Option<SessionStatus>,
    ) -> CheckoutResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let changed =
            apply_transition(&tx, session_id, new_payment_status, new_status, None, None)?;
        tx.commit().map_err(db_err)?;
        Ok(changed)
    }

    /// Move a session to `paid`/`completed`, stamping `completed_at` and
    /// merging metadata. Applying it twice is observably the same as once.
    #[instrument(skip(self, metadata))]
    pub fn mark_completed(
        &self,
        session_id: &str,
        metadata: HashMap<String, String>,
    ) -> CheckoutResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let changed = apply_transition(
            &tx,
            session_id,
            PaymentStatus::Paid,
            Some(SessionStatus::Completed),
            None,
            if metadata.is_empty() { None } else { Some(&metadata) },
        )?;
        tx.commit().map_err(db_err)?;
        Ok(changed)
    }

    /// Move a session to `failed`/`failed`, stamping `failure_reason`.
    #[instrument(skip(self))]
    pub fn mark_failed(&self, session_id: &str, reason: &str) -> CheckoutResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let changed = apply_transition(
            &tx,
            session_id,
            PaymentStatus::Failed,
            Some(SessionStatus::Failed),
            Some(reason),
            None,
        )?;
        tx.commit().map_err(db_err)?;
        Ok(changed)
    }

    /// Sweep pending sessions older than the retention window. The
    /// provider expires hosted sessions after a day; anything pending
    /// past retention is an abandoned cart, not a payment in flight.
    pub fn purge_abandoned(&self, retention_days: i64) -> CheckoutResult<usize> {
        let conn = self.conn()?;
        let cutoff = Utc::now().timestamp() - retention_days * 86_400;
        let deleted = conn
            .execute(
                "DELETE FROM payment_sessions WHERE status = 'pending' AND created_at < ?1",
                params![cutoff],
            )
            .map_err(db_err)?;
        Ok(deleted)
    }
}

/// Load a session row plus line items. Works on a plain connection or
/// inside a transaction.
pub(crate) fn load_session(
    conn: &Connection,
    session_id: &str,
) -> CheckoutResult<Option<PaymentSession>> {
    let row = conn
        .query_row(
            "SELECT session_id, user_id, amount_total_minor, currency, payment_status,
                    status, created_at, updated_at, completed_at, failure_reason, metadata
             FROM payment_sessions WHERE session_id = ?1",
            params![session_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, Option<i64>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, String>(10)?,
                ))
            },
        )
        .optional()
        .map_err(db_err)?;

    let Some((
        session_id,
        user_id,
        amount_total_minor,
        currency,
        payment_status,
        status,
        created_at,
        updated_at,
        completed_at,
        failure_reason,
        metadata,
    )) = row
    else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT product_id, product_type, name, unit_amount_minor, quantity
             FROM line_items WHERE session_id = ?1 ORDER BY position",
        )
        .map_err(db_err)?;
    let items = stmt
        .query_map(params![&session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, u32>(4)?,
            ))
        })
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?
        .into_iter()
        .map(|(product_id, product_type, name, unit_amount_minor, quantity)| {
            Ok(LineItem {
                product_id,
                product_type: ProductType::parse(&product_type).ok_or_else(|| {
                    CheckoutError::Storage(format!("bad product_type: {}", product_type))
                })?,
                name,
                unit_amount_minor,
                quantity,
            })
        })
        .collect::<CheckoutResult<Vec<_>>>()?;

    Ok(Some(PaymentSession {
        session_id,
        user_id,
        items,
        amount_total_minor,
        currency: Currency::parse(&currency)
            .ok_or_else(|| CheckoutError::Storage(format!("bad currency: {}", currency)))?,
        payment_status: PaymentStatus::parse(&payment_status).ok_or_else(|| {
            CheckoutError::Storage(format!("bad payment_status: {}", payment_status))
        })?,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| CheckoutError::Storage(format!("bad status: {}", status)))?,
        created_at: from_ts(created_at),
        updated_at: from_ts(updated_at),
        completed_at: completed_at.map(from_ts),
        failure_reason,
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
    }))
}

/// Apply a legal transition to the session row. Shared by the store's
/// public mutations and the webhook processor (which composes it with
/// the event insert inside one transaction).
///
/// Returns `true` when state changed, `false` for a same-state no-op.
pub(crate) fn apply_transition(
    conn: &Connection,
    session_id: &str,
    new_payment_status: PaymentStatus,
    new_status: Option<SessionStatus>,
    failure_reason: Option<&str>,
    metadata: Option<&HashMap<String, String>>,
) -> CheckoutResult<bool> {
    let session = load_session(conn, session_id)?.ok_or_else(|| {
        CheckoutError::SessionNotFound {
            session_id: session_id.to_string(),
        }
    })?;

    let target_status = new_status.unwrap_or(session.status);

    if !session.payment_status.can_transition(new_payment_status) {
        warn!(
            "illegal payment transition on {}: {} -> {}",
            session_id,
            session.payment_status.as_str(),
            new_payment_status.as_str()
        );
        return Err(CheckoutError::IllegalTransition {
            session_id: session_id.to_string(),
            from: session.payment_status.as_str().to_string(),
            to: new_payment_status.as_str().to_string(),
        });
    }
    if !session.status.can_transition(target_status) {
        warn!(
            "illegal status transition on {}: {} -> {}",
            session_id,
            session.status.as_str(),
            target_status.as_str()
        );
        return Err(CheckoutError::IllegalTransition {
            session_id: session_id.to_string(),
            from: session.status.as_str().to_string(),
            to: target_status.as_str().to_string(),
        });
    }

    if session.payment_status == new_payment_status && session.status == target_status {
        // Already in the target state; repeated application is a no-op.
        return Ok(false);
    }

    let now = Utc::now().timestamp();
    let completed_at = if target_status == SessionStatus::Completed {
        Some(now)
    } else {
        None
    };

    let merged_metadata = metadata.map(|extra| {
        let mut merged = session.metadata.clone();
        merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        serde_json::to_string(&merged).unwrap_or_else(|_| "{}".to_string())
    });

    conn.execute(
        "UPDATE payment_sessions
         SET payment_status = ?2,
             status = ?3,
             updated_at = ?4,
             completed_at = COALESCE(?5, completed_at),
             failure_reason = COALESCE(?6, failure_reason),
             metadata = COALESCE(?7, metadata)
         WHERE session_id = ?1",
        params![
            session_id,
            new_payment_status.as_str(),
            target_status.as_str(),
            now,
            completed_at,
            failure_reason,
            merged_metadata,
        ],
    )
    .map_err(db_err)?;

    Ok(true)
}
