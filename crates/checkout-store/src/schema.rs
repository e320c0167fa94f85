//! # Store Schema
//!
//! SQLite DDL for payment sessions, their line items, webhook event
//! records and the refund ledger. The `webhook_events` primary key IS
//! the idempotency barrier: duplicate deliveries collide on `event_id`
//! at the storage layer, not in application code.

use rusqlite::Connection;

/// Initialize the store schema
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Payment sessions. session_id is opaque and immutable; sessions
        -- are never deleted, only swept by the abandonment janitor while
        -- still pending.
        CREATE TABLE IF NOT EXISTS payment_sessions (
            session_id TEXT PRIMARY KEY,
            user_id INTEGER,
            amount_total_minor INTEGER NOT NULL CHECK (amount_total_minor >= 0),
            currency TEXT NOT NULL,
            payment_status TEXT NOT NULL
                CHECK (payment_status IN ('unpaid', 'paid', 'failed', 'refund_pending', 'refunded')),
            status TEXT NOT NULL
                CHECK (status IN ('pending', 'completed', 'failed', 'cancelled')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            completed_at INTEGER,
            failure_reason TEXT,
            metadata TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_payment_sessions_status ON payment_sessions(status);

        -- Line items, immutable once attached to a session
        CREATE TABLE IF NOT EXISTS line_items (
            session_id TEXT NOT NULL REFERENCES payment_sessions(session_id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            product_id TEXT NOT NULL,
            product_type TEXT NOT NULL CHECK (product_type IN ('tool', 'course')),
            name TEXT NOT NULL,
            unit_amount_minor INTEGER NOT NULL CHECK (unit_amount_minor >= 0),
            quantity INTEGER NOT NULL CHECK (quantity >= 1),
            PRIMARY KEY (session_id, position)
        );

        -- Webhook events. event_id is provider-issued and globally
        -- unique; the primary key closes the race between two concurrent
        -- deliveries of the same event. applied_at stays NULL for
        -- audit-only records (unknown session, illegal edge).
        CREATE TABLE IF NOT EXISTS webhook_events (
            event_id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            session_id TEXT NOT NULL,
            received_at INTEGER NOT NULL,
            applied_at INTEGER,
            raw_payload TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_session ON webhook_events(session_id);

        -- Refund ledger
        CREATE TABLE IF NOT EXISTS refunds (
            refund_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES payment_sessions(session_id),
            amount_minor INTEGER NOT NULL CHECK (amount_minor > 0),
            reason TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'completed', 'failed')),
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_refunds_session ON refunds(session_id);
        "#,
    )?;
    Ok(())
}
