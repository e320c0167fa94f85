//! # Refund Ledger
//!
//! Records and applies refunds against paid sessions. The over-refund
//! bound reserves pending amounts as well as completed ones, so two
//! in-flight refunds can never add up past the session total: completed
//! refunds stay within the total at every point, not just after
//! settlement.

use crate::store::{apply_transition, db_err, load_session, PaymentSessionStore};
use checkout_core::{
    new_refund_id, CheckoutError, CheckoutResult, PaymentStatus, RefundRecord, RefundStatus,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{info, instrument, warn};

/// Ledger of refund requests against completed sessions
#[derive(Clone)]
pub struct RefundLedger {
    store: PaymentSessionStore,
}

impl RefundLedger {
    pub fn new(store: PaymentSessionStore) -> Self {
        Self { store }
    }

    /// Record a refund request against a paid session.
    ///
    /// Fails with `InvalidSessionState` on a session that was never
    /// paid, and with `OverRefund` if completed plus pending refunds
    /// would exceed the session total (a fully-refunded session has an
    /// available balance of zero). A refund covering the full remaining
    /// amount moves the session to `refund_pending`.
    #[instrument(skip(self))]
    pub fn create_refund(
        &self,
        session_id: &str,
        amount_minor: i64,
        reason: &str,
    ) -> CheckoutResult<RefundRecord> {
        if amount_minor <= 0 {
            return Err(CheckoutError::InvalidRequest(
                "refund amount must be positive".to_string(),
            ));
        }

        let mut conn = self.store.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let session = load_session(&tx, session_id)?.ok_or_else(|| {
            CheckoutError::SessionNotFound {
                session_id: session_id.to_string(),
            }
        })?;

        // Unpaid and failed sessions have nothing to draw against; a
        // refund-pending or refunded session falls through to the bound
        // check below, where its exhausted balance rejects the request.
        if matches!(
            session.payment_status,
            PaymentStatus::Unpaid | PaymentStatus::Failed
        ) {
            return Err(CheckoutError::InvalidSessionState {
                session_id: session_id.to_string(),
                state: session.payment_status.as_str().to_string(),
            });
        }

        let reserved = refunded_amount(&tx, session_id, &[RefundStatus::Completed, RefundStatus::Pending])?;
        let available = session.amount_total_minor - reserved;
        if amount_minor > available {
            warn!(
                "over-refund on {}: {} requested, {} available",
                session_id, amount_minor, available
            );
            return Err(CheckoutError::OverRefund {
                session_id: session_id.to_string(),
                requested: amount_minor,
                available,
            });
        }

        let record = RefundRecord {
            refund_id: new_refund_id(),
            session_id: session_id.to_string(),
            amount_minor,
            reason: reason.to_string(),
            status: RefundStatus::Pending,
            created_at: Utc::now(),
        };

        tx.execute(
            "INSERT INTO refunds (refund_id, session_id, amount_minor, reason, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &record.refund_id,
                &record.session_id,
                record.amount_minor,
                &record.reason,
                record.status.as_str(),
                record.created_at.timestamp(),
            ],
        )
        .map_err(db_err)?;

        // Full coverage of the remaining total: the session is now
        // awaiting the provider's refund result.
        if amount_minor == available && session.payment_status == PaymentStatus::Paid {
            apply_transition(
                &tx,
                session_id,
                PaymentStatus::RefundPending,
                None,
                None,
                None,
            )?;
        }

        tx.commit().map_err(db_err)?;

        info!(
            "refund {} created on {}: {} ({})",
            record.refund_id, session_id, amount_minor, reason
        );
        Ok(record)
    }

    /// Settle a refund with the provider's result.
    ///
    /// On success, a refund completing the session's full total moves
    /// `refund_pending -> refunded`; partial refunds leave the session
    /// `paid`. On failure the reservation is released and a
    /// `refund_pending` session recovers to `paid`. Settling a refund
    /// that is already in the target state is a no-op.
    #[instrument(skip(self))]
    pub fn apply_refund_result(
        &self,
        refund_id: &str,
        success: bool,
    ) -> CheckoutResult<RefundRecord> {
        let target = if success {
            RefundStatus::Completed
        } else {
            RefundStatus::Failed
        };

        let mut conn = self.store.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let mut record = find_refund(&tx, refund_id)?.ok_or_else(|| {
            CheckoutError::RefundNotFound {
                refund_id: refund_id.to_string(),
            }
        })?;

        if record.status == target {
            return Ok(record);
        }
        if record.status != RefundStatus::Pending {
            // settled the other way already; a flip would rewrite history
            return Err(CheckoutError::IllegalTransition {
                session_id: record.session_id,
                from: record.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        tx.execute(
            "UPDATE refunds SET status = ?2 WHERE refund_id = ?1",
            params![refund_id, target.as_str()],
        )
        .map_err(db_err)?;
        record.status = target;

        let session = load_session(&tx, &record.session_id)?.ok_or_else(|| {
            CheckoutError::SessionNotFound {
                session_id: record.session_id.clone(),
            }
        })?;

        let completed =
            refunded_amount(&tx, &record.session_id, &[RefundStatus::Completed])?;
        let reserved = refunded_amount(
            &tx,
            &record.session_id,
            &[RefundStatus::Completed, RefundStatus::Pending],
        )?;

        if success && completed == session.amount_total_minor {
            // Fully refunded
            apply_transition(
                &tx,
                &record.session_id,
                PaymentStatus::Refunded,
                None,
                None,
                None,
            )?;
        } else if !success
            && session.payment_status == PaymentStatus::RefundPending
            && reserved < session.amount_total_minor
        {
            // The failed refund was what put the session in
            // refund_pending; recover to paid.
            apply_transition(&tx, &record.session_id, PaymentStatus::Paid, None, None, None)?;
        }

        tx.commit().map_err(db_err)?;

        info!(
            "refund {} {}: session {}",
            refund_id,
            record.status.as_str(),
            record.session_id
        );
        Ok(record)
    }

    /// Look up one refund
    pub fn find(&self, refund_id: &str) -> CheckoutResult<Option<RefundRecord>> {
        let conn = self.store.conn()?;
        find_refund(&conn, refund_id)
    }

    /// All refunds recorded against a session, oldest first
    pub fn for_session(&self, session_id: &str) -> CheckoutResult<Vec<RefundRecord>> {
        let conn = self.store.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT refund_id, session_id, amount_minor, reason, status, created_at
                 FROM refunds WHERE session_id = ?1 ORDER BY created_at, refund_id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![session_id], row_to_refund)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }
}

fn row_to_refund(row: &rusqlite::Row<'_>) -> rusqlite::Result<RefundRecord> {
    let status: String = row.get(4)?;
    let created_at: i64 = row.get(5)?;
    Ok(RefundRecord {
        refund_id: row.get(0)?,
        session_id: row.get(1)?,
        amount_minor: row.get(2)?,
        reason: row.get(3)?,
        status: RefundStatus::parse(&status).unwrap_or(RefundStatus::Failed),
        created_at: chrono::DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
    })
}

fn find_refund(conn: &Connection, refund_id: &str) -> CheckoutResult<Option<RefundRecord>> {
    conn.query_row(
        "SELECT refund_id, session_id, amount_minor, reason, status, created_at
         FROM refunds WHERE refund_id = ?1",
        params![refund_id],
        row_to_refund,
    )
    .optional()
    .map_err(db_err)
}

/// Sum of refund amounts in the given states for a session
fn refunded_amount(
    conn: &Connection,
    session_id: &str,
    states: &[RefundStatus],
) -> CheckoutResult<i64> {
    let placeholders = states
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(amount_minor), 0) FROM refunds
             WHERE session_id = ?1 AND status IN ({})",
            placeholders
        ),
        params![session_id],
        |row| row.get(0),
    )
    .map_err(db_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::{snapshot, CartEntry, Currency, ProductType, SessionStatus};
    use std::collections::HashMap;

    fn paid_session(price: f64) -> (PaymentSessionStore, RefundLedger, String) {
        let store = PaymentSessionStore::in_memory().unwrap();
        let items = snapshot(
            &[CartEntry {
                id: "course-1".into(),
                product_type: ProductType::Course,
                name: "Course".into(),
                price,
                quantity: 1,
            }],
            Currency::USD,
        )
        .unwrap();
        let session = store.create(None, items, Currency::USD).unwrap();
        store
            .mark_completed(&session.session_id, HashMap::new())
            .unwrap();
        let ledger = RefundLedger::new(store.clone());
        (store, ledger, session.session_id)
    }

    #[test]
    fn test_refund_requires_paid_session() {
        let store = PaymentSessionStore::in_memory().unwrap();
        let items = snapshot(
            &[CartEntry {
                id: "c".into(),
                product_type: ProductType::Course,
                name: "C".into(),
                price: 10.0,
                quantity: 1,
            }],
            Currency::USD,
        )
        .unwrap();
        let session = store.create(None, items, Currency::USD).unwrap();
        let ledger = RefundLedger::new(store);

        let err = ledger
            .create_refund(&session.session_id, 100, "requested")
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidSessionState { .. }));
    }

    #[test]
    fn test_full_refund_lifecycle() {
        let (store, ledger, session_id) = paid_session(19.99);

        let refund = ledger.create_refund(&session_id, 1999, "returned").unwrap();
        assert_eq!(refund.status, RefundStatus::Pending);

        // full coverage parks the session in refund_pending
        let session = store.find(&session_id).unwrap().unwrap();
        assert_eq!(session.payment_status, PaymentStatus::RefundPending);

        let settled = ledger.apply_refund_result(&refund.refund_id, true).unwrap();
        assert_eq!(settled.status, RefundStatus::Completed);

        let session = store.find(&session_id).unwrap().unwrap();
        assert_eq!(session.payment_status, PaymentStatus::Refunded);
        // lifecycle axis is untouched by refunds
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn test_partial_refund_keeps_session_paid() {
        let (store, ledger, session_id) = paid_session(19.99);

        let refund = ledger.create_refund(&session_id, 500, "partial").unwrap();
        assert_eq!(
            store.find(&session_id).unwrap().unwrap().payment_status,
            PaymentStatus::Paid
        );

        ledger.apply_refund_result(&refund.refund_id, true).unwrap();
        assert_eq!(
            store.find(&session_id).unwrap().unwrap().payment_status,
            PaymentStatus::Paid
        );
    }

    #[test]
    fn test_over_refund_rejected_and_ledger_unchanged() {
        let (_, ledger, session_id) = paid_session(19.99);

        let refund = ledger.create_refund(&session_id, 1999, "full").unwrap();
        ledger.apply_refund_result(&refund.refund_id, true).unwrap();

        let err = ledger
            .create_refund(&session_id, 1, "one cent more")
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::OverRefund {
                requested: 1,
                available: 0,
                ..
            }
        ));

        let refunds = ledger.for_session(&session_id).unwrap();
        assert_eq!(refunds.len(), 1);
    }

    #[test]
    fn test_over_refund_bound_counts_pending() {
        let (_, ledger, session_id) = paid_session(19.99);

        ledger.create_refund(&session_id, 1500, "first").unwrap();
        let err = ledger
            .create_refund(&session_id, 1000, "second")
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::OverRefund {
                requested: 1000,
                available: 499,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_full_refund_recovers_to_paid() {
        let (store, ledger, session_id) = paid_session(19.99);

        let refund = ledger.create_refund(&session_id, 1999, "full").unwrap();
        assert_eq!(
            store.find(&session_id).unwrap().unwrap().payment_status,
            PaymentStatus::RefundPending
        );

        let settled = ledger.apply_refund_result(&refund.refund_id, false).unwrap();
        assert_eq!(settled.status, RefundStatus::Failed);
        assert_eq!(
            store.find(&session_id).unwrap().unwrap().payment_status,
            PaymentStatus::Paid
        );
    }

    #[test]
    fn test_apply_refund_result_is_idempotent() {
        let (_, ledger, session_id) = paid_session(19.99);
        let refund = ledger.create_refund(&session_id, 500, "partial").unwrap();

        ledger.apply_refund_result(&refund.refund_id, true).unwrap();
        // repeating the same result is a no-op...
        let again = ledger.apply_refund_result(&refund.refund_id, true).unwrap();
        assert_eq!(again.status, RefundStatus::Completed);
        // ...but flipping it is not
        let err = ledger
            .apply_refund_result(&refund.refund_id, false)
            .unwrap_err();
        assert!(matches!(err, CheckoutError::IllegalTransition { .. }));
    }

    #[test]
    fn test_unknown_refund() {
        let (_, ledger, _) = paid_session(10.0);
        let err = ledger.apply_refund_result("rf_ghost", true).unwrap_err();
        assert!(matches!(err, CheckoutError::RefundNotFound { .. }));
    }
}
