//! # Webhook Processor
//!
//! Ingests provider notifications and applies them exactly once in
//! effect. Delivery is at-least-once, so the `event_id` primary key in
//! `webhook_events` is the idempotency barrier: the duplicate guard is a
//! unique-constraint-backed insert, and the event record commits in the
//! same transaction as the session transition it causes.

use crate::signature;
use crate::store::{apply_transition, db_err, load_session, PaymentSessionStore};
use checkout_core::{
    CheckoutError, CheckoutResult, IgnoreReason, PaymentSession, PaymentStatus, SessionStatus,
    WebhookEvent, WebhookEventType, WebhookOutcome,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Downstream effects of a settled payment. Implementations must be
/// idempotent for a given session — the processor guarantees at most one
/// invocation per event, but semantically-equal events with distinct ids
/// can arrive.
#[allow(unused_variables)]
pub trait SettlementHooks: Send + Sync {
    /// A session reached `paid`. Clear the customer's cart, send the
    /// confirmation, unlock the purchase.
    fn on_session_paid(&self, session: &PaymentSession) {}

    /// A session failed or was cancelled.
    fn on_session_closed(&self, session: &PaymentSession) {}
}

/// Default hooks: log and nothing else
pub struct LoggingHooks;

impl SettlementHooks for LoggingHooks {
    fn on_session_paid(&self, session: &PaymentSession) {
        info!(
            "session {} paid: {} {}",
            session.session_id, session.amount_total_minor, session.currency
        );
    }

    fn on_session_closed(&self, session: &PaymentSession) {
        info!(
            "session {} closed: {}",
            session.session_id,
            session.status.as_str()
        );
    }
}

/// Provider event envelope
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: EventObject,
}

#[derive(Debug, Deserialize)]
struct EventObject {
    /// The session the event refers to
    id: String,
}

/// Verifies and idempotently applies provider notifications
pub struct WebhookProcessor {
    store: PaymentSessionStore,
    secret: String,
    hooks: Arc<dyn SettlementHooks>,
}

impl WebhookProcessor {
    pub fn new(store: PaymentSessionStore, secret: impl Into<String>) -> Self {
        Self {
            store,
            secret: secret.into(),
            hooks: Arc::new(LoggingHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SettlementHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Verify and apply one delivery.
    ///
    /// - `Applied` — the event's transition was committed
    /// - `Ignored` — duplicate, unknown event type, or illegal edge;
    ///   acknowledged so the provider stops retrying
    /// - `Err(Verification)` — bad signature, nothing touched the store
    /// - `Err(UnknownSession)` — event recorded for audit, no mutation
    #[instrument(skip(self, raw_body, signature_header))]
    pub fn handle(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> CheckoutResult<WebhookOutcome> {
        // 1. Authenticity first; a forged delivery must not touch state.
        signature::verify(&self.secret, raw_body, signature_header)?;

        let envelope: EventEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| CheckoutError::WebhookParse(e.to_string()))?;
        let event_type = WebhookEventType::from_provider_type(&envelope.event_type);
        let session_id = envelope.data.object.id.clone();

        debug!(
            "webhook {}: {} for {}",
            envelope.id, envelope.event_type, session_id
        );

        let mut conn = self.store.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let now = Utc::now().timestamp();

        // 2. Idempotency barrier: the insert either claims the event_id
        // or collides with an earlier delivery.
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO webhook_events
                     (event_id, event_type, session_id, received_at, raw_payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    &envelope.id,
                    &envelope.event_type,
                    &session_id,
                    now,
                    String::from_utf8_lossy(raw_body).into_owned(),
                ],
            )
            .map_err(db_err)?;

        if inserted == 0 {
            let already_applied: Option<i64> = tx
                .query_row(
                    "SELECT applied_at FROM webhook_events WHERE event_id = ?1",
                    params![&envelope.id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?
                .flatten();

            if already_applied.is_some() {
                tx.commit().map_err(db_err)?;
                info!("webhook {} ignored: duplicate delivery", envelope.id);
                return Ok(WebhookOutcome::Ignored {
                    reason: IgnoreReason::Duplicate,
                });
            }
            // Recorded earlier but never applied (e.g. the session was
            // unknown then) — fall through and try again.
        }

        // 3. Resolve the session. Unknown: keep the audit record, no
        // mutation, non-fatal for the caller's retry logic.
        let session = match load_session(&tx, &session_id)? {
            Some(s) => s,
            None => {
                tx.commit().map_err(db_err)?;
                warn!(
                    "webhook {} references unknown session {}",
                    envelope.id, session_id
                );
                return Err(CheckoutError::UnknownSession { session_id });
            }
        };

        let (new_payment_status, new_status) = match &event_type {
            WebhookEventType::PaymentSucceeded => {
                (PaymentStatus::Paid, Some(SessionStatus::Completed))
            }
            WebhookEventType::PaymentFailed => {
                (PaymentStatus::Failed, Some(SessionStatus::Failed))
            }
            WebhookEventType::CheckoutCancelled => {
                (session.payment_status, Some(SessionStatus::Cancelled))
            }
            WebhookEventType::Unknown(other) => {
                tx.commit().map_err(db_err)?;
                debug!("webhook {} ignored: unhandled type {}", envelope.id, other);
                return Ok(WebhookOutcome::Ignored {
                    reason: IgnoreReason::UnknownEventType,
                });
            }
        };

        // 4. Transition and event record commit together.
        let changed = match apply_transition(
            &tx,
            &session_id,
            new_payment_status,
            new_status,
            None,
            None,
        ) {
            Ok(changed) => changed,
            Err(CheckoutError::IllegalTransition { from, to, .. }) => {
                // Out-of-order or replayed event taking an illegal edge:
                // keep the audit record unapplied, acknowledge, log for
                // investigation.
                tx.commit().map_err(db_err)?;
                warn!(
                    "webhook {} ignored: illegal edge {} -> {} on {}",
                    envelope.id, from, to, session_id
                );
                return Ok(WebhookOutcome::Ignored {
                    reason: IgnoreReason::IllegalEdge,
                });
            }
            Err(e) => return Err(e),
        };

        tx.execute(
            "UPDATE webhook_events SET applied_at = ?2 WHERE event_id = ?1",
            params![&envelope.id, now],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        // release the pooled connection before re-entering the store
        drop(conn);

        // 5. Downstream effects fire only after the durable commit, and
        // only when state actually moved.
        if changed {
            if let Some(updated) = self.store.find(&session_id)? {
                match event_type {
                    WebhookEventType::PaymentSucceeded => self.hooks.on_session_paid(&updated),
                    WebhookEventType::PaymentFailed | WebhookEventType::CheckoutCancelled => {
                        self.hooks.on_session_closed(&updated)
                    }
                    WebhookEventType::Unknown(_) => {}
                }
            }
        }

        info!(
            "webhook {} applied: {} now {}/{}",
            envelope.id,
            session_id,
            new_payment_status.as_str(),
            new_status.unwrap_or(session.status).as_str()
        );
        Ok(WebhookOutcome::Applied)
    }

    /// Audit lookup of a recorded event. `applied_at` is `None` for
    /// records that were received but never applied.
    pub fn find_event(&self, event_id: &str) -> CheckoutResult<Option<WebhookEvent>> {
        let conn = self.store.conn()?;
        conn.query_row(
            "SELECT event_id, event_type, session_id, received_at, applied_at, raw_payload
             FROM webhook_events WHERE event_id = ?1",
            params![event_id],
            |row| {
                let received_at: i64 = row.get(3)?;
                let applied_at: Option<i64> = row.get(4)?;
                let raw: Option<String> = row.get(5)?;
                let event_type: String = row.get(1)?;
                Ok(WebhookEvent {
                    event_id: row.get(0)?,
                    event_type: WebhookEventType::from_provider_type(&event_type),
                    session_id: row.get(2)?,
                    received_at: DateTime::from_timestamp(received_at, 0)
                        .unwrap_or_else(Utc::now),
                    applied_at: applied_at
                        .map(|ts| DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)),
                    raw_payload: raw.and_then(|r| serde_json::from_str(&r).ok()),
                })
            },
        )
        .optional()
        .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::{snapshot, CartEntry, Currency, ProductType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "whsec_test_secret";

    struct CountingHooks {
        paid: AtomicUsize,
        closed: AtomicUsize,
    }

    impl CountingHooks {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                paid: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            })
        }
    }

    impl SettlementHooks for CountingHooks {
        fn on_session_paid(&self, _session: &PaymentSession) {
            self.paid.fetch_add(1, Ordering::SeqCst);
        }

        fn on_session_closed(&self, _session: &PaymentSession) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn store_with_session() -> (PaymentSessionStore, String) {
        let store = PaymentSessionStore::in_memory().unwrap();
        let items = snapshot(
            &[CartEntry {
                id: "course-1".into(),
                product_type: ProductType::Course,
                name: "Course".into(),
                price: 19.99,
                quantity: 1,
            }],
            Currency::USD,
        )
        .unwrap();
        let session = store.create(None, items, Currency::USD).unwrap();
        let id = session.session_id;
        (store, id)
    }

    fn event_body(event_id: &str, event_type: &str, session_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": event_id,
            "type": event_type,
            "created": Utc::now().timestamp(),
            "data": { "object": { "id": session_id } }
        }))
        .unwrap()
    }

    fn deliver(
        processor: &WebhookProcessor,
        event_id: &str,
        event_type: &str,
        session_id: &str,
    ) -> CheckoutResult<WebhookOutcome> {
        let body = event_body(event_id, event_type, session_id);
        let header = signature::sign(SECRET, &body, Utc::now().timestamp());
        processor.handle(&body, &header)
    }

    #[test]
    fn test_paid_event_applies_transition_and_hook() {
        let (store, session_id) = store_with_session();
        let hooks = CountingHooks::new();
        let processor =
            WebhookProcessor::new(store.clone(), SECRET).with_hooks(hooks.clone());

        let outcome = deliver(&processor, "evt_1", "checkout.session.paid", &session_id).unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied);

        let session = store.find(&session_id).unwrap().unwrap();
        assert_eq!(session.payment_status, PaymentStatus::Paid);
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.completed_at.is_some());
        assert_eq!(hooks.paid.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_event_applies_once() {
        let (store, session_id) = store_with_session();
        let hooks = CountingHooks::new();
        let processor =
            WebhookProcessor::new(store.clone(), SECRET).with_hooks(hooks.clone());

        let first = deliver(&processor, "evt_1", "checkout.session.paid", &session_id).unwrap();
        let second = deliver(&processor, "evt_1", "checkout.session.paid", &session_id).unwrap();

        assert_eq!(first, WebhookOutcome::Applied);
        assert_eq!(
            second,
            WebhookOutcome::Ignored {
                reason: IgnoreReason::Duplicate
            }
        );
        // exactly one state transition, exactly one side-effect emission
        assert_eq!(hooks.paid.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bad_signature_touches_nothing() {
        let (store, session_id) = store_with_session();
        let processor = WebhookProcessor::new(store.clone(), SECRET);

        let body = event_body("evt_1", "checkout.session.paid", &session_id);
        let header = signature::sign("whsec_wrong", &body, Utc::now().timestamp());

        let err = processor.handle(&body, &header).unwrap_err();
        assert!(matches!(err, CheckoutError::Verification(_)));

        // session untouched, and the event_id is still free
        let session = store.find(&session_id).unwrap().unwrap();
        assert_eq!(session.payment_status, PaymentStatus::Unpaid);
        let good_header = signature::sign(SECRET, &body, Utc::now().timestamp());
        assert_eq!(
            processor.handle(&body, &good_header).unwrap(),
            WebhookOutcome::Applied
        );
    }

    #[test]
    fn test_unknown_session_recorded_not_applied() {
        let (store, _) = store_with_session();
        let processor = WebhookProcessor::new(store, SECRET);

        let err = deliver(&processor, "evt_9", "checkout.session.paid", "cks_ghost").unwrap_err();
        assert!(matches!(err, CheckoutError::UnknownSession { .. }));

        // recorded for audit, never applied
        let event = processor.find_event("evt_9").unwrap().unwrap();
        assert_eq!(event.session_id, "cks_ghost");
        assert!(event.applied_at.is_none());
        assert!(event.raw_payload.is_some());
    }

    #[test]
    fn test_applied_event_is_stamped() {
        let (store, session_id) = store_with_session();
        let processor = WebhookProcessor::new(store, SECRET);

        deliver(&processor, "evt_1", "checkout.session.paid", &session_id).unwrap();

        let event = processor.find_event("evt_1").unwrap().unwrap();
        assert_eq!(event.event_type, WebhookEventType::PaymentSucceeded);
        assert!(event.applied_at.is_some());
        assert!(processor.find_event("evt_void").unwrap().is_none());
    }

    #[test]
    fn test_unknown_event_type_ignored() {
        let (store, session_id) = store_with_session();
        let processor = WebhookProcessor::new(store.clone(), SECRET);

        let outcome = deliver(&processor, "evt_2", "invoice.created", &session_id).unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                reason: IgnoreReason::UnknownEventType
            }
        );
        let session = store.find(&session_id).unwrap().unwrap();
        assert_eq!(session.payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn test_out_of_order_event_ignored() {
        let (store, session_id) = store_with_session();
        let processor = WebhookProcessor::new(store.clone(), SECRET);

        deliver(&processor, "evt_1", "checkout.session.paid", &session_id).unwrap();

        // a late "payment_failed" for a completed session is an illegal
        // edge: acknowledged, never applied
        let outcome = deliver(
            &processor,
            "evt_2",
            "checkout.session.payment_failed",
            &session_id,
        )
        .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                reason: IgnoreReason::IllegalEdge
            }
        );

        let session = store.find(&session_id).unwrap().unwrap();
        assert_eq!(session.payment_status, PaymentStatus::Paid);
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn test_cancelled_event_closes_session() {
        let (store, session_id) = store_with_session();
        let hooks = CountingHooks::new();
        let processor =
            WebhookProcessor::new(store.clone(), SECRET).with_hooks(hooks.clone());

        let outcome =
            deliver(&processor, "evt_3", "checkout.session.cancelled", &session_id).unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied);

        let session = store.find(&session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Cancelled);
        assert_eq!(session.payment_status, PaymentStatus::Unpaid);
        assert_eq!(hooks.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unparsable_body_rejected_after_verification() {
        let (store, _) = store_with_session();
        let processor = WebhookProcessor::new(store, SECRET);

        let body = b"not json at all";
        let header = signature::sign(SECRET, body, Utc::now().timestamp());
        let err = processor.handle(body, &header).unwrap_err();
        assert!(matches!(err, CheckoutError::WebhookParse(_)));
    }
}
