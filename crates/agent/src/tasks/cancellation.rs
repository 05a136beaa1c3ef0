//! Cancellation agent

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::sync::Arc;

use converge_config::SlaSettings;
use converge_core::{AgentKind, EntityKey, Provenance, Result};
use converge_persistence::{Booking, BookingStatus, BookingStore};

use super::{TaskAgent, TaskOutcome, TaskRequest};

/// Verifies ownership, applies the refund-window rule and cancels the
/// booking.
pub struct CancellationAgent {
    store: Arc<dyn BookingStore>,
    sla: SlaSettings,
}

impl CancellationAgent {
    pub fn new(store: Arc<dyn BookingStore>, sla: SlaSettings) -> Self {
        Self { store, sla }
    }

    /// Refund fraction for a cancellation this many hours ahead of the
    /// visit. Windows are ordered most generous first.
    fn refund_fraction(&self, hours_before: f32) -> (f32, String) {
        for window in &self.sla.refund_windows {
            if hours_before >= window.min_hours_before {
                return (window.refund_fraction, window.label.clone());
            }
        }
        (0.0, "none".to_string())
    }

    fn cancellation_text(&self, booking: &Booking, refund: f64, label: &str) -> String {
        if refund > 0.0 {
            format!(
                "Your booking {} is cancelled. A {} refund of ₹{:.2} will reach your account \
within {} business days.",
                booking.order_id, label, refund, self.sla.refund_processing_days
            )
        } else {
            format!(
                "Your booking {} is cancelled. As the visit was less than {} hours away, \
this cancellation isn't eligible for a refund.",
                booking.order_id,
                self.sla
                    .refund_windows
                    .iter()
                    .rev()
                    .find(|w| w.refund_fraction > 0.0)
                    .map(|w| w.min_hours_before)
                    .unwrap_or(2.0)
            )
        }
    }
}

#[async_trait]
impl TaskAgent for CancellationAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Cancellation
    }

    async fn execute(&self, request: &TaskRequest) -> Result<TaskOutcome> {
        let order_id = request.entity(EntityKey::BookingId)?;

        let Some(mut booking) = self.store.get(request.user_id, order_id).await? else {
            // Ownership failure: polite response plus a review entry
            return Ok(TaskOutcome {
                response: format!(
                    "I couldn't find booking {} on your account. Could you double-check the \
order ID? It's on your booking confirmation.",
                    order_id
                ),
                action_taken: "booking_not_found".to_string(),
                provenance: Provenance::table("bookings"),
                needs_review: Some(format!("cancellation for unknown booking {}", order_id)),
            });
        };

        if booking.status == BookingStatus::Cancelled {
            let refund = booking.refund_amount.unwrap_or(0.0);
            return Ok(TaskOutcome {
                response: format!(
                    "Booking {} is already cancelled{}.",
                    booking.order_id,
                    if refund > 0.0 {
                        format!(" — a refund of ₹{:.2} is on its way", refund)
                    } else {
                        String::new()
                    }
                ),
                action_taken: "booking_already_cancelled".to_string(),
                provenance: Provenance::table("bookings"),
                needs_review: None,
            });
        }

        let scheduled = NaiveDateTime::new(
            booking.scheduled_date,
            NaiveTime::parse_from_str(&booking.scheduled_time, "%H:%M")
                .unwrap_or_else(|_| NaiveTime::from_hms_opt(12, 0, 0).unwrap()),
        );
        let scheduled_utc = Utc.from_utc_datetime(&scheduled);
        let hours_before = (scheduled_utc - Utc::now()).num_minutes() as f32 / 60.0;

        let (fraction, label) = self.refund_fraction(hours_before.max(0.0));
        let refund = booking.total * fraction as f64;

        booking.status = BookingStatus::Cancelled;
        booking.refund_amount = Some(refund);
        booking.updated_at = Utc::now();
        self.store.update(&booking).await?;

        tracing::info!(
            order_id = %booking.order_id,
            hours_before,
            refund_label = %label,
            refund,
            "booking cancelled"
        );

        Ok(TaskOutcome {
            response: self.cancellation_text(&booking, refund, &label),
            action_taken: "booking_cancelled".to_string(),
            provenance: Provenance::table("bookings"),
            needs_review: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use converge_core::IntentKind;
    use converge_persistence::InMemoryBookingStore;
    use std::collections::HashMap;

    fn request(order_id: &str) -> TaskRequest {
        let mut entities = HashMap::new();
        entities.insert(EntityKey::BookingId, order_id.to_string());
        TaskRequest {
            intent: IntentKind::BookingCancel,
            entities,
            user_id: 7,
            session_id: "s1".to_string(),
            confirmation_nonce: "nonce-1".to_string(),
            confidence: 0.92,
        }
    }

    async fn seed_booking(store: &InMemoryBookingStore, hours_ahead: i64) -> Booking {
        let scheduled = Utc::now() + Duration::hours(hours_ahead);
        let booking = Booking {
            order_id: "ORD11112222".to_string(),
            user_id: 7,
            session_id: "s0".to_string(),
            service_type: "ac_service".to_string(),
            scheduled_date: scheduled.date_naive(),
            scheduled_time: scheduled.format("%H:%M").to_string(),
            location: "282002".to_string(),
            status: BookingStatus::Confirmed,
            subtotal: 599.0,
            discount: 0.0,
            tax: 107.82,
            total: 706.82,
            refund_amount: None,
            confirmation_nonce: "orig".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create(&booking).await.unwrap();
        booking
    }

    #[tokio::test]
    async fn test_full_refund_outside_24_hours() {
        let store = Arc::new(InMemoryBookingStore::new());
        seed_booking(&store, 48).await;
        let agent = CancellationAgent::new(store.clone(), SlaSettings::default());

        let outcome = agent.execute(&request("ORD11112222")).await.unwrap();
        assert_eq!(outcome.action_taken, "booking_cancelled");
        assert!(outcome.response.contains("full refund"));
        assert!(outcome.response.contains("706.82"));

        let booking = store.get(7, "ORD11112222").await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.refund_amount, Some(706.82));
    }

    #[tokio::test]
    async fn test_partial_refund_inside_24_hours() {
        let store = Arc::new(InMemoryBookingStore::new());
        seed_booking(&store, 6).await;
        let agent = CancellationAgent::new(store.clone(), SlaSettings::default());

        let outcome = agent.execute(&request("ORD11112222")).await.unwrap();
        assert!(outcome.response.contains("partial refund"));
        let booking = store.get(7, "ORD11112222").await.unwrap().unwrap();
        assert!((booking.refund_amount.unwrap() - 353.41).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_no_refund_at_the_last_minute() {
        let store = Arc::new(InMemoryBookingStore::new());
        seed_booking(&store, 1).await;
        let agent = CancellationAgent::new(store.clone(), SlaSettings::default());

        let outcome = agent.execute(&request("ORD11112222")).await.unwrap();
        assert!(outcome.response.contains("isn't eligible for a refund"));
        let booking = store.get(7, "ORD11112222").await.unwrap().unwrap();
        assert_eq!(booking.refund_amount, Some(0.0));
    }

    #[tokio::test]
    async fn test_unknown_booking_flags_review() {
        let store = Arc::new(InMemoryBookingStore::new());
        let agent = CancellationAgent::new(store, SlaSettings::default());

        let outcome = agent.execute(&request("ORD99999999")).await.unwrap();
        assert_eq!(outcome.action_taken, "booking_not_found");
        assert!(outcome.needs_review.is_some());
        assert!(outcome.response.contains("ORD99999999"));
    }

    #[tokio::test]
    async fn test_someone_elses_booking_is_invisible() {
        let store = Arc::new(InMemoryBookingStore::new());
        seed_booking(&store, 48).await;
        let agent = CancellationAgent::new(store, SlaSettings::default());

        let mut req = request("ORD11112222");
        req.user_id = 99;
        let outcome = agent.execute(&req).await.unwrap();
        assert_eq!(outcome.action_taken, "booking_not_found");
    }

    #[tokio::test]
    async fn test_repeat_cancellation_is_idempotent() {
        let store = Arc::new(InMemoryBookingStore::new());
        seed_booking(&store, 48).await;
        let agent = CancellationAgent::new(store.clone(), SlaSettings::default());

        agent.execute(&request("ORD11112222")).await.unwrap();
        let second = agent.execute(&request("ORD11112222")).await.unwrap();
        assert_eq!(second.action_taken, "booking_already_cancelled");
        assert!(second.response.contains("706.82"));
    }
}
