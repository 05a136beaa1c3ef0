//! Booking agent

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use converge_config::EntityRulesConfig;
use converge_core::{AgentKind, EntityKey, Error, Provenance, Result};
use converge_persistence::{Booking, BookingStatus, BookingStore};

use super::{TaskAgent, TaskOutcome, TaskRequest};

/// Creates booking records with a generated order id and a computed
/// total (subtotal, discount, taxes).
pub struct BookingAgent {
    store: Arc<dyn BookingStore>,
    rules: Arc<EntityRulesConfig>,
}

impl BookingAgent {
    pub fn new(store: Arc<dyn BookingStore>, rules: Arc<EntityRulesConfig>) -> Self {
        Self { store, rules }
    }

    fn generate_order_id() -> String {
        format!("ORD{:08X}", rand::random::<u32>())
    }

    fn confirmation_text(booking: &Booking) -> String {
        format!(
            "Your booking is confirmed. Order ID {}, scheduled for {} at {}. \
The total is ₹{:.2} including taxes.",
            booking.order_id, booking.scheduled_date, booking.scheduled_time, booking.total
        )
    }
}

#[async_trait]
impl TaskAgent for BookingAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Booking
    }

    async fn execute(&self, request: &TaskRequest) -> Result<TaskOutcome> {
        // Idempotence: a replayed confirmation returns the original record
        if let Some(existing) = self
            .store
            .find_by_nonce(&request.session_id, &request.confirmation_nonce)
            .await?
        {
            tracing::info!(
                order_id = %existing.order_id,
                session_id = %request.session_id,
                "replayed confirmation, returning existing booking"
            );
            return Ok(TaskOutcome {
                response: Self::confirmation_text(&existing),
                action_taken: "booking_already_confirmed".to_string(),
                provenance: Provenance::table("bookings"),
                needs_review: None,
            });
        }

        let service_id = request.entity(EntityKey::ServiceType)?;
        let date_str = request.entity(EntityKey::PreferredDate)?;
        let time = request.entity(EntityKey::PreferredTime)?;
        let location = request.entity(EntityKey::Location)?;

        let scheduled_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|e| Error::StateCorruption(format!("unparseable confirmed date: {}", e)))?;

        let service = self
            .rules
            .service_type(service_id)
            .ok_or_else(|| Error::Validation(format!("unknown service type {}", service_id)))?;

        let subtotal = service.base_price;
        let discount = subtotal * self.rules.pricing.default_discount;
        let tax = (subtotal - discount) * self.rules.pricing.tax_rate;
        let total = subtotal - discount + tax;

        let now = Utc::now();
        let booking = Booking {
            order_id: Self::generate_order_id(),
            user_id: request.user_id,
            session_id: request.session_id.clone(),
            service_type: service_id.to_string(),
            scheduled_date,
            scheduled_time: time.to_string(),
            location: location.to_string(),
            status: BookingStatus::Confirmed,
            subtotal,
            discount,
            tax,
            total,
            refund_amount: None,
            confirmation_nonce: request.confirmation_nonce.clone(),
            created_at: now,
            updated_at: now,
        };

        self.store.create(&booking).await?;

        Ok(TaskOutcome {
            response: Self::confirmation_text(&booking),
            action_taken: "booking_created".to_string(),
            provenance: Provenance::table("bookings"),
            needs_review: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::IntentKind;
    use converge_persistence::InMemoryBookingStore;
    use std::collections::HashMap;

    fn request() -> TaskRequest {
        let mut entities = HashMap::new();
        entities.insert(EntityKey::ServiceType, "ac_service".to_string());
        entities.insert(EntityKey::PreferredDate, "2026-08-02".to_string());
        entities.insert(EntityKey::PreferredTime, "15:00".to_string());
        entities.insert(EntityKey::Location, "282002".to_string());
        TaskRequest {
            intent: IntentKind::BookingCreate,
            entities,
            user_id: 7,
            session_id: "s1".to_string(),
            confirmation_nonce: "nonce-1".to_string(),
            confidence: 0.95,
        }
    }

    #[tokio::test]
    async fn test_booking_creation_with_totals() {
        let store = Arc::new(InMemoryBookingStore::new());
        let agent = BookingAgent::new(store.clone(), Arc::new(EntityRulesConfig::default()));

        let outcome = agent.execute(&request()).await.unwrap();
        assert_eq!(outcome.action_taken, "booking_created");
        assert!(outcome.response.contains("Your booking is confirmed. Order ID ORD"));
        assert!(outcome.response.contains("2026-08-02"));
        assert!(outcome.response.contains("15:00"));
        assert_eq!(outcome.provenance.tables, vec!["bookings"]);

        let bookings = store.list_for_user(7, 10).await.unwrap();
        assert_eq!(bookings.len(), 1);
        // 599 + 18% GST
        assert!((bookings[0].total - 706.82).abs() < 0.01);
        assert!(bookings[0].order_id.starts_with("ORD"));
        assert_eq!(bookings[0].order_id.len(), 11);
    }

    #[tokio::test]
    async fn test_replayed_confirmation_writes_once() {
        let store = Arc::new(InMemoryBookingStore::new());
        let agent = BookingAgent::new(store.clone(), Arc::new(EntityRulesConfig::default()));

        let first = agent.execute(&request()).await.unwrap();
        let second = agent.execute(&request()).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(second.action_taken, "booking_already_confirmed");
        // Same order id in both responses
        let id = |r: &str| r.split("Order ID ").nth(1).unwrap()[..11].to_string();
        assert_eq!(id(&first.response), id(&second.response));
    }

    #[tokio::test]
    async fn test_unknown_service_type_rejected() {
        let agent = BookingAgent::new(
            Arc::new(InMemoryBookingStore::new()),
            Arc::new(EntityRulesConfig::default()),
        );
        let mut req = request();
        req.entities
            .insert(EntityKey::ServiceType, "rocketry".to_string());

        assert!(matches!(
            agent.execute(&req).await,
            Err(Error::Validation(_))
        ));
    }
}
