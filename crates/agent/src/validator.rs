//! Entity validator
//!
//! Business rules over normalized values. Side-effect-free except for
//! the booking-ownership lookup. Invalid outcomes carry an empathetic
//! error message and up to three suggested valid values.

use chrono::{Duration, NaiveDate, NaiveTime};
use std::sync::Arc;

use converge_config::EntityRulesConfig;
use converge_core::EntityKey;
use converge_persistence::BookingStore;

/// Validation result.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub key: EntityKey,
    pub is_valid: bool,
    pub normalized_value: String,
    pub error_message: Option<String>,
    pub suggestions: Vec<String>,
}

impl ValidationOutcome {
    pub fn valid(key: EntityKey, value: impl Into<String>) -> Self {
        Self {
            key,
            is_valid: true,
            normalized_value: value.into(),
            error_message: None,
            suggestions: Vec::new(),
        }
    }

    pub fn invalid(
        key: EntityKey,
        value: impl Into<String>,
        message: impl Into<String>,
        suggestions: Vec<String>,
    ) -> Self {
        let mut suggestions = suggestions;
        suggestions.truncate(3);
        Self {
            key,
            is_valid: false,
            normalized_value: value.into(),
            error_message: Some(message.into()),
            suggestions,
        }
    }
}

/// Rule-driven validator.
pub struct EntityValidator {
    rules: Arc<EntityRulesConfig>,
    /// Present when booking-ownership checks are possible
    bookings: Option<Arc<dyn BookingStore>>,
}

impl EntityValidator {
    pub fn new(rules: Arc<EntityRulesConfig>) -> Self {
        Self {
            rules,
            bookings: None,
        }
    }

    pub fn with_booking_store(mut self, bookings: Arc<dyn BookingStore>) -> Self {
        self.bookings = Some(bookings);
        self
    }

    /// Validate a normalized value for a user.
    pub async fn validate(
        &self,
        key: EntityKey,
        value: &str,
        user_id: i64,
        today: NaiveDate,
    ) -> ValidationOutcome {
        match key {
            EntityKey::PreferredDate => self.validate_date(value, today),
            EntityKey::PreferredTime => self.validate_time(value),
            EntityKey::Location => self.validate_location(value),
            EntityKey::BookingId => self.validate_booking_id(value, user_id).await,
            EntityKey::ServiceType => self.validate_service_type(value),
            EntityKey::IssueType => self.validate_issue_type(value),
            EntityKey::Description => self.validate_description(value),
            EntityKey::Quantity => self.validate_quantity(value),
            EntityKey::PaymentMethod => self.validate_payment_method(value),
        }
    }

    fn validate_date(&self, value: &str, today: NaiveDate) -> ValidationOutcome {
        let key = EntityKey::PreferredDate;
        let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") else {
            return ValidationOutcome::invalid(
                key,
                value,
                "Sorry, I couldn't read that as a date.",
                self.rules.date_suggestions.clone(),
            );
        };
        if date < today {
            return ValidationOutcome::invalid(
                key,
                value,
                "Sorry, the date must be today or in the future.",
                self.rules.date_suggestions.clone(),
            );
        }
        if date > today + Duration::days(self.rules.booking_window_days) {
            return ValidationOutcome::invalid(
                key,
                value,
                format!(
                    "Sorry, we can only take bookings up to {} days ahead.",
                    self.rules.booking_window_days
                ),
                self.rules.date_suggestions.clone(),
            );
        }
        ValidationOutcome::valid(key, value)
    }

    fn validate_time(&self, value: &str) -> ValidationOutcome {
        let key = EntityKey::PreferredTime;
        let Ok(time) = NaiveTime::parse_from_str(value, "%H:%M") else {
            // Day-part words ("afternoon") land here
            return ValidationOutcome::invalid(
                key,
                value,
                "Could you give me a specific time? Something like '3 PM' or '15:00' works.",
                self.rules.time_suggestions.clone(),
            );
        };

        let start = NaiveTime::parse_from_str(&self.rules.service_hours.start, "%H:%M")
            .unwrap_or_else(|_| NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        let end = NaiveTime::parse_from_str(&self.rules.service_hours.end, "%H:%M")
            .unwrap_or_else(|_| NaiveTime::from_hms_opt(20, 0, 0).unwrap());

        if time < start || time > end {
            return ValidationOutcome::invalid(
                key,
                value,
                format!(
                    "Sorry, our technicians work between {} and {}.",
                    self.rules.service_hours.start, self.rules.service_hours.end
                ),
                self.rules.time_suggestions.clone(),
            );
        }
        ValidationOutcome::valid(key, value)
    }

    fn validate_location(&self, value: &str) -> ValidationOutcome {
        let key = EntityKey::Location;
        let is_pincode = value.len() == 6 && value.chars().all(|c| c.is_ascii_digit());
        let covered = if is_pincode {
            self.rules.service_area.covers_pincode(value)
        } else {
            self.rules.service_area.covers_city(value)
        };

        if covered {
            ValidationOutcome::valid(key, value)
        } else {
            ValidationOutcome::invalid(
                key,
                value,
                "I'm sorry, we don't serve that area just yet.",
                self.rules.service_area.cities.clone(),
            )
        }
    }

    async fn validate_booking_id(&self, value: &str, user_id: i64) -> ValidationOutcome {
        let key = EntityKey::BookingId;
        if !value.starts_with("ORD") || value.len() < 6 {
            return ValidationOutcome::invalid(
                key,
                value,
                "That doesn't look like one of our booking IDs — they start with ORD.",
                Vec::new(),
            );
        }

        if let Some(ref bookings) = self.bookings {
            match bookings.get(user_id, value).await {
                Ok(Some(_)) => ValidationOutcome::valid(key, value),
                Ok(None) => ValidationOutcome::invalid(
                    key,
                    value,
                    format!("I couldn't find booking {} on your account.", value),
                    Vec::new(),
                ),
                Err(e) => {
                    // Lookup failure is not the user's fault; accept the
                    // shape and let the task agent re-verify
                    tracing::warn!(error = %e, "booking lookup failed during validation");
                    ValidationOutcome::valid(key, value)
                }
            }
        } else {
            ValidationOutcome::valid(key, value)
        }
    }

    fn validate_service_type(&self, value: &str) -> ValidationOutcome {
        let key = EntityKey::ServiceType;
        if self.rules.service_type(value).is_some() {
            ValidationOutcome::valid(key, value)
        } else {
            ValidationOutcome::invalid(
                key,
                value,
                "Sorry, that's not a service we offer yet.",
                self.rules
                    .service_types
                    .iter()
                    .map(|s| s.display.clone())
                    .collect(),
            )
        }
    }

    fn validate_issue_type(&self, value: &str) -> ValidationOutcome {
        let key = EntityKey::IssueType;
        if self.rules.issue_type(value).is_some() {
            ValidationOutcome::valid(key, value)
        } else {
            ValidationOutcome::invalid(
                key,
                value,
                "Could you tell me which of these fits best?",
                self.rules
                    .issue_types
                    .iter()
                    .map(|s| s.display.clone())
                    .collect(),
            )
        }
    }

    fn validate_description(&self, value: &str) -> ValidationOutcome {
        let key = EntityKey::Description;
        if value.trim().len() >= 10 {
            ValidationOutcome::valid(key, value.trim())
        } else {
            ValidationOutcome::invalid(
                key,
                value,
                "Could you share a little more detail so we can put it right?",
                Vec::new(),
            )
        }
    }

    fn validate_quantity(&self, value: &str) -> ValidationOutcome {
        let key = EntityKey::Quantity;
        match value.parse::<u32>() {
            Ok(n) if (1..=20).contains(&n) => ValidationOutcome::valid(key, value),
            _ => ValidationOutcome::invalid(
                key,
                value,
                "Sorry, I need a quantity between 1 and 20.",
                vec!["1".to_string(), "2".to_string()],
            ),
        }
    }

    fn validate_payment_method(&self, value: &str) -> ValidationOutcome {
        let key = EntityKey::PaymentMethod;
        if self.rules.payment_methods.iter().any(|m| m == value) {
            ValidationOutcome::valid(key, value)
        } else {
            ValidationOutcome::invalid(
                key,
                value,
                "Sorry, we can't take that payment method.",
                self.rules.payment_methods.clone(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> EntityValidator {
        EntityValidator::new(Arc::new(EntityRulesConfig::default()))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
    }

    #[tokio::test]
    async fn test_date_boundaries() {
        let v = validator();
        // Today is accepted even at the end of the day
        assert!(v.validate(EntityKey::PreferredDate, "2026-08-01", 1, today()).await.is_valid);
        // Yesterday is rejected with the suggestion list
        let past = v
            .validate(EntityKey::PreferredDate, "2026-07-31", 1, today())
            .await;
        assert!(!past.is_valid);
        assert_eq!(
            past.error_message.as_deref(),
            Some("Sorry, the date must be today or in the future.")
        );
        assert_eq!(past.suggestions, vec!["today", "tomorrow", "next Monday"]);

        // Exactly 90 days ahead is in; 91 is out
        assert!(v.validate(EntityKey::PreferredDate, "2026-10-30", 1, today()).await.is_valid);
        let far = v
            .validate(EntityKey::PreferredDate, "2026-10-31", 1, today())
            .await;
        assert!(!far.is_valid);
        assert!(!far.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_time_boundaries() {
        let v = validator();
        assert!(!v.validate(EntityKey::PreferredTime, "07:59", 1, today()).await.is_valid);
        assert!(v.validate(EntityKey::PreferredTime, "08:00", 1, today()).await.is_valid);
        assert!(v.validate(EntityKey::PreferredTime, "20:00", 1, today()).await.is_valid);
        assert!(!v.validate(EntityKey::PreferredTime, "20:01", 1, today()).await.is_valid);
    }

    #[tokio::test]
    async fn test_day_part_words_ask_for_specific_time() {
        let v = validator();
        let outcome = v
            .validate(EntityKey::PreferredTime, "afternoon", 1, today())
            .await;
        assert!(!outcome.is_valid);
        assert!(outcome.error_message.unwrap().contains("specific time"));
        assert!(!outcome.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_location_rules() {
        let v = validator();
        assert!(v.validate(EntityKey::Location, "282002", 1, today()).await.is_valid);
        assert!(v.validate(EntityKey::Location, "Agra", 1, today()).await.is_valid);
        let outside = v.validate(EntityKey::Location, "999999", 1, today()).await;
        assert!(!outside.is_valid);
        assert!(outside.suggestions.len() <= 3);
    }

    #[tokio::test]
    async fn test_booking_id_shape_without_store() {
        let v = validator();
        assert!(v.validate(EntityKey::BookingId, "ORD331718A2", 1, today()).await.is_valid);
        assert!(!v.validate(EntityKey::BookingId, "12345", 1, today()).await.is_valid);
    }

    #[tokio::test]
    async fn test_booking_ownership_check() {
        use chrono::Utc;
        use converge_persistence::{Booking, BookingStatus, InMemoryBookingStore};

        let store = Arc::new(InMemoryBookingStore::new());
        store
            .create(&Booking {
                order_id: "ORD11112222".to_string(),
                user_id: 7,
                session_id: "s1".to_string(),
                service_type: "ac_service".to_string(),
                scheduled_date: today(),
                scheduled_time: "15:00".to_string(),
                location: "282002".to_string(),
                status: BookingStatus::Confirmed,
                subtotal: 599.0,
                discount: 0.0,
                tax: 107.82,
                total: 706.82,
                refund_amount: None,
                confirmation_nonce: "n".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let v = validator().with_booking_store(store);
        assert!(v.validate(EntityKey::BookingId, "ORD11112222", 7, today()).await.is_valid);
        // Someone else's booking is invisible
        let other = v.validate(EntityKey::BookingId, "ORD11112222", 8, today()).await;
        assert!(!other.is_valid);
        assert!(other.error_message.unwrap().contains("couldn't find"));
    }

    #[tokio::test]
    async fn test_description_minimum_detail() {
        let v = validator();
        assert!(!v.validate(EntityKey::Description, "bad", 1, today()).await.is_valid);
        assert!(
            v.validate(
                EntityKey::Description,
                "Technician did not arrive at 3 PM, I waited two hours.",
                1,
                today()
            )
            .await
            .is_valid
        );
    }
}
