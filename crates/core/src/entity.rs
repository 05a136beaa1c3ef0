//! Entity (slot) keys and extracted values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of entity types the system collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKey {
    ServiceType,
    PreferredDate,
    PreferredTime,
    /// City name or pincode
    Location,
    BookingId,
    IssueType,
    Description,
    Quantity,
    PaymentMethod,
}

impl EntityKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceType => "service_type",
            Self::PreferredDate => "preferred_date",
            Self::PreferredTime => "preferred_time",
            Self::Location => "location",
            Self::BookingId => "booking_id",
            Self::IssueType => "issue_type",
            Self::Description => "description",
            Self::Quantity => "quantity",
            Self::PaymentMethod => "payment_method",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "service_type" => Some(Self::ServiceType),
            "preferred_date" => Some(Self::PreferredDate),
            "preferred_time" => Some(Self::PreferredTime),
            "location" => Some(Self::Location),
            "booking_id" => Some(Self::BookingId),
            "issue_type" => Some(Self::IssueType),
            "description" => Some(Self::Description),
            "quantity" => Some(Self::Quantity),
            "payment_method" => Some(Self::PaymentMethod),
            _ => None,
        }
    }

    /// Human wording used when asking for this entity.
    pub fn display(&self) -> &'static str {
        match self {
            Self::ServiceType => "service",
            Self::PreferredDate => "preferred date",
            Self::PreferredTime => "preferred time",
            Self::Location => "location",
            Self::BookingId => "booking ID",
            Self::IssueType => "issue type",
            Self::Description => "description",
            Self::Quantity => "quantity",
            Self::PaymentMethod => "payment method",
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an entity value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Pattern,
    Llm,
}

/// An extracted, normalized entity value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityValue {
    pub key: EntityKey,
    /// Verbatim span from the user message
    pub raw_value: String,
    /// Deterministically normalized form (ISO date, HH:MM time, ...)
    pub normalized_value: String,
    pub confidence: f32,
    pub method: ExtractionMethod,
}

impl EntityValue {
    pub fn new(
        key: EntityKey,
        raw: impl Into<String>,
        normalized: impl Into<String>,
        confidence: f32,
        method: ExtractionMethod,
    ) -> Self {
        Self {
            key,
            raw_value: raw.into(),
            normalized_value: normalized.into(),
            confidence,
            method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        for key in [
            EntityKey::ServiceType,
            EntityKey::PreferredDate,
            EntityKey::PreferredTime,
            EntityKey::Location,
            EntityKey::BookingId,
            EntityKey::IssueType,
            EntityKey::Description,
            EntityKey::Quantity,
            EntityKey::PaymentMethod,
        ] {
            assert_eq!(EntityKey::parse(key.as_str()), Some(key));
        }
    }

    #[test]
    fn test_key_as_json_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(EntityKey::PreferredDate, "2026-08-02".to_string());
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"preferred_date\""));
        let back: HashMap<EntityKey, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[&EntityKey::PreferredDate], "2026-08-02");
    }
}
