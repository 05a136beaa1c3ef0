//! Entity rule configuration
//!
//! Validation rules and enumerations per entity type: known service
//! types with pricing, issue types with complaint priorities, the
//! service-area coverage list, service hours and the booking date
//! window. Loaded from `entities.yaml`, with built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// A bookable service with pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTypeEntry {
    pub id: String,
    pub display: String,
    /// Pattern strings matched against user wording
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Base price in rupees
    pub base_price: f64,
}

/// A complaint issue type with its rule-table priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTypeEntry {
    pub id: String,
    pub display: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    /// "high" | "medium" | "low"
    pub priority: String,
}

/// Serviceable pincodes and cities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceArea {
    #[serde(default)]
    pub pincodes: Vec<String>,
    #[serde(default)]
    pub cities: Vec<String>,
}

impl ServiceArea {
    pub fn covers_pincode(&self, pincode: &str) -> bool {
        self.pincodes.iter().any(|p| p == pincode)
    }

    pub fn covers_city(&self, city: &str) -> bool {
        let city = city.to_lowercase();
        self.cities.iter().any(|c| c.to_lowercase() == city)
    }
}

/// Technician working hours, inclusive on both ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHours {
    /// "HH:MM"
    pub start: String,
    /// "HH:MM"
    pub end: String,
}

impl Default for ServiceHours {
    fn default() -> Self {
        Self {
            start: "08:00".to_string(),
            end: "20:00".to_string(),
        }
    }
}

/// Price composition rules for bookings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRules {
    /// GST applied on the discounted subtotal
    pub tax_rate: f64,
    /// Flat discount fraction applied to every booking
    pub default_discount: f64,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            tax_rate: 0.18,
            default_discount: 0.0,
        }
    }
}

/// Entity rules, one section per concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRulesConfig {
    #[serde(default = "default_service_types")]
    pub service_types: Vec<ServiceTypeEntry>,

    #[serde(default = "default_issue_types")]
    pub issue_types: Vec<IssueTypeEntry>,

    #[serde(default = "default_service_area")]
    pub service_area: ServiceArea,

    #[serde(default)]
    pub service_hours: ServiceHours,

    /// Bookings accepted from today up to this many days ahead
    #[serde(default = "default_booking_window_days")]
    pub booking_window_days: i64,

    #[serde(default = "default_payment_methods")]
    pub payment_methods: Vec<String>,

    /// Offered when a date fails validation
    #[serde(default = "default_date_suggestions")]
    pub date_suggestions: Vec<String>,

    /// Offered when a time fails validation
    #[serde(default = "default_time_suggestions")]
    pub time_suggestions: Vec<String>,

    #[serde(default)]
    pub pricing: PricingRules,
}

fn default_booking_window_days() -> i64 {
    90
}

fn default_service_types() -> Vec<ServiceTypeEntry> {
    vec![
        ServiceTypeEntry {
            id: "ac_service".to_string(),
            display: "AC service".to_string(),
            patterns: vec![
                r"(?i)\ba\.?c\.?\b".to_string(),
                r"(?i)\bair ?condition\w*\b".to_string(),
            ],
            base_price: 599.0,
        },
        ServiceTypeEntry {
            id: "plumbing".to_string(),
            display: "Plumbing".to_string(),
            patterns: vec![r"(?i)\bplumb\w*\b".to_string(), r"(?i)\b(tap|pipe|leak\w*)\b".to_string()],
            base_price: 299.0,
        },
        ServiceTypeEntry {
            id: "cleaning".to_string(),
            display: "Home cleaning".to_string(),
            patterns: vec![r"(?i)\bclean\w*\b".to_string()],
            base_price: 999.0,
        },
        ServiceTypeEntry {
            id: "electrical".to_string(),
            display: "Electrical work".to_string(),
            patterns: vec![
                r"(?i)\belectri\w*\b".to_string(),
                r"(?i)\b(wiring|switchboard|fan install\w*)\b".to_string(),
            ],
            base_price: 349.0,
        },
        ServiceTypeEntry {
            id: "pest_control".to_string(),
            display: "Pest control".to_string(),
            patterns: vec![r"(?i)\bpest\b".to_string(), r"(?i)\b(cockroach|termite)\w*\b".to_string()],
            base_price: 1299.0,
        },
    ]
}

fn default_issue_types() -> Vec<IssueTypeEntry> {
    vec![
        IssueTypeEntry {
            id: "no_show".to_string(),
            display: "Technician no-show".to_string(),
            patterns: vec![
                r"(?i)\bno[- ]?show\b".to_string(),
                r"(?i)\b(didn'?t|did not|never)\s+(show|arrive|come|turn\w* up)\b".to_string(),
            ],
            priority: "high".to_string(),
        },
        IssueTypeEntry {
            id: "damage".to_string(),
            display: "Property damage".to_string(),
            patterns: vec![r"(?i)\b(damag\w*|broke\w*|scratch\w*)\b".to_string()],
            priority: "high".to_string(),
        },
        IssueTypeEntry {
            id: "quality".to_string(),
            display: "Service quality".to_string(),
            patterns: vec![
                r"(?i)\b(poor|bad|low)\s+(quality|work|service)\b".to_string(),
                r"(?i)\b(not fixed|still (broken|leaking|not working))\b".to_string(),
            ],
            priority: "medium".to_string(),
        },
        IssueTypeEntry {
            id: "delay".to_string(),
            display: "Delay".to_string(),
            patterns: vec![r"(?i)\b(late|delay\w*|waited)\b".to_string()],
            priority: "low".to_string(),
        },
    ]
}

fn default_service_area() -> ServiceArea {
    ServiceArea {
        pincodes: vec![
            "282001".to_string(),
            "282002".to_string(),
            "282003".to_string(),
            "110001".to_string(),
            "110002".to_string(),
            "400001".to_string(),
            "400053".to_string(),
            "560001".to_string(),
            "560034".to_string(),
        ],
        cities: vec![
            "Agra".to_string(),
            "Delhi".to_string(),
            "Mumbai".to_string(),
            "Bengaluru".to_string(),
        ],
    }
}

fn default_payment_methods() -> Vec<String> {
    vec![
        "upi".to_string(),
        "card".to_string(),
        "netbanking".to_string(),
        "cash".to_string(),
    ]
}

fn default_date_suggestions() -> Vec<String> {
    vec!["today".to_string(), "tomorrow".to_string(), "next Monday".to_string()]
}

fn default_time_suggestions() -> Vec<String> {
    vec!["10:00".to_string(), "14:00".to_string(), "18:00".to_string()]
}

impl Default for EntityRulesConfig {
    fn default() -> Self {
        Self {
            service_types: default_service_types(),
            issue_types: default_issue_types(),
            service_area: default_service_area(),
            service_hours: ServiceHours::default(),
            booking_window_days: default_booking_window_days(),
            payment_methods: default_payment_methods(),
            date_suggestions: default_date_suggestions(),
            time_suggestions: default_time_suggestions(),
            pricing: PricingRules::default(),
        }
    }
}

impl EntityRulesConfig {
    /// Load from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::FileNotFound(format!("{}: {}", path.as_ref().display(), e))
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn service_type(&self, id: &str) -> Option<&ServiceTypeEntry> {
        self.service_types.iter().find(|s| s.id == id)
    }

    pub fn issue_type(&self, id: &str) -> Option<&IssueTypeEntry> {
        self.issue_types.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let rules = EntityRulesConfig::default();
        assert!(rules.service_type("ac_service").is_some());
        assert_eq!(rules.issue_type("no_show").unwrap().priority, "high");
        assert_eq!(rules.issue_type("delay").unwrap().priority, "low");
        assert_eq!(rules.booking_window_days, 90);
        assert_eq!(rules.service_hours.start, "08:00");
    }

    #[test]
    fn test_service_area_lookup() {
        let area = default_service_area();
        assert!(area.covers_pincode("282002"));
        assert!(!area.covers_pincode("999999"));
        assert!(area.covers_city("agra"));
        assert!(area.covers_city("AGRA"));
        assert!(!area.covers_city("Pune"));
    }

    #[test]
    fn test_yaml_round_trip() {
        let rules = EntityRulesConfig::default();
        let yaml = serde_yaml::to_string(&rules).unwrap();
        let back: EntityRulesConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.service_types.len(), rules.service_types.len());
        assert_eq!(back.pricing.tax_rate, 0.18);
    }
}
