//! Pattern entity extraction with deterministic normalization
//!
//! Extractors are tuned for precision over recall: a miss falls through
//! to the LLM extraction stage in `converge-agent`. Normalization is
//! fully deterministic; relative dates resolve against the `today`
//! argument so callers pin the server-local date.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

use converge_config::EntityRulesConfig;
use converge_core::EntityKey;

/// A pattern-extracted value before validation.
#[derive(Debug, Clone)]
pub struct RawExtraction {
    /// Verbatim span from the message
    pub raw: String,
    /// Normalized form (ISO date, HH:MM, pincode, catalog id, ...)
    pub normalized: String,
    pub confidence: f32,
}

impl RawExtraction {
    fn new(raw: impl Into<String>, normalized: impl Into<String>, confidence: f32) -> Self {
        Self {
            raw: raw.into(),
            normalized: normalized.into(),
            confidence,
        }
    }
}

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());
static DMY_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{4})\b").unwrap());
static WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:(next|this|on|coming)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .unwrap()
});
static AMPM_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").unwrap());
static CLOCK_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").unwrap());
static DAY_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(morning|afternoon|evening|night)\b").unwrap());
static PINCODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([1-9]\d{5})\b").unwrap());
static BOOKING_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(ord[a-z0-9]*\d[a-z0-9]*)\b").unwrap());
static QUANTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,3})\b").unwrap());

/// Pattern extractor over the configured entity rules.
pub struct EntityPatternExtractor {
    rules: EntityRulesConfig,
    service_patterns: Vec<(String, Vec<Regex>)>,
    issue_patterns: Vec<(String, Vec<Regex>)>,
}

impl EntityPatternExtractor {
    pub fn new(rules: EntityRulesConfig) -> Self {
        let service_patterns = rules
            .service_types
            .iter()
            .map(|s| (s.id.clone(), compile_patterns(&s.patterns, &s.id)))
            .collect();
        let issue_patterns = rules
            .issue_types
            .iter()
            .map(|s| (s.id.clone(), compile_patterns(&s.patterns, &s.id)))
            .collect();
        Self {
            rules,
            service_patterns,
            issue_patterns,
        }
    }

    pub fn rules(&self) -> &EntityRulesConfig {
        &self.rules
    }

    /// Extract a value of the given type from the message.
    pub fn extract(
        &self,
        message: &str,
        key: EntityKey,
        today: NaiveDate,
    ) -> Option<RawExtraction> {
        match key {
            EntityKey::ServiceType => self.extract_service_type(message),
            EntityKey::PreferredDate => extract_date(message, today),
            EntityKey::PreferredTime => extract_time(message),
            EntityKey::Location => self.extract_location(message),
            EntityKey::BookingId => extract_booking_id(message),
            EntityKey::IssueType => self.extract_issue_type(message),
            EntityKey::Description => extract_description(message),
            EntityKey::Quantity => extract_quantity(message),
            EntityKey::PaymentMethod => self.extract_payment_method(message),
        }
    }

    fn extract_service_type(&self, message: &str) -> Option<RawExtraction> {
        for (id, regexes) in &self.service_patterns {
            if let Some(m) = regexes.iter().find_map(|re| re.find(message)) {
                return Some(RawExtraction::new(m.as_str(), id.clone(), 0.9));
            }
        }
        None
    }

    fn extract_issue_type(&self, message: &str) -> Option<RawExtraction> {
        for (id, regexes) in &self.issue_patterns {
            if let Some(m) = regexes.iter().find_map(|re| re.find(message)) {
                return Some(RawExtraction::new(m.as_str(), id.clone(), 0.9));
            }
        }
        None
    }

    fn extract_location(&self, message: &str) -> Option<RawExtraction> {
        // Pincode wins when present
        if let Some(caps) = PINCODE.captures(message) {
            let pin = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            return Some(RawExtraction::new(pin, pin, 0.95));
        }
        let lowered = message.to_lowercase();
        for city in &self.rules.service_area.cities {
            if lowered.contains(&city.to_lowercase()) {
                return Some(RawExtraction::new(city.clone(), city.clone(), 0.88));
            }
        }
        None
    }

    fn extract_payment_method(&self, message: &str) -> Option<RawExtraction> {
        let lowered = message.to_lowercase();
        let synonyms: &[(&str, &str)] = &[
            ("upi", "upi"),
            ("gpay", "upi"),
            ("google pay", "upi"),
            ("phonepe", "upi"),
            ("paytm", "upi"),
            ("credit card", "card"),
            ("debit card", "card"),
            ("card", "card"),
            ("netbanking", "netbanking"),
            ("net banking", "netbanking"),
            ("cash on delivery", "cash"),
            ("cash", "cash"),
        ];
        for (word, id) in synonyms {
            if lowered.contains(word) && self.rules.payment_methods.iter().any(|m| m == id) {
                return Some(RawExtraction::new(*word, *id, 0.9));
            }
        }
        None
    }
}

fn compile_patterns(patterns: &[String], id: &str) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(entity = id, pattern = %p, error = %e, "skipping invalid entity pattern");
                None
            }
        })
        .collect()
}

/// Resolve a date expression against `today`. Past expressions still
/// normalize; the validator is the one to reject them.
pub fn extract_date(message: &str, today: NaiveDate) -> Option<RawExtraction> {
    let lowered = message.to_lowercase();

    if lowered.contains("day after tomorrow") {
        return Some(RawExtraction::new(
            "day after tomorrow",
            (today + Duration::days(2)).to_string(),
            0.95,
        ));
    }
    if lowered.contains("tomorrow") {
        return Some(RawExtraction::new(
            "tomorrow",
            (today + Duration::days(1)).to_string(),
            0.95,
        ));
    }
    if lowered.contains("yesterday") {
        return Some(RawExtraction::new(
            "yesterday",
            (today - Duration::days(1)).to_string(),
            0.95,
        ));
    }
    if lowered.contains("today") || lowered.contains("tonight") {
        return Some(RawExtraction::new("today", today.to_string(), 0.95));
    }

    if let Some(caps) = ISO_DATE.captures(message) {
        let (y, m, d) = (
            caps[1].parse::<i32>().ok()?,
            caps[2].parse::<u32>().ok()?,
            caps[3].parse::<u32>().ok()?,
        );
        let date = NaiveDate::from_ymd_opt(y, m, d)?;
        return Some(RawExtraction::new(&caps[0], date.to_string(), 0.95));
    }

    if let Some(caps) = DMY_DATE.captures(message) {
        let (d, m, y) = (
            caps[1].parse::<u32>().ok()?,
            caps[2].parse::<u32>().ok()?,
            caps[3].parse::<i32>().ok()?,
        );
        let date = NaiveDate::from_ymd_opt(y, m, d)?;
        return Some(RawExtraction::new(&caps[0], date.to_string(), 0.9));
    }

    if let Some(caps) = WEEKDAY.captures(message) {
        let target = parse_weekday(&caps[2])?;
        let mut ahead = (target.num_days_from_monday() as i64
            - today.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        if ahead == 0 {
            ahead = 7;
        }
        return Some(RawExtraction::new(
            caps.get(0).map(|m| m.as_str()).unwrap_or_default(),
            (today + Duration::days(ahead)).to_string(),
            0.9,
        ));
    }

    None
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Normalize times to 24-hour HH:MM. Day-part words normalize to
/// themselves; validation rejects those asking for a specific time.
pub fn extract_time(message: &str) -> Option<RawExtraction> {
    if let Some(caps) = AMPM_TIME.captures(message) {
        let hour: u32 = caps[1].parse().ok()?;
        if hour >= 1 && hour <= 12 {
            let minute: u32 = caps
                .get(2)
                .map(|m| m.as_str().parse().unwrap_or(0))
                .unwrap_or(0);
            let meridiem = caps[3].to_lowercase();
            let hour24 = match (hour, meridiem.as_str()) {
                (12, "am") => 0,
                (12, "pm") => 12,
                (h, "am") => h,
                (h, _) => h + 12,
            };
            return Some(RawExtraction::new(
                caps.get(0).map(|m| m.as_str()).unwrap_or_default(),
                format!("{:02}:{:02}", hour24, minute),
                0.95,
            ));
        }
    }

    if let Some(caps) = CLOCK_TIME.captures(message) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return Some(RawExtraction::new(
            caps.get(0).map(|m| m.as_str()).unwrap_or_default(),
            format!("{:02}:{:02}", hour, minute),
            0.95,
        ));
    }

    if let Some(caps) = DAY_PART.captures(message) {
        let part = caps[1].to_lowercase();
        return Some(RawExtraction::new(&caps[0], part, 0.9));
    }

    None
}

pub fn extract_booking_id(message: &str) -> Option<RawExtraction> {
    BOOKING_ID.captures(message).map(|caps| {
        let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        RawExtraction::new(raw, raw.to_uppercase(), 0.95)
    })
}

fn extract_description(message: &str) -> Option<RawExtraction> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return None;
    }
    let confidence = if trimmed.len() >= 10 { 0.85 } else { 0.6 };
    Some(RawExtraction::new(trimmed, trimmed, confidence))
}

fn extract_quantity(message: &str) -> Option<RawExtraction> {
    QUANTITY.captures(message).and_then(|caps| {
        let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let n: u32 = raw.parse().ok()?;
        if n == 0 || n > 99 {
            return None;
        }
        Some(RawExtraction::new(raw, n.to_string(), 0.85))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> EntityPatternExtractor {
        EntityPatternExtractor::new(EntityRulesConfig::default())
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_relative_dates() {
        let today = day(2026, 8, 1);
        let e = extract_date("tomorrow", today).unwrap();
        assert_eq!(e.normalized, "2026-08-02");
        assert!(e.confidence >= 0.9);

        assert_eq!(extract_date("today please", today).unwrap().normalized, "2026-08-01");
        assert_eq!(
            extract_date("day after tomorrow", today).unwrap().normalized,
            "2026-08-03"
        );
        // Past dates normalize; the validator rejects them
        assert_eq!(extract_date("yesterday", today).unwrap().normalized, "2026-07-31");
    }

    #[test]
    fn test_weekday_dates() {
        // 2026-08-01 is a Saturday
        let today = day(2026, 8, 1);
        assert_eq!(
            extract_date("next Friday", today).unwrap().normalized,
            "2026-08-07"
        );
        assert_eq!(extract_date("on monday", today).unwrap().normalized, "2026-08-03");
        // Same weekday rolls a full week ahead
        assert_eq!(
            extract_date("next saturday", today).unwrap().normalized,
            "2026-08-08"
        );
    }

    #[test]
    fn test_explicit_dates() {
        let today = day(2026, 8, 1);
        assert_eq!(
            extract_date("2026-08-15 works", today).unwrap().normalized,
            "2026-08-15"
        );
        assert_eq!(
            extract_date("15/08/2026", today).unwrap().normalized,
            "2026-08-15"
        );
    }

    #[test]
    fn test_time_normalization() {
        assert_eq!(extract_time("3 PM").unwrap().normalized, "15:00");
        assert_eq!(extract_time("3:30 pm").unwrap().normalized, "15:30");
        assert_eq!(extract_time("15:00").unwrap().normalized, "15:00");
        assert_eq!(extract_time("8 am").unwrap().normalized, "08:00");
        assert_eq!(extract_time("12 am").unwrap().normalized, "00:00");
        assert_eq!(extract_time("12 pm").unwrap().normalized, "12:00");
        // Day parts normalize to themselves; validation asks for a
        // specific time downstream
        assert_eq!(extract_time("in the afternoon").unwrap().normalized, "afternoon");
        assert!(extract_time("whenever").is_none());
    }

    #[test]
    fn test_location_prefers_pincode() {
        let e = extractor();
        let got = e
            .extract("Agra 282002", EntityKey::Location, day(2026, 8, 1))
            .unwrap();
        assert_eq!(got.normalized, "282002");

        let city = e
            .extract("I live in Agra", EntityKey::Location, day(2026, 8, 1))
            .unwrap();
        assert_eq!(city.normalized, "Agra");
    }

    #[test]
    fn test_booking_id() {
        let got = extract_booking_id("cancel booking ord331718a2 please").unwrap();
        assert_eq!(got.normalized, "ORD331718A2");
        assert!(extract_booking_id("cancel my booking").is_none());
    }

    #[test]
    fn test_service_and_issue_types() {
        let e = extractor();
        let today = day(2026, 8, 1);
        assert_eq!(
            e.extract("I want to book AC service", EntityKey::ServiceType, today)
                .unwrap()
                .normalized,
            "ac_service"
        );
        assert_eq!(
            e.extract("there is a leaking tap", EntityKey::ServiceType, today)
                .unwrap()
                .normalized,
            "plumbing"
        );
        assert_eq!(
            e.extract("no-show", EntityKey::IssueType, today).unwrap().normalized,
            "no_show"
        );
        assert_eq!(
            e.extract("they damaged my cabinet", EntityKey::IssueType, today)
                .unwrap()
                .normalized,
            "damage"
        );
    }

    #[test]
    fn test_payment_method_synonyms() {
        let e = extractor();
        let today = day(2026, 8, 1);
        assert_eq!(
            e.extract("I'll pay by gpay", EntityKey::PaymentMethod, today)
                .unwrap()
                .normalized,
            "upi"
        );
        assert_eq!(
            e.extract("debit card", EntityKey::PaymentMethod, today)
                .unwrap()
                .normalized,
            "card"
        );
    }

    #[test]
    fn test_quantity_bounds() {
        let e = extractor();
        let today = day(2026, 8, 1);
        assert_eq!(
            e.extract("2 ACs", EntityKey::Quantity, today).unwrap().normalized,
            "2"
        );
        assert!(e.extract("0", EntityKey::Quantity, today).is_none());
    }
}
