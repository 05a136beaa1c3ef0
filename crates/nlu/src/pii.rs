//! PII redaction for the operations review surface
//!
//! Reviewers without the `full_access` capability see masked mobile
//! numbers and emails; free-text snippets run through `redact` before
//! display.

use once_cell::sync::Lazy;
use regex::Regex;

static MOBILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([6-9]\d{9})\b").unwrap());
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z0-9._%+-]+)@([A-Za-z0-9.-]+\.[A-Za-z]{2,})\b").unwrap()
});

pub struct PiiRedactor;

impl PiiRedactor {
    pub fn new() -> Self {
        Self
    }

    /// Mask an Indian mobile number: `9812345678` -> `98****5678`.
    pub fn mask_mobile(&self, number: &str) -> String {
        if number.len() == 10 {
            format!("{}****{}", &number[..2], &number[6..])
        } else {
            "****".to_string()
        }
    }

    /// Mask an email: `user@example.com` -> `u***@example.com`.
    pub fn mask_email(&self, local: &str, domain: &str) -> String {
        let first = local.chars().next().unwrap_or('*');
        format!("{}***@{}", first, domain)
    }

    /// Sweep free text, masking every mobile number and email found.
    pub fn redact(&self, text: &str) -> String {
        let masked = MOBILE.replace_all(text, |caps: &regex::Captures<'_>| {
            self.mask_mobile(&caps[1])
        });
        EMAIL
            .replace_all(&masked, |caps: &regex::Captures<'_>| {
                self.mask_email(&caps[1], &caps[2])
            })
            .into_owned()
    }
}

impl Default for PiiRedactor {
    fn default() -> Self {
        Self::new()
    }
}
