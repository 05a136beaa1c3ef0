//! Structured-output schemas and validation
//!
//! The LLM returns JSON; this module owns its shape. Malformed output
//! becomes `LlmError::Schema` so callers route to the fallback branch
//! instead of guessing. One documented quirk is coerced rather than
//! rejected: models sometimes emit `"entities": ""` where an empty
//! object is meant.

use jsonschema::JSONSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::LlmError;

/// Classification output shape.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmClassification {
    pub intents: Vec<LlmScoredIntent>,
    pub primary_intent: String,
    #[serde(default)]
    pub context_used: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmScoredIntent {
    pub intent: String,
    pub confidence: f32,
    #[serde(default)]
    pub entities: HashMap<String, String>,
}

/// Extraction output shape.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmExtraction {
    pub value: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// JSON Schema handed to the backend for classification calls.
pub fn classification_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "intents": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "intent": {"type": "string"},
                        "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                        "entities": {"type": "object"}
                    },
                    "required": ["intent", "confidence"]
                },
                "minItems": 1
            },
            "primary_intent": {"type": "string"},
            "context_used": {"type": "boolean"}
        },
        "required": ["intents", "primary_intent"]
    })
}

/// JSON Schema handed to the backend for extraction calls.
pub fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "value": {"type": ["string", "null"]},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
        },
        "required": ["value"]
    })
}

/// Parse and validate a classification response.
pub fn parse_classification(text: &str) -> Result<LlmClassification, LlmError> {
    let mut value = parse_json_payload(text)?;
    coerce_entities(&mut value);
    validate(&value, &classification_schema())?;
    serde_json::from_value(value).map_err(|e| LlmError::Schema(e.to_string()))
}

/// Parse and validate an extraction response.
pub fn parse_extraction(text: &str) -> Result<LlmExtraction, LlmError> {
    let mut value = parse_json_payload(text)?;
    // Models occasionally return bare numbers for value
    if let Some(v) = value.get_mut("value") {
        if v.is_number() {
            *v = Value::String(v.to_string());
        }
    }
    validate(&value, &extraction_schema())?;
    serde_json::from_value(value).map_err(|e| LlmError::Schema(e.to_string()))
}

/// Strip markdown fences the model may wrap JSON in, then parse.
fn parse_json_payload(text: &str) -> Result<Value, LlmError> {
    let trimmed = text.trim();
    let without_fences = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(without_fences)
        .map_err(|e| LlmError::Schema(format!("not valid JSON: {}", e)))
}

/// Coerce `"entities": ""` (and null) to `{}`, and stringify
/// non-string entity values.
fn coerce_entities(value: &mut Value) {
    let Some(intents) = value.get_mut("intents").and_then(|v| v.as_array_mut()) else {
        return;
    };
    for intent in intents {
        match intent.get_mut("entities") {
            Some(entities) if entities.is_object() => {
                let map = entities.as_object_mut().unwrap();
                let keys: Vec<String> = map
                    .iter()
                    .filter(|(_, v)| !v.is_string())
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in keys {
                    let v = map.get(&key).cloned().unwrap_or(Value::Null);
                    if v.is_null() {
                        map.remove(&key);
                    } else {
                        let rendered = match v {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        map.insert(key, Value::String(rendered));
                    }
                }
            }
            Some(entities) => {
                *entities = json!({});
            }
            None => {}
        }
    }
}

fn validate(value: &Value, schema: &Value) -> Result<(), LlmError> {
    let compiled = JSONSchema::compile(schema)
        .map_err(|e| LlmError::Schema(format!("bad schema: {}", e)))?;
    if let Err(errors) = compiled.validate(value) {
        let details: Vec<String> = errors.map(|e| e.to_string()).take(3).collect();
        return Err(LlmError::Schema(details.join("; ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_classification() {
        let text = r#"{
            "intents": [
                {"intent": "booking_create", "confidence": 0.93,
                 "entities": {"service_type": "ac_service"}}
            ],
            "primary_intent": "booking_create",
            "context_used": false
        }"#;
        let parsed = parse_classification(text).unwrap();
        assert_eq!(parsed.primary_intent, "booking_create");
        assert_eq!(parsed.intents[0].entities["service_type"], "ac_service");
    }

    #[test]
    fn test_empty_string_entities_coerced() {
        let text = r#"{
            "intents": [{"intent": "greeting", "confidence": 0.99, "entities": ""}],
            "primary_intent": "greeting"
        }"#;
        let parsed = parse_classification(text).unwrap();
        assert!(parsed.intents[0].entities.is_empty());
    }

    #[test]
    fn test_numeric_entity_values_stringified() {
        let text = r#"{
            "intents": [{"intent": "booking_create", "confidence": 0.9,
                         "entities": {"quantity": 2, "note": null}}],
            "primary_intent": "booking_create"
        }"#;
        let parsed = parse_classification(text).unwrap();
        assert_eq!(parsed.intents[0].entities["quantity"], "2");
        assert!(!parsed.intents[0].entities.contains_key("note"));
    }

    #[test]
    fn test_markdown_fences_stripped() {
        let text = "```json\n{\"intents\": [{\"intent\": \"greeting\", \"confidence\": 1.0}], \"primary_intent\": \"greeting\"}\n```";
        assert!(parse_classification(text).is_ok());
    }

    #[test]
    fn test_malformed_output_is_schema_error() {
        assert!(matches!(
            parse_classification("I think this is a booking"),
            Err(LlmError::Schema(_))
        ));
        assert!(matches!(
            parse_classification(r#"{"primary_intent": "greeting"}"#),
            Err(LlmError::Schema(_))
        ));
    }

    #[test]
    fn test_parse_extraction() {
        let parsed = parse_extraction(r#"{"value": "2026-08-02", "confidence": 0.9}"#).unwrap();
        assert_eq!(parsed.value.as_deref(), Some("2026-08-02"));

        let none = parse_extraction(r#"{"value": null}"#).unwrap();
        assert!(none.value.is_none());

        let numeric = parse_extraction(r#"{"value": 2}"#).unwrap();
        assert_eq!(numeric.value.as_deref(), Some("2"));
    }
}
