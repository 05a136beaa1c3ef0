//! Prompt construction
//!
//! One builder per call site. Builders return plain message lists; the
//! caller picks the temperature band and timeout.

use converge_core::{HistoryMessage, Role as TurnRole};

use crate::backend::Message;

/// Persona applied to every user-facing generation.
pub const PERSONA_SYSTEM_PROMPT: &str = "You are Converge, the customer-service assistant of a \
home-services marketplace (AC repair, plumbing, cleaning, electrical work, pest control). \
Be warm and empathetic. Keep replies short and conversational. \
Do not use emoji. Do not use bullet lists. Never invent bookings, prices or policies.";

/// Classification prompt: message + rolling history + active dialog
/// state summary + the catalog block (intent names, descriptions and
/// few-shot examples, formatted by the caller).
pub fn classification_prompt(
    message: &str,
    history: &[HistoryMessage],
    state_summary: Option<&str>,
    catalog_block: &str,
) -> Vec<Message> {
    let mut system = String::from(
        "You classify customer messages for a home-services marketplace into intents. \
Respond with JSON only: {\"intents\": [{\"intent\": ..., \"confidence\": 0..1, \
\"entities\": {...}}], \"primary_intent\": ..., \"context_used\": bool}. \
A message may carry multiple intents; list them all, most confident first. \
Extract any entity values you can see (service_type, preferred_date, preferred_time, \
location, booking_id, issue_type, description, quantity, payment_method).\n\nIntents:\n",
    );
    system.push_str(catalog_block);

    if let Some(summary) = state_summary {
        system.push_str(
            "\n\nAn information-collection dialog is in progress. Prefer its intent unless \
the message clearly starts something different:\n",
        );
        system.push_str(summary);
        system.push_str("\nIf the message looks like an answer to the pending question, set context_used to true.");
    }

    let mut messages = vec![Message::system(system)];
    for turn in history {
        messages.push(match turn.role {
            TurnRole::User => Message::user(turn.content.clone()),
            TurnRole::Assistant => Message::assistant(turn.content.clone()),
        });
    }
    messages.push(Message::user(message.to_string()));
    messages
}

/// Extraction prompt for a single expected entity.
pub fn extraction_prompt(
    message: &str,
    entity_name: &str,
    entity_description: &str,
    collected: &[(String, String)],
) -> Vec<Message> {
    let mut system = format!(
        "Extract the value of `{}` from the customer's message. {} \
Respond with JSON only: {{\"value\": <string or null>, \"confidence\": 0..1}}. \
Use null when the message does not contain it.",
        entity_name, entity_description
    );

    if !collected.is_empty() {
        system.push_str("\nAlready collected (for resolving references like \"the same day\"):");
        for (key, value) in collected {
            system.push_str(&format!("\n- {} = {}", key, value));
        }
    }

    vec![Message::system(system), Message::user(message.to_string())]
}

/// Conversational generation with the warm persona. `instruction`
/// describes what to say; the model decides how to say it.
pub fn persona_prompt(instruction: &str) -> Vec<Message> {
    vec![
        Message::system(PERSONA_SYSTEM_PROMPT),
        Message::user(instruction.to_string()),
    ]
}

/// Grounded policy answering: chunks are tagged so the model can cite
/// them by id.
pub fn policy_prompt(query: &str, chunks: &[(String, String)]) -> Vec<Message> {
    let mut context = String::new();
    for (id, text) in chunks {
        context.push_str(&format!("[{}]\n{}\n\n", id, text));
    }

    let system = "Answer the customer's question using ONLY the policy excerpts provided. \
Cite the excerpt ids you used in square brackets, e.g. [policy-cancellation#2]. \
If the excerpts do not contain the answer, say you do not have that information. \
Do not use knowledge from outside the excerpts. Keep the answer short and plain."
        .to_string();

    vec![
        Message::system(system),
        Message::user(format!("Excerpts:\n\n{}Question: {}", context, query)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_prompt_layout() {
        let history = vec![
            HistoryMessage {
                role: TurnRole::User,
                content: "hi".to_string(),
            },
            HistoryMessage {
                role: TurnRole::Assistant,
                content: "hello!".to_string(),
            },
        ];
        let messages = classification_prompt(
            "book AC service",
            &history,
            Some("intent=complaint state=collecting_info"),
            "- booking_create: book a home service",
        );
        // system + 2 history + current message
        assert_eq!(messages.len(), 4);
        assert!(messages[0].content.contains("booking_create"));
        assert!(messages[0].content.contains("collecting_info"));
        assert_eq!(messages[3].content, "book AC service");
    }

    #[test]
    fn test_extraction_prompt_includes_collected() {
        let collected = vec![("preferred_date".to_string(), "2026-08-02".to_string())];
        let messages = extraction_prompt("same day works", "preferred_time", "A time of day.", &collected);
        assert!(messages[0].content.contains("preferred_time"));
        assert!(messages[0].content.contains("2026-08-02"));
    }

    #[test]
    fn test_policy_prompt_tags_chunks() {
        let chunks = vec![(
            "policy-cancellation#1".to_string(),
            "Full refund if cancelled 24h before.".to_string(),
        )];
        let messages = policy_prompt("what if I cancel 2 hours before?", &chunks);
        assert!(messages[1].content.contains("[policy-cancellation#1]"));
        assert!(messages[0].content.contains("ONLY"));
    }

    #[test]
    fn test_persona_forbids_emoji_and_bullets() {
        assert!(PERSONA_SYSTEM_PROMPT.contains("Do not use emoji"));
        assert!(PERSONA_SYSTEM_PROMPT.contains("Do not use bullet lists"));
    }
}
