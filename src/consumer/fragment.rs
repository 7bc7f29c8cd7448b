use crate::protocol::{THOUGHT_CARD_TOOL, ThoughtCard};
use serde_json::Value;

/// Outcome of looking at the argument text accumulated so far.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Not a complete value yet; wait for more text.
    Incomplete,
    /// Complete JSON that is not a thought card. Never retried.
    Invalid(String),
    Card(ThoughtCard),
}

pub fn evaluate(args_text: &str) -> Fragment {
    let text = args_text.trim_start();
    if !(text.starts_with('{') || text.starts_with('"')) {
        return Fragment::Incomplete;
    }

    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return Fragment::Incomplete,
    };

    // Double-encoded arguments: a JSON string holding the card.
    let value = match value {
        Value::String(inner) => match serde_json::from_str(&inner) {
            Ok(value) => {
                tracing::trace!("thought card arguments were double-encoded");
                value
            }
            Err(_) => return Fragment::Incomplete,
        },
        other => other,
    };

    match serde_json::from_value::<ThoughtCard>(unwrap_envelope(value)) {
        Ok(card) => Fragment::Card(card),
        Err(err) => Fragment::Invalid(err.to_string()),
    }
}

/// Accepts `{"kind": "thought_card", "payload": {...}}` as well as a bare card.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map)
            if map.get("kind").and_then(Value::as_str) == Some(THOUGHT_CARD_TOOL)
                && map.contains_key("payload") =>
        {
            map.remove("payload").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CardType;
    use serde_json::json;

    #[test]
    fn prefixes_that_cannot_start_a_value_are_incomplete() {
        for text in ["", "   ", "\n", "c", "[", "null", "tr"] {
            assert_eq!(evaluate(text), Fragment::Incomplete, "{:?}", text);
        }
    }

    #[test]
    fn growing_object_is_incomplete_until_closed() {
        let full = r#"{"content":"hi","card_type":"thinking"}"#;
        for end in 1..full.len() {
            assert_eq!(evaluate(&full[..end]), Fragment::Incomplete, "{}", &full[..end]);
        }
        match evaluate(full) {
            Fragment::Card(card) => {
                assert_eq!(card.card_type, CardType::Thinking);
                assert_eq!(card.content, "hi");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn double_encoded_arguments_are_parsed_twice() {
        let card = json!({"card_type": "executing", "content": "Running search", "step": 2});
        let once = serde_json::to_string(&card).unwrap();
        let twice = serde_json::to_string(&once).unwrap();

        match evaluate(&twice) {
            Fragment::Card(card) => {
                assert_eq!(card.card_type, CardType::Executing);
                assert_eq!(card.step, 2);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(evaluate(&twice[..twice.len() - 1]), Fragment::Incomplete);
        assert_eq!(evaluate("\"{\\\"card_type\\\":"), Fragment::Incomplete);
        assert_eq!(evaluate("\"not json\""), Fragment::Incomplete);
    }

    #[test]
    fn envelope_payload_is_unwrapped() {
        let text = json!({
            "kind": "thought_card",
            "payload": {"card_type": "progress", "content": "", "progress": 0.5}
        })
        .to_string();

        match evaluate(&text) {
            Fragment::Card(card) => assert_eq!(card.progress, Some(0.5)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn complete_values_missing_fields_are_invalid() {
        assert!(matches!(
            evaluate(r#"{"card_type":"thinking"}"#),
            Fragment::Invalid(_)
        ));
        assert!(matches!(evaluate(r#"{"content":"x"}"#), Fragment::Invalid(_)));
        assert!(matches!(evaluate(r#""\"just text\"""#), Fragment::Invalid(_)));
    }
}
