//! Retrieval decision prompt and response parsing.
//!
//! The model is asked for a strict JSON object `{"need_context": bool}`.
//! Replies are classified into a [`DecisionParse`] outcome, each of which
//! maps to a boolean by name rather than by falling through string checks.

use serde::Deserialize;

use crate::models::Turn;
use crate::prompt::{render_history, NO_HISTORY_MARKER};

#[derive(Debug, Deserialize)]
struct DecisionPayload {
    need_context: bool,
}

/// Outcome of parsing a retrieval decision reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionParse {
    /// The reply contained the requested JSON object.
    Structured(bool),
    /// No usable JSON, but the reply contains a standalone `true` token.
    LooseTrue,
    /// Nothing recognizable. Treated as "no context needed".
    Unrecognized,
}

impl DecisionParse {
    pub fn parse(raw: &str) -> Self {
        if let Some(payload) = extract_json_object(raw)
            .and_then(|json| serde_json::from_str::<DecisionPayload>(json).ok())
        {
            return DecisionParse::Structured(payload.need_context);
        }

        let lowered = raw.to_lowercase();
        if lowered
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .any(|token| token == "true")
        {
            return DecisionParse::LooseTrue;
        }

        DecisionParse::Unrecognized
    }

    pub fn need_context(&self) -> bool {
        match self {
            DecisionParse::Structured(need) => *need,
            DecisionParse::LooseTrue => true,
            DecisionParse::Unrecognized => false,
        }
    }
}

/// Slice from the first `{` to the last `}`, which also skips code fences.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Build the user message for the retrieval decision call.
pub fn decision_prompt(history: &[Turn], query: &str) -> String {
    let rendered = render_history(history);
    let history_block = if rendered.is_empty() {
        NO_HISTORY_MARKER
    } else {
        rendered.as_str()
    };
    format!(
        "Past chat history:\n{}\n\nNew user query:\n{}\n\n\
         Decide whether answering this query requires looking up company policy documents. \
         Greetings, thanks, and small talk never require a lookup.\n\
         Answer strictly in JSON with no other text: {{\"need_context\": true}} or {{\"need_context\": false}}.",
        history_block, query
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_true_and_false() {
        assert_eq!(
            DecisionParse::parse(r#"{"need_context": true}"#),
            DecisionParse::Structured(true)
        );
        assert_eq!(
            DecisionParse::parse(r#"{"need_context": false}"#),
            DecisionParse::Structured(false)
        );
    }

    #[test]
    fn test_structured_inside_code_fence() {
        let raw = "```json\n{\"need_context\": true}\n```";
        assert_eq!(DecisionParse::parse(raw), DecisionParse::Structured(true));
    }

    #[test]
    fn test_reply_containing_true_needs_context() {
        let parsed = DecisionParse::parse("TRUE");
        assert_eq!(parsed, DecisionParse::LooseTrue);
        assert!(parsed.need_context());
        assert!(DecisionParse::parse("need_context: true").need_context());
    }

    #[test]
    fn test_reply_without_true_skips_context() {
        for raw in ["false", "", "no lookup needed", "untrue"] {
            let parsed = DecisionParse::parse(raw);
            assert_eq!(parsed, DecisionParse::Unrecognized, "raw: {:?}", raw);
            assert!(!parsed.need_context());
        }
    }

    #[test]
    fn test_malformed_json_falls_back_to_token() {
        let parsed = DecisionParse::parse(r#"{"need_context": "true"}"#);
        assert_eq!(parsed, DecisionParse::LooseTrue);
    }

    #[test]
    fn test_prompt_mentions_history_and_query() {
        let prompt = decision_prompt(&[Turn::new("hi", "hello")], "What is the leave policy?");
        assert!(prompt.contains("User: hi"));
        assert!(prompt.contains("What is the leave policy?"));
        assert!(prompt.contains("need_context"));

        let empty = decision_prompt(&[], "hello");
        assert!(empty.contains(NO_HISTORY_MARKER));
    }
}
