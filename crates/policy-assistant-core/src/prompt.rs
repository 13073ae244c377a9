//! Prompt text and composition for answer generation.

use crate::models::{StoredChunk, Turn};

/// Fixed refusal used when no relevant policy context is available.
pub const REFUSAL_MESSAGE: &str = "I'm sorry, but I couldn't find any specific company policy about that topic in my database. You may wish to check with HR or the Compliance Department for clarification.";

/// Placeholder rendered when a session has no prior turns.
pub const NO_HISTORY_MARKER: &str = "[No previous messages]";

/// Placeholder rendered when retrieval was skipped or found nothing.
pub const NO_CONTEXT_MARKER: &str = "[No external context retrieved]";

/// System instruction sent with every model call.
pub const SYSTEM_INSTRUCTION: &str = r#"You are the company's Policy Expert Assistant.
Your job is to help employees understand official company policies, procedures, and guidelines clearly and accurately.

Knowledge source:
- Your only authoritative source is the policy context retrieved from the company's document index.
- When context is provided, answer using only that context. Cite or summarize the relevant section where possible (e.g. "According to the Leave Policy, section 4.2...").
- Never speculate, infer confidential details, or invent policy content.

Behaviour and tone:
- Be professional, clear, neutral, polite, and concise. Use simple language every employee can follow.
- If the message is a greeting or small talk (e.g. "hi", "hello", "hey"), respond warmly, introduce yourself as the Company Policy Assistant, and offer help with HR, IT, compliance, or operational policies. No document lookup is needed for this.
- If several related policies are found, summarize each briefly and say which one applies best.
- If the question is about policy but no relevant context is available, respond with exactly:
"I'm sorry, but I couldn't find any specific company policy about that topic in my database. You may wish to check with HR or the Compliance Department for clarification."
"#;

/// Render turns as `User:` / `Assistant:` lines, oldest first.
pub fn render_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("User: {}\nAssistant: {}", t.user, t.assistant))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Return at most the last `limit` turns, preserving chronological order.
pub fn trailing_turns(history: &[Turn], limit: usize) -> &[Turn] {
    let start = history.len().saturating_sub(limit);
    &history[start..]
}

/// Concatenate retrieved chunk texts in rank order.
pub fn join_context(chunks: &[StoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the final answer-generation prompt.
///
/// `history` must already be trimmed to the trailing window.
pub fn compose_answer_prompt(history: &[Turn], query: &str, context: &str) -> String {
    let rendered = render_history(history);
    let history_block = if rendered.is_empty() {
        NO_HISTORY_MARKER
    } else {
        rendered.as_str()
    };
    let context_block = if context.trim().is_empty() {
        NO_CONTEXT_MARKER
    } else {
        context
    };

    format!(
        "SYSTEM INSTRUCTION:\n{}\n\nCONVERSATION HISTORY:\n{}\n\nUSER QUESTION:\n{}\n\nCONTEXT FROM DOCUMENTS:\n{}\n",
        SYSTEM_INSTRUCTION.trim(),
        history_block,
        query,
        context_block
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use chrono::Utc;

    fn stored(text: &str) -> StoredChunk {
        StoredChunk {
            id: "id".into(),
            text: text.into(),
            metadata: ChunkMetadata::new("a.pdf", "HR", Utc::now()),
            score: None,
        }
    }

    #[test]
    fn test_trailing_turns_keeps_most_recent_in_order() {
        let history: Vec<Turn> = (0..8).map(|i| Turn::new(format!("q{}", i), "a")).collect();
        let tail = trailing_turns(&history, 5);
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0].user, "q3");
        assert_eq!(tail[4].user, "q7");
        assert_eq!(trailing_turns(&history[..2], 5).len(), 2);
    }

    #[test]
    fn test_compose_uses_markers_when_empty() {
        let prompt = compose_answer_prompt(&[], "hello", "");
        assert!(prompt.contains(NO_HISTORY_MARKER));
        assert!(prompt.contains(NO_CONTEXT_MARKER));
        assert!(prompt.contains("USER QUESTION:\nhello"));
    }

    #[test]
    fn test_compose_includes_history_and_context() {
        let history = vec![Turn::new("hi", "Hello! How can I help?")];
        let context = join_context(&[stored("Employees get 20 days."), stored("Carry-over is 5 days.")]);
        let prompt = compose_answer_prompt(&history, "What is the leave policy?", &context);
        assert!(prompt.contains("User: hi\nAssistant: Hello! How can I help?"));
        assert!(prompt.contains("Employees get 20 days.\n\nCarry-over is 5 days."));
        assert!(!prompt.contains(NO_CONTEXT_MARKER));
    }

    #[test]
    fn test_system_instruction_carries_refusal() {
        assert!(SYSTEM_INSTRUCTION.contains(REFUSAL_MESSAGE));
        assert!(SYSTEM_INSTRUCTION.contains("Policy Expert Assistant"));
    }
}
