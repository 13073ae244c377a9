//! Retrieval gate: asks the chat model whether a query needs policy context.

use std::sync::Arc;
use std::time::Duration;

use policy_assistant_core::chat::{ChatMessage, ChatModel};
use policy_assistant_core::error::{RagError, RagResult};
use policy_assistant_core::gate::{decision_prompt, DecisionParse};
use policy_assistant_core::models::Turn;
use policy_assistant_core::prompt::SYSTEM_INSTRUCTION;

pub struct RetrievalGate {
    model: Arc<dyn ChatModel>,
    timeout: Option<Duration>,
}

impl RetrievalGate {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run one decision call. `history` is the trailing window shown to the
    /// model. Transport failures and timeouts are [`RagError::Gate`]; an
    /// unparseable reply is not an error and decides "no context".
    pub async fn decide(&self, history: &[Turn], query: &str) -> RagResult<DecisionParse> {
        let messages = [ChatMessage::user(decision_prompt(history, query))];
        let call = self.model.complete(SYSTEM_INSTRUCTION, &messages);

        let raw = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RagError::Gate(format!("decision call timed out after {:?}", limit)))?,
            None => call.await,
        }
        .map_err(|e| RagError::Gate(format!("decision call failed: {:#}", e)))?;

        let decision = DecisionParse::parse(&raw);
        if decision == DecisionParse::Unrecognized {
            tracing::warn!(reply = %raw.trim(), "unrecognized retrieval decision, skipping retrieval");
        } else {
            tracing::debug!(?decision, "retrieval decision");
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedReply(&'static str);

    #[async_trait]
    impl ChatModel for FixedReply {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn complete(&self, _: &str, _: &[ChatMessage]) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl ChatModel for Failing {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn complete(&self, _: &str, _: &[ChatMessage]) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    struct Slow;

    #[async_trait]
    impl ChatModel for Slow {
        fn model_name(&self) -> &str {
            "slow"
        }
        async fn complete(&self, _: &str, _: &[ChatMessage]) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("{\"need_context\": true}".into())
        }
    }

    #[tokio::test]
    async fn test_structured_reply() {
        let gate = RetrievalGate::new(Arc::new(FixedReply("{\"need_context\": false}")));
        let decision = gate.decide(&[], "hello").await.unwrap();
        assert_eq!(decision, DecisionParse::Structured(false));
        assert!(!decision.need_context());
    }

    #[tokio::test]
    async fn test_loose_reply() {
        let gate = RetrievalGate::new(Arc::new(FixedReply("True")));
        assert!(gate.decide(&[], "leave?").await.unwrap().need_context());
    }

    #[tokio::test]
    async fn test_failure_is_gate_error() {
        let gate = RetrievalGate::new(Arc::new(Failing));
        let err = gate.decide(&[], "leave?").await.unwrap_err();
        assert!(matches!(err, RagError::Gate(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_timeout_is_gate_error() {
        let gate = RetrievalGate::new(Arc::new(Slow)).with_timeout(Duration::from_millis(20));
        let err = gate.decide(&[], "leave?").await.unwrap_err();
        assert!(matches!(err, RagError::Gate(_)));
        assert!(err.to_string().contains("timed out"));
    }
}
