//! Conversation engine.
//!
//! One chat turn runs `decide → (retrieve | skip) → compose → generate →
//! append`. Turns for the same session id are serialized by a per-session
//! async mutex; different sessions never wait on each other. History is
//! appended only after generation succeeds, so a failed turn leaves the
//! session untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use policy_assistant_core::chat::{ChatMessage, ChatModel};
use policy_assistant_core::error::{RagError, RagResult};
use policy_assistant_core::models::Turn;
use policy_assistant_core::prompt::{
    compose_answer_prompt, join_context, trailing_turns, SYSTEM_INSTRUCTION,
};
use policy_assistant_core::session::SessionStore;
use policy_assistant_core::store::VectorIndex;

use crate::config::Config;
use crate::gate::RetrievalGate;

/// Logged prefix length for user queries.
const QUERY_LOG_CHARS: usize = 100;

type SessionLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Result of one successful chat turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub answer: String,
    /// Full session history, including the turn just completed.
    pub history: Vec<Turn>,
    /// Whether document context was retrieved for this turn.
    pub used_context: bool,
}

pub struct ConversationEngine {
    gate: RetrievalGate,
    model: Arc<dyn ChatModel>,
    index: Arc<dyn VectorIndex>,
    sessions: Arc<dyn SessionStore>,
    top_k: usize,
    history_turns: usize,
    retrieval_timeout: Option<Duration>,
    generation_timeout: Option<Duration>,
    locks: SessionLocks,
}

impl ConversationEngine {
    /// Engine with `top_k = 3`, a five-turn history window and no timeouts.
    pub fn new(
        model: Arc<dyn ChatModel>,
        index: Arc<dyn VectorIndex>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            gate: RetrievalGate::new(model.clone()),
            model,
            index,
            sessions,
            top_k: 3,
            history_turns: 5,
            retrieval_timeout: None,
            generation_timeout: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Engine configured from `[retrieval]`, `[llm]` and `[vector_store]`.
    pub fn from_config(
        config: &Config,
        model: Arc<dyn ChatModel>,
        index: Arc<dyn VectorIndex>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self::new(model, index, sessions)
            .with_top_k(config.retrieval.top_k)
            .with_history_turns(config.retrieval.history_turns)
            .with_timeouts(config.vector_store.timeout(), config.llm.timeout())
    }

    /// Bound similarity search by `retrieval` and both model calls by `llm`.
    pub fn with_timeouts(mut self, retrieval: Duration, llm: Duration) -> Self {
        self.gate = RetrievalGate::new(self.model.clone()).with_timeout(llm);
        self.generation_timeout = Some(llm);
        self.retrieval_timeout = Some(retrieval);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Run one chat turn for `session_id`.
    ///
    /// # Errors
    ///
    /// [`RagError::Gate`], [`RagError::Retrieval`] or [`RagError::Generation`]
    /// for the step that failed, or [`RagError::Session`] if the session
    /// store fails. No history is written on any error.
    pub async fn chat(&self, session_id: &str, query: &str) -> RagResult<ChatTurn> {
        tracing::info!(
            session_id,
            query = %truncate_chars(query, QUERY_LOG_CHARS),
            "processing chat query"
        );

        let entry = self.session_lock(session_id);
        let result = {
            let _guard = entry.lock.lock().await;
            self.run_turn(session_id, query).await
        };
        drop(entry);

        match &result {
            Ok(turn) => tracing::info!(
                session_id,
                used_context = turn.used_context,
                turns = turn.history.len(),
                "generated response"
            ),
            Err(e) => tracing::error!(session_id, stage = e.stage(), error = %e, "chat turn failed"),
        }
        result
    }

    async fn run_turn(&self, session_id: &str, query: &str) -> RagResult<ChatTurn> {
        let history = self.sessions.history(session_id).await?;
        let window = trailing_turns(&history, self.history_turns);

        let used_context = self.gate.decide(window, query).await?.need_context();
        let context = if used_context {
            self.retrieve(query).await?
        } else {
            String::new()
        };

        let prompt = compose_answer_prompt(window, query, &context);
        tracing::debug!(session_id, prompt_chars = prompt.len(), "composed prompt");
        let answer = self.generate(prompt).await?;

        let history = self
            .sessions
            .append(session_id, Turn::new(query, answer.clone()))
            .await?;

        Ok(ChatTurn {
            answer,
            history,
            used_context,
        })
    }

    async fn retrieve(&self, query: &str) -> RagResult<String> {
        let search = self.index.similarity_search(query, self.top_k);
        let chunks = match self.retrieval_timeout {
            Some(limit) => tokio::time::timeout(limit, search).await.map_err(|_| {
                RagError::Retrieval(format!("similarity search timed out after {:?}", limit))
            })?,
            None => search.await,
        }
        .map_err(|e| RagError::Retrieval(e.to_string()))?;

        tracing::debug!(hits = chunks.len(), "retrieved context");
        Ok(join_context(&chunks))
    }

    async fn generate(&self, prompt: String) -> RagResult<String> {
        let messages = [ChatMessage::user(prompt)];
        let call = self.model.complete(SYSTEM_INSTRUCTION, &messages);
        let raw = match self.generation_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                RagError::Generation(format!("generation timed out after {:?}", limit))
            })?,
            None => call.await,
        }
        .map_err(|e| RagError::Generation(format!("{:#}", e)))?;
        Ok(raw.trim().to_string())
    }

    fn session_lock<'a>(&'a self, session_id: &'a str) -> SessionLockEntry<'a> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        let lock = locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        SessionLockEntry {
            locks: &self.locks,
            session_id,
            lock,
        }
    }
}

/// A turn's claim on its session mutex. Dropping the last claim removes
/// the map entry, including when the turn future is cancelled mid-flight.
struct SessionLockEntry<'a> {
    locks: &'a SessionLocks,
    session_id: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for SessionLockEntry<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // One reference in the map plus this claim.
        let last = locks
            .get(self.session_id)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2);
        if last {
            locks.remove(self.session_id);
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
