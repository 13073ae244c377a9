//! Per-session conversation memory.
//!
//! [`SessionStore`] is injected into the conversation engine. The
//! in-memory implementation keeps every turn of a session (only the
//! trailing window is surfaced to the model) and bounds memory with an
//! idle TTL and a maximum session count. Eviction drops the least
//! recently active sessions first.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::{RagError, RagResult};
use crate::models::Turn;

/// Conversation history keyed by an opaque session ID.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Full history of a session, oldest first. Unknown sessions are empty.
    async fn history(&self, session_id: &str) -> RagResult<Vec<Turn>>;

    /// Append a turn and return the updated full history.
    async fn append(&self, session_id: &str, turn: Turn) -> RagResult<Vec<Turn>>;
}

/// Memory bounds for [`InMemorySessionStore`]. `None` disables a bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLimits {
    /// Sessions idle for longer than this are forgotten.
    pub ttl: Option<Duration>,
    /// Upper bound on concurrently retained sessions.
    pub max_sessions: Option<usize>,
}

struct SessionSlot {
    turns: Vec<Turn>,
    last_active: DateTime<Utc>,
}

pub struct InMemorySessionStore {
    limits: SessionLimits,
    slots: RwLock<HashMap<String, SessionSlot>>,
}

impl InMemorySessionStore {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            limits,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Store with no TTL and no session cap.
    pub fn unbounded() -> Self {
        Self::new(SessionLimits::default())
    }

    fn is_expired(&self, slot: &SessionSlot, now: DateTime<Utc>) -> bool {
        match self.limits.ttl {
            Some(ttl) => now - slot.last_active > ttl,
            None => false,
        }
    }

    fn history_at(&self, session_id: &str, now: DateTime<Utc>) -> RagResult<Vec<Turn>> {
        let slots = self.slots.read().map_err(|_| poisoned())?;
        Ok(slots
            .get(session_id)
            .filter(|slot| !self.is_expired(slot, now))
            .map(|slot| slot.turns.clone())
            .unwrap_or_default())
    }

    fn append_at(&self, session_id: &str, turn: Turn, now: DateTime<Utc>) -> RagResult<Vec<Turn>> {
        let mut slots = self.slots.write().map_err(|_| poisoned())?;

        if self.limits.ttl.is_some() {
            let before = slots.len();
            slots.retain(|_, slot| !self.is_expired(slot, now));
            let expired = before - slots.len();
            if expired > 0 {
                tracing::debug!(expired, "evicted idle sessions");
            }
        }

        let slot = slots
            .entry(session_id.to_string())
            .or_insert_with(|| SessionSlot {
                turns: Vec::new(),
                last_active: now,
            });
        slot.turns.push(turn);
        slot.last_active = now;
        let updated = slot.turns.clone();

        if let Some(max) = self.limits.max_sessions {
            while slots.len() > max.max(1) {
                let oldest = slots
                    .iter()
                    .filter(|(id, _)| id.as_str() != session_id)
                    .min_by_key(|(_, slot)| slot.last_active)
                    .map(|(id, _)| id.clone());
                match oldest {
                    Some(id) => {
                        slots.remove(&id);
                        tracing::debug!(session_id = %id, "evicted least recently active session");
                    }
                    None => break,
                }
            }
        }

        Ok(updated)
    }
}

fn poisoned() -> RagError {
    RagError::Session("session store lock poisoned".to_string())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn history(&self, session_id: &str) -> RagResult<Vec<Turn>> {
        self.history_at(session_id, Utc::now())
    }

    async fn append(&self, session_id: &str, turn: Turn) -> RagResult<Vec<Turn>> {
        self.append_at(session_id, turn, Utc::now())
    }
}
