//! Shared fakes for the integration tests: a deterministic bag-of-words
//! embedder, a scripted chat model that follows the assistant's rules, and
//! a generated one-page PDF.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use policy_assistant::config::{parse_config, Config};
use policy_assistant_core::chat::{ChatMessage, ChatModel};
use policy_assistant_core::embedding::Embedder;
use policy_assistant_core::error::RagResult;
use policy_assistant_core::prompt::{NO_CONTEXT_MARKER, REFUSAL_MESSAGE};
use policy_assistant_core::store::memory::InMemoryIndex;

// ─── Embedder ───────────────────────────────────────────────────────

/// Hashes lowercase words into a fixed number of buckets.
pub struct BagOfWordsEmbedder {
    dims: usize,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self { dims: 64 }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let word = word.to_lowercase();
            // FNV-1a
            let mut hash: u64 = 0xcbf29ce484222325;
            for b in word.bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % self.dims as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

pub fn memory_index() -> Arc<InMemoryIndex> {
    Arc::new(InMemoryIndex::new(Arc::new(BagOfWordsEmbedder::new())))
}

// ─── Chat model ─────────────────────────────────────────────────────

pub const GREETING_REPLY: &str =
    "Hello! I'm your Company Policy Assistant. What would you like to know today?";

/// A chat model that behaves like a well-instructed assistant: greetings
/// need no context, anything else does; answers quote the retrieved
/// context or fall back to the refusal message.
#[derive(Default)]
pub struct ScriptedModel {
    calls: Mutex<Vec<String>>,
    pub fail_decision: AtomicBool,
    pub fail_generation: AtomicBool,
    generation_delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stall every answer call (not decisions) for `delay`.
    pub fn with_generation_delay(mut self, delay: Duration) -> Self {
        self.generation_delay = Some(delay);
        self
    }

    /// User messages received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn section<'a>(prompt: &'a str, header: &str, next: Option<&str>) -> &'a str {
    let Some(start) = prompt.find(header) else {
        return "";
    };
    let rest = &prompt[start + header.len()..];
    let end = next.and_then(|n| rest.find(n)).unwrap_or(rest.len());
    rest[..end].trim()
}

fn is_greeting(query: &str) -> bool {
    matches!(
        query.trim().trim_end_matches(['!', '.', '?']).to_lowercase().as_str(),
        "hi" | "hello" | "hey" | "thanks" | "thank you"
    )
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _system: &str, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(prompt.clone());

        if prompt.contains("need_context") {
            if self.fail_decision.load(Ordering::SeqCst) {
                anyhow::bail!("decision model unavailable");
            }
            let query = section(&prompt, "New user query:", Some("Decide whether"));
            return Ok(if is_greeting(query) {
                "```json\n{\"need_context\": false}\n```".to_string()
            } else {
                "{\"need_context\": true}".to_string()
            });
        }

        if self.fail_generation.load(Ordering::SeqCst) {
            anyhow::bail!("generation model unavailable");
        }
        if let Some(delay) = self.generation_delay {
            tokio::time::sleep(delay).await;
        }
        let query = section(&prompt, "USER QUESTION:", Some("CONTEXT FROM DOCUMENTS:"));
        let context = section(&prompt, "CONTEXT FROM DOCUMENTS:", None);
        if is_greeting(query) {
            return Ok(format!("  {}\n", GREETING_REPLY));
        }
        if context == NO_CONTEXT_MARKER {
            return Ok(REFUSAL_MESSAGE.to_string());
        }
        Ok(format!("According to the policy documents: {}", context))
    }
}

/// Wraps [`ScriptedModel`], holding each call open for `delay` and
/// recording the peak number of calls in flight at once.
pub struct PacedModel {
    inner: ScriptedModel,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl PacedModel {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: ScriptedModel::new(),
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for PacedModel {
    fn model_name(&self) -> &str {
        "paced"
    }

    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let reply = self.inner.complete(system, messages).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

/// Minimal one-page PDF showing `line` in Helvetica.
pub fn minimal_pdf(line: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", line);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Config for in-process tests: memory vector store, small chunks.
pub fn test_config(port: u16) -> Config {
    parse_config(&format!(
        r#"
[server]
bind = "127.0.0.1:{}"
allowed_origins = ["http://localhost:3000"]

[chunking]
chunk_size = 200
chunk_overlap = 20

[vector_store]
provider = "memory"

[logging]
level = "debug"
"#,
        port
    ))
    .unwrap()
}
