//! # Policy Assistant
//!
//! A retrieval-augmented chat backend for company policy documents.
//!
//! PDF policies are loaded, split into overlapping chunks, embedded and
//! stored in a vector index. Chat turns ask the language model whether a
//! query needs policy context, retrieve the nearest chunks when it does,
//! and answer from that context with the recent session history.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │ PDF in   │──▶│ Split + Batch │──▶│ Vector index │
//! │ (loader) │   │   (ingest)    │   │ Qdrant / mem │
//! └──────────┘   └───────────────┘   └──────┬───────┘
//!                                           │ top-k
//! ┌──────────┐   ┌───────────────┐   ┌──────┴───────┐
//! │ Sessions │◀─▶│    Engine     │──▶│  Gate + LLM  │
//! └──────────┘   └───────────────┘   └──────────────┘
//! ```
//!
//! Domain types, the chunker, prompts and the storage traits live in the
//! `policy-assistant-core` crate. This crate adds the network clients, the
//! async orchestration and the HTTP surface.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`loader`] | PDF text extraction |
//! | [`embedding`] | Ollama and OpenAI embedders |
//! | [`qdrant`] | Qdrant vector index |
//! | [`llm`] | Chat-completion client |
//! | [`ingest`] | Batched ingestion pipeline |
//! | [`gate`] | Retrieval decision |
//! | [`engine`] | Conversation engine |
//! | [`admin`] | Policy listing and deletion |
//! | [`server`] | HTTP server |

pub mod admin;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod gate;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod qdrant;
pub mod server;
