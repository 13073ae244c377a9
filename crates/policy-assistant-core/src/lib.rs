//! # Policy Assistant Core
//!
//! Shared logic for Policy Assistant: chunk models, recursive text
//! splitting, the vector index and session store abstractions, retrieval
//! gate parsing, and prompt composition.
//!
//! This crate contains no tokio, HTTP clients, filesystem I/O, or other
//! runtime-bound dependencies. Network-backed implementations of the
//! traits defined here live in the `policy-assistant` app crate.

pub mod chat;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod gate;
pub mod models;
pub mod policies;
pub mod prompt;
pub mod session;
pub mod store;

pub use error::{RagError, RagResult};
