//! Fact-grounded writing assistant.
//!
//! Lorekeeper keeps a vector index synchronized with a mutable store of
//! background facts, plans retrieval queries for each user message, and
//! streams an AI-generated continuation grounded in the retrieved facts.
//!
//! # Architecture
//!
//! - **Facts**: SQLite-backed store of `{id, category, text}` records
//! - **Embeddings**: Local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions)
//! - **Index**: exact squared-Euclidean search, rebuilt whenever the corpus changes
//! - **Generation**: any OpenAI-compatible chat-completions backend
//! - **Transport**: HTTP with server-sent events
//!
//! # Modules
//!
//! - [`cli`]: Command implementations for the `lorekeeper` binary
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization and schema
//! - [`error`]: Pipeline failure taxonomy
//! - [`facts`]: Fact records, the [`facts::FactStore`] trait, and writing style
//! - [`embedding`]: Text-to-vector embedding via ONNX Runtime
//! - [`index`]: Vector index and its synchronization with the fact corpus
//! - [`llm`]: Text-generation backend client
//! - [`pipeline`]: Query planning, retrieval, orchestration, and wire encoding
//! - [`server`]: HTTP routes

pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod facts;
pub mod index;
pub mod llm;
pub mod pipeline;
pub mod server;
