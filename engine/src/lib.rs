//! Abacus Engine Library
//!
//! This library provides the core functionality of the Abacus assistant.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// LLM provider abstraction layer
pub mod llm;

/// Query routing between computation and retrieval
pub mod query_router;

/// Static validation of generated Python snippets
pub mod code_validator;

/// Subprocess execution sandbox
pub mod sandbox;

/// Snippet generation and result explanation
pub mod codegen;

/// Conversation memory with compaction
pub mod memory;

/// Document ingestion and retrieval
pub mod documents;

/// Query orchestration
pub mod orchestrator;

/// HTTP interface
pub mod server;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
