//! Abacus SDK
//!
//! Shared library providing the data model and error taxonomy for Abacus
//! components. This crate is used by the engine and its integration tests.

/// Error types and handling
pub mod errors;

/// Conversation, validation, execution, and document types
pub mod types;

// Re-export commonly used types
pub use errors::{AbacusErrorExt, EngineError};
pub use types::{
    ConversationEntry, ExecutionResult, ExecutionStatus, IngestReport, Passage, RawDocument, Role,
    ValidationGate, ValidationVerdict,
};
