//! Shared data model types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::EngineError;

/// Role of a conversation participant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message (summaries, instructions)
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// One turn in a conversation
///
/// Entries are immutable once created: fields are private and only readable
/// through accessors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationEntry {
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    /// Create an entry stamped with the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Number of characters (not bytes) in the content
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// Validator gate that rejected a snippet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationGate {
    /// Regex denylist over the raw text
    Lexical,
    /// Syntax tree construction
    Parse,
    /// Walk over the syntax tree
    Structural,
}

/// Outcome of vetting a code candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub safe: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<ValidationGate>,
}

impl ValidationVerdict {
    /// Verdict for a candidate that passed every gate
    pub fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
            gate: None,
        }
    }

    /// Verdict for a candidate rejected by `gate`
    pub fn rejected(gate: ValidationGate, reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: Some(reason.into()),
            gate: Some(gate),
        }
    }

    /// Reason text, empty for safe verdicts
    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }

    /// Convert into the engine error taxonomy
    pub fn into_result(self) -> Result<(), EngineError> {
        if self.safe {
            return Ok(());
        }
        let reason = self.reason.unwrap_or_default();
        match self.gate {
            Some(ValidationGate::Parse) => Err(EngineError::SyntaxInvalid(reason)),
            _ => Err(EngineError::ValidationRejected(reason)),
        }
    }
}

/// Terminal status of a sandboxed run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Error => write!(f, "error"),
        }
    }
}

/// Result of running a snippet in the sandbox
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,

    /// Rendered values of the bindings the snippet created
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    #[serde(default)]
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Error result that never reached the interpreter
    pub fn failure(error: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            stdout: String::new(),
            stderr: stderr.into(),
            error: Some(error.into()),
            trace: None,
            variables: BTreeMap::new(),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Convert into the engine error taxonomy
    pub fn into_result(self) -> Result<Self, EngineError> {
        match self.status {
            ExecutionStatus::Success => Ok(self),
            ExecutionStatus::Error => Err(EngineError::Execution {
                message: self.error.unwrap_or_else(|| "unknown fault".to_string()),
                trace: self.trace,
            }),
        }
    }
}

/// An uploaded file handed to the document collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A retrieved passage with source metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub content: String,
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    #[serde(default)]
    pub score: f32,
}

/// Counters reported after an ingest
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub chunk_count: usize,
}

impl IngestReport {
    /// Human-readable status line
    pub fn message(&self) -> String {
        format!(
            "Processed {} file(s) successfully and {} failed. Added {} chunk(s) to the knowledge base.",
            self.success_count, self.failure_count, self.chunk_count
        )
    }
}
