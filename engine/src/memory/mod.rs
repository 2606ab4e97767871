//! Conversation Memory
//!
//! Ordered log of conversation turns with triggered compaction. After every
//! append the memory estimates its size (`characters / char_to_token_ratio`)
//! and, once the estimate exceeds the ceiling, condenses everything except the
//! four most recent entries into one system-role summary produced by the
//! summarizer model.
//!
//! A failed summarization leaves the history untouched; compaction is tried
//! again on the next append.

use std::sync::Arc;
use tracing::{debug, error, info};

use sdk::errors::EngineError;
use sdk::types::{ConversationEntry, Role};

use crate::config::MemoryConfig;
use crate::llm::LLMProvider;

/// Entries preserved verbatim by a compaction
pub const RECENT_ENTRIES: usize = 4;

/// Prefix of the system entry that replaces summarized history
pub const SUMMARY_PREFIX: &str = "Summary of the previous conversation: ";

/// Conversation history for one session
pub struct ConversationMemory {
    entries: Vec<ConversationEntry>,
    summarizer: Arc<dyn LLMProvider>,
    max_tokens: usize,
    char_to_token_ratio: usize,
}

impl ConversationMemory {
    pub fn new(summarizer: Arc<dyn LLMProvider>, config: &MemoryConfig) -> Self {
        Self {
            entries: Vec::new(),
            summarizer,
            max_tokens: config.max_tokens,
            char_to_token_ratio: config.char_to_token_ratio.max(1),
        }
    }

    /// Append an entry, then compact if the estimate exceeds the ceiling
    pub async fn add_message(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push(ConversationEntry::new(role, content));

        if self.entries.len() <= 2 {
            return;
        }

        let estimate = self.estimated_tokens();
        if estimate > self.max_tokens {
            info!(
                estimated_tokens = estimate,
                max_tokens = self.max_tokens,
                entries = self.entries.len(),
                "Compacting conversation memory"
            );
            if let Err(e) = self.compact().await {
                error!("{}", e);
            }
        }
    }

    /// Replace older entries with a summary
    ///
    /// No-op when there is nothing older than the recent window.
    async fn compact(&mut self) -> Result<(), EngineError> {
        let keep = RECENT_ENTRIES.min(self.entries.len());
        let split = self.entries.len() - keep;
        if split == 0 {
            return Ok(());
        }

        let transcript = format_entries(&self.entries[..split]);
        let prompt = format!(
            "Summarize the following conversation concisely while keeping the key points, \
             the important context and every relevant fact. The summary must be complete \
             but compact.\n\nCONVERSATION:\n{}\n\nCONCISE SUMMARY:",
            transcript
        );

        let summary = self
            .summarizer
            .invoke(&prompt)
            .await
            .map_err(|e| EngineError::Summarization(e.to_string()))?;

        let mut compacted = Vec::with_capacity(keep + 1);
        compacted.push(ConversationEntry::new(
            Role::System,
            format!("{}{}", SUMMARY_PREFIX, summary.trim()),
        ));
        compacted.extend(self.entries.drain(split..));
        self.entries = compacted;

        info!(
            entries = self.entries.len(),
            estimated_tokens = self.estimated_tokens(),
            "Conversation memory compacted"
        );
        Ok(())
    }

    /// Estimated token count of the whole history
    pub fn estimated_tokens(&self) -> usize {
        let chars: usize = self.entries.iter().map(|e| e.char_count()).sum();
        chars / self.char_to_token_ratio
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        debug!("Conversation memory cleared");
    }

    /// Remove the most recent user/assistant pair
    ///
    /// Returns false, leaving the history unchanged, when fewer than two entries exist.
    pub fn remove_last_exchange(&mut self) -> bool {
        if self.entries.len() < 2 {
            return false;
        }
        self.entries.truncate(self.entries.len() - 2);
        true
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entries (all when `last_n` is None) as `ROLE: content` blocks
    pub fn formatted_history(&self, last_n: Option<usize>) -> String {
        let start = last_n
            .map(|n| self.entries.len().saturating_sub(n))
            .unwrap_or(0);
        format_entries(&self.entries[start..])
    }

    /// Content of the latest user entry
    pub fn last_user_message(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.role() == Role::User)
            .map(|e| e.content())
    }
}

fn format_entries(entries: &[ConversationEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.role().to_string().to_uppercase(), e.content()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
