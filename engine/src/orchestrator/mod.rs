//! Query Orchestrator
//!
//! Runs one conversational turn end-to-end:
//!
//! ```text
//! query ─► memory(user) ─► route ─┬─► generate ─► vet ─► run (if safe) ─► explain
//!                                 └─► retrieve ─► format ─► answer with history
//!                                          ─► memory(assistant) ─► answer
//! ```
//!
//! Memory is scoped per session. Each session owns a `ConversationMemory`
//! behind its own mutex, held for the whole turn, so turns within one session
//! are serialized while different sessions proceed concurrently.
//!
//! The session map is bounded. Opening a new session first drops sessions idle
//! for longer than `sessions.idle_secs`, then evicts the least recently used
//! ones while the map is full. A session in the middle of a turn is never
//! evicted. Clearing a session removes it.
//!
//! No fault escapes a turn: generation, validation, execution and retrieval
//! failures all become natural-language answers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use sdk::errors::EngineError;
use sdk::types::{ConversationEntry, ExecutionResult, IngestReport, RawDocument, Role};

use crate::code_validator::CodeValidator;
use crate::codegen::{CodeGenerator, ResultExplainer};
use crate::config::{Config, MemoryConfig, SessionsConfig};
use crate::documents::{build_embedder, DocumentStore, VectorDocumentStore};
use crate::llm::{build_provider, LLMProvider};
use crate::memory::ConversationMemory;
use crate::query_router::Route;
use crate::sandbox::{CodeRunner, Sandbox};

/// Answer given when the retrieval path cannot reach the model
pub const RETRIEVAL_APOLOGY: &str = "Sorry, I ran into an error while processing your question. \
Please try again or rephrase it.\n\nIf the problem persists, consider starting a new conversation.";

/// History entries included in retrieval prompts
const RETRIEVAL_HISTORY_ENTRIES: usize = 5;

/// Session used when a caller does not name one
pub const DEFAULT_SESSION: &str = "default";

type SessionMemory = Arc<Mutex<ConversationMemory>>;

struct Session {
    memory: SessionMemory,
    last_used: Instant,
}

impl Session {
    /// A turn (or a reader) still holds the memory
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.memory) > 1
    }
}

/// Composes routing, the sandbox pipeline, retrieval and memory
pub struct QueryOrchestrator {
    llm: Arc<dyn LLMProvider>,
    summarizer: Arc<dyn LLMProvider>,
    documents: Arc<dyn DocumentStore>,
    runner: Arc<dyn CodeRunner>,
    generator: CodeGenerator,
    explainer: ResultExplainer,
    validator: CodeValidator,
    memory_config: MemoryConfig,
    limits: SessionsConfig,
    sessions: RwLock<HashMap<String, Session>>,
}

impl QueryOrchestrator {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        summarizer: Arc<dyn LLMProvider>,
        documents: Arc<dyn DocumentStore>,
        runner: Arc<dyn CodeRunner>,
        memory_config: MemoryConfig,
    ) -> Self {
        Self {
            generator: CodeGenerator::new(llm.clone()),
            explainer: ResultExplainer::new(llm.clone()),
            validator: CodeValidator::new(),
            llm,
            summarizer,
            documents,
            runner,
            memory_config,
            limits: SessionsConfig::default(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Bound how many sessions are retained and for how long
    pub fn with_session_limits(mut self, limits: SessionsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Wire every collaborator from configuration
    ///
    /// # Errors
    ///
    /// Fails when credentials for the configured provider are missing or the
    /// provider is unknown.
    pub async fn from_config(config: &Config) -> Result<Self, EngineError> {
        let llm = build_provider(config, &config.llm.model)?;
        let summarizer = build_provider(config, &config.llm.summarizer_model)?;
        let embedder = build_embedder(config)?;
        let documents = VectorDocumentStore::open(embedder, &config.documents).await;
        let sandbox = Sandbox::new(&config.sandbox);

        info!(
            provider = %config.llm.provider,
            model = %config.llm.model,
            summarizer = %config.llm.summarizer_model,
            "Orchestrator ready"
        );

        Ok(Self::new(
            llm,
            summarizer,
            Arc::new(documents),
            Arc::new(sandbox),
            config.memory.clone(),
        )
        .with_session_limits(config.sessions.clone()))
    }

    async fn session(&self, session_id: &str) -> SessionMemory {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.last_used = now;
            return session.memory.clone();
        }

        self.evict(&mut sessions, now);

        let memory = Arc::new(Mutex::new(ConversationMemory::new(
            self.summarizer.clone(),
            &self.memory_config,
        )));
        sessions.insert(
            session_id.to_string(),
            Session {
                memory: memory.clone(),
                last_used: now,
            },
        );
        memory
    }

    /// Make room for one more session
    fn evict(&self, sessions: &mut HashMap<String, Session>, now: Instant) {
        let before = sessions.len();
        let idle = Duration::from_secs(self.limits.idle_secs);
        sessions.retain(|_, session| session.in_use() || now.duration_since(session.last_used) < idle);

        while sessions.len() >= self.limits.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, session)| !session.in_use())
                .min_by_key(|(_, session)| session.last_used)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => break,
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
    }

    async fn existing_session(&self, session_id: &str) -> Option<SessionMemory> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|session| session.memory.clone())
    }

    /// Answer `query` within `session_id`
    ///
    /// An empty query yields an empty answer and leaves memory untouched.
    pub async fn process_query(&self, session_id: &str, query: &str) -> String {
        let query = query.trim();
        if query.is_empty() {
            return String::new();
        }

        let memory = self.session(session_id).await;
        let mut memory = memory.lock().await;
        self.answer_turn(&mut memory, query).await
    }

    /// Redo the last turn: drop the latest user/assistant pair, then answer again
    pub async fn regenerate(&self, session_id: &str, previous_query: &str) -> String {
        let query = previous_query.trim();
        if query.is_empty() {
            return String::new();
        }

        let memory = self.session(session_id).await;
        let mut memory = memory.lock().await;
        if !memory.remove_last_exchange() {
            warn!(session = %session_id, "Nothing to regenerate; answering as a new turn");
        }
        self.answer_turn(&mut memory, query).await
    }

    async fn answer_turn(&self, memory: &mut ConversationMemory, query: &str) -> String {
        memory.add_message(Role::User, query).await;

        let route = Route::for_query(query);
        info!(route = ?route, "Processing query");

        let answer = match route {
            Route::Computation => self.answer_with_code(query).await,
            Route::Retrieval => self.answer_from_documents(memory, query).await,
        };

        memory.add_message(Role::Assistant, answer.clone()).await;
        answer
    }

    async fn answer_with_code(&self, query: &str) -> String {
        let code = self.generator.generate(query).await;
        let verdict = self.validator.vet(&code);

        let result = if verdict.safe {
            self.runner.run(&code).await
        } else {
            warn!("Generated snippet rejected: {}", verdict.reason());
            ExecutionResult::failure(
                verdict.reason(),
                format!("Potentially dangerous code detected: {}", verdict.reason()),
            )
        };

        self.explainer.explain(query, &code, &result).await
    }

    async fn answer_from_documents(&self, memory: &ConversationMemory, query: &str) -> String {
        let passages = self.documents.retrieve(query).await;
        let history = memory.formatted_history(Some(RETRIEVAL_HISTORY_ENTRIES));

        let prompt = if passages.is_empty() {
            format!(
                "### INSTRUCTIONS\n\
                 You are an AI assistant that gives accurate, helpful answers based on the \
                 conversation context and your general knowledge. Be honest when you do not know \
                 something.\n\n\
                 ### CONVERSATION CONTEXT\n{history}\n\n\
                 ### USER QUESTION\n{query}\n\n\
                 ### ANSWER\n"
            )
        } else {
            let context = self.documents.format(&passages);
            format!(
                "### INSTRUCTIONS\n\
                 You are an AI assistant that gives accurate, helpful answers based on the \
                 conversation context and the information in the knowledge base. When the \
                 documents do not contain the answer, rely on your general knowledge and say \
                 clearly that you are doing so.\n\n\
                 ### CONVERSATION CONTEXT\n{history}\n\n\
                 ### KNOWLEDGE BASE\n{context}\n\n\
                 ### USER QUESTION\n{query}\n\n\
                 ### ANSWER\n"
            )
        };

        match self.llm.invoke(&prompt).await {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => RETRIEVAL_APOLOGY.to_string(),
            Err(e) => {
                error!("Retrieval answer failed: {}", e);
                RETRIEVAL_APOLOGY.to_string()
            }
        }
    }

    /// Forget a session and its history
    pub async fn clear(&self, session_id: &str) {
        let removed = self.sessions.write().await.remove(session_id);
        if let Some(session) = removed {
            // A turn still holding the memory must not resurrect old entries
            session.memory.lock().await.clear();
            info!(session = %session_id, "Conversation cleared");
        }
    }

    /// Snapshot of a session's history (empty for unknown sessions)
    pub async fn history(&self, session_id: &str) -> Vec<ConversationEntry> {
        match self.existing_session(session_id).await {
            Some(memory) => memory.lock().await.entries().to_vec(),
            None => Vec::new(),
        }
    }

    /// Latest user message in a session
    pub async fn last_user_message(&self, session_id: &str) -> Option<String> {
        let memory = self.existing_session(session_id).await?;
        let memory = memory.lock().await;
        memory.last_user_message().map(str::to_string)
    }

    /// Hand uploaded files to the document collaborator
    pub async fn ingest(&self, documents: Vec<RawDocument>) -> IngestReport {
        let report = self.documents.ingest(documents).await;
        info!("{}", report.message());
        report
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
