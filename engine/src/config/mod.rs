//! Configuration management
//!
//! This module handles loading, validation, and management of the Abacus configuration.
//! Configuration is read from TOML (`--config PATH`, or `~/.abacus/config.toml` when it
//! exists) and then overridden by environment variables. Every field has a default, so
//! an empty environment yields a working configuration.
//!
//! # Configuration Sections
//!
//! - **core**: log level
//! - **llm**: provider, model identifiers, endpoints, request timeout
//! - **documents**: chunking, retrieval breadth, vector store persistence
//! - **memory**: conversation ceiling and character-to-token ratio
//! - **sandbox**: interpreter, wall-clock timeout, memory and CPU ceilings
//! - **server**: host and port for the HTTP interface
//!
//! # Credentials
//!
//! API keys are never stored in the config file. `OPENAI_API_KEY` is read from the
//! environment when the OpenAI provider is selected.
//!
//! # Examples
//!
//! ```no_run
//! use abacus_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! println!("Model: {}", config.llm.model);
//! println!("Memory ceiling: {} tokens", config.memory.max_tokens);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable holding the OpenAI API key
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Text-generation provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Document collaborator configuration
    #[serde(default)]
    pub documents: DocumentsConfig,

    /// Conversation memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Session retention
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Code sandbox configuration
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// HTTP interface configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for rotated JSON log files; terminal only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotated log files kept in `log_dir`
    #[serde(default = "default_log_max_files")]
    pub log_max_files: usize,
}

/// Text-generation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider used for generation, summarization and embeddings (openai, ollama)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model answering questions, writing snippets and explaining results
    #[serde(default = "default_model")]
    pub model: String,

    /// Model condensing older conversation turns
    #[serde(default = "default_model")]
    pub summarizer_model: String,

    /// Model embedding document chunks and queries
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Base URL for the OpenAI-compatible API
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Base URL for the Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    /// Timeout for a single model request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Document collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Number of passages returned per query
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,

    /// Directory holding the persisted index (supports ~ expansion)
    #[serde(default = "default_vector_db_path")]
    pub vector_db_path: PathBuf,

    /// Persist the index between runs
    #[serde(default = "default_true")]
    pub persistence: bool,
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Estimated token ceiling that triggers compaction
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Characters per estimated token
    #[serde(default = "default_char_to_token_ratio")]
    pub char_to_token_ratio: usize,
}

/// Session retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Sessions held at once; the least recently used idle one is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Sessions untouched for this long are dropped (seconds)
    #[serde(default = "default_session_idle")]
    pub idle_secs: u64,
}

/// Code sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Python interpreter used for snippets
    #[serde(default = "default_python")]
    pub python: String,

    /// Wall-clock limit per snippet (seconds)
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,

    /// Additional address space a snippet may allocate (MB)
    #[serde(default = "default_sandbox_memory")]
    pub memory_limit_mb: u64,

    /// CPU time limit per snippet (seconds)
    #[serde(default = "default_sandbox_cpu")]
    pub cpu_limit_secs: u64,
}

/// HTTP interface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_retrieval_k() -> usize {
    4
}

fn default_vector_db_path() -> PathBuf {
    PathBuf::from("./data/vector_db")
}

fn default_max_tokens() -> usize {
    2000
}

fn default_char_to_token_ratio() -> usize {
    4
}

fn default_log_max_files() -> usize {
    5
}

fn default_max_sessions() -> usize {
    1000
}

fn default_session_idle() -> u64 {
    3600
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_sandbox_timeout() -> u64 {
    10
}

fn default_sandbox_memory() -> u64 {
    512
}

fn default_sandbox_cpu() -> u64 {
    10
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7860
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            log_max_files: default_log_max_files(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            summarizer_model: default_model(),
            embedding_model: default_embedding_model(),
            openai_base_url: default_openai_base_url(),
            ollama_base_url: default_ollama_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            retrieval_k: default_retrieval_k(),
            vector_db_path: default_vector_db_path(),
            persistence: true,
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_secs: default_session_idle(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            char_to_token_ratio: default_char_to_token_ratio(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_secs: default_sandbox_timeout(),
            memory_limit_mb: default_sandbox_memory(),
            cpu_limit_secs: default_sandbox_cpu(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from a file (or the default location) and the environment
    ///
    /// Resolution order: explicit `path` > `~/.abacus/config.toml` if it exists >
    /// built-in defaults. Environment variables override file values.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration file cannot be read or parsed
    /// - An environment variable holds an unparsable value
    /// - Validation fails
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => match Self::default_config_path() {
                Some(default_path) if default_path.exists() => Self::read_file(&default_path)?,
                _ => Self::default(),
            },
        };

        config.apply_overrides(std::env::vars())?;
        config.validate_and_process()?;

        Ok(config)
    }

    /// Load configuration from a specific path without consulting the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let mut config = Self::read_file(path)?;
        config.validate_and_process()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default configuration file path (~/.abacus/config.toml)
    fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".abacus").join("config.toml"))
    }

    /// Apply `KEY=value` overrides (normally `std::env::vars()`)
    ///
    /// Keys are matched case-insensitively. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a recognised key holds a value of the wrong type.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let key = key.as_ref().to_ascii_uppercase();
            let value = value.as_ref().trim();

            match key.as_str() {
                "LOG_LEVEL" => self.core.log_level = value.to_ascii_lowercase(),
                "LOG_DIR" => self.core.log_dir = Some(PathBuf::from(value)),
                "LOG_MAX_FILES" => self.core.log_max_files = parse_var(&key, value)?,
                "LLM_PROVIDER" => self.llm.provider = value.to_ascii_lowercase(),
                "LLM_MODEL_NAME" => self.llm.model = value.to_string(),
                "SUMMARIZER_MODEL_NAME" => self.llm.summarizer_model = value.to_string(),
                "EMBEDDING_MODEL_NAME" => self.llm.embedding_model = value.to_string(),
                "OPENAI_BASE_URL" => self.llm.openai_base_url = value.to_string(),
                "OLLAMA_BASE_URL" => self.llm.ollama_base_url = value.to_string(),
                "LLM_TIMEOUT_SECS" => self.llm.request_timeout_secs = parse_var(&key, value)?,
                "CHUNK_SIZE" => self.documents.chunk_size = parse_var(&key, value)?,
                "CHUNK_OVERLAP" => self.documents.chunk_overlap = parse_var(&key, value)?,
                "RETRIEVAL_K" => self.documents.retrieval_k = parse_var(&key, value)?,
                "VECTOR_DB_PATH" => self.documents.vector_db_path = PathBuf::from(value),
                "ENABLE_VECTOR_DB_PERSISTENCE" => {
                    self.documents.persistence = parse_bool(&key, value)?
                }
                "MAX_MEMORY_TOKENS" => self.memory.max_tokens = parse_var(&key, value)?,
                "CHAR_TO_TOKEN_RATIO" => self.memory.char_to_token_ratio = parse_var(&key, value)?,
                "MAX_SESSIONS" => self.sessions.max_sessions = parse_var(&key, value)?,
                "SESSION_IDLE_SECS" => self.sessions.idle_secs = parse_var(&key, value)?,
                "SANDBOX_PYTHON" => self.sandbox.python = value.to_string(),
                "SANDBOX_TIMEOUT_SECS" => self.sandbox.timeout_secs = parse_var(&key, value)?,
                "SANDBOX_MEMORY_MB" => self.sandbox.memory_limit_mb = parse_var(&key, value)?,
                "SANDBOX_CPU_SECS" => self.sandbox.cpu_limit_secs = parse_var(&key, value)?,
                "HOST" => self.server.host = value.to_string(),
                "PORT" => self.server.port = parse_var(&key, value)?,
                _ => {}
            }
        }

        Ok(())
    }

    /// Validate and process configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range or a path cannot be expanded.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        // Validate log level
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        // Validate provider
        let valid_providers = ["openai", "ollama"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid provider '{}'. Must be one of: {}",
                self.llm.provider,
                valid_providers.join(", ")
            )));
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }

        // Validate chunking
        if self.documents.chunk_size == 0 {
            return Err(EngineError::Config(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.documents.chunk_overlap >= self.documents.chunk_size {
            return Err(EngineError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.documents.chunk_overlap, self.documents.chunk_size
            )));
        }
        if self.documents.retrieval_k == 0 {
            return Err(EngineError::Config(
                "retrieval_k must be at least 1".to_string(),
            ));
        }

        // Validate memory
        if self.memory.char_to_token_ratio == 0 {
            return Err(EngineError::Config(
                "char_to_token_ratio must be at least 1".to_string(),
            ));
        }

        if self.sessions.max_sessions == 0 || self.sessions.idle_secs == 0 {
            return Err(EngineError::Config(
                "sessions max_sessions and idle_secs must be at least 1".to_string(),
            ));
        }
        if self.core.log_max_files == 0 {
            return Err(EngineError::Config(
                "log_max_files must be at least 1".to_string(),
            ));
        }

        // Validate sandbox
        if self.sandbox.timeout_secs == 0 || self.sandbox.cpu_limit_secs == 0 {
            return Err(EngineError::Config(
                "sandbox timeout_secs and cpu_limit_secs must be at least 1".to_string(),
            ));
        }
        if self.sandbox.python.trim().is_empty() {
            return Err(EngineError::Config(
                "sandbox python interpreter must not be empty".to_string(),
            ));
        }

        self.documents.vector_db_path = expand_path(&self.documents.vector_db_path)?;
        self.core.log_dir = self.core.log_dir.as_deref().map(expand_path).transpose()?;

        Ok(())
    }

    /// Resolve the API key for the configured provider
    ///
    /// Returns `Ok(None)` for providers that need no credentials.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::MissingCredentials` when the OpenAI provider is
    /// selected and `OPENAI_API_KEY` is unset or empty.
    pub fn api_key(&self) -> Result<Option<String>, EngineError> {
        if self.llm.provider != "openai" {
            return Ok(None);
        }

        match std::env::var(OPENAI_API_KEY_VAR) {
            Ok(key) if !key.trim().is_empty() => Ok(Some(key.trim().to_string())),
            _ => Err(EngineError::MissingCredentials(
                OPENAI_API_KEY_VAR.to_string(),
            )),
        }
    }

    /// Path of the persisted document index
    pub fn index_path(&self) -> PathBuf {
        self.documents.vector_db_path.join("index.json")
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, EngineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| EngineError::Config(format!("Invalid value for {}: '{}' ({})", key, value, e)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, EngineError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(EngineError::Config(format!(
            "Invalid value for {}: '{}' (expected true or false)",
            key, value
        ))),
    }
}

/// Expand ~ in path to user's home directory
///
/// # Examples
///
/// ```ignore
/// let path = PathBuf::from("~/data");
/// let expanded = expand_path(&path)?;
/// // expanded is now /home/user/data (on Unix)
/// ```
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
