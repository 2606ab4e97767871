//! Execution Sandbox
//!
//! Runs vetted snippets in a separate `python3 -I` process. The engine never
//! executes snippet code in its own address space.
//!
//! Containment layers:
//! - an embedded harness that executes the snippet with a minimal builtin
//!   surface and an import hook admitting only numeric/text modules
//! - `RLIMIT_AS` and `RLIMIT_CPU` set by the harness after the preamble loads
//! - a wall-clock timer inside the harness, so a timed-out run still reports
//!   the output it produced, backed by a hard timeout here; the child is
//!   killed on drop
//! - bounded capture on both sides of the pipe: the harness keeps at most
//!   `MAX_OUTPUT_CHARS + 1` characters per stream and the engine reads at most
//!   `MAX_RESPONSE_BYTES` of its reply
//! - a scrubbed environment and a throwaway working directory
//!
//! Callers must obtain a safe verdict from the validator first; `run` does not
//! re-validate. `run` never returns a Rust error: every fault, including spawn
//! failures and timeouts, becomes an error [`ExecutionResult`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use sdk::errors::EngineError;
use sdk::types::{ExecutionResult, ExecutionStatus};

use crate::config::SandboxConfig;

pub mod sanitize;

pub use sanitize::{sanitize_output, MAX_OUTPUT_CHARS, TRUNCATION_MARKER};

const HARNESS: &str = include_str!("harness.py");

/// Upper bound on the harness reply read from the child's stdout
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

/// Upper bound on interpreter diagnostics read from the child's stderr
const MAX_DIAGNOSTIC_BYTES: u64 = 64 * 1024;

/// Extra time granted past the harness timer before the child is killed
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Convenience bindings made available to every snippet
pub const PREAMBLE: &[&str] = &[
    "import math",
    "import random",
    "from datetime import datetime, date, timedelta",
    "import statistics",
    "import pandas as pd",
    "import numpy as np",
    "import re",
    "import collections",
];

/// Modules a snippet may import at run time
pub const ALLOWED_MODULES: &[&str] = &[
    "math",
    "cmath",
    "random",
    "datetime",
    "statistics",
    "decimal",
    "fractions",
    "numbers",
    "itertools",
    "functools",
    "operator",
    "collections",
    "heapq",
    "bisect",
    "re",
    "string",
    "textwrap",
    "json",
    "calendar",
    "copy",
    "enum",
    "dataclasses",
    "typing",
    "numpy",
    "pandas",
];

/// Errors raised while driving the interpreter process
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to start interpreter '{python}': {source}")]
    Spawn {
        python: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sandbox process exited abnormally ({status}); the snippet may have exceeded its memory or CPU limit")]
    Crashed { status: String, stderr: String },

    #[error("Malformed sandbox response: {0}")]
    Protocol(String),
}

impl From<SandboxError> for EngineError {
    fn from(err: SandboxError) -> Self {
        EngineError::Execution {
            message: err.to_string(),
            trace: None,
        }
    }
}

#[derive(Serialize)]
struct HarnessRequest<'a> {
    code: &'a str,
    preamble: &'a [&'a str],
    allowed_modules: &'a [&'a str],
    memory_limit_mb: u64,
    cpu_limit_secs: u64,
    wall_limit_secs: f64,
    max_output_chars: usize,
}

#[derive(Deserialize)]
struct HarnessResponse {
    status: ExecutionStatus,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    error: Option<String>,
    trace: Option<String>,
    #[serde(default)]
    syntax_error: Option<String>,
    #[serde(default)]
    variables: BTreeMap<String, String>,
}

/// Executes vetted snippets
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str) -> ExecutionResult;
}

/// Subprocess sandbox for Python snippets
#[derive(Debug, Clone)]
pub struct Sandbox {
    python: String,
    timeout: Duration,
    memory_limit_mb: u64,
    cpu_limit_secs: u64,
}

impl Sandbox {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            python: config.python.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            memory_limit_mb: config.memory_limit_mb,
            cpu_limit_secs: config.cpu_limit_secs,
        }
    }

    /// Override the wall-clock limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check that the configured interpreter can be started
    pub async fn python_available(&self) -> bool {
        Command::new(&self.python)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Execute a vetted snippet
    pub async fn run(&self, code: &str) -> ExecutionResult {
        let start = Instant::now();

        let mut result = match self.try_run(code).await {
            Ok(result) => result,
            Err(SandboxError::Crashed { status, stderr }) => {
                warn!("Sandbox process crashed: {}", status);
                let err = SandboxError::Crashed {
                    status,
                    stderr: String::new(),
                };
                ExecutionResult::failure(err.to_string(), sanitize_output(&stderr))
            }
            Err(e) => {
                warn!("Sandbox run failed: {}", e);
                ExecutionResult::failure(e.to_string(), String::new())
            }
        };

        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            status = %result.status,
            duration_ms = result.duration_ms,
            "Snippet executed"
        );
        result
    }

    async fn try_run(&self, code: &str) -> Result<ExecutionResult, SandboxError> {
        let payload = serde_json::to_vec(&HarnessRequest {
            code,
            preamble: PREAMBLE,
            allowed_modules: ALLOWED_MODULES,
            memory_limit_mb: self.memory_limit_mb,
            cpu_limit_secs: self.cpu_limit_secs,
            wall_limit_secs: self.timeout.as_secs_f64(),
            max_output_chars: MAX_OUTPUT_CHARS,
        })
        .map_err(|e| SandboxError::Protocol(e.to_string()))?;

        let work_dir = ScratchDir::create()?;
        let path = std::env::var("PATH").unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".to_string());

        let mut child = Command::new(&self.python)
            .arg("-I")
            .arg("-c")
            .arg(HARNESS)
            .current_dir(&work_dir.path)
            .env_clear()
            .env("PATH", path)
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("OPENBLAS_NUM_THREADS", "1")
            .env("OMP_NUM_THREADS", "1")
            .env("MKL_NUM_THREADS", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                python: self.python.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Protocol("interpreter stdin unavailable".to_string()))?;
        stdin.write_all(&payload).await?;
        stdin.shutdown().await?;
        drop(stdin);

        debug!(bytes = payload.len(), "Snippet handed to sandbox");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Protocol("interpreter stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::Protocol("interpreter stderr unavailable".to_string()))?;
        let stdout_reader = tokio::spawn(read_bounded(stdout, MAX_RESPONSE_BYTES));
        let stderr_reader = tokio::spawn(read_bounded(stderr, MAX_DIAGNOSTIC_BYTES));

        let status = match tokio::time::timeout(self.timeout + KILL_GRACE, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    debug!("Failed to kill timed-out interpreter: {}", e);
                }
                return Err(SandboxError::Timeout(self.timeout));
            }
        };

        let stdout = stdout_reader
            .await
            .map_err(|e| SandboxError::Protocol(e.to_string()))??;
        let stderr = stderr_reader
            .await
            .map_err(|e| SandboxError::Protocol(e.to_string()))??;

        let stdout = String::from_utf8_lossy(&stdout);
        let response: HarnessResponse = match serde_json::from_str(stdout.trim()) {
            Ok(response) => response,
            Err(e) => {
                if !status.success() {
                    return Err(SandboxError::Crashed {
                        status: status.to_string(),
                        stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    });
                }
                return Err(SandboxError::Protocol(e.to_string()));
            }
        };

        if let Some(reason) = response.syntax_error {
            let err = EngineError::SyntaxInvalid(reason);
            warn!("Interpreter rejected snippet: {}", err);
            return Ok(ExecutionResult::failure(sanitize_output(&err.to_string()), String::new()));
        }

        Ok(ExecutionResult {
            status: response.status,
            stdout: sanitize_output(&response.stdout),
            stderr: sanitize_output(&response.stderr),
            error: response.error.map(|e| sanitize_output(&e)),
            trace: response.trace.map(|t| sanitize_output(&t)),
            variables: response
                .variables
                .into_iter()
                .map(|(name, value)| (name, sanitize::sanitize_variable(&value)))
                .collect(),
            duration_ms: 0,
        })
    }
}

#[async_trait]
impl CodeRunner for Sandbox {
    async fn run(&self, code: &str) -> ExecutionResult {
        Sandbox::run(self, code).await
    }
}

/// Read at most `limit` bytes, then drain the rest so the writer never blocks
async fn read_bounded<R>(mut reader: R, limit: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    (&mut reader).take(limit).read_to_end(&mut buf).await?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(buf)
}

/// Per-run working directory, removed when dropped
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create() -> std::io::Result<Self> {
        let path = std::env::temp_dir().join(format!("abacus-sandbox-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            debug!("Failed to remove sandbox dir {}: {}", self.path.display(), e);
        }
    }
}
