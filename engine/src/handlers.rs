//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - ask: Answer one query
//! - chat: Interactive conversation
//! - ingest: Add files to the knowledge base
//! - vet / exec: Validate and run a snippet
//! - doctor: Validate configuration and check dependencies

use anyhow::{Context, Result};
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use sdk::errors::AbacusErrorExt;
use sdk::types::RawDocument;

use crate::code_validator::CodeValidator;
use crate::config::Config;
use crate::llm::build_provider;
use crate::orchestrator::QueryOrchestrator;
use crate::sandbox::Sandbox;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

async fn orchestrator(config: &Config) -> Result<QueryOrchestrator> {
    QueryOrchestrator::from_config(config)
        .await
        .map_err(|e| anyhow::anyhow!("{}\nHint: {}", e, e.user_hint()))
        .context("Failed to start the assistant")
}

/// Read a snippet from a file, or from stdin when `source` is "-"
fn read_snippet(source: &str) -> Result<String> {
    if source == "-" {
        let mut code = String::new();
        std::io::stdin()
            .read_to_string(&mut code)
            .context("Failed to read snippet from stdin")?;
        Ok(code)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read snippet {}", source))
    }
}

/// Serve the HTTP interface until Ctrl-C
pub async fn handle_serve(config: &Config) -> Result<()> {
    let orchestrator = Arc::new(orchestrator(config).await?);
    crate::server::serve(orchestrator, &config.server)
        .await
        .context("HTTP interface failed")
}

/// Answer one query
pub async fn handle_ask(query: String, session: String, config: &Config, format: OutputFormat) -> Result<()> {
    let orchestrator = orchestrator(config).await?;
    let answer = orchestrator.process_query(&session, &query).await;

    match format {
        OutputFormat::Text => println!("{}", answer),
        OutputFormat::Json => {
            let output = json!({ "session": session, "query": query, "answer": answer });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Interactive conversation on stdin/stdout
///
/// `/clear` empties the conversation, `/regen` answers the last query again
/// and `/quit` leaves.
pub async fn handle_chat(session: String, config: &Config) -> Result<()> {
    let orchestrator = orchestrator(config).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Abacus chat (session '{}'). Commands: /clear, /regen, /quit", session);

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                orchestrator.clear(&session).await;
                println!("Conversation cleared.");
            }
            "/regen" => match orchestrator.last_user_message(&session).await {
                Some(previous) => {
                    let answer = orchestrator.regenerate(&session, &previous).await;
                    println!("{}\n", answer);
                }
                None => println!("Nothing to regenerate yet."),
            },
            query => {
                let answer = orchestrator.process_query(&session, query).await;
                println!("{}\n", answer);
            }
        }
    }

    Ok(())
}

/// Add files to the knowledge base
pub async fn handle_ingest(files: Vec<PathBuf>, config: &Config, format: OutputFormat) -> Result<()> {
    let mut documents = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        documents.push(RawDocument::new(name, bytes));
    }

    if !config.documents.persistence {
        tracing::warn!("Vector store persistence is disabled; ingested documents will not be kept");
    }

    let orchestrator = orchestrator(config).await?;
    let report = orchestrator.ingest(documents).await;

    match format {
        OutputFormat::Text => println!("{}", report.message()),
        OutputFormat::Json => {
            let output = json!({
                "success_count": report.success_count,
                "failure_count": report.failure_count,
                "chunk_count": report.chunk_count,
                "message": report.message(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Print the validator verdict; returns whether the snippet is safe
pub fn handle_vet(source: &str, format: OutputFormat) -> Result<bool> {
    let code = read_snippet(source)?;
    let verdict = CodeValidator::new().vet(&code);

    match format {
        OutputFormat::Text => {
            if verdict.safe {
                println!("✓ Safe");
            } else {
                let gate = verdict
                    .gate
                    .map(|g| format!("{:?}", g).to_lowercase())
                    .unwrap_or_default();
                println!("✗ Rejected by {} gate: {}", gate, verdict.reason());
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&verdict)?),
    }
    Ok(verdict.safe)
}

/// Vet a snippet and run it when safe; returns whether it ran successfully
pub async fn handle_exec(source: &str, config: &Config, format: OutputFormat) -> Result<bool> {
    let code = read_snippet(source)?;
    let verdict = CodeValidator::new().vet(&code);
    if !verdict.safe {
        match format {
            OutputFormat::Text => println!("✗ Not executed: {}", verdict.reason()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&verdict)?),
        }
        return Ok(false);
    }

    let result = Sandbox::new(&config.sandbox).run(&code).await;

    match format {
        OutputFormat::Text => {
            println!("Status: {} ({} ms)", result.status, result.duration_ms);
            if !result.stdout.is_empty() {
                println!("\nOutput:\n{}", result.stdout.trim_end());
            }
            if let Some(error) = &result.error {
                println!("\nError: {}", error);
            }
            if let Some(trace) = &result.trace {
                println!("\n{}", trace.trim_end());
            }
            if !result.variables.is_empty() {
                println!("\nVariables:");
                for (name, value) in &result.variables {
                    println!("  {} = {}", name, value);
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(result.is_success())
}

/// Validate configuration and check dependencies
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(&str, String)> = Vec::new();

    // Check 1: Configuration (already validated when loaded)
    checks.push(("Configuration", "Valid".to_string()));
    checks.push(("LLM provider", config.llm.provider.clone()));

    // Check 2: Credentials
    match config.api_key() {
        Ok(Some(_)) => checks.push(("API key", "Configured".to_string())),
        Ok(None) => checks.push(("API key", "Not required".to_string())),
        Err(e) => {
            checks.push(("API key", "Missing".to_string()));
            issues.push(e.to_string());
        }
    }

    // Check 3: Provider reachability (Ollama only; OpenAI needs a paid call)
    if config.llm.provider == "ollama" {
        match build_provider(config, &config.llm.model) {
            Ok(provider) => {
                if provider.check_health().await {
                    checks.push(("Ollama", "Available".to_string()));
                } else {
                    checks.push(("Ollama", "Not available".to_string()));
                    issues.push(format!(
                        "Ollama is not reachable at {}. Start Ollama to use local models.",
                        config.llm.ollama_base_url
                    ));
                }
            }
            Err(e) => {
                checks.push(("Ollama", "Error".to_string()));
                issues.push(e.to_string());
            }
        }
    }

    // Check 4: Python interpreter for the sandbox
    if Sandbox::new(&config.sandbox).python_available().await {
        checks.push(("Python interpreter", "Available".to_string()));
    } else {
        checks.push(("Python interpreter", "Not found".to_string()));
        issues.push(format!(
            "'{}' could not be started. Computational questions will fail.",
            config.sandbox.python
        ));
    }

    // Check 5: Document index
    if !config.documents.persistence {
        checks.push(("Document index", "Persistence disabled".to_string()));
    } else if config.index_path().exists() {
        checks.push(("Document index", "Exists".to_string()));
    } else {
        checks.push(("Document index", "Empty".to_string()));
    }

    // Output results
    match format {
        OutputFormat::Text => {
            println!("Abacus System Diagnostics");
            println!("============================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
