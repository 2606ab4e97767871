//! Code generation and result explanation
//!
//! Two stateless model calls wrap the sandbox: [`CodeGenerator`] turns a query
//! into a snippet, [`ResultExplainer`] turns an [`ExecutionResult`] back into
//! prose. Both fall back to deterministic text when the model call fails, so a
//! turn always produces an answer.

use std::sync::Arc;
use tracing::{debug, error};

use sdk::types::ExecutionResult;

use crate::llm::LLMProvider;

/// Snippet returned when the model cannot produce one. Always passes the validator.
pub const FALLBACK_SNIPPET: &str = "print(\"Could not generate code for this request.\")";

/// Extract the body of the first markdown code fence in the text.
///
/// The language tag line after the opening fence is skipped. A fence opened
/// and closed on one line (`` ```python print(1)``` ``) keeps everything after
/// an optional `python` tag. An unterminated fence yields the rest of the text.
/// Returns `None` if there is no fence.
pub fn extract_fenced_block(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "python\n")
    let body = match after_opening.find('\n') {
        Some(newline) => &after_opening[newline + 1..],
        None => strip_language_tag(after_opening),
    };

    match body.find("```") {
        Some(closing) => Some(&body[..closing]),
        None => Some(body),
    }
}

fn strip_language_tag(inline: &str) -> &str {
    let trimmed = inline.trim_start();
    for tag in ["python3", "python", "py"] {
        if let Some(rest) = trimmed.strip_prefix(tag) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) || rest.starts_with("```") {
                return rest;
            }
        }
    }
    trimmed
}

/// Turn a raw model response into snippet source
pub fn clean_code_response(response: &str) -> String {
    extract_fenced_block(response)
        .unwrap_or(response)
        .trim()
        .to_string()
}

/// Writes Python snippets for computational queries
pub struct CodeGenerator {
    llm: Arc<dyn LLMProvider>,
}

impl CodeGenerator {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }

    fn prompt(query: &str) -> String {
        format!(
            "The user asked a question that needs an exact calculation or code execution:\n\n\
             \"{query}\"\n\n\
             Write ONLY Python code that answers it. The code must:\n\
             1. Be short, clear and correct\n\
             2. Print every result with print() so it is visible\n\
             3. Use only the standard library (math, statistics, datetime, decimal, fractions, \
             itertools, collections, re) or numpy/pandas when really needed\n\
             4. Not read files, use the network, or start processes\n\n\
             Do NOT explain the code and do NOT use markdown fences. Reply with the Python code only."
        )
    }

    /// Generate a snippet for `query`, or the fallback snippet on failure
    pub async fn generate(&self, query: &str) -> String {
        match self.llm.invoke(&Self::prompt(query)).await {
            Ok(response) => {
                let code = clean_code_response(&response);
                debug!(chars = code.len(), "Snippet generated");
                if code.is_empty() {
                    FALLBACK_SNIPPET.to_string()
                } else {
                    code
                }
            }
            Err(e) => {
                error!("Code generation failed: {}", e);
                FALLBACK_SNIPPET.to_string()
            }
        }
    }
}

/// Explains sandbox results in natural language
pub struct ResultExplainer {
    llm: Arc<dyn LLMProvider>,
}

impl ResultExplainer {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }

    fn prompt(query: &str, code: &str, result: &ExecutionResult) -> String {
        let variables = result
            .variables
            .iter()
            .map(|(name, value)| format!("{} = {}", name, value))
            .collect::<Vec<_>>()
            .join("\n");

        let outcome = if result.is_success() {
            "ran successfully"
        } else {
            "failed"
        };

        let mut prompt = format!(
            "The user asked: \"{query}\"\n\n\
             To answer precisely, this Python code was generated and run:\n\n\
             ```python\n{code}\n```\n\n\
             The code {outcome} (status: {status}).\n\n\
             STANDARD OUTPUT:\n{stdout}\n",
            status = result.status,
            stdout = result.stdout,
        );

        let error = result.error.as_deref().unwrap_or("");
        if !result.stderr.is_empty() || !error.is_empty() {
            prompt.push_str(&format!("\nERRORS:\n{}\n{}\n", result.stderr, error));
        }
        if !variables.is_empty() {
            prompt.push_str(&format!("\nFINAL VARIABLES:\n{}\n", variables));
        }

        prompt.push_str(
            "\nExplain the result to the user clearly and concisely, relating it to the \
             original question. Answer the question directly, explain what the result means \
             (not the code), include the relevant numbers, and do not describe how the code \
             was produced unless it matters. If there were errors, explain the problem simply \
             and offer an alternative answer if you can.",
        );
        prompt
    }

    /// Deterministic answer used when the model is unavailable
    pub fn fallback(result: &ExecutionResult) -> String {
        if result.is_success() {
            format!(
                "I ran the calculation you asked for. Here is the result:\n\n{}\n\nLet me know if you need more detail.",
                result.stdout.trim_end()
            )
        } else {
            format!(
                "I tried to run the calculation but hit a technical problem.\n\nError: {}\n\nCould you rephrase your question or add more detail so I can help?",
                result.error.as_deref().unwrap_or("unknown error")
            )
        }
    }

    /// Explain `result`, or use the fallback template on failure
    pub async fn explain(&self, query: &str, code: &str, result: &ExecutionResult) -> String {
        match self.llm.invoke(&Self::prompt(query, code, result)).await {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => Self::fallback(result),
            Err(e) => {
                error!("Result explanation failed: {}", e);
                Self::fallback(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_python_fence() {
        let response = "Here you go:\n```python\nprint(2 + 2)\n```\nDone.";
        assert_eq!(extract_fenced_block(response), Some("print(2 + 2)\n"));
        assert_eq!(clean_code_response(response), "print(2 + 2)");
    }

    #[test]
    fn test_extract_bare_fence_takes_first_block() {
        let response = "```\nx = 1\n```\n```\ny = 2\n```";
        assert_eq!(clean_code_response(response), "x = 1");
    }

    #[test]
    fn test_unterminated_fence_takes_rest() {
        assert_eq!(clean_code_response("```python\nprint(1)\n"), "print(1)");
    }

    #[test]
    fn test_single_line_fence() {
        assert_eq!(clean_code_response("```python print(2+2)```"), "print(2+2)");
        assert_eq!(clean_code_response("```print(7 * 6)```"), "print(7 * 6)");
        assert_eq!(clean_code_response("Sure: ```py x = 3``` done"), "x = 3");
        // A bare identifier that merely starts with the tag is code
        assert_eq!(clean_code_response("```pythonic = 1```"), "pythonic = 1");
        assert!(crate::code_validator::vet(&clean_code_response("```python print(2+2)```")).safe);
    }

    #[test]
    fn test_raw_code_passes_through() {
        assert_eq!(clean_code_response("  print(3)\n"), "print(3)");
        assert_eq!(extract_fenced_block("print(3)"), None);
    }

    #[test]
    fn test_fallback_snippet_is_safe() {
        assert!(crate::code_validator::vet(FALLBACK_SNIPPET).safe);
    }

    #[test]
    fn test_fallback_templates() {
        let mut ok = ExecutionResult::failure("x", "");
        ok.status = sdk::types::ExecutionStatus::Success;
        ok.error = None;
        ok.stdout = "1035\n".to_string();
        let text = ResultExplainer::fallback(&ok);
        assert!(text.starts_with("I ran the calculation"));
        assert!(text.contains("1035"));

        let failed = ExecutionResult::failure("ZeroDivisionError: division by zero", "");
        let text = ResultExplainer::fallback(&failed);
        assert!(text.starts_with("I tried to run the calculation"));
        assert!(text.contains("ZeroDivisionError"));
    }

    #[test]
    fn test_explainer_prompt_includes_result() {
        let mut result = ExecutionResult::failure("NameError: name 'z' is not defined", "warn");
        result.variables.insert("x".to_string(), "5".to_string());
        let prompt = ResultExplainer::prompt("what is z?", "print(z)", &result);
        assert!(prompt.contains("what is z?"));
        assert!(prompt.contains("print(z)"));
        assert!(prompt.contains("NameError"));
        assert!(prompt.contains("x = 5"));
    }
}
