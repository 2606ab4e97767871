//! Query routing
//!
//! Decides whether a query should be answered by generating and running a
//! snippet or by searching the uploaded documents. The decision is a pure
//! function of the query text: it lower-cases the query and returns true as
//! soon as one lexical trigger or one arithmetic/statistical pattern matches.
//!
//! The heuristic over-triggers on purpose. A false positive costs one sandbox
//! run; a false negative still gets an answer from the document path.
//!
//! # Example
//!
//! ```
//! use abacus_engine::query_router::{needs_computation, Route};
//!
//! assert!(needs_computation("calcula 23*45"));
//! assert!(!needs_computation("¿qué dice el documento sobre X?"));
//! assert_eq!(Route::for_query("what is the median of 3, 9, 4?"), Route::Computation);
//! ```

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Terms that signal a request for exact computation
const LEXICAL_TRIGGERS: &[&str] = &[
    // Spanish
    "calcula",
    "calcular",
    "calcule",
    "resultado exacto",
    "precisión numérica",
    "computa",
    "computar",
    "cómputo",
    "ejecuta",
    "ejecutar",
    "código",
    "algoritmo",
    "exactitud",
    "decimal",
    "número exacto",
    "estadística",
    "matemáticas",
    "fórmula",
    "ecuación",
    // English
    "calculate",
    "compute",
    "computation",
    "execute",
    "precision",
    "exact result",
    "statistics",
    "statistical",
    "formula",
    "equation",
    "algorithm",
    "mathematics",
    // The scripting language itself
    "python",
];

/// Patterns that signal arithmetic or statistical intent
const INTENT_PATTERNS: &[&str] = &[
    // Infix arithmetic between two numbers
    r"\d+\s*[+\-*/^]\s*\d+",
    // Percentage token
    r"\d+\s*%",
    r"raíz cuadrada|square root|\bsqrt\b",
    r"logaritmo|logarithm",
    r"factorial",
    r"\b(?:media|mediana|moda|promedio|mean|median|mode|average)\b",
    r"desviación estándar|standard deviation",
    r"probabilidad|probability",
];

fn intent_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        INTENT_PATTERNS
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::error!("Invalid routing pattern {}: {}", p, e);
                    None
                }
            })
            .collect()
    })
}

/// Path a query takes through the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Generate, vet, run and explain a snippet
    Computation,
    /// Answer from document passages and conversation context
    Retrieval,
}

impl Route {
    pub fn for_query(query: &str) -> Self {
        if needs_computation(query) {
            Route::Computation
        } else {
            Route::Retrieval
        }
    }
}

/// Returns true when the query should go through the sandbox
pub fn needs_computation(query: &str) -> bool {
    let lowered = query.to_lowercase();

    if let Some(trigger) = LEXICAL_TRIGGERS.iter().find(|t| lowered.contains(*t)) {
        tracing::debug!(trigger = %trigger, "Query routed to computation by keyword");
        return true;
    }

    if let Some(pattern) = intent_patterns().iter().find(|re| re.is_match(&lowered)) {
        tracing::debug!(pattern = %pattern.as_str(), "Query routed to computation by pattern");
        return true;
    }

    false
}
