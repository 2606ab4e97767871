//! Static validation of generated snippets
//!
//! Every snippet passes three ordered gates before it may reach the sandbox.
//! The first failing gate decides the verdict:
//!
//! 1. **Lexical**: regex denylist over the raw text (dunder names, process
//!    termination, shell invocation, imports of denylisted modules)
//! 2. **Parse**: the snippet must produce a tree-sitter Python tree without
//!    ERROR or MISSING nodes
//! 3. **Structural**: a walk over every node rejecting denylisted imports,
//!    calls to denylisted functions, and method calls on denylisted modules
//!
//! This is a denylist, not a taint analysis. The subprocess sandbox is the
//! containment boundary; this gate only keeps obviously hostile snippets out.
//!
//! # Example
//!
//! ```
//! use abacus_engine::code_validator::CodeValidator;
//!
//! let validator = CodeValidator::new();
//! assert!(validator.vet("print(2 + 2)").safe);
//!
//! let verdict = validator.vet("x = eval('1+1')");
//! assert!(!verdict.safe);
//! assert!(verdict.reason().contains("eval"));
//! ```

use regex::Regex;
use sdk::types::{ValidationGate, ValidationVerdict};
use std::collections::HashMap;
use std::sync::OnceLock;
use tree_sitter::{Node, Parser};

/// Modules a snippet may never import or call into
pub const DENYLISTED_MODULES: &[&str] = &[
    "os",
    "subprocess",
    "sys",
    "shutil",
    "socket",
    "requests",
    "urllib",
    "ftplib",
    "paramiko",
    "telnetlib",
    "smtplib",
    "http.server",
    "http.client",
    "socketserver",
    "pathlib",
    "tempfile",
    "glob",
    "ctypes",
    "multiprocessing",
    "importlib",
    "signal",
    "pty",
    "pickle",
    "xmlrpc",
    "asyncio",
];

/// Builtins a snippet may never call directly
pub const DENYLISTED_FUNCTIONS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "globals",
    "locals",
    "vars",
    "getattr",
    "setattr",
    "delattr",
    "__import__",
    "open",
    "file",
    "input",
    "raw_input",
    "breakpoint",
];

struct LexicalRule {
    label: &'static str,
    pattern: Regex,
}

fn lexical_rules() -> &'static [LexicalRule] {
    static RULES: OnceLock<Vec<LexicalRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let modules = DENYLISTED_MODULES
            .iter()
            .map(|m| regex::escape(m))
            .collect::<Vec<_>>()
            .join("|");

        let sources = [
            ("dunder access", r"__[a-zA-Z]+__".to_string()),
            (
                "denylisted import",
                format!(r"(?m)\bimport\s+(?:{})\b", modules),
            ),
            (
                "denylisted import",
                format!(r"(?m)\bfrom\s+(?:{})\b(?:\.\w+)*\s+import\b", modules),
            ),
            (
                "process termination",
                r"\b(?:sys|os)\s*\.\s*_?exit\b".to_string(),
            ),
            (
                "process termination",
                r"(?m)(?:^|[^.\w])((?:exit|quit)\s*\()".to_string(),
            ),
            (
                "shell invocation",
                r"\bos\s*\.\s*(?:system|popen|exec\w*|spawn\w*)".to_string(),
            ),
            (
                "shell invocation",
                r"\bsubprocess\s*\.\s*(?:call|run|Popen|check_call|check_output|getoutput|getstatusoutput)"
                    .to_string(),
            ),
        ];

        sources
            .into_iter()
            .filter_map(|(label, source)| match Regex::new(&source) {
                Ok(pattern) => Some(LexicalRule { label, pattern }),
                Err(e) => {
                    tracing::error!("Invalid validator pattern {}: {}", source, e);
                    None
                }
            })
            .collect()
    })
}

/// Returns the denylisted module a dotted name falls under, if any
///
/// `os.path` falls under `os`; `http.server.HTTPServer` under `http.server`.
pub fn denylisted_module(dotted: &str) -> Option<&'static str> {
    let segments: Vec<&str> = dotted.split('.').map(str::trim).collect();
    (1..=segments.len()).find_map(|n| {
        let prefix = segments[..n].join(".");
        DENYLISTED_MODULES.iter().copied().find(|m| *m == prefix)
    })
}

/// Three-gate static validator for Python snippets
///
/// The validator is stateless: `vet` is a pure function of its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeValidator;

impl CodeValidator {
    pub fn new() -> Self {
        Self
    }

    /// Run all three gates over `code`
    pub fn vet(&self, code: &str) -> ValidationVerdict {
        if let Some(reason) = self.lexical_gate(code) {
            tracing::warn!(gate = "lexical", "Snippet rejected: {}", reason);
            return ValidationVerdict::rejected(ValidationGate::Lexical, reason);
        }

        let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&language) {
            return ValidationVerdict::rejected(
                ValidationGate::Parse,
                format!("Python grammar unavailable: {}", e),
            );
        }

        let Some(tree) = parser.parse(code, None) else {
            return ValidationVerdict::rejected(
                ValidationGate::Parse,
                "Syntax error: the snippet could not be parsed",
            );
        };
        let root = tree.root_node();

        if let Some(reason) = syntax_error(root, code) {
            tracing::warn!(gate = "parse", "Snippet rejected: {}", reason);
            return ValidationVerdict::rejected(ValidationGate::Parse, reason);
        }

        if let Some(reason) = structural_violation(root, code) {
            tracing::warn!(gate = "structural", "Snippet rejected: {}", reason);
            return ValidationVerdict::rejected(ValidationGate::Structural, reason);
        }

        ValidationVerdict::safe()
    }

    fn lexical_gate(&self, code: &str) -> Option<String> {
        lexical_rules().iter().find_map(|rule| {
            let caps = rule.pattern.captures(code)?;
            // Group 1 marks the offending text when the rule needs leading context
            let matched = caps.get(1).or_else(|| caps.get(0))?;
            Some(format!(
                "Dangerous code pattern detected ({}): `{}`",
                rule.label,
                matched.as_str().trim()
            ))
        })
    }
}

/// Free-function form of [`CodeValidator::vet`]
pub fn vet(code: &str) -> ValidationVerdict {
    CodeValidator::new().vet(code)
}

fn node_text<'a>(node: Node, code: &'a str) -> &'a str {
    code.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Pre-order list of every node in the tree
fn descendants(root: Node) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        nodes.push(node);
        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }
    nodes
}

fn syntax_error(root: Node, code: &str) -> Option<String> {
    if !root.has_error() {
        return None;
    }

    let offending = descendants(root)
        .into_iter()
        .find(|n| n.is_error() || n.is_missing());

    match offending {
        Some(node) => {
            let pos = node.start_position();
            let detail = if node.is_missing() {
                format!("missing `{}`", node.kind())
            } else {
                let text = node_text(node, code);
                let snippet: String = text.lines().next().unwrap_or("").chars().take(40).collect();
                format!("unexpected `{}`", snippet.trim())
            };
            Some(format!(
                "Syntax error at line {}, column {}: {}",
                pos.row + 1,
                pos.column + 1,
                detail
            ))
        }
        None => Some("Syntax error: the snippet could not be parsed".to_string()),
    }
}

/// Names bound by `import X as Y`, mapped to the module they alias
fn import_aliases(nodes: &[Node], code: &str) -> HashMap<String, String> {
    let mut aliases = HashMap::new();
    for node in nodes.iter().filter(|n| n.kind() == "aliased_import") {
        if let (Some(name), Some(alias)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("alias"),
        ) {
            aliases.insert(
                node_text(alias, code).to_string(),
                node_text(name, code).to_string(),
            );
        }
    }
    aliases
}

/// Leftmost identifier chain of an attribute object (`os.path` for `os.path.join`)
fn dotted_object(node: Node, code: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, code).to_string()),
        "attribute" => {
            let object = node.child_by_field_name("object")?;
            let attribute = node.child_by_field_name("attribute")?;
            let prefix = dotted_object(object, code)?;
            Some(format!("{}.{}", prefix, node_text(attribute, code)))
        }
        _ => None,
    }
}

fn imported_names<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name("name", &mut cursor)
        .map(|child| {
            if child.kind() == "aliased_import" {
                child.child_by_field_name("name").unwrap_or(child)
            } else {
                child
            }
        })
        .collect()
}

fn structural_violation(root: Node, code: &str) -> Option<String> {
    let nodes = descendants(root);
    let aliases = import_aliases(&nodes, code);

    for node in &nodes {
        match node.kind() {
            "import_statement" => {
                for name in imported_names(*node) {
                    let module = node_text(name, code);
                    if denylisted_module(module).is_some() {
                        return Some(format!("Import not allowed: {}", module));
                    }
                }
            }
            "import_from_statement" => {
                if let Some(module_node) = node.child_by_field_name("module_name") {
                    let module = node_text(module_node, code);
                    if denylisted_module(module).is_some() {
                        return Some(format!("Import from denylisted module not allowed: {}", module));
                    }
                }
            }
            "call" => {
                let Some(function) = node.child_by_field_name("function") else {
                    continue;
                };
                match function.kind() {
                    "identifier" => {
                        let name = node_text(function, code);
                        if DENYLISTED_FUNCTIONS.contains(&name) {
                            return Some(format!("Function not allowed: {}", name));
                        }
                    }
                    "attribute" => {
                        let (Some(object), Some(attribute)) = (
                            function.child_by_field_name("object"),
                            function.child_by_field_name("attribute"),
                        ) else {
                            continue;
                        };
                        let Some(dotted) = dotted_object(object, code) else {
                            continue;
                        };
                        let method = node_text(attribute, code);

                        if denylisted_module(&dotted).is_some() {
                            return Some(format!("Module not allowed: {}.{}", dotted, method));
                        }

                        let head = dotted.split('.').next().unwrap_or("");
                        if let Some(target) = aliases.get(head) {
                            if let Some(module) = denylisted_module(target) {
                                return Some(format!(
                                    "Module not allowed: {}.{} ({} is an alias of {})",
                                    dotted, method, head, module
                                ));
                            }
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    None
}
