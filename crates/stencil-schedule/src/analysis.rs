//! Lexical dependency analysis of template blocks.
//!
//! Each block is analyzed on its own, from its text alone, with regular
//! expressions rather than a parse. The result over-approximates: anything
//! not recognized as a write is a read, and unknown host functions are never
//! barriers.

use std::sync::{Arc, LazyLock};

use indexmap::IndexSet;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use stencil_foundation::{FunctionRegistry, HOST_NAMESPACE, RESULT_ACCUMULATOR};
use tracing::trace;

use crate::block::TemplateBlock;

const IDENT: &str = r"[A-Za-z_$][\w$]*";

const KEYWORDS: &[&str] = &[
    "let", "const", "var", "function", "return", "if", "else", "for", "of", "in", "while", "do",
    "break", "continue", "try", "catch", "finally", "throw", "new", "typeof", "instanceof",
    "await", "async", "true", "false", "null", "undefined", "this", "void", "delete", "yield",
    "class", "switch", "case", "default",
];

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("invariant: analyzer patterns are valid regexes")
}

/// String literals and comments. Template literals are matched whole so
/// their `${...}` parts can be kept.
static LITERALS: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r#"//[^\n]*|/\*(?s:.*?)\*/|"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'|`(?:[^`\\]|\\.)*`"#)
});
static INTERPOLATION: LazyLock<Regex> = LazyLock::new(|| pattern(r"\$\{([^}]*)\}"));

/// Identifier not preceded by `.` (property names are not variables).
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| pattern(&format!(r"(?:^|[^\w$.])({IDENT})")));
static DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| pattern(&format!(r"\b(?:let|const|var)\s+({IDENT})")));
static FUNCTION_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| pattern(&format!(r"\bfunction\s+({IDENT})")));
/// `name = ...` and compound forms, excluding `==` and `=>`.
static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    pattern(&format!(
        r"(?:^|[^\w$.])({IDENT})\s*(?:\+|-|\*\*|\*|/|%|&&|\|\||\?\?|&|\||\^|<<|>>>|>>)?=(?:[^=>]|$)"
    ))
});
static UPDATE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(&format!(
        r"(?:\+\+|--)\s*({IDENT})|(?:^|[^\w$.])({IDENT})\s*(?:\+\+|--)"
    ))
});
static HOST_CALL: LazyLock<Regex> = LazyLock::new(|| {
    pattern(&format!(
        r"\b{HOST_NAMESPACE}\s*\.\s*({IDENT})\s*\.\s*({IDENT})\s*\("
    ))
});
static RESULT_WRITE: LazyLock<Regex> =
    LazyLock::new(|| pattern(&format!(r"\b{RESULT_ACCUMULATOR}\s*\+?=(?:[^=]|$)")));

/// Read/write footprint of one block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAnalysis {
    pub block_id: usize,
    pub variables_read: IndexSet<String>,
    pub variables_written: IndexSet<String>,
    /// Calls a host function that must not overlap later blocks.
    pub is_barrier: bool,
    /// Assigns or appends to `tR`.
    pub has_tr_write: bool,
    /// `module.function` of every host call, for diagnostics.
    pub host_calls: IndexSet<String>,
}

impl BlockAnalysis {
    pub fn new(block_id: usize) -> Self {
        Self {
            block_id,
            ..Self::default()
        }
    }

    pub fn with_reads(mut self, names: &[&str]) -> Self {
        self.variables_read.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_writes(mut self, names: &[&str]) -> Self {
        self.variables_written.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_tr_write(mut self) -> Self {
        self.has_tr_write = true;
        self
    }

    pub fn as_barrier(mut self) -> Self {
        self.is_barrier = true;
        self
    }

    pub fn reads_tr(&self) -> bool {
        self.variables_read.contains(RESULT_ACCUMULATOR)
    }

    /// Whether this block must not run before or alongside `other`.
    ///
    /// Not symmetric: `other` being a barrier counts, this block being one
    /// does not.
    pub fn depends_on(&self, other: &BlockAnalysis) -> bool {
        other.is_barrier
            || self
                .variables_read
                .iter()
                .any(|name| other.variables_written.contains(name))
            || (self.reads_tr() && other.has_tr_write)
            || self
                .variables_written
                .iter()
                .any(|name| other.variables_written.contains(name))
            || (self.has_tr_write && other.has_tr_write)
    }
}

/// Computes [`BlockAnalysis`] values against a host function registry.
#[derive(Clone)]
pub struct DependencyAnalyzer {
    registry: Arc<dyn FunctionRegistry>,
}

impl std::fmt::Debug for DependencyAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyAnalyzer").finish_non_exhaustive()
    }
}

impl DependencyAnalyzer {
    pub fn new(registry: Arc<dyn FunctionRegistry>) -> Self {
        Self { registry }
    }

    pub fn analyze_all(&self, blocks: &[TemplateBlock]) -> Vec<BlockAnalysis> {
        blocks.iter().map(|block| self.analyze(block)).collect()
    }

    pub fn analyze(&self, block: &TemplateBlock) -> BlockAnalysis {
        let code = strip_literals(&block.command);
        let mut analysis = BlockAnalysis::new(block.id);

        for regex in [&*DECLARATION, &*FUNCTION_DECLARATION, &*ASSIGNMENT, &*UPDATE] {
            for name in regex.captures_iter(&code).filter_map(|caps| first_group(&caps)) {
                if is_variable(name) && name != RESULT_ACCUMULATOR {
                    analysis.variables_written.insert(name.to_string());
                }
            }
        }

        analysis.has_tr_write = block.is_execution
            && code.contains(RESULT_ACCUMULATOR)
            && RESULT_WRITE.is_match(&code);

        for caps in IDENTIFIER.captures_iter(&code) {
            let Some(name) = first_group(&caps) else { continue };
            let written = analysis.variables_written.contains(name)
                || (name == RESULT_ACCUMULATOR && analysis.has_tr_write);
            if is_variable(name) && !written {
                analysis.variables_read.insert(name.to_string());
            }
        }

        for caps in HOST_CALL.captures_iter(&code) {
            let (Some(module), Some(function)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let (module, function) = (module.as_str(), function.as_str());
            if self
                .registry
                .flags(module, function)
                .is_some_and(|flags| flags.is_blocking())
            {
                analysis.is_barrier = true;
            }
            analysis.host_calls.insert(format!("{module}.{function}"));
        }

        trace!(
            block = block.id,
            reads = analysis.variables_read.len(),
            writes = analysis.variables_written.len(),
            barrier = analysis.is_barrier,
            tr_write = analysis.has_tr_write,
            "analyzed block"
        );
        analysis
    }
}

fn first_group<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    caps.iter().skip(1).flatten().next().map(|m| m.as_str())
}

fn is_variable(name: &str) -> bool {
    name != HOST_NAMESPACE && !KEYWORDS.contains(&name)
}

/// Blank out string contents and comments, keeping the expressions inside
/// template literal interpolations.
fn strip_literals(command: &str) -> String {
    LITERALS
        .replace_all(command, |caps: &Captures<'_>| {
            let literal = &caps[0];
            if literal.starts_with('`') {
                let parts: Vec<&str> = INTERPOLATION
                    .captures_iter(literal)
                    .filter_map(|c| c.get(1).map(|m| m.as_str()))
                    .collect();
                format!(" {} ", parts.join(" ; "))
            } else {
                " ".to_string()
            }
        })
        .into_owned()
}
