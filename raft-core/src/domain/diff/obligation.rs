// raft-core/src/domain/diff/obligation.rs

// The safety obligation is the *negation* of the safety property: it
// asserts that a violation exists. UNSAT therefore means "no violation can
// be constructed" and the proof gate passes. That polarity is pinned here,
// once, and nowhere else.

use crate::domain::charter::Charter;
use crate::domain::diff::ast::DiffAst;
use crate::domain::error::DomainError;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// Obligation emitted when the diff is clean: unsatisfiable, so the
/// verifier reports `Passed`.
pub const OBLIGATION_SAFE: &str = "(assert false)";
/// Obligation emitted when a violation was found: trivially satisfiable,
/// so the verifier reports `Failed`.
pub const OBLIGATION_VIOLATION: &str = "(assert true)";

/// Built-in forbidden patterns: dangerous runtime introspection, shell
/// invocation, dynamic evaluation and wildcard imports.
const BUILTIN_FORBIDDEN: &[&str] = &[
    r"\bsubprocess\b",
    r"\bos\.system\b",
    r"\beval\b",
    r"\bexec\b",
    r"\bimport\s+\*",
    r"\b__import__\b",
    r"\bglobals\b",
    r"\blocals\b",
];

/// Charter clauses carrying any of these markers contribute patterns.
const POLICY_KEYWORDS: &[&str] = &["forbidden", "dangerous", "no ", "block"];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationDetail {
    /// An added line matched a forbidden pattern.
    ForbiddenPattern {
        pattern: String,
        file: String,
        line: Option<usize>,
        content: String,
    },
    /// A paired function changed its argument sequence.
    SignatureChange { old: String, new: String },
}

/// The SMT obligation plus the concrete findings behind it, for event
/// payloads and operator visibility.
#[derive(Debug, Clone)]
pub struct Obligation {
    pub smt: String,
    pub violations: Vec<ViolationDetail>,
}

impl Obligation {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

struct CompiledForbidden {
    source: String,
    regex: Regex,
}

/// Compiles the forbidden-pattern list once per charter (the charter is
/// immutable for the life of the process, so construct-once covers the
/// sorted-clause-set cache keying) and turns parsed diffs into obligations.
pub struct ObligationBuilder {
    patterns: Vec<CompiledForbidden>,
}

impl ObligationBuilder {
    pub fn new(charter: &Charter) -> Result<Self, DomainError> {
        let mut sources: Vec<String> =
            BUILTIN_FORBIDDEN.iter().map(|p| p.to_string()).collect();
        sources.extend(charter_patterns(charter));

        // Dedupe, preserving first-seen order.
        let mut seen = HashSet::new();
        sources.retain(|p| seen.insert(p.clone()));

        let mut patterns = Vec::with_capacity(sources.len());
        for source in sources {
            let regex = Regex::new(&source)
                .map_err(|e| DomainError::Pattern(format!("cannot compile '{source}': {e}")))?;
            patterns.push(CompiledForbidden { source, regex });
        }
        Ok(Self { patterns })
    }

    /// Scan the structured diff and emit the safety obligation.
    pub fn build(&self, diff: &DiffAst) -> Obligation {
        let mut violations = Vec::new();

        for line in &diff.added {
            for pattern in &self.patterns {
                if pattern.regex.is_match(&line.content) {
                    warn!(pattern = %pattern.source, file = %line.file, "forbidden pattern in added line");
                    violations.push(ViolationDetail::ForbiddenPattern {
                        pattern: pattern.source.clone(),
                        file: line.file.clone(),
                        line: line.new_line,
                        content: line.content.clone(),
                    });
                }
            }
        }

        for pair in diff.signature_violations() {
            warn!(old = %pair.old.name, new = %pair.new.name, "argument sequence changed across rename");
            violations.push(ViolationDetail::SignatureChange {
                old: pair.old.name.clone(),
                new: pair.new.name.clone(),
            });
        }

        let smt = if violations.is_empty() {
            OBLIGATION_SAFE
        } else {
            OBLIGATION_VIOLATION
        };
        Obligation {
            smt: smt.to_string(),
            violations,
        }
    }

    /// Parse raw diff text and build its obligation in one step.
    pub fn build_from_text(&self, diff_text: &str) -> Obligation {
        self.build(&DiffAst::parse(diff_text))
    }

    #[cfg(test)]
    fn pattern_sources(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.source.as_str()).collect()
    }
}

/// Extract word-bounded patterns from backticked tokens of policy-bearing
/// clauses.
fn charter_patterns(charter: &Charter) -> Vec<String> {
    let mut out = Vec::new();
    for clause in charter.clauses() {
        let lowered = clause.text.to_lowercase();
        if !POLICY_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            continue;
        }
        for token in backticked_tokens(&clause.text) {
            out.push(format!(r"\b{}\b", regex::escape(&token)));
        }
    }
    out
}

fn backticked_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut parts = text.split('`');
    // Alternating segments: outside, inside, outside, ...
    parts.next();
    while let (Some(inside), rest) = (parts.next(), parts.next()) {
        if !inside.is_empty() {
            tokens.push(inside.to_string());
        }
        if rest.is_none() {
            break;
        }
    }
    tokens
}
