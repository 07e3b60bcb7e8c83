// raft-core/src/domain/diff/ast.rs

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// One changed line of a unified diff, with the cursor that applies to its
/// side (`old_line` for removals, `new_line` for additions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub file: String,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
    pub content: String,
}

/// Parsed `def` signature: name, ordered argument names, optional return
/// annotation text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub args: Vec<String>,
    pub ret: Option<String>,
}

impl FunctionSignature {
    /// Signature equality ignores the name: argument-name sequence and
    /// return text must match.
    pub fn same_shape(&self, other: &FunctionSignature) -> bool {
        self.args == other.args && self.ret == other.ret
    }
}

/// A paired old/new function across the diff. `old.name == new.name` marks
/// a rename-to-self (same name, changed signature).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePair {
    pub old: FunctionSignature,
    pub new: FunctionSignature,
}

/// Structured view of a unified diff.
#[derive(Debug, Clone, Default)]
pub struct DiffAst {
    pub added: Vec<DiffLine>,
    pub removed: Vec<DiffLine>,
    pub files: BTreeSet<String>,
    rename_pairs: Vec<RenamePair>,
    has_binary: bool,
}

#[allow(clippy::unwrap_used)]
fn file_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^diff --git a/(\S+) b/(\S+)").unwrap())
}

#[allow(clippy::unwrap_used)]
fn hunk_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@@ -(\d+)(?:,\d+)? \+(\d+)(?:,\d+)? @@").unwrap())
}

#[allow(clippy::unwrap_used)]
fn def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?\s*def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)\s*(?:->\s*([^:]+))?:")
            .unwrap()
    })
}

impl DiffAst {
    /// Parse a unified diff. Unknown lines outside hunks are ignored;
    /// cursors advance per line kind inside hunks.
    pub fn parse(diff_text: &str) -> Self {
        let mut ast = DiffAst::default();
        let mut current_file = String::new();
        let mut old_cursor: Option<usize> = None;
        let mut new_cursor: Option<usize> = None;

        for line in diff_text.lines() {
            if let Some(caps) = file_header_re().captures(line) {
                current_file = caps[2].to_string();
                ast.files.insert(current_file.clone());
                old_cursor = None;
                new_cursor = None;
                continue;
            }
            if let Some(caps) = hunk_header_re().captures(line) {
                old_cursor = caps[1].parse().ok();
                new_cursor = caps[2].parse().ok();
                continue;
            }
            if line.starts_with("Binary files") {
                ast.has_binary = true;
                continue;
            }
            if line.starts_with("+++") || line.starts_with("---") || line.starts_with("index ") {
                continue;
            }

            let (Some(old), Some(new)) = (old_cursor, new_cursor) else {
                continue;
            };

            if let Some(content) = line.strip_prefix('+') {
                ast.added.push(DiffLine {
                    file: current_file.clone(),
                    old_line: None,
                    new_line: Some(new),
                    content: content.to_string(),
                });
                new_cursor = Some(new + 1);
            } else if let Some(content) = line.strip_prefix('-') {
                ast.removed.push(DiffLine {
                    file: current_file.clone(),
                    old_line: Some(old),
                    new_line: None,
                    content: content.to_string(),
                });
                old_cursor = Some(old + 1);
            } else {
                old_cursor = Some(old + 1);
                new_cursor = Some(new + 1);
            }
        }

        ast.rename_pairs = pair_functions(
            &signatures_of(&ast.removed),
            &signatures_of(&ast.added),
        );
        ast
    }

    /// Detected renames as an old-name → new-name mapping (rename-to-self
    /// entries map a name onto itself).
    pub fn renames(&self) -> BTreeMap<String, String> {
        self.rename_pairs
            .iter()
            .map(|p| (p.old.name.clone(), p.new.name.clone()))
            .collect()
    }

    pub fn rename_pairs(&self) -> &[RenamePair] {
        &self.rename_pairs
    }

    /// Signature map keyed by side-qualified name (`old:<name>` /
    /// `new:<name>`).
    pub fn signatures(&self) -> BTreeMap<String, FunctionSignature> {
        let mut out = BTreeMap::new();
        for sig in signatures_of(&self.removed) {
            out.insert(format!("old:{}", sig.name), sig);
        }
        for sig in signatures_of(&self.added) {
            out.insert(format!("new:{}", sig.name), sig);
        }
        out
    }

    /// Rename pairs whose argument sequence changed; each one voids the
    /// signature-preservation invariant.
    pub fn signature_violations(&self) -> Vec<&RenamePair> {
        self.rename_pairs
            .iter()
            .filter(|p| p.old.args != p.new.args)
            .collect()
    }

    /// Coarse risk heuristic over the raw diff shape, capped at 1.0.
    pub fn risk_score(&self) -> f64 {
        let mut score = 0.1 * self.files.len() as f64;
        if self.has_binary {
            score += 0.5;
        }
        if !self.removed.is_empty() {
            score += 0.3;
        }
        score.min(1.0)
    }

    pub fn has_binary(&self) -> bool {
        self.has_binary
    }
}

fn signatures_of(lines: &[DiffLine]) -> Vec<FunctionSignature> {
    lines
        .iter()
        .filter_map(|l| parse_signature(&l.content))
        .collect()
}

/// Parse one line as a `def` header, extracting argument *names* (types
/// and defaults stripped).
pub fn parse_signature(line: &str) -> Option<FunctionSignature> {
    let caps = def_re().captures(line)?;
    let args = caps[2]
        .split(',')
        .map(|a| {
            a.trim()
                .split(':')
                .next()
                .unwrap_or("")
                .split('=')
                .next()
                .unwrap_or("")
                .trim()
                .to_string()
        })
        .filter(|a| !a.is_empty())
        .collect();
    let ret = caps.get(3).map(|m| m.as_str().trim().to_string());
    Some(FunctionSignature {
        name: caps[1].to_string(),
        args,
        ret,
    })
}

/// Greedy first-match pairing: each new-side function pairs with at most
/// one old-side function, same-name matches take priority, and a paired
/// old function is never reused.
fn pair_functions(olds: &[FunctionSignature], news: &[FunctionSignature]) -> Vec<RenamePair> {
    let mut used = vec![false; olds.len()];
    let mut pairs = Vec::new();

    for new in news {
        // Same name on both sides: an in-place edit. Changed signature is
        // flagged as a rename-to-self.
        if let Some(i) = olds
            .iter()
            .enumerate()
            .position(|(i, old)| !used[i] && old.name == new.name)
        {
            used[i] = true;
            if !olds[i].same_shape(new) {
                pairs.push(RenamePair {
                    old: olds[i].clone(),
                    new: new.clone(),
                });
            }
            continue;
        }
        // Otherwise: identical shape under a different name is a rename.
        if let Some(i) = olds
            .iter()
            .enumerate()
            .position(|(i, old)| !used[i] && old.same_shape(new) && old.name != new.name)
        {
            used[i] = true;
            pairs.push(RenamePair {
                old: olds[i].clone(),
                new: new.clone(),
            });
        }
    }

    pairs
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const RENAME_DIFF: &str = "\
diff --git a/agent/tools.py b/agent/tools.py
index 1111111..2222222 100644
--- a/agent/tools.py
+++ b/agent/tools.py
@@ -10,7 +10,7 @@
 context line
-def fetch_data(url, retries) -> dict:
+def pull_data(url, retries) -> dict:
     return {}
";

    #[test]
    fn test_cursors_track_hunk_positions() {
        let ast = DiffAst::parse(RENAME_DIFF);
        assert_eq!(ast.files.len(), 1);
        assert!(ast.files.contains("agent/tools.py"));

        assert_eq!(ast.removed.len(), 1);
        assert_eq!(ast.removed[0].old_line, Some(11));
        assert_eq!(ast.removed[0].new_line, None);

        assert_eq!(ast.added.len(), 1);
        assert_eq!(ast.added[0].new_line, Some(11));
        assert_eq!(ast.added[0].old_line, None);
    }

    #[test]
    fn test_detects_rename_with_same_shape() {
        let ast = DiffAst::parse(RENAME_DIFF);
        let renames = ast.renames();
        assert_eq!(renames.get("fetch_data").map(String::as_str), Some("pull_data"));
        // Same argument sequence: not a signature violation.
        assert!(ast.signature_violations().is_empty());
    }

    #[test]
    fn test_rename_to_self_on_changed_signature() {
        let diff = "\
diff --git a/agent/tools.py b/agent/tools.py
--- a/agent/tools.py
+++ b/agent/tools.py
@@ -1,3 +1,3 @@
-def step(a, b):
+def step(a, b, c):
     pass
";
        let ast = DiffAst::parse(diff);
        assert_eq!(ast.renames().get("step").map(String::as_str), Some("step"));
        assert_eq!(ast.signature_violations().len(), 1);
    }

    #[test]
    fn test_greedy_pairing_never_reuses_an_old_function() {
        // Two new functions share the shape of one old function; only the
        // first may pair with it.
        let diff = "\
diff --git a/m.py b/m.py
--- a/m.py
+++ b/m.py
@@ -1,2 +1,3 @@
-def original(x):
+def first(x):
+def second(x):
     pass
";
        let ast = DiffAst::parse(diff);
        let renames = ast.renames();
        assert_eq!(renames.len(), 1);
        assert_eq!(renames.get("original").map(String::as_str), Some("first"));
    }

    #[test]
    fn test_signature_parsing_strips_types_and_defaults() {
        let sig = parse_signature("+def handle(req: Request, limit=10) -> Response:").unwrap();
        assert_eq!(sig.name, "handle");
        assert_eq!(sig.args, vec!["req", "limit"]);
        assert_eq!(sig.ret.as_deref(), Some("Response"));
    }

    #[test]
    fn test_signature_equality_is_args_and_return() {
        let a = parse_signature("def f(x, y) -> int:").unwrap();
        let b = parse_signature("def g(x, y) -> int:").unwrap();
        let c = parse_signature("def h(x, y) -> str:").unwrap();
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
    }

    #[test]
    fn test_empty_diff_yields_empty_ast() {
        let ast = DiffAst::parse("");
        assert!(ast.added.is_empty());
        assert!(ast.removed.is_empty());
        assert!(ast.files.is_empty());
        assert!(ast.renames().is_empty());
        assert_eq!(ast.risk_score(), 0.0);
    }

    #[test]
    fn test_risk_score_caps_at_one() {
        let mut text = String::new();
        for i in 0..20 {
            text.push_str(&format!(
                "diff --git a/f{i}.py b/f{i}.py\n--- a/f{i}.py\n+++ b/f{i}.py\n@@ -1,1 +1,1 @@\n-old\n+new\n"
            ));
        }
        let ast = DiffAst::parse(&text);
        assert_eq!(ast.risk_score(), 1.0);
    }
}
