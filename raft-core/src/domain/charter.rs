// raft-core/src/domain/charter.rs

use crate::domain::error::DomainError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::info;

/// One policy clause: opaque identifier plus human-readable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub id: String,
    pub text: String,
}

/// Immutable charter loaded once at process start.
///
/// The content hash salts every proof-cache key, so a policy change
/// invalidates all cached verdicts without any explicit flush.
#[derive(Debug, Clone)]
pub struct Charter {
    clauses: Vec<Clause>,
    hash: String,
}

impl Charter {
    /// Load and parse the charter file. Failure here is fatal by contract:
    /// the process must not run without its policy document.
    pub fn load(path: &Path) -> Result<Self, DomainError> {
        let bytes = fs::read(path).map_err(|e| {
            DomainError::CharterParse(format!("cannot read {}: {}", path.display(), e))
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let charter = Self::parse(&text, &bytes)?;
        info!(
            clauses = charter.clauses.len(),
            hash = %&charter.hash[..8],
            "Charter loaded"
        );
        Ok(charter)
    }

    /// Parse clause lines of the form `- <id>  <text>` (two spaces split
    /// id from text). Non-clause lines (headings, prose) are ignored.
    pub fn parse(text: &str, raw_bytes: &[u8]) -> Result<Self, DomainError> {
        let mut clauses = Vec::new();
        for line in text.lines() {
            let Some(rest) = line.strip_prefix("- ") else {
                continue;
            };
            let (id, clause_text) = rest.split_once("  ").ok_or_else(|| {
                DomainError::CharterParse(format!("clause line without id/text separator: {line}"))
            })?;
            clauses.push(Clause {
                id: id.trim().to_string(),
                text: clause_text.trim().to_string(),
            });
        }
        if clauses.is_empty() {
            return Err(DomainError::CharterParse(
                "charter contains no clauses".to_string(),
            ));
        }

        let hash = format!("{:x}", Sha256::digest(raw_bytes));
        Ok(Self { clauses, hash })
    }

    /// Ordered clauses, as written in the source document.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn clause_text(&self, id: &str) -> Option<&str> {
        self.clauses
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.text.as_str())
    }

    /// SHA-256 hex digest of the raw charter bytes, fixed for process life.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Charter

- S-01  Dynamic evaluation is forbidden: `eval` and `exec` must never appear.
- S-02  Keep the spectral radius strictly below the configured limit.
";

    #[test]
    fn test_parse_clauses_in_order() {
        let charter = Charter::parse(SAMPLE, SAMPLE.as_bytes()).unwrap();
        assert_eq!(charter.clauses().len(), 2);
        assert_eq!(charter.clauses()[0].id, "S-01");
        assert!(charter.clause_text("S-02").unwrap().contains("spectral"));
    }

    #[test]
    fn test_hash_is_stable_and_content_addressed() {
        let a = Charter::parse(SAMPLE, SAMPLE.as_bytes()).unwrap();
        let b = Charter::parse(SAMPLE, SAMPLE.as_bytes()).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);

        let other = SAMPLE.replace("S-02", "S-03");
        let c = Charter::parse(&other, other.as_bytes()).unwrap();
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_empty_charter_is_an_error() {
        let result = Charter::parse("# nothing here\n", b"# nothing here\n");
        assert!(matches!(result, Err(DomainError::CharterParse(_))));
    }

    #[test]
    fn test_malformed_clause_line_is_an_error() {
        let bad = "- S-01 only-one-space\n";
        assert!(Charter::parse(bad, bad.as_bytes()).is_err());
    }
}
