// raft-core/src/application/verifier.rs

use crate::error::RaftError;
use crate::infrastructure::cache::PROOF_CACHE_TTL;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::cache::KvCache;
use crate::ports::solver::{SmtBackend, SolveOutcome};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Verdict of the proof gate. The obligation asserts a violation, so
/// UNSAT ⇒ `Passed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofVerdict {
    Passed,
    Failed(Option<ModelCounterexample>),
}

impl ProofVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, ProofVerdict::Passed)
    }
}

/// Stringified model assignments plus a short human-readable summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCounterexample {
    pub bindings: BTreeMap<String, String>,
    pub summary: String,
}

impl ModelCounterexample {
    fn from_bindings(bindings: BTreeMap<String, String>) -> Self {
        let shown: Vec<String> = bindings
            .iter()
            .take(3)
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        let summary = format!("{} bindings; first: {}", bindings.len(), shown.join(", "));
        Self { bindings, summary }
    }

    fn unknown() -> Self {
        Self {
            bindings: BTreeMap::new(),
            summary: "UNKNOWN".to_string(),
        }
    }
}

/// Proof gate: cheap syntactic guard, content-addressed cache, external
/// solver. Cache writes are best-effort and never change the verdict.
pub struct SmtVerifier {
    backend: Arc<dyn SmtBackend>,
    cache: Arc<dyn KvCache>,
}

impl SmtVerifier {
    pub fn new(backend: Arc<dyn SmtBackend>, cache: Arc<dyn KvCache>) -> Self {
        Self { backend, cache }
    }

    /// `SHA-256(obligation)` joined with the charter hash, so a policy
    /// change invalidates every cached verdict.
    pub fn cache_key(obligation: &str, charter_hash: &str) -> String {
        format!("{:x}:{}", Sha256::digest(obligation.as_bytes()), charter_hash)
    }

    pub async fn verify(
        &self,
        obligation: &str,
        charter_hash: &str,
    ) -> Result<ProofVerdict, RaftError> {
        let key = Self::cache_key(obligation, charter_hash);

        // Cheap syntactic guard before any solver or cache machinery.
        if !balanced_parens(obligation) {
            self.cache_verdict(&key, false);
            return Err(RaftError::Infrastructure(InfrastructureError::SmtParse(
                "unbalanced parentheses in obligation".to_string(),
            )));
        }

        if let Some(cached) = self.cache.get(&format!("verdict:{key}")) {
            debug!(%key, cached, "proof cache hit");
            return Ok(if cached == "1" {
                ProofVerdict::Passed
            } else {
                let counterexample = self
                    .cache
                    .get(&format!("counterexample:{key}"))
                    .and_then(|json| serde_json::from_str(&json).ok());
                ProofVerdict::Failed(counterexample)
            });
        }

        let outcome = match self.backend.check(obligation, None).await {
            Ok(outcome) => outcome,
            Err(InfrastructureError::SmtParse(detail)) => {
                self.cache_verdict(&key, false);
                return Err(RaftError::Infrastructure(InfrastructureError::SmtParse(
                    detail,
                )));
            }
            Err(other) => return Err(RaftError::Infrastructure(other)),
        };

        match outcome {
            SolveOutcome::Unsat => {
                self.cache_verdict(&key, true);
                Ok(ProofVerdict::Passed)
            }
            SolveOutcome::Sat(bindings) => {
                let counterexample = ModelCounterexample::from_bindings(bindings);
                self.cache_verdict(&key, false);
                self.cache_counterexample(&key, &counterexample);
                Ok(ProofVerdict::Failed(Some(counterexample)))
            }
            SolveOutcome::Unknown => {
                warn!("solver returned unknown; treating as failed");
                self.cache_verdict(&key, false);
                Ok(ProofVerdict::Failed(Some(ModelCounterexample::unknown())))
            }
        }
    }

    fn cache_verdict(&self, key: &str, pass: bool) {
        self.cache.put(
            &format!("verdict:{key}"),
            if pass { "1" } else { "0" },
            PROOF_CACHE_TTL,
        );
    }

    fn cache_counterexample(&self, key: &str, counterexample: &ModelCounterexample) {
        if let Ok(json) = serde_json::to_string(counterexample) {
            self.cache
                .put(&format!("counterexample:{key}"), &json, PROOF_CACHE_TTL);
        }
    }
}

fn balanced_parens(text: &str) -> bool {
    let opens = text.matches('(').count();
    let closes = text.matches(')').count();
    opens == closes
}
