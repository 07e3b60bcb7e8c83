// raft-core/src/application/plan_prover.rs

use crate::domain::plan::encode::{encode_violation_formula, first_violation, PlanViolation};
use crate::domain::plan::Plan;
use crate::error::RaftError;
use crate::infrastructure::cache::PROOF_CACHE_TTL;
use crate::ports::cache::KvCache;
use crate::ports::solver::{SmtBackend, SolveOutcome};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Wall-clock bound on the safety solve; UNKNOWN is treated as unsafe.
pub const PLAN_SOLVE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Proves plan safety by SMT contradiction. UNSAT means no step can
/// violate its contract; anything else is unsafe and the structured
/// counterexample is computed natively (solver models carry no step
/// indexes, and the plan-shaped witness is cheaper to build directly).
pub struct PlanProver {
    backend: Arc<dyn SmtBackend>,
    cache: Arc<dyn KvCache>,
}

impl PlanProver {
    pub fn new(backend: Arc<dyn SmtBackend>, cache: Arc<dyn KvCache>) -> Self {
        Self { backend, cache }
    }

    fn cache_key(plan: &Plan) -> Result<String, RaftError> {
        let canonical = plan
            .canonical_json()
            .map_err(|e| RaftError::Infrastructure(e.into()))?;
        Ok(format!("plan:{:x}", Sha256::digest(canonical.as_bytes())))
    }

    /// Prove a validated plan. Returns `(true, None)` when safe, else
    /// `(false, witness)`.
    pub async fn verify_plan(
        &self,
        plan: &Plan,
    ) -> Result<(bool, Option<PlanViolation>), RaftError> {
        let key = Self::cache_key(plan)?;

        if let Some(cached) = self.cache.get(&format!("verdict:{key}")) {
            debug!(%key, cached, "plan proof cache hit");
            if cached == "1" {
                return Ok((true, None));
            }
            let witness = self
                .cache
                .get(&format!("counterexample:{key}"))
                .and_then(|json| serde_json::from_str(&json).ok());
            return Ok((false, witness));
        }

        let formula = encode_violation_formula(plan);
        let outcome = self
            .backend
            .check(&formula, Some(PLAN_SOLVE_TIMEOUT))
            .await
            .map_err(RaftError::Infrastructure)?;

        match outcome {
            SolveOutcome::Unsat => {
                self.cache.put(&format!("verdict:{key}"), "1", PROOF_CACHE_TTL);
                info!(plan = %plan.name, "plan proven safe");
                Ok((true, None))
            }
            SolveOutcome::Sat(_) | SolveOutcome::Unknown => {
                let witness = first_violation(plan);
                self.cache.put(&format!("verdict:{key}"), "0", PROOF_CACHE_TTL);
                if let Some(w) = &witness {
                    if let Ok(json) = serde_json::to_string(w) {
                        self.cache
                            .put(&format!("counterexample:{key}"), &json, PROOF_CACHE_TTL);
                    }
                }
                info!(plan = %plan.name, witness = ?witness, "plan rejected");
                Ok((false, witness))
            }
        }
    }
}
