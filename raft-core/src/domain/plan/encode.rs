// raft-core/src/domain/plan/encode.rs

// SMT encoding of plan safety as a contradiction problem: the formula
// asserts that *some* step violates its contract, so UNSAT proves the plan
// safe. The solver's role is evidence that no violation exists; the
// structured counterexample for unsafe plans is built natively by
// `first_violation`, because step indexes are not part of solver models.

use crate::domain::plan::{Plan, Step, ALLOWED_RUN_TARGETS};
use serde::{Deserialize, Serialize};

/// Machine-actionable witness: the first step whose field breaks its
/// contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanViolation {
    pub step_idx: usize,
    pub op: String,
    pub field: String,
    pub offending_value: String,
}

/// Emit the SMT-LIB2 program asserting that some step violates its
/// per-step contract. All values are ground string literals; the string
/// theory does the case analysis.
pub fn encode_violation_formula(plan: &Plan) -> String {
    let mut clauses = Vec::with_capacity(plan.steps.len());
    for step in &plan.steps {
        clauses.push(step_violation_expr(step));
    }

    let body = if clauses.is_empty() {
        "false".to_string()
    } else {
        format!("(or\n  {}\n)", clauses.join("\n  "))
    };
    format!("(assert {body})\n")
}

fn step_violation_expr(step: &Step) -> String {
    let op = smt_str(step.op());
    let url = smt_str(match step {
        Step::Fetch(f) => f.url.as_str(),
        _ => "",
    });
    let path = smt_str(match step {
        Step::WriteFile(w) => w.path.as_str(),
        _ => "",
    });
    let target = smt_str(match step {
        Step::Run(r) => r.target.as_str(),
        _ => "",
    });

    // Fetch: http(s) scheme and a dotted host after "://".
    let scheme_ok =
        format!("(or (str.prefixof \"http://\" {url}) (str.prefixof \"https://\" {url}))");
    let idx = format!("(str.indexof {url} \"://\" 0)");
    let host = format!("(str.substr {url} (+ {idx} 3) (- (str.len {url}) (+ {idx} 3)))");
    let fetch_valid = format!(
        "(and {scheme_ok} (and (>= {idx} 0) (str.contains {host} \".\")))"
    );
    let fetch_violation = format!("(and (= {op} \"Fetch\") (not {fetch_valid}))");

    // WriteFile: confined under the artifacts root, relative, no traversal.
    let starts_artifacts = format!(
        "(or (str.prefixof \"artifacts/\" {path}) (str.prefixof \"artifacts\\\\\" {path}))"
    );
    let is_relative = format!(
        "(and (not (str.prefixof \"/\" {path})) (not (str.contains {path} \":/\")) (not (str.contains {path} \":\\\\\")))"
    );
    let no_dotdot = format!("(not (str.contains {path} \"..\"))");
    let wf_valid = format!("(and {is_relative} {no_dotdot} {starts_artifacts})");
    let wf_violation = format!("(and (= {op} \"WriteFile\") (not {wf_valid}))");

    // Run: membership in the closed allow-list.
    let mut allowed: Vec<&str> = ALLOWED_RUN_TARGETS.to_vec();
    allowed.sort_unstable();
    let run_valid = if allowed.is_empty() {
        "false".to_string()
    } else {
        let eqs: Vec<String> = allowed
            .iter()
            .map(|t| format!("(= {target} {})", smt_str(t)))
            .collect();
        format!("(or {})", eqs.join(" "))
    };
    let run_violation = format!("(and (= {op} \"Run\") (not {run_valid}))");

    format!("(or {fetch_violation} {wf_violation} {run_violation})")
}

/// SMT-LIB2 string literal: double-quote escaping only.
fn smt_str(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Native duplicate of the per-step contracts, used to craft the witness
/// when the solver reports SAT or UNKNOWN.
pub fn first_violation(plan: &Plan) -> Option<PlanViolation> {
    for (idx, step) in plan.steps.iter().enumerate() {
        match step {
            Step::Fetch(fetch) => {
                if !fetch_contract_ok(&fetch.url) {
                    return Some(PlanViolation {
                        step_idx: idx,
                        op: "Fetch".to_string(),
                        field: "url".to_string(),
                        offending_value: fetch.url.clone(),
                    });
                }
            }
            Step::WriteFile(write) => {
                if !write_contract_ok(&write.path) {
                    return Some(PlanViolation {
                        step_idx: idx,
                        op: "WriteFile".to_string(),
                        field: "path".to_string(),
                        offending_value: write.path.clone(),
                    });
                }
            }
            Step::Run(run) => {
                if !ALLOWED_RUN_TARGETS.contains(&run.target.as_str()) {
                    return Some(PlanViolation {
                        step_idx: idx,
                        op: "Run".to_string(),
                        field: "target".to_string(),
                        offending_value: run.target.clone(),
                    });
                }
            }
        }
    }
    None
}

fn fetch_contract_ok(url: &str) -> bool {
    let scheme_ok = url.starts_with("http://") || url.starts_with("https://");
    let host_dot = url
        .split_once("://")
        .map(|(_, rest)| rest.contains('.'))
        .unwrap_or(false);
    scheme_ok && host_dot
}

fn write_contract_ok(path: &str) -> bool {
    let norm = path.replace('\\', "/");
    let is_relative = !norm.starts_with('/') && !norm.contains(":/");
    let no_dotdot = !norm.contains("..");
    let starts_artifacts = norm.starts_with("artifacts/");
    is_relative && no_dotdot && starts_artifacts
}
