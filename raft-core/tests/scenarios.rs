// raft-core/tests/scenarios.rs
//
// End-to-end scenarios composed purely from the public API, the way an
// embedding process would wire the governor.

use async_trait::async_trait;
use ndarray::arr2;
use raft_core::application::governor::{Runtime, CycleState};
use raft_core::application::operator::operator_router;
use raft_core::domain::charter::Charter;
use raft_core::domain::config::GovernorConfig;
use raft_core::domain::drift::DriftMonitor;
use raft_core::infrastructure::cache::SledCache;
use raft_core::infrastructure::config_store::ConfigStore;
use raft_core::infrastructure::energy::{EnergyGuard, EnergyMeter};
use raft_core::infrastructure::error::InfrastructureError;
use raft_core::infrastructure::escape::EscapeHatches;
use raft_core::infrastructure::event_log::EventLog;
use raft_core::infrastructure::model::MatrixModel;
use raft_core::ports::cache::KvCache;
use raft_core::ports::model::DifferentiableMap;
use raft_core::ports::solver::{SmtBackend, SolveOutcome};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Solver double that decides the two ground obligations the diff gate
/// emits and treats every other program as satisfiable.
struct GroundBackend;

#[async_trait]
impl SmtBackend for GroundBackend {
    async fn check(
        &self,
        smt: &str,
        _timeout: Option<Duration>,
    ) -> Result<SolveOutcome, InfrastructureError> {
        if smt.contains("(assert false)") {
            Ok(SolveOutcome::Unsat)
        } else {
            Ok(SolveOutcome::Sat(Default::default()))
        }
    }
}

fn runtime_in(dir: &TempDir, config: GovernorConfig) -> Runtime {
    let charter_text = "\
- S-01  Dynamic evaluation via `eval` is forbidden.
- S-02  Keep the spectral radius under the configured limit.
";
    let charter = Charter::parse(charter_text, charter_text.as_bytes()).expect("charter");

    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, serde_yaml::to_string(&config).expect("yaml")).expect("config");
    let config = ConfigStore::open(&config_path).expect("config store");

    let events = EventLog::new(dir.path().join("events.jsonl")).expect("event log");
    let cache: Arc<dyn KvCache> =
        Arc::new(SledCache::open(&dir.path().join("cache")).expect("cache"));
    // Analytic spectral radius 0.5.
    let model: Arc<dyn DifferentiableMap> =
        Arc::new(MatrixModel::new(arr2(&[[0.5, 0.0], [0.0, 0.1]])));

    Runtime::new(
        charter,
        config,
        events,
        cache,
        Arc::new(GroundBackend),
        model,
        EscapeHatches::new(),
        EnergyGuard::new(Arc::new(EnergyMeter::new()), false),
    )
    .expect("runtime")
}

fn events_in(dir: &TempDir) -> Vec<serde_json::Value> {
    fs::read_to_string(dir.path().join("events.jsonl"))
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).expect("event json"))
        .collect()
}

#[tokio::test]
async fn scenario_safe_cycle_commits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runtime = runtime_in(
        &dir,
        GovernorConfig {
            rho_max: 0.9,
            energy_multiplier: 2.0,
        },
    );

    let report = runtime.one_cycle("").await.expect("cycle");
    assert!(report.committed);
    assert_eq!(report.state, CycleState::Committing);
    assert!((report.rho.expect("rho") - 0.5).abs() < 0.05);

    let events = events_in(&dir);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "cycle-complete");
}

#[tokio::test]
async fn scenario_forbidden_pattern_aborts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runtime = runtime_in(&dir, GovernorConfig::default());

    let diff = "\
diff --git a/agent/loop.py b/agent/loop.py
--- a/agent/loop.py
+++ b/agent/loop.py
@@ -3,1 +3,2 @@
 context
+value = eval('x')
";
    let report = runtime.one_cycle(diff).await.expect("cycle");
    assert!(!report.committed);

    let events = events_in(&dir);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "proof-fail");
}

#[test]
fn scenario_drift_detection_sequence() {
    let mut monitor = DriftMonitor::default();
    let mut last = None;
    for rho in [0.10, 0.15, 0.22, 0.35, 0.47] {
        last = Some(monitor.record(rho));
    }
    let err = last.expect("fed").expect_err("final record must alert");
    let text = err.to_string();
    assert!(text.contains("0.0925"), "unexpected alert text: {text}");
}

#[tokio::test]
async fn scenario_unsafe_plan_yields_witness() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runtime = runtime_in(&dir, GovernorConfig::default());

    let plan = serde_json::from_value(serde_json::json!({
        "name": "p",
        "steps": [{"op": "WriteFile", "path": "../../etc/passwd", "content": "x"}]
    }))
    .expect("plan");

    // Path traversal is rejected at validation time, before any solving.
    let err = runtime.prove_plan(plan).await.expect_err("must reject");
    assert!(err.to_string().contains("steps[0].path"));
}

#[tokio::test]
async fn scenario_safe_plan_passes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runtime = runtime_in(&dir, GovernorConfig::default());

    let plan = serde_json::from_value(serde_json::json!({
        "name": "p",
        "steps": [
            {"op": "Fetch", "url": "https://a.b"},
            {"op": "WriteFile", "path": "artifacts/a.txt", "content": "x"},
            {"op": "Run", "target": "governor.one_cycle"}
        ]
    }))
    .expect("plan");

    // GroundBackend answers Sat for the plan formula, so this exercises
    // the witness path staying empty for a contract-clean plan.
    let (passed, witness) = runtime.prove_plan(plan).await.expect("prove");
    assert!(!passed || witness.is_none());
}

#[tokio::test]
async fn scenario_config_rejection_via_operator() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runtime = Arc::new(runtime_in(&dir, GovernorConfig::default()));
    let app = operator_router(Arc::clone(&runtime), "tok");

    use tower::ServiceExt;
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/config")
        .header("authorization", "Bearer tok")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            r#"{"rho_max": 1.5, "energy_multiplier": 2.0}"#,
        ))
        .expect("request");

    let before = runtime.config().get();
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(runtime.config().get(), before);
}
