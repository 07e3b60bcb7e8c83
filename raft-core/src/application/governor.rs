// raft-core/src/application/governor.rs

use crate::application::plan_prover::PlanProver;
use crate::application::verifier::{ProofVerdict, SmtVerifier};
use crate::domain::charter::Charter;
use crate::domain::config::{ConfigUpdate, GovernorConfig};
use crate::domain::diff::ObligationBuilder;
use crate::domain::drift::DriftMonitor;
use crate::domain::error::DomainError;
use crate::domain::plan::encode::PlanViolation;
use crate::domain::plan::Plan;
use crate::domain::spectral::{estimate_spectral_radius, SpectralOptions};
use crate::error::RaftError;
use crate::infrastructure::config_store::ConfigStore;
use crate::infrastructure::energy::{EnergyGuard, EnergyMeter};
use crate::infrastructure::escape::EscapeHatches;
use crate::infrastructure::event_log::EventLog;
use crate::infrastructure::metrics::Metrics;
use crate::infrastructure::model::load_model;
use crate::ports::cache::KvCache;
use crate::ports::model::DifferentiableMap;
use crate::ports::solver::SmtBackend;
use ndarray::Array1;
use parking_lot::{Mutex, RwLock};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

pub const MODEL_PATH_ENV: &str = "MODEL_PATH";

/// Declared operation estimate for one cycle's critical block.
const CYCLE_MACS_ESTIMATE: u64 = 1_000_000_000;

/// Cycle state machine. `Committing` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Proving,
    Estimating,
    Committing,
    Aborted,
}

/// Outcome of one cycle, for callers that report status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub committed: bool,
    pub state: CycleState,
    pub rho: Option<f64>,
}

/// Process-wide aggregate composing charter, config, caches, verifiers,
/// guards and observability. Ownership is strictly top-down: the process
/// entry builds one `Runtime` and passes it around; nothing in here is a
/// module-level singleton, so tests construct as many as they like.
pub struct Runtime {
    charter: Charter,
    config: ConfigStore,
    events: EventLog,
    metrics: Metrics,
    hatches: Arc<EscapeHatches>,
    verifier: SmtVerifier,
    plan_prover: PlanProver,
    obligations: ObligationBuilder,
    drift: Mutex<DriftMonitor>,
    model: RwLock<Arc<dyn DifferentiableMap>>,
    energy: EnergyGuard,
}

impl Runtime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        charter: Charter,
        config: ConfigStore,
        events: EventLog,
        cache: Arc<dyn KvCache>,
        backend: Arc<dyn SmtBackend>,
        model: Arc<dyn DifferentiableMap>,
        hatches: Arc<EscapeHatches>,
        energy: EnergyGuard,
    ) -> Result<Self, RaftError> {
        let metrics = Metrics::new()
            .map_err(|e| RaftError::InternalError(format!("metrics registry: {e}")))?;
        let obligations = ObligationBuilder::new(&charter)?;
        Ok(Self {
            verifier: SmtVerifier::new(Arc::clone(&backend), Arc::clone(&cache)),
            plan_prover: PlanProver::new(backend, cache),
            obligations,
            charter,
            config,
            events,
            metrics,
            hatches,
            drift: Mutex::new(DriftMonitor::from_env()),
            model: RwLock::new(model),
            energy,
        })
    }

    /// Execute exactly one governor cycle as an ordered transaction:
    /// proof gate, spectral estimate, drift check, spectral limit, energy
    /// scope, commit. The order is non-commutative and must not change.
    #[instrument(skip_all)]
    pub async fn one_cycle(&self, diff_text: &str) -> Result<CycleReport, RaftError> {
        let config = self.config.get();
        let charter_prefix = &self.charter.hash()[..8];

        self.metrics.spectral_threshold.set(config.rho_max);

        // 1 ─── proof gate
        let mut state = CycleState::Proving;
        tracing::debug!(?state, "cycle state");
        let obligation = self.obligations.build_from_text(diff_text);
        let verdict = self
            .verifier
            .verify(&obligation.smt, self.charter.hash())
            .await?;
        if let ProofVerdict::Failed(counterexample) = verdict {
            error!(violations = obligation.violations.len(), "proof gate rejected self-mod");
            self.events.record(
                "proof-fail",
                json!({
                    "charter": charter_prefix,
                    "violations": obligation.violations,
                    "counterexample": counterexample.map(|c| c.summary),
                }),
            );
            self.metrics.proof_failure.inc();
            self.metrics
                .charter_violations
                .with_label_values(&["proof"])
                .inc();
            return Ok(aborted(None));
        }
        self.metrics.proof_success.inc();

        // 2 ─── spectral-radius estimate at a fresh random point
        state = CycleState::Estimating;
        tracing::debug!(?state, "cycle state");
        let model = Arc::clone(&*self.model.read());
        let probe = random_probe(model.input_dim());
        let rho = estimate_spectral_radius(&*model, probe.view(), &SpectralOptions::default())?;
        self.metrics.spectral_rho.set(rho);

        // 3 ─── multi-cycle drift guard
        match self.drift.lock().record(rho) {
            Ok(Some(stats)) => {
                self.metrics.drift_mean.set(stats.mean_drift);
                self.metrics.drift_max.set(stats.max_drift);
            }
            Ok(None) => {}
            Err(DomainError::DriftAlert {
                mean_drift,
                max_drift,
                window,
            }) => {
                error!(mean_drift, max_drift, "drift alert");
                self.events.record(
                    "drift-alert",
                    json!({
                        "rho": rho,
                        "mean_drift": mean_drift,
                        "max_drift": max_drift,
                        "window": window,
                    }),
                );
                self.metrics
                    .charter_violations
                    .with_label_values(&["drift"])
                    .inc();
                return Ok(aborted(Some(rho)));
            }
            Err(other) => return Err(other.into()),
        }

        // 4 ─── hard spectral limit
        if rho >= config.rho_max {
            error!(rho, limit = config.rho_max, "spectral breach");
            self.events.record("spectral-breach", json!({ "rho": rho }));
            self.metrics
                .charter_violations
                .with_label_values(&["spectral"])
                .inc();
            return Ok(aborted(Some(rho)));
        }

        // 5 ─── commit inside the energy-measured scope
        state = CycleState::Committing;
        tracing::debug!(?state, "cycle state");
        let scope = self
            .energy
            .enter(CYCLE_MACS_ESTIMATE, config.energy_multiplier);
        self.events.record(
            "cycle-complete",
            json!({ "rho": rho, "charter": charter_prefix }),
        );
        let used_joules = scope.close();
        if used_joules > 0.0 {
            let rate = used_joules / (CYCLE_MACS_ESTIMATE as f64 / 1e9);
            self.metrics.energy_rate.set(rate);
        }

        info!(rho, "cycle-complete");
        self.metrics.cycle_count.inc();

        // The pause flag masks the commit without rolling back events.
        if self.hatches.is_paused() {
            return Ok(CycleReport {
                committed: false,
                state: CycleState::Aborted,
                rho: Some(rho),
            });
        }

        Ok(CycleReport {
            committed: true,
            state,
            rho: Some(rho),
        })
    }

    /// Outer loop: pull-driven cadence with an interruptible sleep.
    /// Stops after `max_cycles` when given, or on the kill flag.
    pub async fn run(
        &self,
        diff_text: &str,
        interval: Duration,
        max_cycles: Option<u64>,
    ) -> Result<u64, RaftError> {
        let mut completed = 0u64;
        let mut executed = 0u64;
        loop {
            if self.hatches.kill_requested() {
                info!(completed, "kill requested; leaving governor loop");
                break;
            }
            if let Some(max) = max_cycles {
                if executed >= max {
                    break;
                }
            }

            let report = self.one_cycle(diff_text).await?;
            executed += 1;
            if report.committed {
                completed += 1;
            }

            interruptible_sleep(&self.hatches, interval).await;
        }
        Ok(completed)
    }

    /// Swap the model handle between cycles and re-estimate. The write
    /// lock is only contended by `one_cycle`'s read, so a reload never
    /// lands mid-cycle.
    pub async fn reload_model(&self, path: Option<&Path>) -> Result<f64, RaftError> {
        let path: PathBuf = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(MODEL_PATH_ENV).map(PathBuf::from).map_err(|_| {
                RaftError::Domain(DomainError::validation(
                    "model_path",
                    format!("no model path given and {MODEL_PATH_ENV} unset"),
                ))
            })?,
        };

        let model = load_model(&path).map_err(RaftError::Infrastructure)?;
        let probe = random_probe(model.input_dim());
        let rho = estimate_spectral_radius(&*model, probe.view(), &SpectralOptions::default())?;
        *self.model.write() = model;

        self.metrics.model_reloads.inc();
        self.events.record(
            "model-reload",
            json!({ "path": path.display().to_string(), "rho": rho }),
        );
        Ok(rho)
    }

    /// Validate and prove a plan (the operator `/prove` path).
    pub async fn prove_plan(
        &self,
        plan: Plan,
    ) -> Result<(bool, Option<PlanViolation>), RaftError> {
        let validated = plan.validate()?;
        self.plan_prover.verify_plan(&validated).await
    }

    /// Validated, persisted config update; emits the `config-update`
    /// event on success.
    pub fn update_config(&self, update: ConfigUpdate) -> Result<GovernorConfig, RaftError> {
        let config = self.config.update(update)?;
        self.events.record(
            "config-update",
            json!({
                "rho_max": config.rho_max,
                "energy_multiplier": config.energy_multiplier,
            }),
        );
        Ok(config)
    }

    /// Best-effort spectral estimate outside a cycle (status surfaces).
    pub fn estimate_rho(&self) -> Option<f64> {
        let model = Arc::clone(&*self.model.read());
        let probe = random_probe(model.input_dim());
        estimate_spectral_radius(
            &*model,
            probe.view(),
            &SpectralOptions {
                n_iter: 5,
                ..Default::default()
            },
        )
        .ok()
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn charter(&self) -> &Charter {
        &self.charter
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn hatches(&self) -> &Arc<EscapeHatches> {
        &self.hatches
    }

    pub fn drift_window(&self) -> Vec<f64> {
        self.drift.lock().current_window()
    }
}

fn aborted(rho: Option<f64>) -> CycleReport {
    CycleReport {
        committed: false,
        state: CycleState::Aborted,
        rho,
    }
}

fn random_probe(dim: usize) -> Array1<f64> {
    let mut rng = SmallRng::from_entropy();
    Array1::from_iter((0..dim).map(|_| rng.sample::<f64, _>(StandardNormal)))
}

async fn interruptible_sleep(hatches: &Arc<EscapeHatches>, total: Duration) {
    let step = Duration::from_millis(100);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if hatches.kill_requested() {
            return;
        }
        let chunk = remaining.min(step);
        tokio::time::sleep(chunk).await;
        remaining = remaining.saturating_sub(chunk);
    }
}

/// Convenience assembly for the production wiring: loads the charter,
/// opens config/cache/event-log at their configured paths and seeds a
/// stable analytic model.
pub struct RuntimeBuilder {
    pub charter_path: PathBuf,
    pub event_log_path: PathBuf,
    pub cache_path: PathBuf,
    pub model_dim: usize,
    pub model_rho: f64,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self {
            charter_path: PathBuf::from("charter.md"),
            event_log_path: PathBuf::from("logs/event_log.jsonl"),
            cache_path: PathBuf::from(".raft-cache"),
            model_dim: 4,
            model_rho: 0.8,
        }
    }
}

impl RuntimeBuilder {
    pub fn build(self) -> Result<Runtime, RaftError> {
        let charter = Charter::load(&self.charter_path)?;
        let config = ConfigStore::open_from_env()?;
        let events = EventLog::new(&self.event_log_path)?;
        let cache = crate::infrastructure::cache::open_or_noop(&self.cache_path);
        let backend: Arc<dyn SmtBackend> = Arc::new(crate::infrastructure::solver::Z3Process::new());
        let model: Arc<dyn DifferentiableMap> = Arc::new(
            crate::infrastructure::model::MatrixModel::with_spectral_radius(
                self.model_dim,
                self.model_rho,
                17,
            ),
        );
        let hatches = EscapeHatches::new();
        let energy = EnergyGuard::from_env(Arc::new(EnergyMeter::new()));
        Runtime::new(charter, config, events, cache, backend, model, hatches, energy)
    }
}
