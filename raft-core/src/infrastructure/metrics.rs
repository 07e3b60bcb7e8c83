// raft-core/src/infrastructure/metrics.rs

use prometheus::{Gauge, IntCounter, IntCounterVec, Opts, Registry};

/// Typed metric handles owned by the runtime (no global registry; tests
/// and embedders get their own instance). Scraping the registry is a
/// consumer concern and lives outside the core.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,
    pub cycle_count: IntCounter,
    pub proof_success: IntCounter,
    pub proof_failure: IntCounter,
    pub charter_violations: IntCounterVec,
    pub model_reloads: IntCounter,
    pub spectral_rho: Gauge,
    pub spectral_threshold: Gauge,
    pub drift_mean: Gauge,
    pub drift_max: Gauge,
    pub energy_rate: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cycle_count = IntCounter::new(
            "raft_cycles_total",
            "Total number of governor cycles completed",
        )?;
        let proof_success = IntCounter::new("raft_proof_pass_total", "Proof obligations passed")?;
        let proof_failure = IntCounter::new("raft_proof_fail_total", "Proof obligations failed")?;
        let charter_violations = IntCounterVec::new(
            Opts::new(
                "raft_charter_violations_total",
                "Number of charter clause violations",
            ),
            &["clause"],
        )?;
        let model_reloads = IntCounter::new("raft_model_reload_total", "Successful model reloads")?;
        let spectral_rho = Gauge::new("raft_spectral_radius", "Spectral radius value each cycle")?;
        let spectral_threshold = Gauge::new(
            "raft_spectral_threshold",
            "Spectral radius threshold for stability",
        )?;
        let drift_mean = Gauge::new(
            "raft_drift_mean",
            "Rolling mean of spectral-radius drift over the sliding window",
        )?;
        let drift_max = Gauge::new(
            "raft_drift_max",
            "Maximum single-step spectral-radius drift in the sliding window",
        )?;
        let energy_rate = Gauge::new(
            "raft_energy_rate_j_s",
            "Energy rate (Joules per second) for each measured block",
        )?;

        registry.register(Box::new(cycle_count.clone()))?;
        registry.register(Box::new(proof_success.clone()))?;
        registry.register(Box::new(proof_failure.clone()))?;
        registry.register(Box::new(charter_violations.clone()))?;
        registry.register(Box::new(model_reloads.clone()))?;
        registry.register(Box::new(spectral_rho.clone()))?;
        registry.register(Box::new(spectral_threshold.clone()))?;
        registry.register(Box::new(drift_mean.clone()))?;
        registry.register(Box::new(drift_max.clone()))?;
        registry.register(Box::new(energy_rate.clone()))?;

        Ok(Self {
            registry,
            cycle_count,
            proof_success,
            proof_failure,
            charter_violations,
            model_reloads,
            spectral_rho,
            spectral_threshold,
            drift_mean,
            drift_max,
            energy_rate,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_holds_all_families() {
        let metrics = Metrics::new().unwrap();
        metrics.cycle_count.inc();
        metrics
            .charter_violations
            .with_label_values(&["spectral"])
            .inc();
        metrics.spectral_rho.set(0.5);

        let families = metrics.registry.gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"raft_cycles_total"));
        assert!(names.contains(&"raft_charter_violations_total"));
        assert!(names.contains(&"raft_spectral_radius"));
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.cycle_count.inc();
        assert_eq!(a.cycle_count.get(), 1);
        assert_eq!(b.cycle_count.get(), 0);
    }
}
