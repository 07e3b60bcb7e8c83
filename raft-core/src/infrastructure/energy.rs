// raft-core/src/infrastructure/energy.rs

use parking_lot::Mutex;
use std::fs;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// RAPL package-energy counter: monotonically increasing microjoules.
const RAPL_PATH: &str = "/sys/class/powercap/intel-rapl/intel-rapl:0/energy_uj";

/// Calibrated baseline power draw.
pub const BASELINE_JOULES_PER_SECOND: f64 = 1.9;

/// Budget coefficient: the baseline at one GMAC per second.
pub const JOULES_PER_MAC: f64 = 1.9e-9;

/// Distinguished exit code for energy apoptosis.
pub const APOPTOSIS_EXIT_CODE: i32 = 86;

pub const ENERGY_GUARD_ENABLED_ENV: &str = "ENERGY_GUARD_ENABLED";

/// Breach description, surfaced in the fatal log line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyBreach {
    pub used_joules: f64,
    pub budget_joules: f64,
    pub macs: u64,
}

/// Pure budget rule: `used <= J_PER_MAC * macs * multiplier`.
pub fn check_budget(used_joules: f64, macs: u64, multiplier: f64) -> Result<(), EnergyBreach> {
    let budget_joules = JOULES_PER_MAC * macs as f64 * multiplier;
    if used_joules > budget_joules {
        Err(EnergyBreach {
            used_joules,
            budget_joules,
            macs,
        })
    } else {
        Ok(())
    }
}

/// Process-global cumulative energy accumulator.
///
/// Prefers the hardware RAPL counter; falls back to a time-based estimate
/// at 50% of the calibrated baseline. The first sample establishes the
/// zero point and reads as 0.
pub struct EnergyMeter {
    started: Instant,
    origin: Mutex<Option<f64>>,
}

impl EnergyMeter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            origin: Mutex::new(None),
        }
    }

    /// Joules consumed since the first call to this method.
    pub fn cumulative_joules(&self) -> f64 {
        let current = self.read_raw();
        let mut origin = self.origin.lock();
        match *origin {
            Some(o) => (current - o).max(0.0),
            None => {
                *origin = Some(current);
                0.0
            }
        }
    }

    fn read_raw(&self) -> f64 {
        if let Ok(text) = fs::read_to_string(RAPL_PATH) {
            if let Ok(micro) = text.trim().parse::<f64>() {
                return micro / 1_000_000.0;
            }
        }
        // Conservative fallback: half the calibrated baseline.
        self.started.elapsed().as_secs_f64() * BASELINE_JOULES_PER_SECOND * 0.5
    }
}

impl Default for EnergyMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped energy-budget enforcement. Entering snapshots the accumulator;
/// leaving (normally or through unwind) re-samples and enforces the
/// budget, halting the process on breach.
pub struct EnergyGuard {
    meter: Arc<EnergyMeter>,
    enabled: bool,
}

impl EnergyGuard {
    pub fn new(meter: Arc<EnergyMeter>, enabled: bool) -> Self {
        Self { meter, enabled }
    }

    /// Honor `ENERGY_GUARD_ENABLED=false`: the scope yields
    /// unconditionally with no sampling at all.
    pub fn from_env(meter: Arc<EnergyMeter>) -> Self {
        let enabled = std::env::var(ENERGY_GUARD_ENABLED_ENV)
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);
        Self::new(meter, enabled)
    }

    pub fn enter(&self, macs: u64, multiplier: f64) -> EnergyScope {
        let start = if self.enabled {
            Some(self.meter.cumulative_joules())
        } else {
            None
        };
        EnergyScope {
            meter: Arc::clone(&self.meter),
            start,
            macs,
            multiplier,
            closed: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

pub struct EnergyScope {
    meter: Arc<EnergyMeter>,
    start: Option<f64>,
    macs: u64,
    multiplier: f64,
    closed: bool,
}

impl EnergyScope {
    /// Explicit exit: returns joules used in the scope (0 when disabled).
    pub fn close(mut self) -> f64 {
        self.settle()
    }

    fn settle(&mut self) -> f64 {
        if self.closed {
            return 0.0;
        }
        self.closed = true;
        let Some(start) = self.start else {
            return 0.0;
        };
        let used = self.meter.cumulative_joules() - start;
        if let Err(breach) = check_budget(used, self.macs, self.multiplier) {
            error!(
                used_joules = breach.used_joules,
                budget_joules = breach.budget_joules,
                macs = breach.macs,
                "Energy apoptosis triggered"
            );
            std::process::exit(APOPTOSIS_EXIT_CODE);
        }
        debug!(used_joules = used, macs = self.macs, "energy budget ok");
        used
    }
}

impl Drop for EnergyScope {
    fn drop(&mut self) {
        // Exceptional exits are held to the same budget.
        self.settle();
    }
}
