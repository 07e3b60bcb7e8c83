// raft-core/src/domain/drift.rs

use crate::domain::error::DomainError;
use std::collections::VecDeque;
use tracing::debug;

pub const DEFAULT_WINDOW: usize = 10;
pub const MIN_WINDOW: usize = 2;
pub const DEFAULT_MEAN_THRESHOLD: f64 = 0.05;
pub const DEFAULT_MAX_THRESHOLD: f64 = 0.10;

/// Multi-cycle drift detector over spectral-radius estimates.
///
/// Keeps a bounded FIFO of the last `window_size` estimates and, on each
/// record, checks the rolling mean and max of consecutive absolute changes
/// against the configured thresholds. Both comparisons are strict: sitting
/// exactly at a threshold does not trigger.
#[derive(Debug, Clone)]
pub struct DriftMonitor {
    window_size: usize,
    mean_threshold: f64,
    max_threshold: f64,
    radii: VecDeque<f64>,
}

/// Rolling statistics of the current window, published by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftStats {
    pub mean_drift: f64,
    pub max_drift: f64,
}

impl DriftMonitor {
    pub fn new(window_size: usize, mean_threshold: f64, max_threshold: f64) -> Self {
        Self {
            window_size: window_size.max(MIN_WINDOW),
            mean_threshold,
            max_threshold,
            radii: VecDeque::new(),
        }
    }

    /// Build from `DRIFT_WINDOW`, `DRIFT_MEAN_THRESHOLD` and
    /// `DRIFT_MAX_THRESHOLD`, falling back to defaults on absent or
    /// unparsable values.
    pub fn from_env() -> Self {
        let window = env_parse("DRIFT_WINDOW", DEFAULT_WINDOW);
        let mean = env_parse("DRIFT_MEAN_THRESHOLD", DEFAULT_MEAN_THRESHOLD);
        let max = env_parse("DRIFT_MAX_THRESHOLD", DEFAULT_MAX_THRESHOLD);
        Self::new(window, mean, max)
    }

    /// Record a new estimate; returns the window stats when at least two
    /// samples are present, or `None` on a warming-up window.
    ///
    /// Raises [`DomainError::DriftAlert`] when either threshold is strictly
    /// exceeded. The offending sample stays in the window: the caller aborts
    /// the cycle, and the alert context carries a snapshot for the event log.
    pub fn record(&mut self, rho: f64) -> Result<Option<DriftStats>, DomainError> {
        self.radii.push_back(rho);
        if self.radii.len() > self.window_size {
            self.radii.pop_front();
        }
        if self.radii.len() < 2 {
            return Ok(None);
        }

        let diffs: Vec<f64> = self
            .radii
            .iter()
            .zip(self.radii.iter().skip(1))
            .map(|(a, b)| (b - a).abs())
            .collect();
        let mean_drift = diffs.iter().sum::<f64>() / diffs.len() as f64;
        let max_drift = diffs.iter().fold(0.0_f64, |acc, d| acc.max(*d));

        debug!(rho, mean_drift, max_drift, "drift check");

        if mean_drift > self.mean_threshold || max_drift > self.max_threshold {
            return Err(DomainError::DriftAlert {
                mean_drift,
                max_drift,
                window: self.current_window(),
            });
        }

        Ok(Some(DriftStats {
            mean_drift,
            max_drift,
        }))
    }

    pub fn reset(&mut self) {
        self.radii.clear();
    }

    /// Defensive copy of the window, oldest first.
    pub fn current_window(&self) -> Vec<f64> {
        self.radii.iter().copied().collect()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

impl Default for DriftMonitor {
    fn default() -> Self {
        Self::new(
            DEFAULT_WINDOW,
            DEFAULT_MEAN_THRESHOLD,
            DEFAULT_MAX_THRESHOLD,
        )
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
