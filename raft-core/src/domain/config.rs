// raft-core/src/domain/config.rs

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Runtime parameters of the governor.
///
/// This struct is the single validation source: the config store, the YAML
/// loader and the operator `/config` endpoint all deserialize into it and
/// call [`GovernorConfig::check`]. There is deliberately no second schema.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GovernorConfig {
    /// Spectral-radius hard limit, strictly inside (0, 1).
    #[validate(custom(function = "validate_rho_max"))]
    pub rho_max: f64,

    /// Energy budget headroom vs. baseline, inside [1, 4].
    #[validate(range(min = 1.0, max = 4.0, message = "energy_multiplier must be in [1, 4]"))]
    pub energy_multiplier: f64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            rho_max: 0.9,
            energy_multiplier: 2.0,
        }
    }
}

/// Partial update applied through the config store; absent fields keep
/// their current value. Unknown fields are rejected at deserialization.
#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigUpdate {
    pub rho_max: Option<f64>,
    pub energy_multiplier: Option<f64>,
}

impl GovernorConfig {
    /// Validate and convert the crate-agnostic error into a [`DomainError`]
    /// carrying the first failing field path.
    pub fn check(&self) -> Result<(), DomainError> {
        self.validate().map_err(|errors| {
            let (field, message) = first_field_error(&errors);
            DomainError::Validation { field, message }
        })
    }

    /// Apply a partial update, returning the candidate config (unvalidated).
    pub fn with_update(&self, update: &ConfigUpdate) -> Self {
        Self {
            rho_max: update.rho_max.unwrap_or(self.rho_max),
            energy_multiplier: update.energy_multiplier.unwrap_or(self.energy_multiplier),
        }
    }
}

fn validate_rho_max(value: f64) -> Result<(), ValidationError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("rho_max");
        err.message = Some("rho_max must be in (0, 1)".into());
        Err(err)
    }
}

/// Flatten a `validator` error set into the first (field, message) pair,
/// machine-readable for 422 responses.
pub fn first_field_error(errors: &validator::ValidationErrors) -> (String, String) {
    for (field, kinds) in errors.errors() {
        if let validator::ValidationErrorsKind::Field(list) = kinds {
            if let Some(err) = list.first() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                return (field.to_string(), message);
            }
        }
    }
    ("<unknown>".to_string(), "validation failed".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        GovernorConfig::default().check().unwrap();
    }

    #[test]
    fn test_rho_max_bounds_are_exclusive() {
        for bad in [0.0, 1.0, 1.5, -0.1] {
            let cfg = GovernorConfig {
                rho_max: bad,
                ..Default::default()
            };
            let err = cfg.check().unwrap_err();
            match err {
                DomainError::Validation { field, .. } => assert_eq!(field, "rho_max"),
                other => panic!("expected Validation, got {other:?}"),
            }
        }
        let cfg = GovernorConfig {
            rho_max: 0.999,
            ..Default::default()
        };
        cfg.check().unwrap();
    }

    #[test]
    fn test_energy_multiplier_bounds_are_inclusive() {
        for ok in [1.0, 2.5, 4.0] {
            let cfg = GovernorConfig {
                energy_multiplier: ok,
                ..Default::default()
            };
            cfg.check().unwrap();
        }
        for bad in [0.99, 4.01] {
            let cfg = GovernorConfig {
                energy_multiplier: bad,
                ..Default::default()
            };
            assert!(cfg.check().is_err());
        }
    }

    #[test]
    fn test_partial_update_preserves_other_fields() {
        let base = GovernorConfig::default();
        let update = ConfigUpdate {
            rho_max: Some(0.5),
            energy_multiplier: None,
        };
        let next = base.with_update(&update);
        assert_eq!(next.rho_max, 0.5);
        assert_eq!(next.energy_multiplier, base.energy_multiplier);
    }

    #[test]
    fn test_unknown_update_field_is_rejected() {
        let result: Result<ConfigUpdate, _> = serde_json::from_str(r#"{"rho_mx": 0.5}"#);
        assert!(result.is_err());
    }
}
