//! Objective policies.

use crate::gadgets;
use crate::linear::{LinExpr, VarKey};
use crate::model::{Model, ModelError};
use crate::variables::VariableSets;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectivePolicy {
    /// Any feasible repair.
    Feasibility,
    /// Fewest statement/tuple error indicators.
    MinimizeErrors,
    /// Smallest total change to logged constants.
    #[default]
    MinimizeDeviation,
    /// Weighted sum of the two.
    Combined,
}

impl fmt::Display for ObjectivePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectivePolicy::Feasibility => "feasibility",
            ObjectivePolicy::MinimizeErrors => "minimize-errors",
            ObjectivePolicy::MinimizeDeviation => "minimize-deviation",
            ObjectivePolicy::Combined => "combined",
        };
        f.write_str(s)
    }
}

/// `[objective]` section of `logfix.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectiveConfig {
    pub policy: ObjectivePolicy,
    pub error_weight: f64,
    pub deviation_weight: f64,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            policy: ObjectivePolicy::default(),
            error_weight: 1.0,
            deviation_weight: 1.0,
        }
    }
}

/// Add the objective selected by `config` to `model`.
///
/// Deviation policies declare one `dev_*` variable per correctable
/// literal; pinned literals cannot move and contribute nothing.
pub fn install(model: &mut Model, sets: &VariableSets, config: &ObjectiveConfig) -> Result<(), ModelError> {
    let errors = || {
        sets.error_keys()
            .fold(LinExpr::zero(), |acc, e| acc + LinExpr::var(e))
    };
    let objective = match config.policy {
        ObjectivePolicy::Feasibility => return Ok(()),
        ObjectivePolicy::MinimizeErrors => errors(),
        ObjectivePolicy::MinimizeDeviation => deviations(model, sets)?,
        ObjectivePolicy::Combined => {
            errors() * config.error_weight + deviations(model, sets)? * config.deviation_weight
        }
    };
    model.set_objective(objective);
    Ok(())
}

fn deviations(model: &mut Model, sets: &VariableSets) -> Result<LinExpr, ModelError> {
    let mut total = LinExpr::zero();
    for lit in sets.correctable() {
        let d = model.absorb(gadgets::absolute_deviation(
            VarKey::Deviation(lit.slot.clone()),
            &LinExpr::var(lit.key.clone()),
            lit.original,
        ))?;
        total = total + LinExpr::var(d);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_names_are_kebab_case() {
        let config: ObjectiveConfig =
            serde_json::from_str(r#"{"policy": "minimize-errors", "error_weight": 2.0}"#).unwrap();
        assert_eq!(config.policy, ObjectivePolicy::MinimizeErrors);
        assert_eq!(config.deviation_weight, 1.0);
        assert_eq!(config.policy.to_string(), "minimize-errors");
    }
}
