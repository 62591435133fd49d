//! Encoding parameters and their validation.
//!
//! The encoder needs four numbers: the domain bound `D` every live value
//! stays within, the ghost value `G` absent tuples carry, the big-M
//! constant and the strictness gap. Users may pin any of them in
//! `logfix.toml`; unset ones are derived from the magnitude of the data.
//! Resolution fails rather than silently producing an unsound encoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("safety factor must be a finite number >= 1, got {0}")]
    SafetyFactor(f64),
    #[error("epsilon {0} must be positive and narrower than both the domain bound and the closest value to a WHERE constant")]
    Epsilon(f64),
    #[error("domain bound must be positive and finite, got {0}")]
    Domain(f64),
    #[error("ghost value {ghost} must exceed the domain bound {domain}")]
    GhostInsideDomain { ghost: f64, domain: f64 },
    #[error("big-M {big_m} is too small for this input; at least {required} is needed")]
    BigMTooSmall { big_m: f64, required: f64 },
}

/// `[encoding]` section of `logfix.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    /// Domain bound as a multiple of the largest observed magnitude.
    pub safety_factor: f64,
    /// Explicit domain bound; overrides `safety_factor`.
    pub domain: Option<f64>,
    pub ghost: Option<f64>,
    pub big_m: Option<f64>,
    /// Gap that makes `<` and `>` strict. A value strictly inside
    /// `(c - epsilon, c)` or `(c, c + epsilon)` of a WHERE constant `c`
    /// satisfies neither branch of the comparison, so resolution rejects
    /// an epsilon at or above the narrowest such distance in the input.
    pub epsilon: f64,
    /// Integer-valued literals become integer variables.
    pub integral_literals: bool,
    /// Anchor tuples nobody complained about to their final-state row.
    pub anchor_unreported: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            safety_factor: 10.0,
            domain: None,
            ghost: None,
            big_m: None,
            epsilon: 1e-3,
            integral_literals: true,
            anchor_unreported: true,
        }
    }
}

/// Largest values seen in an input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Magnitudes {
    /// Largest `|value|` over states, complaints and literals.
    pub data: f64,
    /// Largest factor a SET expression scales an attribute by.
    pub coefficient: f64,
    /// Product over UPDATE statements of the largest factor each one
    /// scales by; intermediate values can reach `data * growth`.
    pub growth: f64,
    /// Smallest non-zero distance between a state value and a WHERE
    /// constant compared against its attribute.
    pub gap: f64,
}

impl Default for Magnitudes {
    fn default() -> Self {
        Self {
            data: 0.0,
            coefficient: 1.0,
            growth: 1.0,
            gap: f64::INFINITY,
        }
    }
}

impl Magnitudes {
    pub fn observe(&mut self, value: f64) {
        if value.is_finite() {
            self.data = self.data.max(value.abs());
        }
    }

    pub fn observe_coefficient(&mut self, factor: f64) {
        if factor.is_finite() {
            self.coefficient = self.coefficient.max(factor.abs());
        }
    }

    pub fn observe_gap(&mut self, value: f64, constant: f64) {
        let d = (value - constant).abs();
        if d.is_finite() && d > 0.0 {
            self.gap = self.gap.min(d);
        }
    }

    /// Record that one statement scales values by up to `factor`. Factors
    /// of magnitude at most one never widen the range.
    pub fn observe_growth(&mut self, factor: f64) {
        if factor.abs() > 1.0 {
            self.growth *= factor.abs();
        }
    }
}

/// Resolved numeric parameters of one encoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EncodingParams {
    pub domain: f64,
    pub ghost: f64,
    pub big_m: f64,
    pub epsilon: f64,
}

impl EncodingParams {
    /// Smallest big-M that keeps every gadget exact.
    ///
    /// The widest operand is a SET expression evaluated on a ghost tuple,
    /// `coefficient * (ghost + domain)`, and comparisons span twice that.
    pub fn required_big_m(domain: f64, ghost: f64, coefficient: f64) -> f64 {
        2.0 * coefficient.max(1.0) * (ghost + domain)
    }
}

impl EncodingConfig {
    pub fn resolve(&self, magnitudes: &Magnitudes) -> Result<EncodingParams, ConfigError> {
        if !self.safety_factor.is_finite() || self.safety_factor < 1.0 {
            return Err(ConfigError::SafetyFactor(self.safety_factor));
        }
        let domain = match self.domain {
            Some(d) => d,
            None => magnitudes.data.max(1.0) * self.safety_factor * magnitudes.growth,
        };
        if !domain.is_finite() || domain <= 0.0 || domain < magnitudes.data {
            return Err(ConfigError::Domain(domain));
        }
        if !self.epsilon.is_finite()
            || self.epsilon <= 0.0
            || self.epsilon >= domain
            || self.epsilon >= magnitudes.gap
        {
            return Err(ConfigError::Epsilon(self.epsilon));
        }
        let ghost = self.ghost.unwrap_or(2.0 * domain);
        if !ghost.is_finite() || ghost <= domain {
            return Err(ConfigError::GhostInsideDomain { ghost, domain });
        }
        let required = EncodingParams::required_big_m(domain, ghost, magnitudes.coefficient);
        let big_m = self.big_m.unwrap_or(required);
        if !big_m.is_finite() || big_m < required {
            return Err(ConfigError::BigMTooSmall { big_m, required });
        }
        Ok(EncodingParams {
            domain,
            ghost,
            big_m,
            epsilon: self.epsilon,
        })
    }
}
