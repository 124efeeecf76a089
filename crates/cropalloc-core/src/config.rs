//! Optimization configuration.
//!
//! Every behavioral knob of the pipeline travels in [`OptimizationConfig`];
//! there is no ambient state. The structure is validated once at pipeline
//! entry via [`OptimizationConfig::validate`].

use serde::{Deserialize, Serialize};

use crate::{PlanError, PlanResult};

/// Initial scheduler choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Per-field weighted interval scheduling DP (exact per field)
    Dp,
    /// Profit-rate greedy acceptance
    Greedy,
}

/// Daily GDD accumulation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GddModel {
    /// Temperature-efficiency model: development slows outside the optimal
    /// band and stops at the base and arrest temperatures
    Modified,
    /// Legacy linear model: `max(0, t_mean - base)`
    Linear,
}

/// Behavioral knobs for a single optimization run. All fields have defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Initial scheduler
    pub algorithm: Algorithm,
    /// Daily GDD model used by phenology
    pub gdd_model: GddModel,
    /// Run the improvement phase after initial scheduling
    pub enable_local_search: bool,
    /// Use ALNS instead of hill climbing for the improvement phase
    pub enable_alns: bool,
    /// Hill-climbing iteration cap
    pub max_local_search_iterations: usize,
    /// Hill-climbing early stop after this many non-improving iterations
    pub max_no_improvement: usize,
    /// ALNS iteration count
    pub alns_iterations: usize,
    /// Fraction of the solution removed per ALNS destroy step, in (0, 1)
    pub alns_removal_rate: f64,
    /// Drop candidates whose baseline profit rate is non-positive
    pub enable_candidate_filtering: bool,
    /// Fan candidate generation out over (field, crop) pairs
    pub enable_parallel_candidate_generation: bool,
    /// Hill climbing treats gains of at least this fraction of the current
    /// profit as significant (resets the stagnation counter)
    pub improvement_threshold_ratio: f64,
    /// Area fractions emitted per viable window, each in (0, 1]
    pub quantity_levels: Vec<f64>,
    /// Multipliers tried by the quantity-adjust neighborhood
    pub quantity_adjustment_multipliers: Vec<f64>,
    /// Viable windows retained per (field, crop), best baseline rate first
    pub top_period_candidates_per_pair: usize,
    /// Stride between candidate start dates (1 = every day)
    pub candidate_start_step_days: u64,
    /// Seed for the ALNS pseudo-random generator
    pub rng_seed: u64,
    /// Optional wall-clock budget; on expiry the best solution so far is
    /// returned
    pub time_limit_seconds: Option<f64>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Dp,
            gdd_model: GddModel::Modified,
            enable_local_search: true,
            enable_alns: false,
            max_local_search_iterations: 100,
            max_no_improvement: 20,
            alns_iterations: 2000,
            alns_removal_rate: 0.2,
            enable_candidate_filtering: true,
            enable_parallel_candidate_generation: true,
            improvement_threshold_ratio: 0.001,
            quantity_levels: vec![1.0, 0.75, 0.5, 0.25],
            quantity_adjustment_multipliers: vec![0.8, 0.9, 1.1, 1.2],
            top_period_candidates_per_pair: 4,
            candidate_start_step_days: 1,
            rng_seed: 42,
            time_limit_seconds: None,
        }
    }
}

impl OptimizationConfig {
    /// Validate every knob. Called once at pipeline entry.
    pub fn validate(&self) -> PlanResult<()> {
        if self.quantity_levels.is_empty() {
            return Err(PlanError::Config("quantity_levels must not be empty".into()));
        }
        for &level in &self.quantity_levels {
            if !(level > 0.0 && level <= 1.0) {
                return Err(PlanError::Config(format!(
                    "quantity level {level} outside (0, 1]"
                )));
            }
        }
        for &mult in &self.quantity_adjustment_multipliers {
            if mult <= 0.0 {
                return Err(PlanError::Config(format!(
                    "quantity adjustment multiplier {mult} must be positive"
                )));
            }
        }
        if !(self.alns_removal_rate > 0.0 && self.alns_removal_rate < 1.0) {
            return Err(PlanError::Config(format!(
                "alns_removal_rate {} outside (0, 1)",
                self.alns_removal_rate
            )));
        }
        if self.improvement_threshold_ratio < 0.0 {
            return Err(PlanError::Config(
                "improvement_threshold_ratio must be non-negative".into(),
            ));
        }
        if self.top_period_candidates_per_pair == 0 {
            return Err(PlanError::Config(
                "top_period_candidates_per_pair must be at least 1".into(),
            ));
        }
        if self.candidate_start_step_days == 0 {
            return Err(PlanError::Config(
                "candidate_start_step_days must be at least 1".into(),
            ));
        }
        if let Some(limit) = self.time_limit_seconds {
            if limit <= 0.0 {
                return Err(PlanError::Config(format!(
                    "time_limit_seconds {limit} must be positive"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(OptimizationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_quantity_level() {
        let config = OptimizationConfig {
            quantity_levels: vec![1.5],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = OptimizationConfig {
            quantity_levels: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_removal_rate() {
        for rate in [0.0, 1.0, -0.5] {
            let config = OptimizationConfig {
                alns_removal_rate: rate,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "rate {rate} should be rejected");
        }
    }

    #[test]
    fn test_serde_defaults_fill_missing_fields() {
        let config: OptimizationConfig = serde_json::from_str(r#"{"algorithm":"greedy"}"#).unwrap();
        assert_eq!(config.algorithm, Algorithm::Greedy);
        assert_eq!(config.quantity_levels, vec![1.0, 0.75, 0.5, 0.25]);
        assert!(config.validate().is_ok());
    }
}
