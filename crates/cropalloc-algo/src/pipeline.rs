//! Pipeline orchestration: validate, generate, schedule, improve, gate.
//!
//! [`optimize`] is the single entry point. It validates the request, applies
//! any adjustment instructions to the seed solution, generates the candidate
//! pool, runs the configured initial scheduler and improvement driver, and
//! finally re-validates the produced schedule against every invariant before
//! assembling the result. A schedule that fails the final gate is a bug in
//! the schedulers and fails the call.

use std::time::{Duration, Instant};

use serde::Serialize;

use cropalloc_core::{
    Algorithm, CropAllocation, Diagnostics, FieldId, PlanResult, Solution, SolutionStats,
};

use crate::adjust::{self, AppliedMove, RejectedMove};
use crate::candidates;
use crate::feasibility;
use crate::metrics::reprice_solution;
use crate::phenology::PhenologyCache;
use crate::problem::{validate_problem, PlanProblem};
use crate::{alns, dp, greedy, hill_climb};

/// Allocations of one field in the final schedule.
#[derive(Debug, Clone, Serialize)]
pub struct FieldPlan {
    pub field_id: FieldId,
    pub field_name: String,
    pub allocations: Vec<CropAllocation>,
}

/// The result payload returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    /// Opaque identifier, deterministic for identical inputs
    pub optimization_id: String,
    /// Human-readable pipeline descriptor, e.g. "DP+HillClimbing"
    pub algorithm_used: String,
    pub total_cost: f64,
    pub total_revenue: f64,
    pub total_profit: f64,
    pub field_plans: Vec<FieldPlan>,
    pub stats: SolutionStats,
    pub diagnostics: Diagnostics,
    /// Adjustment mode: instructions that were applied
    pub applied_moves: Vec<AppliedMove>,
    /// Adjustment mode: instructions that were rejected, with reasons
    pub rejected_moves: Vec<RejectedMove>,
    /// The full schedule, usable as a seed for a later adjustment run
    pub solution: Solution,
}

/// Run the full optimization pipeline on a request.
pub fn optimize(problem: &PlanProblem) -> PlanResult<OptimizationResult> {
    let index = validate_problem(problem)?;
    let config = &problem.config;
    let deadline = config
        .time_limit_seconds
        .map(|s| Instant::now() + Duration::from_secs_f64(s));
    let mut diag = Diagnostics::new();
    let cache = PhenologyCache::new();

    tracing::info!(
        fields = index.fields.len(),
        crops = index.crops.len(),
        horizon_days = index.horizon.num_days(),
        "optimization started"
    );

    // Adjustment mode: apply user instructions to the seed first.
    let adjustment = problem.seed_solution.is_some();
    let (seed, applied_moves, rejected_moves) = match &problem.seed_solution {
        Some(seed_solution) => {
            let outcome = adjust::apply_instructions(
                seed_solution,
                &problem.instructions,
                &index,
                &problem.weather,
                &cache,
                config.gdd_model,
            )?;
            for rejection in &outcome.rejected {
                diag.add_warning_with_entity(
                    "instruction",
                    format!("instruction rejected: {:?}", rejection.reason),
                    format!("{}", rejection.instruction.allocation_id()),
                );
            }
            (outcome.solution, outcome.applied, outcome.rejected)
        }
        None => (Solution::new(), Vec::new(), Vec::new()),
    };

    let pool = candidates::generate(&index, &problem.weather, &cache, config)?;
    if pool.is_empty() && seed.is_empty() {
        diag.add_warning(
            "candidates",
            "no (field, crop) pair produced a viable candidate; returning an empty schedule",
        );
    }

    let initial = match config.algorithm {
        Algorithm::Dp => dp::schedule(&pool, &index, &seed, &mut diag)?,
        Algorithm::Greedy => greedy::schedule(&pool, &index, &seed)?,
    };
    tracing::debug!(
        allocations = initial.len(),
        profit = initial.total_profit(),
        "initial schedule built"
    );

    let improved = if config.enable_local_search && !pool.is_empty() {
        if config.enable_alns {
            alns::run(&initial, &pool, &index, config, deadline, &mut diag)?
        } else {
            hill_climb::run(&initial, &pool, &index, config, deadline, &mut diag)?
        }
    } else {
        initial
    };

    let solution = reprice_solution(&improved, &index)?;

    // Schedulers must never emit an infeasible schedule; treat any failure
    // here as an internal invariant violation.
    feasibility::check_solution(&solution, &index)?;
    feasibility::check_phenology(&solution, &index, &problem.weather, &cache, config.gdd_model)?;

    let descriptor = describe_pipeline(config, adjustment);
    let optimization_id = optimization_id(problem, &descriptor);
    let stats = SolutionStats::compute(&solution, &index.fields, &index.horizon);

    tracing::info!(
        optimization_id = %optimization_id,
        algorithm = %descriptor,
        profit = solution.total_profit(),
        allocations = solution.len(),
        "optimization complete"
    );

    let field_plans = index
        .fields
        .iter()
        .map(|field| FieldPlan {
            field_id: field.id,
            field_name: field.name.clone(),
            allocations: solution.in_field(field.id).into_iter().cloned().collect(),
        })
        .collect();

    Ok(OptimizationResult {
        optimization_id,
        algorithm_used: descriptor,
        total_cost: solution.total_cost(),
        total_revenue: solution.total_revenue(),
        total_profit: solution.total_profit(),
        field_plans,
        stats,
        diagnostics: diag,
        applied_moves,
        rejected_moves,
        solution,
    })
}

fn describe_pipeline(config: &cropalloc_core::OptimizationConfig, adjustment: bool) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if adjustment {
        parts.push("adjust");
    }
    parts.push(match config.algorithm {
        Algorithm::Dp => "DP",
        Algorithm::Greedy => "Greedy",
    });
    if config.enable_local_search {
        parts.push(if config.enable_alns {
            "ALNS"
        } else {
            "HillClimbing"
        });
    }
    parts.join("+")
}

/// Deterministic opaque run identifier: identical inputs yield identical
/// ids, so idempotence extends to the result envelope.
fn optimization_id(problem: &PlanProblem, descriptor: &str) -> String {
    let key = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        descriptor,
        problem.config.rng_seed,
        problem.fields.len(),
        problem.crops.len(),
        problem.horizon.start,
        problem.horizon.end,
        problem.instructions.len(),
    );
    format!("plan-{:016x}", fnv1a(key.as_bytes()))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_problem;

    #[test]
    fn test_descriptor_formats() {
        let mut config = cropalloc_core::OptimizationConfig::default();
        assert_eq!(describe_pipeline(&config, false), "DP+HillClimbing");
        config.enable_alns = true;
        config.algorithm = Algorithm::Greedy;
        assert_eq!(describe_pipeline(&config, true), "adjust+Greedy+ALNS");
        config.enable_local_search = false;
        assert_eq!(describe_pipeline(&config, false), "Greedy");
    }

    #[test]
    fn test_optimization_id_is_stable() {
        let problem = sample_problem();
        let a = optimization_id(&problem, "DP+HillClimbing");
        let b = optimization_id(&problem, "DP+HillClimbing");
        assert_eq!(a, b);
        let c = optimization_id(&problem, "Greedy");
        assert_ne!(a, c);
    }

    #[test]
    fn test_optimize_smoke() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        let result = optimize(&problem).unwrap();
        assert_eq!(result.algorithm_used, "DP+HillClimbing");
        assert!(result.total_profit > 0.0);
        assert_eq!(result.field_plans.len(), 1);
        assert_eq!(
            result.field_plans[0].allocations.len(),
            result.solution.len()
        );
        assert!(result.optimization_id.starts_with("plan-"));
    }

    #[test]
    fn test_result_serializes() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        let result = optimize(&problem).unwrap();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("optimization_id"));
        assert!(json.contains("field_plans"));
    }
}
