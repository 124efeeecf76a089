//! Best-improvement hill climbing over the mixed neighborhood.
//!
//! Each iteration enumerates every feasible neighbor, re-prices each
//! snapshot, and moves to the best strict improvement. Gains below the
//! configured significance threshold still move the search but feed the
//! stagnation counter; the loop stops on the adaptive stagnation bound, on
//! convergence (five consecutive iterations gaining less than 0.1% total),
//! on the iteration cap, or on the wall-clock deadline.
//!
//! The neighborhood is deterministic and ties break on enumeration order,
//! so identical inputs always climb to the identical schedule.

use std::time::Instant;

use cropalloc_core::{Diagnostics, OptimizationConfig, PlanResult, Solution};

use crate::candidates::CandidatePool;
use crate::metrics::reprice_solution;
use crate::neighborhood::generate_neighbors;
use crate::problem::ProblemIndex;

/// Relative gain over a convergence window below which the climb is
/// considered settled.
const CONVERGENCE_RATIO: f64 = 0.001;
/// Iterations the convergence window spans.
const CONVERGENCE_WINDOW: usize = 5;

pub fn run(
    initial: &Solution,
    pool: &CandidatePool,
    index: &ProblemIndex,
    config: &OptimizationConfig,
    deadline: Option<Instant>,
    diag: &mut Diagnostics,
) -> PlanResult<Solution> {
    let mut current = reprice_solution(initial, index)?;
    let mut current_profit = current.total_profit();

    let stagnation_bound = 10.max(config.max_no_improvement.min(pool.len() / 2));
    let mut no_improvement = 0usize;
    let mut profit_history = vec![current_profit];

    for iteration in 0..config.max_local_search_iterations {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            diag.add_warning("deadline", "wall-clock limit reached during hill climbing");
            break;
        }

        let neighbors = generate_neighbors(&current, pool, index, config)?;
        let mut best: Option<(f64, Solution)> = None;
        for neighbor in neighbors {
            let priced = reprice_solution(&neighbor, index)?;
            let profit = priced.total_profit();
            if best.as_ref().map_or(true, |(top, _)| profit > *top) {
                best = Some((profit, priced));
            }
        }

        let Some((neighbor_profit, neighbor)) = best else {
            break;
        };
        if neighbor_profit <= current_profit {
            // The neighborhood is deterministic; a non-improving sweep
            // cannot improve on repetition.
            tracing::debug!(iteration, profit = current_profit, "local optimum reached");
            break;
        }

        let gain = neighbor_profit - current_profit;
        let significant = gain >= config.improvement_threshold_ratio * current_profit.abs().max(1.0);
        current = neighbor;
        current_profit = neighbor_profit;
        if significant {
            no_improvement = 0;
        } else {
            no_improvement += 1;
        }
        profit_history.push(current_profit);
        tracing::trace!(iteration, profit = current_profit, gain, "accepted neighbor");

        if no_improvement >= stagnation_bound {
            tracing::debug!(iteration, "stagnation bound reached");
            break;
        }
        if profit_history.len() > CONVERGENCE_WINDOW {
            let before = profit_history[profit_history.len() - 1 - CONVERGENCE_WINDOW];
            let window_gain = current_profit - before;
            if window_gain <= CONVERGENCE_RATIO * before.abs().max(1.0) {
                tracing::debug!(iteration, "converged");
                break;
            }
        }
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates;
    use crate::feasibility::check_solution;
    use crate::phenology::PhenologyCache;
    use crate::problem::validate_problem;
    use crate::test_utils::sample_problem;

    fn setup(problem: &crate::PlanProblem) -> (CandidatePool, crate::ProblemIndex) {
        let index = validate_problem(problem).unwrap();
        let cache = PhenologyCache::new();
        let pool = candidates::generate(&index, &problem.weather, &cache, &problem.config).unwrap();
        (pool, index)
    }

    #[test]
    fn test_never_worsens_the_initial_solution() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        let (pool, index) = setup(&problem);
        let initial = crate::greedy::schedule(&pool, &index, &Solution::new()).unwrap();
        let initial_profit = initial.total_profit();

        let mut diag = Diagnostics::new();
        let improved = run(&initial, &pool, &index, &problem.config, None, &mut diag).unwrap();
        assert!(improved.total_profit() >= initial_profit - 1e-9);
        assert!(check_solution(&improved, &index).is_ok());
    }

    #[test]
    fn test_improves_a_deliberately_poor_start() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        let (pool, index) = setup(&problem);

        // Start from a single quarter-area allocation; inserts and quantity
        // adjustments have obvious room.
        let field = index.fields[0].clone();
        let quarter = pool
            .iter()
            .find(|sc| sc.candidate.area_used < 300.0)
            .expect("quarter-area candidate");
        let mut poor = Solution::new();
        poor.push_candidate(&quarter.candidate, &field);
        let poor = reprice_solution(&poor, &index).unwrap();

        let mut diag = Diagnostics::new();
        let improved = run(&poor, &pool, &index, &problem.config, None, &mut diag).unwrap();
        assert!(improved.total_profit() > poor.total_profit());
    }

    #[test]
    fn test_deterministic_given_identical_inputs() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        let (pool, index) = setup(&problem);
        let initial = crate::greedy::schedule(&pool, &index, &Solution::new()).unwrap();

        let mut diag = Diagnostics::new();
        let first = run(&initial, &pool, &index, &problem.config, None, &mut diag).unwrap();
        let second = run(&initial, &pool, &index, &problem.config, None, &mut diag).unwrap();
        assert_eq!(first, second);
    }
}
