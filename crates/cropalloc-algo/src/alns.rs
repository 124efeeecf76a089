//! Adaptive Large Neighborhood Search.
//!
//! Each iteration selects a destroy and a repair operator by roulette wheel
//! over adaptive weights, tears a fraction of the current schedule out,
//! rebuilds it from the pre-computed candidate pool, and accepts the result
//! under a simulated-annealing criterion. Operator weights decay toward
//! their recent scores: finding a new global best pays the most, improving
//! the current solution less, and merely being accepted a token amount.
//!
//! Destroy operators: random, worst-profit, related (same crop, same field,
//! temporally close), whole-field slice, and time slice. Repair operators:
//! greedy insertion and 2-regret insertion.
//!
//! All randomness flows from a ChaCha generator seeded by the config, so a
//! run is reproducible bit for bit.

use std::time::Instant;

use chrono::Duration;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use cropalloc_core::{CropAllocation, Diagnostics, OptimizationConfig, PlanResult, Solution};

use crate::candidates::CandidatePool;
use crate::feasibility::window_fits;
use crate::metrics::{price_allocation, reprice_solution, MetricContext};
use crate::problem::ProblemIndex;

/// Reward for discovering a new global best.
const SIGMA_NEW_BEST: f64 = 33.0;
/// Reward for improving on the current solution.
const SIGMA_IMPROVED: f64 = 9.0;
/// Reward for being accepted while worse than the current solution.
const SIGMA_ACCEPTED: f64 = 3.0;
/// Weight retention per update; the rest tracks the fresh score.
const WEIGHT_DECAY: f64 = 0.8;
/// Operator weights never fall below this, keeping every operator drawable.
const WEIGHT_FLOOR: f64 = 0.01;
/// Multiplicative cooling per iteration.
const COOLING_RATE: f64 = 0.9995;
/// Initial temperature as a fraction of the initial profit magnitude.
const INITIAL_TEMP_RATIO: f64 = 0.05;
/// Width of the window removed by the time-slice destroy operator.
const TIME_SLICE_WIDTH_DAYS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DestroyOp {
    Random,
    Worst,
    Related,
    FieldSlice,
    TimeSlice,
}

const DESTROY_OPS: [DestroyOp; 5] = [
    DestroyOp::Random,
    DestroyOp::Worst,
    DestroyOp::Related,
    DestroyOp::FieldSlice,
    DestroyOp::TimeSlice,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepairOp {
    GreedyInsert,
    RegretInsert,
}

const REPAIR_OPS: [RepairOp; 2] = [RepairOp::GreedyInsert, RepairOp::RegretInsert];

/// Roulette-wheel operator selection with decaying adaptive weights.
struct OperatorWeights {
    weights: Vec<f64>,
}

impl OperatorWeights {
    fn new(count: usize) -> Self {
        Self {
            weights: vec![1.0; count],
        }
    }

    fn select(&self, rng: &mut ChaCha8Rng) -> usize {
        let total: f64 = self.weights.iter().sum();
        let mut target = rng.gen::<f64>() * total;
        for (i, w) in self.weights.iter().enumerate() {
            target -= w;
            if target <= 0.0 {
                return i;
            }
        }
        self.weights.len() - 1
    }

    fn update(&mut self, index: usize, score: f64) {
        let updated = WEIGHT_DECAY * self.weights[index] + (1.0 - WEIGHT_DECAY) * score;
        self.weights[index] = updated.max(WEIGHT_FLOOR);
    }
}

pub fn run(
    initial: &Solution,
    pool: &CandidatePool,
    index: &ProblemIndex,
    config: &OptimizationConfig,
    deadline: Option<Instant>,
    diag: &mut Diagnostics,
) -> PlanResult<Solution> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.rng_seed);
    let mut current = reprice_solution(initial, index)?;
    let mut current_profit = current.total_profit();
    let mut best = current.clone();
    let mut best_profit = current_profit;

    let mut temperature = INITIAL_TEMP_RATIO * current_profit.abs().max(1.0);
    let mut destroy_weights = OperatorWeights::new(DESTROY_OPS.len());
    let mut repair_weights = OperatorWeights::new(REPAIR_OPS.len());

    for iteration in 0..config.alns_iterations {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            diag.add_warning("deadline", "wall-clock limit reached during ALNS");
            break;
        }

        let destroy_idx = destroy_weights.select(&mut rng);
        let repair_idx = repair_weights.select(&mut rng);

        let (removed, partial) = destroy(
            DESTROY_OPS[destroy_idx],
            &current,
            index,
            config,
            &mut rng,
        )?;
        let repaired = repair(
            REPAIR_OPS[repair_idx],
            partial,
            &removed,
            pool,
            index,
            &mut rng,
        )?;
        let candidate_solution = reprice_solution(&repaired, index)?;
        let candidate_profit = candidate_solution.total_profit();

        let (accepted, score) = if candidate_profit > best_profit {
            (true, SIGMA_NEW_BEST)
        } else if candidate_profit > current_profit {
            (true, SIGMA_IMPROVED)
        } else {
            let probability =
                ((candidate_profit - current_profit) / temperature.max(1e-9)).exp();
            if rng.gen::<f64>() < probability {
                (true, SIGMA_ACCEPTED)
            } else {
                (false, 0.0)
            }
        };

        if accepted {
            current = candidate_solution;
            current_profit = candidate_profit;
            if current_profit > best_profit {
                best = current.clone();
                best_profit = current_profit;
                tracing::debug!(iteration, profit = best_profit, "new best solution");
            }
        }

        destroy_weights.update(destroy_idx, score);
        repair_weights.update(repair_idx, score);
        temperature *= COOLING_RATE;
    }

    Ok(best)
}

/// Remove a slice of the current solution, returning the removed
/// allocations and the residual.
fn destroy(
    op: DestroyOp,
    solution: &Solution,
    index: &ProblemIndex,
    config: &OptimizationConfig,
    rng: &mut ChaCha8Rng,
) -> PlanResult<(Vec<CropAllocation>, Solution)> {
    if solution.is_empty() {
        return Ok((Vec::new(), solution.clone()));
    }
    let count = ((solution.len() as f64 * config.alns_removal_rate).ceil() as usize)
        .clamp(1, solution.len());

    let victim_ids: Vec<cropalloc_core::AllocationId> = match op {
        DestroyOp::Random => {
            let mut ids: Vec<_> = solution.allocations().iter().map(|a| a.id).collect();
            ids.shuffle(rng);
            ids.truncate(count);
            ids
        }
        DestroyOp::Worst => {
            let mut scored: Vec<_> = solution
                .allocations()
                .iter()
                .map(|a| (a.profit.unwrap_or(0.0), a.id))
                .collect();
            scored.sort_by(|(pa, ia), (pb, ib)| {
                pa.partial_cmp(pb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(ia.cmp(ib))
            });
            scored.into_iter().take(count).map(|(_, id)| id).collect()
        }
        DestroyOp::Related => {
            let allocations = solution.allocations();
            let anchor = &allocations[rng.gen_range(0..allocations.len())];
            let mut scored: Vec<_> = allocations
                .iter()
                .filter(|a| a.id != anchor.id)
                .map(|a| {
                    let mut relatedness = 0.0;
                    if a.crop_id == anchor.crop_id {
                        relatedness += 1.0;
                    }
                    if a.field_id == anchor.field_id {
                        relatedness += 1.0;
                    }
                    let gap = (a.start_date - anchor.start_date).num_days().abs();
                    relatedness += 1.0 / (1.0 + gap as f64 / 30.0);
                    (relatedness, a.id)
                })
                .collect();
            scored.sort_by(|(ra, ia), (rb, ib)| {
                rb.partial_cmp(ra)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(ia.cmp(ib))
            });
            let mut ids = vec![anchor.id];
            ids.extend(scored.into_iter().take(count.saturating_sub(1)).map(|(_, id)| id));
            ids
        }
        DestroyOp::FieldSlice => {
            let occupied: Vec<_> = index
                .fields
                .iter()
                .filter(|f| solution.allocations().iter().any(|a| a.field_id == f.id))
                .collect();
            let field = occupied[rng.gen_range(0..occupied.len())];
            solution
                .allocations()
                .iter()
                .filter(|a| a.field_id == field.id)
                .map(|a| a.id)
                .collect()
        }
        DestroyOp::TimeSlice => {
            let span = index.horizon.num_days();
            let offset = rng.gen_range(0..span);
            let center = index.horizon.start + Duration::days(offset);
            let from = center - Duration::days(TIME_SLICE_WIDTH_DAYS / 2);
            let to = center + Duration::days(TIME_SLICE_WIDTH_DAYS / 2);
            let ids: Vec<_> = solution
                .allocations()
                .iter()
                .filter(|a| a.start_date <= to && a.completion_date >= from)
                .map(|a| a.id)
                .collect();
            if ids.is_empty() {
                // An empty slice would make the iteration a no-op; fall back
                // to one random victim.
                let all: Vec<_> = solution.allocations().iter().map(|a| a.id).collect();
                vec![all[rng.gen_range(0..all.len())]]
            } else {
                ids
            }
        }
    };

    let mut residual = solution.clone();
    let mut removed = Vec::with_capacity(victim_ids.len());
    for id in victim_ids {
        if let Some(allocation) = residual.remove(id) {
            removed.push(allocation);
        }
    }
    Ok((removed, residual))
}

/// Feasible insertion options for one removed item, best profit first.
fn insertion_options(
    removed: &CropAllocation,
    solution: &Solution,
    pool: &CandidatePool,
    index: &ProblemIndex,
) -> PlanResult<Vec<(f64, usize)>> {
    let mut options = Vec::new();
    for (i, sc) in pool.iter().enumerate() {
        if sc.candidate.crop_id != removed.crop_id {
            continue;
        }
        let field = index.field(sc.candidate.field_id)?;
        if !window_fits(
            solution,
            field,
            sc.candidate.start_date,
            sc.candidate.completion_date,
            None,
        ) {
            continue;
        }
        let crop = index.crop(sc.candidate.crop_id)?;
        let ctx = MetricContext {
            solution,
            index,
            exclude: None,
        };
        let metrics = price_allocation(
            &ctx,
            field,
            crop,
            sc.candidate.start_date,
            sc.candidate.growth_days,
            sc.candidate.area_used,
        );
        if metrics.profit > 0.0 {
            options.push((metrics.profit, i));
        }
    }
    options.sort_by(|(pa, ia), (pb, ib)| {
        pb.partial_cmp(pa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(ia.cmp(ib))
    });
    Ok(options)
}

/// Insert a pool candidate and price it against the working solution, so a
/// later insertion in the same repair sees the cap demand it consumed.
fn insert_candidate(
    solution: &mut Solution,
    pool: &CandidatePool,
    pool_idx: usize,
    index: &ProblemIndex,
) -> PlanResult<()> {
    let sc = pool
        .get(pool_idx)
        .ok_or_else(|| cropalloc_core::PlanError::Invariant("candidate index out of range".into()))?;
    let field = index.field(sc.candidate.field_id)?;
    let crop = index.crop(sc.candidate.crop_id)?;
    let ctx = MetricContext {
        solution,
        index,
        exclude: None,
    };
    let metrics = price_allocation(
        &ctx,
        field,
        crop,
        sc.candidate.start_date,
        sc.candidate.growth_days,
        sc.candidate.area_used,
    );
    let id = solution.push_candidate(&sc.candidate, field);
    if let Some(allocation) = solution.get_mut(id) {
        allocation.expected_revenue = Some(metrics.revenue);
        allocation.profit = Some(metrics.profit);
    }
    Ok(())
}

/// Rebuild the schedule after a destroy step.
fn repair(
    op: RepairOp,
    mut solution: Solution,
    removed: &[CropAllocation],
    pool: &CandidatePool,
    index: &ProblemIndex,
    rng: &mut ChaCha8Rng,
) -> PlanResult<Solution> {
    match op {
        RepairOp::GreedyInsert => {
            let mut items: Vec<&CropAllocation> = removed.iter().collect();
            items.shuffle(rng);
            for item in items {
                let options = insertion_options(item, &solution, pool, index)?;
                if let Some(&(_, pool_idx)) = options.first() {
                    insert_candidate(&mut solution, pool, pool_idx, index)?;
                }
            }
        }
        RepairOp::RegretInsert => {
            let mut pending: Vec<&CropAllocation> = removed.iter().collect();
            while !pending.is_empty() {
                // 2-regret: the item whose best option most outruns its
                // runner-up goes first; items with a single option go ahead
                // of everything.
                let mut choice: Option<(f64, f64, usize, usize)> = None;
                for (item_idx, item) in pending.iter().enumerate() {
                    let options = insertion_options(item, &solution, pool, index)?;
                    let Some(&(best_profit, pool_idx)) = options.first() else {
                        continue;
                    };
                    let regret = match options.get(1) {
                        Some(&(second_profit, _)) => best_profit - second_profit,
                        None => f64::INFINITY,
                    };
                    let better = match &choice {
                        None => true,
                        Some((top_regret, top_profit, _, _)) => {
                            regret > *top_regret
                                || (regret == *top_regret && best_profit > *top_profit)
                        }
                    };
                    if better {
                        choice = Some((regret, best_profit, item_idx, pool_idx));
                    }
                }
                let Some((_, _, item_idx, pool_idx)) = choice else {
                    break;
                };
                insert_candidate(&mut solution, pool, pool_idx, index)?;
                pending.remove(item_idx);
            }
        }
    }
    Ok(solution)
}
