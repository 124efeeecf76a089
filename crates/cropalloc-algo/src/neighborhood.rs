//! Neighborhood operations for local improvement.
//!
//! Seven small moves over a solution snapshot, each yielding zero or more
//! pre-validated neighbor snapshots:
//!
//! - **field swap**: two allocations trade fields, keeping their own windows
//!   and areas
//! - **field move**: relocate an allocation to another field, reusing the
//!   closest pre-computed window there
//! - **crop change**: replace an allocation's crop with the best candidate
//!   of another crop near the same start date
//! - **crop insert**: add the best-rate feasible candidate per (field, crop)
//! - **crop remove**: drop one allocation
//! - **period replace**: move an allocation to one of its pair's other
//!   pre-computed windows
//! - **quantity adjust**: scale an allocation's area by the configured
//!   multipliers, quantized to whole plants
//!
//! Every emitted neighbor already satisfies the fallow, area, and horizon
//! constraints; the driver only re-prices and compares profit. Enumeration
//! order is deterministic, so ties in the driver break stably.

use cropalloc_core::{CropAllocation, OptimizationConfig, PlanResult, Solution};

use crate::candidates::{CandidatePool, ScoredCandidate};
use crate::feasibility::{area_fits, window_fits};
use crate::problem::ProblemIndex;

/// Start dates this close to the original count as "the same slot" for
/// crop-change moves.
pub const CROP_CHANGE_WINDOW_DAYS: i64 = 14;
/// Largest start-date shift tolerated when relocating to another field.
pub const FIELD_MOVE_WINDOW_DAYS: i64 = 28;

/// Generate every feasible neighbor of `solution`.
pub fn generate_neighbors(
    solution: &Solution,
    pool: &CandidatePool,
    index: &ProblemIndex,
    config: &OptimizationConfig,
) -> PlanResult<Vec<Solution>> {
    let mut neighbors = Vec::new();
    field_swaps(solution, index, &mut neighbors)?;
    field_moves(solution, pool, index, &mut neighbors)?;
    crop_changes(solution, pool, index, &mut neighbors)?;
    crop_inserts(solution, pool, index, &mut neighbors)?;
    crop_removes(solution, &mut neighbors);
    period_replaces(solution, pool, index, &mut neighbors)?;
    quantity_adjusts(solution, index, config, &mut neighbors)?;
    Ok(neighbors)
}

/// Rewrite an allocation in place from a candidate, clearing stale prices.
fn replace_from_candidate(allocation: &mut CropAllocation, sc: &ScoredCandidate, daily_cost: f64) {
    allocation.field_id = sc.candidate.field_id;
    allocation.crop_id = sc.candidate.crop_id;
    allocation.start_date = sc.candidate.start_date;
    allocation.completion_date = sc.candidate.completion_date;
    allocation.growth_days = sc.candidate.growth_days;
    allocation.accumulated_gdd = sc.candidate.accumulated_gdd;
    allocation.area_used = sc.candidate.area_used;
    allocation.quantity = sc.candidate.quantity;
    allocation.total_cost = sc.candidate.growth_days as f64 * daily_cost;
    allocation.expected_revenue = None;
    allocation.profit = None;
}

fn field_swaps(
    solution: &Solution,
    index: &ProblemIndex,
    out: &mut Vec<Solution>,
) -> PlanResult<()> {
    let allocations = solution.allocations();
    for i in 0..allocations.len() {
        for j in (i + 1)..allocations.len() {
            let (a, b) = (&allocations[i], &allocations[j]);
            if a.field_id == b.field_id {
                continue;
            }
            let field_a = index.field(a.field_id)?;
            let field_b = index.field(b.field_id)?;
            if !area_fits(field_b, a.area_used) || !area_fits(field_a, b.area_used) {
                continue;
            }

            // Validate against the solution with both participants removed.
            let mut neighbor = solution.clone();
            neighbor.remove(a.id);
            neighbor.remove(b.id);
            if !window_fits(&neighbor, field_b, a.start_date, a.completion_date, None)
                || !window_fits(&neighbor, field_a, b.start_date, b.completion_date, None)
            {
                continue;
            }

            let mut moved_a = a.clone();
            moved_a.field_id = field_b.id;
            moved_a.total_cost = moved_a.growth_days as f64 * field_b.daily_fixed_cost;
            moved_a.expected_revenue = None;
            moved_a.profit = None;
            let mut moved_b = b.clone();
            moved_b.field_id = field_a.id;
            moved_b.total_cost = moved_b.growth_days as f64 * field_a.daily_fixed_cost;
            moved_b.expected_revenue = None;
            moved_b.profit = None;

            neighbor.push(moved_a);
            neighbor.push(moved_b);
            out.push(neighbor);
        }
    }
    Ok(())
}

fn field_moves(
    solution: &Solution,
    pool: &CandidatePool,
    index: &ProblemIndex,
    out: &mut Vec<Solution>,
) -> PlanResult<()> {
    for allocation in solution.allocations() {
        for field in &index.fields {
            if field.id == allocation.field_id {
                continue;
            }

            // Prefer the pre-computed window at the exact start date, else
            // the nearest one within the move tolerance, matching the
            // original quantity as closely as possible.
            let target = pool
                .for_pair(field.id, allocation.crop_id)
                .filter(|sc| {
                    (sc.candidate.start_date - allocation.start_date)
                        .num_days()
                        .abs()
                        <= FIELD_MOVE_WINDOW_DAYS
                })
                .min_by_key(|sc| {
                    (
                        (sc.candidate.start_date - allocation.start_date).num_days().abs(),
                        (sc.candidate.quantity as i64 - allocation.quantity as i64).abs(),
                    )
                });
            let Some(sc) = target else {
                continue;
            };
            if !window_fits(
                solution,
                field,
                sc.candidate.start_date,
                sc.candidate.completion_date,
                Some(allocation.id),
            ) {
                continue;
            }

            let mut neighbor = solution.clone();
            if let Some(moved) = neighbor.get_mut(allocation.id) {
                replace_from_candidate(moved, sc, field.daily_fixed_cost);
            }
            out.push(neighbor);
        }
    }
    Ok(())
}

fn crop_changes(
    solution: &Solution,
    pool: &CandidatePool,
    index: &ProblemIndex,
    out: &mut Vec<Solution>,
) -> PlanResult<()> {
    for allocation in solution.allocations() {
        let field = index.field(allocation.field_id)?;
        for crop in &index.crops {
            if crop.id == allocation.crop_id {
                continue;
            }
            let best = pool
                .for_pair(field.id, crop.id)
                .filter(|sc| {
                    (sc.candidate.start_date - allocation.start_date)
                        .num_days()
                        .abs()
                        <= CROP_CHANGE_WINDOW_DAYS
                })
                .filter(|sc| {
                    window_fits(
                        solution,
                        field,
                        sc.candidate.start_date,
                        sc.candidate.completion_date,
                        Some(allocation.id),
                    )
                })
                .max_by(|a, b| {
                    a.baseline_profit
                        .partial_cmp(&b.baseline_profit)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(b.candidate.start_date.cmp(&a.candidate.start_date))
                });
            let Some(sc) = best else {
                continue;
            };

            let mut neighbor = solution.clone();
            if let Some(changed) = neighbor.get_mut(allocation.id) {
                replace_from_candidate(changed, sc, field.daily_fixed_cost);
            }
            out.push(neighbor);
        }
    }
    Ok(())
}

fn crop_inserts(
    solution: &Solution,
    pool: &CandidatePool,
    index: &ProblemIndex,
    out: &mut Vec<Solution>,
) -> PlanResult<()> {
    // One insertion per (field, crop): the best-rate candidate that fits.
    for field in &index.fields {
        for crop in &index.crops {
            let mut pair: Vec<&ScoredCandidate> = pool.for_pair(field.id, crop.id).collect();
            pair.sort_by(|a, b| {
                b.baseline_rate
                    .partial_cmp(&a.baseline_rate)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.candidate.start_date.cmp(&b.candidate.start_date))
            });
            let fit = pair.into_iter().find(|sc| {
                window_fits(
                    solution,
                    field,
                    sc.candidate.start_date,
                    sc.candidate.completion_date,
                    None,
                )
            });
            if let Some(sc) = fit {
                let mut neighbor = solution.clone();
                neighbor.push_candidate(&sc.candidate, field);
                out.push(neighbor);
            }
        }
    }
    Ok(())
}

fn crop_removes(solution: &Solution, out: &mut Vec<Solution>) {
    for allocation in solution.allocations() {
        let mut neighbor = solution.clone();
        neighbor.remove(allocation.id);
        out.push(neighbor);
    }
}

fn period_replaces(
    solution: &Solution,
    pool: &CandidatePool,
    index: &ProblemIndex,
    out: &mut Vec<Solution>,
) -> PlanResult<()> {
    for allocation in solution.allocations() {
        let field = index.field(allocation.field_id)?;
        for sc in pool.for_pair(field.id, allocation.crop_id) {
            if sc.candidate.start_date == allocation.start_date
                && sc.candidate.quantity == allocation.quantity
            {
                continue;
            }
            if !window_fits(
                solution,
                field,
                sc.candidate.start_date,
                sc.candidate.completion_date,
                Some(allocation.id),
            ) {
                continue;
            }
            let mut neighbor = solution.clone();
            if let Some(replaced) = neighbor.get_mut(allocation.id) {
                replace_from_candidate(replaced, sc, field.daily_fixed_cost);
            }
            out.push(neighbor);
        }
    }
    Ok(())
}

fn quantity_adjusts(
    solution: &Solution,
    index: &ProblemIndex,
    config: &OptimizationConfig,
    out: &mut Vec<Solution>,
) -> PlanResult<()> {
    for allocation in solution.allocations() {
        let field = index.field(allocation.field_id)?;
        let crop = index.crop(allocation.crop_id)?;
        for &multiplier in &config.quantity_adjustment_multipliers {
            let quantity = crop.quantity_for_area(allocation.area_used * multiplier);
            if quantity == 0 || quantity == allocation.quantity {
                continue;
            }
            let area_used = quantity as f64 * crop.area_per_unit_m2;
            if !area_fits(field, area_used) {
                continue;
            }
            let mut neighbor = solution.clone();
            if let Some(adjusted) = neighbor.get_mut(allocation.id) {
                adjusted.area_used = area_used;
                adjusted.quantity = quantity;
                adjusted.expected_revenue = None;
                adjusted.profit = None;
            }
            out.push(neighbor);
        }
    }
    Ok(())
}
