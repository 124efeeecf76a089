//! Per-field weighted interval scheduling.
//!
//! Each field is solved exactly with the classical DP: sort the field's
//! candidates by fallow-adjusted end, binary-search each candidate's latest
//! compatible predecessor, and fold `M[i] = max(M[i-1], w(i) + M[p(i)])`.
//! Weights are the context-free baseline profits, which makes the per-field
//! selection optimal under context-free pricing; market caps couple fields
//! and are reconciled afterwards by a global pass that keeps each capped
//! crop's best-rate allocations until demand runs out.
//!
//! Seed allocations (adjustment mode) are treated as fixed: candidates that
//! collide with a seed window are excluded before the DP runs.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use cropalloc_core::{AllocationId, CropId, Diagnostics, PlanResult, Solution};

use crate::candidates::{CandidatePool, ScoredCandidate};
use crate::feasibility::window_fits;
use crate::metrics::{baseline_metrics, reprice_solution};
use crate::problem::ProblemIndex;

/// Schedule every field independently, then reconcile market caps globally.
pub fn schedule(
    pool: &CandidatePool,
    index: &ProblemIndex,
    seed: &Solution,
    diag: &mut Diagnostics,
) -> PlanResult<Solution> {
    let mut solution = seed.clone();

    for field in &index.fields {
        let items: Vec<&ScoredCandidate> = pool
            .for_field(field.id)
            .filter(|sc| {
                window_fits(
                    seed,
                    field,
                    sc.candidate.start_date,
                    sc.candidate.completion_date,
                    None,
                )
            })
            .collect();
        for sc in select_for_field(items, field.fallow_days) {
            solution.push_candidate(&sc.candidate, field);
        }
    }

    enforce_market_caps(&mut solution, index, seed, diag)?;
    reprice_solution(&solution, index)
}

/// Exact weighted interval scheduling over one field's candidates.
fn select_for_field(mut items: Vec<&ScoredCandidate>, fallow_days: i64) -> Vec<&ScoredCandidate> {
    if items.is_empty() {
        return Vec::new();
    }
    let fallow = Duration::days(fallow_days);

    // Stable total order on fallow-adjusted end dates.
    items.sort_by_key(|sc| {
        (
            sc.candidate.completion_date + fallow,
            sc.candidate.start_date,
            std::cmp::Reverse(sc.candidate.quantity),
            sc.candidate.crop_id,
        )
    });
    let ends: Vec<NaiveDate> = items
        .iter()
        .map(|sc| sc.candidate.completion_date + fallow)
        .collect();

    // p[i]: number of items whose fallow-adjusted end admits item i's start.
    // Capped at i so a zero-fallow single-day window never counts itself.
    let predecessor: Vec<usize> = items
        .iter()
        .enumerate()
        .map(|(i, sc)| ends.partition_point(|&end| end <= sc.candidate.start_date).min(i))
        .collect();

    // M[k] = best profit over the first k items.
    let n = items.len();
    let mut best = vec![0.0f64; n + 1];
    for i in 0..n {
        let take = items[i].baseline_profit + best[predecessor[i]];
        best[i + 1] = best[i].max(take);
    }

    // Reconstruct the selected subset back to front.
    let mut selected = Vec::new();
    let mut k = n;
    while k > 0 {
        let i = k - 1;
        let take = items[i].baseline_profit + best[predecessor[i]];
        if take > best[i] {
            selected.push(items[i]);
            k = predecessor[i];
        } else {
            k = i;
        }
    }
    selected.reverse();
    selected
}

/// Global market-demand pass over the union of per-field selections.
///
/// Non-seed selections are ranked by context-free profit rate, best first;
/// each capped crop keeps allocations in that order until its demand is
/// exhausted and drops every one after the cut. Seed allocations are kept
/// unconditionally and consume demand before anything else.
fn enforce_market_caps(
    solution: &mut Solution,
    index: &ProblemIndex,
    seed: &Solution,
    diag: &mut Diagnostics,
) -> PlanResult<()> {
    let mut headroom: HashMap<CropId, f64> = HashMap::new();
    for crop in &index.crops {
        if let Some(cap) = crop.max_revenue {
            headroom.insert(crop.id, cap);
        }
    }
    if headroom.is_empty() {
        return Ok(());
    }

    // Seeds consume demand first, in pricing order for determinism.
    for id in solution.pricing_order() {
        if seed.get(id).is_none() {
            continue;
        }
        let Some(allocation) = solution.get(id) else {
            continue;
        };
        if let Some(room) = headroom.get_mut(&allocation.crop_id) {
            let crop = index.crop(allocation.crop_id)?;
            *room = (*room - allocation.area_used * crop.revenue_per_m2).max(0.0);
        }
    }

    let mut ranked: Vec<(f64, AllocationId, CropId)> = Vec::new();
    for allocation in solution.allocations() {
        if seed.get(allocation.id).is_some() {
            continue;
        }
        let field = index.field(allocation.field_id)?;
        let crop = index.crop(allocation.crop_id)?;
        let metrics = baseline_metrics(field, crop, allocation.growth_days, allocation.area_used);
        ranked.push((metrics.profit_rate(), allocation.id, allocation.crop_id));
    }
    ranked.sort_by(|(ra, ia, _), (rb, ib, _)| {
        rb.partial_cmp(ra)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(ia.cmp(ib))
    });

    let mut dropped: Vec<(AllocationId, CropId)> = Vec::new();
    for (_, id, crop_id) in ranked {
        let Some(room) = headroom.get_mut(&crop_id) else {
            continue;
        };
        if *room <= 0.0 {
            dropped.push((id, crop_id));
            continue;
        }
        let Some(allocation) = solution.get(id) else {
            continue;
        };
        let crop = index.crop(crop_id)?;
        *room = (*room - allocation.area_used * crop.revenue_per_m2).max(0.0);
    }

    for (id, crop_id) in dropped {
        solution.remove(id);
        diag.add_warning_with_entity(
            "market_cap",
            "allocation dropped: crop demand exhausted by better-rated allocations",
            format!("{crop_id}"),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates;
    use crate::phenology::PhenologyCache;
    use crate::problem::validate_problem;
    use crate::test_utils::sample_problem;

    fn schedule_default(problem: &crate::PlanProblem) -> (Solution, Diagnostics) {
        let index = validate_problem(problem).unwrap();
        let cache = PhenologyCache::new();
        let pool = candidates::generate(&index, &problem.weather, &cache, &problem.config).unwrap();
        let mut diag = Diagnostics::new();
        let solution = schedule(&pool, &index, &Solution::new(), &mut diag).unwrap();
        (solution, diag)
    }

    #[test]
    fn test_picks_full_area_single_window() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        let (solution, _) = schedule_default(&problem);
        assert!(!solution.is_empty());
        // Full area always dominates under context-free pricing.
        for a in solution.allocations() {
            assert_eq!(a.area_used, 1000.0);
        }
    }

    #[test]
    fn test_respects_fallow_between_selections() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        problem.config.top_period_candidates_per_pair = 30;
        let (solution, _) = schedule_default(&problem);
        let index = validate_problem(&problem).unwrap();
        assert!(crate::feasibility::check_solution(&solution, &index).is_ok());
    }

    #[test]
    fn test_cap_pass_drops_allocations_past_demand() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        problem.fields.push(
            cropalloc_core::Field::new(cropalloc_core::FieldId::new(2), "F2", 1000.0, 100.0),
        );
        // Full-area revenue is 50_000 per field; demand stops at 30_000.
        problem.crops[0].max_revenue = Some(30_000.0);
        let (solution, diag) = schedule_default(&problem);
        assert_eq!(solution.len(), 1);
        assert!(solution.total_revenue() <= 30_000.0 + 1e-6);
        for a in solution.allocations() {
            assert!(a.profit.unwrap_or(0.0) >= 0.0);
        }
        assert!(diag.warning_count() > 0);
    }

    #[test]
    fn test_cap_pass_prefers_higher_profit_rate() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        // F1 costs three times as much to run, so its allocation carries the
        // worse profit rate; the crop's demand must go to F2's.
        problem.fields[0].daily_fixed_cost = 300.0;
        problem.fields.push(
            cropalloc_core::Field::new(cropalloc_core::FieldId::new(2), "F2", 1000.0, 100.0),
        );
        problem.crops[0].max_revenue = Some(30_000.0);
        let (solution, diag) = schedule_default(&problem);
        assert_eq!(solution.len(), 1);
        assert_eq!(
            solution.allocations()[0].field_id,
            cropalloc_core::FieldId::new(2)
        );
        assert!(solution.total_revenue() <= 30_000.0 + 1e-6);
        assert!(diag.warning_count() > 0);
    }

    #[test]
    fn test_seed_windows_are_blocked() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        let index = validate_problem(&problem).unwrap();
        let cache = PhenologyCache::new();
        let pool = candidates::generate(&index, &problem.weather, &cache, &problem.config).unwrap();

        // Seed the only field with its best candidate; DP must schedule
        // around it without double-booking.
        let field = index.fields[0].clone();
        let best = pool.sorted_by_rate_desc()[0].candidate.clone();
        let mut seed = Solution::new();
        let seed_id = seed.push_candidate(&best, &field);

        let mut diag = Diagnostics::new();
        let solution = schedule(&pool, &index, &seed, &mut diag).unwrap();
        assert!(solution.get(seed_id).is_some());
        assert!(crate::feasibility::check_solution(&solution, &index).is_ok());
    }
}
