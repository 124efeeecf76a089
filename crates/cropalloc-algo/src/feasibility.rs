//! Solution feasibility checks.
//!
//! The full check walks a whole solution once and gates every result the
//! pipeline returns; schedulers must never emit a solution that fails it.
//! The incremental forms ([`window_fits`], [`area_fits`]) answer the only
//! question neighborhoods and schedulers actually ask - "does this one
//! allocation fit?" - without re-scanning unaffected fields.

use chrono::{Duration, NaiveDate};

use cropalloc_core::{
    AllocationId, Field, GddModel, PlanError, PlanResult, Solution, WeatherSeries,
};

use crate::phenology::{simulate_cached, PhenologyCache};
use crate::problem::ProblemIndex;

const REVENUE_EPS: f64 = 1e-6;
const COST_EPS: f64 = 1e-6;
const AREA_EPS: f64 = 1e-9;

/// Fallow-aware non-overlap predicate for two windows in the same field.
///
/// Windows conflict unless one completes, serves its fallow interval, and
/// only then does the other start. A zero fallow period allows back-to-back
/// scheduling.
pub fn windows_conflict(
    a_start: NaiveDate,
    a_completion: NaiveDate,
    b_start: NaiveDate,
    b_completion: NaiveDate,
    fallow_days: i64,
) -> bool {
    let fallow = Duration::days(fallow_days);
    !(a_completion + fallow <= b_start || b_completion + fallow <= a_start)
}

/// Whether `[start, completion]` can be hosted by `field` next to the
/// allocations already scheduled there, skipping `exclude`.
pub fn window_fits(
    solution: &Solution,
    field: &Field,
    start: NaiveDate,
    completion: NaiveDate,
    exclude: Option<AllocationId>,
) -> bool {
    solution
        .allocations()
        .iter()
        .filter(|a| a.field_id == field.id && Some(a.id) != exclude)
        .all(|a| !windows_conflict(a.start_date, a.completion_date, start, completion, field.fallow_days))
}

/// Whether `area_used` respects the field's capacity. Same-field allocations
/// never overlap in time, so the per-slice check reduces to this.
pub fn area_fits(field: &Field, area_used: f64) -> bool {
    area_used > 0.0 && area_used <= field.area_m2 + AREA_EPS
}

/// Full one-pass validation of a solution against every invariant.
pub fn check_solution(solution: &Solution, index: &ProblemIndex) -> PlanResult<()> {
    for allocation in solution.allocations() {
        let field = index.field(allocation.field_id)?;
        let crop = index.crop(allocation.crop_id)?;

        if !index.horizon.contains(allocation.start_date)
            || !index.horizon.contains(allocation.completion_date)
        {
            return Err(PlanError::Invariant(format!(
                "{} [{} .. {}] escapes the planning horizon",
                allocation.id, allocation.start_date, allocation.completion_date
            )));
        }
        if allocation.growth_days != (allocation.completion_date - allocation.start_date).num_days() + 1
        {
            return Err(PlanError::Invariant(format!(
                "{} growth_days {} disagrees with its window",
                allocation.id, allocation.growth_days
            )));
        }
        if !area_fits(field, allocation.area_used) {
            return Err(PlanError::Invariant(format!(
                "{} uses {} m2 of {} ({} m2)",
                allocation.id, allocation.area_used, field.id, field.area_m2
            )));
        }
        if allocation.quantity == 0 {
            return Err(PlanError::Invariant(format!(
                "{} cultivates zero plants",
                allocation.id
            )));
        }
        if (allocation.area_used - allocation.quantity as f64 * crop.area_per_unit_m2).abs()
            > AREA_EPS.max(crop.area_per_unit_m2 * 1e-9)
        {
            return Err(PlanError::Invariant(format!(
                "{} area {} is not {} whole plants of {} m2",
                allocation.id, allocation.area_used, allocation.quantity, crop.area_per_unit_m2
            )));
        }
        let expected_cost = allocation.growth_days as f64 * field.daily_fixed_cost;
        if (allocation.total_cost - expected_cost).abs() > COST_EPS * expected_cost.abs().max(1.0) {
            return Err(PlanError::Invariant(format!(
                "{} cost {} differs from growth_days x daily cost {}",
                allocation.id, allocation.total_cost, expected_cost
            )));
        }
    }

    // Fallow-aware non-overlap per field: sorted neighbors suffice.
    for field in &index.fields {
        let in_field = solution.in_field(field.id);
        for pair in in_field.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if next.start_date < prev.completion_date + Duration::days(field.fallow_days) {
                return Err(PlanError::Invariant(format!(
                    "{} and {} violate the {}-day fallow interval in {}",
                    prev.id, next.id, field.fallow_days, field.id
                )));
            }
        }
    }

    // Market-demand caps.
    for crop in &index.crops {
        if let Some(cap) = crop.max_revenue {
            let sold = solution.crop_revenue(crop.id, None);
            if sold > cap + REVENUE_EPS * cap.max(1.0) {
                return Err(PlanError::Invariant(format!(
                    "{} sells {} against a market cap of {}",
                    crop.id, sold, cap
                )));
            }
        }
    }

    Ok(())
}

/// Verify that every allocation's completion date is exactly what phenology
/// produces for its (crop, start date).
pub fn check_phenology(
    solution: &Solution,
    index: &ProblemIndex,
    weather: &WeatherSeries,
    cache: &PhenologyCache,
    model: GddModel,
) -> PlanResult<()> {
    for allocation in solution.allocations() {
        let stages = index.stages(allocation.crop_id)?;
        let outcome = simulate_cached(
            cache,
            allocation.crop_id,
            stages,
            allocation.start_date,
            weather,
            index.horizon.end,
            model,
        )?;
        match outcome {
            Some(o) if o.completion_date == allocation.completion_date => {}
            Some(o) => {
                return Err(PlanError::Invariant(format!(
                    "{} completes {} but phenology yields {}",
                    allocation.id, allocation.completion_date, o.completion_date
                )))
            }
            None => {
                return Err(PlanError::Invariant(format!(
                    "{} has no phenology completion from {}",
                    allocation.id, allocation.start_date
                )))
            }
        }
    }
    Ok(())
}
