//! Adjustment mode: user MOVE/REMOVE instructions over an existing schedule.
//!
//! Instructions are validated and applied in order against the working
//! solution. A rejected instruction never aborts the run; it is echoed back
//! with a reason from the fixed taxonomy and the remaining instructions
//! proceed. The resulting residual solution seeds a fresh optimization pass
//! (the pipeline re-runs candidate generation, initial scheduling, and local
//! improvement around the fixed allocations).

use serde::{Deserialize, Serialize};

use chrono::NaiveDate;
use cropalloc_core::{
    AllocationId, FieldId, GddModel, PlanResult, Solution, WeatherSeries,
};

use crate::feasibility::{area_fits, window_fits};
use crate::phenology::{simulate_cached, PhenologyCache};
use crate::problem::ProblemIndex;

/// One user instruction against an existing solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustInstruction {
    /// Relocate an allocation to a field and start date; `to_area` omitted
    /// preserves the original area.
    Move {
        allocation_id: AllocationId,
        to_field_id: FieldId,
        to_start_date: NaiveDate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_area: Option<f64>,
    },
    /// Drop an allocation.
    Remove { allocation_id: AllocationId },
}

impl AdjustInstruction {
    pub fn allocation_id(&self) -> AllocationId {
        match self {
            AdjustInstruction::Move { allocation_id, .. } => *allocation_id,
            AdjustInstruction::Remove { allocation_id } => *allocation_id,
        }
    }
}

/// Why an instruction was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AllocationNotFound,
    TargetFieldNotFound,
    PhenologyFailed,
    OutOfHorizon,
    InsufficientArea,
    FallowViolation,
}

/// An instruction that was applied, echoed for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMove {
    pub instruction: AdjustInstruction,
}

/// An instruction that was rejected, with its reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedMove {
    pub instruction: AdjustInstruction,
    pub reason: RejectReason,
}

/// Residual solution plus the applied/rejected echo.
#[derive(Debug, Clone)]
pub struct AdjustOutcome {
    pub solution: Solution,
    pub applied: Vec<AppliedMove>,
    pub rejected: Vec<RejectedMove>,
}

/// Apply `instructions` to `seed` in order.
pub fn apply_instructions(
    seed: &Solution,
    instructions: &[AdjustInstruction],
    index: &ProblemIndex,
    weather: &WeatherSeries,
    cache: &PhenologyCache,
    model: GddModel,
) -> PlanResult<AdjustOutcome> {
    let mut solution = seed.clone();
    let mut applied = Vec::new();
    let mut rejected = Vec::new();

    for instruction in instructions {
        match apply_one(&mut solution, instruction, index, weather, cache, model)? {
            None => applied.push(AppliedMove {
                instruction: instruction.clone(),
            }),
            Some(reason) => rejected.push(RejectedMove {
                instruction: instruction.clone(),
                reason,
            }),
        }
    }

    tracing::debug!(
        applied = applied.len(),
        rejected = rejected.len(),
        "adjustment instructions processed"
    );

    Ok(AdjustOutcome {
        solution,
        applied,
        rejected,
    })
}

/// Apply a single instruction. `Ok(None)` means applied; `Ok(Some(reason))`
/// means rejected. Errors are reserved for broken internal state.
fn apply_one(
    solution: &mut Solution,
    instruction: &AdjustInstruction,
    index: &ProblemIndex,
    weather: &WeatherSeries,
    cache: &PhenologyCache,
    model: GddModel,
) -> PlanResult<Option<RejectReason>> {
    match instruction {
        AdjustInstruction::Remove { allocation_id } => {
            if solution.remove(*allocation_id).is_none() {
                return Ok(Some(RejectReason::AllocationNotFound));
            }
            Ok(None)
        }
        AdjustInstruction::Move {
            allocation_id,
            to_field_id,
            to_start_date,
            to_area,
        } => {
            let Some(current) = solution.get(*allocation_id).cloned() else {
                return Ok(Some(RejectReason::AllocationNotFound));
            };
            if !index.has_field(*to_field_id) {
                return Ok(Some(RejectReason::TargetFieldNotFound));
            }
            let field = index.field(*to_field_id)?;
            let crop = index.crop(current.crop_id)?;

            if !index.horizon.contains(*to_start_date) {
                return Ok(Some(RejectReason::OutOfHorizon));
            }

            let requested_area = to_area.unwrap_or(current.area_used);
            let quantity = crop.quantity_for_area(requested_area);
            if quantity == 0 {
                return Ok(Some(RejectReason::InsufficientArea));
            }
            let area_used = quantity as f64 * crop.area_per_unit_m2;
            if !area_fits(field, area_used) {
                return Ok(Some(RejectReason::InsufficientArea));
            }

            let stages = index.stages(current.crop_id)?;
            let Some(outcome) = simulate_cached(
                cache,
                current.crop_id,
                stages,
                *to_start_date,
                weather,
                index.horizon.end,
                model,
            )?
            else {
                return Ok(Some(RejectReason::PhenologyFailed));
            };

            if !window_fits(
                solution,
                field,
                *to_start_date,
                outcome.completion_date,
                Some(*allocation_id),
            ) {
                return Ok(Some(RejectReason::FallowViolation));
            }

            if let Some(moved) = solution.get_mut(*allocation_id) {
                moved.field_id = field.id;
                moved.start_date = *to_start_date;
                moved.completion_date = outcome.completion_date;
                moved.growth_days = outcome.growth_days;
                moved.accumulated_gdd = outcome.accumulated_gdd;
                moved.area_used = area_used;
                moved.quantity = quantity;
                moved.total_cost = outcome.growth_days as f64 * field.daily_fixed_cost;
                moved.expected_revenue = None;
                moved.profit = None;
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates;
    use crate::problem::validate_problem;
    use crate::test_utils::sample_problem;
    use cropalloc_core::{Field, FieldId};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn seeded() -> (crate::PlanProblem, crate::ProblemIndex, Solution, PhenologyCache) {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        problem
            .fields
            .push(Field::new(FieldId::new(2), "F2", 1000.0, 100.0));
        let index = validate_problem(&problem).unwrap();
        let cache = PhenologyCache::new();
        let pool = candidates::generate(&index, &problem.weather, &cache, &problem.config).unwrap();
        let field = index.fields[0].clone();
        let best = pool
            .for_pair(field.id, index.crops[0].id)
            .next()
            .unwrap()
            .candidate
            .clone();
        let mut seed = Solution::new();
        seed.push_candidate(&best, &field);
        (problem, index, seed, cache)
    }

    #[test]
    fn test_remove_unknown_allocation_rejected() {
        let (problem, index, seed, cache) = seeded();
        let outcome = apply_instructions(
            &seed,
            &[AdjustInstruction::Remove {
                allocation_id: AllocationId::new(999),
            }],
            &index,
            &problem.weather,
            &cache,
            problem.config.gdd_model,
        )
        .unwrap();
        assert_eq!(outcome.applied.len(), 0);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].reason, RejectReason::AllocationNotFound);
        assert_eq!(outcome.solution.len(), seed.len());
    }

    #[test]
    fn test_remove_drops_allocation() {
        let (problem, index, seed, cache) = seeded();
        let id = seed.allocations()[0].id;
        let outcome = apply_instructions(
            &seed,
            &[AdjustInstruction::Remove { allocation_id: id }],
            &index,
            &problem.weather,
            &cache,
            problem.config.gdd_model,
        )
        .unwrap();
        assert_eq!(outcome.applied.len(), 1);
        assert!(outcome.solution.is_empty());
    }

    #[test]
    fn test_move_to_other_field_applies() {
        let (problem, index, seed, cache) = seeded();
        let id = seed.allocations()[0].id;
        let outcome = apply_instructions(
            &seed,
            &[AdjustInstruction::Move {
                allocation_id: id,
                to_field_id: FieldId::new(2),
                to_start_date: d(5, 1),
                to_area: None,
            }],
            &index,
            &problem.weather,
            &cache,
            problem.config.gdd_model,
        )
        .unwrap();
        assert_eq!(outcome.applied.len(), 1);
        let moved = outcome.solution.get(id).unwrap();
        assert_eq!(moved.field_id, FieldId::new(2));
        assert_eq!(moved.start_date, d(5, 1));
        assert_eq!(moved.expected_revenue, None);
    }

    #[test]
    fn test_move_at_horizon_end_fails_phenology() {
        let (problem, index, seed, cache) = seeded();
        let id = seed.allocations()[0].id;
        let outcome = apply_instructions(
            &seed,
            &[AdjustInstruction::Move {
                allocation_id: id,
                to_field_id: FieldId::new(2),
                to_start_date: d(10, 31),
                to_area: None,
            }],
            &index,
            &problem.weather,
            &cache,
            problem.config.gdd_model,
        )
        .unwrap();
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].reason, RejectReason::PhenologyFailed);
    }

    #[test]
    fn test_move_outside_horizon_rejected() {
        let (problem, index, seed, cache) = seeded();
        let id = seed.allocations()[0].id;
        let outcome = apply_instructions(
            &seed,
            &[AdjustInstruction::Move {
                allocation_id: id,
                to_field_id: FieldId::new(2),
                to_start_date: d(12, 1),
                to_area: None,
            }],
            &index,
            &problem.weather,
            &cache,
            problem.config.gdd_model,
        )
        .unwrap();
        assert_eq!(outcome.rejected[0].reason, RejectReason::OutOfHorizon);
    }

    #[test]
    fn test_move_oversized_area_rejected() {
        let (problem, index, seed, cache) = seeded();
        let id = seed.allocations()[0].id;
        let outcome = apply_instructions(
            &seed,
            &[AdjustInstruction::Move {
                allocation_id: id,
                to_field_id: FieldId::new(2),
                to_start_date: d(5, 1),
                to_area: Some(5000.0),
            }],
            &index,
            &problem.weather,
            &cache,
            problem.config.gdd_model,
        )
        .unwrap();
        assert_eq!(outcome.rejected[0].reason, RejectReason::InsufficientArea);
    }

    #[test]
    fn test_instruction_order_is_respected() {
        // Removing an allocation first makes a later MOVE of it fail.
        let (problem, index, seed, cache) = seeded();
        let id = seed.allocations()[0].id;
        let outcome = apply_instructions(
            &seed,
            &[
                AdjustInstruction::Remove { allocation_id: id },
                AdjustInstruction::Move {
                    allocation_id: id,
                    to_field_id: FieldId::new(2),
                    to_start_date: d(5, 1),
                    to_area: None,
                },
            ],
            &index,
            &problem.weather,
            &cache,
            problem.config.gdd_model,
        )
        .unwrap();
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].reason, RejectReason::AllocationNotFound);
    }

    #[test]
    fn test_remove_only_is_monotone() {
        let (problem, index, seed, cache) = seeded();
        let seed = crate::metrics::reprice_solution(&seed, &index).unwrap();
        let id = seed.allocations()[0].id;
        let outcome = apply_instructions(
            &seed,
            &[AdjustInstruction::Remove { allocation_id: id }],
            &index,
            &problem.weather,
            &cache,
            problem.config.gdd_model,
        )
        .unwrap();
        let residual = crate::metrics::reprice_solution(&outcome.solution, &index).unwrap();
        assert!(residual.total_profit() <= seed.total_profit() + 1e-9);
    }

    #[test]
    fn test_instruction_serde_wire_format() {
        let instruction = AdjustInstruction::Move {
            allocation_id: AllocationId::new(3),
            to_field_id: FieldId::new(2),
            to_start_date: d(5, 1),
            to_area: None,
        };
        let json = serde_json::to_string(&instruction).unwrap();
        assert!(json.contains(r#""action":"MOVE""#));
        let back: AdjustInstruction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, instruction);

        let remove: AdjustInstruction =
            serde_json::from_str(r#"{"action":"REMOVE","allocation_id":7}"#).unwrap();
        assert_eq!(remove.allocation_id(), AllocationId::new(7));
    }
}
