//! Planning problem definition and request validation.
//!
//! A [`PlanProblem`] is the single structured request the optimizer
//! consumes. [`validate_problem`] performs every input-validation and
//! data-insufficiency check up front - nothing optimizes until the request
//! is known to be well-formed - and returns a [`ProblemIndex`] with sorted
//! element vectors and id lookups used by every downstream component.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use cropalloc_core::{
    Crop, CropId, Field, FieldId, GddModel, InteractionRule, OptimizationConfig, PlanError,
    PlanResult, PlanningHorizon, Solution, StageRequirement, WeatherSeries,
};

use crate::adjust::AdjustInstruction;

/// The full optimization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanProblem {
    pub fields: Vec<Field>,
    pub crops: Vec<Crop>,
    /// Stage requirements per crop id
    pub profiles: HashMap<CropId, Vec<StageRequirement>>,
    pub weather: WeatherSeries,
    #[serde(default)]
    pub rules: Vec<InteractionRule>,
    pub horizon: PlanningHorizon,
    #[serde(default)]
    pub config: OptimizationConfig,
    /// Existing solution to adjust; required when `instructions` is non-empty
    #[serde(default)]
    pub seed_solution: Option<Solution>,
    /// MOVE/REMOVE instructions for adjustment mode
    #[serde(default)]
    pub instructions: Vec<AdjustInstruction>,
}

/// Validated, lookup-friendly view of a [`PlanProblem`].
///
/// Element vectors are sorted by id so iteration order is deterministic;
/// stages are sorted by their declared order.
#[derive(Debug, Clone)]
pub struct ProblemIndex {
    pub fields: Vec<Field>,
    pub crops: Vec<Crop>,
    pub profiles: HashMap<CropId, Vec<StageRequirement>>,
    pub rules: Vec<InteractionRule>,
    pub horizon: PlanningHorizon,
    field_by_id: HashMap<FieldId, usize>,
    crop_by_id: HashMap<CropId, usize>,
}

impl ProblemIndex {
    pub fn field(&self, id: FieldId) -> PlanResult<&Field> {
        self.field_by_id
            .get(&id)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| PlanError::Validation(format!("unknown field {id}")))
    }

    pub fn crop(&self, id: CropId) -> PlanResult<&Crop> {
        self.crop_by_id
            .get(&id)
            .map(|&i| &self.crops[i])
            .ok_or_else(|| PlanError::Validation(format!("unknown crop {id}")))
    }

    pub fn stages(&self, id: CropId) -> PlanResult<&[StageRequirement]> {
        self.profiles
            .get(&id)
            .map(|s| s.as_slice())
            .ok_or_else(|| PlanError::Validation(format!("{id} has no stage profile")))
    }

    pub fn has_field(&self, id: FieldId) -> bool {
        self.field_by_id.contains_key(&id)
    }
}

/// Validate the request and build the index. Fails the whole call on the
/// first input-validation or data-insufficiency problem.
pub fn validate_problem(problem: &PlanProblem) -> PlanResult<ProblemIndex> {
    problem.horizon.validate()?;
    problem.config.validate()?;

    let mut field_ids = HashSet::new();
    for field in &problem.fields {
        if !field_ids.insert(field.id) {
            return Err(PlanError::Validation(format!("duplicate {}", field.id)));
        }
        if field.area_m2 <= 0.0 {
            return Err(PlanError::Validation(format!(
                "{} has non-positive area {}",
                field.id, field.area_m2
            )));
        }
        if field.daily_fixed_cost < 0.0 {
            return Err(PlanError::Validation(format!(
                "{} has negative daily fixed cost",
                field.id
            )));
        }
        if field.fallow_days < 0 {
            return Err(PlanError::Validation(format!(
                "{} has negative fallow period",
                field.id
            )));
        }
    }

    let mut crop_ids = HashSet::new();
    for crop in &problem.crops {
        if !crop_ids.insert(crop.id) {
            return Err(PlanError::Validation(format!("duplicate {}", crop.id)));
        }
        if crop.area_per_unit_m2 <= 0.0 {
            return Err(PlanError::Validation(format!(
                "{} has non-positive area per unit",
                crop.id
            )));
        }
        if crop.revenue_per_m2 < 0.0 {
            return Err(PlanError::Validation(format!(
                "{} has negative revenue per area",
                crop.id
            )));
        }
        if let Some(cap) = crop.max_revenue {
            if cap <= 0.0 {
                return Err(PlanError::Validation(format!(
                    "{} has non-positive max_revenue",
                    crop.id
                )));
            }
        }
    }

    for rule in &problem.rules {
        if !(rule.impact_ratio > 0.0 && rule.impact_ratio <= 2.0) {
            return Err(PlanError::Validation(format!(
                "interaction rule {} -> {} has impact ratio {} outside (0, 2]",
                rule.source_group, rule.target_group, rule.impact_ratio
            )));
        }
    }

    // Every crop needs a non-empty, thermally complete stage profile.
    let mut profiles = HashMap::new();
    for crop in &problem.crops {
        let stages = problem
            .profiles
            .get(&crop.id)
            .ok_or_else(|| PlanError::Validation(format!("{} references an undefined profile", crop.id)))?;
        if stages.is_empty() {
            return Err(PlanError::Data(format!("{} profile has no stages", crop.id)));
        }
        let mut sorted = stages.clone();
        sorted.sort_by_key(|s| s.order);
        for stage in &sorted {
            if stage.required_gdd <= 0.0 {
                return Err(PlanError::Validation(format!(
                    "{} stage '{}' requires non-positive GDD",
                    crop.id, stage.name
                )));
            }
            if problem.config.gdd_model == GddModel::Modified
                && stage.profile.effective_max().is_none()
            {
                return Err(PlanError::Data(format!(
                    "{} stage '{}' declares neither max_temperature nor a high-stress threshold",
                    crop.id, stage.name
                )));
            }
        }
        profiles.insert(crop.id, sorted);
    }

    if !problem.weather.covers(&problem.horizon) {
        return Err(PlanError::Data(format!(
            "weather series does not cover the planning horizon [{}, {}]",
            problem.horizon.start, problem.horizon.end
        )));
    }

    if problem.seed_solution.is_none() && !problem.instructions.is_empty() {
        return Err(PlanError::Validation(
            "adjustment instructions require a seed solution".to_string(),
        ));
    }
    if let Some(seed) = &problem.seed_solution {
        for allocation in seed.allocations() {
            if !field_ids.contains(&allocation.field_id) {
                return Err(PlanError::Validation(format!(
                    "seed {} references unknown {}",
                    allocation.id, allocation.field_id
                )));
            }
            if !crop_ids.contains(&allocation.crop_id) {
                return Err(PlanError::Validation(format!(
                    "seed {} references unknown {}",
                    allocation.id, allocation.crop_id
                )));
            }
        }
    }

    let mut fields = problem.fields.clone();
    fields.sort_by_key(|f| f.id);
    let mut crops = problem.crops.clone();
    crops.sort_by_key(|c| c.id);
    let field_by_id = fields.iter().enumerate().map(|(i, f)| (f.id, i)).collect();
    let crop_by_id = crops.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

    Ok(ProblemIndex {
        fields,
        crops,
        profiles,
        rules: problem.rules.clone(),
        horizon: problem.horizon,
        field_by_id,
        crop_by_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{flat_weather, sample_crop, sample_field, single_stage_profile};
    use chrono::NaiveDate;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn base_problem() -> PlanProblem {
        let horizon = PlanningHorizon::new(d(4, 1), d(10, 31));
        let crop = sample_crop(1, "Tomato", 0.5, 50.0);
        PlanProblem {
            fields: vec![sample_field(1, "F1", 1000.0, 100.0)],
            profiles: HashMap::from([(crop.id, single_stage_profile(1500.0))]),
            crops: vec![crop],
            weather: flat_weather(d(4, 1), d(10, 31), 25.0),
            rules: vec![],
            horizon,
            config: OptimizationConfig::default(),
            seed_solution: None,
            instructions: vec![],
        }
    }

    #[test]
    fn test_valid_problem_builds_index() {
        let problem = base_problem();
        let index = validate_problem(&problem).unwrap();
        assert_eq!(index.fields.len(), 1);
        assert!(index.field(FieldId::new(1)).is_ok());
        assert!(index.field(FieldId::new(9)).is_err());
        assert_eq!(index.stages(CropId::new(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut problem = base_problem();
        problem.fields.push(problem.fields[0].clone());
        assert!(matches!(
            validate_problem(&problem),
            Err(PlanError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_profile_rejected() {
        let mut problem = base_problem();
        problem.profiles.clear();
        assert!(matches!(
            validate_problem(&problem),
            Err(PlanError::Validation(_))
        ));
    }

    #[test]
    fn test_short_weather_is_data_error() {
        let mut problem = base_problem();
        problem.weather = flat_weather(d(4, 1), d(6, 30), 25.0);
        assert!(matches!(validate_problem(&problem), Err(PlanError::Data(_))));
    }

    #[test]
    fn test_unsorted_stage_orders_are_normalized() {
        let mut problem = base_problem();
        let crop_id = problem.crops[0].id;
        let mut stages = single_stage_profile(100.0);
        let mut late = stages[0].clone();
        late.order = 1;
        late.name = "ripening".to_string();
        stages.insert(0, late);
        // stages now [order 1, order 0]
        stages[1].order = 0;
        problem.profiles.insert(crop_id, stages);
        let index = validate_problem(&problem).unwrap();
        let sorted = index.stages(crop_id).unwrap();
        assert_eq!(sorted[0].order, 0);
        assert_eq!(sorted[1].order, 1);
    }

    #[test]
    fn test_instructions_without_seed_rejected() {
        let mut problem = base_problem();
        problem.instructions = vec![AdjustInstruction::Remove {
            allocation_id: cropalloc_core::AllocationId::new(0),
        }];
        assert!(validate_problem(&problem).is_err());
    }

    #[test]
    fn test_bad_impact_ratio_rejected() {
        let mut problem = base_problem();
        problem.rules.push(
            cropalloc_core::InteractionRule::new(
                cropalloc_core::InteractionType::ContinuousCultivation,
                "Solanaceae",
                "Solanaceae",
                2.5,
            ),
        );
        assert!(validate_problem(&problem).is_err());
    }
}
