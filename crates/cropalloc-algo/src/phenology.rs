//! Phenology evaluation: stage-by-stage GDD accumulation.
//!
//! Given a crop's ordered stage requirements, a start date, and the weather
//! series, the evaluator walks days forward accumulating growing-degree-days
//! per stage until the final stage completes or the horizon ends.
//!
//! Two daily models are supported:
//!
//! - **Modified** (default): development is fully efficient inside the
//!   stage's optimal band, degrades linearly toward the base temperature
//!   below it and toward the arrest ceiling above it, and stops entirely at
//!   the base temperature and at the ceiling.
//! - **Linear** (legacy): `max(0, t_mean - base)`.
//!
//! Results are memoized per (crop, start date) - completion is independent
//! of the hosting field, so candidate generation across fields shares the
//! cache. Writes are idempotent, which makes the cache safe under the
//! parallel generation fan-out.

use std::sync::RwLock;

use chrono::{Duration, NaiveDate};

use cropalloc_core::{
    CropId, GddModel, PlanError, PlanResult, StageRequirement, TemperatureProfile, WeatherSeries,
};

/// Successful phenology evaluation for one start date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthOutcome {
    /// Date the final stage completes
    pub completion_date: NaiveDate,
    /// Calendar days from start to completion, both included
    pub growth_days: i64,
    /// Total GDD accumulated over the window
    pub accumulated_gdd: f64,
}

/// Daily GDD for one stage profile at the given mean temperature.
pub fn daily_gdd(profile: &TemperatureProfile, t_mean: f64, model: GddModel) -> PlanResult<f64> {
    match model {
        GddModel::Linear => Ok((t_mean - profile.base).max(0.0)),
        GddModel::Modified => {
            let max_t = profile.effective_max().ok_or_else(|| {
                PlanError::Data(
                    "temperature ceiling underivable: stage declares neither max_temperature nor a high-stress threshold"
                        .to_string(),
                )
            })?;
            if t_mean <= profile.base || t_mean >= max_t {
                return Ok(0.0);
            }
            let raw = t_mean - profile.base;
            let efficiency = if t_mean >= profile.optimal_min && t_mean <= profile.optimal_max {
                1.0
            } else if t_mean < profile.optimal_min {
                let span = profile.optimal_min - profile.base;
                if span > 0.0 {
                    (t_mean - profile.base) / span
                } else {
                    1.0
                }
            } else {
                let span = max_t - profile.optimal_max;
                if span > 0.0 {
                    (max_t - t_mean) / span
                } else {
                    1.0
                }
            };
            Ok(raw * efficiency)
        }
    }
}

/// Walk the stage sequence from `start`, one day at a time.
///
/// Returns `Ok(None)` when the horizon ends before the final stage completes
/// or a day's mean temperature cannot be resolved; the candidate then fails
/// silently. Overflow GDD at a stage boundary carries into the next stage.
pub fn simulate_growth(
    stages: &[StageRequirement],
    start: NaiveDate,
    weather: &WeatherSeries,
    horizon_end: NaiveDate,
    model: GddModel,
) -> PlanResult<Option<GrowthOutcome>> {
    if stages.is_empty() {
        return Err(PlanError::Data("crop profile has no stages".to_string()));
    }

    let mut stage_idx = 0usize;
    let mut gdd_in_stage = 0.0;
    let mut total_gdd = 0.0;
    let mut date = start;

    while date <= horizon_end {
        let Some(t_mean) = weather.mean_temperature(date) else {
            return Ok(None);
        };
        let gdd = daily_gdd(&stages[stage_idx].profile, t_mean, model)?;
        total_gdd += gdd;
        gdd_in_stage += gdd;

        while gdd_in_stage >= stages[stage_idx].required_gdd {
            let overflow = gdd_in_stage - stages[stage_idx].required_gdd;
            stage_idx += 1;
            if stage_idx == stages.len() {
                return Ok(Some(GrowthOutcome {
                    completion_date: date,
                    growth_days: (date - start).num_days() + 1,
                    accumulated_gdd: total_gdd,
                }));
            }
            gdd_in_stage = overflow;
        }

        date += Duration::days(1);
    }

    Ok(None)
}

/// Memoized phenology results keyed by (crop, start date).
///
/// Completion depends only on the crop's stages, the start date, and the
/// shared weather series, so the cache is shared across fields and across
/// parallel workers. All writes for a key produce the same value.
#[derive(Debug, Default)]
pub struct PhenologyCache {
    map: RwLock<hashbrown::HashMap<(CropId, NaiveDate), Option<GrowthOutcome>>>,
}

impl PhenologyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, key: &(CropId, NaiveDate)) -> Option<Option<GrowthOutcome>> {
        self.map
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }

    fn insert(&self, key: (CropId, NaiveDate), value: Option<GrowthOutcome>) {
        self.map
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value);
    }
}

/// Cache-aware wrapper around [`simulate_growth`].
pub fn simulate_cached(
    cache: &PhenologyCache,
    crop_id: CropId,
    stages: &[StageRequirement],
    start: NaiveDate,
    weather: &WeatherSeries,
    horizon_end: NaiveDate,
    model: GddModel,
) -> PlanResult<Option<GrowthOutcome>> {
    let key = (crop_id, start);
    if let Some(hit) = cache.get(&key) {
        return Ok(hit);
    }
    let outcome = simulate_growth(stages, start, weather, horizon_end, model)?;
    cache.insert(key, outcome);
    Ok(outcome)
}
