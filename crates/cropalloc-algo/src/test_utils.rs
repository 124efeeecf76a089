//! Shared fixtures for unit and integration tests.
//!
//! The flat-weather world: every day has a mean of the given temperature,
//! and the default stage profile (base 10, optimal 20-30, stress 33) yields
//! exactly [`GDD_PER_DAY_AT_25`] GDD per day at 25 degrees, so growth
//! durations are easy to reason about in tests.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use cropalloc_core::{
    Crop, CropId, Field, FieldId, OptimizationConfig, PlanningHorizon, StageRequirement,
    TemperatureProfile, WeatherRecord, WeatherSeries,
};

use crate::problem::PlanProblem;

/// Daily GDD of the default profile under flat 25-degree weather.
pub const GDD_PER_DAY_AT_25: f64 = 15.0;

/// Flat weather: one record per day, constant mean temperature.
pub fn flat_weather(start: NaiveDate, end: NaiveDate, t_mean: f64) -> WeatherSeries {
    let mut series = WeatherSeries::new();
    let mut date = start;
    while date <= end {
        series.insert(WeatherRecord::new(date).with_temp_mean(t_mean));
        date += Duration::days(1);
    }
    series
}

/// One stage with the default thermal profile.
pub fn stage(name: &str, order: usize, required_gdd: f64) -> StageRequirement {
    StageRequirement {
        name: name.to_string(),
        order,
        profile: TemperatureProfile::new(10.0, 20.0, 30.0).with_high_stress(33.0),
        required_gdd,
        harvest_start_gdd: None,
    }
}

/// A single-stage profile requiring `required_gdd` in total.
pub fn single_stage_profile(required_gdd: f64) -> Vec<StageRequirement> {
    vec![stage("growth", 0, required_gdd)]
}

pub fn sample_field(id: usize, name: &str, area_m2: f64, daily_cost: f64) -> Field {
    Field::new(FieldId::new(id), name, area_m2, daily_cost)
}

pub fn sample_crop(id: usize, name: &str, area_per_unit_m2: f64, revenue_per_m2: f64) -> Crop {
    Crop::new(CropId::new(id), name, "standard", area_per_unit_m2, revenue_per_m2)
}

/// One 1000 m2 field at 100/day, one crop at 50/m2 needing 100 days of
/// 25-degree weather, April through October.
pub fn sample_problem() -> PlanProblem {
    let horizon = PlanningHorizon::new(
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
    );
    let crop = sample_crop(1, "Tomato", 0.5, 50.0);
    PlanProblem {
        fields: vec![sample_field(1, "F1", 1000.0, 100.0)],
        profiles: HashMap::from([(crop.id, single_stage_profile(1500.0))]),
        crops: vec![crop],
        weather: flat_weather(horizon.start, horizon.end, 25.0),
        rules: vec![],
        horizon,
        config: OptimizationConfig::default(),
        seed_solution: None,
        instructions: vec![],
    }
}
