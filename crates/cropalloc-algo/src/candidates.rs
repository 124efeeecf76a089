//! Candidate generation: viable growing windows per (field, crop).
//!
//! For every (field, crop) pair the generator slides a start date across the
//! planning horizon, asks phenology for a completion, and emits one
//! [`cropalloc_core::AllocationCandidate`] per configured area level of each
//! viable window. Windows are ranked by their best context-free profit rate
//! and only the top `top_period_candidates_per_pair` survive; the optional
//! filter then drops candidates that cannot break even in isolation.
//!
//! Pairs are independent, so generation fans out with rayon when the
//! `parallel` feature and the matching config flag are both enabled. The
//! phenology cache is shared across workers.

use chrono::Duration;

use cropalloc_core::{
    AllocationCandidate, Crop, CropId, Field, FieldId, OptimizationConfig, PlanResult,
    PlanningHorizon, StageRequirement, WeatherSeries,
};
use hashbrown::{HashMap, HashSet};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::metrics::baseline_metrics;
use crate::phenology::{simulate_cached, PhenologyCache};
use crate::problem::ProblemIndex;

/// A candidate plus its context-free price, kept for filtering and ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: AllocationCandidate,
    /// Context-free profit (no cap, no interaction, no soil bonus)
    pub baseline_profit: f64,
    /// Context-free profit per unit cost
    pub baseline_rate: f64,
}

/// The immutable candidate pool shared by schedulers and neighborhoods.
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    candidates: Vec<ScoredCandidate>,
    by_field: HashMap<FieldId, Vec<usize>>,
    by_pair: HashMap<(FieldId, CropId), Vec<usize>>,
}

impl CandidatePool {
    fn build(candidates: Vec<ScoredCandidate>) -> Self {
        let mut by_field: HashMap<FieldId, Vec<usize>> = HashMap::new();
        let mut by_pair: HashMap<(FieldId, CropId), Vec<usize>> = HashMap::new();
        for (i, sc) in candidates.iter().enumerate() {
            by_field.entry(sc.candidate.field_id).or_default().push(i);
            by_pair
                .entry((sc.candidate.field_id, sc.candidate.crop_id))
                .or_default()
                .push(i);
        }
        Self {
            candidates,
            by_field,
            by_pair,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredCandidate> {
        self.candidates.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&ScoredCandidate> {
        self.candidates.get(idx)
    }

    pub fn for_field(&self, field: FieldId) -> impl Iterator<Item = &ScoredCandidate> + '_ {
        self.by_field
            .get(&field)
            .into_iter()
            .flatten()
            .map(move |&i| &self.candidates[i])
    }

    pub fn for_pair(&self, field: FieldId, crop: CropId) -> impl Iterator<Item = &ScoredCandidate> + '_ {
        self.by_pair
            .get(&(field, crop))
            .into_iter()
            .flatten()
            .map(move |&i| &self.candidates[i])
    }

    /// All candidates, best baseline rate first, ties broken by pool order.
    pub fn sorted_by_rate_desc(&self) -> Vec<&ScoredCandidate> {
        let mut out: Vec<(usize, &ScoredCandidate)> = self.candidates.iter().enumerate().collect();
        out.sort_by(|(ia, a), (ib, b)| {
            b.baseline_rate
                .partial_cmp(&a.baseline_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ia.cmp(ib))
        });
        out.into_iter().map(|(_, sc)| sc).collect()
    }
}

/// Generate the candidate pool for a validated problem.
pub fn generate(
    index: &ProblemIndex,
    weather: &WeatherSeries,
    cache: &PhenologyCache,
    config: &OptimizationConfig,
) -> PlanResult<CandidatePool> {
    let mut pairs: Vec<(&Field, &Crop, &[StageRequirement])> = Vec::new();
    for field in &index.fields {
        for crop in &index.crops {
            if let Some(stages) = index.profiles.get(&crop.id) {
                pairs.push((field, crop, stages.as_slice()));
            }
        }
    }

    let per_pair = run_pairs(&pairs, weather, cache, &index.horizon, config);

    let mut all = Vec::new();
    for result in per_pair {
        all.extend(result?);
    }

    tracing::debug!(
        pairs = pairs.len(),
        candidates = all.len(),
        "candidate generation complete"
    );

    Ok(CandidatePool::build(all))
}

#[cfg(feature = "parallel")]
fn run_pairs(
    pairs: &[(&Field, &Crop, &[StageRequirement])],
    weather: &WeatherSeries,
    cache: &PhenologyCache,
    horizon: &PlanningHorizon,
    config: &OptimizationConfig,
) -> Vec<PlanResult<Vec<ScoredCandidate>>> {
    if config.enable_parallel_candidate_generation {
        pairs
            .par_iter()
            .map(|(field, crop, stages)| generate_for_pair(field, crop, stages, weather, cache, horizon, config))
            .collect()
    } else {
        pairs
            .iter()
            .map(|(field, crop, stages)| generate_for_pair(field, crop, stages, weather, cache, horizon, config))
            .collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn run_pairs(
    pairs: &[(&Field, &Crop, &[StageRequirement])],
    weather: &WeatherSeries,
    cache: &PhenologyCache,
    horizon: &PlanningHorizon,
    config: &OptimizationConfig,
) -> Vec<PlanResult<Vec<ScoredCandidate>>> {
    pairs
        .iter()
        .map(|(field, crop, stages)| generate_for_pair(field, crop, stages, weather, cache, horizon, config))
        .collect()
}

fn generate_for_pair(
    field: &Field,
    crop: &Crop,
    stages: &[StageRequirement],
    weather: &WeatherSeries,
    cache: &PhenologyCache,
    horizon: &PlanningHorizon,
    config: &OptimizationConfig,
) -> PlanResult<Vec<ScoredCandidate>> {
    // Sliding start date; every viable window with its per-level candidates.
    let mut windows: Vec<Vec<ScoredCandidate>> = Vec::new();
    let step = Duration::days(config.candidate_start_step_days as i64);
    let mut start = horizon.start;
    while start <= horizon.end {
        if let Some(outcome) =
            simulate_cached(cache, crop.id, stages, start, weather, horizon.end, config.gdd_model)?
        {
            let mut levels = Vec::with_capacity(config.quantity_levels.len());
            let mut seen_quantities = HashSet::new();
            for &ratio in &config.quantity_levels {
                let quantity = crop.quantity_for_area(ratio * field.area_m2);
                if quantity == 0 || !seen_quantities.insert(quantity) {
                    continue;
                }
                let area_used = quantity as f64 * crop.area_per_unit_m2;
                let metrics = baseline_metrics(field, crop, outcome.growth_days, area_used);
                levels.push(ScoredCandidate {
                    candidate: AllocationCandidate {
                        field_id: field.id,
                        crop_id: crop.id,
                        start_date: start,
                        completion_date: outcome.completion_date,
                        growth_days: outcome.growth_days,
                        accumulated_gdd: outcome.accumulated_gdd,
                        area_used,
                        quantity,
                    },
                    baseline_profit: metrics.profit,
                    baseline_rate: metrics.profit_rate(),
                });
            }
            if !levels.is_empty() {
                windows.push(levels);
            }
        }
        start += step;
    }

    // Keep the best windows per pair, then restore chronological order.
    let window_score = |levels: &Vec<ScoredCandidate>| {
        levels
            .iter()
            .map(|sc| sc.baseline_rate)
            .fold(f64::NEG_INFINITY, f64::max)
    };
    windows.sort_by(|a, b| {
        window_score(b)
            .partial_cmp(&window_score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a[0].candidate.start_date.cmp(&b[0].candidate.start_date))
    });
    windows.truncate(config.top_period_candidates_per_pair);
    windows.sort_by_key(|levels| levels[0].candidate.start_date);

    let mut out: Vec<ScoredCandidate> = windows.into_iter().flatten().collect();
    if config.enable_candidate_filtering {
        out.retain(|sc| sc.baseline_rate > 0.0);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::validate_problem;
    use crate::test_utils::{sample_problem, GDD_PER_DAY_AT_25};
    use chrono::NaiveDate;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    #[test]
    fn test_generates_area_levels_per_window() {
        let mut problem = sample_problem();
        problem.config.enable_candidate_filtering = false;
        problem.config.enable_parallel_candidate_generation = false;
        problem.config.top_period_candidates_per_pair = 1;
        let index = validate_problem(&problem).unwrap();
        let cache = PhenologyCache::new();
        let pool = generate(&index, &problem.weather, &cache, &problem.config).unwrap();

        // One window retained, four quantity levels on a 1000 m2 field.
        assert_eq!(pool.len(), 4);
        let areas: Vec<f64> = pool.iter().map(|sc| sc.candidate.area_used).collect();
        assert!(areas.contains(&1000.0));
        assert!(areas.contains(&250.0));
    }

    #[test]
    fn test_candidate_windows_match_phenology() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        let index = validate_problem(&problem).unwrap();
        let cache = PhenologyCache::new();
        let pool = generate(&index, &problem.weather, &cache, &problem.config).unwrap();
        assert!(!pool.is_empty());

        let expected_days = (1500.0 / GDD_PER_DAY_AT_25).ceil() as i64;
        for sc in pool.iter() {
            assert_eq!(sc.candidate.growth_days, expected_days);
            assert_eq!(
                (sc.candidate.completion_date - sc.candidate.start_date).num_days() + 1,
                expected_days
            );
        }
    }

    #[test]
    fn test_filtering_drops_unprofitable_candidates() {
        let mut problem = sample_problem();
        // 5000/day for 100 days dwarfs the 50_000 full-area revenue.
        problem.fields[0].daily_fixed_cost = 5000.0;
        problem.config.enable_parallel_candidate_generation = false;
        let index = validate_problem(&problem).unwrap();
        let cache = PhenologyCache::new();
        let pool = generate(&index, &problem.weather, &cache, &problem.config).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_top_k_limits_windows_per_pair() {
        let mut problem = sample_problem();
        problem.config.enable_parallel_candidate_generation = false;
        problem.config.top_period_candidates_per_pair = 3;
        problem.config.quantity_levels = vec![1.0];
        let index = validate_problem(&problem).unwrap();
        let cache = PhenologyCache::new();
        let pool = generate(&index, &problem.weather, &cache, &problem.config).unwrap();
        assert_eq!(pool.len(), 3);

        // Flat weather: every window costs the same, so the earliest three
        // start dates win and stay chronologically ordered.
        let starts: Vec<NaiveDate> = pool.iter().map(|sc| sc.candidate.start_date).collect();
        assert_eq!(starts[0], d(4, 1));
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_quantity_is_whole_plants() {
        let mut problem = sample_problem();
        problem.crops[0].area_per_unit_m2 = 0.7;
        problem.config.enable_parallel_candidate_generation = false;
        let index = validate_problem(&problem).unwrap();
        let cache = PhenologyCache::new();
        let pool = generate(&index, &problem.weather, &cache, &problem.config).unwrap();
        for sc in pool.iter() {
            let rebuilt = sc.candidate.quantity as f64 * 0.7;
            assert!((sc.candidate.area_used - rebuilt).abs() < 1e-9);
            assert!(sc.candidate.area_used <= 1000.0);
        }
    }
}
