//! Daily weather series with mean-temperature resolution.
//!
//! Phenology consumes weather only through [`WeatherSeries::mean_temperature`].
//! Resolution order for a given date:
//!
//! 1. the stored daily mean,
//! 2. `(temp_max + temp_min) / 2` when both extremes are present,
//! 3. linear interpolation between the nearest resolvable neighbors, as long
//!    as both sit within [`MAX_INTERPOLATION_GAP_DAYS`] of the date,
//! 4. otherwise `None` - the affected candidate fails silently.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::PlanningHorizon;

/// Largest gap (days, each side) bridged by temperature interpolation.
pub const MAX_INTERPOLATION_GAP_DAYS: i64 = 3;

/// Observed or forecast weather for a single calendar day.
///
/// Temperature drives GDD accumulation; the remaining fields are carried for
/// completeness and are optional everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub date: NaiveDate,
    pub temp_mean: Option<f64>,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub precipitation: Option<f64>,
    pub sunshine_duration: Option<f64>,
    pub wind_speed: Option<f64>,
}

impl WeatherRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            temp_mean: None,
            temp_max: None,
            temp_min: None,
            precipitation: None,
            sunshine_duration: None,
            wind_speed: None,
        }
    }

    pub fn with_temp_mean(mut self, t: f64) -> Self {
        self.temp_mean = Some(t);
        self
    }

    pub fn with_temp_range(mut self, min: f64, max: f64) -> Self {
        self.temp_min = Some(min);
        self.temp_max = Some(max);
        self
    }

    /// Mean temperature derivable from this record alone: the stored mean,
    /// or the midpoint of the daily extremes.
    pub fn direct_mean(&self) -> Option<f64> {
        self.temp_mean
            .or(match (self.temp_max, self.temp_min) {
                (Some(max), Some(min)) => Some((max + min) / 2.0),
                _ => None,
            })
    }
}

/// An ordered daily weather series keyed by date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherSeries {
    records: BTreeMap<NaiveDate, WeatherRecord>,
}

impl WeatherSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from records. On duplicate dates the last record wins.
    pub fn from_records<I: IntoIterator<Item = WeatherRecord>>(records: I) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.date, r)).collect(),
        }
    }

    pub fn insert(&mut self, record: WeatherRecord) {
        self.records.insert(record.date, record);
    }

    pub fn get(&self, date: NaiveDate) -> Option<&WeatherRecord> {
        self.records.get(&date)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First and last recorded dates.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.records.keys().next()?;
        let last = self.records.keys().next_back()?;
        Some((*first, *last))
    }

    /// Whether the recorded span encloses the planning horizon.
    pub fn covers(&self, horizon: &PlanningHorizon) -> bool {
        match self.span() {
            Some((first, last)) => first <= horizon.start && last >= horizon.end,
            None => false,
        }
    }

    /// Resolve the mean temperature for `date`, interpolating across short
    /// gaps. Returns `None` when the date cannot be resolved.
    pub fn mean_temperature(&self, date: NaiveDate) -> Option<f64> {
        if let Some(record) = self.records.get(&date) {
            if let Some(t) = record.direct_mean() {
                return Some(t);
            }
        }
        self.interpolate(date)
    }

    /// Linear interpolation between the nearest resolvable records on each
    /// side of `date`, both within the bounded gap.
    fn interpolate(&self, date: NaiveDate) -> Option<f64> {
        let before = self
            .records
            .range(..date)
            .rev()
            .take(MAX_INTERPOLATION_GAP_DAYS as usize)
            .find_map(|(d, r)| r.direct_mean().map(|t| (*d, t)))?;
        let after = self
            .records
            .range(date..)
            .filter(|(d, _)| **d > date)
            .take(MAX_INTERPOLATION_GAP_DAYS as usize)
            .find_map(|(d, r)| r.direct_mean().map(|t| (*d, t)))?;

        let (d0, t0) = before;
        let (d1, t1) = after;
        if (date - d0).num_days() > MAX_INTERPOLATION_GAP_DAYS
            || (d1 - date).num_days() > MAX_INTERPOLATION_GAP_DAYS
        {
            return None;
        }

        let span = (d1 - d0).num_days() as f64;
        let offset = (date - d0).num_days() as f64;
        Some(t0 + (t1 - t0) * offset / span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, day).unwrap()
    }

    #[test]
    fn test_direct_mean_prefers_stored_value() {
        let record = WeatherRecord::new(d(1)).with_temp_mean(20.0).with_temp_range(10.0, 40.0);
        assert_eq!(record.direct_mean(), Some(20.0));
    }

    #[test]
    fn test_direct_mean_from_extremes() {
        let record = WeatherRecord::new(d(1)).with_temp_range(10.0, 30.0);
        assert_eq!(record.direct_mean(), Some(20.0));
        assert_eq!(WeatherRecord::new(d(1)).direct_mean(), None);
    }

    #[test]
    fn test_interpolation_within_gap() {
        let series = WeatherSeries::from_records([
            WeatherRecord::new(d(1)).with_temp_mean(10.0),
            WeatherRecord::new(d(2)),
            WeatherRecord::new(d(3)),
            WeatherRecord::new(d(4)).with_temp_mean(25.0),
        ]);
        // Day 2 sits one third of the way from day 1 to day 4.
        let t = series.mean_temperature(d(2)).unwrap();
        assert!((t - 15.0).abs() < 1e-9);
        let t = series.mean_temperature(d(3)).unwrap();
        assert!((t - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolation_fails_beyond_gap() {
        let mut records = vec![WeatherRecord::new(d(1)).with_temp_mean(10.0)];
        for day in 2..=8 {
            records.push(WeatherRecord::new(d(day)));
        }
        records.push(WeatherRecord::new(d(9)).with_temp_mean(20.0));
        let series = WeatherSeries::from_records(records);
        assert_eq!(series.mean_temperature(d(5)), None);
    }

    #[test]
    fn test_missing_date_interpolates_from_neighbors() {
        let series = WeatherSeries::from_records([
            WeatherRecord::new(d(1)).with_temp_mean(10.0),
            WeatherRecord::new(d(3)).with_temp_mean(20.0),
        ]);
        let t = series.mean_temperature(d(2)).unwrap();
        assert!((t - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_covers_horizon() {
        let series = WeatherSeries::from_records((1..=30).map(|day| {
            WeatherRecord::new(d(day)).with_temp_mean(18.0)
        }));
        let inside = PlanningHorizon::new(d(5), d(25));
        let outside = PlanningHorizon::new(d(5), NaiveDate::from_ymd_opt(2025, 5, 10).unwrap());
        assert!(series.covers(&inside));
        assert!(!series.covers(&outside));
    }

    #[test]
    fn test_duplicate_dates_last_wins() {
        let series = WeatherSeries::from_records([
            WeatherRecord::new(d(1)).with_temp_mean(10.0),
            WeatherRecord::new(d(1)).with_temp_mean(12.0),
        ]);
        assert_eq!(series.len(), 1);
        assert_eq!(series.mean_temperature(d(1)), Some(12.0));
    }
}
