//! # cropalloc-core: Crop Allocation Modeling Core
//!
//! Provides the fundamental data structures for multi-field, multi-crop
//! allocation planning.
//!
//! ## Design Philosophy
//!
//! A planning problem is a flat catalog of immutable inputs:
//! - **Fields**: cultivable plots with an area, a daily fixed cost, and a
//!   fallow interval that must elapse between consecutive cultivations
//! - **Crops**: cultivable varieties with per-area revenue, per-plant area,
//!   an optional annual market-demand cap, and rotation group tags
//! - **Stage requirements**: the ordered phenological stages a crop walks
//!   through, each parameterized by a thermal profile and a growing-degree-day
//!   (GDD) target
//! - **Weather**: one record per calendar day over the planning horizon
//! - **Interaction rules**: revenue modifiers between consecutive crops in
//!   the same field (continuous-cultivation penalties, rotation bonuses)
//!
//! Everything above is frozen after load. Schedulers produce value-typed
//! [`Solution`] snapshots of [`CropAllocation`] records; a neighbor proposal
//! is a new snapshot that shares the immutable inputs and never mutates the
//! original.
//!
//! ## Quick Start
//!
//! ```rust
//! use cropalloc_core::*;
//! use chrono::NaiveDate;
//!
//! let field = Field::new(FieldId::new(1), "North plot", 1_000.0, 500.0);
//!
//! let crop = Crop::new(CropId::new(1), "Tomato", "Momotaro", 0.5, 50.0)
//!     .with_max_revenue(30_000.0)
//!     .with_groups(["Solanaceae"]);
//!
//! let stages = vec![StageRequirement {
//!     name: "vegetative".to_string(),
//!     order: 0,
//!     profile: TemperatureProfile::new(10.0, 20.0, 30.0).with_high_stress(33.0),
//!     required_gdd: 600.0,
//!     harvest_start_gdd: None,
//! }];
//!
//! let horizon = PlanningHorizon::new(
//!     NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
//! );
//!
//! assert!(horizon.validate().is_ok());
//! assert_eq!(stages.len(), 1);
//! assert!(crop.groups.contains(&"Solanaceae".to_string()));
//! assert_eq!(field.fallow_days, DEFAULT_FALLOW_DAYS);
//! ```
//!
//! ## Core Data Structures
//!
//! - [`Field`], [`Crop`], [`StageRequirement`], [`WeatherRecord`],
//!   [`InteractionRule`] - immutable inputs
//! - [`AllocationCandidate`] - a precomputed feasible (field, crop, window,
//!   area) record, the raw material of scheduling
//! - [`CropAllocation`] / [`Solution`] - scheduled output
//! - Type-safe IDs: [`FieldId`], [`CropId`], [`AllocationId`]
//!
//! ## Modules
//!
//! - [`config`] - optimization knobs, validated once at pipeline entry
//! - [`diagnostics`] - non-fatal issue collection surfaced in results
//! - [`error`] - unified error type for the planning pipeline
//! - [`solution`] - allocation snapshots and summary statistics
//! - [`weather`] - daily weather series with mean-temperature resolution

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod solution;
pub mod weather;

pub use config::{Algorithm, GddModel, OptimizationConfig};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{PlanError, PlanResult};
pub use solution::{CropAllocation, FieldStats, Solution, SolutionStats};
pub use weather::{WeatherRecord, WeatherSeries, MAX_INTERPOLATION_GAP_DAYS};

/// Default fallow interval between consecutive cultivations of a field (days).
pub const DEFAULT_FALLOW_DAYS: i64 = 28;

/// Margin added to the high-stress threshold when a crop stage does not
/// declare an explicit developmental-arrest ceiling.
pub const MAX_TEMPERATURE_STRESS_MARGIN: f64 = 7.0;

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CropId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(u64);

impl FieldId {
    #[inline]
    pub fn new(value: usize) -> Self {
        FieldId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl CropId {
    #[inline]
    pub fn new(value: usize) -> Self {
        CropId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl AllocationId {
    #[inline]
    pub fn new(value: u64) -> Self {
        AllocationId(value)
    }
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field#{}", self.0)
    }
}

impl std::fmt::Display for CropId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Crop#{}", self.0)
    }
}

impl std::fmt::Display for AllocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Alloc#{}", self.0)
    }
}

/// A cultivable field. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Unique field identifier
    pub id: FieldId,
    /// Human-readable name
    pub name: String,
    /// Total cultivable area (m2)
    pub area_m2: f64,
    /// Fixed cost charged per calendar day an allocation occupies the field
    pub daily_fixed_cost: f64,
    /// Idle days required after an allocation completes before the field can
    /// be reused. Zero means back-to-back scheduling is allowed.
    pub fallow_days: i64,
}

impl Field {
    pub fn new(id: FieldId, name: impl Into<String>, area_m2: f64, daily_fixed_cost: f64) -> Self {
        Self {
            id,
            name: name.into(),
            area_m2,
            daily_fixed_cost,
            fallow_days: DEFAULT_FALLOW_DAYS,
        }
    }

    pub fn with_fallow_days(mut self, days: i64) -> Self {
        self.fallow_days = days;
        self
    }
}

/// A cultivable crop variety. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crop {
    /// Unique crop identifier
    pub id: CropId,
    /// Human-readable name
    pub name: String,
    /// Variety descriptor (e.g. cultivar name)
    pub variety: String,
    /// Area occupied by a single plant (m2)
    pub area_per_unit_m2: f64,
    /// Revenue per cultivated m2 at harvest
    pub revenue_per_m2: f64,
    /// Annual market-demand cap: aggregate revenue over all allocations of
    /// this crop may not exceed it. `None` means uncapped.
    pub max_revenue: Option<f64>,
    /// Rotation group tags (e.g. botanical family such as "Solanaceae")
    pub groups: Vec<String>,
}

impl Crop {
    pub fn new(
        id: CropId,
        name: impl Into<String>,
        variety: impl Into<String>,
        area_per_unit_m2: f64,
        revenue_per_m2: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            variety: variety.into(),
            area_per_unit_m2,
            revenue_per_m2,
            max_revenue: None,
            groups: Vec::new(),
        }
    }

    pub fn with_max_revenue(mut self, cap: f64) -> Self {
        self.max_revenue = Some(cap);
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Whole plants that fit into `area_m2`.
    pub fn quantity_for_area(&self, area_m2: f64) -> u64 {
        if self.area_per_unit_m2 <= 0.0 {
            return 0;
        }
        (area_m2 / self.area_per_unit_m2).floor() as u64
    }
}

/// Thermal response profile of a single phenological stage.
///
/// Temperatures in degrees Celsius. The developmental-arrest ceiling
/// (`max_temperature`) may be absent; it is then estimated as
/// `high_stress + MAX_TEMPERATURE_STRESS_MARGIN`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureProfile {
    /// Base temperature below which no development occurs
    pub base: f64,
    /// Lower bound of the full-efficiency band
    pub optimal_min: f64,
    /// Upper bound of the full-efficiency band
    pub optimal_max: f64,
    /// High-temperature stress threshold
    pub high_stress: Option<f64>,
    /// Developmental-arrest ceiling; development stops entirely above it
    pub max_temperature: Option<f64>,
}

impl TemperatureProfile {
    pub fn new(base: f64, optimal_min: f64, optimal_max: f64) -> Self {
        Self {
            base,
            optimal_min,
            optimal_max,
            high_stress: None,
            max_temperature: None,
        }
    }

    pub fn with_high_stress(mut self, threshold: f64) -> Self {
        self.high_stress = Some(threshold);
        self
    }

    pub fn with_max_temperature(mut self, ceiling: f64) -> Self {
        self.max_temperature = Some(ceiling);
        self
    }

    /// Arrest ceiling, falling back to the stress threshold plus a fixed
    /// margin. `None` when neither is declared.
    pub fn effective_max(&self) -> Option<f64> {
        self.max_temperature
            .or_else(|| self.high_stress.map(|t| t + MAX_TEMPERATURE_STRESS_MARGIN))
    }
}

/// One phenological stage of a crop's development.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRequirement {
    /// Stage name (e.g. "germination", "flowering")
    pub name: String,
    /// Position in the crop's stage sequence (0-based)
    pub order: usize,
    /// Thermal response profile for this stage
    pub profile: TemperatureProfile,
    /// Growing-degree-days required to complete this stage
    pub required_gdd: f64,
    /// GDD offset within this stage at which harvest may begin
    pub harvest_start_gdd: Option<f64>,
}

/// Kind of crop interaction between consecutive cultivations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    /// Penalty for growing crops of the same group back to back
    ContinuousCultivation,
    /// Bonus for a beneficial rotation between groups
    BeneficialRotation,
}

/// A revenue modifier applied when the immediately preceding allocation in
/// the same field matches the rule's source group and the candidate crop
/// matches its target group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRule {
    pub rule_type: InteractionType,
    /// Group tag the preceding crop must carry
    pub source_group: String,
    /// Group tag the following crop must carry
    pub target_group: String,
    /// Multiplicative revenue impact, in (0, 2]
    pub impact_ratio: f64,
    /// When false, the rule also applies with source and target swapped
    pub is_directional: bool,
}

impl InteractionRule {
    pub fn new(
        rule_type: InteractionType,
        source_group: impl Into<String>,
        target_group: impl Into<String>,
        impact_ratio: f64,
    ) -> Self {
        Self {
            rule_type,
            source_group: source_group.into(),
            target_group: target_group.into(),
            impact_ratio,
            is_directional: true,
        }
    }

    pub fn non_directional(mut self) -> Self {
        self.is_directional = false;
        self
    }

    /// Whether this rule fires for a `prev_groups` crop followed by a
    /// `next_groups` crop in the same field.
    pub fn applies(&self, prev_groups: &[String], next_groups: &[String]) -> bool {
        let forward = prev_groups.iter().any(|g| *g == self.source_group)
            && next_groups.iter().any(|g| *g == self.target_group);
        if self.is_directional {
            forward
        } else {
            forward
                || (prev_groups.iter().any(|g| *g == self.target_group)
                    && next_groups.iter().any(|g| *g == self.source_group))
        }
    }
}

/// Inclusive planning window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningHorizon {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PlanningHorizon {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn validate(&self) -> PlanResult<()> {
        if self.end < self.start {
            return Err(PlanError::Validation(format!(
                "planning horizon ends ({}) before it starts ({})",
                self.end, self.start
            )));
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of calendar days in the horizon, both endpoints included.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// A precomputed feasible growing window for a (field, crop) pair at one
/// area level. Immutable; revenue and cost are deliberately absent and are
/// computed on demand against the current partial solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationCandidate {
    pub field_id: FieldId,
    pub crop_id: CropId,
    pub start_date: NaiveDate,
    /// Date the final stage completes
    pub completion_date: NaiveDate,
    /// Calendar days from start to completion, both included
    pub growth_days: i64,
    /// Total GDD accumulated over the window
    pub accumulated_gdd: f64,
    /// Cultivated area (m2), quantized to whole plants
    pub area_used: f64,
    /// Whole plants cultivated
    pub quantity: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_field_defaults() {
        let field = Field::new(FieldId::new(1), "F1", 1000.0, 500.0);
        assert_eq!(field.fallow_days, DEFAULT_FALLOW_DAYS);
        let field = field.with_fallow_days(0);
        assert_eq!(field.fallow_days, 0);
    }

    #[test]
    fn test_crop_quantity_for_area() {
        let crop = Crop::new(CropId::new(1), "Tomato", "Momotaro", 0.5, 50.0);
        assert_eq!(crop.quantity_for_area(1000.0), 2000);
        assert_eq!(crop.quantity_for_area(0.75), 1);
        assert_eq!(crop.quantity_for_area(0.4), 0);
    }

    #[test]
    fn test_effective_max_fallback() {
        let profile = TemperatureProfile::new(10.0, 20.0, 30.0).with_high_stress(33.0);
        assert_eq!(profile.effective_max(), Some(40.0));

        let explicit = profile.with_max_temperature(38.0);
        assert_eq!(explicit.effective_max(), Some(38.0));

        let bare = TemperatureProfile::new(10.0, 20.0, 30.0);
        assert_eq!(bare.effective_max(), None);
    }

    #[test]
    fn test_interaction_rule_directional() {
        let rule = InteractionRule::new(
            InteractionType::ContinuousCultivation,
            "Solanaceae",
            "Solanaceae",
            0.7,
        );
        let solanaceae = vec!["Solanaceae".to_string()];
        let brassica = vec!["Brassicaceae".to_string()];
        assert!(rule.applies(&solanaceae, &solanaceae));
        assert!(!rule.applies(&solanaceae, &brassica));
        assert!(!rule.applies(&brassica, &solanaceae));
    }

    #[test]
    fn test_interaction_rule_non_directional() {
        let rule = InteractionRule::new(InteractionType::BeneficialRotation, "Fabaceae", "Poaceae", 1.1)
            .non_directional();
        let legume = vec!["Fabaceae".to_string()];
        let grass = vec!["Poaceae".to_string()];
        assert!(rule.applies(&legume, &grass));
        assert!(rule.applies(&grass, &legume));
        assert!(!rule.applies(&legume, &legume));
    }

    #[test]
    fn test_horizon_validation() {
        let ok = PlanningHorizon::new(d(2025, 4, 1), d(2025, 10, 31));
        assert!(ok.validate().is_ok());
        assert_eq!(ok.num_days(), 214);
        assert!(ok.contains(d(2025, 4, 1)));
        assert!(ok.contains(d(2025, 10, 31)));
        assert!(!ok.contains(d(2025, 11, 1)));

        let bad = PlanningHorizon::new(d(2025, 10, 31), d(2025, 4, 1));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_id_roundtrip_serde() {
        let id = FieldId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let back: FieldId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
