//! Scheduled allocations and value-typed solution snapshots.
//!
//! A [`Solution`] is an ordered collection of [`CropAllocation`] records.
//! Schedulers and neighborhood operations never mutate a shared solution;
//! they clone the snapshot, edit the clone, and hand it back. Per-field views
//! are materialized on demand by filtering - fields never know their
//! allocations.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{AllocationCandidate, AllocationId, Crop, CropId, Field, FieldId, PlanningHorizon};

/// A scheduled cultivation of a crop in a field.
///
/// `total_cost` always holds `growth_days x daily_fixed_cost` of the hosting
/// field. `expected_revenue` and `profit` are `None` until the allocation is
/// priced in the context of a full solution (market caps and interaction
/// impacts are context-dependent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropAllocation {
    /// Opaque stable key, unique within a solution
    pub id: AllocationId,
    pub field_id: FieldId,
    pub crop_id: CropId,
    pub start_date: NaiveDate,
    pub completion_date: NaiveDate,
    /// Calendar days from start to completion, both included
    pub growth_days: i64,
    pub accumulated_gdd: f64,
    /// Cultivated area (m2), quantized to whole plants
    pub area_used: f64,
    /// Whole plants cultivated
    pub quantity: u64,
    /// `growth_days x field.daily_fixed_cost`
    pub total_cost: f64,
    pub expected_revenue: Option<f64>,
    pub profit: Option<f64>,
}

impl CropAllocation {
    /// Materialize a candidate into an unpriced allocation.
    pub fn from_candidate(id: AllocationId, candidate: &AllocationCandidate, field: &Field) -> Self {
        Self {
            id,
            field_id: candidate.field_id,
            crop_id: candidate.crop_id,
            start_date: candidate.start_date,
            completion_date: candidate.completion_date,
            growth_days: candidate.growth_days,
            accumulated_gdd: candidate.accumulated_gdd,
            area_used: candidate.area_used,
            quantity: candidate.quantity,
            total_cost: candidate.growth_days as f64 * field.daily_fixed_cost,
            expected_revenue: None,
            profit: None,
        }
    }

    /// Last date the field is unavailable because of this allocation.
    pub fn occupied_until(&self, fallow_days: i64) -> NaiveDate {
        self.completion_date + Duration::days(fallow_days)
    }
}

/// A value-typed schedule snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    allocations: Vec<CropAllocation>,
    next_id: u64,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocations(&self) -> &[CropAllocation] {
        &self.allocations
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// Next unused allocation id. Stays ahead of every id ever pushed, so
    /// ids remain stable under removal.
    pub fn fresh_id(&mut self) -> AllocationId {
        let id = AllocationId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn push(&mut self, allocation: CropAllocation) {
        self.next_id = self.next_id.max(allocation.id.value() + 1);
        self.allocations.push(allocation);
    }

    /// Materialize and append a candidate, assigning a fresh id.
    pub fn push_candidate(&mut self, candidate: &AllocationCandidate, field: &Field) -> AllocationId {
        let id = self.fresh_id();
        self.push(CropAllocation::from_candidate(id, candidate, field));
        id
    }

    pub fn get(&self, id: AllocationId) -> Option<&CropAllocation> {
        self.allocations.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: AllocationId) -> Option<&mut CropAllocation> {
        self.allocations.iter_mut().find(|a| a.id == id)
    }

    pub fn remove(&mut self, id: AllocationId) -> Option<CropAllocation> {
        let idx = self.allocations.iter().position(|a| a.id == id)?;
        Some(self.allocations.remove(idx))
    }

    /// Allocations hosted by `field`, ordered by start date.
    pub fn in_field(&self, field: FieldId) -> Vec<&CropAllocation> {
        let mut result: Vec<&CropAllocation> = self
            .allocations
            .iter()
            .filter(|a| a.field_id == field)
            .collect();
        result.sort_by_key(|a| (a.start_date, a.id));
        result
    }

    /// The allocation in `field` with the latest completion at or before
    /// `date`, skipping `exclude`.
    pub fn previous_in_field(
        &self,
        field: FieldId,
        date: NaiveDate,
        exclude: Option<AllocationId>,
    ) -> Option<&CropAllocation> {
        self.allocations
            .iter()
            .filter(|a| a.field_id == field && Some(a.id) != exclude && a.completion_date <= date)
            .max_by_key(|a| (a.completion_date, a.id))
    }

    /// Aggregate priced revenue for `crop`, skipping `exclude`.
    pub fn crop_revenue(&self, crop: CropId, exclude: Option<AllocationId>) -> f64 {
        self.allocations
            .iter()
            .filter(|a| a.crop_id == crop && Some(a.id) != exclude)
            .filter_map(|a| a.expected_revenue)
            .sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.allocations.iter().map(|a| a.total_cost).sum()
    }

    pub fn total_revenue(&self) -> f64 {
        self.allocations.iter().filter_map(|a| a.expected_revenue).sum()
    }

    pub fn total_profit(&self) -> f64 {
        self.allocations.iter().filter_map(|a| a.profit).sum()
    }

    /// Canonical pricing order: chronological, tie-broken by field then id.
    /// Market-demand caps are consumed in this order, which keeps repeated
    /// pricing deterministic.
    pub fn pricing_order(&self) -> Vec<AllocationId> {
        let mut ids: Vec<(NaiveDate, FieldId, AllocationId)> = self
            .allocations
            .iter()
            .map(|a| (a.start_date, a.field_id, a.id))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, _, id)| id).collect()
    }
}

/// Per-field usage summary.
#[derive(Debug, Clone, Serialize)]
pub struct FieldStats {
    pub field_id: FieldId,
    pub name: String,
    pub allocation_count: usize,
    /// Sum over allocations of `area_used x growth_days`
    pub area_days_used: f64,
    /// `field.area x horizon days`
    pub area_days_available: f64,
    /// `area_days_used / area_days_available`, 0 when no capacity
    pub utilization: f64,
}

/// Aggregate summary of a solution, computed once on the final schedule.
#[derive(Debug, Clone, Serialize)]
pub struct SolutionStats {
    pub allocation_count: usize,
    pub total_cost: f64,
    pub total_revenue: f64,
    pub total_profit: f64,
    pub fields: Vec<FieldStats>,
    /// Priced revenue per crop, sorted by crop id
    pub revenue_by_crop: Vec<(CropId, f64)>,
}

impl SolutionStats {
    pub fn compute(solution: &Solution, fields: &[Field], horizon: &PlanningHorizon) -> Self {
        let horizon_days = horizon.num_days() as f64;

        let field_stats = fields
            .iter()
            .map(|field| {
                let in_field = solution.in_field(field.id);
                let area_days_used: f64 = in_field
                    .iter()
                    .map(|a| a.area_used * a.growth_days as f64)
                    .sum();
                let area_days_available = field.area_m2 * horizon_days;
                FieldStats {
                    field_id: field.id,
                    name: field.name.clone(),
                    allocation_count: in_field.len(),
                    area_days_used,
                    area_days_available,
                    utilization: if area_days_available > 0.0 {
                        area_days_used / area_days_available
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        let mut by_crop: HashMap<CropId, f64> = HashMap::new();
        for allocation in solution.allocations() {
            if let Some(revenue) = allocation.expected_revenue {
                *by_crop.entry(allocation.crop_id).or_insert(0.0) += revenue;
            }
        }
        let mut revenue_by_crop: Vec<(CropId, f64)> = by_crop.into_iter().collect();
        revenue_by_crop.sort_by_key(|(id, _)| *id);

        Self {
            allocation_count: solution.len(),
            total_cost: solution.total_cost(),
            total_revenue: solution.total_revenue(),
            total_profit: solution.total_profit(),
            fields: field_stats,
            revenue_by_crop,
        }
    }

    /// One-line summary for logs.
    pub fn label(&self) -> String {
        format!(
            "{} allocations, revenue {:.0}, cost {:.0}, profit {:.0}",
            self.allocation_count, self.total_revenue, self.total_cost, self.total_profit
        )
    }
}

/// Convenience: build a `Crop` lookup keyed by id.
pub fn crop_index(crops: &[Crop]) -> HashMap<CropId, Crop> {
    crops.iter().map(|c| (c.id, c.clone())).collect()
}

/// Convenience: build a `Field` lookup keyed by id.
pub fn field_index(fields: &[Field]) -> HashMap<FieldId, Field> {
    fields.iter().map(|f| (f.id, f.clone())).collect()
}
