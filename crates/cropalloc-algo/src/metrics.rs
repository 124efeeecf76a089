//! Contextual allocation pricing.
//!
//! The value of a prospective allocation is not a property of the candidate
//! in isolation: market-demand caps consume what earlier allocations already
//! sold, and the crop preceding it in the same field drives interaction
//! impacts and the soil-recovery bonus. Every evaluation therefore passes a
//! [`MetricContext`] carrying the current partial solution; the calculator
//! never mutates it.

use chrono::NaiveDate;

use cropalloc_core::{AllocationId, Crop, Field, InteractionRule, PlanResult, Solution};

use crate::problem::ProblemIndex;

/// Soil-recovery bonus ceiling.
pub const SOIL_RECOVERY_MAX: f64 = 1.10;

/// Priced value of one allocation in context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationMetrics {
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
}

impl AllocationMetrics {
    /// Profit per unit cost; falls back to raw profit for zero-cost fields.
    pub fn profit_rate(&self) -> f64 {
        if self.cost > f64::EPSILON {
            self.profit / self.cost
        } else {
            self.profit
        }
    }
}

/// Pricing context: the solution being built, the rule set, and the horizon
/// start. `exclude` skips one allocation when repricing it in place.
#[derive(Debug, Clone, Copy)]
pub struct MetricContext<'a> {
    pub solution: &'a Solution,
    pub index: &'a ProblemIndex,
    pub exclude: Option<AllocationId>,
}

/// Multiplicative revenue bonus for the idle gap preceding an allocation.
pub fn soil_recovery_factor(gap_days: i64) -> f64 {
    if gap_days < 15 {
        1.00
    } else if gap_days < 30 {
        1.02
    } else if gap_days < 60 {
        1.05
    } else {
        SOIL_RECOVERY_MAX
    }
}

/// Combined impact of every rule matching the (previous crop, next crop)
/// transition. 1.0 when nothing matches.
pub fn interaction_impact(
    rules: &[InteractionRule],
    prev_groups: &[String],
    next_groups: &[String],
) -> f64 {
    rules
        .iter()
        .filter(|rule| rule.applies(prev_groups, next_groups))
        .map(|rule| rule.impact_ratio)
        .product()
}

/// Context-free pricing: no market cap, no interaction, no soil bonus.
/// Used only for candidate filtering and ordering.
pub fn baseline_metrics(field: &Field, crop: &Crop, growth_days: i64, area_used: f64) -> AllocationMetrics {
    let revenue = area_used * crop.revenue_per_m2;
    let cost = growth_days as f64 * field.daily_fixed_cost;
    AllocationMetrics {
        revenue,
        cost,
        profit: revenue - cost,
    }
}

/// Contextual pricing of a prospective allocation.
///
/// Revenue is clamped to the crop's remaining market demand both before and
/// after the interaction and soil-recovery multipliers, so the aggregate cap
/// invariant holds even when the multipliers exceed 1.
pub fn price_allocation(
    ctx: &MetricContext,
    field: &Field,
    crop: &Crop,
    start_date: NaiveDate,
    growth_days: i64,
    area_used: f64,
) -> AllocationMetrics {
    let base_revenue = area_used * crop.revenue_per_m2;

    let remaining = crop.max_revenue.map(|cap| {
        let already_sold = ctx.solution.crop_revenue(crop.id, ctx.exclude);
        (cap - already_sold).max(0.0)
    });
    let constrained = match remaining {
        Some(r) => base_revenue.min(r),
        None => base_revenue,
    };

    let previous = ctx
        .solution
        .previous_in_field(field.id, start_date, ctx.exclude);
    let impact = match previous {
        Some(prev) => match ctx.index.crop(prev.crop_id) {
            Ok(prev_crop) => interaction_impact(&ctx.index.rules, &prev_crop.groups, &crop.groups),
            Err(_) => 1.0,
        },
        None => 1.0,
    };
    let gap_days = match previous {
        Some(prev) => (start_date - prev.completion_date).num_days(),
        None => (start_date - ctx.index.horizon.start).num_days(),
    };
    let soil = soil_recovery_factor(gap_days);

    let adjusted = constrained * impact * soil;
    let revenue = match remaining {
        Some(r) => adjusted.min(r),
        None => adjusted,
    };
    let cost = growth_days as f64 * field.daily_fixed_cost;

    AllocationMetrics {
        revenue,
        cost,
        profit: revenue - cost,
    }
}

/// Re-price every allocation of a solution in the canonical order.
///
/// Revenues are cleared first so market caps are consumed strictly in
/// [`Solution::pricing_order`]; repeated calls on the same structure yield
/// identical prices.
pub fn reprice_solution(solution: &Solution, index: &ProblemIndex) -> PlanResult<Solution> {
    let mut priced = solution.clone();
    let order = priced.pricing_order();

    for &id in &order {
        if let Some(allocation) = priced.get_mut(id) {
            allocation.expected_revenue = None;
            allocation.profit = None;
        }
    }

    for &id in &order {
        let (field_id, crop_id, start_date, growth_days, area_used) = match priced.get(id) {
            Some(a) => (a.field_id, a.crop_id, a.start_date, a.growth_days, a.area_used),
            None => continue,
        };
        let field = index.field(field_id)?;
        let crop = index.crop(crop_id)?;
        let ctx = MetricContext {
            solution: &priced,
            index,
            exclude: Some(id),
        };
        let metrics = price_allocation(&ctx, field, crop, start_date, growth_days, area_used);
        if let Some(allocation) = priced.get_mut(id) {
            allocation.total_cost = metrics.cost;
            allocation.expected_revenue = Some(metrics.revenue);
            allocation.profit = Some(metrics.profit);
        }
    }

    Ok(priced)
}
