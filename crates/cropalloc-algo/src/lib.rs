//! # cropalloc-algo: Allocation Optimization Algorithms
//!
//! This crate turns a [`PlanProblem`] - fields, crops, stage requirements,
//! daily weather, and interaction rules over a planning horizon - into a
//! non-overlapping, profit-maximizing schedule of crop allocations.
//!
//! ## Pipeline
//!
//! | Phase | Component | Description |
//! |-------|-----------|-------------|
//! | Candidates | [`candidates`] | Phenology-driven viable windows per (field, crop), several area levels each |
//! | Initial schedule | [`dp`] or [`greedy`] | Weighted interval scheduling DP per field, or profit-rate greedy |
//! | Improvement | [`hill_climb`] or [`alns`] | Mixed-neighborhood hill climbing, or adaptive large neighborhood search |
//! | Adjustment | [`adjust`] | User MOVE/REMOVE instructions applied to an existing schedule, residual re-optimized |
//!
//! ### Architecture
//!
//! Each phase consumes immutable shared inputs and value-typed solution
//! snapshots:
//!
//! - **[`phenology`]**: walks a crop's stage requirements day by day,
//!   accumulating growing-degree-days against the weather series
//! - **[`metrics`]**: contextual pricing - market-demand caps, interaction
//!   impacts, and soil-recovery bonuses depend on what is already scheduled
//! - **[`feasibility`]**: fallow-aware non-overlap, area, horizon, and cap
//!   checks; the full form gates every returned solution
//! - **[`neighborhood`]**: the seven local moves shared by both improvement
//!   drivers
//!
//! The pipeline is deterministic given identical inputs and the configured
//! RNG seed; candidate generation optionally fans out over (field, crop)
//! pairs behind the `parallel` feature.
//!
//! ## Example
//!
//! ```ignore
//! use cropalloc_algo::{optimize, PlanProblem};
//!
//! let problem: PlanProblem = serde_json::from_str(&request_body)?;
//! let result = optimize(&problem)?;
//! println!("{}: profit {:.0}", result.algorithm_used, result.total_profit);
//! for plan in &result.field_plans {
//!     println!("{}: {} allocations", plan.field_name, plan.allocations.len());
//! }
//! ```

pub mod adjust;
pub mod alns;
pub mod candidates;
pub mod dp;
pub mod feasibility;
pub mod greedy;
pub mod hill_climb;
pub mod metrics;
pub mod neighborhood;
pub mod phenology;
pub mod pipeline;
pub mod problem;
pub mod test_utils;

pub use adjust::{AdjustInstruction, AdjustOutcome, AppliedMove, RejectReason, RejectedMove};
pub use candidates::{CandidatePool, ScoredCandidate};
pub use metrics::{AllocationMetrics, MetricContext};
pub use phenology::{GrowthOutcome, PhenologyCache};
pub use pipeline::{optimize, FieldPlan, OptimizationResult};
pub use problem::{validate_problem, PlanProblem, ProblemIndex};
