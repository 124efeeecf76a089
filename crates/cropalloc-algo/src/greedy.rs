//! Merit-order greedy scheduling.
//!
//! Candidates are visited in descending context-free profit rate. Each is
//! accepted iff its window fits the hosting field (fallow-aware) and the
//! crop's cumulative revenue after acceptance stays within its market
//! demand. Accepted allocations are priced in context on the spot; passes
//! repeat until a full sweep accepts nothing.

use cropalloc_core::{PlanResult, Solution};

use crate::candidates::CandidatePool;
use crate::feasibility::window_fits;
use crate::metrics::{price_allocation, reprice_solution, MetricContext};
use crate::problem::ProblemIndex;

pub fn schedule(pool: &CandidatePool, index: &ProblemIndex, seed: &Solution) -> PlanResult<Solution> {
    let mut solution = reprice_solution(seed, index)?;
    let order = pool.sorted_by_rate_desc();
    let mut used = vec![false; order.len()];

    let mut accepted_any = true;
    while accepted_any {
        accepted_any = false;
        for (i, sc) in order.iter().enumerate() {
            if used[i] {
                continue;
            }
            let field = index.field(sc.candidate.field_id)?;
            let crop = index.crop(sc.candidate.crop_id)?;
            if !window_fits(
                &solution,
                field,
                sc.candidate.start_date,
                sc.candidate.completion_date,
                None,
            ) {
                continue;
            }

            // Cumulative revenue after acceptance must not exceed the
            // crop's market-demand cap.
            if let Some(cap) = crop.max_revenue {
                let already_sold = solution.crop_revenue(crop.id, None);
                let base_revenue = sc.candidate.area_used * crop.revenue_per_m2;
                if already_sold + base_revenue > cap + 1e-6 {
                    continue;
                }
            }

            let ctx = MetricContext {
                solution: &solution,
                index,
                exclude: None,
            };
            let metrics = price_allocation(
                &ctx,
                field,
                crop,
                sc.candidate.start_date,
                sc.candidate.growth_days,
                sc.candidate.area_used,
            );

            let id = solution.push_candidate(&sc.candidate, field);
            if let Some(allocation) = solution.get_mut(id) {
                allocation.expected_revenue = Some(metrics.revenue);
                allocation.profit = Some(metrics.profit);
            }
            used[i] = true;
            accepted_any = true;
        }
    }

    // Canonical pricing for the final snapshot.
    reprice_solution(&solution, index)
}
