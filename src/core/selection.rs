use crate::core::{OptimizationQuery, OptimizationResult, Project};
use crate::utils::error::{PlannerError, Result};
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Greedy capital maximizer.
///
/// Each round admits every project affordable with the current capital and
/// completes the most profitable admitted one. Among admitted projects with
/// equal profit, the one with the lower required capital wins; remaining ties
/// keep catalog order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionEngine;

/// Heap entry: ordered by profit, then by earliest position in the
/// capital-sorted list.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    profit: Decimal,
    rank: Reverse<usize>,
}

impl SelectionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs the optimization on the blocking pool so the async runtime keeps
    /// serving I/O while the sort and heap passes run.
    pub async fn maximize(&self, query: OptimizationQuery) -> Result<OptimizationResult> {
        tracing::info!(
            initial_capital = %query.initial_capital(),
            available_projects = query.projects().len(),
            max_selections = query.max_selections(),
            "Starting capital maximization"
        );

        let engine = *self;
        let result = tokio::task::spawn_blocking(move || engine.compute(&query))
            .await
            .map_err(|e| PlannerError::Internal {
                message: format!("Capital maximization task failed: {}", e),
            })?;

        tracing::info!(
            final_capital = %result.final_capital,
            selected = result.selected_projects.len(),
            "Capital maximization complete"
        );
        Ok(result)
    }

    pub fn compute(&self, query: &OptimizationQuery) -> OptimizationResult {
        let mut by_capital: Vec<&Project> = query.projects().iter().collect();
        by_capital.sort_by(|a, b| a.required_capital.cmp(&b.required_capital));

        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(by_capital.len());
        let mut selected = Vec::new();
        let mut capital = query.initial_capital();
        let mut next = 0;

        for round in 0..query.max_selections() {
            tracing::debug!(round = round + 1, capital = %capital, "Selection round");

            while next < by_capital.len() && by_capital[next].required_capital <= capital {
                let project = by_capital[next];
                tracing::debug!(
                    project = %project.name,
                    required = %project.required_capital,
                    profit = %project.profit,
                    "Project affordable"
                );
                heap.push(Candidate {
                    profit: project.profit,
                    rank: Reverse(next),
                });
                next += 1;
            }

            let Some(best) = heap.pop() else {
                tracing::debug!(capital = %capital, "No further affordable projects");
                break;
            };

            let chosen = by_capital[best.rank.0];
            capital += chosen.profit;
            tracing::debug!(project = %chosen.name, capital = %capital, "Project selected");
            selected.push(chosen.clone());
        }

        OptimizationResult {
            selected_projects: selected,
            final_capital: capital,
        }
    }
}
