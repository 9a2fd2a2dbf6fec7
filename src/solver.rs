//! Generic LP/MIP solve capability.
//!
//! The column-generation engine only talks to the [`Solver`] trait: build a [`Model`], pass
//! it together with a [`SolveControl`] and read primal values, duals (LP only), objective and
//! status from the returned [`Solution`]. [`ScipSolver`] runs the models on SCIP.

use std::time::Duration;

use crate::error::SolverError;

pub mod model;
pub mod scip;

#[cfg(test)]
pub(crate) mod testing;

pub use model::{Cmp, ConstrId, LinExpr, Model, Sense, VarId, VarKind};
pub use scip::ScipSolver;

/// Early-termination policy handed to every solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveControl {
    /// Stop once the relative gap between best bound and incumbent is at most this value.
    pub gap_tolerance: Option<f64>,

    /// Stop as soon as an incumbent strictly better than this value is found.
    pub incumbent_threshold: Option<f64>,

    /// Maximum number of branch-and-bound nodes.
    pub node_limit: usize,

    /// Wall-clock limit in seconds.
    pub time_limit: Option<f64>,
}

impl Default for SolveControl {
    fn default() -> Self {
        Self { gap_tolerance: None, incumbent_threshold: None, node_limit: 50_000, time_limit: None }
    }
}

impl SolveControl {
    pub fn with_gap_tolerance(mut self, tolerance: f64) -> Self {
        self.gap_tolerance = Some(tolerance);
        self
    }

    pub fn with_incumbent_threshold(mut self, threshold: f64) -> Self {
        self.incumbent_threshold = Some(threshold);
        self
    }

    pub fn with_node_limit(mut self, node_limit: usize) -> Self {
        self.node_limit = node_limit;
        self
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Proven optimal.
    Optimal,
    /// Incumbent returned under early termination, see [`Solution::stop_reason`].
    Feasible,
    /// No feasible point exists. With an incumbent threshold and
    /// [`StopReason::IncumbentThreshold`] this means no point beats the threshold.
    Infeasible,
    Unbounded,
    /// Search stopped by a limit before any incumbent was found.
    NoSolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    GapReached,
    IncumbentThreshold,
    NodeLimit,
    TimeLimit,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    pub objective: f64,
    pub values: Vec<f64>,
    /// Row duals, only available for pure LPs.
    pub duals: Option<Vec<f64>>,
    pub stop_reason: Option<StopReason>,
    pub elapsed: Duration,
}

impl Solution {
    pub(crate) fn without_solution(status: SolveStatus, stop_reason: Option<StopReason>, elapsed: Duration) -> Self {
        Self { status, objective: f64::NAN, values: Vec::new(), duals: None, stop_reason, elapsed }
    }

    pub fn has_solution(&self) -> bool {
        matches!(self.status, SolveStatus::Optimal | SolveStatus::Feasible)
    }

    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.index()).copied().unwrap_or(0.0)
    }

    pub fn dual(&self, constraint: ConstrId) -> Option<f64> {
        self.duals.as_ref().and_then(|d| d.get(constraint.index()).copied())
    }
}

pub trait Solver {
    fn solve(&self, model: &Model, control: &SolveControl) -> Result<Solution, SolverError>;
}
