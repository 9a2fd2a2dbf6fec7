use super::model::Model;
use super::{Solution, SolveControl, SolveStatus, Solver, StopReason};
use crate::error::SolverError;

/// Solves with `inner` and passes the solutions of models whose name starts with `prefix`
/// through `rewrite`.
pub(crate) struct Rewrite<S, F> {
    inner: S,
    prefix: &'static str,
    rewrite: F,
}

impl<S: Solver, F: Fn(&Model, Solution) -> Solution> Rewrite<S, F> {
    pub(crate) fn new(inner: S, prefix: &'static str, rewrite: F) -> Self {
        Self { inner, prefix, rewrite }
    }
}

impl<S: Solver, F: Fn(&Model, Solution) -> Solution> Solver for Rewrite<S, F> {
    fn solve(&self, model: &Model, control: &SolveControl) -> Result<Solution, SolverError> {
        let solution = self.inner.solve(model, control)?;
        if model.name().starts_with(self.prefix) { Ok((self.rewrite)(model, solution)) } else { Ok(solution) }
    }
}

/// A search that hit its node limit before finding anything.
pub(crate) fn node_limit_without_incumbent(_: &Model, solution: Solution) -> Solution {
    Solution::without_solution(SolveStatus::NoSolution, Some(StopReason::NodeLimit), solution.elapsed)
}

pub(crate) fn infeasible(_: &Model, solution: Solution) -> Solution {
    Solution::without_solution(SolveStatus::Infeasible, None, solution.elapsed)
}

/// Shifts the value of the variable named `v` by one slot while keeping the objective.
pub(crate) fn shifted_completion(model: &Model, mut solution: Solution) -> Solution {
    if let Some(index) = model.variables().iter().position(|v| v.name == "v") {
        if let Some(value) = solution.values.get_mut(index) {
            *value += 1.0;
        }
    }
    solution
}
