//! SCIP backend, driven through `russcip`.

use std::time::Instant;

use russcip::{
    Model as ScipModel, ObjSense, ProblemCreated, ProblemOrSolving, Status, VarType, Variable as ScipVariable,
    WithSolutions,
};

use super::model::{Cmp, LinExpr, Model, Sense, VarId, VarKind};
use super::{Solution, SolveControl, SolveStatus, Solver, StopReason};
use crate::error::SolverError;

/// Objective margin an incumbent has to clear to count as strictly better than the threshold.
const THRESHOLD_MARGIN: f64 = 1e-9;

/// Relative tolerance of the primal/dual objective comparison.
const DUALITY_TOL: f64 = 1e-6;

/// Solves [`Model`]s with SCIP.
///
/// The gap tolerance, node limit and time limit map onto SCIP's `limits/gap`, `limits/nodes`
/// and `limits/time`. An incumbent threshold adds a cutoff row on the objective together with
/// `limits/solutions = 1`, so the search ends at the first solution that beats it. Row duals of
/// a pure LP are the optimal solution of its dual program, solved as a second LP.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScipSolver;

impl Solver for ScipSolver {
    fn solve(&self, model: &Model, control: &SolveControl) -> Result<Solution, SolverError> {
        let start = Instant::now();
        let mut solution = solve_model(model, control)?;

        if !model.is_mip() && solution.status == SolveStatus::Optimal {
            solution.duals = Some(row_duals(model, &solution, control)?);
        }

        solution.elapsed = start.elapsed();
        Ok(solution)
    }
}

fn backend(model: &Model) -> impl Fn(russcip::Retcode) -> SolverError + '_ {
    move |code| SolverError::Backend(format!("SCIP rejected a parameter of '{}': {:?}", model.name(), code))
}

fn var_type(kind: VarKind) -> VarType {
    match kind {
        VarKind::Continuous => VarType::Continuous,
        VarKind::Integer => VarType::Integer,
        VarKind::Binary => VarType::Binary,
    }
}

fn add_row(scip: &mut ScipModel<ProblemCreated>, vars: &[ScipVariable], name: &str, expr: &LinExpr, cmp: Cmp, rhs: f64) {
    let (lhs, rhs) = match cmp {
        Cmp::Le => (-f64::INFINITY, rhs),
        Cmp::Ge => (rhs, f64::INFINITY),
        Cmp::Eq => (rhs, rhs),
    };
    let row_vars: Vec<&ScipVariable> = expr.terms().iter().map(|(var, _)| &vars[var.index()]).collect();
    let coefs: Vec<f64> = expr.terms().iter().map(|(_, coef)| *coef).collect();
    scip.add_cons(row_vars, &coefs, lhs, rhs, name);
}

/// Maps SCIP's final status onto ours.
///
/// A limit that stopped the search before any solution was found becomes
/// [`SolveStatus::NoSolution`]. An infeasible model under an incumbent threshold means that
/// no solution beats the threshold.
pub(crate) fn map_status(status: Status, has_solution: bool, threshold: bool) -> (SolveStatus, Option<StopReason>) {
    let (solve_status, stop_reason) = match status {
        Status::Optimal => (SolveStatus::Optimal, None),
        Status::Infeasible if threshold => (SolveStatus::Infeasible, Some(StopReason::IncumbentThreshold)),
        Status::Infeasible => (SolveStatus::Infeasible, None),
        Status::Unbounded | Status::Inforunbd => (SolveStatus::Unbounded, None),
        Status::GapLimit => (SolveStatus::Feasible, Some(StopReason::GapReached)),
        Status::SolutionLimit | Status::BestSolutionLimit => (SolveStatus::Feasible, Some(StopReason::IncumbentThreshold)),
        Status::TimeLimit => (SolveStatus::Feasible, Some(StopReason::TimeLimit)),
        _ => (SolveStatus::Feasible, Some(StopReason::NodeLimit)),
    };

    match solve_status {
        SolveStatus::Optimal | SolveStatus::Feasible if !has_solution => (SolveStatus::NoSolution, stop_reason),
        _ => (solve_status, stop_reason),
    }
}

fn solve_model(model: &Model, control: &SolveControl) -> Result<Solution, SolverError> {
    let start = Instant::now();
    let mip = model.is_mip();
    let threshold = control.incumbent_threshold.filter(|_| mip);

    let mut scip = ScipModel::new().hide_output().include_default_plugins();
    if mip {
        if let Some(gap) = control.gap_tolerance {
            scip = scip.set_real_param("limits/gap", gap).map_err(backend(model))?;
        }
        let nodes = i64::try_from(control.node_limit).unwrap_or(i64::MAX);
        scip = scip.set_longint_param("limits/nodes", nodes).map_err(backend(model))?;
        if threshold.is_some() {
            scip = scip.set_int_param("limits/solutions", 1).map_err(backend(model))?;
        }
    }
    if let Some(seconds) = control.time_limit {
        scip = scip.set_real_param("limits/time", seconds).map_err(backend(model))?;
    }

    let sense = match model.sense() {
        Sense::Maximize => ObjSense::Maximize,
        Sense::Minimize => ObjSense::Minimize,
    };
    let mut scip = scip.create_prob(model.name()).set_obj_sense(sense);

    let vars: Vec<ScipVariable> =
        model.variables().iter().map(|v| scip.add_var(v.lower, v.upper, v.objective, &v.name, var_type(v.kind))).collect();
    for constraint in model.constraints() {
        add_row(&mut scip, &vars, &constraint.name, &constraint.expr, constraint.cmp, constraint.rhs);
    }

    if let Some(threshold) = threshold {
        let objective: LinExpr = model.variables().iter().enumerate().map(|(j, v)| (VarId(j), v.objective)).collect();
        let bound = threshold - model.objective_constant();
        let (cmp, rhs) = match model.sense() {
            Sense::Maximize => (Cmp::Ge, bound + THRESHOLD_MARGIN),
            Sense::Minimize => (Cmp::Le, bound - THRESHOLD_MARGIN),
        };
        add_row(&mut scip, &vars, "incumbent_cutoff", &objective, cmp, rhs);
    }

    let solved = scip.solve();
    let values: Option<Vec<f64>> = solved.best_sol().map(|sol| {
        vars.iter()
            .zip(model.variables())
            .map(|(var, v)| {
                let x = sol.val(var);
                if v.kind.is_integral() { x.round() } else { x }
            })
            .collect()
    });

    let (status, stop_reason) = map_status(solved.status(), values.is_some(), threshold.is_some());
    log::trace!("SCIP finished '{}' with {:?} ({:?})", model.name(), status, stop_reason);

    match values {
        Some(values) if matches!(status, SolveStatus::Optimal | SolveStatus::Feasible) => Ok(Solution {
            status,
            objective: model.objective_value(&values),
            values,
            duals: None,
            stop_reason,
            elapsed: start.elapsed(),
        }),
        _ => Ok(Solution::without_solution(status, stop_reason, start.elapsed())),
    }
}

/// Builds the dual program of an LP over non-negative variables.
///
/// The dual is written for the maximisation form; a minimisation is negated first. `≤` rows get
/// a non-negative multiplier, `≥` rows a non-positive one and `=` rows a free one. Finite upper
/// bounds enter as extra non-negative multipliers.
///
/// # Returns
/// The dual model, one multiplier per row of `model` and the sign that maps the multipliers
/// back onto `model`'s sense.
pub(crate) fn dual_program(model: &Model) -> Result<(Model, Vec<VarId>, f64), SolverError> {
    let sign = match model.sense() {
        Sense::Maximize => 1.0,
        Sense::Minimize => -1.0,
    };

    let mut dual = Model::new(format!("{}_dual", model.name()), Sense::Minimize);
    let mut columns = vec![LinExpr::new(); model.num_vars()];
    let mut multipliers = Vec::with_capacity(model.num_constraints());

    for constraint in model.constraints() {
        let (lower, upper) = match constraint.cmp {
            Cmp::Le => (0.0, f64::INFINITY),
            Cmp::Ge => (-f64::INFINITY, 0.0),
            Cmp::Eq => (-f64::INFINITY, f64::INFINITY),
        };
        let y = dual.add_continuous(format!("y_{}", constraint.name), lower, upper, constraint.rhs);
        for &(var, coef) in constraint.expr.terms() {
            columns[var.index()].add(y, coef);
        }
        multipliers.push(y);
    }

    for (j, v) in model.variables().iter().enumerate() {
        if v.lower != 0.0 {
            return Err(SolverError::InvalidModel {
                model: model.name().to_string(),
                reason: format!("duals need a lower bound of 0, '{}' has {}", v.name, v.lower),
            });
        }
        if v.upper.is_finite() {
            let u = dual.add_continuous(format!("u_{}", v.name), 0.0, f64::INFINITY, v.upper);
            columns[j].add(u, 1.0);
        }
    }

    for (v, column) in model.variables().iter().zip(columns) {
        dual.add_constraint(format!("x_{}", v.name), column, Cmp::Ge, sign * v.objective);
    }

    Ok((dual, multipliers, sign))
}

fn row_duals(model: &Model, primal: &Solution, control: &SolveControl) -> Result<Vec<f64>, SolverError> {
    let (dual, multipliers, sign) = dual_program(model)?;
    let dual_control = SolveControl { time_limit: control.time_limit, ..SolveControl::default() };
    let solution = solve_model(&dual, &dual_control)?;

    if solution.status != SolveStatus::Optimal {
        return Err(SolverError::Backend(format!("dual program of '{}' ended with {:?}", model.name(), solution.status)));
    }

    let primal_objective = primal.objective - model.objective_constant();
    if (sign * solution.objective - primal_objective).abs() > DUALITY_TOL * (1.0 + primal_objective.abs()) {
        log::warn!("Duality gap on '{}': primal {} and dual {}", model.name(), primal_objective, sign * solution.objective);
    }

    Ok(multipliers.into_iter().map(|y| sign * solution.value(y)).collect())
}
