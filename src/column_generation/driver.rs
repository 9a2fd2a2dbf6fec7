use std::fmt;
use std::time::{Duration, Instant};

use crate::column_generation::column_pool::ColumnPools;
use crate::column_generation::greedy::greedy_configuration;
use crate::column_generation::master::{DualPrices, RestrictedMaster};
use crate::column_generation::pricing::{PricingOutcome, PricingSubproblem};
use crate::column_generation::verification::{RawAssignment, verify_admitted, verify_assignment};
use crate::config::{CgConfig, SeedStrategy};
use crate::domain::configuration::Configuration;
use crate::domain::id::{BatchId, IdGenerator, ServiceId};
use crate::domain::network::{Network, SubstrateSnapshot};
use crate::domain::service::Service;
use crate::error::CgError;
use crate::report::ANALYTICS_TARGET;
use crate::solver::Solver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgState {
    Initializing,
    Iterating,
    Converged,
    Stalled,
    IterationCapReached,
    FinalSolve,
    Done,
    Infeasible,
}

/// Why the pricing loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A full pricing pass proved that no improving column exists.
    Converged,
    /// A pricing pass added no column but at least one pricing solve ended at a limit or failed,
    /// so the LP bound is not proven.
    Stalled,
    IterationCapReached,
    /// No service admits any column.
    Infeasible,
    /// A master solve failed, nothing is admitted.
    MasterFailure,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Termination::Converged => "Converged",
            Termination::Stalled => "Stalled",
            Termination::IterationCapReached => "IterationCapReached",
            Termination::Infeasible => "Infeasible",
            Termination::MasterFailure => "MasterFailure",
        };
        write!(f, "{}", name)
    }
}

/// Everything a finished run of the driver leaves behind.
#[derive(Debug, Clone)]
pub struct CgOutcome {
    pub batch: BatchId,
    pub termination: Termination,

    /// Number of master LP solves.
    pub iterations: usize,

    /// LP objective after every iteration.
    pub lp_history: Vec<f64>,
    pub lp_time: Duration,
    pub ilp_objective: Option<f64>,
    pub ilp_time: Duration,
    pub pools: ColumnPools,

    /// `(service, id_per_service)` of the columns picked by the integer solve.
    pub selected: Vec<(ServiceId, usize)>,

    /// Services without any feasible column.
    pub excluded: Vec<ServiceId>,

    /// Priced columns rejected by the consistency checker.
    pub discarded_columns: usize,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl CgOutcome {
    fn new(batch: BatchId) -> Self {
        Self {
            batch,
            termination: Termination::Infeasible,
            iterations: 0,
            lp_history: Vec::new(),
            lp_time: Duration::ZERO,
            ilp_objective: None,
            ilp_time: Duration::ZERO,
            pools: ColumnPools::new(),
            selected: Vec::new(),
            excluded: Vec::new(),
            discarded_columns: 0,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn lp_objective(&self) -> Option<f64> {
        self.lp_history.last().copied()
    }

    pub fn admitted(&self) -> usize {
        self.selected.len()
    }

    /// The configurations chosen by the integer solve.
    pub fn selected_configurations(&self) -> impl Iterator<Item = &Configuration> + '_ {
        self.selected.iter().filter_map(|(service, index)| self.pools.pool(*service).and_then(|pool| pool.get(*index)))
    }
}

/// Column-generation loop of one batch.
///
/// `Initializing -> Iterating -> Converged | Stalled | IterationCapReached -> FinalSolve -> Done`,
/// or `Initializing -> Infeasible` if no service admits any column.
pub struct ColumnGeneration<'a, S: Solver> {
    batch: BatchId,
    network: &'a Network,
    snapshot: &'a SubstrateSnapshot,
    config: &'a CgConfig,
    solver: &'a S,
    state: CgState,
}

impl<'a, S: Solver> ColumnGeneration<'a, S> {
    pub fn new(batch: BatchId, network: &'a Network, snapshot: &'a SubstrateSnapshot, config: &'a CgConfig, solver: &'a S) -> Self {
        Self { batch, network, snapshot, config, solver, state: CgState::Initializing }
    }

    pub fn state(&self) -> CgState {
        self.state
    }

    fn transition(&mut self, next: CgState) {
        log::debug!("Batch {}: {:?} -> {:?}", self.batch, self.state, next);
        self.state = next;
    }

    /// Runs the whole state machine for `services`.
    pub fn run(&mut self, services: &[Service], ids: &mut IdGenerator) -> CgOutcome {
        let start = Instant::now();
        let mut outcome = CgOutcome::new(self.batch);
        self.state = CgState::Initializing;

        self.seed(services, ids, &mut outcome);

        if outcome.pools.is_empty() {
            log::info!("Batch {}: no service admits a configuration", self.batch);
            self.transition(CgState::Infeasible);
            outcome.termination = Termination::Infeasible;
            outcome.elapsed = start.elapsed();
            return outcome;
        }

        self.transition(CgState::Iterating);
        let active: Vec<&Service> = services.iter().filter(|s| outcome.pools.pool(s.id).is_some()).collect();

        if let Err(e) = self.iterate(&active, ids, &mut outcome) {
            return self.fail(outcome, e, start);
        }

        self.transition(CgState::FinalSolve);
        if let Err(e) = self.final_solve(&mut outcome) {
            return self.fail(outcome, e, start);
        }

        self.transition(CgState::Done);
        outcome.elapsed = start.elapsed();

        tracing::info!(
            target: ANALYTICS_TARGET,
            LogDescription = "Column generation finished",
            Batch = %self.batch,
            Termination = %outcome.termination,
            Iterations = outcome.iterations,
            Columns = outcome.pools.total_columns(),
            LpObjective = outcome.lp_objective().unwrap_or(f64::NAN),
            IlpObjective = outcome.ilp_objective.unwrap_or(f64::NAN),
            Admitted = outcome.admitted(),
            DiscardedColumns = outcome.discarded_columns,
            ProcessingTime = outcome.elapsed.as_millis() as u64,
        );

        outcome
    }

    /// One column per service, by greedy placement or zero-dual pricing.
    fn seed(&self, services: &[Service], ids: &mut IdGenerator, outcome: &mut CgOutcome) {
        let zero = DualPrices::zero(self.network.vnfs().len(), self.network.links().len(), self.snapshot.horizon());
        let pricing = PricingSubproblem::new(self.network, self.snapshot, self.config, self.solver);

        for service in services {
            if self.config.seed == SeedStrategy::Greedy {
                if let Some(configuration) = greedy_configuration(service, self.network, self.snapshot, self.config, ids) {
                    if self.accept_seed(service, &configuration, outcome) {
                        outcome.pools.insert(configuration);
                        continue;
                    }
                }
                log::debug!("Batch {}: no greedy seed for service {}, falling back to pricing", self.batch, service.id);
            }

            match pricing.price(service, &zero, ids) {
                Ok(PricingOutcome::Column { configuration, .. }) => {
                    outcome.pools.insert(configuration);
                }
                Ok(PricingOutcome::NoImprovingColumn { best_value }) => {
                    log::info!("Batch {}: service {} has no profitable configuration (best value {:?}), excluded", self.batch, service.id, best_value);
                    outcome.excluded.push(service.id);
                }
                Ok(PricingOutcome::Infeasible) => {
                    log::info!("Batch {}: service {} cannot be scheduled in this horizon, excluded", self.batch, service.id);
                    outcome.excluded.push(service.id);
                }
                Ok(PricingOutcome::Unresolved { stop_reason, .. }) => {
                    log::warn!("Batch {}: seeding of service {} stopped at {:?} without a column, excluded", self.batch, service.id, stop_reason);
                    outcome.excluded.push(service.id);
                }
                Err(e) => {
                    self.record_pricing_error(service.id, 0, &e, outcome);
                    outcome.excluded.push(service.id);
                }
            }
        }
    }

    fn accept_seed(&self, service: &Service, configuration: &Configuration, outcome: &mut CgOutcome) -> bool {
        if !self.config.verify_columns {
            return true;
        }

        match verify_assignment(service, self.network, self.snapshot, &RawAssignment::from_configuration(configuration)) {
            Ok(_) => true,
            Err(details) => {
                let e = CgError::InconsistentSolution { service: service.id, details };
                self.record_pricing_error(service.id, 0, &e, outcome);
                false
            }
        }
    }

    fn iterate(&mut self, active: &[&Service], ids: &mut IdGenerator, outcome: &mut CgOutcome) -> Result<(), CgError> {
        let pricing = PricingSubproblem::new(self.network, self.snapshot, self.config, self.solver);

        while outcome.iterations < self.config.max_iterations {
            let lp = RestrictedMaster::new(self.batch, &outcome.pools, self.snapshot, self.config).solve_relaxation(self.solver)?;
            outcome.iterations += 1;
            outcome.lp_time += lp.elapsed;
            outcome.lp_history.push(lp.objective);

            let duals = lp.duals.unwrap_or_else(|| DualPrices::zero(self.network.vnfs().len(), self.network.links().len(), self.snapshot.horizon()));
            let mut added = 0;
            let mut unresolved = 0;

            for service in active {
                match pricing.price(service, &duals, ids) {
                    Ok(PricingOutcome::Column { configuration, reduced_cost, stop_reason }) => {
                        let id = configuration.id();
                        match outcome.pools.insert(configuration) {
                            Some(index) => {
                                added += 1;
                                log::debug!(
                                    "Batch {} iteration {}: service {} gets column {} as #{} (reduced cost {:.6}, early stop {:?})",
                                    self.batch,
                                    outcome.iterations,
                                    service.id,
                                    id,
                                    index,
                                    reduced_cost,
                                    stop_reason
                                );
                            }
                            None => log::debug!("Batch {} iteration {}: column {} of service {} is a duplicate", self.batch, outcome.iterations, id, service.id),
                        }
                    }
                    Ok(PricingOutcome::NoImprovingColumn { .. }) => {}
                    Ok(PricingOutcome::Unresolved { .. }) => unresolved += 1,
                    Ok(PricingOutcome::Infeasible) => {
                        log::warn!("Batch {} iteration {}: pricing of service {} became infeasible", self.batch, outcome.iterations, service.id);
                    }
                    Err(e) => {
                        unresolved += 1;
                        self.record_pricing_error(service.id, outcome.iterations, &e, outcome);
                    }
                }
            }

            tracing::info!(
                target: ANALYTICS_TARGET,
                LogDescription = "Column generation iteration",
                Batch = %self.batch,
                Iteration = outcome.iterations,
                LpObjective = lp.objective,
                ColumnsAdded = added,
                UnresolvedPricing = unresolved,
                Columns = outcome.pools.total_columns(),
                ProcessingTime = lp.elapsed.as_millis() as u64,
            );

            if added == 0 && unresolved > 0 {
                log::warn!("Batch {}: no column added but {} pricing solves are unresolved", self.batch, unresolved);
                self.transition(CgState::Stalled);
                outcome.termination = Termination::Stalled;
                return Ok(());
            }
            if added == 0 {
                self.transition(CgState::Converged);
                outcome.termination = Termination::Converged;
                return Ok(());
            }
        }

        log::info!("Batch {}: iteration cap of {} reached before convergence", self.batch, self.config.max_iterations);
        self.transition(CgState::IterationCapReached);
        outcome.termination = Termination::IterationCapReached;
        Ok(())
    }

    fn final_solve(&self, outcome: &mut CgOutcome) -> Result<(), CgError> {
        let ilp = RestrictedMaster::new(self.batch, &outcome.pools, self.snapshot, self.config).solve_integer(self.solver)?;
        outcome.ilp_objective = Some(ilp.objective);
        outcome.ilp_time = ilp.elapsed;
        outcome.selected = ilp.selected().collect();

        if self.config.verify_columns {
            let chosen: Vec<&Configuration> = outcome.selected_configurations().collect();
            let issues = verify_admitted(&chosen, self.snapshot);
            if !issues.is_empty() {
                log::error!("Batch {}: admitted schedule violates {} resource rules, first: {}", self.batch, issues.len(), issues[0]);
                outcome.selected.clear();
                outcome.error = Some(format!("admitted schedule is inconsistent: {}", issues[0]));
            }
        }

        log::info!(
            "Batch {}: final solve admits {} of {} services (objective {:.4}, {} iterations, {})",
            self.batch,
            outcome.admitted(),
            outcome.pools.services().count() + outcome.excluded.len(),
            ilp.objective,
            outcome.iterations,
            outcome.termination
        );
        Ok(())
    }

    fn fail(&mut self, mut outcome: CgOutcome, error: CgError, start: Instant) -> CgOutcome {
        log::error!("Batch {}: {}", self.batch, error);
        self.transition(CgState::Done);
        outcome.termination = Termination::MasterFailure;
        outcome.selected.clear();
        outcome.error = Some(error.to_string());
        outcome.elapsed = start.elapsed();
        outcome
    }

    fn record_pricing_error(&self, service: ServiceId, iteration: usize, error: &CgError, outcome: &mut CgOutcome) {
        match error {
            CgError::InconsistentSolution { details, .. } => {
                outcome.discarded_columns += 1;
                log::warn!("Batch {} iteration {}: discarded column of service {}: {}", self.batch, iteration, service, error);
                for detail in details {
                    log::debug!("  {}", detail);
                }
            }
            other => log::error!("Batch {} iteration {}: pricing of service {} failed: {}", self.batch, iteration, service, other),
        }
    }
}
