use crate::column_generation::master::DualPrices;
use crate::column_generation::verification::verify_assignment;
use crate::config::CgConfig;
use crate::domain::configuration::{Configuration, Placement, ServicePlan, Transmission};
use crate::domain::id::IdGenerator;
use crate::domain::network::{Network, SubstrateSnapshot};
use crate::domain::service::Service;
use crate::error::{CgError, SolverError};
use crate::solver::{SolveStatus, Solver, StopReason};

use super::verification::RawAssignment;

mod formulation;

use formulation::PricingFormulation;

/// Result of pricing one service.
#[derive(Debug, Clone)]
pub enum PricingOutcome {
    /// A configuration with reduced cost below `-ε`.
    Column { configuration: Configuration, reduced_cost: f64, stop_reason: Option<StopReason> },

    /// No improving configuration exists. `best_value` is `None` when the incumbent threshold
    /// proved that nothing beats `ε`.
    NoImprovingColumn { best_value: Option<f64> },

    /// A node or time limit ended the search before it found an improving column, so nothing
    /// is proven. `best_value` is the incumbent, if any.
    Unresolved { best_value: Option<f64>, stop_reason: Option<StopReason> },

    /// The service cannot be scheduled in the snapshot at all.
    Infeasible,
}

/// Relative slots `[earliest, latest_end)` in which the service may be processed.
///
/// # Returns
/// `None` if the service arrives after the horizon or is due before it starts.
pub fn service_window(service: &Service, snapshot: &SubstrateSnapshot) -> Option<(usize, usize)> {
    let start = snapshot.start();
    let horizon = snapshot.horizon();
    let earliest = service.arrival.saturating_sub(start) as usize;

    let latest_end = match service.due_slot() {
        Some(due) if due < start => return None,
        Some(due) => ((due - start) as usize).min(horizon),
        None => horizon,
    };

    (earliest < latest_end).then_some((earliest, latest_end))
}

/// Pricing of single services against one frozen snapshot.
pub struct PricingSubproblem<'a, S: Solver> {
    network: &'a Network,
    snapshot: &'a SubstrateSnapshot,
    config: &'a CgConfig,
    solver: &'a S,
}

impl<'a, S: Solver> PricingSubproblem<'a, S> {
    pub fn new(network: &'a Network, snapshot: &'a SubstrateSnapshot, config: &'a CgConfig, solver: &'a S) -> Self {
        Self { network, snapshot, config, solver }
    }

    /// Searches a configuration of `service` with negative reduced cost under `duals`.
    ///
    /// # Returns
    /// * `Column` with the new configuration if one with value above `reduced_cost_epsilon` was found.
    /// * `NoImprovingColumn` if the solve proved that none exists, within the gap tolerance.
    /// * `Unresolved` if a node or time limit stopped the solve first.
    /// * `Infeasible` if the service has no feasible plan in the snapshot.
    ///
    /// A solution rejected by the consistency checker yields `CgError::InconsistentSolution`.
    pub fn price(&self, service: &Service, duals: &DualPrices, ids: &mut IdGenerator) -> Result<PricingOutcome, CgError> {
        let Some(window) = service_window(service, self.snapshot) else {
            log::debug!("Service {} does not fit into the horizon starting at {}", service.id, self.snapshot.start());
            return Ok(PricingOutcome::Infeasible);
        };

        let Some(formulation) = PricingFormulation::build(service, self.network, self.snapshot, self.config, duals, window) else {
            return Ok(PricingOutcome::Infeasible);
        };

        let model = formulation.model();
        log::trace!("Pricing service {}: {} variables, {} constraints", service.id, model.num_vars(), model.num_constraints());

        let solution = self.solver.solve(model, &self.config.pricing_control())?;

        match solution.status {
            SolveStatus::Infeasible if solution.stop_reason == Some(StopReason::IncumbentThreshold) => {
                return Ok(PricingOutcome::NoImprovingColumn { best_value: None });
            }
            SolveStatus::Infeasible => return Ok(PricingOutcome::Infeasible),
            SolveStatus::NoSolution => {
                log::warn!("Pricing of service {} stopped without an incumbent ({:?})", service.id, solution.stop_reason);
                return Ok(PricingOutcome::Unresolved { best_value: None, stop_reason: solution.stop_reason });
            }
            SolveStatus::Unbounded => {
                return Err(SolverError::Numerical(format!("pricing model '{}' is unbounded", model.name())).into());
            }
            SolveStatus::Optimal | SolveStatus::Feasible => {}
        }

        let value = solution.objective;
        if value <= self.config.reduced_cost_epsilon {
            if matches!(solution.stop_reason, Some(StopReason::NodeLimit | StopReason::TimeLimit)) {
                log::warn!("Pricing of service {} stopped at {:?} with best value {:.6}", service.id, solution.stop_reason, value);
                return Ok(PricingOutcome::Unresolved { best_value: Some(value), stop_reason: solution.stop_reason });
            }
            return Ok(PricingOutcome::NoImprovingColumn { best_value: Some(value) });
        }

        let raw = formulation.extract(service, &solution);
        let plan = if self.config.verify_columns {
            verify_assignment(service, self.network, self.snapshot, &raw)
                .map_err(|details| CgError::InconsistentSolution { service: service.id, details })?
        } else {
            plan_from_raw(&raw)
        };

        let profit = self.config.column_profit(plan.completion_time(service), plan.route_weight(self.network), self.snapshot.horizon());
        let configuration = Configuration::from_plan(ids.next_configuration_id(), service, plan, self.network, self.snapshot.horizon(), profit);

        log::debug!(
            "Service {}: new column {} (value {:.6}, completion {}, status {:?})",
            service.id,
            configuration.id(),
            value,
            configuration.completion_time(),
            solution.status
        );

        Ok(PricingOutcome::Column { configuration, reduced_cost: -value, stop_reason: solution.stop_reason })
    }
}

/// Takes the first start, route and transmission of every element without any check.
fn plan_from_raw(raw: &RawAssignment) -> ServicePlan {
    let placements = raw.starts.iter().filter_map(|s| s.first()).map(|&(vnf, start)| Placement { vnf, start }).collect();
    let transmissions = raw
        .routes
        .iter()
        .zip(&raw.transmission_starts)
        .map(|(arcs, starts)| match (arcs.is_empty(), starts.first()) {
            (false, Some(&start)) => Some(Transmission { arcs: arcs.clone(), start }),
            _ => None,
        })
        .collect();

    ServicePlan { placements, transmissions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::{LinkId, MachineId, NetworkId, ServiceId, VnfId};
    use crate::domain::network::VnfType;
    use crate::column_generation::verification::Inconsistency;
    use crate::solver::testing::{Rewrite, node_limit_without_incumbent, shifted_completion};
    use crate::solver::{ScipSolver, Solution};

    fn two_machines() -> Network {
        let mut network = Network::new(NetworkId::new(0), 2, false);
        network.add_vnf(MachineId::new(0), VnfType(0)).unwrap();
        network.add_vnf(MachineId::new(1), VnfType(1)).unwrap();
        network.add_link(MachineId::new(0), MachineId::new(1), 10, 1.0).unwrap();
        network
    }

    fn config(horizon: usize) -> CgConfig {
        CgConfig { horizon, ..CgConfig::default() }
    }

    fn column(outcome: PricingOutcome) -> (Configuration, f64) {
        match outcome {
            PricingOutcome::Column { configuration, reduced_cost, .. } => (configuration, reduced_cost),
            other => panic!("expected a column, got {:?}", other),
        }
    }

    #[test]
    fn test_service_window_respects_arrival_and_deadline() {
        let network = two_machines();
        let snapshot = network.snapshot(10, 8);
        let service = Service::new(ServiceId::new(0), &[(VnfType(0), 1)], 1);

        assert_eq!(service_window(&service, &snapshot), Some((0, 8)));
        assert_eq!(service_window(&service.clone().with_arrival(12).with_deadline(3), &snapshot), Some((2, 5)));
        assert_eq!(service_window(&service.clone().with_arrival(2).with_deadline(3), &snapshot), None);
        assert_eq!(service_window(&service.with_arrival(18), &snapshot), None);
    }

    #[test]
    fn test_chain_across_machines_is_routed() {
        let network = two_machines();
        let snapshot = network.snapshot(0, 6);
        let cfg = config(6);
        let service = Service::new(ServiceId::new(0), &[(VnfType(0), 2), (VnfType(1), 1)], 4);
        let duals = DualPrices::zero(network.vnfs().len(), network.links().len(), 6);

        let pricing = PricingSubproblem::new(&network, &snapshot, &cfg, &ScipSolver);
        let (configuration, reduced_cost) = column(pricing.price(&service, &duals, &mut IdGenerator::new()).unwrap());

        assert!(reduced_cost < 0.0);
        assert_eq!(configuration.completion_time(), 4);
        assert_eq!(configuration.vnf_usage().row(0), &[1, 1, 0, 0, 0, 0]);
        assert_eq!(configuration.vnf_usage().row(1), &[0, 0, 0, 1, 0, 0]);
        assert_eq!(configuration.link_usage().row(LinkId::new(0).index()), &[0, 0, 4, 0, 0, 0]);
        assert_eq!(configuration.plan().placements[1].vnf, VnfId::new(1));
    }

    #[test]
    fn test_high_duals_leave_no_improving_column() {
        let network = two_machines();
        let snapshot = network.snapshot(0, 4);
        let cfg = config(4);
        let service = Service::new(ServiceId::new(0), &[(VnfType(0), 1)], 1);
        let mut duals = DualPrices::zero(network.vnfs().len(), network.links().len(), 4);
        duals.set_service(service.id, 0.5);
        for t in 0..4 {
            duals.set_vnf(VnfId::new(0), t, 0.6);
        }

        let pricing = PricingSubproblem::new(&network, &snapshot, &cfg, &ScipSolver);
        match pricing.price(&service, &duals, &mut IdGenerator::new()).unwrap() {
            PricingOutcome::NoImprovingColumn { best_value: Some(value) } => assert!(value < 0.0),
            other => panic!("expected no improving column, got {:?}", other),
        }
    }

    #[test]
    fn test_chain_longer_than_horizon_is_infeasible() {
        let network = two_machines();
        let snapshot = network.snapshot(0, 3);
        let cfg = config(3);
        let service = Service::new(ServiceId::new(0), &[(VnfType(0), 2), (VnfType(1), 2)], 1);
        let duals = DualPrices::zero(network.vnfs().len(), network.links().len(), 3);

        let pricing = PricingSubproblem::new(&network, &snapshot, &cfg, &ScipSolver);
        assert!(matches!(pricing.price(&service, &duals, &mut IdGenerator::new()).unwrap(), PricingOutcome::Infeasible));
    }

    #[test]
    fn test_plan_from_raw_skips_empty_routes() {
        let network = two_machines();
        let raw = RawAssignment {
            service: ServiceId::new(0),
            starts: vec![vec![(VnfId::new(0), 0)], vec![(VnfId::new(1), 2)]],
            routes: vec![vec![network.arcs()[0]]],
            transmission_starts: vec![vec![1]],
            reported_vnf_usage: crate::domain::time_matrix::TimeMatrix::new(2, 3),
            reported_link_usage: crate::domain::time_matrix::TimeMatrix::new(1, 3),
            reported_completion: 3,
        };
        let plan = plan_from_raw(&raw);
        assert_eq!(plan.placements.len(), 2);
        assert_eq!(plan.transmissions[0].as_ref().map(|t| t.start), Some(1));
    }

    #[test]
    fn test_extracted_solution_passes_the_checker() {
        let network = two_machines();
        let snapshot = network.snapshot(0, 6);
        let cfg = config(6);
        let service = Service::new(ServiceId::new(0), &[(VnfType(0), 2), (VnfType(1), 1)], 4).with_traffic_size(8);
        let duals = DualPrices::zero(network.vnfs().len(), network.links().len(), 6);
        let window = service_window(&service, &snapshot).unwrap();

        let formulation = PricingFormulation::build(&service, &network, &snapshot, &cfg, &duals, window).unwrap();
        let solution = ScipSolver.solve(formulation.model(), &cfg.pricing_control()).unwrap();
        assert_eq!(solution.status, SolveStatus::Optimal);

        let raw = formulation.extract(&service, &solution);
        let plan = verify_assignment(&service, &network, &snapshot, &raw).unwrap();
        assert_eq!(plan.completion_time(&service), raw.reported_completion);
        assert_eq!(plan.placements[0].start, 0);
        assert_eq!(plan.transmissions[0].as_ref().map(|t| t.start), Some(2));

        let tampered = shifted_completion(formulation.model(), solution);
        let issues = verify_assignment(&service, &network, &snapshot, &formulation.extract(&service, &tampered)).unwrap_err();
        assert!(issues.iter().any(|i| matches!(i, Inconsistency::CompletionMismatch { .. })));
    }

    #[test]
    fn test_tampered_solution_is_rejected() {
        let network = two_machines();
        let snapshot = network.snapshot(0, 4);
        let cfg = config(4);
        let service = Service::new(ServiceId::new(0), &[(VnfType(0), 1)], 1);
        let duals = DualPrices::zero(network.vnfs().len(), network.links().len(), 4);

        let solver = Rewrite::new(ScipSolver, "pricing", shifted_completion);
        let pricing = PricingSubproblem::new(&network, &snapshot, &cfg, &solver);
        match pricing.price(&service, &duals, &mut IdGenerator::new()) {
            Err(CgError::InconsistentSolution { service: id, .. }) => assert_eq!(id, service.id),
            other => panic!("expected an inconsistent solution, got {:?}", other),
        }
    }

    #[test]
    fn test_limit_without_incumbent_is_unresolved() {
        let network = two_machines();
        let snapshot = network.snapshot(0, 4);
        let cfg = config(4);
        let service = Service::new(ServiceId::new(0), &[(VnfType(0), 1)], 1);
        let duals = DualPrices::zero(network.vnfs().len(), network.links().len(), 4);

        let solver = Rewrite::new(ScipSolver, "pricing", node_limit_without_incumbent);
        let pricing = PricingSubproblem::new(&network, &snapshot, &cfg, &solver);
        match pricing.price(&service, &duals, &mut IdGenerator::new()).unwrap() {
            PricingOutcome::Unresolved { best_value: None, stop_reason } => assert_eq!(stop_reason, Some(StopReason::NodeLimit)),
            other => panic!("expected an unresolved pricing, got {:?}", other),
        }
    }

    #[test]
    fn test_gap_stop_is_reported_on_the_column() {
        let network = two_machines();
        let snapshot = network.snapshot(0, 4);
        let cfg = config(4);
        let service = Service::new(ServiceId::new(0), &[(VnfType(0), 1)], 1);
        let duals = DualPrices::zero(network.vnfs().len(), network.links().len(), 4);

        let gap_stop = |_: &crate::solver::Model, solution: Solution| Solution { status: SolveStatus::Feasible, stop_reason: Some(StopReason::GapReached), ..solution };
        let solver = Rewrite::new(ScipSolver, "pricing", gap_stop);
        let pricing = PricingSubproblem::new(&network, &snapshot, &cfg, &solver);
        match pricing.price(&service, &duals, &mut IdGenerator::new()).unwrap() {
            PricingOutcome::Column { stop_reason, .. } => assert_eq!(stop_reason, Some(StopReason::GapReached)),
            other => panic!("expected a column, got {:?}", other),
        }
    }

    #[test]
    fn test_node_limit_with_poor_incumbent_is_unresolved() {
        let network = two_machines();
        let snapshot = network.snapshot(0, 4);
        let cfg = config(4);
        let service = Service::new(ServiceId::new(0), &[(VnfType(0), 1)], 1);
        let mut duals = DualPrices::zero(network.vnfs().len(), network.links().len(), 4);
        duals.set_service(service.id, 2.0);

        let node_stop = |_: &crate::solver::Model, solution: Solution| Solution { status: SolveStatus::Feasible, stop_reason: Some(StopReason::NodeLimit), ..solution };
        let solver = Rewrite::new(ScipSolver, "pricing", node_stop);
        let pricing = PricingSubproblem::new(&network, &snapshot, &cfg, &solver);
        assert!(matches!(
            pricing.price(&service, &duals, &mut IdGenerator::new()).unwrap(),
            PricingOutcome::Unresolved { best_value: Some(_), stop_reason: Some(StopReason::NodeLimit) }
        ));
    }
}
