use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vnf_cg_scheduler::column_generation::driver::ColumnGeneration;
use vnf_cg_scheduler::column_generation::master::DualPrices;
use vnf_cg_scheduler::column_generation::pricing::{PricingOutcome, PricingSubproblem};
use vnf_cg_scheduler::column_generation::verification::{Inconsistency, RawAssignment, verify_admitted, verify_assignment};
use vnf_cg_scheduler::config::CgConfig;
use vnf_cg_scheduler::domain::configuration::Configuration;
use vnf_cg_scheduler::domain::id::{BatchId, IdGenerator, MachineId, NetworkId, ServiceId};
use vnf_cg_scheduler::domain::network::{Network, VnfType};
use vnf_cg_scheduler::domain::service::Service;
use vnf_cg_scheduler::solver::ScipSolver;

const HORIZON: usize = 8;

/// Path 0 - 1 - 2, sometimes closed to a triangle, with one VNF per type and a spare one.
fn random_network(rng: &mut StdRng) -> Network {
    let mut network = Network::new(NetworkId::new(0), 3, false);
    network.add_link(MachineId::new(0), MachineId::new(1), rng.random_range(2..=10), 1.0).unwrap();
    network.add_link(MachineId::new(1), MachineId::new(2), rng.random_range(2..=10), 1.0).unwrap();
    if rng.random_bool(0.5) {
        network.add_link(MachineId::new(0), MachineId::new(2), rng.random_range(2..=10), 2.0).unwrap();
    }

    for vnf_type in 0..3 {
        network.add_vnf(MachineId::new(rng.random_range(0..3)), VnfType(vnf_type)).unwrap();
    }
    network.add_vnf(MachineId::new(rng.random_range(0..3)), VnfType(rng.random_range(0..3))).unwrap();
    network
}

fn random_services(rng: &mut StdRng, count: usize) -> Vec<Service> {
    (0..count)
        .map(|s| {
            let length = rng.random_range(1..=3);
            let chain: Vec<(VnfType, u32)> = (0..length).map(|_| (VnfType(rng.random_range(0..3)), rng.random_range(1..=2))).collect();
            let bandwidth = rng.random_range(1..=4);
            Service::new(ServiceId::new(s), &chain, bandwidth).with_traffic_size(rng.random_range(bandwidth..=2 * bandwidth))
        })
        .collect()
}

fn zero_dual_column(network: &Network, service: &Service, config: &CgConfig, ids: &mut IdGenerator) -> Option<Configuration> {
    let snapshot = network.snapshot(0, HORIZON);
    let duals = DualPrices::zero(network.vnfs().len(), network.links().len(), HORIZON);
    match PricingSubproblem::new(network, &snapshot, config, &ScipSolver).price(service, &duals, ids).unwrap() {
        PricingOutcome::Column { configuration, .. } => Some(configuration),
        _ => None,
    }
}

#[test]
fn test_random_columns_survive_round_trip() {
    let config = CgConfig { horizon: HORIZON, ..CgConfig::default() };
    let mut ids = IdGenerator::new();
    let mut checked = 0;

    for seed in 0..4 {
        let mut rng = StdRng::seed_from_u64(seed);
        let network = random_network(&mut rng);
        let snapshot = network.snapshot(0, HORIZON);

        for service in random_services(&mut rng, 3) {
            let Some(configuration) = zero_dual_column(&network, &service, &config, &mut ids) else { continue };

            let plan = verify_assignment(&service, &network, &snapshot, &RawAssignment::from_configuration(&configuration)).unwrap();
            assert_eq!(&plan, configuration.plan());
            assert_eq!(plan.completion_time(&service), configuration.completion_time());
            checked += 1;
        }
    }

    assert!(checked > 0);
}

#[test]
fn test_tampered_usage_is_detected() {
    let config = CgConfig { horizon: HORIZON, ..CgConfig::default() };
    let mut rng = StdRng::seed_from_u64(7);
    let network = random_network(&mut rng);
    let snapshot = network.snapshot(0, HORIZON);
    let service = Service::new(ServiceId::new(0), &[(VnfType(0), 2), (VnfType(1), 1)], 2);

    let configuration = zero_dual_column(&network, &service, &config, &mut IdGenerator::new()).unwrap();
    let honest = RawAssignment::from_configuration(&configuration);

    let mut late = honest.clone();
    late.reported_completion += 1;
    let issues = verify_assignment(&service, &network, &snapshot, &late).unwrap_err();
    assert!(issues.iter().any(|i| matches!(i, Inconsistency::CompletionMismatch { .. })));

    let mut phantom = honest.clone();
    let (f, slot) = (0..phantom.reported_vnf_usage.rows())
        .flat_map(|f| (0..HORIZON).map(move |slot| (f, slot)))
        .find(|&(f, slot)| phantom.reported_vnf_usage.get(f, slot) == 0)
        .unwrap();
    phantom.reported_vnf_usage.set(f, slot, 1);
    let issues = verify_assignment(&service, &network, &snapshot, &phantom).unwrap_err();
    assert!(issues.iter().any(|i| matches!(i, Inconsistency::VnfUsageMismatch { reported: 1, reconstructed: 0, .. })));

    let mut doubled = honest;
    let first_start = doubled.starts[0][0];
    doubled.starts[0].push(first_start);
    let issues = verify_assignment(&service, &network, &snapshot, &doubled).unwrap_err();
    assert_eq!(issues, vec![Inconsistency::MultipleStarts { middlebox: 0, count: 2 }]);
}

#[test]
fn test_random_admitted_schedules_respect_resources_and_order() {
    let config = CgConfig { horizon: HORIZON, max_iterations: 10, ..CgConfig::default() };

    for seed in 10..13 {
        let mut rng = StdRng::seed_from_u64(seed);
        let network = random_network(&mut rng);
        let snapshot = network.snapshot(0, HORIZON);
        let services = random_services(&mut rng, 3);

        let outcome = ColumnGeneration::new(BatchId::new(0), &network, &snapshot, &config, &ScipSolver).run(&services, &mut IdGenerator::new());
        assert!(outcome.error.is_none(), "seed {}: {:?}", seed, outcome.error);

        let admitted: Vec<&Configuration> = outcome.selected_configurations().collect();
        assert!(verify_admitted(&admitted, &snapshot).is_empty());

        for configuration in admitted {
            let service = services.iter().find(|s| s.id == configuration.service()).unwrap();
            let plan = configuration.plan();
            let tau = service.transmission_time();

            for (e, transmission) in plan.transmissions.iter().enumerate() {
                let ready = plan.placements[e].start + service.middleboxes()[e].processing_time;
                let input_ready = match transmission {
                    Some(t) => {
                        assert!(t.start >= ready);
                        t.start + tau
                    }
                    None => ready,
                };
                assert!(plan.placements[e + 1].start >= input_ready);
            }
        }
    }
}
