use std::collections::HashSet;

use crate::column_generation::pricing::service_window;
use crate::config::CgConfig;
use crate::domain::configuration::{Configuration, Placement, ServicePlan, Transmission};
use crate::domain::id::{IdGenerator, MachineId, VnfId};
use crate::domain::network::{DirectedArc, Network, SubstrateSnapshot};
use crate::domain::service::Service;

/// Earliest-fit seed column: every middlebox goes to the VNF on which it finishes first, given
/// the previous one. Transmissions take the fewest-hop path with enough residual bandwidth.
pub fn greedy_configuration(service: &Service, network: &Network, snapshot: &SubstrateSnapshot, config: &CgConfig, ids: &mut IdGenerator) -> Option<Configuration> {
    let plan = greedy_plan(service, network, snapshot)?;
    let profit = config.column_profit(plan.completion_time(service), plan.route_weight(network), snapshot.horizon());
    Some(Configuration::from_plan(ids.next_configuration_id(), service, plan, network, snapshot.horizon(), profit))
}

pub fn greedy_plan(service: &Service, network: &Network, snapshot: &SubstrateSnapshot) -> Option<ServicePlan> {
    let (earliest, latest_end) = service_window(service, snapshot)?;
    let tau = service.transmission_time() as usize;
    let middleboxes = service.middleboxes();

    let mut placements: Vec<Placement> = Vec::with_capacity(middleboxes.len());
    let mut transmissions: Vec<Option<Transmission>> = Vec::with_capacity(middleboxes.len().saturating_sub(1));
    let mut own: HashSet<(VnfId, usize)> = HashSet::new();

    for (n, middlebox) in middleboxes.iter().enumerate() {
        let p = middlebox.processing_time as usize;
        let mut best: Option<(usize, Placement, Option<Transmission>)> = None;

        for vnf in network.vnfs_of_type(middlebox.vnf_type) {
            let candidate = match placements.last() {
                None => earliest_start(snapshot, &own, vnf.id, earliest, p, latest_end).map(|start| (start, None)),
                Some(previous) => {
                    let ready = previous.start as usize + middleboxes[n - 1].processing_time as usize;
                    let previous_host = network.vnf(previous.vnf)?.host;

                    if previous_host == vnf.host {
                        earliest_start(snapshot, &own, vnf.id, ready, p, latest_end).map(|start| (start, None))
                    } else {
                        transmit_then_start(service, network, snapshot, &own, previous_host, vnf.id, ready, p, tau, latest_end)
                    }
                }
            };

            if let Some((start, transmission)) = candidate {
                let end = start + p;
                if best.as_ref().is_none_or(|(best_end, ..)| end < *best_end) {
                    best = Some((end, Placement { vnf: vnf.id, start: start as u32 }, transmission));
                }
            }
        }

        let (_, placement, transmission) = best?;
        own.extend((placement.start as usize..placement.start as usize + p).map(|t| (placement.vnf, t)));
        if n > 0 {
            transmissions.push(transmission);
        }
        placements.push(placement);
    }

    Some(ServicePlan { placements, transmissions })
}

/// First start at or after `from` for which `vnf` is free for `p` slots, ending by `latest_end`.
fn earliest_start(snapshot: &SubstrateSnapshot, own: &HashSet<(VnfId, usize)>, vnf: VnfId, from: usize, p: usize, latest_end: usize) -> Option<usize> {
    let last = latest_end.checked_sub(p)?;
    (from..=last).find(|&start| (start..start + p).all(|t| snapshot.vnf_available(vnf, t) && !own.contains(&(vnf, t))))
}

/// Earliest transmission from `from_host` to the host of `vnf`, followed by the earliest start on `vnf`.
#[allow(clippy::too_many_arguments)]
fn transmit_then_start(
    service: &Service,
    network: &Network,
    snapshot: &SubstrateSnapshot,
    own: &HashSet<(VnfId, usize)>,
    from_host: MachineId,
    vnf: VnfId,
    ready: usize,
    p: usize,
    tau: usize,
    latest_end: usize,
) -> Option<(usize, Option<Transmission>)> {
    let to_host = network.vnf(vnf)?.host;
    let last_transmission = latest_end.checked_sub(p + tau)?;

    for t in ready..=last_transmission {
        let fits = |arc: &DirectedArc| (t..t + tau).all(|s| snapshot.link_residual(arc.link, s) >= service.bandwidth);
        let Some(arcs) = network.shortest_path(from_host, to_host, fits) else { continue };

        if let Some(start) = earliest_start(snapshot, own, vnf, t + tau, p, latest_end) {
            return Some((start, Some(Transmission { arcs, start: t as u32 })));
        }
    }

    None
}
