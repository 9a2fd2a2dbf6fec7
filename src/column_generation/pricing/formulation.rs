//! Time-indexed pricing MIP of one service.
//!
//! Variables, all relative to the horizon start:
//!
//! * `y[n][f][δ]` middlebox n starts on VNF f at δ. Only created for VNFs of the right type
//!   that are free in the snapshot over the whole processing time, and for starts that leave
//!   room for the rest of the chain before the due slot.
//! * `z[n][f][δ]` middlebox n occupies f at δ, the sum of `y` over the last `p_n` slots.
//! * `l[a][e]` virtual link e is routed over arc a.
//! * `θ[δ][e]` / `θ̂[δ][e]` virtual link e starts / occupies bandwidth at δ.
//! * `w[l][e][δ]` the product of "e is routed over link l" and `θ̂[δ][e]`.
//! * `v` the completion time of the last middlebox.
//!
//! Machine hosting `h[n][m]` only appears as the linear expression `Σ_{f on m} Σ_δ y[n][f][δ]`
//! inside the flow conservation rows.

use std::collections::{BTreeMap, HashMap};

use crate::column_generation::master::DualPrices;
use crate::column_generation::verification::RawAssignment;
use crate::config::CgConfig;
use crate::domain::id::{LinkId, MachineId, VnfId};
use crate::domain::network::{DirectedArc, Network, SubstrateSnapshot};
use crate::domain::service::Service;
use crate::domain::time_matrix::TimeMatrix;
use crate::solver::{Cmp, LinExpr, Model, Sense, Solution, VarId};

/// Bounded start window of one middlebox, `latest` inclusive.
#[derive(Debug, Clone, Copy)]
struct StartWindow {
    earliest: usize,
    latest: usize,
}

#[derive(Debug, Clone, Copy)]
struct StartVar {
    middlebox: usize,
    vnf: VnfId,
    slot: usize,
    var: VarId,
}

#[derive(Debug, Clone, Copy)]
struct ArcVar {
    virtual_link: usize,
    arc: DirectedArc,
    var: VarId,
}

#[derive(Debug, Clone, Copy)]
struct SlotVar {
    index: usize,
    slot: usize,
    var: VarId,
}

#[derive(Debug, Clone, Copy)]
struct CarriedVar {
    link: LinkId,
    slot: usize,
    var: VarId,
}

/// The built MIP together with the variable maps needed to read a solution back.
#[derive(Debug)]
pub(crate) struct PricingFormulation {
    model: Model,
    horizon: usize,
    vnf_count: usize,
    link_count: usize,
    bandwidth: i64,
    chain_len: usize,
    y: Vec<StartVar>,
    z: Vec<(VnfId, usize, VarId)>,
    l: Vec<ArcVar>,
    theta: Vec<SlotVar>,
    w: Vec<CarriedVar>,
    v: VarId,
}

impl PricingFormulation {
    /// Builds the pricing MIP for `service` under `duals`.
    ///
    /// # Returns
    /// `None` if the service cannot be scheduled in the snapshot at all, e.g. because a
    /// middlebox has no free VNF of its type inside its window or the chain is empty.
    pub(crate) fn build(
        service: &Service,
        network: &Network,
        snapshot: &SubstrateSnapshot,
        config: &CgConfig,
        duals: &DualPrices,
        window: (usize, usize),
    ) -> Option<Self> {
        let horizon = snapshot.horizon();
        let middleboxes = service.middleboxes();
        let tau = service.transmission_time() as usize;
        let bandwidth = service.bandwidth;
        let (earliest, latest_end) = window;

        let windows = start_windows(service, earliest, latest_end)?;

        let mut model = Model::new(format!("pricing-service-{}", service.id), Sense::Maximize);
        model.set_objective_constant(config.admission_reward() - duals.service(service.id));

        // y and the VNF dual cost of every start.
        let mut y: Vec<StartVar> = Vec::new();
        for (n, middlebox) in middleboxes.iter().enumerate() {
            let p = middlebox.processing_time as usize;
            let first = y.len();

            for vnf in network.vnfs_of_type(middlebox.vnf_type) {
                for slot in windows[n].earliest..=windows[n].latest {
                    if !snapshot.vnf_free_over(vnf.id, slot, p) {
                        continue;
                    }
                    let cost: f64 = (slot..slot + p).map(|t| duals.vnf(vnf.id, t)).sum();
                    let var = model.add_binary(format!("y_{}_{}_{}", n, vnf.id, slot), -cost);
                    y.push(StartVar { middlebox: n, vnf: vnf.id, slot, var });
                }
            }

            if y.len() == first {
                log::debug!("Service {}: middlebox {} has no free VNF of type {:?} in its window", service.id, n, middlebox.vnf_type);
                return None;
            }

            let assign: LinExpr = y[first..].iter().map(|s| (s.var, 1.0)).collect();
            model.add_constraint(format!("assign_{}", n), assign, Cmp::Eq, 1.0);
        }

        // z and per-slot VNF exclusivity.
        let mut z = Vec::new();
        let mut occupancy: BTreeMap<(VnfId, usize), Vec<VarId>> = BTreeMap::new();
        for (n, middlebox) in middleboxes.iter().enumerate() {
            let p = middlebox.processing_time as usize;
            let mut covering: BTreeMap<(VnfId, usize), LinExpr> = BTreeMap::new();

            for start in y.iter().filter(|s| s.middlebox == n) {
                for t in start.slot..start.slot + p {
                    covering.entry((start.vnf, t)).or_default().add(start.var, -1.0);
                }
            }

            for ((vnf, t), mut expr) in covering {
                let var = model.add_continuous(format!("z_{}_{}_{}", n, vnf, t), 0.0, f64::INFINITY, 0.0);
                expr.add(var, 1.0);
                model.add_constraint(format!("occupy_{}_{}_{}", n, vnf, t), expr, Cmp::Eq, 0.0);
                occupancy.entry((vnf, t)).or_default().push(var);
                z.push((vnf, t, var));
            }
        }
        for ((vnf, t), vars) in &occupancy {
            if vars.len() > 1 {
                let expr: LinExpr = vars.iter().map(|&v| (v, 1.0)).collect();
                model.add_constraint(format!("exclusive_{}_{}", vnf, t), expr, Cmp::Le, 1.0);
            }
        }

        // Routing and transmission per virtual link.
        let mut l: Vec<ArcVar> = Vec::new();
        let mut theta: Vec<SlotVar> = Vec::new();
        let mut w: Vec<CarriedVar> = Vec::new();
        let mut carried: BTreeMap<(LinkId, usize), Vec<VarId>> = BTreeMap::new();

        for e in 0..service.virtual_links().len() {
            let p = middleboxes[e].processing_time as usize;
            let first_start = windows[e].earliest + p;
            let last_start = windows[e + 1].latest.checked_sub(tau).filter(|&t| t >= first_start);

            let mut thetas: Vec<SlotVar> = Vec::new();
            let mut routes: Vec<ArcVar> = Vec::new();

            if let Some(last_start) = last_start {
                for slot in first_start..=last_start {
                    let var = model.add_binary(format!("theta_{}_{}", e, slot), 0.0);
                    thetas.push(SlotVar { index: e, slot, var });
                }

                let busy = first_start..last_start + tau;
                for arc in network.arcs() {
                    let usable = busy.clone().any(|t| snapshot.link_residual(arc.link, t) >= bandwidth);
                    if !usable {
                        continue;
                    }
                    let weight = network.link(arc.link).map_or(0.0, |link| link.weight);
                    let var = model.add_binary(format!("l_{}_{}_{}_{}", e, arc.link, arc.from, arc.to), -config.routing_weight * weight);
                    routes.push(ArcVar { virtual_link: e, arc: *arc, var });
                }
            }

            add_flow_conservation(&mut model, network, e, &y, &routes);

            if thetas.is_empty() {
                continue;
            }

            // At most one transmission, and one iff the route is non-empty.
            let theta_sum: LinExpr = thetas.iter().map(|t| (t.var, 1.0)).collect();
            model.add_constraint(format!("transmit_once_{}", e), theta_sum.clone(), Cmp::Le, 1.0);

            let mut transmission_needs_route = theta_sum.clone();
            for route in &routes {
                transmission_needs_route.add(route.var, -1.0);
                let mut needs_transmission = theta_sum.clone();
                needs_transmission.add(route.var, -1.0);
                model.add_constraint(format!("route_needs_transmission_{}_{}", e, route.var.index()), needs_transmission, Cmp::Ge, 0.0);
            }
            model.add_constraint(format!("transmission_needs_route_{}", e), transmission_needs_route, Cmp::Le, 0.0);

            // A link is used in at most one direction per virtual link.
            let mut per_link: BTreeMap<LinkId, LinExpr> = BTreeMap::new();
            for route in &routes {
                per_link.entry(route.arc.link).or_default().add(route.var, 1.0);
            }
            for (link, expr) in &per_link {
                if expr.terms().len() > 1 {
                    model.add_constraint(format!("one_direction_{}_{}", e, link), expr.clone(), Cmp::Le, 1.0);
                }
            }

            // θ̂ and its product with the link usage.
            let busy_end = thetas.last().map_or(0, |t| t.slot + tau);
            for slot in thetas[0].slot..busy_end.min(horizon) {
                let mut window_expr: LinExpr = thetas.iter().filter(|t| t.slot <= slot && slot < t.slot + tau).map(|t| (t.var, -1.0)).collect();
                let theta_hat = model.add_continuous(format!("theta_hat_{}_{}", e, slot), 0.0, f64::INFINITY, 0.0);
                window_expr.add(theta_hat, 1.0);
                model.add_constraint(format!("occupy_link_{}_{}", e, slot), window_expr, Cmp::Eq, 0.0);

                for (link, uses_link) in &per_link {
                    let price = duals.link(*link, slot) * bandwidth as f64;
                    let var = model.add_continuous(format!("w_{}_{}_{}", link, e, slot), 0.0, f64::INFINITY, -price);

                    let mut under_route = LinExpr::new().term(var, 1.0);
                    let mut both = LinExpr::new().term(theta_hat, 1.0).term(var, -1.0);
                    for &(route_var, _) in uses_link.terms() {
                        under_route.add(route_var, -1.0);
                        both.add(route_var, 1.0);
                    }
                    model.add_constraint(format!("w_route_{}_{}_{}", link, e, slot), under_route, Cmp::Le, 0.0);
                    model.add_constraint(format!("w_time_{}_{}_{}", link, e, slot), LinExpr::new().term(var, 1.0).term(theta_hat, -1.0), Cmp::Le, 0.0);
                    model.add_constraint(format!("w_both_{}_{}_{}", link, e, slot), both, Cmp::Le, 1.0);

                    carried.entry((*link, slot)).or_default().push(var);
                    w.push(CarriedVar { link: *link, slot, var });
                }
            }

            add_precedence(&mut model, e, p, tau, horizon, &y, &thetas);
            theta.extend(thetas);
            l.extend(routes);
        }

        // Successor order for co-located middleboxes without a transmission window.
        for e in 0..service.virtual_links().len() {
            add_processing_order(&mut model, e, middleboxes[e].processing_time as usize, horizon, &y);
        }

        // Link capacity, only where the carried bandwidth could exceed the residual.
        for ((link, slot), vars) in &carried {
            let residual = snapshot.link_residual(*link, *slot);
            if bandwidth * vars.len() as i64 > residual {
                let expr: LinExpr = vars.iter().map(|&v| (v, bandwidth as f64)).collect();
                model.add_constraint(format!("capacity_{}_{}", link, slot), expr, Cmp::Le, residual as f64);
            }
        }

        // Completion time of the last middlebox.
        let last = middleboxes.len().checked_sub(1)?;
        let p_last = middleboxes[last].processing_time as f64;
        let v = model.add_continuous("v", 0.0, f64::INFINITY, -config.completion_penalty(horizon));
        let mut completion: LinExpr = y.iter().filter(|s| s.middlebox == last).map(|s| (s.var, -(s.slot as f64 + p_last))).collect();
        completion.add(v, 1.0);
        model.add_constraint("completion", completion, Cmp::Eq, 0.0);

        Some(Self {
            model,
            horizon,
            vnf_count: network.vnfs().len(),
            link_count: network.links().len(),
            bandwidth,
            chain_len: middleboxes.len(),
            y,
            z,
            l,
            theta,
            w,
            v,
        })
    }

    pub(crate) fn model(&self) -> &Model {
        &self.model
    }

    /// Reads the binary decisions and the reported usage out of a solver solution.
    pub(crate) fn extract(&self, service: &Service, solution: &Solution) -> RawAssignment {
        let is_set = |var: VarId| solution.value(var) > 0.5;
        let links = service.virtual_links().len();

        let mut starts = vec![Vec::new(); self.chain_len];
        for s in self.y.iter().filter(|s| is_set(s.var)) {
            starts[s.middlebox].push((s.vnf, s.slot as u32));
        }

        let mut routes = vec![Vec::new(); links];
        for a in self.l.iter().filter(|a| is_set(a.var)) {
            routes[a.virtual_link].push(a.arc);
        }

        let mut transmission_starts = vec![Vec::new(); links];
        for t in self.theta.iter().filter(|t| is_set(t.var)) {
            transmission_starts[t.index].push(t.slot as u32);
        }

        let mut reported_vnf_usage = TimeMatrix::new(self.vnf_count, self.horizon);
        for &(vnf, slot, var) in &self.z {
            let occupied = solution.value(var).round().max(0.0) as u8;
            if occupied > 0 {
                reported_vnf_usage.add(vnf.index(), slot, occupied);
            }
        }

        let mut reported_link_usage = TimeMatrix::new(self.link_count, self.horizon);
        for c in &self.w {
            let carried = solution.value(c.var).round().max(0.0) as i64;
            if carried > 0 {
                reported_link_usage.add(c.link.index(), c.slot, carried * self.bandwidth);
            }
        }

        RawAssignment {
            service: service.id,
            starts,
            routes,
            transmission_starts,
            reported_vnf_usage,
            reported_link_usage,
            reported_completion: solution.value(self.v).round().max(0.0) as u32,
        }
    }
}

/// Start windows that leave room for the predecessors after `earliest` and for the successors
/// before `latest_end`.
fn start_windows(service: &Service, earliest: usize, latest_end: usize) -> Option<Vec<StartWindow>> {
    let processing: Vec<usize> = service.middleboxes().iter().map(|m| m.processing_time as usize).collect();
    let total: usize = processing.iter().sum();
    if processing.is_empty() || earliest + total > latest_end {
        return None;
    }

    let mut windows = Vec::with_capacity(processing.len());
    let mut before = 0;
    for (n, p) in processing.iter().enumerate() {
        let after: usize = processing[n + 1..].iter().sum();
        windows.push(StartWindow { earliest: earliest + before, latest: latest_end - after - p });
        before += p;
    }
    Some(windows)
}

/// `out − in − h[e][m] + h[e+1][m] = 0` for every machine m.
fn add_flow_conservation(model: &mut Model, network: &Network, e: usize, y: &[StartVar], routes: &[ArcVar]) {
    let mut rows: HashMap<MachineId, LinExpr> = HashMap::new();

    for route in routes {
        rows.entry(route.arc.from).or_default().add(route.var, 1.0);
        rows.entry(route.arc.to).or_default().add(route.var, -1.0);
    }
    for start in y {
        let coef = if start.middlebox == e {
            -1.0
        } else if start.middlebox == e + 1 {
            1.0
        } else {
            continue;
        };
        if let Some(vnf) = network.vnf(start.vnf) {
            rows.entry(vnf.host).or_default().add(start.var, coef);
        }
    }

    let mut rows: Vec<(MachineId, LinExpr)> = rows.into_iter().collect();
    rows.sort_by_key(|(m, _)| *m);
    for (machine, expr) in rows {
        model.add_constraint(format!("flow_{}_{}", e, machine), expr, Cmp::Eq, 0.0);
    }
}

/// Starts of middlebox `n` at or before `slot`.
fn started_by(y: &[StartVar], n: usize, slot: usize) -> impl Iterator<Item = VarId> + '_ {
    y.iter().filter(move |s| s.middlebox == n && s.slot <= slot).map(|s| s.var)
}

/// Starts of middlebox `n` that are still processing after `slot`.
fn running_after(y: &[StartVar], n: usize, p: usize, slot: usize) -> impl Iterator<Item = VarId> + '_ {
    y.iter().filter(move |s| s.middlebox == n && s.slot + p > slot).map(|s| s.var)
}

fn add_pairwise_row(model: &mut Model, name: String, first: Vec<VarId>, second: Vec<VarId>) {
    if first.is_empty() || second.is_empty() {
        return;
    }
    let expr: LinExpr = first.into_iter().chain(second).map(|v| (v, 1.0)).collect();
    model.add_constraint(name, expr, Cmp::Le, 1.0);
}

/// Middlebox e + 1 starts no earlier than the end of middlebox e.
fn add_processing_order(model: &mut Model, e: usize, p: usize, horizon: usize, y: &[StartVar]) {
    for slot in 0..horizon {
        let successor: Vec<VarId> = started_by(y, e + 1, slot).collect();
        let running: Vec<VarId> = running_after(y, e, p, slot).collect();
        add_pairwise_row(model, format!("order_{}_{}", e, slot), successor, running);
    }
}

/// Transmission of e starts after middlebox e ends, middlebox e + 1 starts after it ends.
fn add_precedence(model: &mut Model, e: usize, p: usize, tau: usize, horizon: usize, y: &[StartVar], thetas: &[SlotVar]) {
    for slot in 0..horizon {
        let transmitted: Vec<VarId> = thetas.iter().filter(|t| t.slot <= slot).map(|t| t.var).collect();
        let running: Vec<VarId> = running_after(y, e, p, slot).collect();
        add_pairwise_row(model, format!("transmit_after_{}_{}", e, slot), transmitted, running);

        let successor: Vec<VarId> = started_by(y, e + 1, slot).collect();
        let in_flight: Vec<VarId> = thetas.iter().filter(|t| t.slot + tau > slot).map(|t| t.var).collect();
        add_pairwise_row(model, format!("receive_after_{}_{}", e, slot), successor, in_flight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::{NetworkId, ServiceId};
    use crate::domain::network::VnfType;

    #[test]
    fn test_start_windows_leave_room_for_chain() {
        let service = Service::new(ServiceId::new(0), &[(VnfType(0), 2), (VnfType(1), 1), (VnfType(0), 3)], 1);
        let windows = start_windows(&service, 1, 10).unwrap();

        assert_eq!((windows[0].earliest, windows[0].latest), (1, 4));
        assert_eq!((windows[1].earliest, windows[1].latest), (3, 6));
        assert_eq!((windows[2].earliest, windows[2].latest), (4, 7));
        assert!(start_windows(&service, 5, 10).is_none());
    }

    #[test]
    fn test_no_candidate_vnf_gives_no_model() {
        let mut network = Network::new(NetworkId::new(0), 1, false);
        network.add_vnf(MachineId::new(0), VnfType(0)).unwrap();
        let snapshot = network.snapshot(0, 4);
        let duals = DualPrices::zero(1, 0, 4);
        let service = Service::new(ServiceId::new(0), &[(VnfType(1), 1)], 1);

        assert!(PricingFormulation::build(&service, &network, &snapshot, &CgConfig::default(), &duals, (0, 4)).is_none());
    }

    #[test]
    fn test_empty_chain_gives_no_model() {
        let mut network = Network::new(NetworkId::new(0), 1, false);
        network.add_vnf(MachineId::new(0), VnfType(0)).unwrap();
        let snapshot = network.snapshot(0, 4);
        let duals = DualPrices::zero(1, 0, 4);
        let service = Service::new(ServiceId::new(0), &[], 1);

        assert!(start_windows(&service, 0, 4).is_none());
        assert!(PricingFormulation::build(&service, &network, &snapshot, &CgConfig::default(), &duals, (0, 4)).is_none());
    }
}
