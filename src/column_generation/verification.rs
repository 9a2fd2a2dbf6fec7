//! Consistency checker for pricing solutions.
//!
//! Pricing reports its solution as a [`RawAssignment`]: the binary start, routing and
//! transmission decisions plus the usage values the solver computed for them. The checker
//! rebuilds the usage independently from the binary decisions, compares both and checks every
//! scheduling rule of the chain against the substrate snapshot. A consistent assignment is
//! turned into a [`ServicePlan`].

use std::collections::HashMap;

use thiserror::Error;

use crate::column_generation::pricing::service_window;
use crate::domain::configuration::{Configuration, Placement, ServicePlan, Transmission};
use crate::domain::id::{LinkId, MachineId, ServiceId, VnfId};
use crate::domain::network::{DirectedArc, Network, SubstrateSnapshot};
use crate::domain::service::Service;
use crate::domain::time_matrix::TimeMatrix;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Inconsistency {
    #[error("middlebox {middlebox} has no start")]
    MissingStart { middlebox: usize },

    #[error("middlebox {middlebox} starts {count} times")]
    MultipleStarts { middlebox: usize, count: usize },

    #[error("middlebox {middlebox} placed on {vnf:?} of the wrong type")]
    TypeMismatch { middlebox: usize, vnf: VnfId },

    #[error("middlebox {middlebox} starting at {start} runs past the horizon")]
    OutsideHorizon { middlebox: usize, start: u32 },

    #[error("middlebox {middlebox} starts at {start} before the service arrives at {arrival}")]
    StartBeforeArrival { middlebox: usize, start: u32, arrival: u32 },

    #[error("completion {completion} misses the due slot {due}")]
    DeadlineMissed { completion: u32, due: u32 },

    #[error("{vnf:?} is already committed at slot {slot}")]
    VnfUnavailable { vnf: VnfId, slot: usize },

    #[error("{vnf:?} processes more than one middlebox at slot {slot}")]
    VnfConflict { vnf: VnfId, slot: usize },

    #[error("virtual link {virtual_link} has {count} transmission starts")]
    MultipleTransmissions { virtual_link: usize, count: usize },

    #[error("virtual link {virtual_link} connects different machines but is never transmitted")]
    MissingTransmission { virtual_link: usize },

    #[error("virtual link {virtual_link} is transmitted although no route is needed")]
    UnexpectedTransmission { virtual_link: usize },

    #[error("route of virtual link {virtual_link} is not a path from {from:?} to {to:?}")]
    BrokenRoute { virtual_link: usize, from: MachineId, to: MachineId },

    #[error("virtual link {virtual_link} starts at {start} before its source finishes at {ready}")]
    TransmissionBeforeCompletion { virtual_link: usize, start: u32, ready: u32 },

    #[error("middlebox {middlebox} starts at {start} before its input is ready at {ready}")]
    StartBeforePredecessor { middlebox: usize, start: u32, ready: u32 },

    #[error("{link:?} carries {load} at slot {slot} with only {residual} left")]
    CapacityExceeded { link: LinkId, slot: usize, load: i64, residual: i64 },

    #[error("reported usage {reported} of {vnf:?} at slot {slot}, reconstructed {reconstructed}")]
    VnfUsageMismatch { vnf: VnfId, slot: usize, reported: u8, reconstructed: u8 },

    #[error("reported usage {reported} of {link:?} at slot {slot}, reconstructed {reconstructed}")]
    LinkUsageMismatch { link: LinkId, slot: usize, reported: i64, reconstructed: i64 },

    #[error("reported completion {reported}, reconstructed {reconstructed}")]
    CompletionMismatch { reported: u32, reconstructed: u32 },

    #[error("reported usage matrices do not cover the network and horizon")]
    ShapeMismatch,
}

/// Solver-level view of one pricing solution, relative to the horizon start.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAssignment {
    pub service: ServiceId,

    /// Per middlebox, every `(vnf, slot)` with `y = 1`.
    pub starts: Vec<Vec<(VnfId, u32)>>,

    /// Per virtual link, every arc with `l = 1`.
    pub routes: Vec<Vec<DirectedArc>>,

    /// Per virtual link, every slot with `theta = 1`.
    pub transmission_starts: Vec<Vec<u32>>,

    /// Occupancy derived from the solver's `z`.
    pub reported_vnf_usage: TimeMatrix<u8>,

    /// Bandwidth derived from the solver's `w`.
    pub reported_link_usage: TimeMatrix<i64>,

    pub reported_completion: u32,
}

impl RawAssignment {
    /// Builds the assignment a solver would report for `plan`, with reported usage taken from `configuration`.
    pub fn from_configuration(configuration: &Configuration) -> Self {
        let plan = configuration.plan();
        Self {
            service: configuration.service(),
            starts: plan.placements.iter().map(|p| vec![(p.vnf, p.start)]).collect(),
            routes: plan.transmissions.iter().map(|t| t.as_ref().map(|t| t.arcs.clone()).unwrap_or_default()).collect(),
            transmission_starts: plan.transmissions.iter().map(|t| t.as_ref().map(|t| vec![t.start]).unwrap_or_default()).collect(),
            reported_vnf_usage: configuration.vnf_usage().clone(),
            reported_link_usage: configuration.link_usage().clone(),
            reported_completion: configuration.completion_time(),
        }
    }
}

/// Checks a raw pricing solution and turns it into a plan.
///
/// # Returns
/// The plan on success, otherwise every inconsistency found.
pub fn verify_assignment(service: &Service, network: &Network, snapshot: &SubstrateSnapshot, raw: &RawAssignment) -> Result<ServicePlan, Vec<Inconsistency>> {
    let mut issues = Vec::new();
    let horizon = snapshot.horizon();
    let tau = service.transmission_time();
    let (earliest, latest_end) = service_window(service, snapshot).unwrap_or((0, 0));

    let mut placements = Vec::with_capacity(service.chain_len());
    for (n, middlebox) in service.middleboxes().iter().enumerate() {
        let starts = raw.starts.get(n).map(Vec::as_slice).unwrap_or_default();
        match starts {
            [] => issues.push(Inconsistency::MissingStart { middlebox: n }),
            [(vnf, start)] => {
                if network.vnf(*vnf).is_none_or(|v| v.vnf_type != middlebox.vnf_type) {
                    issues.push(Inconsistency::TypeMismatch { middlebox: n, vnf: *vnf });
                }
                if (*start + middlebox.processing_time) as usize > horizon {
                    issues.push(Inconsistency::OutsideHorizon { middlebox: n, start: *start });
                }
                if (*start as usize) < earliest {
                    issues.push(Inconsistency::StartBeforeArrival { middlebox: n, start: *start, arrival: earliest as u32 });
                }
                placements.push(Placement { vnf: *vnf, start: *start });
            }
            _ => issues.push(Inconsistency::MultipleStarts { middlebox: n, count: starts.len() }),
        }
    }

    if !issues.is_empty() {
        return Err(issues);
    }

    // Rebuild r from y.
    let mut vnf_usage: TimeMatrix<u8> = TimeMatrix::new(network.vnfs().len(), horizon);
    for (middlebox, placement) in service.middleboxes().iter().zip(&placements) {
        let start = placement.start as usize;
        for slot in start..start + middlebox.processing_time as usize {
            if vnf_usage.get(placement.vnf.index(), slot) > 0 {
                issues.push(Inconsistency::VnfConflict { vnf: placement.vnf, slot });
            }
            if !snapshot.vnf_available(placement.vnf, slot) {
                issues.push(Inconsistency::VnfUnavailable { vnf: placement.vnf, slot });
            }
            vnf_usage.set(placement.vnf.index(), slot, 1);
        }
    }

    // Routes, transmissions and chain order.
    let mut transmissions = Vec::with_capacity(service.virtual_links().len());
    let mut link_usage: TimeMatrix<i64> = TimeMatrix::new(network.links().len(), horizon);

    for (e, virtual_link) in service.virtual_links().iter().enumerate() {
        let from = placements[e];
        let to = placements[e + 1];
        let from_host = network.vnf(from.vnf).map(|v| v.host);
        let to_host = network.vnf(to.vnf).map(|v| v.host);
        let route = raw.routes.get(e).map(Vec::as_slice).unwrap_or_default();
        let thetas = raw.transmission_starts.get(e).map(Vec::as_slice).unwrap_or_default();

        let ready = from.start + service.middleboxes()[e].processing_time;
        let mut input_ready = ready;

        let (Some(from_host), Some(to_host)) = (from_host, to_host) else {
            transmissions.push(None);
            continue;
        };

        if !is_simple_path(route, from_host, to_host) {
            issues.push(Inconsistency::BrokenRoute { virtual_link: e, from: from_host, to: to_host });
        }

        let transmission = match (route.is_empty(), thetas) {
            (true, []) => None,
            (true, _) => {
                issues.push(Inconsistency::UnexpectedTransmission { virtual_link: e });
                None
            }
            (false, []) => {
                issues.push(Inconsistency::MissingTransmission { virtual_link: e });
                None
            }
            (false, [start]) => {
                if *start < ready {
                    issues.push(Inconsistency::TransmissionBeforeCompletion { virtual_link: e, start: *start, ready });
                }
                for arc in route {
                    for slot in *start as usize..(*start + tau) as usize {
                        if slot < horizon {
                            link_usage.add(arc.link.index(), slot, virtual_link.bandwidth);
                        }
                    }
                }
                input_ready = input_ready.max(*start + tau);
                Some(Transmission { arcs: route.to_vec(), start: *start })
            }
            (false, _) => {
                issues.push(Inconsistency::MultipleTransmissions { virtual_link: e, count: thetas.len() });
                None
            }
        };

        if to.start < input_ready {
            issues.push(Inconsistency::StartBeforePredecessor { middlebox: e + 1, start: to.start, ready: input_ready });
        }
        transmissions.push(transmission);
    }

    for (l, slot, load) in link_usage.nonzero() {
        let link = LinkId::new(l);
        let residual = snapshot.link_residual(link, slot);
        if load > residual {
            issues.push(Inconsistency::CapacityExceeded { link, slot, load, residual });
        }
    }

    // Rebuild v from y.
    let completion = service.middleboxes().last().zip(placements.last()).map_or(0, |(m, p)| p.start + m.processing_time);
    if completion as usize > latest_end {
        let due = service.due_slot().map_or(latest_end as u32, |d| d.saturating_sub(snapshot.start()));
        issues.push(Inconsistency::DeadlineMissed { completion, due });
    }

    compare_usage(raw, &vnf_usage, &link_usage, completion, &mut issues);

    if issues.is_empty() { Ok(ServicePlan { placements, transmissions }) } else { Err(issues) }
}

fn compare_usage(raw: &RawAssignment, vnf_usage: &TimeMatrix<u8>, link_usage: &TimeMatrix<i64>, completion: u32, issues: &mut Vec<Inconsistency>) {
    let same_shape = |rows: usize, slots: usize, other_rows: usize, other_slots: usize| rows == other_rows && slots == other_slots;
    if !same_shape(raw.reported_vnf_usage.rows(), raw.reported_vnf_usage.slots(), vnf_usage.rows(), vnf_usage.slots())
        || !same_shape(raw.reported_link_usage.rows(), raw.reported_link_usage.slots(), link_usage.rows(), link_usage.slots())
    {
        issues.push(Inconsistency::ShapeMismatch);
        return;
    }

    for f in 0..vnf_usage.rows() {
        for slot in 0..vnf_usage.slots() {
            let (reported, reconstructed) = (raw.reported_vnf_usage.get(f, slot), vnf_usage.get(f, slot));
            if reported != reconstructed {
                issues.push(Inconsistency::VnfUsageMismatch { vnf: VnfId::new(f), slot, reported, reconstructed });
            }
        }
    }
    for l in 0..link_usage.rows() {
        for slot in 0..link_usage.slots() {
            let (reported, reconstructed) = (raw.reported_link_usage.get(l, slot), link_usage.get(l, slot));
            if reported != reconstructed {
                issues.push(Inconsistency::LinkUsageMismatch { link: LinkId::new(l), slot, reported, reconstructed });
            }
        }
    }

    if raw.reported_completion != completion {
        issues.push(Inconsistency::CompletionMismatch { reported: raw.reported_completion, reconstructed: completion });
    }
}

/// Whether `arcs` form exactly one simple path from `source` to `target` (empty iff they coincide).
fn is_simple_path(arcs: &[DirectedArc], source: MachineId, target: MachineId) -> bool {
    if source == target {
        return arcs.is_empty();
    }

    let mut next: HashMap<MachineId, DirectedArc> = HashMap::new();
    for arc in arcs {
        if next.insert(arc.from, *arc).is_some() {
            return false;
        }
    }

    let mut current = source;
    let mut visited = 0;
    while current != target {
        let Some(arc) = next.get(&current) else { return false };
        current = arc.to;
        visited += 1;
        if visited > arcs.len() {
            return false;
        }
    }

    visited == arcs.len()
}

/// Re-checks selected configurations of different services against each other and the snapshot.
///
/// Every VNF slot may be used once in total and no link may carry more than its residual bandwidth.
pub fn verify_admitted(selected: &[&Configuration], snapshot: &SubstrateSnapshot) -> Vec<Inconsistency> {
    let mut issues = Vec::new();
    let Some(first) = selected.first() else { return issues };

    let mut vnf_load: TimeMatrix<u8> = TimeMatrix::new(first.vnf_usage().rows(), first.vnf_usage().slots());
    let mut link_load: TimeMatrix<i64> = TimeMatrix::new(first.link_usage().rows(), first.link_usage().slots());

    for configuration in selected {
        for (f, slot, _) in configuration.vnf_usage().nonzero() {
            let vnf = VnfId::new(f);
            if vnf_load.get(f, slot) > 0 {
                issues.push(Inconsistency::VnfConflict { vnf, slot });
            } else if !snapshot.vnf_available(vnf, slot) {
                issues.push(Inconsistency::VnfUnavailable { vnf, slot });
            }
            vnf_load.add(f, slot, 1);
        }
        for (l, slot, amount) in configuration.link_usage().nonzero() {
            link_load.add(l, slot, amount);
        }
    }

    for (l, slot, load) in link_load.nonzero() {
        let link = LinkId::new(l);
        let residual = snapshot.link_residual(link, slot);
        if load > residual {
            issues.push(Inconsistency::CapacityExceeded { link, slot, load, residual });
        }
    }

    issues
}
