use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::configuration::Configuration;
use crate::domain::id::{LinkId, MachineId, NetworkId, VnfId};
use crate::domain::slot::SlotLedger;
use crate::domain::time_matrix::TimeMatrix;
use crate::error::ModelError;

/// Kind of network function, e.g. firewall or NAT. A middlebox can only run on a VNF of its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VnfType(pub u32);

/// A VNF instance hosted on a physical machine. Processes at most one middlebox per slot.
#[derive(Debug, Clone)]
pub struct Vnf {
    pub id: VnfId,
    pub vnf_type: VnfType,
    pub host: MachineId,

    /// Committed occupancy in absolute slots, capacity 1.
    schedule: SlotLedger,
}

impl Vnf {
    pub fn is_free(&self, slot: u32) -> bool {
        self.schedule.can_reserve(slot, 1)
    }

    pub fn schedule(&self) -> &SlotLedger {
        &self.schedule
    }
}

#[derive(Debug, Clone)]
pub struct PhysicalMachine {
    pub id: MachineId,
    pub vnfs: Vec<VnfId>,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: LinkId,
    pub source: MachineId,
    pub destination: MachineId,
    pub capacity: i64,

    /// Routing cost of sending a transmission over this link.
    pub weight: f64,

    /// Committed bandwidth in absolute slots.
    schedule: SlotLedger,
}

impl Link {
    pub fn remaining_bandwidth(&self, slot: u32) -> i64 {
        self.schedule.residual(slot)
    }

    pub fn schedule(&self) -> &SlotLedger {
        &self.schedule
    }
}

/// One traversable direction of a link. Undirected links contribute two arcs that share the
/// capacity of the same [`LinkId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectedArc {
    pub link: LinkId,
    pub from: MachineId,
    pub to: MachineId,
}

/// Frozen view of the substrate for one planning horizon. Slots are relative to `start`.
#[derive(Debug, Clone)]
pub struct SubstrateSnapshot {
    start: u32,
    horizon: usize,

    /// 1 where the VNF has no committed occupancy.
    vnf_free: TimeMatrix<u8>,
    link_residual: TimeMatrix<i64>,
}

impl SubstrateSnapshot {
    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn vnf_available(&self, vnf: VnfId, slot: usize) -> bool {
        self.vnf_free.get(vnf.index(), slot) == 1
    }

    /// Whether `vnf` is free over `[start, start + duration)`, all inside the horizon.
    pub fn vnf_free_over(&self, vnf: VnfId, start: usize, duration: usize) -> bool {
        start + duration <= self.horizon && (start..start + duration).all(|t| self.vnf_available(vnf, t))
    }

    pub fn link_residual(&self, link: LinkId, slot: usize) -> i64 {
        self.link_residual.get(link.index(), slot)
    }

    pub fn vnf_availability(&self) -> &TimeMatrix<u8> {
        &self.vnf_free
    }

    pub fn link_residuals(&self) -> &TimeMatrix<i64> {
        &self.link_residual
    }
}

/// The physical substrate: machines, hosted VNFs and the links between machines.
///
/// Ids are dense indices into the respective vectors. The adjacency list maps a machine to the
/// indices of its outgoing arcs.
#[derive(Debug, Clone)]
pub struct Network {
    pub id: NetworkId,
    directed: bool,
    machines: Vec<PhysicalMachine>,
    vnfs: Vec<Vnf>,
    links: Vec<Link>,
    arcs: Vec<DirectedArc>,
    adjacency: HashMap<MachineId, Vec<usize>>,
}

impl Network {
    pub fn new(id: NetworkId, machine_count: usize, directed: bool) -> Self {
        let machines = (0..machine_count).map(|m| PhysicalMachine { id: MachineId::new(m), vnfs: Vec::new() }).collect();
        Self { id, directed, machines, vnfs: Vec::new(), links: Vec::new(), arcs: Vec::new(), adjacency: HashMap::new() }
    }

    pub fn add_vnf(&mut self, host: MachineId, vnf_type: VnfType) -> Result<VnfId, ModelError> {
        let machine = self.machines.get_mut(host.index()).ok_or(ModelError::UnknownMachine(host.index()))?;
        let id = VnfId::new(self.vnfs.len());

        machine.vnfs.push(id);
        self.vnfs.push(Vnf { id, vnf_type, host, schedule: SlotLedger::new(1) });
        Ok(id)
    }

    pub fn add_link(&mut self, source: MachineId, destination: MachineId, capacity: i64, weight: f64) -> Result<LinkId, ModelError> {
        let id = LinkId::new(self.links.len());

        for endpoint in [source, destination] {
            if endpoint.index() >= self.machines.len() {
                return Err(ModelError::UnknownMachine(endpoint.index()));
            }
        }
        if source == destination {
            return Err(ModelError::InvalidLink { link: id.index(), reason: "self loop".to_string() });
        }
        if capacity <= 0 {
            return Err(ModelError::InvalidLink { link: id.index(), reason: format!("capacity {} must be positive", capacity) });
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(ModelError::InvalidLink { link: id.index(), reason: format!("weight {} must be finite and non-negative", weight) });
        }

        self.links.push(Link { id, source, destination, capacity, weight, schedule: SlotLedger::new(capacity) });
        self.push_arc(DirectedArc { link: id, from: source, to: destination });
        if !self.directed {
            self.push_arc(DirectedArc { link: id, from: destination, to: source });
        }

        Ok(id)
    }

    fn push_arc(&mut self, arc: DirectedArc) {
        self.adjacency.entry(arc.from).or_default().push(self.arcs.len());
        self.arcs.push(arc);
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn machines(&self) -> &[PhysicalMachine] {
        &self.machines
    }

    pub fn vnfs(&self) -> &[Vnf] {
        &self.vnfs
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn arcs(&self) -> &[DirectedArc] {
        &self.arcs
    }

    pub fn vnf(&self, id: VnfId) -> Option<&Vnf> {
        self.vnfs.get(id.index())
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.index())
    }

    pub fn vnfs_of_type(&self, vnf_type: VnfType) -> impl Iterator<Item = &Vnf> {
        self.vnfs.iter().filter(move |v| v.vnf_type == vnf_type)
    }

    /// Indices into [`Network::arcs`] of the arcs leaving `machine`.
    pub fn outgoing(&self, machine: MachineId) -> &[usize] {
        self.adjacency.get(&machine).map_or(&[], |a| a.as_slice())
    }

    pub fn min_link_capacity(&self) -> Option<i64> {
        self.links.iter().map(|l| l.capacity).min()
    }

    /// Breadth-first search for a path with the fewest hops from `source` to `target`, only
    /// following arcs accepted by `usable`.
    ///
    /// # Returns
    /// The arcs in traversal order, an empty vector if `source == target` and `None` if the target
    /// is unreachable.
    pub fn shortest_path(&self, source: MachineId, target: MachineId, usable: impl Fn(&DirectedArc) -> bool) -> Option<Vec<DirectedArc>> {
        if source == target {
            return Some(Vec::new());
        }

        let mut queue: VecDeque<MachineId> = VecDeque::new();
        let mut visited: HashSet<MachineId> = HashSet::new();
        let mut parent: HashMap<MachineId, DirectedArc> = HashMap::new();

        queue.push_back(source);
        visited.insert(source);

        while let Some(current) = queue.pop_front() {
            for &arc_index in self.outgoing(current) {
                let arc = self.arcs[arc_index];

                if !usable(&arc) || !visited.insert(arc.to) {
                    continue;
                }

                parent.insert(arc.to, arc);
                if arc.to == target {
                    return Some(Self::reconstruct_path(&parent, source, target));
                }
                queue.push_back(arc.to);
            }
        }

        None
    }

    fn reconstruct_path(parent: &HashMap<MachineId, DirectedArc>, source: MachineId, target: MachineId) -> Vec<DirectedArc> {
        let mut path = Vec::new();
        let mut current = target;

        while current != source {
            let arc = parent[&current];
            path.push(arc);
            current = arc.from;
        }

        path.reverse();
        path
    }

    /// Copies the committed state of `[start, start + horizon)` into a [`SubstrateSnapshot`].
    pub fn snapshot(&self, start: u32, horizon: usize) -> SubstrateSnapshot {
        let mut vnf_free = TimeMatrix::new(self.vnfs.len(), horizon);
        let mut link_residual = TimeMatrix::new(self.links.len(), horizon);

        for slot in 0..horizon {
            let absolute = start + slot as u32;

            for vnf in &self.vnfs {
                vnf_free.set(vnf.id.index(), slot, u8::from(vnf.is_free(absolute)));
            }
            for link in &self.links {
                link_residual.set(link.id.index(), slot, link.remaining_bandwidth(absolute));
            }
        }

        SubstrateSnapshot { start, horizon, vnf_free, link_residual }
    }

    /// Commits the resource usage of a selected configuration, shifted by `offset` slots.
    ///
    /// Either all usage is committed or none: the whole configuration is checked first.
    pub fn commit(&mut self, configuration: &Configuration, offset: u32) -> Result<(), ModelError> {
        let vnf_usage = configuration.vnf_usage();
        let link_usage = configuration.link_usage();

        for (f, slot, _) in vnf_usage.nonzero() {
            let vnf = self.vnfs.get(f).ok_or(ModelError::UnknownVnf(f))?;
            let absolute = offset + slot as u32;
            if !vnf.is_free(absolute) {
                return Err(ModelError::CapacityExceeded { resource: format!("vnf {}", f), slot: absolute });
            }
        }
        for (l, slot, amount) in link_usage.nonzero() {
            let link = self.links.get(l).ok_or(ModelError::UnknownLink(l))?;
            let absolute = offset + slot as u32;
            if link.remaining_bandwidth(absolute) < amount {
                return Err(ModelError::CapacityExceeded { resource: format!("link {}", l), slot: absolute });
            }
        }

        for (f, slot, _) in vnf_usage.nonzero() {
            self.vnfs[f].schedule.reserve(offset + slot as u32, 1);
        }
        for (l, slot, amount) in link_usage.nonzero() {
            self.links[l].schedule.reserve(offset + slot as u32, amount);
        }

        log::debug!("Committed {} for service {} at offset {}", configuration.id(), configuration.service(), offset);
        Ok(())
    }

    /// Drops every committed reservation.
    pub fn reset_schedules(&mut self) {
        self.vnfs.iter_mut().for_each(|v| v.schedule.reset());
        self.links.iter_mut().for_each(|l| l.schedule.reset());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0 - 1 - 2 plus a direct 0 - 2 link.
    fn triangle(directed: bool) -> Network {
        let mut network = Network::new(NetworkId::new(0), 3, directed);
        network.add_link(MachineId::new(0), MachineId::new(1), 10, 1.0).unwrap();
        network.add_link(MachineId::new(1), MachineId::new(2), 10, 1.0).unwrap();
        network.add_link(MachineId::new(0), MachineId::new(2), 2, 1.0).unwrap();
        network
    }

    #[test]
    fn test_undirected_links_have_two_arcs() {
        assert_eq!(triangle(false).arcs().len(), 6);
        assert_eq!(triangle(true).arcs().len(), 3);
    }

    #[test]
    fn test_shortest_path_prefers_fewest_hops() {
        let network = triangle(false);
        let path = network.shortest_path(MachineId::new(2), MachineId::new(0), |_| true).unwrap();

        assert_eq!(path.len(), 1);
        assert_eq!(path[0].link, LinkId::new(2));
        assert_eq!(path[0].from, MachineId::new(2));
    }

    #[test]
    fn test_shortest_path_honours_filter() {
        let network = triangle(false);
        let capacity_ok = |arc: &DirectedArc| network.link(arc.link).is_some_and(|l| l.capacity >= 5);
        let path = network.shortest_path(MachineId::new(0), MachineId::new(2), capacity_ok).unwrap();

        assert_eq!(path.iter().map(|a| a.link.index()).collect::<Vec<_>>(), vec![0, 1]);
        assert!(network.shortest_path(MachineId::new(0), MachineId::new(0), |_| false).unwrap().is_empty());
    }

    #[test]
    fn test_directed_path_unreachable_backwards() {
        let network = triangle(true);
        assert!(network.shortest_path(MachineId::new(2), MachineId::new(0), |_| true).is_none());
    }

    #[test]
    fn test_invalid_links_are_rejected() {
        let mut network = Network::new(NetworkId::new(0), 2, false);
        assert_eq!(network.add_link(MachineId::new(0), MachineId::new(5), 1, 1.0), Err(ModelError::UnknownMachine(5)));
        assert!(matches!(network.add_link(MachineId::new(0), MachineId::new(0), 1, 1.0), Err(ModelError::InvalidLink { .. })));
        assert!(matches!(network.add_link(MachineId::new(0), MachineId::new(1), 0, 1.0), Err(ModelError::InvalidLink { .. })));
        assert_eq!(network.add_vnf(MachineId::new(9), VnfType(0)), Err(ModelError::UnknownMachine(9)));
    }

    #[test]
    fn test_snapshot_reflects_committed_state() {
        let mut network = triangle(false);
        let vnf = network.add_vnf(MachineId::new(0), VnfType(1)).unwrap();
        network.vnfs[vnf.index()].schedule.reserve(4, 1);
        network.links[0].schedule.reserve(5, 7);

        let snapshot = network.snapshot(3, 4);
        assert!(snapshot.vnf_available(vnf, 0));
        assert!(!snapshot.vnf_available(vnf, 1));
        assert!(!snapshot.vnf_free_over(vnf, 0, 2));
        assert!(snapshot.vnf_free_over(vnf, 2, 2));
        assert!(!snapshot.vnf_free_over(vnf, 3, 2));
        assert_eq!(snapshot.link_residual(LinkId::new(0), 2), 3);
        assert_eq!(snapshot.link_residual(LinkId::new(0), 1), 10);
    }
}
