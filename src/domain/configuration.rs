use crate::domain::id::{ConfigurationId, ServiceId, VnfId};
use crate::domain::network::{DirectedArc, Network};
use crate::domain::service::Service;
use crate::domain::time_matrix::TimeMatrix;

/// Middlebox start on a VNF, relative to the batch horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub vnf: VnfId,
    pub start: u32,
}

/// Route and start slot of one virtual link. Only present if the endpoints are on different machines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub arcs: Vec<DirectedArc>,
    pub start: u32,
}

/// The raw schedule a configuration was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePlan {
    pub placements: Vec<Placement>,

    /// One entry per virtual link.
    pub transmissions: Vec<Option<Transmission>>,
}

impl ServicePlan {
    /// Slot after the last processing slot of the chain.
    pub fn completion_time(&self, service: &Service) -> u32 {
        service.middleboxes().last().zip(self.placements.last()).map_or(0, |(middlebox, placement)| placement.start + middlebox.processing_time)
    }

    /// Sum of link weights over all routed arcs.
    pub fn route_weight(&self, network: &Network) -> f64 {
        self.transmissions
            .iter()
            .flatten()
            .flat_map(|t| t.arcs.iter())
            .map(|arc| network.link(arc.link).map_or(0.0, |l| l.weight))
            .sum()
    }
}

/// One feasible time-indexed processing and routing plan for one service (a column).
///
/// Immutable once created. Two configurations are equal iff they belong to the same service
/// and have the same completion time and the same VNF and link usage; id, profit, plan and
/// per-service index are ignored.
#[derive(Debug, Clone)]
pub struct Configuration {
    id: ConfigurationId,
    service: ServiceId,
    completion_time: u32,

    /// `r[f][δ]`, 1 if VNF f processes a middlebox of the service at slot δ.
    vnf_usage: TimeMatrix<u8>,

    /// `o[l][δ]`, bandwidth carried by link l at slot δ.
    link_usage: TimeMatrix<i64>,

    profit: f64,
    plan: ServicePlan,
    id_per_service: Option<usize>,
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.service == other.service
            && self.completion_time == other.completion_time
            && self.vnf_usage == other.vnf_usage
            && self.link_usage == other.link_usage
    }
}

impl Eq for Configuration {}

impl Configuration {
    /// Derives the usage matrices and completion time from a plan over a horizon of `horizon` slots.
    pub fn from_plan(id: ConfigurationId, service: &Service, plan: ServicePlan, network: &Network, horizon: usize, profit: f64) -> Self {
        let mut vnf_usage = TimeMatrix::new(network.vnfs().len(), horizon);
        let mut link_usage = TimeMatrix::new(network.links().len(), horizon);

        for (middlebox, placement) in service.middleboxes().iter().zip(&plan.placements) {
            let start = placement.start as usize;
            for slot in start..(start + middlebox.processing_time as usize).min(horizon) {
                vnf_usage.set(placement.vnf.index(), slot, 1);
            }
        }

        let tau = service.transmission_time() as usize;
        for (virtual_link, transmission) in service.virtual_links().iter().zip(&plan.transmissions) {
            let Some(transmission) = transmission else { continue };
            let start = transmission.start as usize;
            for arc in &transmission.arcs {
                for slot in start..(start + tau).min(horizon) {
                    link_usage.add(arc.link.index(), slot, virtual_link.bandwidth);
                }
            }
        }

        let completion_time = plan.completion_time(service);

        Self { id, service: service.id, completion_time, vnf_usage, link_usage, profit, plan, id_per_service: None }
    }

    pub fn with_index(mut self, id_per_service: usize) -> Self {
        self.id_per_service = Some(id_per_service);
        self
    }

    pub fn id(&self) -> ConfigurationId {
        self.id
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    /// Slot, relative to the horizon start, at which the last middlebox is finished.
    pub fn completion_time(&self) -> u32 {
        self.completion_time
    }

    pub fn vnf_usage(&self) -> &TimeMatrix<u8> {
        &self.vnf_usage
    }

    pub fn link_usage(&self) -> &TimeMatrix<i64> {
        &self.link_usage
    }

    pub fn profit(&self) -> f64 {
        self.profit
    }

    pub fn plan(&self) -> &ServicePlan {
        &self.plan
    }

    pub fn id_per_service(&self) -> Option<usize> {
        self.id_per_service
    }
}
