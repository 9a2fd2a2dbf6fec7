use std::collections::HashSet;

use crate::domain::configuration::ServicePlan;
use crate::domain::id::{ServiceId, VnfId};
use crate::domain::network::VnfType;
use crate::error::ModelError;

/// One element of a service function chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Middlebox {
    /// Position in the chain, defines the processing order.
    pub position: usize,
    pub service: ServiceId,
    pub vnf_type: VnfType,
    pub processing_time: u32,

    pub assigned_vnf: Option<VnfId>,
    pub start_slot: Option<u32>,

    /// Absolute slots in which the middlebox is processed, `processing_time` entries once assigned.
    pub processing_slots: Vec<u32>,
}

impl Middlebox {
    fn assign(&mut self, vnf: VnfId, start: u32) {
        self.assigned_vnf = Some(vnf);
        self.start_slot = Some(start);
        self.processing_slots = (start..start + self.processing_time).collect();
    }

    fn clear(&mut self) {
        self.assigned_vnf = None;
        self.start_slot = None;
        self.processing_slots.clear();
    }
}

/// Traffic between middlebox `from` and middlebox `from + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualLink {
    pub from: usize,
    pub to: usize,
    pub bandwidth: i64,
}

/// A request to run traffic through an ordered chain of middleboxes.
///
/// All times are integer slots. The deadline is relative to the arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub id: ServiceId,
    pub bandwidth: i64,
    pub deadline: Option<u32>,
    pub traffic_size: i64,
    pub arrival: u32,
    pub departure: Option<u32>,
    middleboxes: Vec<Middlebox>,
    virtual_links: Vec<VirtualLink>,
    pub completion_time: Option<u32>,
}

impl Service {
    /// Creates a service whose chain is given as `(vnf type, processing time)` pairs.
    ///
    /// Traffic size defaults to the bandwidth (one slot per transmission), arrival to 0 and there
    /// is no deadline.
    pub fn new(id: ServiceId, chain: &[(VnfType, u32)], bandwidth: i64) -> Self {
        let middleboxes: Vec<Middlebox> = chain
            .iter()
            .enumerate()
            .map(|(position, &(vnf_type, processing_time))| Middlebox {
                position,
                service: id,
                vnf_type,
                processing_time,
                assigned_vnf: None,
                start_slot: None,
                processing_slots: Vec::new(),
            })
            .collect();

        let virtual_links = (1..middleboxes.len()).map(|to| VirtualLink { from: to - 1, to, bandwidth }).collect();

        Self {
            id,
            bandwidth,
            deadline: None,
            traffic_size: bandwidth,
            arrival: 0,
            departure: None,
            middleboxes,
            virtual_links,
            completion_time: None,
        }
    }

    pub fn with_deadline(mut self, deadline: u32) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_traffic_size(mut self, traffic_size: i64) -> Self {
        self.traffic_size = traffic_size;
        self
    }

    pub fn with_arrival(mut self, arrival: u32) -> Self {
        self.arrival = arrival;
        self
    }

    pub fn with_departure(mut self, departure: u32) -> Self {
        self.departure = Some(departure);
        self
    }

    pub fn chain_len(&self) -> usize {
        self.middleboxes.len()
    }

    pub fn middleboxes(&self) -> &[Middlebox] {
        &self.middleboxes
    }

    pub fn virtual_links(&self) -> &[VirtualLink] {
        &self.virtual_links
    }

    /// Slots needed to push `traffic_size` units over a virtual link, at least one.
    pub fn transmission_time(&self) -> u32 {
        if self.bandwidth <= 0 {
            return 1;
        }
        let slots = (self.traffic_size.max(0) + self.bandwidth - 1) / self.bandwidth;
        u32::try_from(slots).unwrap_or(u32::MAX).max(1)
    }

    /// Absolute slot by which the last middlebox has to be finished.
    pub fn due_slot(&self) -> Option<u32> {
        self.deadline.map(|d| self.arrival.saturating_add(d))
    }

    /// Slots the chain needs at least, with every middlebox co-located.
    pub fn minimum_duration(&self) -> u32 {
        self.middleboxes.iter().map(|m| m.processing_time).sum()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |reason: String| Err(ModelError::InvalidService { service: self.id, reason });

        if self.middleboxes.is_empty() {
            return invalid("empty chain".to_string());
        }
        if self.virtual_links.len() + 1 != self.middleboxes.len() {
            return invalid(format!("{} middleboxes but {} virtual links", self.middleboxes.len(), self.virtual_links.len()));
        }
        if let Some(m) = self.middleboxes.iter().find(|m| m.processing_time == 0) {
            return invalid(format!("middlebox {} has zero processing time", m.position));
        }
        if self.bandwidth <= 0 {
            return invalid(format!("bandwidth {} must be positive", self.bandwidth));
        }
        if self.traffic_size < 0 {
            return invalid(format!("traffic size {} must not be negative", self.traffic_size));
        }
        if self.departure.is_some_and(|d| d < self.arrival) {
            return invalid("departure before arrival".to_string());
        }

        Ok(())
    }

    pub fn is_admitted(&self) -> bool {
        self.completion_time.is_some()
    }

    /// Writes the assignment of an admitted plan onto the chain, shifting relative slots by `offset`.
    pub fn apply_plan(&mut self, plan: &ServicePlan, offset: u32) {
        for (middlebox, placement) in self.middleboxes.iter_mut().zip(&plan.placements) {
            middlebox.assign(placement.vnf, offset + placement.start);
        }
        self.completion_time = self.middleboxes.last().and_then(|m| m.processing_slots.last()).map(|last| last + 1);
    }

    pub fn clear_assignment(&mut self) {
        self.middleboxes.iter_mut().for_each(Middlebox::clear);
        self.completion_time = None;
    }
}

/// Service ids key the column pools and the write-back, so they have to be unique.
pub fn ensure_unique_ids(services: &[Service]) -> Result<(), ModelError> {
    let mut seen = HashSet::with_capacity(services.len());
    match services.iter().find(|s| !seen.insert(s.id)) {
        Some(duplicate) => Err(ModelError::InvalidService { service: duplicate.id, reason: "duplicate service id".to_string() }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::configuration::Placement;

    fn chain() -> Vec<(VnfType, u32)> {
        vec![(VnfType(0), 2), (VnfType(1), 1), (VnfType(0), 3)]
    }

    #[test]
    fn test_chain_invariants() {
        let service = Service::new(ServiceId::new(1), &chain(), 4);
        assert_eq!(service.chain_len(), 3);
        assert_eq!(service.virtual_links().len(), 2);
        assert_eq!(service.virtual_links()[1].from, 1);
        assert!(service.validate().is_ok());
        assert_eq!(service.minimum_duration(), 6);
    }

    #[test]
    fn test_transmission_time_rounds_up() {
        let service = Service::new(ServiceId::new(1), &chain(), 4);
        assert_eq!(service.transmission_time(), 1);
        assert_eq!(service.clone().with_traffic_size(9).transmission_time(), 3);
        assert_eq!(service.with_traffic_size(0).transmission_time(), 1);
    }

    #[test]
    fn test_deadline_is_relative_to_arrival() {
        let service = Service::new(ServiceId::new(1), &chain(), 4).with_arrival(10).with_deadline(5);
        assert_eq!(service.due_slot(), Some(15));
    }

    #[test]
    fn test_validate_rejects_broken_services() {
        assert!(Service::new(ServiceId::new(1), &[], 4).validate().is_err());
        assert!(Service::new(ServiceId::new(1), &[(VnfType(0), 0)], 4).validate().is_err());
        assert!(Service::new(ServiceId::new(1), &chain(), 0).validate().is_err());
        assert!(Service::new(ServiceId::new(1), &chain(), 1).with_arrival(5).with_departure(4).validate().is_err());
    }

    #[test]
    fn test_apply_plan_sets_processing_slots() {
        let mut service = Service::new(ServiceId::new(1), &[(VnfType(0), 2)], 1);
        let plan = ServicePlan { placements: vec![Placement { vnf: VnfId::new(3), start: 1 }], transmissions: Vec::new() };

        service.apply_plan(&plan, 10);
        assert_eq!(service.middleboxes()[0].processing_slots, vec![11, 12]);
        assert_eq!(service.completion_time, Some(13));
        assert!(service.is_admitted());

        service.clear_assignment();
        assert!(!service.is_admitted());
        assert!(service.middleboxes()[0].assigned_vnf.is_none());
    }

    #[test]
    fn test_duplicate_ids_are_reported() {
        let services = vec![
            Service::new(ServiceId::new(0), &chain(), 1),
            Service::new(ServiceId::new(1), &chain(), 1),
            Service::new(ServiceId::new(0), &chain(), 2),
        ];
        assert!(matches!(ensure_unique_ids(&services), Err(ModelError::InvalidService { service, .. }) if service == ServiceId::new(0)));
        assert!(ensure_unique_ids(&services[..2]).is_ok());
    }
}
