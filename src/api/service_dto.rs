use serde::{Deserialize, Serialize};

use crate::domain::id::{ServiceId, ServiceSetId};
use crate::domain::network::VnfType;
use crate::domain::service::{Service, ensure_unique_ids};
use crate::error::ModelError;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSetDto {
    pub id: usize,
    pub services: Vec<ServiceDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDto {
    pub id: usize,
    pub bandwidth: i64,

    /// Slots after arrival by which the chain has to be finished.
    pub deadline: Option<u32>,

    /// Defaults to the bandwidth, i.e. one slot per transmission.
    pub traffic_size: Option<i64>,

    #[serde(default)]
    pub arrival: u32,
    pub departure: Option<u32>,
    pub chain: Vec<MiddleboxDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MiddleboxDto {
    pub vnf_type: u32,
    pub processing_time: u32,
}

impl Service {
    pub fn from_dto(dto: ServiceDto) -> Result<Self, ModelError> {
        let chain: Vec<(VnfType, u32)> = dto.chain.iter().map(|m| (VnfType(m.vnf_type), m.processing_time)).collect();
        let mut service = Service::new(ServiceId::new(dto.id), &chain, dto.bandwidth).with_arrival(dto.arrival);

        if let Some(deadline) = dto.deadline {
            service = service.with_deadline(deadline);
        }
        if let Some(traffic_size) = dto.traffic_size {
            service = service.with_traffic_size(traffic_size);
        }
        if let Some(departure) = dto.departure {
            service = service.with_departure(departure);
        }

        service.validate()?;
        Ok(service)
    }
}

/// Converts a whole service set. Fails on the first invalid service or repeated id.
pub fn services_from_dto(dto: ServiceSetDto) -> Result<(ServiceSetId, Vec<Service>), ModelError> {
    let services = dto.services.into_iter().map(Service::from_dto).collect::<Result<Vec<_>, _>>()?;
    ensure_unique_ids(&services)?;
    Ok((ServiceSetId::new(dto.id), services))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_set_from_json() {
        let json = r#"{
            "id": 4,
            "services": [
                { "id": 0, "bandwidth": 2, "deadline": 6, "trafficSize": 5, "arrival": 3,
                  "chain": [ { "vnfType": 0, "processingTime": 2 }, { "vnfType": 1, "processingTime": 1 } ] },
                { "id": 1, "bandwidth": 1, "chain": [ { "vnfType": 1, "processingTime": 3 } ] }
            ]
        }"#;
        let dto: ServiceSetDto = serde_json::from_str(json).unwrap();
        let (id, services) = services_from_dto(dto).unwrap();

        assert_eq!(id, ServiceSetId::new(4));
        assert_eq!(services[0].due_slot(), Some(9));
        assert_eq!(services[0].transmission_time(), 3);
        assert_eq!(services[0].virtual_links().len(), 1);
        assert_eq!(services[1].deadline, None);
        assert_eq!(services[1].arrival, 0);
    }

    #[test]
    fn test_empty_chain_is_rejected() {
        let dto = ServiceDto { id: 2, bandwidth: 1, deadline: None, traffic_size: None, arrival: 0, departure: None, chain: Vec::new() };
        assert!(matches!(Service::from_dto(dto), Err(ModelError::InvalidService { .. })));
    }

    #[test]
    fn test_repeated_service_id_is_rejected() {
        let json = r#"{
            "id": 1,
            "services": [
                { "id": 7, "bandwidth": 1, "chain": [ { "vnfType": 0, "processingTime": 1 } ] },
                { "id": 7, "bandwidth": 2, "arrival": 4, "chain": [ { "vnfType": 0, "processingTime": 2 } ] }
            ]
        }"#;
        let dto: ServiceSetDto = serde_json::from_str(json).unwrap();
        match services_from_dto(dto) {
            Err(ModelError::InvalidService { service, reason }) => {
                assert_eq!(service, ServiceId::new(7));
                assert!(reason.contains("duplicate"));
            }
            other => panic!("expected a duplicate id error, got {:?}", other),
        }
    }
}
