use serde::{Deserialize, Serialize};

use crate::domain::id::{MachineId, NetworkId};
use crate::domain::network::{Network, VnfType};
use crate::error::ModelError;

fn default_weight() -> f64 {
    1.0
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDto {
    pub id: usize,
    pub machine_count: usize,

    #[serde(default)]
    pub directed: bool,

    #[serde(default)]
    pub links: Vec<LinkDto>,
    pub vnfs: Vec<VnfDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LinkDto {
    pub source: usize,
    pub destination: usize,
    pub capacity: i64,

    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VnfDto {
    pub host: usize,
    pub vnf_type: u32,
}

impl Network {
    /// Builds the network, assigning link and VNF ids in list order.
    pub fn from_dto(dto: NetworkDto) -> Result<Self, ModelError> {
        let mut network = Network::new(NetworkId::new(dto.id), dto.machine_count, dto.directed);

        for vnf in dto.vnfs {
            network.add_vnf(MachineId::new(vnf.host), VnfType(vnf.vnf_type))?;
        }
        for link in dto.links {
            network.add_link(MachineId::new(link.source), MachineId::new(link.destination), link.capacity, link.weight)?;
        }

        log::debug!(
            "Network {} built: {} machines, {} VNFs, {} links",
            network.id,
            network.machines().len(),
            network.vnfs().len(),
            network.links().len()
        );
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_from_json() {
        let json = r#"{
            "id": 1,
            "machineCount": 3,
            "links": [
                { "source": 0, "destination": 1, "capacity": 5 },
                { "source": 1, "destination": 2, "capacity": 8, "weight": 2.5 }
            ],
            "vnfs": [ { "host": 0, "vnfType": 0 }, { "host": 2, "vnfType": 1 } ]
        }"#;
        let dto: NetworkDto = serde_json::from_str(json).unwrap();
        let network = Network::from_dto(dto).unwrap();

        assert!(!network.is_directed());
        assert_eq!(network.vnfs().len(), 2);
        assert_eq!(network.links()[0].weight, 1.0);
        assert_eq!(network.links()[1].weight, 2.5);
        assert_eq!(network.arcs().len(), 4);
        assert_eq!(network.min_link_capacity(), Some(5));
    }

    #[test]
    fn test_vnf_on_unknown_machine_is_rejected() {
        let dto = NetworkDto { id: 0, machine_count: 1, directed: true, links: Vec::new(), vnfs: vec![VnfDto { host: 4, vnf_type: 0 }] };
        assert_eq!(Network::from_dto(dto).unwrap_err(), ModelError::UnknownMachine(4));
    }
}
