use serde::de::DeserializeOwned;
use std::fs;

use crate::api::network_dto::NetworkDto;
use crate::api::service_dto::{ServiceSetDto, services_from_dto};
use crate::config::CgConfig;
use crate::domain::id::ServiceSetId;
use crate::domain::network::Network;
use crate::domain::service::Service;
use crate::error::{Error, Result};

/// Parses a JSON file into a given type `T`.
///
/// Errors are converted into `crate::error::Error` variants:
/// - `Error::IoError` if the file cannot be read.
/// - `Error::DeserializationError` if the JSON is malformed.
pub fn parse_json_file<T: DeserializeOwned>(file_path: &str) -> Result<T> {
    let data = fs::read_to_string(file_path).map_err(Error::IoError)?;

    let parsed_data: T = serde_json::from_str(&data).map_err(Error::DeserializationError)?;

    Ok(parsed_data)
}

pub fn load_network(file_path: &str) -> Result<Network> {
    let dto: NetworkDto = parse_json_file(file_path)?;
    let network = Network::from_dto(dto)?;
    log::info!("Loaded network {} from '{}'", network.id, file_path);
    Ok(network)
}

pub fn load_services(file_path: &str) -> Result<(ServiceSetId, Vec<Service>)> {
    let dto: ServiceSetDto = parse_json_file(file_path)?;
    let (id, services) = services_from_dto(dto)?;
    log::info!("Loaded service set {} with {} services from '{}'", id, services.len(), file_path);
    Ok((id, services))
}

/// Loads and validates a run configuration. Without a path the defaults are used.
pub fn load_config(file_path: Option<&str>) -> Result<CgConfig> {
    let config = match file_path {
        Some(path) => parse_json_file::<CgConfig>(path)?,
        None => CgConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
