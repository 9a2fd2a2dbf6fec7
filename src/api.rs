pub mod network_dto;
pub mod service_dto;
