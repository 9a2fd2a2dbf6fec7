use crate::batch::{BatchManager, RunSummary};
use crate::domain::service::Service;
use crate::error::Result;
use crate::loader::parser::{load_config, load_network, load_services};
use crate::report::ResultRow;
use crate::solver::ScipSolver;

pub mod api;
pub mod batch;
pub mod column_generation;
pub mod config;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;
pub mod report;
pub mod solver;

/// Everything a scheduling run over input files produces.
#[derive(Debug)]
pub struct RunOutput {
    pub result: ResultRow,
    pub summary: RunSummary,

    /// The services with their admitted assignments written back.
    pub services: Vec<Service>,
}

/// Loads network, services and configuration and schedules all services with SCIP.
pub fn schedule_from_files(network_path: &str, services_path: &str, config_path: Option<&str>) -> Result<RunOutput> {
    let network = load_network(network_path)?;
    let (service_set, mut services) = load_services(services_path)?;
    let config = load_config(config_path)?;
    log::info!("Input parsed successfully. Starting column generation.");

    let mut manager = BatchManager::new(network, config, ScipSolver);
    let summary = manager.run(&mut services)?;
    let result = ResultRow::new(manager.network(), service_set, manager.config(), &summary);

    Ok(RunOutput { result, summary, services })
}
