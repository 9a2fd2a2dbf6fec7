use thiserror::Error;

use crate::column_generation::verification::Inconsistency;
use crate::domain::id::{BatchId, ServiceId};

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Model '{model}' is invalid: {reason}")]
    InvalidModel { model: String, reason: String },

    #[error("Solver backend failed: {0}")]
    Backend(String),

    #[error("Numerical trouble: {0}")]
    Numerical(String),
}

/// Violations of the network or service model invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Unknown machine {0}")]
    UnknownMachine(usize),

    #[error("Unknown VNF {0}")]
    UnknownVnf(usize),

    #[error("Unknown link {0}")]
    UnknownLink(usize),

    #[error("Link {link} is invalid: {reason}")]
    InvalidLink { link: usize, reason: String },

    #[error("Service {service} is invalid: {reason}")]
    InvalidService { service: ServiceId, reason: String },

    #[error("Reservation on {resource} at slot {slot} exceeds its capacity")]
    CapacityExceeded { resource: String, slot: u32 },
}

/// Failures inside one column-generation run.
#[derive(Debug, Error)]
pub enum CgError {
    #[error("Inconsistent pricing solution for service {service}: {} mismatches (first: {})", details.len(), details.first().map(|d| d.to_string()).unwrap_or_default())]
    InconsistentSolution { service: ServiceId, details: Vec<Inconsistency> },

    #[error("Restricted master of batch {batch} is infeasible")]
    MasterInfeasible { batch: BatchId },

    #[error("Restricted master of batch {batch} ended with status {status}")]
    MasterFailed { batch: BatchId, status: String },

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON input: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Failed to write report: {0}")]
    ReportError(#[from] csv::Error),

    #[error("Failed to build internal domain model: {0}")]
    ModelConstructionError(#[from] ModelError),

    #[error("Invalid run configuration: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
