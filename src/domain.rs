pub mod configuration;
pub mod id;
pub mod network;
pub mod service;
pub mod slot;
pub mod time_matrix;
