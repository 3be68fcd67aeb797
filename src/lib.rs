pub mod alerts;
pub mod classifier;
pub mod config;
pub mod corpus;
pub mod error;
pub mod explain;
pub mod forest;
pub mod handlers;
pub mod imagery;
pub mod imputer;
pub mod predictor;
pub mod records;
pub mod sentinel;
pub mod server;
pub mod simulator;
pub mod status;
pub mod store;
pub mod types;
