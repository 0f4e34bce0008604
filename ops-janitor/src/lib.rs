pub mod cleanup;
pub mod config;
pub mod error;
pub mod identify;
pub mod isolation;
pub mod metrics_consts;
pub mod profile;
pub mod purge;
