pub mod config;
pub mod diagnostics;
pub mod env_check;
pub mod error;
pub mod metrics_consts;
pub mod probe;
pub mod webhook;
