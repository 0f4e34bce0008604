pub mod auth;
pub mod config;
pub mod filter;
pub mod http;
pub mod postgrest;
pub mod store;
pub mod test_utils;
