//! Integration test modules

mod capability_resolution;
mod config_integration;
mod provider_http;
mod scheduler_flow;
mod test_utils;
