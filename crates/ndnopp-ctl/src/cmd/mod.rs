//! CLI command modules.

pub mod engine;
pub mod http;
pub mod status;
