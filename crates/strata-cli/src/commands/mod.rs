//! CLI command implementations

pub mod completions;
pub mod config;
pub mod generate;
pub mod migrate;
pub mod status;
