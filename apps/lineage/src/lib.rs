//! # lineage
//!
//! Command-line front end of the lineage catalog: argument parsing,
//! TOML configuration and logging setup around `lineage-core`.

pub mod cli;
pub mod config;
pub mod logging;
