//! CLI module for proctor-orchestrator
//!
//! Offline tools over JSON files:
//! - allocation-diff: run the allocation-only change detector
//! - check-matrix: verify a definition against a client registry
//! - validate: run edit-time validation
//! - specification: generate a client specification

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    allocation_diff, check_matrix, run, run_command, specification, validate, ClientEntry,
    ClientRegistryFile,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_json_file, write_response};
