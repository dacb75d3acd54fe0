//! proctor-orchestrator - promotion and verification of versioned test
//! definitions
//!
//! Test definitions move through three environments (trunk, qa,
//! production), each backed by its own revisioned store. Every mutation
//! runs as an observable background [`job::Job`]; before a definition moves
//! or changes it is verified against every client that registered a
//! specification for the target environment.

pub mod allocation;
pub mod cli;
pub mod config;
pub mod errors;
pub mod hooks;
pub mod job;
pub mod matrix;
pub mod model;
pub mod promotion;
pub mod service;
pub mod specification;
pub mod store;

pub use allocation::is_allocation_only_change;
pub use config::OrchestratorConfig;
pub use errors::{ErrorCategory, ProctorError, ProctorResult};
pub use service::DefinitionService;
