//! CLI command implementations
//!
//! Each command reads its JSON inputs, runs one orchestration primitive
//! offline and returns the JSON payload written to stdout.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::allocation::is_allocation_only_change;
use crate::config::OrchestratorConfig;
use crate::job::{Job, JobType};
use crate::matrix::MatrixVerificationEngine;
use crate::model::{Environment, TestDefinition};
use crate::service::validate_basic_information;
use crate::specification::{
    check_internal_consistency, AppVersion, ClientSpecification, InMemorySpecificationSource,
    SpecificationVerifier, TestSpecification,
};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_json_file, write_response};

/// Client registry file: `{"clients": [{"environment": "qa", "app": ..., "version": ..., "tests": {...}}]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistryFile {
    #[serde(default)]
    pub clients: Vec<ClientEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEntry {
    pub environment: Environment,
    pub app: String,
    pub version: String,
    #[serde(flatten)]
    pub specification: ClientSpecification,
}

/// Parse arguments, install logging and run the selected command
pub fn run() -> CliResult<()> {
    init_tracing();
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Log to stderr so stdout carries only the JSON response
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let data = match cmd {
        Command::AllocationDiff { existing, updated } => allocation_diff(&existing, &updated)?,
        Command::CheckMatrix {
            name,
            definition,
            clients,
            environment,
            config,
        } => check_matrix(
            &name,
            definition.as_deref(),
            &clients,
            environment,
            config.as_deref(),
        )?,
        Command::Validate { name, definition } => validate(&name, &definition)?,
        Command::Specification { definition } => specification(&definition)?,
    };
    write_response(data)
}

/// Compare two definitions with the allocation-only detector
pub fn allocation_diff(existing: &Path, updated: &Path) -> CliResult<Value> {
    let existing: TestDefinition = read_json_file(existing)?;
    let updated: TestDefinition = read_json_file(updated)?;
    Ok(json!({
        "allocation_only": is_allocation_only_change(&existing, &updated)
    }))
}

/// Verify a candidate against every client of `environment` in the registry
pub fn check_matrix(
    test_name: &str,
    definition: Option<&Path>,
    clients: &Path,
    environment: Environment,
    config: Option<&Path>,
) -> CliResult<Value> {
    let config = match config {
        Some(path) => OrchestratorConfig::load(path)?,
        None => OrchestratorConfig::default(),
    };
    let candidate: Option<TestDefinition> = definition.map(read_json_file::<TestDefinition>).transpose()?;
    let registry: ClientRegistryFile = read_json_file(clients)?;
    debug!(clients = registry.clients.len(), %environment, "loaded client registry");

    let source = InMemorySpecificationSource::from_entries(registry.clients.into_iter().map(
        |entry| {
            (
                entry.environment,
                AppVersion::new(entry.app, entry.version),
                entry.specification,
            )
        },
    ))?;
    let engine = MatrixVerificationEngine::new(
        Arc::new(source),
        Arc::new(SpecificationVerifier),
        config.verify_executor_threads,
    );

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;
    let result = rt.block_on(engine.check_matrix(environment, test_name, candidate.as_ref()))?;
    Ok(serde_json::to_value(result)?)
}

/// Edit-time validation; warnings are returned alongside the verdict
pub fn validate(test_name: &str, definition: &Path) -> CliResult<Value> {
    let definition: TestDefinition = read_json_file(definition)?;
    let job = Job::new(0, format!("validate {}", test_name), JobType::Unknown);

    let outcome = validate_basic_information(&definition, &job)
        .and_then(|_| check_internal_consistency(test_name, &definition));
    let warnings: Vec<String> = job.log_output().lines().map(str::to_string).collect();
    Ok(match outcome {
        Ok(()) => json!({ "valid": true, "warnings": warnings }),
        Err(e) => json!({ "valid": false, "error": e.to_string(), "warnings": warnings }),
    })
}

/// Client specification generated from a definition
pub fn specification(definition: &Path) -> CliResult<Value> {
    let definition: TestDefinition = read_json_file(definition)?;
    let specification = TestSpecification::generate(&definition)?;
    Ok(serde_json::to_value(specification)?)
}
