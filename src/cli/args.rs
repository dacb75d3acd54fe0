//! CLI argument definitions using clap
//!
//! Commands:
//! - proctor-orchestrator allocation-diff --existing <path> --updated <path>
//! - proctor-orchestrator check-matrix --name <test> --definition <path> --clients <path>
//! - proctor-orchestrator validate --name <test> --definition <path>
//! - proctor-orchestrator specification --definition <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::model::Environment;

/// Offline tools for versioned test definitions
#[derive(Parser, Debug)]
#[command(name = "proctor-orchestrator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report whether an edit only redistributes allocations
    AllocationDiff {
        /// Definition before the edit
        #[arg(long)]
        existing: PathBuf,

        /// Definition after the edit
        #[arg(long)]
        updated: PathBuf,
    },

    /// Verify a definition against registered client specifications
    CheckMatrix {
        /// Test name the definition is checked under
        #[arg(long)]
        name: String,

        /// Candidate definition; omit to check a deletion
        #[arg(long)]
        definition: Option<PathBuf>,

        /// Client specification registry
        #[arg(long)]
        clients: PathBuf,

        /// Environment whose clients are checked
        #[arg(long, default_value = "qa")]
        environment: Environment,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run the edit-time validation of a definition
    Validate {
        #[arg(long)]
        name: String,

        #[arg(long)]
        definition: PathBuf,
    },

    /// Print the client specification generated from a definition
    Specification {
        #[arg(long)]
        definition: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
