//! CLI command definitions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Write the reference llvm-project configuration
    Init {
        /// Where to write the configuration
        #[arg(default_value = "cascade.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Load and validate a configuration
    Validate {
        /// Path to configuration file
        #[arg(default_value = "cascade.yaml")]
        config: PathBuf,
    },

    /// Classify paths read from stdin, one per line
    Classify {
        /// Path to configuration file
        #[arg(short, long, default_value = "cascade.yaml")]
        config: PathBuf,

        /// Branch of the hypothetical change
        #[arg(long)]
        branch: Option<String>,
    },

    /// Force builders to run, bypassing filters and upstreams
    Force {
        /// Path to configuration file
        #[arg(short, long, default_value = "cascade.yaml")]
        config: PathBuf,

        /// Builder to run (repeatable)
        #[arg(short, long = "builder", required = true)]
        builders: Vec<String>,

        /// Revision to build
        #[arg(short, long)]
        revision: String,

        /// Branch to build (defaults to manual.default_branch)
        #[arg(long)]
        branch: Option<String>,

        /// Free-form reason recorded on the requests
        #[arg(long)]
        reason: Option<String>,
    },

    /// Run the scheduler over JSON-lines feed records on stdin
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "cascade.yaml")]
        config: PathBuf,

        /// Drain armed windows and exit when stdin closes
        #[arg(long)]
        exit_on_eof: bool,
    },

    /// Print the configuration JSON Schema
    Schema,
}
