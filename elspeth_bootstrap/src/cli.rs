// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface
//!
//! The minimal CLI surface: `run`, `resume`, `purge`, `explain`. Parsing
//! lives in the bootstrap layer; the engine crate maps parsed commands to
//! use cases.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Auditable pipeline orchestration engine.
#[derive(Debug, Parser)]
#[command(name = "elspeth", version, about)]
pub struct Cli {
    /// Log level filter (e.g. "info", "elspeth=debug").
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a pipeline run from a settings file.
    Run {
        /// Path to the TOML or YAML settings file.
        config: PathBuf,
    },

    /// Resume a failed run from its last checkpoint.
    Resume {
        /// The run to resume.
        run_id: String,
        /// Settings file override; defaults to the settings stored on the
        /// run.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Delete expired payload blobs while preserving all audit rows.
    Purge {
        /// Settings file naming the landscape and payload store.
        config: PathBuf,
        /// Retention window in days.
        #[arg(long)]
        retention_days: u32,
        /// Report what would be deleted without deleting.
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Show the full audit lineage of one row.
    Explain {
        /// Settings file naming the landscape and payload store.
        config: PathBuf,
        /// The run the row belongs to.
        run_id: String,
        /// The row to explain.
        row_id: String,
    },
}

impl Cli {
    /// Parses process arguments, exiting with a usage error on failure
    /// (clap prints the message).
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_parses() {
        let cli = Cli::try_parse_from(["elspeth", "run", "settings.toml"]).unwrap();
        match cli.command {
            Command::Run { config } => assert_eq!(config, PathBuf::from("settings.toml")),
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn purge_flags_parse() {
        let cli = Cli::try_parse_from([
            "elspeth",
            "purge",
            "settings.toml",
            "--retention-days",
            "90",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Command::Purge {
                retention_days,
                dry_run,
                yes,
                ..
            } => {
                assert_eq!(retention_days, 90);
                assert!(dry_run);
                assert!(!yes);
            }
            other => panic!("expected purge, got {:?}", other),
        }
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["elspeth"]).is_err());
    }
}
