// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Handlers
//!
//! Maps parsed CLI commands to use cases and results to exit codes:
//! 0 on success, 1 on any failed run or operational error, 2 on usage
//! and configuration errors, 130 when interrupted.

use std::io::Write as _;

use elspeth_bootstrap::{Command, ExitCode, ShutdownToken};
use elspeth_domain::EngineError;
use tracing::error;

use crate::application::use_cases;

/// Dispatches one CLI command and returns the process exit code.
pub async fn dispatch(command: Command, shutdown: ShutdownToken) -> ExitCode {
    match command {
        Command::Run { config } => {
            match use_cases::run_pipeline(&config, Some(shutdown)).await {
                Ok(report) => {
                    println!(
                        "run {} completed: {} rows ({} completed, {} routed, {} forked, {} consumed, {} failed), {} artifacts, grade {}",
                        report.run.run_id,
                        report.summary.rows_seen,
                        report.summary.rows_completed,
                        report.summary.rows_routed,
                        report.summary.rows_forked,
                        report.summary.rows_consumed,
                        report.summary.rows_failed,
                        report.summary.artifacts_written,
                        report
                            .run
                            .reproducibility_grade
                            .map(|g| g.as_str())
                            .unwrap_or("none"),
                    );
                    ExitCode::Success
                }
                Err(error) => failure_code(&error),
            }
        }

        Command::Resume { run_id, config } => {
            match use_cases::resume_run(&run_id, config.as_deref(), Some(shutdown)).await {
                Ok(report) => {
                    println!(
                        "run {} resumed and completed: {} rows replayed, {} artifacts",
                        report.run.run_id,
                        report.summary.rows_seen,
                        report.summary.artifacts_written,
                    );
                    ExitCode::Success
                }
                Err(error) => failure_code(&error),
            }
        }

        Command::Purge {
            config,
            retention_days,
            dry_run,
            yes,
        } => {
            // Always report the dry-run totals first; the destructive pass
            // needs confirmation unless --yes.
            let preview = match use_cases::purge_payloads(&config, retention_days, true).await {
                Ok(preview) => preview,
                Err(error) => return failure_code(&error),
            };
            println!(
                "purge would delete {} blobs ({} bytes) across {} runs",
                preview.deleted_count, preview.bytes_freed, preview.affected_runs
            );

            if dry_run {
                return ExitCode::Success;
            }
            if !yes && !confirm("proceed with purge? [y/N] ") {
                println!("purge aborted");
                return ExitCode::Success;
            }

            match use_cases::purge_payloads(&config, retention_days, false).await {
                Ok(result) => {
                    println!(
                        "purged {} blobs ({} bytes); {} refs did not resolve; {:.2}s",
                        result.deleted_count,
                        result.bytes_freed,
                        result.failed_refs.len(),
                        result.duration_seconds,
                    );
                    ExitCode::Success
                }
                Err(error) => failure_code(&error),
            }
        }

        Command::Explain {
            config,
            run_id,
            row_id,
        } => match use_cases::explain_row(&config, &run_id, &row_id).await {
            Ok(lineage) => match serde_json::to_string_pretty(&lineage) {
                Ok(rendered) => {
                    println!("{}", rendered);
                    ExitCode::Success
                }
                Err(e) => {
                    error!(error = %e, "failed to render lineage");
                    ExitCode::Failure
                }
            },
            Err(error) => failure_code(&error),
        },
    }
}

fn failure_code(error: &EngineError) -> ExitCode {
    error!(error = %error, "command failed");
    match error {
        EngineError::InvalidConfiguration(_)
        | EngineError::UnknownDeterminism { .. }
        | EngineError::SchemaViolation { .. } => ExitCode::UsageError,
        EngineError::Cancelled(_) => ExitCode::Interrupted,
        _ => ExitCode::Failure,
    }
}

fn confirm(prompt: &str) -> bool {
    print!("{}", prompt);
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}
