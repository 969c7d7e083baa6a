// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Elspeth binary: parse arguments, install logging and the shutdown
//! handler, dispatch the command, exit with the contract code.

use elspeth::presentation::commands;
use elspeth_bootstrap::{logger, Cli, ShutdownCoordinator};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    logger::init(&cli.log_level);

    let coordinator = ShutdownCoordinator::new();
    coordinator.listen_for_ctrl_c();

    let exit_code = commands::dispatch(cli.command, coordinator.token()).await;
    exit_code.exit();
}
