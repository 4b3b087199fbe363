// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! nrd: the node runner daemon.
//!
//! `nrd` consumes step requests from the work queue. `nrd --node-worker`
//! is the child-process sandbox entry: it reads one request on stdin,
//! writes one outcome frame on stdout, and must keep stdout clean —
//! worker-mode logging goes to stderr.

use nr_runner::{run_runner, RunnerConfig};
use nr_sandbox::NODE_WORKER_FLAG;
use tracing_subscriber::EnvFilter;

fn main() -> std::process::ExitCode {
    let worker_mode = std::env::args().any(|a| a == NODE_WORKER_FLAG);
    init_tracing(worker_mode);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "tokio runtime init failed");
            return std::process::ExitCode::FAILURE;
        }
    };

    if worker_mode {
        let code = runtime.block_on(nr_sandbox::run_node_worker());
        return std::process::ExitCode::from(code.clamp(0, u8::MAX as i32) as u8);
    }

    match runtime.block_on(run_runner(RunnerConfig::from_env(), None)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "runner failed");
            std::process::ExitCode::FAILURE
        }
    }
}

fn init_tracing(worker_mode: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Worker mode owns stdout for the outcome frame; logs must not
    // contaminate it.
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if worker_mode {
        let _ = builder.compact().try_init();
    } else {
        let _ = builder.try_init();
    }
}
