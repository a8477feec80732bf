// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `marchd`: the march upgrade orchestrator daemon.

use std::path::PathBuf;
use std::process::ExitCode;

use march_daemon::{Daemon, DaemonOpts, UnwiredFactory};
use march_storage::{load_settings, resolve_work_dir, WorkDir};

const USAGE: &str = "\
marchd - firewall fleet upgrade orchestrator

USAGE:
    marchd [--work-dir <path>]

OPTIONS:
    --work-dir <path>   Work directory (default: $MARCH_HOME,
                        ~/.march.config.json, or /opt/march)
    -h, --help          Print this help
";

fn parse_args() -> Result<Option<DaemonOpts>, String> {
    let mut opts = DaemonOpts::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--work-dir" => {
                let Some(path) = args.next() else {
                    return Err("--work-dir requires a path".to_string());
                };
                opts.work_dir = Some(PathBuf::from(path));
            }
            "-h" | "--help" => return Ok(None),
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(Some(opts))
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = match parse_args() {
        Ok(Some(opts)) => opts,
        Ok(None) => {
            print!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("error: {e}");
            eprint!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    // Resolve the work dir early so logging can land in it.
    let resolution = resolve_work_dir(opts.work_dir.clone());
    let work = WorkDir::new(resolution.path.clone());
    if let Err(e) = work.ensure() {
        eprintln!("error: could not create work directory: {e}");
        return ExitCode::FAILURE;
    }
    let level = match load_settings(&work) {
        Ok(settings) => settings.logging.level,
        Err(_) => "info".to_string(),
    };
    let _log_guard = march_daemon::logging::init_logging(&work, &level);

    let daemon = match Daemon::start(opts, UnwiredFactory) {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::error!(error = %e, "daemon startup failed");
            return ExitCode::FAILURE;
        }
    };
    match daemon.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "daemon exited with error");
            ExitCode::FAILURE
        }
    }
}
