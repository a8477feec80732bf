// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log setup for the daemon binary.
//!
//! Three sinks: human-readable output on stderr, a daily-rolled plain
//! text file under `logs/text/`, and a daily-rolled JSON file under
//! `logs/structured/` for machine consumption. `RUST_LOG` overrides the
//! configured level.

use march_storage::WorkDir;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. The returned guards must live as long
/// as the process, or buffered file output is lost.
pub fn init_logging(work: &WorkDir, level: &str) -> Option<(WorkerGuard, WorkerGuard)> {
    let text_appender = tracing_appender::rolling::daily(work.text_log_dir(), "marchd.log");
    let (text_writer, text_guard) = tracing_appender::non_blocking(text_appender);
    let json_appender =
        tracing_appender::rolling::daily(work.structured_log_dir(), "marchd.json");
    let (json_writer, json_guard) = tracing_appender::non_blocking(json_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(text_writer),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(json_writer),
        )
        .try_init();

    match result {
        Ok(()) => Some((text_guard, json_guard)),
        Err(e) => {
            eprintln!("logging already initialized: {e}");
            None
        }
    }
}
