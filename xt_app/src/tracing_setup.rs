use std::io;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy()
}

fn file_writer(app_name: &str, log_dir: &str) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::hourly(log_dir, format!("{app_name}.log"));
    tracing_appender::non_blocking(file_appender)
}

/// Initialise tracing with a non-blocking hourly file appender.
///
/// `RUST_LOG` overrides `default_level`. Keep the returned guard alive for the
/// lifetime of the process or buffered lines are lost on exit.
pub fn init(app_name: &str, log_dir: &str, default_level: Level) -> WorkerGuard {
    let (non_blocking, guard) = file_writer(app_name, log_dir);

    let fmt_layer = fmt::layer().with_writer(non_blocking).with_target(true).with_thread_ids(true).with_line_number(true).with_ansi(false).compact();

    tracing_subscriber::registry().with(env_filter(default_level)).with(fmt_layer).init();

    guard
}

/// Initialise tracing with both file and stdout output
pub fn init_with_stdout(app_name: &str, log_dir: &str, default_level: Level) -> WorkerGuard {
    let (non_blocking, guard) = file_writer(app_name, log_dir);

    let file_layer =
        fmt::layer().with_writer(non_blocking).with_target(true).with_thread_ids(true).with_line_number(true).with_ansi(false).compact();

    // Colours only on the terminal
    let stdout_layer = fmt::layer().with_writer(io::stdout).with_target(false).with_ansi(true).compact();

    tracing_subscriber::registry().with(env_filter(default_level)).with(file_layer).with(stdout_layer).init();

    guard
}
