//! # xt_app
//!
//! Shared utilities for the rate limit probe

pub mod cli;
pub mod config_loader;
pub mod dry_run;
pub mod probe;
pub mod tracing_setup;
