//! Tracing/logging bootstrap for the terminal client.

use std::{env, io};

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,inbox_terminal=debug,inbox_http=debug,inbox_core=info";

/// Initialize global tracing subscriber with severity gating from environment.
///
/// Output goes to stderr; stdout belongs to the operator.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `INBOX_TERMINAL_LOG`
/// 3) `INBOX_LOG`
/// 4) internal default filter
pub fn init() {
    let env_filter = filter_from_env();
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_env_filter(env_filter)
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    for key in ["INBOX_TERMINAL_LOG", "INBOX_LOG"] {
        if let Some(value) = env::var(key).ok().filter(|v| !v.trim().is_empty())
            && let Ok(filter) = EnvFilter::try_new(value)
        {
            return filter;
        }
    }

    EnvFilter::new(DEFAULT_FILTER)
}
