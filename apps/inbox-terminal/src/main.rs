mod bridge;
mod config;
mod input;
mod logging;
mod media_cache;
mod render;

use std::{io, process::ExitCode, sync::Arc};

use bridge::TerminalBridge;
use config::TerminalConfig;
use inbox_core::InboxSession;
use inbox_http::spawn_runtime;
use inbox_platform::{ClipboardSink, InMemoryClipboard};
use media_cache::MediaCache;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match TerminalConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };
    info!(
        base_url = %config.base_url,
        page_size = config.page_size,
        reconnect_delay_ms = config.reconnect_delay_ms,
        "starting inbox-terminal"
    );

    let media_cache = match MediaCache::open(&config.media_cache_dir(), config.media_cache_bytes) {
        Ok(cache) => Some(cache),
        Err(err) => {
            warn!(error = %err, "media cache unavailable; downloads will not be kept");
            None
        }
    };

    let handle = match spawn_runtime(config.runtime_config()) {
        Ok(handle) => handle,
        Err(err) => {
            error!(error = %err, "failed to start runtime");
            eprintln!("Failed to start: {err}");
            return ExitCode::FAILURE;
        }
    };

    let bridge = TerminalBridge::new(
        InboxSession::new(config.page_size),
        clipboard(),
        media_cache,
        io::stdout(),
    );
    match bridge.run(handle).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "terminal i/o failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "os-clipboard")]
fn clipboard() -> Arc<dyn ClipboardSink> {
    Arc::new(inbox_platform::FallbackClipboard::new(
        inbox_platform::SystemClipboard::default(),
        InMemoryClipboard::default(),
    ))
}

#[cfg(not(feature = "os-clipboard"))]
fn clipboard() -> Arc<dyn ClipboardSink> {
    Arc::new(InMemoryClipboard::default())
}
