//! Tracing setup.
//!
//! - stderr: compact human-readable output, filtered by `RUST_LOG`
//!   (default `phaseforge=info`, or `phaseforge=debug` with `--verbose`)
//! - `.phaseforge/logs/phaseforge.log.<date>`: daily-rolled JSON lines, when
//!   a log directory is available
//!
//! ```bash
//! RUST_LOG=phaseforge::deploy=trace phaseforge run
//! ```

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "phaseforge.log";

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "phaseforge=debug"
    } else {
        "phaseforge=info"
    }
}

fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; hold it for the life
/// of the process. Calling this twice is harmless (the second call is a no-op).
pub fn init(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).compact();

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().json().with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(build_filter(verbose))
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(build_filter(verbose))
                .with(stderr_layer)
                .try_init();
            None
        }
    }
}
