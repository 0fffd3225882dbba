//! Setup command execution against the sandbox.
//!
//! - `sanitize` — cleanup, dedupe and install-command detection
//! - `executor` — chunked execution with advisor-assisted retries

pub mod executor;
pub mod sanitize;

pub use executor::{CommandExecutor, ExecutionReport};
pub use sanitize::{collapse_history, is_install_command, sanitize_commands};
