pub mod claude;
pub mod commands;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod init;
pub mod logging;
pub mod orchestrator;
pub mod sandbox;
pub mod state;
pub mod ui;
pub mod util;

#[cfg(test)]
mod test_support;

pub use errors::{DeploymentError, GenerationError, StateError};
pub use orchestrator::{GenerationAgent, RunOutcome};
