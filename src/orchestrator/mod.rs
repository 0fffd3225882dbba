//! The phase state machine and the agent facade built on it.

pub mod agent;
pub mod machine;
mod review;

pub use agent::{AgentBuilder, GenerationAgent, RunHandle};
pub use machine::{Collaborators, PhaseOrchestrator, RunOutcome};
