use serde::{Deserialize, Serialize};

use crate::state::DevState;

// ── Event types ──────────────────────────────────────────────────────

/// Everything the orchestration core tells its observers about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GenerationEvent {
    // Run lifecycle
    GenerationStarted {
        phase_budget: u32,
    },
    GenerationCompleted {
        phases_completed: usize,
        error: Option<String>,
    },
    StateChanged {
        from: DevState,
        to: DevState,
    },
    StopRequested,
    InputQueued {
        text: String,
        pending: usize,
    },

    // Phase lifecycle
    PhasePlanned {
        name: String,
        description: String,
        files: Vec<String>,
    },
    PhaseImplementing {
        name: String,
    },
    PhaseImplemented {
        name: String,
        files: Vec<String>,
    },
    PhaseCompleted {
        name: String,
        remaining_budget: u32,
    },
    FilesSaved {
        paths: Vec<String>,
    },

    // Deployment
    DeploymentStarted {
        label: String,
        files: usize,
        force_redeploy: bool,
    },
    DeploymentCompleted {
        instance_id: String,
        preview_url: String,
        fresh_instance: bool,
    },
    DeploymentRetry {
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    DeploymentTimeout {
        label: String,
        timeout_secs: u64,
    },
    DeploymentFailed {
        label: String,
        error: String,
    },
    InstanceCreated {
        instance_id: String,
        preview_url: String,
    },
    HealthCheckFailed {
        instance_id: String,
        reason: String,
    },

    // Setup commands
    CommandsExecuting {
        commands: Vec<String>,
    },
    CommandsExecuted {
        succeeded: Vec<String>,
        failed: Vec<String>,
    },
    CommandsFailed {
        commands: Vec<String>,
        error: String,
    },

    // Review
    ReviewStarted {
        pass: u32,
    },
    ReviewCompleted {
        pass: u32,
        files_fixed: usize,
    },

    Error {
        message: String,
    },
}

impl GenerationEvent {
    /// Stable name of the variant, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationEvent::GenerationStarted { .. } => "GenerationStarted",
            GenerationEvent::GenerationCompleted { .. } => "GenerationCompleted",
            GenerationEvent::StateChanged { .. } => "StateChanged",
            GenerationEvent::StopRequested => "StopRequested",
            GenerationEvent::InputQueued { .. } => "InputQueued",
            GenerationEvent::PhasePlanned { .. } => "PhasePlanned",
            GenerationEvent::PhaseImplementing { .. } => "PhaseImplementing",
            GenerationEvent::PhaseImplemented { .. } => "PhaseImplemented",
            GenerationEvent::PhaseCompleted { .. } => "PhaseCompleted",
            GenerationEvent::FilesSaved { .. } => "FilesSaved",
            GenerationEvent::DeploymentStarted { .. } => "DeploymentStarted",
            GenerationEvent::DeploymentCompleted { .. } => "DeploymentCompleted",
            GenerationEvent::DeploymentRetry { .. } => "DeploymentRetry",
            GenerationEvent::DeploymentTimeout { .. } => "DeploymentTimeout",
            GenerationEvent::DeploymentFailed { .. } => "DeploymentFailed",
            GenerationEvent::InstanceCreated { .. } => "InstanceCreated",
            GenerationEvent::HealthCheckFailed { .. } => "HealthCheckFailed",
            GenerationEvent::CommandsExecuting { .. } => "CommandsExecuting",
            GenerationEvent::CommandsExecuted { .. } => "CommandsExecuted",
            GenerationEvent::CommandsFailed { .. } => "CommandsFailed",
            GenerationEvent::ReviewStarted { .. } => "ReviewStarted",
            GenerationEvent::ReviewCompleted { .. } => "ReviewCompleted",
            GenerationEvent::Error { .. } => "Error",
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
