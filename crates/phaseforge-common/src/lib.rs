//! Shared domain types for phaseforge.
//!
//! - `state` — the persisted `GenerationState` record and its parts
//! - `events` — `GenerationEvent`, the closed set of observer notifications
//! - `services` — collaborator contracts (planning, content, review, sandbox)

pub mod events;
pub mod services;
pub mod state;

pub use events::GenerationEvent;
pub use services::{
    CommandAdvisor, CommandResult, ContentService, CreatedInstance, FileFix, InstanceStatus,
    Issue, IssueSource, PhaseOutput, PlanningService, ReviewService, ReviewVerdict,
    SandboxError, SandboxService, ServiceError,
};
pub use state::{
    DEFAULT_PHASE_BUDGET, DevState, FINAL_PHASE_NAME, FileConcept, FileState, GeneratedFile,
    GenerationState, PhaseDescriptor, PhaseRecord,
};
