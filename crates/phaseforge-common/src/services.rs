//! Contracts for the external collaborators the orchestration core consumes.
//!
//! Inference (planning, content, review, command advice) and the remote
//! sandbox are black boxes behind these traits. Real implementations live in
//! the `phaseforge` crate (`claude`, `sandbox`); tests use in-memory doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{GeneratedFile, PhaseDescriptor};

// ── Errors ───────────────────────────────────────────────────────────

/// Failure reported by an inference collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Rate limit or usage quota hit; fatal for the current run.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, ServiceError::QuotaExceeded(_))
    }
}

/// Failure reported by the remote sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Transport-level failure (connection refused, reset, lost).
    #[error("Sandbox connection error: {0}")]
    Connection(String),

    #[error("Sandbox returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ── Shared value types ───────────────────────────────────────────────

/// A problem observed in the project: runtime error, lint finding, etc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub source: IssueSource,
    pub message: String,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSource {
    Runtime,
    StaticAnalysis,
}

/// Files plus setup commands produced for one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOutput {
    #[serde(default)]
    pub files: Vec<GeneratedFile>,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// A file the reviewer wants regenerated, with the reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFix {
    pub path: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Outcome of one review pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    #[serde(default)]
    pub files_to_fix: Vec<FileFix>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl ReviewVerdict {
    pub fn is_clean(&self) -> bool {
        self.files_to_fix.is_empty() && self.commands.is_empty()
    }
}

/// Remote instance created by the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedInstance {
    pub instance_id: String,
    pub preview_url: String,
}

/// Liveness probe result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub healthy: bool,
    #[serde(default)]
    pub preview_url: Option<String>,
}

/// Result of one command run inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

// ── Traits ───────────────────────────────────────────────────────────

#[async_trait]
pub trait PlanningService: Send + Sync {
    /// Plan the next phase, or `None` when there is no more work.
    async fn next_phase(
        &self,
        issues: &[Issue],
        pending_inputs: &[String],
    ) -> Result<Option<PhaseDescriptor>, ServiceError>;
}

#[async_trait]
pub trait ContentService: Send + Sync {
    /// Materialize file contents (and setup commands) for a phase.
    async fn implement(
        &self,
        phase: &PhaseDescriptor,
        issues: &[Issue],
    ) -> Result<PhaseOutput, ServiceError>;

    /// Rewrite one file to address review findings.
    async fn regenerate_file(
        &self,
        file: &GeneratedFile,
        issues: &[String],
    ) -> Result<GeneratedFile, ServiceError>;
}

#[async_trait]
pub trait ReviewService: Send + Sync {
    async fn review(
        &self,
        issues: &[Issue],
        files: &[GeneratedFile],
    ) -> Result<ReviewVerdict, ServiceError>;
}

#[async_trait]
pub trait CommandAdvisor: Send + Sync {
    /// Suggest replacement commands for the ones that failed.
    async fn suggest_alternatives(
        &self,
        failed: &[CommandResult],
    ) -> Result<Vec<String>, ServiceError>;
}

#[async_trait]
pub trait SandboxService: Send + Sync {
    async fn create_instance(
        &self,
        session_id: &str,
        template: &str,
        unique_name: &str,
    ) -> Result<CreatedInstance, SandboxError>;

    async fn get_status(&self, instance_id: &str) -> Result<InstanceStatus, SandboxError>;

    async fn write_files(
        &self,
        instance_id: &str,
        files: &[GeneratedFile],
    ) -> Result<(), SandboxError>;

    async fn execute_commands(
        &self,
        instance_id: &str,
        commands: &[String],
    ) -> Result<Vec<CommandResult>, SandboxError>;

    async fn get_errors(&self, instance_id: &str) -> Result<Vec<Issue>, SandboxError>;

    /// Lint/type-check findings. Sandboxes without analysis report nothing.
    async fn static_analysis(&self, _instance_id: &str) -> Result<Vec<Issue>, SandboxError> {
        Ok(Vec::new())
    }
}
