//! The persisted generation record and its parts.
//!
//! `GenerationState` is the single authoritative record for a project. It is
//! always replaced wholesale; see `phaseforge::state::StateStore` for the
//! versioned store that serialises writers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Phase quota a fresh project starts with.
pub const DEFAULT_PHASE_BUDGET: u32 = 12;

/// Name given to the synthetic phase appended by the finalize step.
pub const FINAL_PHASE_NAME: &str = "Finalization and Polish";

/// Orchestrator state, persisted so a run can resume after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevState {
    #[default]
    Idle,
    Planning,
    Implementing,
    Reviewing,
    Finalizing,
}

impl std::fmt::Display for DevState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevState::Idle => write!(f, "idle"),
            DevState::Planning => write!(f, "planning"),
            DevState::Implementing => write!(f, "implementing"),
            DevState::Reviewing => write!(f, "reviewing"),
            DevState::Finalizing => write!(f, "finalizing"),
        }
    }
}

/// A file the planner intends a phase to touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConcept {
    pub path: String,
    #[serde(default)]
    pub purpose: String,
}

/// What the planning collaborator hands back for the next unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub files: Vec<FileConcept>,
    /// Planner's hint that no further phases are expected after this one.
    #[serde(default)]
    pub last_phase: bool,
}

impl PhaseDescriptor {
    /// The synthetic descriptor implemented by the finalize step.
    pub fn finalization() -> Self {
        Self {
            name: FINAL_PHASE_NAME.to_string(),
            description: "Review the whole project for loose ends, fix remaining runtime and \
                          lint issues, and polish the user-facing experience."
                .to_string(),
            files: Vec::new(),
            last_phase: true,
        }
    }
}

/// One entry of the append-only phase log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub file_refs: Vec<String>,
    pub completed: bool,
    #[serde(default)]
    pub last_phase: bool,
}

impl PhaseRecord {
    /// Open (not yet completed) record for a freshly planned phase.
    pub fn planned(descriptor: &PhaseDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            file_refs: descriptor.files.iter().map(|f| f.path.clone()).collect(),
            completed: false,
            last_phase: descriptor.last_phase,
        }
    }

    /// Rebuild the descriptor so an interrupted phase can be implemented again.
    pub fn descriptor(&self) -> PhaseDescriptor {
        PhaseDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            files: self
                .file_refs
                .iter()
                .map(|path| FileConcept {
                    path: path.clone(),
                    purpose: String::new(),
                })
                .collect(),
            last_phase: self.last_phase,
        }
    }
}

/// Stored content of one generated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub content: String,
    pub last_modified_at: DateTime<Utc>,
    /// Unified diff against the previous content (empty prior content for new files).
    #[serde(default)]
    pub last_diff: String,
}

/// A file produced by the content collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// The whole persisted record for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationState {
    /// Project identity; seeds unique remote instance names.
    pub project_name: String,
    #[serde(default)]
    pub phases: Vec<PhaseRecord>,
    #[serde(default)]
    pub file_states: BTreeMap<String, FileState>,
    pub phase_budget: u32,
    #[serde(default)]
    pub pending_inputs: Vec<String>,
    #[serde(default)]
    pub current_state: DevState,
    #[serde(default)]
    pub mvp_completed: bool,
    #[serde(default)]
    pub review_started: bool,
    /// Intent flag: a run was requested and has not finished yet.
    #[serde(default)]
    pub should_be_generating: bool,
    #[serde(default)]
    pub sandbox_session_id: Option<String>,
    #[serde(default)]
    pub sandbox_instance_id: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub command_history: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationState {
    pub fn new(project_name: impl Into<String>, phase_budget: u32) -> Self {
        let now = Utc::now();
        Self {
            project_name: project_name.into(),
            phases: Vec::new(),
            file_states: BTreeMap::new(),
            phase_budget,
            pending_inputs: Vec::new(),
            current_state: DevState::Idle,
            mvp_completed: false,
            review_started: false,
            should_be_generating: false,
            sandbox_session_id: None,
            sandbox_instance_id: None,
            preview_url: None,
            command_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The tail phase if it has not been completed yet.
    pub fn in_progress_phase(&self) -> Option<&PhaseRecord> {
        self.phases.last().filter(|p| !p.completed)
    }

    pub fn completed_phase_count(&self) -> usize {
        self.phases.iter().filter(|p| p.completed).count()
    }

    /// All stored files as a flat list, in path order.
    pub fn all_files(&self) -> Vec<GeneratedFile> {
        self.file_states
            .iter()
            .map(|(path, f)| GeneratedFile::new(path.clone(), f.content.clone()))
            .collect()
    }

    /// Raise the budget to at least `floor`; never lowers it.
    pub fn recharge_budget(&mut self, floor: u32) {
        self.phase_budget = self.phase_budget.max(floor);
    }

    /// Consume one unit of budget, saturating at zero.
    pub fn consume_budget(&mut self) {
        self.phase_budget = self.phase_budget.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_defaults() {
        let state = GenerationState::new("todo-app", DEFAULT_PHASE_BUDGET);
        assert_eq!(state.phase_budget, 12);
        assert_eq!(state.current_state, DevState::Idle);
        assert!(!state.mvp_completed);
        assert!(state.sandbox_instance_id.is_none());
        assert!(state.in_progress_phase().is_none());
    }

    #[test]
    fn test_recharge_never_lowers() {
        let mut state = GenerationState::new("p", 7);
        state.recharge_budget(3);
        assert_eq!(state.phase_budget, 7);
        state.phase_budget = 1;
        state.recharge_budget(3);
        assert_eq!(state.phase_budget, 3);
    }

    #[test]
    fn test_consume_budget_saturates() {
        let mut state = GenerationState::new("p", 1);
        state.consume_budget();
        state.consume_budget();
        assert_eq!(state.phase_budget, 0);
    }

    #[test]
    fn test_in_progress_phase_is_open_tail() {
        let mut state = GenerationState::new("p", 3);
        let descriptor = PhaseDescriptor {
            name: "Scaffold".into(),
            description: "base layout".into(),
            files: vec![FileConcept {
                path: "src/App.tsx".into(),
                purpose: "root".into(),
            }],
            last_phase: false,
        };
        state.phases.push(PhaseRecord::planned(&descriptor));
        assert_eq!(state.in_progress_phase().map(|p| p.name.as_str()), Some("Scaffold"));

        state.phases[0].completed = true;
        assert!(state.in_progress_phase().is_none());
        assert_eq!(state.completed_phase_count(), 1);
    }

    #[test]
    fn test_record_descriptor_keeps_file_refs() {
        let descriptor = PhaseDescriptor {
            name: "Api".into(),
            description: "routes".into(),
            files: vec![FileConcept {
                path: "src/api.ts".into(),
                purpose: String::new(),
            }],
            last_phase: true,
        };
        let rebuilt = PhaseRecord::planned(&descriptor).descriptor();
        assert_eq!(rebuilt, descriptor);
    }

    #[test]
    fn test_dev_state_serializes_snake_case() {
        let json = serde_json::to_string(&DevState::Implementing).unwrap();
        assert_eq!(json, "\"implementing\"");
        assert_eq!(DevState::Reviewing.to_string(), "reviewing");
    }

    #[test]
    fn test_state_deserializes_with_missing_optional_fields() {
        let json = r#"{
            "project_name": "p",
            "phase_budget": 4,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let state: GenerationState = serde_json::from_str(json).unwrap();
        assert_eq!(state.phase_budget, 4);
        assert!(state.phases.is_empty());
        assert_eq!(state.current_state, DevState::Idle);
    }
}
