//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use phaseforge_common::{
    CommandAdvisor, CommandResult, ContentService, CreatedInstance, FileFix, GeneratedFile,
    InstanceStatus, Issue, PhaseDescriptor, PhaseOutput, PlanningService, ReviewService,
    ReviewVerdict, SandboxError, SandboxService, ServiceError,
};
use phaseforge_common::{FileConcept, GenerationState};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::PhaseforgeToml;
use crate::state::StateStore;

pub fn phase(name: &str, paths: &[&str]) -> PhaseDescriptor {
    PhaseDescriptor {
        name: name.to_string(),
        description: format!("{} description", name),
        files: paths
            .iter()
            .map(|p| FileConcept {
                path: p.to_string(),
                purpose: format!("{} file", p),
            })
            .collect(),
        last_phase: false,
    }
}

pub fn memory_store(budget: u32) -> Arc<StateStore> {
    Arc::new(StateStore::in_memory(GenerationState::new("demo", budget)))
}

/// Config with short timeouts for paused-clock tests.
pub fn test_toml() -> PhaseforgeToml {
    let mut toml = PhaseforgeToml::default();
    toml.project.name = Some("demo".into());
    toml.deploy.timeout_secs = 60;
    toml.deploy.max_retries = 3;
    toml.deploy.backoff_base_ms = 1000;
    toml.health.interval_secs = 30;
    toml
}

// ── Sandbox ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSandbox {
    pub create_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub healthy: AtomicBool,
    /// Each create call sleeps this long first.
    pub create_delay: Mutex<Option<Duration>>,
    /// Fail this many create calls with a connection error.
    pub failing_creates: AtomicU32,
    /// Fail every create call with this message.
    pub create_error: Mutex<Option<String>>,
    /// Commands starting with any of these prefixes fail.
    pub failing_prefixes: Mutex<Vec<String>>,
    pub written: Mutex<Vec<(String, Vec<String>)>>,
    pub executed: Mutex<Vec<Vec<String>>>,
    pub errors: Mutex<Vec<Issue>>,
    pub analysis: Mutex<Vec<Issue>>,
    pub statuses: Mutex<HashMap<String, bool>>,
}

impl FakeSandbox {
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn with_create_delay(self, delay: Duration) -> Self {
        *self.create_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn fail_commands_starting_with(&self, prefix: &str) {
        self.failing_prefixes.lock().unwrap().push(prefix.to_string());
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn written_paths(&self) -> Vec<Vec<String>> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(|(_, paths)| paths.clone())
            .collect()
    }

    pub fn executed_batches(&self) -> Vec<Vec<String>> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxService for FakeSandbox {
    async fn create_instance(
        &self,
        _session_id: &str,
        _template: &str,
        unique_name: &str,
    ) -> Result<CreatedInstance, SandboxError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = self.create_error.lock().unwrap().clone() {
            return Err(SandboxError::Connection(msg));
        }
        if self.failing_creates.load(Ordering::SeqCst) > 0 {
            self.failing_creates.fetch_sub(1, Ordering::SeqCst);
            return Err(SandboxError::Connection("connection lost".into()));
        }
        let instance_id = format!("inst-{}", n);
        self.statuses
            .lock()
            .unwrap()
            .insert(instance_id.clone(), true);
        Ok(CreatedInstance {
            preview_url: format!("https://{}.preview.test/{}", instance_id, unique_name),
            instance_id,
        })
    }

    async fn get_status(&self, instance_id: &str) -> Result<InstanceStatus, SandboxError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let healthy = self.healthy.load(Ordering::SeqCst)
            && self
                .statuses
                .lock()
                .unwrap()
                .get(instance_id)
                .copied()
                .unwrap_or(false);
        Ok(InstanceStatus {
            healthy,
            preview_url: healthy.then(|| format!("https://{}.preview.test", instance_id)),
        })
    }

    async fn write_files(
        &self,
        instance_id: &str,
        files: &[GeneratedFile],
    ) -> Result<(), SandboxError> {
        self.written.lock().unwrap().push((
            instance_id.to_string(),
            files.iter().map(|f| f.path.clone()).collect(),
        ));
        Ok(())
    }

    async fn execute_commands(
        &self,
        _instance_id: &str,
        commands: &[String],
    ) -> Result<Vec<CommandResult>, SandboxError> {
        self.executed.lock().unwrap().push(commands.to_vec());
        let prefixes = self.failing_prefixes.lock().unwrap().clone();
        Ok(commands
            .iter()
            .map(|cmd| {
                let failed = prefixes.iter().any(|p| cmd.starts_with(p.as_str()));
                CommandResult {
                    command: cmd.clone(),
                    success: !failed,
                    output: if failed { "ERR!".into() } else { String::new() },
                    exit_code: Some(if failed { 1 } else { 0 }),
                }
            })
            .collect())
    }

    async fn get_errors(&self, _instance_id: &str) -> Result<Vec<Issue>, SandboxError> {
        Ok(self.errors.lock().unwrap().clone())
    }

    async fn static_analysis(&self, _instance_id: &str) -> Result<Vec<Issue>, SandboxError> {
        Ok(self.analysis.lock().unwrap().clone())
    }
}

// ── Planner ──────────────────────────────────────────────────────────

/// Returns queued phases in order, then `None` forever.
#[derive(Default)]
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<Result<Option<PhaseDescriptor>, String>>>,
    pub calls: AtomicUsize,
    pub seen_inputs: Mutex<Vec<Vec<String>>>,
}

impl ScriptedPlanner {
    pub fn new(phases: Vec<PhaseDescriptor>) -> Self {
        Self {
            script: Mutex::new(phases.into_iter().map(|p| Ok(Some(p))).collect()),
            ..Default::default()
        }
    }

    pub fn push_quota_error(&self) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err("quota".to_string()));
    }

    pub fn push_phase(&self, phase: PhaseDescriptor) {
        self.script.lock().unwrap().push_back(Ok(Some(phase)));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanningService for ScriptedPlanner {
    async fn next_phase(
        &self,
        _issues: &[Issue],
        pending_inputs: &[String],
    ) -> Result<Option<PhaseDescriptor>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_inputs
            .lock()
            .unwrap()
            .push(pending_inputs.to_vec());
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(phase)) => Ok(phase),
            Some(Err(msg)) => Err(ServiceError::QuotaExceeded(msg)),
            None => Ok(None),
        }
    }
}

// ── Content ──────────────────────────────────────────────────────────

/// Writes one file per concept; optionally bundles setup commands.
#[derive(Default)]
pub struct FakeContent {
    pub implement_calls: AtomicUsize,
    pub regenerate_calls: AtomicUsize,
    pub commands: Mutex<Vec<String>>,
    /// Phases named here produce no files.
    pub empty_phases: Mutex<Vec<String>>,
    pub fail_with: Mutex<Option<String>>,
}

impl FakeContent {
    pub fn implemented(&self) -> usize {
        self.implement_calls.load(Ordering::SeqCst)
    }

    pub fn regenerated(&self) -> usize {
        self.regenerate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentService for FakeContent {
    async fn implement(
        &self,
        phase: &PhaseDescriptor,
        _issues: &[Issue],
    ) -> Result<PhaseOutput, ServiceError> {
        self.implement_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.fail_with.lock().unwrap().clone() {
            return Err(anyhow::anyhow!(msg).into());
        }
        if self.empty_phases.lock().unwrap().contains(&phase.name) {
            return Ok(PhaseOutput::default());
        }
        let mut files: Vec<GeneratedFile> = phase
            .files
            .iter()
            .map(|f| GeneratedFile::new(&f.path, format!("// {}: {}\n", phase.name, f.purpose)))
            .collect();
        if files.is_empty() {
            files.push(GeneratedFile::new(
                "README.md",
                format!("# {}\n", phase.name),
            ));
        }
        Ok(PhaseOutput {
            files,
            commands: self.commands.lock().unwrap().clone(),
        })
    }

    async fn regenerate_file(
        &self,
        file: &GeneratedFile,
        issues: &[String],
    ) -> Result<GeneratedFile, ServiceError> {
        self.regenerate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedFile::new(
            &file.path,
            format!("{}// fixed: {}\n", file.content, issues.join("; ")),
        ))
    }
}

// ── Reviewer ─────────────────────────────────────────────────────────

/// Returns queued verdicts, then clean verdicts.
#[derive(Default)]
pub struct FakeReviewer {
    verdicts: Mutex<VecDeque<ReviewVerdict>>,
    pub calls: AtomicUsize,
}

impl FakeReviewer {
    pub fn flagging(paths: &[&str]) -> Self {
        let verdict = ReviewVerdict {
            files_to_fix: paths
                .iter()
                .map(|p| FileFix {
                    path: p.to_string(),
                    issues: vec![format!("{} has a bug", p)],
                })
                .collect(),
            commands: Vec::new(),
        };
        Self {
            verdicts: Mutex::new(VecDeque::from([verdict])),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewService for FakeReviewer {
    async fn review(
        &self,
        _issues: &[Issue],
        _files: &[GeneratedFile],
    ) -> Result<ReviewVerdict, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdicts.lock().unwrap().pop_front().unwrap_or_default())
    }
}

// ── Advisor ──────────────────────────────────────────────────────────

/// Returns queued alternatives, then nothing.
#[derive(Default)]
pub struct ScriptedAdvisor {
    replies: Mutex<VecDeque<Vec<String>>>,
    pub calls: AtomicUsize,
}

impl ScriptedAdvisor {
    pub fn new(replies: Vec<Vec<&str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.into_iter().map(String::from).collect())
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandAdvisor for ScriptedAdvisor {
    async fn suggest_alternatives(
        &self,
        _failed: &[CommandResult],
    ) -> Result<Vec<String>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
    }
}
