use chrono::Utc;
use phaseforge_common::{
    ContentService, DevState, FINAL_PHASE_NAME, GenerationEvent, GenerationState, Issue,
    PhaseDescriptor, PhaseRecord, PlanningService, ReviewService, SandboxService,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, instrument, warn};

use crate::commands::CommandExecutor;
use crate::config::GenerationSection;
use crate::deploy::DeploymentManager;
use crate::errors::GenerationError;
use crate::events::Broadcaster;
use crate::state::{self, StateStore, save_files};

/// External services the state machine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub planner: Arc<dyn PlanningService>,
    pub content: Arc<dyn ContentService>,
    pub reviewer: Arc<dyn ReviewService>,
    pub sandbox: Arc<dyn SandboxService>,
}

/// How a call to [`PhaseOrchestrator::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run was active; nothing was done.
    AlreadyRunning,
    /// MVP finished and no inputs pending; nothing was done.
    NothingToDo,
    /// The machine reached IDLE.
    Completed { phases_completed: usize },
    /// A stop request was honoured at a state boundary.
    Stopped,
    /// A non-fatal failure idled the machine; a later run may resume.
    Aborted { error: String },
}

/// Result of implementing one phase record.
enum PhaseStep {
    /// The content service produced no files.
    Empty,
    Done {
        remaining_budget: u32,
        inputs_pending: bool,
    },
    /// A stop arrived while content was being generated.
    Interrupted,
}

/// The phase state machine.
///
/// `run` is guarded by an in-memory active flag, so overlapping calls are
/// no-ops. The current state is persisted on every transition, which makes
/// a run resumable after a restart. Stop requests are honoured only between
/// states; a collaborator call that completes after a stop has its result
/// discarded.
pub struct PhaseOrchestrator {
    pub(super) store: Arc<StateStore>,
    pub(super) collaborators: Collaborators,
    pub(super) deployer: DeploymentManager,
    pub(super) commands: Arc<CommandExecutor>,
    pub(super) events: Broadcaster,
    pub(super) settings: GenerationSection,
    active: AtomicBool,
    stop_requested: AtomicBool,
}

/// Clears the active flag and the intent flag however the run ends.
struct RunGuard<'a> {
    orchestrator: &'a PhaseOrchestrator,
    completed_at_start: usize,
    error: Option<String>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let o = self.orchestrator;
        let completed = match o.store.update(|s| {
            s.should_be_generating = false;
            s.completed_phase_count()
        }) {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to clear generation intent: {}", e);
                o.store.snapshot().completed_phase_count()
            }
        };
        o.stop_requested.store(false, Ordering::SeqCst);
        o.active.store(false, Ordering::SeqCst);
        o.events.publish(GenerationEvent::GenerationCompleted {
            phases_completed: completed.saturating_sub(self.completed_at_start),
            error: self.error.take(),
        });
    }
}

impl PhaseOrchestrator {
    pub fn new(
        store: Arc<StateStore>,
        collaborators: Collaborators,
        deployer: DeploymentManager,
        commands: Arc<CommandExecutor>,
        events: Broadcaster,
        settings: GenerationSection,
    ) -> Self {
        Self {
            store,
            collaborators,
            deployer,
            commands,
            events,
            settings,
            active: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn is_generating(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Ask the running loop to stop at the next state boundary.
    pub fn request_stop(&self) {
        info!("Stop requested");
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Err(e) = self.store.update(|s| s.should_be_generating = false) {
            warn!("Failed to clear generation intent: {}", e);
        }
        self.events.publish(GenerationEvent::StopRequested);
    }

    /// Drop a stop request left over from while no run was active.
    pub(super) fn clear_stale_stop(&self) {
        if !self.is_generating() {
            self.stop_requested.store(false, Ordering::SeqCst);
        }
    }

    pub(super) fn stopping(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Drive the machine until IDLE, a stop, or a fatal error.
    ///
    /// `recharge` raises the phase budget to at least that value first.
    #[instrument(skip(self))]
    pub async fn run(&self, recharge: Option<u32>) -> Result<RunOutcome, GenerationError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Generation already active; ignoring run request");
            return Ok(RunOutcome::AlreadyRunning);
        }

        if self.stopping() {
            info!("Stop requested before the run began");
            self.stop_requested.store(false, Ordering::SeqCst);
            self.active.store(false, Ordering::SeqCst);
            return Ok(RunOutcome::Stopped);
        }

        let snapshot = self.store.snapshot();
        let Some(entry) = entry_state(&snapshot) else {
            debug!("MVP complete and no pending inputs; nothing to do");
            if snapshot.should_be_generating {
                self.store.update(|s| s.should_be_generating = false)?;
            }
            self.active.store(false, Ordering::SeqCst);
            return Ok(RunOutcome::NothingToDo);
        };

        let mut guard = RunGuard {
            orchestrator: self,
            completed_at_start: snapshot.completed_phase_count(),
            error: None,
        };

        let budget = self.store.update(|s| {
            if let Some(floor) = recharge {
                s.recharge_budget(floor);
            }
            s.should_be_generating = true;
            s.phase_budget
        })?;
        info!(state = %entry, budget, "Generation started");
        self.events.publish(GenerationEvent::GenerationStarted {
            phase_budget: budget,
        });

        let result = self.drive(entry).await;
        match &result {
            Ok(RunOutcome::Aborted { error }) => guard.error = Some(error.clone()),
            Err(e) => guard.error = Some(e.to_string()),
            Ok(_) => {}
        }
        let completed = self
            .store
            .snapshot()
            .completed_phase_count()
            .saturating_sub(guard.completed_at_start);
        drop(guard);

        result.map(|outcome| match outcome {
            RunOutcome::Completed { .. } => RunOutcome::Completed {
                phases_completed: completed,
            },
            other => other,
        })
    }

    async fn drive(&self, entry: DevState) -> Result<RunOutcome, GenerationError> {
        let mut current = entry;
        self.transition(current)?;

        loop {
            if self.stopping() {
                info!(state = %current, "Stopping at state boundary");
                self.transition(DevState::Idle)?;
                return Ok(RunOutcome::Stopped);
            }

            let step = match current {
                DevState::Idle => return Ok(RunOutcome::Completed { phases_completed: 0 }),
                DevState::Planning => self.plan().await,
                DevState::Implementing => self.implement().await,
                DevState::Finalizing => self.finalize().await,
                DevState::Reviewing => self.review().await,
            };

            current = match step {
                Ok(next) => next,
                Err(e) if e.is_fatal() => {
                    error!(state = %current, "Fatal error: {}", e);
                    self.events.publish(GenerationEvent::Error {
                        message: e.to_string(),
                    });
                    return Err(e);
                }
                Err(e) => {
                    error!(state = %current, "Phase failed: {}", e);
                    self.events.publish(GenerationEvent::Error {
                        message: e.to_string(),
                    });
                    self.transition(DevState::Idle)?;
                    return Ok(RunOutcome::Aborted {
                        error: e.to_string(),
                    });
                }
            };
            self.transition(current)?;
        }
    }

    /// Persist `to` as the current state.
    pub(super) fn transition(&self, to: DevState) -> Result<(), GenerationError> {
        let from = self.store.update(|s| std::mem::replace(&mut s.current_state, to))?;
        if from != to {
            debug!(%from, %to, "State transition");
            self.events
                .publish(GenerationEvent::StateChanged { from, to });
        }
        Ok(())
    }

    /// Runtime errors plus static analysis from the live instance.
    pub(super) async fn collect_issues(&self, state: &GenerationState) -> Vec<Issue> {
        let Some(instance_id) = state.sandbox_instance_id.as_deref() else {
            return Vec::new();
        };
        let sandbox = &self.collaborators.sandbox;
        let mut issues = match sandbox.get_errors(instance_id).await {
            Ok(issues) => issues,
            Err(e) => {
                warn!("Failed to fetch runtime errors: {}", e);
                Vec::new()
            }
        };
        match sandbox.static_analysis(instance_id).await {
            Ok(found) => issues.extend(found),
            Err(e) => warn!("Failed to run static analysis: {}", e),
        }
        issues
    }

    async fn plan(&self) -> Result<DevState, GenerationError> {
        let state = self.store.snapshot();
        if let Some(open) = state.in_progress_phase() {
            info!(phase = %open.name, "Resuming unfinished phase");
            return Ok(DevState::Implementing);
        }

        if state.phase_budget == 0 && state.pending_inputs.is_empty() {
            info!("Phase budget exhausted");
            return Ok(no_more_work(&state));
        }

        let issues = self.collect_issues(&state).await;
        let inputs = state::drain_inputs(&self.store)?;
        let planned = match self
            .collaborators
            .planner
            .next_phase(&issues, &inputs)
            .await
        {
            Ok(planned) => planned,
            Err(e) => {
                self.requeue_inputs(inputs);
                return Err(GenerationError::planning(e));
            }
        };

        if self.stopping() {
            self.requeue_inputs(inputs);
            return Ok(DevState::Planning);
        }

        let Some(descriptor) = planned else {
            info!("Planner reports no more work");
            return Ok(no_more_work(&self.store.snapshot()));
        };

        info!(phase = %descriptor.name, files = descriptor.files.len(), "Phase planned");
        self.store
            .update(|s| s.phases.push(PhaseRecord::planned(&descriptor)))?;
        self.events.publish(GenerationEvent::PhasePlanned {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            files: descriptor.files.iter().map(|f| f.path.clone()).collect(),
        });
        Ok(DevState::Implementing)
    }

    async fn implement(&self) -> Result<DevState, GenerationError> {
        let Some(record) = self.store.snapshot().in_progress_phase().cloned() else {
            return Ok(DevState::Planning);
        };

        match self.execute_phase(&record, true).await? {
            PhaseStep::Interrupted => Ok(DevState::Implementing),
            PhaseStep::Empty => {
                info!(phase = %record.name, "No files produced; treating as no more phases");
                Ok(no_more_work(&self.store.snapshot()))
            }
            PhaseStep::Done {
                remaining_budget,
                inputs_pending,
            } => {
                if (record.last_phase || remaining_budget == 0) && !inputs_pending {
                    Ok(no_more_work(&self.store.snapshot()))
                } else {
                    Ok(DevState::Planning)
                }
            }
        }
    }

    async fn finalize(&self) -> Result<DevState, GenerationError> {
        let state = self.store.snapshot();
        if state.mvp_completed {
            return Ok(DevState::Idle);
        }

        let record = match state.in_progress_phase() {
            Some(open) if open.name == FINAL_PHASE_NAME => open.clone(),
            Some(open) => {
                warn!(phase = %open.name, "Closing unfinished phase before finalizing");
                self.store.update(close_tail)?;
                self.append_final_phase()?
            }
            None => self.append_final_phase()?,
        };

        if let PhaseStep::Interrupted = self.execute_phase(&record, false).await? {
            return Ok(DevState::Finalizing);
        }

        self.store.update(|s| s.mvp_completed = true)?;
        info!("MVP completed");
        Ok(DevState::Reviewing)
    }

    fn append_final_phase(&self) -> Result<PhaseRecord, GenerationError> {
        let descriptor = PhaseDescriptor::finalization();
        let record = PhaseRecord::planned(&descriptor);
        self.store.update(|s| s.phases.push(record.clone()))?;
        self.events.publish(GenerationEvent::PhasePlanned {
            name: descriptor.name,
            description: descriptor.description,
            files: Vec::new(),
        });
        Ok(record)
    }

    /// Generate, save, deploy and set up one phase, then close its record.
    async fn execute_phase(
        &self,
        record: &PhaseRecord,
        consume_budget: bool,
    ) -> Result<PhaseStep, GenerationError> {
        self.events.publish(GenerationEvent::PhaseImplementing {
            name: record.name.clone(),
        });

        let issues = self.collect_issues(&self.store.snapshot()).await;
        let output = self
            .collaborators
            .content
            .implement(&record.descriptor(), &issues)
            .await
            .map_err(|e| GenerationError::content(&record.name, e))?;

        if self.stopping() {
            return Ok(PhaseStep::Interrupted);
        }

        if output.files.is_empty() {
            self.store.update(close_tail)?;
            return Ok(PhaseStep::Empty);
        }

        let paths: Vec<String> = output.files.iter().map(|f| f.path.clone()).collect();
        let changed = self
            .store
            .update(|s| save_files(s, &output.files, Utc::now()))?;
        self.events.publish(GenerationEvent::FilesSaved { paths: changed });
        self.events.publish(GenerationEvent::PhaseImplemented {
            name: record.name.clone(),
            files: paths,
        });

        if let Err(e) = self
            .deployer
            .deploy(output.files.clone(), false, &record.name)
            .await
        {
            warn!(phase = %record.name, "Deployment failed; continuing: {}", e);
        }

        if !output.commands.is_empty() {
            self.commands.execute(&output.commands, true, None).await;
        }

        let (remaining_budget, inputs_pending) = self.store.update(|s| {
            close_tail(s);
            if consume_budget {
                s.consume_budget();
            }
            (s.phase_budget, !s.pending_inputs.is_empty())
        })?;
        info!(phase = %record.name, remaining_budget, "Phase completed");
        self.events.publish(GenerationEvent::PhaseCompleted {
            name: record.name.clone(),
            remaining_budget,
        });

        Ok(PhaseStep::Done {
            remaining_budget,
            inputs_pending,
        })
    }

    /// Put drained inputs back in front of anything queued since.
    fn requeue_inputs(&self, inputs: Vec<String>) {
        if inputs.is_empty() {
            return;
        }
        let result = self.store.update(|s| {
            let newer = std::mem::take(&mut s.pending_inputs);
            s.pending_inputs = inputs;
            s.pending_inputs.extend(newer);
        });
        if let Err(e) = result {
            warn!("Failed to requeue inputs: {}", e);
        }
    }
}

/// Where a run starts, or `None` when there is nothing to do.
fn entry_state(state: &GenerationState) -> Option<DevState> {
    if state.current_state != DevState::Idle {
        return Some(state.current_state);
    }
    if !state.pending_inputs.is_empty() || !state.mvp_completed {
        return Some(DevState::Planning);
    }
    None
}

fn no_more_work(state: &GenerationState) -> DevState {
    if state.mvp_completed {
        DevState::Idle
    } else {
        DevState::Finalizing
    }
}

fn close_tail(state: &mut GenerationState) {
    if let Some(last) = state.phases.last_mut() {
        last.completed = true;
    }
}
