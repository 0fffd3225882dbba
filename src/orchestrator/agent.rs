use anyhow::{Result, anyhow};
use phaseforge_common::{
    CommandAdvisor, ContentService, DevState, GenerationEvent, GenerationState, PlanningService,
    ReviewService, SandboxService,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use super::machine::{Collaborators, PhaseOrchestrator, RunOutcome};
use crate::commands::CommandExecutor;
use crate::config::PhaseforgeToml;
use crate::deploy::DeploymentManager;
use crate::errors::{GenerationError, StateError};
use crate::events::Broadcaster;
use crate::state::{self, StateStore};

pub type RunHandle = JoinHandle<Result<RunOutcome, GenerationError>>;

/// Public face of the core: one agent per project.
pub struct GenerationAgent {
    orchestrator: Arc<PhaseOrchestrator>,
    store: Arc<StateStore>,
    deployer: DeploymentManager,
    events: Broadcaster,
    recharge_floor: u32,
}

impl GenerationAgent {
    pub fn builder(store: Arc<StateStore>, toml: PhaseforgeToml) -> AgentBuilder {
        AgentBuilder {
            store,
            toml,
            events: None,
            planner: None,
            content: None,
            reviewer: None,
            advisor: None,
            sandbox: None,
        }
    }

    /// Spawn a generation run. The run records its own intent flag once it
    /// finds work to do.
    pub fn start(&self) -> RunHandle {
        self.start_with(None)
    }

    /// Like [`start`](Self::start), first raising the budget to `recharge`.
    ///
    /// A [`stop`](Self::stop) issued after this returns is honoured even if
    /// the spawned run has not been polled yet.
    pub fn start_with(&self, recharge: Option<u32>) -> RunHandle {
        self.orchestrator.clear_stale_stop();
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move { orchestrator.run(recharge).await })
    }

    pub fn stop(&self) {
        self.orchestrator.request_stop();
    }

    /// Restart a run that was interrupted, e.g. by a process restart.
    pub fn resume(&self) -> Option<RunHandle> {
        let state = self.store.snapshot();
        if self.orchestrator.is_generating() {
            return None;
        }
        if state.should_be_generating || state.current_state != DevState::Idle {
            info!(state = %state.current_state, "Resuming interrupted generation");
            return Some(self.start());
        }
        None
    }

    pub fn is_generating(&self) -> bool {
        self.orchestrator.is_generating()
    }

    pub fn get_state(&self) -> GenerationState {
        self.store.snapshot()
    }

    /// Queue user input for the next planning step and top up the budget.
    pub fn submit_input(&self, text: &str) -> Result<usize, StateError> {
        let pending = state::submit_input(&self.store, text, self.recharge_floor)?;
        self.events.publish(GenerationEvent::InputQueued {
            text: text.trim().to_string(),
            pending,
        });
        Ok(pending)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.events.subscribe()
    }

    pub fn orchestrator(&self) -> &Arc<PhaseOrchestrator> {
        &self.orchestrator
    }

    pub fn deployer(&self) -> &DeploymentManager {
        &self.deployer
    }

    /// Stop background health probing.
    pub fn shutdown(&self) {
        self.deployer.shutdown();
    }
}

pub struct AgentBuilder {
    store: Arc<StateStore>,
    toml: PhaseforgeToml,
    events: Option<Broadcaster>,
    planner: Option<Arc<dyn PlanningService>>,
    content: Option<Arc<dyn ContentService>>,
    reviewer: Option<Arc<dyn ReviewService>>,
    advisor: Option<Arc<dyn CommandAdvisor>>,
    sandbox: Option<Arc<dyn SandboxService>>,
}

impl AgentBuilder {
    pub fn events(mut self, events: Broadcaster) -> Self {
        self.events = Some(events);
        self
    }

    pub fn planner(mut self, planner: Arc<dyn PlanningService>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn content(mut self, content: Arc<dyn ContentService>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn reviewer(mut self, reviewer: Arc<dyn ReviewService>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn advisor(mut self, advisor: Arc<dyn CommandAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn sandbox(mut self, sandbox: Arc<dyn SandboxService>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn build(self) -> Result<GenerationAgent> {
        let planner = self.planner.ok_or_else(|| anyhow!("planner is required"))?;
        let content = self.content.ok_or_else(|| anyhow!("content service is required"))?;
        let reviewer = self.reviewer.ok_or_else(|| anyhow!("reviewer is required"))?;
        let advisor = self.advisor.ok_or_else(|| anyhow!("command advisor is required"))?;
        let sandbox = self.sandbox.ok_or_else(|| anyhow!("sandbox is required"))?;
        let events = self.events.unwrap_or_default();

        let deployer = DeploymentManager::new(
            Arc::clone(&self.store),
            Arc::clone(&sandbox),
            events.clone(),
            &self.toml,
        );
        let commands = Arc::new(CommandExecutor::new(
            Arc::clone(&self.store),
            Arc::clone(&sandbox),
            advisor,
            events.clone(),
            self.toml.commands.clone(),
        ));
        let orchestrator = Arc::new(PhaseOrchestrator::new(
            Arc::clone(&self.store),
            Collaborators {
                planner,
                content,
                reviewer,
                sandbox,
            },
            deployer.clone(),
            commands,
            events.clone(),
            self.toml.generation.clone(),
        ));

        Ok(GenerationAgent {
            orchestrator,
            store: self.store,
            deployer,
            events,
            recharge_floor: self.toml.generation.recharge_floor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        FakeContent, FakeReviewer, FakeSandbox, ScriptedAdvisor, ScriptedPlanner, memory_store,
        phase, test_toml,
    };

    fn agent(store: Arc<StateStore>, planner: Arc<ScriptedPlanner>) -> GenerationAgent {
        GenerationAgent::builder(store, test_toml())
            .planner(planner)
            .content(Arc::new(FakeContent::default()))
            .reviewer(Arc::new(FakeReviewer::default()))
            .advisor(Arc::new(ScriptedAdvisor::default()))
            .sandbox(Arc::new(FakeSandbox::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_collaborators() {
        let result = GenerationAgent::builder(memory_store(3), test_toml())
            .planner(Arc::new(ScriptedPlanner::default()))
            .build();
        let err = result.err().unwrap();
        assert!(err.to_string().contains("content service is required"));
    }

    #[tokio::test]
    async fn test_start_runs_to_idle() {
        let store = memory_store(12);
        let agent = agent(store.clone(), Arc::new(ScriptedPlanner::new(vec![phase("A", &["a.ts"])])));
        let mut rx = agent.subscribe();

        let outcome = agent.start().await.unwrap().unwrap();

        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        let state = agent.get_state();
        assert!(state.mvp_completed);
        assert_eq!(state.current_state, DevState::Idle);
        assert!(!state.should_be_generating);

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(kinds.first(), Some(&"GenerationStarted"));
        assert_eq!(kinds.last(), Some(&"GenerationCompleted"));
        agent.shutdown();
    }

    #[tokio::test]
    async fn test_stop_right_after_start_is_honoured() {
        let store = memory_store(12);
        let planner = Arc::new(ScriptedPlanner::new(vec![
            phase("A", &["a.ts"]),
            phase("B", &["b.ts"]),
        ]));
        let agent = agent(store.clone(), planner.clone());

        let handle = agent.start();
        agent.stop();
        let outcome = handle.await.unwrap().unwrap();

        assert_eq!(outcome, RunOutcome::Stopped);
        assert_eq!(planner.calls(), 0);
        let state = agent.get_state();
        assert!(state.phases.is_empty());
        assert!(!state.should_be_generating);
        assert!(!agent.is_generating());
    }

    #[tokio::test]
    async fn test_stop_while_idle_does_not_cancel_next_start() {
        let store = memory_store(12);
        let agent = agent(
            store.clone(),
            Arc::new(ScriptedPlanner::new(vec![phase("A", &["a.ts"])])),
        );

        agent.stop();
        let outcome = agent.start().await.unwrap().unwrap();

        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert!(agent.get_state().mvp_completed);
        agent.shutdown();
    }

    #[tokio::test]
    async fn test_submit_input_recharges_and_notifies() {
        let store = memory_store(0);
        let agent = agent(store.clone(), Arc::new(ScriptedPlanner::default()));
        let mut rx = agent.subscribe();

        assert_eq!(agent.submit_input("  add a footer ").unwrap(), 1);

        let state = agent.get_state();
        assert_eq!(state.pending_inputs, vec!["add a footer".to_string()]);
        assert_eq!(state.phase_budget, test_toml().generation.recharge_floor);
        assert_eq!(
            rx.try_recv().unwrap(),
            GenerationEvent::InputQueued {
                text: "add a footer".into(),
                pending: 1
            }
        );
    }

    #[tokio::test]
    async fn test_resume_only_when_interrupted() {
        let store = memory_store(12);
        store
            .update(|s| {
                s.mvp_completed = true;
                s.review_started = true;
            })
            .unwrap();
        let agent = agent(store.clone(), Arc::new(ScriptedPlanner::default()));
        assert!(agent.resume().is_none());

        store
            .update(|s| s.should_be_generating = true)
            .unwrap();
        let handle = agent.resume().unwrap();
        // Finished project with nothing queued: the resumed run is a no-op
        assert_eq!(handle.await.unwrap().unwrap(), RunOutcome::NothingToDo);
    }
}
