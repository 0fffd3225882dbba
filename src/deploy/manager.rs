use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use phaseforge_common::{GeneratedFile, GenerationEvent, SandboxService};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, instrument, warn};

use super::health::{HealthMonitor, RedeployTarget};
use super::retry::{backoff_delay, requires_session_reset};
use crate::commands::collapse_history;
use crate::config::{DeploySection, PhaseforgeToml};
use crate::errors::DeploymentError;
use crate::events::Broadcaster;
use crate::state::{self, StateStore};

/// Where a deployment landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewHandle {
    pub instance_id: String,
    pub preview_url: String,
    /// True when this deployment created the instance.
    pub fresh_instance: bool,
}

pub type DeployResult = Result<Option<PreviewHandle>, DeploymentError>;

type SharedDeploy = Shared<BoxFuture<'static, DeployResult>>;

#[derive(Clone)]
struct InFlight {
    id: u64,
    future: SharedDeploy,
    /// Files the deployment was started with.
    files: Arc<[GeneratedFile]>,
}

struct Inner {
    store: Arc<StateStore>,
    sandbox: Arc<dyn SandboxService>,
    events: Broadcaster,
    settings: DeploySection,
    template: String,
    health: HealthMonitor,
    in_flight: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
}

/// Pushes files to the sandbox with at most one deployment in flight.
///
/// Callers arriving while a deployment runs await that deployment's outcome
/// instead of starting their own; only if it failed do they start a fresh
/// one. A joiner whose files were not part of that deployment writes them to
/// the resulting instance afterwards. The deployment itself runs as a spawned task, so it finishes (and
/// clears the in-flight slot) even if every caller goes away.
#[derive(Clone)]
pub struct DeploymentManager {
    inner: Arc<Inner>,
}

impl DeploymentManager {
    pub fn new(
        store: Arc<StateStore>,
        sandbox: Arc<dyn SandboxService>,
        events: Broadcaster,
        toml: &PhaseforgeToml,
    ) -> Self {
        let health = HealthMonitor::new(
            Arc::clone(&sandbox),
            events.clone(),
            toml.health.interval(),
        );
        Self {
            inner: Arc::new(Inner {
                store,
                sandbox,
                events,
                settings: toml.deploy.clone(),
                template: toml.project.template.clone(),
                health,
                in_flight: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Deploy `files`, joining any deployment already in flight.
    ///
    /// Returns `Ok(None)` when there is nothing to push (no files and no
    /// forced redeploy).
    pub async fn deploy(
        &self,
        files: Vec<GeneratedFile>,
        force_redeploy: bool,
        label: &str,
    ) -> DeployResult {
        if files.is_empty() && !force_redeploy {
            debug!(label, "Nothing to deploy");
            return Ok(None);
        }

        if let Some(running) = self.current() {
            debug!(label, joined = running.id, "Joining in-flight deployment");
            match running.future.await {
                Ok(Some(handle)) => {
                    let missed = missed_files(&files, &running.files);
                    if missed.is_empty() {
                        return Ok(Some(handle));
                    }
                    debug!(
                        label,
                        count = missed.len(),
                        "Writing files the joined deployment lacked"
                    );
                    match self
                        .inner
                        .sandbox
                        .write_files(&handle.instance_id, &missed)
                        .await
                    {
                        Ok(()) => return Ok(Some(handle)),
                        Err(e) => warn!(
                            label,
                            "Follow-up write failed ({}); starting a new deployment", e
                        ),
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(label, "Joined deployment failed ({}); starting a new one", e),
            }
        }

        self.start_or_join(files, force_redeploy, label).await
    }

    pub fn is_deploying(&self) -> bool {
        self.inner.is_deploying()
    }

    /// Instance currently watched by the health monitor.
    pub fn monitored_instance(&self) -> Option<String> {
        self.inner.health.watched_instance()
    }

    pub fn shutdown(&self) {
        self.inner.health.stop();
    }

    fn current(&self) -> Option<InFlight> {
        self.inner
            .in_flight
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
    }

    /// Install a new deployment unless another caller got there first.
    fn start_or_join(
        &self,
        files: Vec<GeneratedFile>,
        force_redeploy: bool,
        label: &str,
    ) -> SharedDeploy {
        let mut slot = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = slot.as_ref() {
            return existing.future.clone();
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let carried: Arc<[GeneratedFile]> = files.clone().into();
        let inner = Arc::clone(&self.inner);
        let label = label.to_string();
        let task = tokio::spawn(async move {
            let result = inner.run(files, force_redeploy, &label).await;
            inner.clear_in_flight(id);
            result
        });

        let future = task
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(DeploymentError::Aborted(e.to_string())),
            })
            .boxed()
            .shared();
        *slot = Some(InFlight {
            id,
            future: future.clone(),
            files: carried,
        });
        future
    }
}

impl Inner {
    fn is_deploying(&self) -> bool {
        self.in_flight.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn clear_in_flight(&self, id: u64) {
        if let Ok(mut slot) = self.in_flight.lock() {
            if slot.as_ref().is_some_and(|f| f.id == id) {
                *slot = None;
            }
        }
    }

    /// All attempts of one deployment, with timeout and backoff.
    #[instrument(skip(self, files), fields(files = files.len()))]
    async fn run(
        self: &Arc<Self>,
        files: Vec<GeneratedFile>,
        force_redeploy: bool,
        label: &str,
    ) -> DeployResult {
        self.events.publish(GenerationEvent::DeploymentStarted {
            label: label.to_string(),
            files: files.len(),
            force_redeploy,
        });

        let max_retries = self.settings.max_retries;
        let mut retries_left = max_retries;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let attempt = self.attempt(&files, force_redeploy);
            let outcome = match tokio::time::timeout(self.settings.timeout(), attempt).await {
                Ok(outcome) => outcome,
                Err(_) => Err(self.on_timeout(label)),
            };

            let error = match outcome {
                Ok(handle) => {
                    info!(label, instance = %handle.instance_id, "Deployment completed");
                    self.events.publish(GenerationEvent::DeploymentCompleted {
                        instance_id: handle.instance_id.clone(),
                        preview_url: handle.preview_url.clone(),
                        fresh_instance: handle.fresh_instance,
                    });
                    return Ok(Some(handle));
                }
                Err(e) => e,
            };

            if retries_left == 0 {
                warn!(label, attempts, "Deployment failed: {}", error);
                self.health.stop();
                if let Err(e) = state::invalidate_instance(&self.store) {
                    warn!("Failed to clear instance after deployment failure: {}", e);
                }
                self.events.publish(GenerationEvent::DeploymentFailed {
                    label: label.to_string(),
                    error: error.to_string(),
                });
                return Err(DeploymentError::RetriesExhausted {
                    attempts,
                    last_error: error.to_string(),
                });
            }

            if requires_session_reset(&error.to_string()) {
                info!(label, "Connection-class failure; resetting sandbox session");
                if let Err(e) = state::reset_session(&self.store) {
                    warn!("Failed to reset sandbox session: {}", e);
                }
            }

            let delay = backoff_delay(max_retries, retries_left, self.settings.backoff_base());
            warn!(
                label,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "Deployment attempt failed: {}",
                error
            );
            self.events.publish(GenerationEvent::DeploymentRetry {
                attempt: attempts,
                delay_ms: delay.as_millis() as u64,
                error: error.to_string(),
            });
            tokio::time::sleep(delay).await;
            retries_left -= 1;
        }
    }

    /// The attempt future has already been dropped; the old instance is
    /// presumed wedged.
    fn on_timeout(&self, label: &str) -> DeploymentError {
        warn!(label, secs = self.settings.timeout_secs, "Deployment timed out");
        self.health.stop();
        if let Err(e) = state::reset_session(&self.store) {
            warn!("Failed to reset sandbox session after timeout: {}", e);
        }
        self.events.publish(GenerationEvent::DeploymentTimeout {
            label: label.to_string(),
            timeout_secs: self.settings.timeout_secs,
        });
        DeploymentError::Timeout {
            label: label.to_string(),
            secs: self.settings.timeout_secs,
        }
    }

    async fn attempt(
        self: &Arc<Self>,
        files: &[GeneratedFile],
        force_redeploy: bool,
    ) -> Result<PreviewHandle, DeploymentError> {
        let preview = self.ensure_preview_exists(force_redeploy).await?;

        let to_write = if preview.fresh_instance {
            full_file_set(&self.store.snapshot().all_files(), files)
        } else {
            files.to_vec()
        };
        if !to_write.is_empty() {
            debug!(instance = %preview.instance_id, count = to_write.len(), "Writing files");
            self.sandbox
                .write_files(&preview.instance_id, &to_write)
                .await?;
        }
        Ok(preview)
    }

    /// Reuse the current instance if it answers healthy, else create one.
    async fn ensure_preview_exists(
        self: &Arc<Self>,
        force_redeploy: bool,
    ) -> Result<PreviewHandle, DeploymentError> {
        let state = self.store.snapshot();

        if !force_redeploy {
            if let Some(instance_id) = state.sandbox_instance_id.clone() {
                match self.sandbox.get_status(&instance_id).await {
                    Ok(status) if status.healthy => {
                        let preview_url = status
                            .preview_url
                            .or(state.preview_url.clone())
                            .unwrap_or_default();
                        return Ok(PreviewHandle {
                            instance_id,
                            preview_url,
                            fresh_instance: false,
                        });
                    }
                    Ok(_) => info!(instance = %instance_id, "Instance unhealthy; creating a new one"),
                    Err(e) => warn!(instance = %instance_id, "Instance probe failed: {}", e),
                }
            }
        }

        let session_id = match state.sandbox_session_id.clone() {
            Some(id) => id,
            None => state::reset_session(&self.store)?,
        };
        let nonce = uuid::Uuid::new_v4().to_string();
        let unique_name = instance_name(&state.project_name, &session_id, &nonce);

        let created = self
            .sandbox
            .create_instance(&session_id, &self.template, &unique_name)
            .await?;
        info!(instance = %created.instance_id, name = %unique_name, "Sandbox instance created");

        self.store.update(|s| {
            s.sandbox_instance_id = Some(created.instance_id.clone());
            s.preview_url = Some(created.preview_url.clone());
        })?;
        self.events.publish(GenerationEvent::InstanceCreated {
            instance_id: created.instance_id.clone(),
            preview_url: created.preview_url.clone(),
        });

        self.replay_history(&created.instance_id, &state.command_history)
            .await;

        let target: Arc<dyn RedeployTarget> = Arc::new(ManagerHandle(Arc::downgrade(self)));
        self.health.start(&created.instance_id, target);

        Ok(PreviewHandle {
            instance_id: created.instance_id,
            preview_url: created.preview_url,
            fresh_instance: true,
        })
    }

    /// Best-effort replay of setup commands on a fresh instance.
    async fn replay_history(&self, instance_id: &str, history: &[String]) {
        let commands = collapse_history(history, self.settings.history_replay_limit);
        if commands.is_empty() {
            return;
        }
        debug!(instance = instance_id, count = commands.len(), "Replaying command history");
        match self.sandbox.execute_commands(instance_id, &commands).await {
            Ok(results) => {
                let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();
                if !failed.is_empty() {
                    warn!("{} replayed command(s) failed", failed.len());
                }
            }
            Err(e) => warn!("Command history replay failed: {}", e),
        }
    }
}

/// Health-monitor callback into the manager, without keeping it alive.
struct ManagerHandle(Weak<Inner>);

#[async_trait]
impl RedeployTarget for ManagerHandle {
    fn deployment_in_flight(&self) -> bool {
        self.0.upgrade().is_some_and(|inner| inner.is_deploying())
    }

    async fn redeploy(&self, reason: String) {
        let Some(inner) = self.0.upgrade() else {
            return;
        };
        info!(%reason, "Redeploying after failed health check");
        let manager = DeploymentManager { inner };
        if let Err(e) = manager.deploy(Vec::new(), true, "health-check").await {
            warn!("Health-check redeploy failed: {}", e);
        }
    }
}

/// `<slug>-<12 hex>`: readable, and distinct per session and attempt.
pub fn instance_name(project_name: &str, session_id: &str, nonce: &str) -> String {
    let mut slug: String = project_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    slug.truncate(40);
    if slug.is_empty() {
        slug.push_str("project");
    }

    let mut hasher = Sha256::new();
    hasher.update(project_name.as_bytes());
    hasher.update(b"\0");
    hasher.update(session_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(nonce.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("{}-{}", slug.trim_end_matches('-'), &digest[..12])
}

/// Stored files overlaid with the caller's, one entry per path.
fn full_file_set(stored: &[GeneratedFile], incoming: &[GeneratedFile]) -> Vec<GeneratedFile> {
    let mut by_path: BTreeMap<&str, &GeneratedFile> = BTreeMap::new();
    for file in stored.iter().chain(incoming) {
        by_path.insert(file.path.as_str(), file);
    }
    by_path.into_values().cloned().collect()
}

fn missed_files(mine: &[GeneratedFile], carried: &[GeneratedFile]) -> Vec<GeneratedFile> {
    mine.iter()
        .filter(|file| !carried.contains(file))
        .cloned()
        .collect()
}
