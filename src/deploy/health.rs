//! Periodic liveness probe for the current sandbox instance.
//!
//! The monitor owns at most one probe task. Starting it for a new instance
//! aborts the previous task under the same lock that installs the new one,
//! so an instance change can never leave two probes running.

use async_trait::async_trait;
use phaseforge_common::{GenerationEvent, SandboxService};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::Broadcaster;

/// What the monitor calls back into when a probe fails.
#[async_trait]
pub trait RedeployTarget: Send + Sync {
    /// Ticks are skipped while this is true.
    fn deployment_in_flight(&self) -> bool;

    async fn redeploy(&self, reason: String);
}

struct Watch {
    instance_id: String,
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct HealthMonitor {
    sandbox: Arc<dyn SandboxService>,
    events: Broadcaster,
    interval: Duration,
    current: Arc<Mutex<Option<Watch>>>,
    generation: AtomicU64,
}

impl HealthMonitor {
    pub fn new(sandbox: Arc<dyn SandboxService>, events: Broadcaster, interval: Duration) -> Self {
        Self {
            sandbox,
            events,
            interval,
            current: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Watch `instance_id`, replacing whatever was watched before.
    pub fn start(&self, instance_id: &str, target: Arc<dyn RedeployTarget>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = current.take() {
            debug!(instance = %previous.instance_id, "Stopping previous health monitor");
            previous.handle.abort();
        }

        let handle = tokio::spawn(probe_loop(
            ProbeContext {
                sandbox: Arc::clone(&self.sandbox),
                events: self.events.clone(),
                interval: self.interval,
                current: Arc::clone(&self.current),
                instance_id: instance_id.to_string(),
                generation,
            },
            target,
        ));

        info!(instance = instance_id, interval_secs = self.interval.as_secs(), "Health monitor started");
        *current = Some(Watch {
            instance_id: instance_id.to_string(),
            generation,
            handle,
        });
    }

    pub fn stop(&self) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = current.take() {
            debug!(instance = %previous.instance_id, "Health monitor stopped");
            previous.handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.current
            .lock()
            .map(|c| c.as_ref().is_some_and(|w| !w.handle.is_finished()))
            .unwrap_or(false)
    }

    pub fn watched_instance(&self) -> Option<String> {
        self.current
            .lock()
            .ok()
            .and_then(|c| c.as_ref().map(|w| w.instance_id.clone()))
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ProbeContext {
    sandbox: Arc<dyn SandboxService>,
    events: Broadcaster,
    interval: Duration,
    current: Arc<Mutex<Option<Watch>>>,
    instance_id: String,
    generation: u64,
}

impl ProbeContext {
    /// Clear our own slot without aborting the running task.
    fn release(&self) {
        if let Ok(mut current) = self.current.lock() {
            if current
                .as_ref()
                .is_some_and(|w| w.generation == self.generation)
            {
                *current = None;
            }
        }
    }
}

async fn probe_loop(ctx: ProbeContext, target: Arc<dyn RedeployTarget>) {
    let mut ticker = tokio::time::interval(ctx.interval);
    // First tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if target.deployment_in_flight() {
            debug!(instance = %ctx.instance_id, "Deployment in flight; skipping health check");
            continue;
        }

        let reason = match ctx.sandbox.get_status(&ctx.instance_id).await {
            Ok(status) if status.healthy => continue,
            Ok(_) => "instance reported unhealthy".to_string(),
            Err(e) => e.to_string(),
        };

        warn!(instance = %ctx.instance_id, %reason, "Health check failed; redeploying");
        ctx.release();
        ctx.events.publish(GenerationEvent::HealthCheckFailed {
            instance_id: ctx.instance_id.clone(),
            reason: reason.clone(),
        });
        target.redeploy(reason).await;
        return;
    }
}
