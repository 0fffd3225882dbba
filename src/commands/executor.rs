use phaseforge_common::{CommandAdvisor, CommandResult, GenerationEvent, SandboxService};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::sanitize::{is_install_command, sanitize_commands};
use crate::config::CommandsSection;
use crate::events::Broadcaster;
use crate::state::{self, StateStore};

/// What happened to a batch, for callers that want more than the events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

/// Runs setup commands against the current sandbox instance.
///
/// Commands are best-effort: failures are published and logged, never
/// returned. Each chunk runs to completion before the next one starts.
pub struct CommandExecutor {
    store: Arc<StateStore>,
    sandbox: Arc<dyn SandboxService>,
    advisor: Arc<dyn CommandAdvisor>,
    events: Broadcaster,
    settings: CommandsSection,
}

impl CommandExecutor {
    pub fn new(
        store: Arc<StateStore>,
        sandbox: Arc<dyn SandboxService>,
        advisor: Arc<dyn CommandAdvisor>,
        events: Broadcaster,
        settings: CommandsSection,
    ) -> Self {
        Self {
            store,
            sandbox,
            advisor,
            events,
            settings,
        }
    }

    #[instrument(skip(self, commands), fields(count = commands.len()))]
    pub async fn execute(
        &self,
        commands: &[String],
        allow_retry: bool,
        chunk_size: Option<usize>,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let commands = sanitize_commands(commands);
        if commands.is_empty() {
            return report;
        }

        let Some(instance_id) = self.store.snapshot().sandbox_instance_id else {
            warn!("No sandbox instance; skipping {} command(s)", commands.len());
            self.events.publish(GenerationEvent::CommandsFailed {
                commands: commands.clone(),
                error: "no sandbox instance".to_string(),
            });
            report.failed = commands;
            return report;
        };

        let chunk_size = chunk_size.unwrap_or(self.settings.chunk_size).max(1);
        let max_attempts = if allow_retry {
            self.settings.max_attempts.max(1)
        } else {
            1
        };

        for chunk in commands.chunks(chunk_size) {
            let outcome = self
                .run_chunk(&instance_id, chunk.to_vec(), max_attempts)
                .await;
            report.succeeded.extend(outcome.succeeded);
            report.failed.extend(outcome.failed);
        }

        info!(
            "Commands finished: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }

    async fn run_chunk(
        &self,
        instance_id: &str,
        mut pending: Vec<String>,
        max_attempts: u32,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for attempt in 1..=max_attempts {
            self.events.publish(GenerationEvent::CommandsExecuting {
                commands: pending.clone(),
            });

            let results = match self.sandbox.execute_commands(instance_id, &pending).await {
                Ok(results) => results,
                Err(e) => {
                    warn!("Command batch failed remotely: {}", e);
                    failed_results(&pending, &e.to_string())
                }
            };

            let (ok, failed): (Vec<CommandResult>, Vec<CommandResult>) =
                results.into_iter().partition(|r| r.success);
            let succeeded: Vec<String> = ok.into_iter().map(|r| r.command).collect();

            // Successes count even if a later attempt or chunk fails.
            if let Err(e) = state::record_commands(&self.store, &succeeded) {
                warn!("Failed to record command history: {}", e);
            }
            self.events.publish(GenerationEvent::CommandsExecuted {
                succeeded: succeeded.clone(),
                failed: failed.iter().map(|r| r.command.clone()).collect(),
            });
            report.succeeded.extend(succeeded);

            // Only installs have alternatives; anything else fails for good.
            let (installs, others): (Vec<CommandResult>, Vec<CommandResult>) = failed
                .into_iter()
                .partition(|r| is_install_command(&r.command));
            report.failed.extend(others.into_iter().map(|r| r.command));

            if installs.is_empty() {
                break;
            }
            if attempt == max_attempts {
                report.failed.extend(installs.into_iter().map(|r| r.command));
                break;
            }

            match self.advisor.suggest_alternatives(&installs).await {
                Ok(alternatives) => {
                    let alternatives = sanitize_commands(&alternatives);
                    if alternatives.is_empty() {
                        report.failed.extend(installs.into_iter().map(|r| r.command));
                        break;
                    }
                    debug!(attempt, ?alternatives, "Retrying with alternative commands");
                    pending = alternatives;
                }
                Err(e) => {
                    warn!("Could not get alternative commands: {}", e);
                    report.failed.extend(installs.into_iter().map(|r| r.command));
                    break;
                }
            }
        }

        if !report.failed.is_empty() {
            self.events.publish(GenerationEvent::CommandsFailed {
                commands: report.failed.clone(),
                error: format!("{} command(s) failed after retries", report.failed.len()),
            });
        }
        report
    }
}

fn failed_results(commands: &[String], error: &str) -> Vec<CommandResult> {
    commands
        .iter()
        .map(|c| CommandResult {
            command: c.clone(),
            success: false,
            output: error.to_string(),
            exit_code: None,
        })
        .collect()
}
