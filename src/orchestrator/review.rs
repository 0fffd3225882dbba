use chrono::Utc;
use futures::future::join_all;
use phaseforge_common::{DevState, GeneratedFile, GenerationEvent};
use tracing::{info, warn};

use super::machine::PhaseOrchestrator;
use crate::errors::GenerationError;
use crate::state::save_files;

impl PhaseOrchestrator {
    /// Up to `review_cycles` passes of review, concurrent regeneration of
    /// flagged files, and a single redeploy per pass.
    pub(super) async fn review(&self) -> Result<DevState, GenerationError> {
        if self.store.snapshot().review_started {
            info!("Review already ran for this project; skipping");
            return Ok(self.after_review());
        }
        self.store.update(|s| s.review_started = true)?;

        for pass in 1..=self.settings.review_cycles {
            if self.stopping() {
                return Ok(DevState::Reviewing);
            }
            let state = self.store.snapshot();
            if !state.pending_inputs.is_empty() {
                info!("New input arrived during review");
                return Ok(DevState::Planning);
            }

            self.events.publish(GenerationEvent::ReviewStarted { pass });
            let issues = self.collect_issues(&state).await;
            let verdict = self
                .collaborators
                .reviewer
                .review(&issues, &state.all_files())
                .await
                .map_err(GenerationError::review)?;

            if verdict.is_clean() {
                info!(pass, "Review found nothing to fix");
                self.events.publish(GenerationEvent::ReviewCompleted {
                    pass,
                    files_fixed: 0,
                });
                break;
            }

            let targets: Vec<(GeneratedFile, &[String])> = verdict
                .files_to_fix
                .iter()
                .filter_map(|fix| match state.file_states.get(&fix.path) {
                    Some(file) => Some((
                        GeneratedFile::new(&fix.path, &file.content),
                        fix.issues.as_slice(),
                    )),
                    None => {
                        warn!(path = %fix.path, "Review flagged an unknown file; skipping");
                        None
                    }
                })
                .collect();

            let content = &self.collaborators.content;
            let results = join_all(
                targets
                    .iter()
                    .map(|(file, issues)| content.regenerate_file(file, issues)),
            )
            .await;

            if self.stopping() {
                return Ok(DevState::Reviewing);
            }

            let mut fixed = Vec::new();
            for ((file, _), result) in targets.iter().zip(results) {
                match result {
                    Ok(regenerated) => fixed.push(regenerated),
                    Err(e) if e.is_quota_exceeded() => return Err(GenerationError::review(e)),
                    Err(e) => warn!(path = %file.path, "Regeneration failed: {}", e),
                }
            }

            if !fixed.is_empty() {
                let changed = self
                    .store
                    .update(|s| save_files(s, &fixed, Utc::now()))?;
                self.events.publish(GenerationEvent::FilesSaved { paths: changed });

                let label = format!("review pass {}", pass);
                if let Err(e) = self.deployer.deploy(fixed.clone(), false, &label).await {
                    warn!(pass, "Redeploy after review failed: {}", e);
                }
            }
            if !verdict.commands.is_empty() {
                self.commands.execute(&verdict.commands, true, None).await;
            }

            info!(pass, files_fixed = fixed.len(), "Review pass complete");
            self.events.publish(GenerationEvent::ReviewCompleted {
                pass,
                files_fixed: fixed.len(),
            });
        }

        Ok(self.after_review())
    }

    fn after_review(&self) -> DevState {
        if self.store.snapshot().pending_inputs.is_empty() {
            DevState::Idle
        } else {
            DevState::Planning
        }
    }
}
