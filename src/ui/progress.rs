use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use phaseforge_common::GenerationEvent;
use std::time::Duration;

use crate::ui::icons::{
    CHECK, CLOCK, CROSS, FILE, INBOX, PLAN, RETRY, REVIEW, ROCKET, SPARKLE, TERMINAL,
};

/// Terminal UI for a generation run, rendered via `indicatif`.
///
/// Two bars are stacked vertically:
/// - Phase bar, sized by the phase budget at run start
/// - Step spinner with the machine's current activity
///
/// Every event with a one-line description is also printed above the bars.
pub struct RunUI {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    step_bar: ProgressBar,
    verbose: bool,
}

impl RunUI {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let phase_bar = multi.add(ProgressBar::new(0));
        if let Ok(phase_style) = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            phase_bar.set_style(phase_style.progress_chars("█▓▒░"));
        }
        phase_bar.set_prefix("Phases");

        let step_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(step_style) =
            ProgressStyle::default_spinner().template("{prefix:.bold.dim} {spinner} {msg}")
        {
            step_bar.set_style(step_style);
        }
        step_bar.set_prefix("  Step");
        step_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            phase_bar,
            step_bar,
            verbose,
        }
    }

    /// Print a line above the bars, falling back to stderr.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn handle(&self, event: &GenerationEvent) {
        match event {
            GenerationEvent::GenerationStarted { phase_budget } => {
                self.phase_bar.set_length(u64::from(*phase_budget));
                self.phase_bar.set_position(0);
            }
            GenerationEvent::StateChanged { to, .. } => {
                self.step_bar
                    .set_message(format!("{}", style(to).cyan()));
            }
            GenerationEvent::PhaseImplementing { name } => {
                self.phase_bar.set_message(style(name).yellow().to_string());
                self.step_bar.set_message("implementing");
            }
            GenerationEvent::PhaseCompleted { .. } => self.phase_bar.inc(1),
            GenerationEvent::DeploymentStarted { label, .. } => {
                self.step_bar.set_message(format!("deploying ({})", label));
            }
            GenerationEvent::CommandsExecuting { commands } => {
                self.step_bar
                    .set_message(format!("running {} command(s)", commands.len()));
            }
            GenerationEvent::ReviewStarted { pass } => {
                self.step_bar.set_message(format!("review pass {}", pass));
            }
            _ => {}
        }

        if let Some(line) = describe(event) {
            self.print_line(line);
        } else if self.verbose {
            self.print_line(format!(
                "    {} {}",
                style("→").dim(),
                style(event.kind()).dim()
            ));
        }
    }

    pub fn finish(&self) {
        self.step_bar.finish_and_clear();
        self.phase_bar.finish();
    }
}

/// One-line description of the events worth showing to a user.
pub fn describe(event: &GenerationEvent) -> Option<String> {
    let line = match event {
        GenerationEvent::GenerationStarted { phase_budget } => {
            format!("{}Generation started (budget: {} phases)", SPARKLE, phase_budget)
        }
        GenerationEvent::GenerationCompleted {
            phases_completed,
            error: None,
        } => format!("{}Run finished: {} phase(s) completed", CHECK, phases_completed),
        GenerationEvent::GenerationCompleted {
            phases_completed,
            error: Some(error),
        } => format!(
            "{}Run ended after {} phase(s): {}",
            CROSS,
            phases_completed,
            style(error).red()
        ),
        GenerationEvent::StopRequested => {
            format!("{}Stop requested; finishing the current step", CLOCK)
        }
        GenerationEvent::InputQueued { text, pending } => {
            format!("{}Queued input ({} pending): {}", INBOX, pending, text)
        }
        GenerationEvent::PhasePlanned { name, files, .. } => format!(
            "{}Planned {} ({} file(s))",
            PLAN,
            style(name).bold(),
            files.len()
        ),
        GenerationEvent::PhaseCompleted {
            name,
            remaining_budget,
        } => format!(
            "{}Completed {} ({} left in budget)",
            CHECK,
            style(name).bold(),
            remaining_budget
        ),
        GenerationEvent::FilesSaved { paths } if !paths.is_empty() => {
            format!("{}Saved {}", FILE, paths.join(", "))
        }
        GenerationEvent::DeploymentCompleted {
            preview_url,
            fresh_instance,
            ..
        } => {
            let kind = if *fresh_instance { "new instance" } else { "updated" };
            format!("{}Preview {}: {}", ROCKET, kind, style(preview_url).underlined())
        }
        GenerationEvent::DeploymentRetry {
            attempt,
            delay_ms,
            error,
        } => format!(
            "{}Deploy attempt {} failed ({}); retrying in {}ms",
            RETRY, attempt, error, delay_ms
        ),
        GenerationEvent::DeploymentTimeout {
            label,
            timeout_secs,
        } => format!("{}Deployment '{}' timed out after {}s", CLOCK, label, timeout_secs),
        GenerationEvent::DeploymentFailed { label, error } => format!(
            "{}Deployment '{}' failed: {}",
            CROSS,
            label,
            style(error).red()
        ),
        GenerationEvent::HealthCheckFailed {
            instance_id,
            reason,
        } => format!(
            "{}Instance {} unhealthy ({}); redeploying",
            CROSS, instance_id, reason
        ),
        GenerationEvent::CommandsExecuted { succeeded, failed } => format!(
            "{}Commands: {} succeeded, {} failed",
            TERMINAL,
            succeeded.len(),
            failed.len()
        ),
        GenerationEvent::CommandsFailed { commands, error } => format!(
            "{}Could not run {} command(s): {}",
            CROSS,
            commands.len(),
            error
        ),
        GenerationEvent::ReviewCompleted { pass, files_fixed } => format!(
            "{}Review pass {}: {} file(s) fixed",
            REVIEW, pass, files_fixed
        ),
        GenerationEvent::Error { message } => {
            format!("{}{}", CROSS, style(message).red())
        }
        _ => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_deployment_completed() {
        let line = describe(&GenerationEvent::DeploymentCompleted {
            instance_id: "inst-1".into(),
            preview_url: "https://demo.preview.dev".into(),
            fresh_instance: true,
        })
        .unwrap();
        assert!(line.contains("new instance"));
        assert!(line.contains("https://demo.preview.dev"));
    }

    #[test]
    fn test_describe_run_error() {
        let line = describe(&GenerationEvent::GenerationCompleted {
            phases_completed: 2,
            error: Some("Quota exceeded: rate limit".into()),
        })
        .unwrap();
        assert!(line.contains("after 2 phase(s)"));
        assert!(line.contains("Quota exceeded"));
    }

    #[test]
    fn test_describe_skips_noise() {
        assert!(describe(&GenerationEvent::PhaseImplementing { name: "x".into() }).is_none());
        assert!(describe(&GenerationEvent::FilesSaved { paths: vec![] }).is_none());
    }
}
