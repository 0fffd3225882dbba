//! Claude CLI backed collaborators.
//!
//! One `ClaudeServices` value implements planning, content, review and
//! command advice by running `claude --print` with a role-specific prompt on
//! stdin and decoding the JSON object in the reply.

pub mod parse;
pub mod prompts;

use anyhow::Context;
use async_trait::async_trait;
use phaseforge_common::{
    CommandAdvisor, CommandResult, ContentService, GeneratedFile, Issue, PhaseDescriptor,
    PhaseOutput, PlanningService, ReviewService, ReviewVerdict, ServiceError,
};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::Config;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Output fragments that mean the account is out of quota.
const QUOTA_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "usage limit",
    "quota",
    "too many requests",
    "credit balance is too low",
];

pub fn is_quota_message(text: &str) -> bool {
    let lower = text.to_lowercase();
    QUOTA_MARKERS.iter().any(|m| lower.contains(m))
}

#[derive(Debug, Clone)]
pub struct ClaudeServices {
    claude_cmd: String,
    project_name: String,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ClaudeServices {
    pub fn new(claude_cmd: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            claude_cmd: claude_cmd.into(),
            project_name: project_name.into(),
            working_dir: None,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.toml.claude_cmd(), &config.project_name)
            .with_working_dir(config.project_dir.clone())
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run Claude once and return stdout.
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn call(&self, role: &str, prompt: &str) -> Result<String, ServiceError> {
        let mut cmd = Command::new(&self.claude_cmd);
        cmd.arg("--print").arg("--output-format").arg("text");
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'. Is it in your PATH?", self.claude_cmd))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt to stdin")?;
            stdin.shutdown().await.context("Failed to close stdin")?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| format!("Claude {} call timed out", role))?
            .context("Failed to wait for Claude process")?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            if is_quota_message(&stderr) || is_quota_message(&stdout) {
                return Err(ServiceError::QuotaExceeded(first_line(&stderr, &stdout)));
            }
            return Err(anyhow::anyhow!(
                "Claude {} call exited with code {}: {}",
                role,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )
            .into());
        }
        if stdout.trim().is_empty() && is_quota_message(&stderr) {
            return Err(ServiceError::QuotaExceeded(first_line(&stderr, &stdout)));
        }

        debug!(role, bytes = stdout.len(), "Claude replied");
        Ok(stdout)
    }
}

fn first_line(stderr: &str, stdout: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    source.lines().next().unwrap_or("").trim().to_string()
}

#[async_trait]
impl PlanningService for ClaudeServices {
    async fn next_phase(
        &self,
        issues: &[Issue],
        pending_inputs: &[String],
    ) -> Result<Option<PhaseDescriptor>, ServiceError> {
        let prompt = prompts::plan_prompt(&self.project_name, issues, pending_inputs);
        let reply = self.call("planning", &prompt).await?;
        Ok(parse::parse_plan(&reply)?)
    }
}

#[async_trait]
impl ContentService for ClaudeServices {
    async fn implement(
        &self,
        phase: &PhaseDescriptor,
        issues: &[Issue],
    ) -> Result<PhaseOutput, ServiceError> {
        let prompt = prompts::implement_prompt(&self.project_name, phase, issues);
        let reply = self.call("implementation", &prompt).await?;
        Ok(parse::parse_implementation(&reply)?)
    }

    async fn regenerate_file(
        &self,
        file: &GeneratedFile,
        issues: &[String],
    ) -> Result<GeneratedFile, ServiceError> {
        let prompt = prompts::regenerate_prompt(file, issues);
        let reply = self.call("regeneration", &prompt).await?;
        Ok(parse::parse_file(&reply, &file.path)?)
    }
}

#[async_trait]
impl ReviewService for ClaudeServices {
    async fn review(
        &self,
        issues: &[Issue],
        files: &[GeneratedFile],
    ) -> Result<ReviewVerdict, ServiceError> {
        let prompt = prompts::review_prompt(issues, files);
        let reply = self.call("review", &prompt).await?;
        Ok(parse::parse_review(&reply)?)
    }
}

#[async_trait]
impl CommandAdvisor for ClaudeServices {
    async fn suggest_alternatives(
        &self,
        failed: &[CommandResult],
    ) -> Result<Vec<String>, ServiceError> {
        let prompt = prompts::alternatives_prompt(failed);
        let reply = self.call("command advice", &prompt).await?;
        Ok(parse::parse_alternatives(&reply)?)
    }
}
