//! Configuration for phaseforge.
//!
//! Settings live in `.phaseforge/phaseforge.toml` and are layered
//! file → environment → CLI:
//!
//! ```toml
//! [project]
//! name = "todo-app"
//! template = "vite-react"
//!
//! [generation]
//! max_phases = 12
//! recharge_floor = 3
//! review_cycles = 2
//!
//! [deploy]
//! timeout_secs = 60
//! max_retries = 3
//! backoff_base_ms = 1000
//! history_replay_limit = 10
//!
//! [health]
//! interval_secs = 30
//!
//! [commands]
//! chunk_size = 5
//! max_attempts = 3
//!
//! [sandbox]
//! base_url = "http://localhost:8787"
//! request_timeout_secs = 30
//!
//! [claude]
//! cmd = "claude"
//! ```
//!
//! `SANDBOX_API_TOKEN`, `SANDBOX_URL` and `CLAUDE_CMD` override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::init::{CONFIG_FILE, STATE_FILE, get_forge_dir};

/// Project identity section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project name (defaults to the directory name)
    #[serde(default)]
    pub name: Option<String>,
    /// Sandbox template new instances are created from
    #[serde(default = "default_template")]
    pub template: String,
}

fn default_template() -> String {
    "vite-react".to_string()
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: None,
            template: default_template(),
        }
    }
}

/// Phase loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSection {
    /// Phase budget a fresh project starts with
    #[serde(default = "default_max_phases")]
    pub max_phases: u32,
    /// Budget floor applied when follow-up input arrives
    #[serde(default = "default_recharge_floor")]
    pub recharge_floor: u32,
    /// Review passes after finalization
    #[serde(default = "default_review_cycles")]
    pub review_cycles: u32,
}

fn default_max_phases() -> u32 {
    phaseforge_common::DEFAULT_PHASE_BUDGET
}

fn default_recharge_floor() -> u32 {
    3
}

fn default_review_cycles() -> u32 {
    2
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            max_phases: default_max_phases(),
            recharge_floor: default_recharge_floor(),
            review_cycles: default_review_cycles(),
        }
    }
}

/// Deployment timeout and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySection {
    #[serde(default = "default_deploy_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Command history longer than this is collapsed before replay
    #[serde(default = "default_history_replay_limit")]
    pub history_replay_limit: usize,
}

fn default_deploy_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_history_replay_limit() -> usize {
    10
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            timeout_secs: default_deploy_timeout(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            history_replay_limit: default_history_replay_limit(),
        }
    }
}

impl DeploySection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSection {
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
}

fn default_health_interval() -> u64 {
    30
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
        }
    }
}

impl HealthSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Setup command batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsSection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_chunk_size() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Remote sandbox endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSection {
    #[serde(default = "default_sandbox_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_sandbox_url() -> String {
    "http://localhost:8787".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            base_url: default_sandbox_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaudeSection {
    /// Claude CLI command (default: "claude")
    #[serde(default)]
    pub cmd: Option<String>,
}

/// The full `phaseforge.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseforgeToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub deploy: DeploySection,
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub commands: CommandsSection,
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub claude: ClaudeSection,
}

impl PhaseforgeToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse phaseforge.toml")
    }

    /// Load from `<forge_dir>/phaseforge.toml`, or defaults if the file doesn't exist.
    pub fn load_or_default(forge_dir: &Path) -> Result<Self> {
        let config_path = forge_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize phaseforge.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Claude command, with fallback to the `CLAUDE_CMD` environment variable.
    pub fn claude_cmd(&self) -> String {
        std::env::var("CLAUDE_CMD")
            .ok()
            .or_else(|| self.claude.cmd.clone())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Sandbox base URL; `SANDBOX_URL` overrides the file.
    pub fn sandbox_url(&self) -> String {
        std::env::var("SANDBOX_URL").unwrap_or_else(|_| self.sandbox.base_url.clone())
    }

    /// Sandbox API token; `SANDBOX_API_TOKEN` overrides the file.
    pub fn sandbox_token(&self) -> Option<String> {
        std::env::var("SANDBOX_API_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.sandbox.api_token.clone().filter(|t| !t.is_empty()))
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.generation.max_phases == 0 {
            warnings.push("generation.max_phases is 0; no phase will ever be planned".to_string());
        }
        if self.generation.recharge_floor == 0 {
            warnings.push(
                "generation.recharge_floor is 0; follow-up input will not add budget".to_string(),
            );
        }
        if self.deploy.timeout_secs == 0 {
            warnings.push("deploy.timeout_secs is 0; every deployment will time out".to_string());
        }
        if self.deploy.max_retries > 8 {
            warnings.push(format!(
                "deploy.max_retries = {} makes the last backoff {}s",
                self.deploy.max_retries,
                (self.deploy.backoff_base_ms << self.deploy.max_retries.saturating_sub(1)) / 1000
            ));
        }
        if self.health.interval_secs == 0 {
            warnings.push("health.interval_secs must be at least 1".to_string());
        }
        if self.commands.chunk_size == 0 {
            warnings.push("commands.chunk_size is 0; the default of 5 will be used".to_string());
        }
        if self.commands.max_attempts == 0 {
            warnings.push("commands.max_attempts is 0; commands will run once".to_string());
        }
        if self.sandbox.base_url.trim().is_empty() {
            warnings.push("sandbox.base_url is empty".to_string());
        }

        warnings
    }
}

/// Runtime configuration: resolved paths plus the loaded TOML.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub forge_dir: PathBuf,
    pub state_file: PathBuf,
    pub log_dir: PathBuf,
    pub project_name: String,
    pub verbose: bool,
    pub toml: PhaseforgeToml,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let forge_dir = get_forge_dir(&project_dir);
        let toml = PhaseforgeToml::load_or_default(&forge_dir)?;

        let project_name = toml
            .project
            .name
            .clone()
            .or_else(|| {
                project_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "project".to_string());

        Ok(Self {
            state_file: forge_dir.join(STATE_FILE),
            log_dir: forge_dir.join("logs"),
            forge_dir,
            project_dir,
            project_name,
            verbose,
            toml,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_documented_values() {
        let toml = PhaseforgeToml::default();
        assert_eq!(toml.generation.max_phases, 12);
        assert_eq!(toml.generation.recharge_floor, 3);
        assert_eq!(toml.generation.review_cycles, 2);
        assert_eq!(toml.deploy.timeout_secs, 60);
        assert_eq!(toml.deploy.max_retries, 3);
        assert_eq!(toml.deploy.backoff_base(), Duration::from_millis(1000));
        assert_eq!(toml.commands.chunk_size, 5);
        assert_eq!(toml.commands.max_attempts, 3);
        assert_eq!(toml.project.template, "vite-react");
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let toml = PhaseforgeToml::parse(
            r#"
[project]
name = "todo-app"

[deploy]
timeout_secs = 90
"#,
        )
        .unwrap();
        assert_eq!(toml.project.name.as_deref(), Some("todo-app"));
        assert_eq!(toml.deploy.timeout_secs, 90);
        assert_eq!(toml.deploy.max_retries, 3);
        assert_eq!(toml.health.interval_secs, 30);
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(PhaseforgeToml::parse("not valid toml {{{{").is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = PhaseforgeToml::default();
        toml.generation.review_cycles = 1;
        toml.save(&path).unwrap();

        let loaded = PhaseforgeToml::load(&path).unwrap();
        assert_eq!(loaded.generation.review_cycles, 1);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let toml = PhaseforgeToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.generation.max_phases, 12);
    }

    #[test]
    fn test_validate_flags_zero_values() {
        let mut toml = PhaseforgeToml::default();
        assert!(toml.validate().is_empty());

        toml.commands.chunk_size = 0;
        toml.deploy.timeout_secs = 0;
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("chunk_size")));
        assert!(warnings.iter().any(|w| w.contains("timeout_secs")));
    }

    #[test]
    fn test_config_new_uses_directory_name() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("weather-app");
        fs::create_dir_all(&project).unwrap();

        let config = Config::new(project.clone(), false).unwrap();
        assert_eq!(config.project_name, "weather-app");
        assert_eq!(
            config.state_file,
            project
                .canonicalize()
                .unwrap()
                .join(".phaseforge/state.json")
        );
    }

    #[test]
    fn test_config_new_prefers_toml_name() {
        let dir = tempdir().unwrap();
        let forge_dir = dir.path().join(".phaseforge");
        fs::create_dir_all(&forge_dir).unwrap();
        fs::write(
            forge_dir.join(CONFIG_FILE),
            "[project]\nname = \"named\"\n",
        )
        .unwrap();

        let config = Config::new(dir.path().to_path_buf(), true).unwrap();
        assert_eq!(config.project_name, "named");
        assert!(config.verbose);
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        config.ensure_directories().unwrap();
        assert!(config.log_dir.exists());
    }
}
