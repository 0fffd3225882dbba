//! Initialization of phaseforge projects.
//!
//! `phaseforge init` creates the `.phaseforge/` directory in a project:
//!
//! ```text
//! .phaseforge/
//! ├── phaseforge.toml  # Project configuration
//! ├── state.json       # Persisted GenerationState
//! └── logs/            # Rolling tracing logs
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::PhaseforgeToml;
use crate::state::StateStore;

/// The name of the phaseforge directory.
pub const FORGE_DIR: &str = ".phaseforge";

/// Configuration file inside [`FORGE_DIR`].
pub const CONFIG_FILE: &str = "phaseforge.toml";

/// Persisted state file inside [`FORGE_DIR`].
pub const STATE_FILE: &str = "state.json";

/// Options accepted by `phaseforge init`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub name: Option<String>,
    pub template: Option<String>,
}

/// Result of initializing a project.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the `.phaseforge` directory
    pub forge_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

/// Initialize a project in the given directory.
///
/// Existing configuration and state are left untouched; missing pieces are
/// filled in.
pub fn init_project(project_dir: &Path, options: &InitOptions) -> Result<InitResult> {
    let forge_dir = get_forge_dir(project_dir);
    let created = !forge_dir.exists();

    std::fs::create_dir_all(forge_dir.join("logs"))
        .with_context(|| format!("Failed to create directory: {}", forge_dir.display()))?;

    let config_path = forge_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        let mut toml = PhaseforgeToml::default();
        toml.project.name = options.name.clone();
        if let Some(template) = &options.template {
            toml.project.template = template.clone();
        }
        toml.save(&config_path)?;
    }

    let toml = PhaseforgeToml::load(&config_path)?;
    let project_name = toml
        .project
        .name
        .clone()
        .or_else(|| {
            project_dir
                .canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        })
        .unwrap_or_else(|| "project".to_string());

    // Opening creates and persists a fresh record when none exists.
    StateStore::open(
        forge_dir.join(STATE_FILE),
        &project_name,
        toml.generation.max_phases,
    )
    .context("Failed to initialize state file")?;

    Ok(InitResult { forge_dir, created })
}

/// Check if a project is already initialized.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(FORGE_DIR).join(STATE_FILE).exists()
}

/// Get the path to the phaseforge directory for a project.
pub fn get_forge_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(FORGE_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_project_creates_structure() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path(), &InitOptions::default()).unwrap();

        assert!(result.created);
        assert_eq!(result.forge_dir, dir.path().join(".phaseforge"));
        assert!(result.forge_dir.join("logs").is_dir());
        assert!(result.forge_dir.join(CONFIG_FILE).is_file());
        assert!(result.forge_dir.join(STATE_FILE).is_file());
    }

    #[test]
    fn test_init_project_writes_name_and_template() {
        let dir = tempdir().unwrap();
        let options = InitOptions {
            name: Some("kanban".into()),
            template: Some("next-app".into()),
        };
        let result = init_project(dir.path(), &options).unwrap();

        let toml = PhaseforgeToml::load(&result.forge_dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(toml.project.name.as_deref(), Some("kanban"));
        assert_eq!(toml.project.template, "next-app");

        let store = StateStore::open(result.forge_dir.join(STATE_FILE), "ignored", 1).unwrap();
        let state = store.snapshot();
        assert_eq!(state.project_name, "kanban");
        assert_eq!(state.phase_budget, 12);
    }

    #[test]
    fn test_init_project_is_idempotent() {
        let dir = tempdir().unwrap();
        assert!(init_project(dir.path(), &InitOptions::default()).unwrap().created);

        let forge_dir = dir.path().join(".phaseforge");
        std::fs::write(forge_dir.join(CONFIG_FILE), "[generation]\nmax_phases = 4\n").unwrap();

        let second = init_project(dir.path(), &InitOptions::default()).unwrap();
        assert!(!second.created);

        // Existing config must not be overwritten
        let content = std::fs::read_to_string(forge_dir.join(CONFIG_FILE)).unwrap();
        assert!(content.contains("max_phases = 4"));
    }

    #[test]
    fn test_is_initialized() {
        let dir = tempdir().unwrap();
        assert!(!is_initialized(dir.path()));
        init_project(dir.path(), &InitOptions::default()).unwrap();
        assert!(is_initialized(dir.path()));
    }

    #[test]
    fn test_get_forge_dir() {
        let dir = tempdir().unwrap();
        assert_eq!(get_forge_dir(dir.path()), dir.path().join(".phaseforge"));
    }
}
