//! Project initialization, status, input and reset commands.

use anyhow::{Result, bail};
use console::style;
use phaseforge::config::Config;
use phaseforge::init::{InitOptions, init_project, is_initialized};
use phaseforge::state::{self, StateStore};
use phaseforge_common::GenerationState;
use std::path::Path;

fn open_store(config: &Config) -> Result<StateStore> {
    Ok(StateStore::open(
        config.state_file.clone(),
        &config.project_name,
        config.toml.generation.max_phases,
    )?)
}

fn require_initialized(project_dir: &Path) -> Result<()> {
    if !is_initialized(project_dir) {
        bail!("Project not initialized. Run 'phaseforge init' first.");
    }
    Ok(())
}

pub fn cmd_init(project_dir: &Path, name: Option<String>, template: Option<String>) -> Result<()> {
    let was_initialized = is_initialized(project_dir);
    let result = init_project(project_dir, &InitOptions { name, template })?;

    if result.created {
        println!(
            "Initialized phaseforge project at {}",
            result.forge_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .phaseforge/");
        println!("  ├── phaseforge.toml  # Configuration (see `phaseforge config`)");
        println!("  ├── state.json       # Generation state");
        println!("  └── logs/            # Run logs");
        println!();
        println!("Next steps:");
        println!("  1. Set SANDBOX_URL and SANDBOX_API_TOKEN (or edit phaseforge.toml)");
        println!("  2. Run `phaseforge run` to start generating");
    } else if was_initialized {
        println!(
            "Phaseforge project already initialized at {}",
            result.forge_dir.display()
        );
        println!("Directory structure verified.");
    } else {
        println!(
            "Completed phaseforge initialization at {}",
            result.forge_dir.display()
        );
    }

    Ok(())
}

pub fn cmd_status(project_dir: &Path) -> Result<()> {
    println!();
    println!("Phaseforge Project Status");
    println!("=========================");
    println!();

    if !is_initialized(project_dir) {
        println!("Project: Not initialized");
        println!();
        println!("Run 'phaseforge init' to initialize the project.");
        println!();
        return Ok(());
    }

    let config = Config::new(project_dir.to_path_buf(), false)?;
    let store = open_store(&config)?;
    print_state(&store.snapshot(), store.version());
    Ok(())
}

fn print_state(state: &GenerationState, version: u64) {
    println!("Project:  {}", style(&state.project_name).bold());
    println!("State:    {} (version {})", style(state.current_state).cyan(), version);
    println!("Budget:   {} phase(s) left", state.phase_budget);
    println!(
        "MVP:      {}",
        if state.mvp_completed {
            style("completed").green()
        } else {
            style("in progress").yellow()
        }
    );
    if let Some(url) = &state.preview_url {
        println!("Preview:  {}", style(url).underlined());
    }
    println!("Files:    {}", state.file_states.len());
    println!();

    if state.phases.is_empty() {
        println!("No phases yet.");
    } else {
        println!("Phases:");
        for (i, phase) in state.phases.iter().enumerate() {
            let mark = if phase.completed {
                style("✓").green()
            } else {
                style("…").yellow()
            };
            println!(
                "  {} {:>2}. {} ({} file(s))",
                mark,
                i + 1,
                phase.name,
                phase.file_refs.len()
            );
        }
    }

    if !state.pending_inputs.is_empty() {
        println!();
        println!("Pending input:");
        for input in &state.pending_inputs {
            println!("  - {}", input);
        }
    }
    println!();
}

pub fn cmd_submit(project_dir: &Path, text: &str) -> Result<()> {
    require_initialized(project_dir)?;
    if text.trim().is_empty() {
        bail!("Input is empty");
    }

    let config = Config::new(project_dir.to_path_buf(), false)?;
    let store = open_store(&config)?;
    let pending = state::submit_input(&store, text, config.toml.generation.recharge_floor)?;

    println!(
        "Queued input ({} pending). Run 'phaseforge run' to process it.",
        pending
    );
    Ok(())
}

pub fn cmd_reset(project_dir: &Path, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    require_initialized(project_dir)?;
    let config = Config::new(project_dir.to_path_buf(), false)?;

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will discard all generated phases and files. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let store = open_store(&config)?;
    let fresh = GenerationState::new(&config.project_name, config.toml.generation.max_phases);
    store.update(|s| *s = fresh)?;

    if config.log_dir.exists() {
        std::fs::remove_dir_all(&config.log_dir).ok();
    }

    println!("Reset complete");
    Ok(())
}
