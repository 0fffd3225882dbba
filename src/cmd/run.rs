//! Generation run command: `phaseforge run`.

use anyhow::{Context, Result, bail};
use console::style;
use phaseforge::claude::ClaudeServices;
use phaseforge::config::Config;
use phaseforge::init::is_initialized;
use phaseforge::orchestrator::{GenerationAgent, RunOutcome};
use phaseforge::sandbox::HttpSandboxClient;
use phaseforge::state::StateStore;
use phaseforge::ui::RunUI;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use super::super::Cli;

pub async fn cmd_run(cli: &Cli, project_dir: PathBuf, budget: Option<u32>) -> Result<()> {
    if !is_initialized(&project_dir) {
        bail!("Project not initialized. Run 'phaseforge init' first.");
    }

    let config = Config::new(project_dir, cli.verbose)?;
    config.ensure_directories()?;
    let _log_guard = phaseforge::logging::init(config.verbose, Some(&config.log_dir));

    for warning in config.toml.validate() {
        eprintln!("{} {}", style("warning:").yellow(), warning);
    }

    let store = Arc::new(
        StateStore::open(
            config.state_file.clone(),
            &config.project_name,
            config.toml.generation.max_phases,
        )
        .context("Failed to open generation state")?,
    );
    let claude = Arc::new(ClaudeServices::from_config(&config));
    let sandbox = Arc::new(HttpSandboxClient::from_config(&config.toml)?);

    let agent = GenerationAgent::builder(store, config.toml.clone())
        .planner(claude.clone())
        .content(claude.clone())
        .reviewer(claude.clone())
        .advisor(claude)
        .sandbox(sandbox)
        .build()?;

    let ui = RunUI::new(config.verbose);
    let mut events = agent.subscribe();
    let mut run = agent.start_with(budget);
    let mut stopping = false;

    let joined = loop {
        tokio::select! {
            joined = &mut run => break joined,
            event = events.recv() => match event {
                Ok(event) => ui.handle(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "UI fell behind the event stream");
                }
                Err(RecvError::Closed) => {}
            },
            _ = tokio::signal::ctrl_c(), if !stopping => {
                stopping = true;
                agent.stop();
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        ui.handle(&event);
    }
    ui.finish();
    agent.shutdown();

    let outcome = joined.context("Generation task panicked")??;
    print_outcome(&outcome, &agent);
    Ok(())
}

fn print_outcome(outcome: &RunOutcome, agent: &GenerationAgent) {
    let state = agent.get_state();
    println!();
    match outcome {
        RunOutcome::AlreadyRunning => println!("A generation run is already active."),
        RunOutcome::NothingToDo => {
            println!("Nothing to do: the project is complete and no input is pending.");
            println!("Use 'phaseforge submit <text>' to request changes.");
        }
        RunOutcome::Completed { phases_completed } => {
            println!(
                "{} {} phase(s) completed; {} left in budget.",
                style("Done.").green().bold(),
                phases_completed,
                state.phase_budget
            );
        }
        RunOutcome::Stopped => println!("Stopped. Run 'phaseforge run' to continue."),
        RunOutcome::Aborted { error } => {
            println!("{} {}", style("Run aborted:").red().bold(), error);
            println!("Run 'phaseforge run' to retry.");
        }
    }
    if let Some(url) = &state.preview_url {
        println!("Preview: {}", style(url).underlined());
    }
}
