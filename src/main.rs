use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "phaseforge")]
#[command(version, about = "Phase-by-phase project generation against a live sandbox")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a phaseforge project
    Init {
        /// Project name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,
        /// Sandbox template to deploy onto
        #[arg(short, long)]
        template: Option<String>,
    },
    /// Run generation until the project is idle
    Run {
        /// Raise the phase budget to at least this many phases first
        #[arg(short, long)]
        budget: Option<u32>,
    },
    /// Show generation state
    Status,
    /// Queue follow-up input for the next run
    Submit {
        /// What to change or add
        text: String,
    },
    /// Discard all generation state
    Reset {
        #[arg(long)]
        force: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default phaseforge.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init { name, template } => {
            cmd::cmd_init(&project_dir, name.clone(), template.clone())?
        }
        Commands::Run { budget } => cmd::cmd_run(&cli, project_dir, *budget).await?,
        Commands::Status => cmd::cmd_status(&project_dir)?,
        Commands::Submit { text } => cmd::cmd_submit(&project_dir, text)?,
        Commands::Reset { force } => cmd::cmd_reset(&project_dir, *force)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
