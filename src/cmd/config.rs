//! Configuration view and validation commands: `phaseforge config`.

use anyhow::Result;
use phaseforge::config::{Config, PhaseforgeToml};
use phaseforge::init::{CONFIG_FILE, get_forge_dir};

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    let forge_dir = get_forge_dir(project_dir);
    let config_path = forge_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Phaseforge Configuration");
            println!("========================");
            println!();

            let settings = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                PhaseforgeToml::load(&config_path)?
            } else {
                println!("No {} found at {}", CONFIG_FILE, config_path.display());
                println!("Using default configuration.");
                PhaseforgeToml::default()
            };
            println!();
            let mut shown = settings.clone();
            if shown.sandbox.api_token.is_some() {
                shown.sandbox.api_token = Some("(redacted)".to_string());
            }
            print!("{}", toml::to_string_pretty(&shown)?);
            println!();

            println!("Effective values (with env overrides):");
            if forge_dir.exists() {
                let config = Config::new(project_dir.to_path_buf(), false)?;
                println!("  project_name = \"{}\"", config.project_name);
            }
            println!("  claude_cmd = \"{}\"", settings.claude_cmd());
            println!("  sandbox_url = \"{}\"", settings.sandbox_url());
            println!(
                "  sandbox_token = {}",
                if settings.sandbox_token().is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let toml = PhaseforgeToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&forge_dir)?;
            PhaseforgeToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [generation] max_phases, recharge_floor, review_cycles");
            println!("  - [deploy] timeout_secs, max_retries, backoff_base_ms");
            println!("  - [sandbox] base_url (token via SANDBOX_API_TOKEN)");
            println!();
        }
    }

    Ok(())
}
