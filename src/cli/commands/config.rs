use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Initialize configuration file")]
    Init {
        #[arg(
            long,
            short = 'p',
            help = "Create project config (./.docqa/config.toml) instead of global config"
        )]
        project: bool,
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file paths")]
    Path,
}

pub async fn handle_config(
    cmd: ConfigCommand,
    explicit: Option<&Path>,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { project, force } => handle_init(project, force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(explicit, format),
        ConfigCommand::Path => handle_path(explicit),
    }
}

fn handle_init(project: bool, force: bool, formatter: &dyn Formatter) -> Result<()> {
    let (config_path, scope) = if project {
        (Config::project_path(), "Project")
    } else {
        (Config::global_path(), "Global")
    };
    let config_path =
        config_path.ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} config already exists at: {}\nUse --force to overwrite.",
            scope,
            config_path.display()
        );
    }

    Config::default()
        .save_to(&config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    println!(
        "{}",
        formatter.format_message(&format!(
            "Created {} config at: {}",
            scope.to_lowercase(),
            config_path.display()
        ))
    );
    Ok(())
}

fn handle_show(explicit: Option<&Path>, format: OutputFormat) -> Result<()> {
    let resolved = Config::load(explicit)?;
    let config = masked(resolved.config);

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "path": resolved.path,
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match resolved.path {
        Some(ref path) => println!("# Loaded from: {}", path.display()),
        None => println!("# No config file found, using defaults"),
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

/// Hide secrets before printing.
fn masked(mut config: Config) -> Config {
    let mask = |key: &mut Option<String>| {
        if key.is_some() {
            *key = Some("********".to_string());
        }
    };
    mask(&mut config.generator.api_key);
    mask(&mut config.vector_store.api_key);
    config
}

fn handle_path(explicit: Option<&Path>) -> Result<()> {
    println!("Configuration paths:");
    println!();

    if let Some(path) = explicit {
        let state = if path.exists() { "active" } else { "missing" };
        println!("Explicit config ({state}): {}", path.display());
    }

    let mut shown_active = explicit.is_some();
    for (label, path) in [
        ("Project", Config::project_path()),
        ("Global", Config::global_path()),
    ] {
        let Some(path) = path else { continue };
        let state = if path.exists() && !shown_active {
            shown_active = true;
            "active"
        } else if path.exists() {
            "shadowed"
        } else {
            "would be"
        };
        println!("{label} config ({state}): {}", path.display());
    }

    println!("Data directory: {}", Config::data_dir().display());

    if let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        let state = if env_path.exists() { "active" } else { "would be" };
        println!(".env file ({state}): {}", env_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_keys() {
        let mut config = Config::default();
        config.generator.api_key = Some("hf_secret".to_string());

        let config = masked(config);
        assert_eq!(config.generator.api_key.as_deref(), Some("********"));
        assert!(config.vector_store.api_key.is_none());
    }
}
