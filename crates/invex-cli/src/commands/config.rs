//! Config command - inspect and edit the JSON configuration file.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use console::style;
use serde_json::Value;

use invex_core::models::config::InvexConfig;

use super::GlobalOpts;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the configuration in effect, command line overrides included
    Show,

    /// Write a configuration file with default settings
    Init {
        /// Write here instead of the configured location
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print one setting, e.g. "oracle.model"
    Get { key: String },

    /// Change one setting in the configuration file
    Set { key: String, value: String },

    /// Print where the configuration file lives
    Path,
}

pub async fn run(args: ConfigArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            if global.read_config_file()?.is_none() {
                println!("{} No config file found, showing defaults.", style("ℹ").blue());
            }
            println!("{}", serde_json::to_string_pretty(&global.load_config()?)?);
        }
        ConfigCommand::Init { output, force } => {
            let path = output.unwrap_or_else(|| global.config_path());
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            write_config(&InvexConfig::default(), &path)?;
            println!("{} Created configuration file at {}", style("✓").green(), path.display());
        }
        ConfigCommand::Get { key } => {
            let json = serde_json::to_value(file_or_default(global)?)?;
            let value = json
                .pointer(&json_pointer(&key))
                .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        ConfigCommand::Set { key, value } => {
            let value = parse_value(&value);
            let config = with_setting(file_or_default(global)?, &key, value.clone())?;
            write_config(&config, &global.config_path())?;
            println!("{} Set {} = {}", style("✓").green(), key, value);
        }
        ConfigCommand::Path => {
            let path = global.config_path();
            println!("Configuration file: {}", path.display());
            if path.exists() {
                println!("Status: {}", style("exists").green());
            } else {
                println!("Status: {}", style("not created").yellow());
                println!();
                println!("Run 'invex config init' to create a configuration file.");
            }
        }
    }
    Ok(())
}

/// `<config dir>/invex/config.json`, or `./invex/config.json` without one.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invex")
        .join("config.json")
}

/// The file's settings without command line overrides, so `set` never
/// writes an override back.
fn file_or_default(global: &GlobalOpts) -> anyhow::Result<InvexConfig> {
    Ok(global.read_config_file()?.unwrap_or_default())
}

fn write_config(config: &InvexConfig, path: &std::path::Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    config.save(path)?;
    Ok(())
}

/// JSON literal if it parses as one, otherwise a bare string (`gpt-4o`).
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// `oracle.model` -> `/oracle/model`.
fn json_pointer(key: &str) -> String {
    key.split('.').fold(String::new(), |mut pointer, part| {
        pointer.push('/');
        pointer.push_str(&part.replace('~', "~0").replace('/', "~1"));
        pointer
    })
}

/// Replace one leaf setting and check the result still is a valid configuration.
fn with_setting(config: InvexConfig, key: &str, value: Value) -> anyhow::Result<InvexConfig> {
    let mut json = serde_json::to_value(config)?;
    let slot = json
        .pointer_mut(&json_pointer(key))
        .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
    if slot.is_object() {
        anyhow::bail!("'{}' is a section; set one of its keys instead", key);
    }
    *slot = value;

    serde_json::from_value(json).map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e))
}
