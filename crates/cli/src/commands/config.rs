use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use volbal_core::{AppConfig, ConfigLoader, PositionKey, PositionSettings, SettingsScope};

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml", env = "VOLBAL_CONFIG")]
    pub path: PathBuf,

    /// Show the settings that apply to one position (tenant/portfolio/position)
    #[arg(long)]
    pub position: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResolvedSettings<'a> {
    position: String,
    scope: SettingsScope,
    settings: &'a PositionSettings,
}

/// Runs the config command.
///
/// # Errors
/// Returns an error if the configuration does not load or validate, or the
/// position key is malformed.
pub fn run_config(args: &ConfigArgs) -> Result<()> {
    let config = ConfigLoader::load_from(&args.path)?;
    println!("{}", render(&config, args.position.as_deref())?);
    Ok(())
}

fn render(config: &AppConfig, position: Option<&str>) -> Result<String> {
    let Some(position) = position else {
        return Ok(serde_json::to_string_pretty(config)?);
    };
    let key = parse_key(position)?;
    let (settings, scope) = config.settings_for(&key);
    Ok(serde_json::to_string_pretty(&ResolvedSettings {
        position: key.to_string(),
        scope,
        settings,
    })?)
}

fn parse_key(raw: &str) -> Result<PositionKey> {
    let parts: Vec<&str> = raw.split('/').collect();
    match parts.as_slice() {
        [tenant, portfolio, position] if parts.iter().all(|p| !p.trim().is_empty()) => {
            Ok(PositionKey::new(*tenant, *portfolio, *position))
        }
        _ => bail!("position must look like tenant/portfolio/position, got '{raw}'"),
    }
}
