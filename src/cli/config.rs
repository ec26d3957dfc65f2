//! CLI handler for inspecting configuration.

use crate::config::Config;
use anyhow::Result;

pub fn handle_config_command() -> Result<()> {
    let config = Config::load()?;
    let path = Config::config_path()?;

    println!("Config file: {}\n", path.display());
    println!("{}", config.to_toml()?);
    println!("Recordings: {}", config.output_dir()?.display());

    Ok(())
}
