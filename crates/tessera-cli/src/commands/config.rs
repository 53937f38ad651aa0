//! CLI handlers for the `tessera config` subcommand.

use std::path::Path;

use anyhow::Result;
use tessera_config::{Config, ShowFormat};

use crate::theme::Theme;

/// Show the resolved configuration with source annotations.
pub(crate) fn show_config(explicit: Option<&Path>, format: &str, section: Option<&str>) -> Result<()> {
    let resolved = Config::load(explicit)?;

    let show_format = match format {
        "json" => ShowFormat::Json,
        _ => ShowFormat::Toml,
    };

    let output = resolved
        .show(show_format, section)
        .map_err(|e| anyhow::anyhow!("failed to format config: {e}"))?;

    println!("{output}");
    Ok(())
}

/// Validate the current configuration.
pub(crate) fn validate_config(explicit: Option<&Path>) -> Result<()> {
    let resolved = Config::load(explicit)?;
    println!("{}", Theme::success("Configuration is valid"));
    if !resolved.loaded_files.is_empty() {
        println!("\nLoaded files:");
        for path in &resolved.loaded_files {
            println!("  - {path}");
        }
    }
    Ok(())
}

/// Show the config file paths and environment fallbacks that are checked.
pub(crate) fn show_paths(explicit: Option<&Path>) -> Result<()> {
    let home = tessera_config::loader::home_directory()?;
    let mut paths = vec![home.join(".tessera").join("config.toml")];
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }

    println!("Configuration files checked (in precedence order):\n");
    for (i, path) in paths.iter().enumerate() {
        let status = if path.exists() { "found" } else { "not found" };
        println!("  {}. {}  [{status}]", i.saturating_add(1), path.display());
    }

    println!("\nEnvironment variable fallbacks:");
    for (var, field) in tessera_config::env::env_mappings() {
        println!("  {var:<28} -> {field}");
    }

    Ok(())
}
