//! Configuration loading for the yacu daemon.
//!
//! The config file is optional: a missing file yields the defaults. A file
//! that exists must be readable YAML and pass [`YacuOptions::sanitize`].

use std::path::Path;

use anyhow::{Context, bail};
use yacu::YacuOptions;

pub fn load_config(path: &Path) -> anyhow::Result<YacuOptions> {
    let options = match try_load_yaml(path)? {
        Some(options) => options,
        None => YacuOptions::default(),
    };
    options
        .sanitize()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(options)
}

fn try_load_yaml(path: &Path) -> anyhow::Result<Option<YacuOptions>> {
    if !path.exists() {
        return Ok(None);
    }
    if path.is_dir() {
        bail!("config path {} is a directory", path.display());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(None);
    }

    let options = serde_yaml::from_str::<YacuOptions>(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(Some(options))
}
