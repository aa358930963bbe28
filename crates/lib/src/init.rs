//! Initialize the configuration directory: create ~/.relay and a default config file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Create the config directory and write a default `config.json` if none exists.
/// Returns the config directory. An existing config file is left untouched.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_dir_and_default_config_once() {
        let dir = std::env::temp_dir().join(format!("relay-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");

        let created = init_config_dir(&path).expect("init");
        assert_eq!(created, dir);
        let written = std::fs::read_to_string(&path).expect("read config");
        let parsed: Config = serde_json::from_str(&written).expect("default config parses");
        assert_eq!(parsed.gateway.port, 15152);

        std::fs::write(&path, "{\"gateway\":{\"port\":1}}").expect("overwrite");
        init_config_dir(&path).expect("second init");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "{\"gateway\":{\"port\":1}}"
        );
        let _ = std::fs::remove_dir_all(dir);
    }
}
