//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: &ConfigAction, config: &Config, override_path: Option<&Path>) -> Result<()> {
    let path = Config::path(override_path);
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => {
            let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
            if content.trim().is_empty() {
                println!("# No settings in {} (using defaults)", path.display());
            } else {
                print!("{}", content);
            }
        }
        ConfigAction::Init { force } => {
            init_config(&path, *force)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Write the initial config to `path`, refusing to overwrite unless `force`.
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    Config::initial().save_to(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_init_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("uart-ble").join("config.toml");

        init_config(&path, false).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::initial());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "scan_timeout = 9\n").unwrap();

        let err = init_config(&path, false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(Config::load_from(&path).unwrap().scan_timeout, Some(9));

        init_config(&path, true).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().scan_timeout, Some(5));
    }
}
