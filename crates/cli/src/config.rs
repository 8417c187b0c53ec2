//! CLI configuration utilities

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tellerdesk_core::ClientSettings;

/// Load settings, letting `--data-dir` win over every other source
pub fn load_settings(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<ClientSettings> {
    let mut settings = ClientSettings::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load settings from {}", path.display()),
        None => "Failed to load settings".to_string(),
    })?;

    if let Some(data_dir) = data_dir {
        settings.data_dir = data_dir;
    }
    Ok(settings)
}

/// Save settings to a JSON file
pub fn save_settings<P: AsRef<Path>>(settings: &ClientSettings, path: P) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Generate a default settings file
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    save_settings(&ClientSettings::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tellerdesk.json");
        generate_default_config(&path).unwrap();

        let settings = load_settings(Some(&path), Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.session, ClientSettings::default().session);
    }
}
