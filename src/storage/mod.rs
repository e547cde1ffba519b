//! Storage Layer
//!
//! Platform directories for models and configuration.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Environment variable naming the model storage directory (preferred)
pub const MODULE_PATH_ENV: &str = "PILL_OCR_MODULE_PATH";

/// Generic fallback environment variable for the model storage directory
pub const FALLBACK_MODULE_PATH_ENV: &str = "MODULE_PATH";

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "pillimprint", "PillImprintOcr")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Resolve where OCR models live.
///
/// An explicit directory wins, then `PILL_OCR_MODULE_PATH`, then
/// `MODULE_PATH`, then `<data dir>/models`.
pub fn resolve_model_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    resolve_model_dir_with(explicit, |key| std::env::var_os(key).map(PathBuf::from))
}

/// Same as [`resolve_model_dir`] with an injectable environment lookup
pub fn resolve_model_dir_with<F>(explicit: Option<&Path>, env: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }

    for key in [MODULE_PATH_ENV, FALLBACK_MODULE_PATH_ENV] {
        if let Some(dir) = env(key).filter(|d| !d.as_os_str().is_empty()) {
            return Ok(dir);
        }
    }

    Ok(get_data_dir()?.join("models"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_dir_wins() {
        let dir = resolve_model_dir_with(Some(Path::new("/opt/models")), |_| {
            Some(PathBuf::from("/from/env"))
        })
        .unwrap();
        assert_eq!(dir, PathBuf::from("/opt/models"));
    }

    #[test]
    fn test_preferred_env_before_fallback() {
        let dir = resolve_model_dir_with(None, |key| match key {
            MODULE_PATH_ENV => Some(PathBuf::from("/preferred")),
            FALLBACK_MODULE_PATH_ENV => Some(PathBuf::from("/fallback")),
            _ => None,
        })
        .unwrap();
        assert_eq!(dir, PathBuf::from("/preferred"));
    }

    #[test]
    fn test_fallback_env_used_when_preferred_missing() {
        let dir = resolve_model_dir_with(None, |key| {
            (key == FALLBACK_MODULE_PATH_ENV).then(|| PathBuf::from("/fallback"))
        })
        .unwrap();
        assert_eq!(dir, PathBuf::from("/fallback"));
    }

    #[test]
    fn test_empty_env_value_ignored() {
        let dir = resolve_model_dir_with(None, |key| match key {
            MODULE_PATH_ENV => Some(PathBuf::new()),
            FALLBACK_MODULE_PATH_ENV => Some(PathBuf::from("/fallback")),
            _ => None,
        })
        .unwrap();
        assert_eq!(dir, PathBuf::from("/fallback"));
    }
}
