// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in various locations.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::ChatcoreConfig;

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".chatcore.json",
    ".chatcore.yaml",
    ".chatcore/config.json",
    "chatcore.config.json",
];

/// Local config file name (for per-directory overrides).
pub const LOCAL_CONFIG_FILE: &str = ".chatcore.local.json";

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".chatcore";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration from ~/.chatcore/config.json.
pub fn load_global_config() -> Result<Option<ChatcoreConfig>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Load workspace configuration from the workspace root.
///
/// The first file of [`CONFIG_FILES`] that exists wins.
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<ChatcoreConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load local configuration from .chatcore.local.json.
pub fn load_local_config(workspace_root: &Path) -> Result<Option<ChatcoreConfig>, ConfigError> {
    let path = workspace_root.join(LOCAL_CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    load_config_file(&path).map(Some)
}

/// Load a configuration file (JSON or YAML, chosen by extension).
pub fn load_config_file(path: &Path) -> Result<ChatcoreConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let config = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };

    tracing::debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Save workspace configuration to a file.
pub fn save_workspace_config(
    workspace_root: &Path,
    config: &ChatcoreConfig,
    filename: Option<&str>,
) -> Result<PathBuf, ConfigError> {
    let filename = filename.unwrap_or(CONFIG_FILES[0]);
    let path = workspace_root.join(filename);

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;

    Ok(path)
}

/// Initialize a new config file, using the example config when none is given.
pub fn init_config(workspace_root: &Path, config: Option<ChatcoreConfig>) -> Result<PathBuf, ConfigError> {
    let config = config.unwrap_or_else(get_example_config);
    save_workspace_config(workspace_root, &config, None)
}

/// Find the workspace root by searching for config files.
///
/// Walks up the directory tree from `start` until it finds a directory
/// containing a config file or reaches the filesystem root.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if CONFIG_FILES.iter().any(|f| current.join(f).exists()) {
            return Some(current);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

/// Get an example configuration.
pub fn get_example_config() -> ChatcoreConfig {
    ChatcoreConfig {
        provider: Some("ollama".to_string()),
        model: Some("llama3.2".to_string()),
        preset: Some("default".to_string()),
        optimizer: Some(super::types::OptimizerConfigPartial {
            max_context_tokens: Some(8_000),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_files_order() {
        assert_eq!(CONFIG_FILES.len(), 4);
        assert_eq!(CONFIG_FILES[0], ".chatcore.json");
    }

    #[test]
    fn test_global_config_dir() {
        if let Some(dir) = get_global_config_dir() {
            assert!(dir.ends_with(".chatcore"));
        }
    }

    #[test]
    fn test_load_workspace_config_not_found() {
        let temp = TempDir::new().unwrap();
        let result = load_workspace_config(temp.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_workspace_config_json() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".chatcore.json"),
            r#"{"provider": "openai", "model": "gpt-4o"}"#,
        )
        .unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.provider, Some("openai".to_string()));
        assert_eq!(config.model, Some("gpt-4o".to_string()));
    }

    #[test]
    fn test_load_workspace_config_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".chatcore.yaml"),
            "provider: ollama\nfallback:\n  simpleBufferSize: 20\n",
        )
        .unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.provider, Some("ollama".to_string()));
        assert_eq!(config.fallback.unwrap().simple_buffer_size, Some(20));
    }

    #[test]
    fn test_json_preferred_over_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".chatcore.json"), r#"{"model": "from-json"}"#).unwrap();
        std::fs::write(temp.path().join(".chatcore.yaml"), "model: from-yaml\n").unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.model.as_deref(), Some("from-json"));
    }

    #[test]
    fn test_load_invalid_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".chatcore.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(load_config_file(&path), Err(ConfigError::JsonError(_))));
    }

    #[test]
    fn test_load_local_config() {
        let temp = TempDir::new().unwrap();
        assert!(load_local_config(temp.path()).unwrap().is_none());

        std::fs::write(temp.path().join(LOCAL_CONFIG_FILE), r#"{"stream": true}"#).unwrap();
        let config = load_local_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.stream, Some(true));
    }

    #[test]
    fn test_save_workspace_config() {
        let temp = TempDir::new().unwrap();
        let config = ChatcoreConfig {
            provider: Some("openai".to_string()),
            api_key_env: Some("WORK_KEY".to_string()),
            ..Default::default()
        };

        let saved_path = save_workspace_config(temp.path(), &config, None).unwrap();
        assert!(saved_path.exists());

        let content = std::fs::read_to_string(&saved_path).unwrap();
        assert!(content.contains("openai"));
        assert!(content.contains("apiKeyEnv"));
        assert!(!content.contains("baseUrl"));
    }

    #[test]
    fn test_find_workspace_root() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("a").join("b").join("c");
        std::fs::create_dir_all(&subdir).unwrap();
        std::fs::write(temp.path().join(".chatcore.json"), "{}").unwrap();

        let found = find_workspace_root(&subdir);
        assert_eq!(found.as_deref(), Some(temp.path()));
    }

    #[test]
    fn test_init_config_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = init_config(temp.path(), None).unwrap();
        assert_eq!(path.file_name().unwrap(), ".chatcore.json");

        let loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded.provider.as_deref(), Some("ollama"));
        assert_eq!(loaded.optimizer.unwrap().max_context_tokens, Some(8_000));
    }
}
