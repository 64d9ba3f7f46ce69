use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(stripped) = s.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if s == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

/// Configuration for git-sneakernet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SneakernetConfig {
    /// git executable to run
    #[serde(default = "defaults::git_binary")]
    pub git_binary: PathBuf,
    /// Parent directory for bundle staging and artifact extraction
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// Fail `apply` when the active branch cannot be fast-forwarded
    #[serde(default)]
    pub check_divergence: bool,
    /// Prefix of the disposable branches created while bundling
    #[serde(default = "defaults::temp_branch_prefix")]
    pub temp_branch_prefix: String,
}

impl Default for SneakernetConfig {
    fn default() -> Self {
        SneakernetConfig {
            git_binary: defaults::git_binary(),
            scratch_dir: None,
            check_divergence: false,
            temp_branch_prefix: defaults::temp_branch_prefix(),
        }
    }
}

impl SneakernetConfig {
    /// Load the config file if there is one, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;
        Self::load_with(&config_path, |key| env::var(key).ok())
    }

    /// Like [`SneakernetConfig::load`], reading variables through `lookup`.
    pub fn load_with<F>(config_path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        tracing::debug!("loading git-sneakernet config from {:?}", config_path);
        let mut config = if config_path.exists() {
            Self::load_from_file(config_path)?
        } else {
            Self::default()
        };

        if let Some(git) = lookup("GIT_SNEAKERNET_GIT") {
            config.git_binary = expand_tilde(&PathBuf::from(git));
        }

        if let Some(path) = lookup("GIT_SNEAKERNET_SCRATCH_DIR") {
            config.scratch_dir = Some(expand_tilde(&PathBuf::from(path)));
        }

        if let Some(flag) = lookup("GIT_SNEAKERNET_CHECK_DIVERGENCE") {
            config.check_divergence = flag
                .parse()
                .context("Failed to parse GIT_SNEAKERNET_CHECK_DIVERGENCE as bool")?;
        }

        if let Some(prefix) = lookup("GIT_SNEAKERNET_TEMP_BRANCH_PREFIX") {
            config.temp_branch_prefix = prefix;
        }

        if config.temp_branch_prefix.is_empty() {
            anyhow::bail!("temp_branch_prefix must not be empty");
        }
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: SneakernetConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.git_binary = expand_tilde(&config.git_binary);
        if let Some(ref scratch) = config.scratch_dir {
            config.scratch_dir = Some(expand_tilde(scratch));
        }

        Ok(config)
    }

    /// Get default config file path
    pub fn config_file_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".config/git-sneakernet/config.yaml"))
            .context("Could not determine home directory for config file")
    }
}

mod defaults {
    use std::path::PathBuf;

    pub(crate) fn git_binary() -> PathBuf {
        PathBuf::from("git")
    }

    pub(crate) fn temp_branch_prefix() -> String {
        "sneakernet-tmp-".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = SneakernetConfig::load_with(&dir.path().join("absent.yaml"), no_env).unwrap();
        assert_eq!(config, SneakernetConfig::default());
        assert_eq!(config.git_binary, PathBuf::from("git"));
        assert!(!config.check_divergence);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "check_divergence: true\n").unwrap();

        let config = SneakernetConfig::load_with(&config_path, no_env).unwrap();
        assert!(config.check_divergence);
        assert_eq!(config.temp_branch_prefix, "sneakernet-tmp-");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "compress: true\n").unwrap();
        assert!(SneakernetConfig::load_with(&config_path, no_env).is_err());
    }

    #[test]
    fn test_env_override() {
        let dir = tempdir().unwrap();
        let env: HashMap<&str, &str> = [
            ("GIT_SNEAKERNET_GIT", "/opt/git/bin/git"),
            ("GIT_SNEAKERNET_CHECK_DIVERGENCE", "true"),
            ("GIT_SNEAKERNET_TEMP_BRANCH_PREFIX", "sn-"),
        ]
        .into_iter()
        .collect();

        let config = SneakernetConfig::load_with(&dir.path().join("absent.yaml"), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();
        assert_eq!(config.git_binary, PathBuf::from("/opt/git/bin/git"));
        assert!(config.check_divergence);
        assert_eq!(config.temp_branch_prefix, "sn-");
    }

    #[test]
    fn test_bad_bool_override_fails() {
        let dir = tempdir().unwrap();
        let result = SneakernetConfig::load_with(&dir.path().join("absent.yaml"), |k| {
            (k == "GIT_SNEAKERNET_CHECK_DIVERGENCE").then(|| "sometimes".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_tilde_expansion() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "scratch_dir: ~/sneakernet\n").unwrap();

        let loaded = SneakernetConfig::load_with(&config_path, no_env).unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(loaded.scratch_dir, Some(home.join("sneakernet")));
        }
    }
}
