use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::browser::Browser;
use crate::error::{ExtKeeperError, Result};
use crate::policy::DEFAULT_UPDATE_URL;

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_POLICY_FILE: &str = "policies.json";

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# extkeeper configuration file
# Location: ~/.extkeeper/config.toml

[browser]
# Browser whose profiles and policies are managed
# One of: chrome, chromium, edge, brave
kind = "chrome"

# Override the per-OS user data directory (the folder holding "Default",
# "Profile 1", ...). Leave unset to use the browser default.
# user_data_dir = "/home/me/.config/google-chrome"

[policy]
# Policy store backend
# auto: registry on Windows, JSON file elsewhere
# registry: HKLM registry (Windows only, needs elevation to write)
# file: JSON file given by `file`
store = "auto"

# JSON policy file (used by the `file` backend). Default: ~/.extkeeper/policies.json
# file = "/etc/extkeeper/policies.json"

# Update URL written into forced-install entries
update_url = "https://clients2.google.com/service/update2/crx"
"#;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Browser-related configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub kind: Browser,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyBackend {
    #[default]
    Auto,
    Registry,
    File,
}

impl std::str::FromStr for PolicyBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "registry" => Ok(Self::Registry),
            "file" => Ok(Self::File),
            _ => Err(format!("Unknown policy store: {}", s)),
        }
    }
}

impl std::fmt::Display for PolicyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::Registry => "registry",
            Self::File => "file",
        };
        write!(f, "{}", s)
    }
}

/// Policy-store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub store: PolicyBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    #[serde(default = "default_update_url")]
    pub update_url: String,
}

fn default_update_url() -> String {
    DEFAULT_UPDATE_URL.to_string()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            store: PolicyBackend::Auto,
            file: None,
            update_url: default_update_url(),
        }
    }
}

impl Config {
    /// Load config from base directory
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content).map_err(|e| ExtKeeperError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Save config to base directory
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(base_dir: &Path) -> Result<PathBuf> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    /// Resolve the profile container directory (override or browser default)
    pub fn user_data_dir(&self) -> Result<PathBuf> {
        match &self.browser.user_data_dir {
            Some(dir) => Ok(dir.clone()),
            None => self.browser.kind.user_data_dir(),
        }
    }

    /// Resolve the JSON policy file path
    pub fn policy_file(&self, base_dir: &Path) -> PathBuf {
        self.policy
            .file
            .clone()
            .unwrap_or_else(|| base_dir.join(DEFAULT_POLICY_FILE))
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "browser.kind" => Some(self.browser.kind.id().to_string()),
            "browser.user_data_dir" => Some(display_opt_path(&self.browser.user_data_dir)),
            "policy.store" => Some(self.policy.store.to_string()),
            "policy.file" => Some(display_opt_path(&self.policy.file)),
            "policy.update_url" => Some(self.policy.update_url.clone()),
            _ => None,
        }
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "browser.kind" => {
                self.browser.kind = value.parse().map_err(|message| invalid(key, message))?;
            }
            "browser.user_data_dir" => {
                self.browser.user_data_dir = parse_opt_path(value);
            }
            "policy.store" => {
                self.policy.store = value.parse().map_err(|message| invalid(key, message))?;
            }
            "policy.file" => {
                self.policy.file = parse_opt_path(value);
            }
            "policy.update_url" => {
                self.policy.update_url = if value.is_empty() {
                    default_update_url()
                } else {
                    value.to_string()
                };
            }
            _ => {
                return Err(ExtKeeperError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        [
            "browser.kind",
            "browser.user_data_dir",
            "policy.store",
            "policy.file",
            "policy.update_url",
        ]
        .iter()
        .filter_map(|k| self.get(k).map(|v| (k.to_string(), v)))
        .collect()
    }
}

fn invalid(key: &str, message: String) -> ExtKeeperError {
    ExtKeeperError::InvalidConfigValue {
        key: key.to_string(),
        message,
    }
}

fn display_opt_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(default)".to_string())
}

fn parse_opt_path(value: &str) -> Option<PathBuf> {
    if value.is_empty() || value == "default" {
        None
    } else {
        Some(PathBuf::from(value))
    }
}
