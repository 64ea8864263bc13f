//! Browser abstraction for Chromium-family support
//!
//! All supported browsers share the profile layout (`Default`, `Profile N`,
//! a `Preferences` JSON file, an `Extensions` asset tree) and the policy
//! model. They differ in where user data lives and in the policy root.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ExtKeeperError, Result};

/// Target browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Browser {
    #[default]
    Chrome,
    Chromium,
    Edge,
    Brave,
}

impl Browser {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chrome => "Google Chrome",
            Self::Chromium => "Chromium",
            Self::Edge => "Microsoft Edge",
            Self::Brave => "Brave",
        }
    }

    /// Short identifier
    pub fn id(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Chromium => "chromium",
            Self::Edge => "edge",
            Self::Brave => "brave",
        }
    }

    pub fn all() -> &'static [Browser] {
        &[
            Browser::Chrome,
            Browser::Chromium,
            Browser::Edge,
            Browser::Brave,
        ]
    }

    /// Policy root scope under HKLM
    pub fn policy_root(&self) -> &'static str {
        match self {
            Self::Chrome => r"SOFTWARE\Policies\Google\Chrome",
            Self::Chromium => r"SOFTWARE\Policies\Chromium",
            Self::Edge => r"SOFTWARE\Policies\Microsoft\Edge",
            Self::Brave => r"SOFTWARE\Policies\BraveSoftware\Brave",
        }
    }

    /// Path segments below the OS data directory, per OS family
    fn data_segments(&self) -> &'static [&'static str] {
        if cfg!(windows) {
            match self {
                Self::Chrome => &["Google", "Chrome", "User Data"],
                Self::Chromium => &["Chromium", "User Data"],
                Self::Edge => &["Microsoft", "Edge", "User Data"],
                Self::Brave => &["BraveSoftware", "Brave-Browser", "User Data"],
            }
        } else if cfg!(target_os = "macos") {
            match self {
                Self::Chrome => &["Google", "Chrome"],
                Self::Chromium => &["Chromium"],
                Self::Edge => &["Microsoft Edge"],
                Self::Brave => &["BraveSoftware", "Brave-Browser"],
            }
        } else {
            match self {
                Self::Chrome => &["google-chrome"],
                Self::Chromium => &["chromium"],
                Self::Edge => &["microsoft-edge"],
                Self::Brave => &["BraveSoftware", "Brave-Browser"],
            }
        }
    }

    /// Default per-user data directory holding the profiles
    ///
    /// - Windows: `%LOCALAPPDATA%\...\User Data`
    /// - macOS: `~/Library/Application Support/...`
    /// - Linux: `~/.config/...`
    pub fn user_data_dir(&self) -> Result<PathBuf> {
        let base = if cfg!(windows) {
            dirs::data_local_dir()
        } else {
            dirs::config_dir()
        };
        let mut path = base.ok_or_else(|| ExtKeeperError::UserDataDirUnresolved {
            browser: self.name().to_string(),
        })?;
        for segment in self.data_segments() {
            path.push(segment);
        }
        Ok(path)
    }
}

impl std::fmt::Display for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chrome" | "google-chrome" => Ok(Self::Chrome),
            "chromium" => Ok(Self::Chromium),
            "edge" | "msedge" | "microsoft-edge" => Ok(Self::Edge),
            "brave" => Ok(Self::Brave),
            _ => Err(format!("Unknown browser: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_from_str() {
        assert_eq!("chrome".parse::<Browser>().unwrap(), Browser::Chrome);
        assert_eq!("MSEdge".parse::<Browser>().unwrap(), Browser::Edge);
        assert_eq!("brave".parse::<Browser>().unwrap(), Browser::Brave);
        assert!("firefox".parse::<Browser>().is_err());
    }

    #[test]
    fn policy_roots_are_distinct() {
        let mut roots: Vec<_> = Browser::all().iter().map(|b| b.policy_root()).collect();
        roots.sort();
        roots.dedup();
        assert_eq!(roots.len(), Browser::all().len());
        assert_eq!(
            Browser::Chrome.policy_root(),
            r"SOFTWARE\Policies\Google\Chrome"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_user_data_dir_under_config() {
        if let Some(config) = dirs::config_dir() {
            assert_eq!(
                Browser::Chrome.user_data_dir().unwrap(),
                config.join("google-chrome")
            );
        }
    }
}
