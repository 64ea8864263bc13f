use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ExtKeeperError, Result};
use crate::naming::unique_name;
use crate::oplog::OpLog;
use crate::prefs::{preferences_path, PreferencesDocument};

const DEFAULT_PROFILE_DIR: &str = "Default";
const PROFILE_DIR_PREFIX: &str = "Profile ";

/// Display name → profile, sorted by display name
pub type ProfileMap = BTreeMap<String, Profile>;

/// A browser profile discovered under the user data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Unique display name (from `profile.name`, else the directory name)
    pub name: String,
    /// Directory name (`Default`, `Profile 3`, ...)
    pub dir_name: String,
    pub path: PathBuf,
}

impl Profile {
    pub fn preferences_path(&self) -> PathBuf {
        preferences_path(&self.path)
    }
}

/// `Default` or `Profile <digits>`
pub fn is_profile_dir_name(name: &str) -> bool {
    if name == DEFAULT_PROFILE_DIR {
        return true;
    }
    match name.strip_prefix(PROFILE_DIR_PREFIX) {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

pub struct ProfileLocator {
    user_data_dir: PathBuf,
}

impl ProfileLocator {
    pub fn new(user_data_dir: PathBuf) -> Self {
        Self { user_data_dir }
    }

    pub fn user_data_dir(&self) -> &Path {
        &self.user_data_dir
    }

    /// Discover all profiles
    ///
    /// A missing user data directory is logged and yields an empty map.
    /// Directories are visited in name order, so collision suffixes are
    /// assigned deterministically.
    pub fn scan(&self, log: &mut OpLog) -> ProfileMap {
        let mut profiles = ProfileMap::new();

        if !self.user_data_dir.is_dir() {
            log.error(format!(
                "Error: browser user data path not found or invalid: {}",
                self.user_data_dir.display()
            ));
            return profiles;
        }

        log.info(format!(
            "Scanning for profiles in: {}",
            self.user_data_dir.display()
        ));

        let mut dirs: Vec<(String, PathBuf)> = match fs::read_dir(&self.user_data_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    let name = e.file_name().to_string_lossy().to_string();
                    let path = e.path();
                    (is_profile_dir_name(&name) && path.is_dir()).then_some((name, path))
                })
                .collect(),
            Err(e) => {
                log.error(format!(
                    "Error reading {}: {}",
                    self.user_data_dir.display(),
                    e
                ));
                return profiles;
            }
        };
        dirs.sort_by(|a, b| a.0.cmp(&b.0));

        for (dir_name, path) in dirs {
            let raw_name = read_display_name(&dir_name, &path, log);
            let name = unique_name(&profiles, &raw_name);
            log.info(format!("Found profile: '{}' at {}", name, path.display()));
            profiles.insert(
                name.clone(),
                Profile {
                    name,
                    dir_name,
                    path,
                },
            );
        }

        if profiles.is_empty() {
            log.warn("No browser profiles found (Default or Profile N).");
        } else {
            log.info(format!(
                "Finished scanning. Found {} profile(s).",
                profiles.len()
            ));
        }

        profiles
    }
}

/// Resolve a user argument to a profile: display name first, then directory name
pub fn find_profile<'a>(profiles: &'a ProfileMap, query: &str) -> Result<&'a Profile> {
    profiles
        .get(query)
        .or_else(|| profiles.values().find(|p| p.dir_name == query))
        .ok_or_else(|| ExtKeeperError::ProfileNotFound {
            name: query.to_string(),
        })
}

fn read_display_name(dir_name: &str, path: &Path, log: &mut OpLog) -> String {
    match PreferencesDocument::load(path) {
        Ok(doc) => match doc.profile_name() {
            Some(name) => name.to_string(),
            None => {
                log.info(format!(
                    "Profile '{}' has no custom name in Preferences, using folder name.",
                    dir_name
                ));
                dir_name.to_string()
            }
        },
        Err(ExtKeeperError::PreferencesNotFound { .. }) => {
            log.warn(format!(
                "Preferences file not found for profile '{}'. Using folder name.",
                dir_name
            ));
            dir_name.to_string()
        }
        Err(ExtKeeperError::JsonParse { .. }) => {
            log.warn(format!(
                "Error: Could not decode Preferences JSON for profile '{}'. Using folder name.",
                dir_name
            ));
            dir_name.to_string()
        }
        Err(e) => {
            log.warn(format!(
                "Error reading Preferences for profile '{}': {}. Using folder name.",
                dir_name, e
            ));
            dir_name.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_profile(root: &Path, dir: &str, prefs: Option<&str>) {
        let path = root.join(dir);
        fs::create_dir_all(&path).unwrap();
        if let Some(content) = prefs {
            fs::write(preferences_path(&path), content).unwrap();
        }
    }

    #[test]
    fn profile_dir_name_pattern() {
        assert!(is_profile_dir_name("Default"));
        assert!(is_profile_dir_name("Profile 1"));
        assert!(is_profile_dir_name("Profile 12"));
        assert!(!is_profile_dir_name("Profile "));
        assert!(!is_profile_dir_name("Profile X"));
        assert!(!is_profile_dir_name("System Profile"));
        assert!(!is_profile_dir_name("Guest Profile"));
        assert!(!is_profile_dir_name("default"));
    }

    #[test]
    fn scan_missing_root_is_empty_and_logged() {
        let tmp = tempfile::TempDir::new().unwrap();
        let locator = ProfileLocator::new(tmp.path().join("nope"));
        let mut log = OpLog::new();
        assert!(locator.scan(&mut log).is_empty());
        assert!(log.has_errors());
    }

    #[test]
    fn scan_reads_names_and_falls_back() {
        let tmp = tempfile::TempDir::new().unwrap();
        make_profile(tmp.path(), "Default", Some(r#"{"profile":{"name":"Personal"}}"#));
        make_profile(tmp.path(), "Profile 1", Some("{broken"));
        make_profile(tmp.path(), "Profile 2", None);
        make_profile(tmp.path(), "Profile 3", Some(r#"{"profile":{}}"#));
        make_profile(tmp.path(), "System Profile", Some(r#"{"profile":{"name":"Sys"}}"#));
        fs::write(tmp.path().join("Profile 9"), "not a dir").unwrap();

        let mut log = OpLog::new();
        let profiles = ProfileLocator::new(tmp.path().to_path_buf()).scan(&mut log);

        let names: Vec<_> = profiles.keys().cloned().collect();
        assert_eq!(names, vec!["Personal", "Profile 1", "Profile 2", "Profile 3"]);
        assert_eq!(profiles["Personal"].dir_name, "Default");
        assert!(log.contains("Could not decode Preferences JSON for profile 'Profile 1'"));
        assert!(log.contains("Preferences file not found for profile 'Profile 2'"));
    }

    #[test]
    fn scan_disambiguates_duplicate_names() {
        let tmp = tempfile::TempDir::new().unwrap();
        let prefs = r#"{"profile":{"name":"Work"}}"#;
        make_profile(tmp.path(), "Default", Some(prefs));
        make_profile(tmp.path(), "Profile 1", Some(prefs));
        make_profile(tmp.path(), "Profile 2", Some(prefs));

        let profiles = ProfileLocator::new(tmp.path().to_path_buf()).scan(&mut OpLog::new());
        assert_eq!(profiles["Work"].dir_name, "Default");
        assert_eq!(profiles["Work (2)"].dir_name, "Profile 1");
        assert_eq!(profiles["Work (3)"].dir_name, "Profile 2");
    }

    #[test]
    fn find_profile_by_name_or_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        make_profile(tmp.path(), "Default", Some(r#"{"profile":{"name":"Personal"}}"#));
        let profiles = ProfileLocator::new(tmp.path().to_path_buf()).scan(&mut OpLog::new());

        assert_eq!(find_profile(&profiles, "Personal").unwrap().dir_name, "Default");
        assert_eq!(find_profile(&profiles, "Default").unwrap().name, "Personal");
        assert!(matches!(
            find_profile(&profiles, "Other"),
            Err(ExtKeeperError::ProfileNotFound { .. })
        ));
    }
}
