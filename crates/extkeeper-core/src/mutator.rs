//! Read-modify-write edits to a profile's `Preferences`
//!
//! Every edit follows the same shape: copy `Preferences` to `Preferences.bak`,
//! parse, mutate the in-memory tree, write back over the same file. A parse
//! or write failure triggers an attempt to copy `.bak` back, and the outcome
//! of that recovery is logged.
//!
//! None of this takes a lock. The browser must be closed while these run,
//! otherwise it may overwrite the file with its own in-memory copy.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::WalkDir;

use crate::browser::Browser;
use crate::error::{ExtKeeperError, Result};
use crate::extension::{asset_folder, is_extension_id, list_extensions, ExtensionState};
use crate::oplog::OpLog;
use crate::prefs::{self, preferences_path, PreferencesDocument};
use crate::profile::Profile;

/// Per-profile result inside a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileStatus {
    Done,
    NothingToDo,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ProfileOutcome {
    pub profile: String,
    pub status: ProfileStatus,
}

/// Aggregate result of an install/remove across profiles
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    pub succeeded: usize,
    pub outcomes: Vec<ProfileOutcome>,
}

impl FanOutReport {
    fn record(&mut self, profile: &str, status: ProfileStatus) {
        if status == ProfileStatus::Done {
            self.succeeded += 1;
        }
        self.outcomes.push(ProfileOutcome {
            profile: profile.to_string(),
            status,
        });
    }

    pub fn failed(&self) -> impl Iterator<Item = &ProfileOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ProfileStatus::Failed(_)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOutcome {
    /// False when the target already had the asset folder
    pub folder_copied: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub settings_removed: bool,
    pub folder_removed: bool,
}

impl RemoveOutcome {
    pub fn removed_anything(&self) -> bool {
        self.settings_removed || self.folder_removed
    }
}

/// Standalone backup of a profile's `extensions.settings`
///
/// Older bundles used `source_profile` and `extensions`; both are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupBundle {
    #[serde(default, alias = "source_profile")]
    pub source_profile_folder: String,
    #[serde(default)]
    pub backup_date: String,
    #[serde(default, alias = "extensions")]
    pub extensions_settings: Option<Value>,
}

// =========================================================================
// Transaction helper
// =========================================================================

/// Run one backup → parse → edit → write cycle
///
/// `edit` returns its value and whether the document changed; an unchanged
/// document is not rewritten.
fn edit_preferences<T>(
    profile_dir: &Path,
    log: &mut OpLog,
    edit: impl FnOnce(&mut PreferencesDocument, &mut OpLog) -> Result<(T, bool)>,
) -> Result<T> {
    let prefs_path = preferences_path(profile_dir);
    if !prefs_path.is_file() {
        log.error(format!(
            "Error: Preferences file not found at {}",
            prefs_path.display()
        ));
        return Err(ExtKeeperError::PreferencesNotFound { path: prefs_path });
    }

    let backed_up = match prefs::create_backup(profile_dir) {
        Ok(path) => {
            log.info(format!("Backup of Preferences created at {}", path.display()));
            true
        }
        Err(e) => {
            log.warn(format!(
                "Warning: Could not create backup of Preferences file: {}",
                e
            ));
            false
        }
    };

    let mut doc = match PreferencesDocument::load(profile_dir) {
        Ok(doc) => doc,
        Err(e) => {
            log.error(format!("Error decoding Preferences JSON: {}", e));
            if backed_up {
                recover(profile_dir, log);
            }
            return Err(e);
        }
    };

    let (value, changed) = edit(&mut doc, log)?;
    if !changed {
        return Ok(value);
    }

    if let Err(e) = doc.save() {
        log.error(format!("Error writing Preferences file: {}", e));
        if backed_up {
            recover(profile_dir, log);
        }
        return Err(e);
    }

    Ok(value)
}

fn recover(profile_dir: &Path, log: &mut OpLog) {
    match prefs::restore_backup(profile_dir) {
        Ok(()) => log.warn("Restored Preferences from backup due to error."),
        Err(e) => log.error(format!(
            "FATAL: Could not restore Preferences from backup: {}",
            e
        )),
    }
}

/// Refuse anything that is not a real extension id before it becomes a path
fn checked_id(ext_id: &str, log: &mut OpLog) -> Result<()> {
    if is_extension_id(ext_id) {
        return Ok(());
    }
    log.error(format!("Error: '{}' is not a valid extension ID.", ext_id));
    Err(ExtKeeperError::InvalidExtensionId {
        id: ext_id.to_string(),
    })
}

// =========================================================================
// Single-profile operations
// =========================================================================

/// Set `extensions.settings.<id>.state`, touching nothing else
pub fn set_extension_state(
    profile_dir: &Path,
    ext_id: &str,
    state: ExtensionState,
    log: &mut OpLog,
) -> Result<()> {
    edit_preferences(profile_dir, log, |doc, log| {
        let path = doc.path().to_path_buf();
        let settings = match doc.settings_mut() {
            Some(s) => s,
            None => {
                log.error(format!(
                    "Error: 'extensions.settings' structure not found in Preferences for {}.",
                    ext_id
                ));
                return Err(ExtKeeperError::MissingSettings { path });
            }
        };
        match settings.get_mut(ext_id).and_then(Value::as_object_mut) {
            Some(entry) => {
                entry.insert("state".to_string(), Value::from(state.as_i64()));
                Ok(((), true))
            }
            None => {
                log.error(format!(
                    "Error: Extension ID {} not found in Preferences.",
                    ext_id
                ));
                Err(ExtKeeperError::ExtensionNotFound {
                    id: ext_id.to_string(),
                })
            }
        }
    })?;

    log.info(format!(
        "Successfully set state to {} for extension {} in profile {}",
        state,
        ext_id,
        dir_label(profile_dir)
    ));
    Ok(())
}

/// Disable every enabled extension that was not installed by default
///
/// Returns the number of extensions disabled.
pub fn disable_non_default(profile_dir: &Path, log: &mut OpLog) -> usize {
    let targets: Vec<String> = list_extensions(profile_dir, log)
        .into_values()
        .filter(|r| r.is_enabled() && !r.installed_by_default)
        .map(|r| r.id)
        .collect();

    let mut disabled = 0;
    for id in targets {
        log.info(format!("Disabling {}...", id));
        if set_extension_state(profile_dir, &id, ExtensionState::Disabled, log).is_ok() {
            disabled += 1;
        }
    }
    log.info(format!(
        "{} extensions were disabled. Restart the browser if it was running.",
        disabled
    ));
    disabled
}

/// Read the full settings entry for `ext_id` from a profile
pub fn read_settings_entry(profile_dir: &Path, ext_id: &str) -> Result<Value> {
    let doc = PreferencesDocument::load(profile_dir)?;
    doc.extension_entry(ext_id)
        .cloned()
        .ok_or_else(|| ExtKeeperError::ExtensionNotFound {
            id: ext_id.to_string(),
        })
}

/// Install an extension from `source_dir` into `target_dir`
pub fn install_extension_entry(
    source_dir: &Path,
    target_dir: &Path,
    ext_id: &str,
    log: &mut OpLog,
) -> Result<InstallOutcome> {
    checked_id(ext_id, log)?;
    let entry = read_settings_entry(source_dir, ext_id).map_err(|e| {
        log.error(format!("Could not read source entry for {}: {}", ext_id, e));
        e
    })?;
    install_entry(source_dir, target_dir, ext_id, &entry, log)
}

/// Copy the asset folder (unless present), then insert the settings entry
fn install_entry(
    source_dir: &Path,
    target_dir: &Path,
    ext_id: &str,
    entry: &Value,
    log: &mut OpLog,
) -> Result<InstallOutcome> {
    checked_id(ext_id, log)?;
    let src = asset_folder(source_dir, ext_id);
    let dst = asset_folder(target_dir, ext_id);

    let folder_copied = if dst.exists() {
        log.info("    - Extension folder already exists. Skipping copy.");
        false
    } else {
        if !src.is_dir() {
            log.error(format!(
                "    - Error: source extension folder missing: {}",
                src.display()
            ));
            return Err(ExtKeeperError::AssetFolderNotFound { path: src });
        }
        if let Err(e) = copy_dir_recursive(&src, &dst) {
            log.error(format!("    - Error copying extension folder: {}", e));
            // A leftover folder would be skipped as "already exists" next time
            if dst.exists() {
                if let Err(cleanup) = fs::remove_dir_all(&dst) {
                    log.warn(format!(
                        "    - Warning: could not remove partial copy at {}: {}",
                        dst.display(),
                        cleanup
                    ));
                }
            }
            return Err(e);
        }
        log.info("    - Extension folder copied.");
        true
    };

    edit_preferences(target_dir, log, |doc, _| {
        doc.ensure_settings()?
            .insert(ext_id.to_string(), entry.clone());
        Ok(((), true))
    })?;
    log.info("    - Preferences entry written.");

    Ok(InstallOutcome { folder_copied })
}

/// Remove the settings entry and the asset folder, each if present
///
/// Succeeds when at least one of the two was removed, or when neither
/// existed. Fails only when nothing was removed and something went wrong.
pub fn remove_extension_entry(
    profile_dir: &Path,
    ext_id: &str,
    log: &mut OpLog,
) -> Result<RemoveOutcome> {
    checked_id(ext_id, log)?;
    let mut outcome = RemoveOutcome::default();
    let mut first_error = None;

    if preferences_path(profile_dir).is_file() {
        let removed = edit_preferences(profile_dir, log, |doc, _| {
            let removed = doc
                .settings_mut()
                .map(|s| s.shift_remove(ext_id).is_some())
                .unwrap_or(false);
            Ok((removed, removed))
        });
        match removed {
            Ok(true) => {
                log.info("    - Preferences entry removed.");
                outcome.settings_removed = true;
            }
            Ok(false) => log.info("    - No Preferences entry for this extension."),
            Err(e) => first_error = Some(e),
        }
    } else {
        log.warn("    - Preferences file not found; checking extension folder only.");
    }

    let folder = asset_folder(profile_dir, ext_id);
    if folder.exists() {
        match fs::remove_dir_all(&folder) {
            Ok(()) => {
                log.info("    - Extension folder deleted.");
                outcome.folder_removed = true;
            }
            Err(e) => {
                log.error(format!("    - Error deleting folder: {}", e));
                first_error.get_or_insert(ExtKeeperError::Io(e));
            }
        }
    }

    match first_error {
        Some(e) if !outcome.removed_anything() => Err(e),
        _ => {
            if !outcome.removed_anything() {
                log.info("    - Extension not found in this profile.");
            }
            Ok(outcome)
        }
    }
}

// =========================================================================
// Fan-out
// =========================================================================

/// Install `ext_id` from `source` into every other profile in `targets`
///
/// A missing source entry is fatal and nothing is written. Each target is
/// otherwise independent: a failure is logged and the loop moves on.
pub fn install_to_profiles<'a>(
    source: &Profile,
    targets: impl IntoIterator<Item = &'a Profile>,
    ext_id: &str,
    log: &mut OpLog,
) -> Result<FanOutReport> {
    checked_id(ext_id, log)?;
    let entry = read_settings_entry(&source.path, ext_id).map_err(|e| {
        log.error(format!(
            "Cannot install {}: not readable from source profile '{}': {}",
            ext_id, source.name, e
        ));
        e
    })?;

    log.info(format!(
        "Starting installation of {} from '{}'...",
        ext_id, source.name
    ));
    let mut report = FanOutReport::default();
    for target in targets {
        if target.path == source.path {
            continue;
        }
        log.info(format!("-> Installing to '{}'...", target.name));
        let status = match install_entry(&source.path, &target.path, ext_id, &entry, log) {
            Ok(_) => ProfileStatus::Done,
            Err(e) => {
                log.error(format!("    - Failed for '{}': {}", target.name, e));
                ProfileStatus::Failed(e.to_string())
            }
        };
        report.record(&target.name, status);
    }

    log.info(format!(
        "Finished! Installed {} to {} other profiles.",
        ext_id, report.succeeded
    ));
    Ok(report)
}

/// Remove `ext_id` from every profile in `targets`
pub fn remove_from_profiles<'a>(
    targets: impl IntoIterator<Item = &'a Profile>,
    ext_id: &str,
    log: &mut OpLog,
) -> FanOutReport {
    log.info(format!("Starting uninstallation of {}...", ext_id));
    let mut report = FanOutReport::default();
    for target in targets {
        log.info(format!("-> Checking profile '{}'...", target.name));
        let status = match remove_extension_entry(&target.path, ext_id, log) {
            Ok(outcome) if outcome.removed_anything() => ProfileStatus::Done,
            Ok(_) => ProfileStatus::NothingToDo,
            Err(e) => {
                log.error(format!("    - Failed for '{}': {}", target.name, e));
                ProfileStatus::Failed(e.to_string())
            }
        };
        report.record(&target.name, status);
    }
    log.info(format!(
        "Finished! Uninstalled {} from {} profiles.",
        ext_id, report.succeeded
    ));
    report
}

// =========================================================================
// Backup / restore
// =========================================================================

/// Suggested backup file name: `<browser>_extensions_backup_<dir>_<YYYYMMDD>.json`
pub fn suggested_backup_name(browser: Browser, profile: &Profile) -> String {
    format!(
        "{}_extensions_backup_{}_{}.json",
        browser.id(),
        profile.dir_name.replace(' ', "_"),
        Local::now().format("%Y%m%d")
    )
}

/// Write the profile's `extensions.settings` to a standalone bundle
pub fn backup(profile_dir: &Path, destination: &Path, log: &mut OpLog) -> Result<BackupBundle> {
    log.info(format!(
        "Backing up extensions from {} to {}...",
        dir_label(profile_dir),
        destination.display()
    ));

    let doc = PreferencesDocument::load(profile_dir).map_err(|e| {
        log.error(format!("Backup failed: {}", e));
        e
    })?;

    let bundle = BackupBundle {
        source_profile_folder: dir_label(profile_dir),
        backup_date: Local::now().to_rfc3339(),
        extensions_settings: Some(doc.settings_value()),
    };

    let content =
        serde_json::to_string_pretty(&bundle).map_err(|e| ExtKeeperError::json(destination, e))?;
    fs::write(destination, content).map_err(|e| {
        log.error(format!("Backup failed: I/O error writing backup file. {}", e));
        ExtKeeperError::Io(e)
    })?;

    log.info(format!(
        "Backup successful! Saved to {}",
        destination.display()
    ));
    Ok(bundle)
}

/// Parse and validate a bundle file
pub fn read_bundle(source_file: &Path) -> Result<(BackupBundle, Value)> {
    let content = fs::read_to_string(source_file)?;
    let bundle: BackupBundle =
        serde_json::from_str(&content).map_err(|e| ExtKeeperError::json(source_file, e))?;
    let settings = match &bundle.extensions_settings {
        Some(v) if v.is_object() => v.clone(),
        Some(Value::Null) | None => {
            return Err(ExtKeeperError::InvalidBackupFormat {
                message: "backup file is missing the 'extensions_settings' key or it is null"
                    .to_string(),
            })
        }
        Some(_) => {
            return Err(ExtKeeperError::InvalidBackupFormat {
                message: "'extensions_settings' is not an object".to_string(),
            })
        }
    };
    Ok((bundle, settings))
}

/// Replace the profile's whole `extensions.settings` with a bundle's contents
///
/// Returns the number of settings entries restored.
pub fn restore(profile_dir: &Path, source_file: &Path, log: &mut OpLog) -> Result<usize> {
    log.info(format!(
        "Restoring extensions to {} from {}...",
        dir_label(profile_dir),
        source_file.display()
    ));

    let (bundle, settings) = read_bundle(source_file).map_err(|e| {
        match &e {
            ExtKeeperError::Io(_) => log.error(format!("Restore failed: I/O error. {}", e)),
            ExtKeeperError::JsonParse { .. } => {
                log.error(format!("Restore failed: JSON error. {}", e))
            }
            ExtKeeperError::InvalidBackupFormat { .. } => {
                log.error(format!("Restore failed: invalid backup format. {}", e))
            }
            _ => log.error(format!("Restore failed: {}", e)),
        }
        e
    })?;

    let count = settings.as_object().map(|m| m.len()).unwrap_or(0);
    edit_preferences(profile_dir, log, |doc, _| {
        doc.replace_settings(settings)?;
        Ok(((), true))
    })?;

    log.info(format!(
        "Restore successful! {} entries from '{}'. Restart the browser to apply changes.",
        count, bundle.source_profile_folder
    ));
    Ok(count)
}

// =========================================================================
// Helpers
// =========================================================================

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    let copy_err = |from: &Path, to: &Path, source: std::io::Error| ExtKeeperError::CopyFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    fs::create_dir_all(dst).map_err(|e| copy_err(src, dst, e))?;

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| copy_err(src, dst, e.into()))?;
        let src_path = entry.path();
        let relative = match src_path.strip_prefix(src) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let dst_path: PathBuf = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dst_path).map_err(|e| copy_err(src_path, &dst_path, e))?;
        } else {
            if let Some(parent) = dst_path.parent() {
                fs::create_dir_all(parent).map_err(|e| copy_err(src_path, parent, e))?;
            }
            fs::copy(src_path, &dst_path).map_err(|e| copy_err(src_path, &dst_path, e))?;
        }
    }

    Ok(())
}

fn dir_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
