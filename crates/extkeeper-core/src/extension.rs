//! Installed-extension inventory
//!
//! Extension metadata comes from `extensions.settings.<id>` in the profile's
//! `Preferences`. When an entry carries an inline `manifest` object, that
//! manifest is authoritative. Only entries without one fall back to
//! `Extensions/<id>/<version>/manifest.json` on disk. The two are never mixed
//! for the same id; the asset folder is consulted for an inline manifest only
//! to read its `_locales` message table.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExtKeeperError;
use crate::naming::unique_name;
use crate::oplog::OpLog;
use crate::prefs::PreferencesDocument;

pub const EXTENSIONS_DIR: &str = "Extensions";
pub const EXTENSION_ID_LEN: usize = 32;

const MANIFEST_FILE: &str = "manifest.json";
const LOCALES_DIR: &str = "_locales";
const MESSAGES_FILE: &str = "messages.json";
const MSG_PREFIX: &str = "__MSG_";
const MSG_SUFFIX: &str = "__";

/// Message keys commonly used for an extension's name
const NAME_KEY_FRAGMENTS: &[&str] = &[
    "extensionName",
    "extension_name",
    "appName",
    "app_name",
    "extName",
    "ext_name",
];

/// Display name → record, sorted by display name
pub type ExtensionMap = BTreeMap<String, ExtensionRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionState {
    Disabled = 0,
    Enabled = 1,
}

impl ExtensionState {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    /// Anything other than `1` (including a missing field) reads as disabled
    pub fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_i64) {
            Some(1) => Self::Enabled,
            _ => Self::Disabled,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Enabled => "Enabled",
            Self::Disabled => "Disabled",
        }
    }
}

impl std::fmt::Display for ExtensionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Where the manifest fields of a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestSource {
    Inline,
    AssetFolder,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub id: String,
    pub display_name: String,
    pub version: String,
    pub state: ExtensionState,
    pub permissions: Vec<String>,
    pub install_path: String,
    pub installed_by_default: bool,
    pub manifest_source: ManifestSource,
}

impl ExtensionRecord {
    pub fn is_enabled(&self) -> bool {
        self.state == ExtensionState::Enabled
    }
}

/// Extension ids are exactly 32 characters in `a`..=`p`; other keys are noise
pub fn is_extension_id(key: &str) -> bool {
    key.len() == EXTENSION_ID_LEN && key.bytes().all(|b| (b'a'..=b'p').contains(&b))
}

/// On-disk asset folder of an extension: `<profile>/Extensions/<id>`
pub fn asset_folder(profile_dir: &Path, id: &str) -> PathBuf {
    profile_dir.join(EXTENSIONS_DIR).join(id)
}

/// List the extensions of a profile
///
/// A missing or malformed `Preferences` is logged (the two cases with
/// distinct messages) and yields an empty map.
pub fn list_extensions(profile_dir: &Path, log: &mut OpLog) -> ExtensionMap {
    let label = dir_label(profile_dir);
    let doc = match PreferencesDocument::load(profile_dir) {
        Ok(doc) => doc,
        Err(ExtKeeperError::PreferencesNotFound { .. }) => {
            log.error(format!("Preferences file not found for profile: {}", label));
            return ExtensionMap::new();
        }
        Err(ExtKeeperError::JsonParse { message, .. }) => {
            log.error(format!(
                "Error decoding Preferences JSON for {}: {}",
                label, message
            ));
            return ExtensionMap::new();
        }
        Err(e) => {
            log.error(format!("Error reading extensions for {}: {}", label, e));
            return ExtensionMap::new();
        }
    };

    let settings = match doc.settings() {
        Some(s) if !s.is_empty() => s,
        _ => {
            log.info(format!(
                "No extensions found in Preferences for profile: {}",
                label
            ));
            return ExtensionMap::new();
        }
    };

    let mut extensions = ExtensionMap::new();
    for (id, entry) in settings {
        if !is_extension_id(id) {
            log.warn(format!("Skipping invalid extension ID: {}", id));
            continue;
        }
        let record = build_record(profile_dir, id, entry);
        let name = unique_name(&extensions, &record.display_name);
        extensions.insert(
            name.clone(),
            ExtensionRecord {
                display_name: name,
                ..record
            },
        );
    }

    log.info(format!(
        "Found {} extensions for profile: {}",
        extensions.len(),
        label
    ));
    extensions
}

/// Find a record by display name or by id
pub fn find_extension<'a>(
    extensions: &'a ExtensionMap,
    query: &str,
) -> Option<&'a ExtensionRecord> {
    extensions
        .get(query)
        .or_else(|| extensions.values().find(|r| r.id == query))
}

/// Build one record from a settings entry
pub fn build_record(profile_dir: &Path, id: &str, entry: &Value) -> ExtensionRecord {
    let version_dir = version_dir(profile_dir, id, entry);

    let (manifest, source) = match entry.get("manifest").and_then(Value::as_object) {
        Some(inline) => (inline.clone(), ManifestSource::Inline),
        None => match version_dir.as_deref().and_then(read_folder_manifest) {
            Some(on_disk) => (on_disk, ManifestSource::AssetFolder),
            None => (Map::new(), ManifestSource::Missing),
        },
    };

    let display_name = resolve_display_name(id, &manifest, version_dir.as_deref());
    let version = manifest
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("N/A")
        .to_string();
    let permissions = manifest
        .get("permissions")
        .and_then(Value::as_array)
        .map(|perms| perms.iter().map(permission_label).collect())
        .unwrap_or_default();

    ExtensionRecord {
        id: id.to_string(),
        display_name,
        version,
        state: ExtensionState::from_value(entry.get("state")),
        permissions,
        install_path: entry
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or("N/A")
            .to_string(),
        installed_by_default: entry
            .get("was_installed_by_default")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        manifest_source: source,
    }
}

/// Permissions are usually strings; object-form entries are kept as JSON text
fn permission_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve a manifest name, expanding `__MSG_key__` placeholders
///
/// Lookup order: the `default_locale` message table under `version_dir`,
/// then the placeholder key with the marker and common name-key fragments
/// stripped, then the id.
pub fn resolve_display_name(id: &str, manifest: &Map<String, Value>, version_dir: Option<&Path>) -> String {
    let raw = match manifest.get("name").and_then(Value::as_str).map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return id.to_string(),
    };

    let key = match placeholder_key(raw) {
        Some(key) => key,
        None => return raw.to_string(),
    };

    let locale = manifest.get("default_locale").and_then(Value::as_str);
    if let (Some(dir), Some(locale)) = (version_dir, locale) {
        if let Some(message) = lookup_message(dir, locale, key) {
            return message;
        }
    }

    let mut cleaned = key.to_string();
    for fragment in NAME_KEY_FRAGMENTS {
        cleaned = cleaned.replace(fragment, "");
    }
    let cleaned = cleaned.trim_matches(|c: char| c == '_' || c.is_whitespace());
    if cleaned.is_empty() {
        id.to_string()
    } else {
        cleaned.to_string()
    }
}

fn placeholder_key(name: &str) -> Option<&str> {
    name.strip_prefix(MSG_PREFIX)
        .and_then(|rest| rest.strip_suffix(MSG_SUFFIX))
}

/// Read `_locales/<locale>/messages.json` and look up `key` (case-insensitive)
fn lookup_message(version_dir: &Path, locale: &str, key: &str) -> Option<String> {
    let path = version_dir
        .join(LOCALES_DIR)
        .join(locale)
        .join(MESSAGES_FILE);
    let content = fs::read_to_string(path).ok()?;
    let messages: Map<String, Value> = serde_json::from_str(&content).ok()?;
    messages
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .and_then(|(_, v)| v.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
}

/// Locate the installed version directory of an extension
///
/// Uses the entry's `path` (relative to `Extensions`, or absolute for
/// unpacked extensions), else the highest-sorting subdirectory of the asset
/// folder.
fn version_dir(profile_dir: &Path, id: &str, entry: &Value) -> Option<PathBuf> {
    if let Some(path) = entry.get("path").and_then(Value::as_str) {
        let candidate = Path::new(path);
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            profile_dir.join(EXTENSIONS_DIR).join(candidate)
        };
        if resolved.is_dir() {
            return Some(resolved);
        }
    }

    let folder = asset_folder(profile_dir, id);
    let mut versions: Vec<PathBuf> = fs::read_dir(&folder)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    versions.sort();
    versions.pop()
}

fn read_folder_manifest(version_dir: &Path) -> Option<Map<String, Value>> {
    let content = fs::read_to_string(version_dir.join(MANIFEST_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}

fn dir_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
