//! Profile `Preferences` document
//!
//! The document is held as an untyped ordered JSON tree so that keys this
//! crate never touches round-trip untouched. Only `profile.name` is read and
//! only `extensions.settings` (or one entry under it) is ever written.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Serializer, Value};

use crate::error::{ExtKeeperError, Result};

pub const PREFERENCES_FILE: &str = "Preferences";
const BACKUP_SUFFIX: &str = ".bak";
const RESTORE_SUFFIX: &str = ".restore";

/// Path of the `Preferences` file inside a profile directory
pub fn preferences_path(profile_dir: &Path) -> PathBuf {
    profile_dir.join(PREFERENCES_FILE)
}

/// Path of the `.bak` sibling written before every mutation
pub fn backup_path(profile_dir: &Path) -> PathBuf {
    profile_dir.join(format!("{}{}", PREFERENCES_FILE, BACKUP_SUFFIX))
}

/// Copy `Preferences` to `Preferences.bak`
pub fn create_backup(profile_dir: &Path) -> Result<PathBuf> {
    let src = preferences_path(profile_dir);
    let dst = backup_path(profile_dir);
    fs::copy(&src, &dst).map_err(|source| ExtKeeperError::CopyFailed {
        from: src,
        to: dst.clone(),
        source,
    })?;
    Ok(dst)
}

/// Put `Preferences.bak` back in place of `Preferences`
///
/// The copy goes to a sibling file that is then renamed over `Preferences`,
/// so a damaged or unwritable original is replaced rather than rewritten.
pub fn restore_backup(profile_dir: &Path) -> Result<()> {
    let src = backup_path(profile_dir);
    let dst = preferences_path(profile_dir);
    if !src.exists() {
        return Err(ExtKeeperError::PreferencesNotFound { path: src });
    }
    let staged = profile_dir.join(format!("{}{}", PREFERENCES_FILE, RESTORE_SUFFIX));
    let copy_err = |to: &Path, source| ExtKeeperError::CopyFailed {
        from: src.clone(),
        to: to.to_path_buf(),
        source,
    };
    if staged.exists() {
        fs::remove_file(&staged).map_err(|e| copy_err(&staged, e))?;
    }
    fs::copy(&src, &staged).map_err(|e| copy_err(&staged, e))?;
    fs::rename(&staged, &dst).map_err(|e| copy_err(&dst, e))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PreferencesDocument {
    path: PathBuf,
    root: Value,
    /// Indent unit of a pretty-printed file; `None` for compact JSON
    indent: Option<String>,
}

impl PreferencesDocument {
    /// Load and parse `<profile_dir>/Preferences`
    pub fn load(profile_dir: &Path) -> Result<Self> {
        let path = preferences_path(profile_dir);
        if !path.is_file() {
            return Err(ExtKeeperError::PreferencesNotFound { path });
        }
        let content = fs::read_to_string(&path)?;
        Self::parse(path, &content)
    }

    pub fn parse(path: PathBuf, content: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(content).map_err(|e| ExtKeeperError::json(&path, e))?;
        // Chrome writes compact JSON; keep whatever layout we found.
        let indent = detect_indent(content);
        Ok(Self { path, root, indent })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Custom profile name, if set and non-blank
    pub fn profile_name(&self) -> Option<&str> {
        self.root
            .pointer("/profile/name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The `extensions.settings` mapping, if present
    pub fn settings(&self) -> Option<&Map<String, Value>> {
        self.root
            .get("extensions")
            .and_then(|e| e.get("settings"))
            .and_then(Value::as_object)
    }

    pub fn settings_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.root
            .get_mut("extensions")
            .and_then(|e| e.get_mut("settings"))
            .and_then(Value::as_object_mut)
    }

    /// Raw settings subtree, `{}` if absent
    pub fn settings_value(&self) -> Value {
        self.settings()
            .map(|m| Value::Object(m.clone()))
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    pub fn extension_entry(&self, id: &str) -> Option<&Value> {
        self.settings().and_then(|s| s.get(id))
    }

    /// Get `extensions.settings`, creating `extensions` and `settings` if missing
    pub fn ensure_settings(&mut self) -> Result<&mut Map<String, Value>> {
        let path = self.path.clone();
        let root = self.root_object_mut()?;
        let extensions = root
            .entry("extensions")
            .or_insert_with(|| Value::Object(Map::new()));
        if !extensions.is_object() {
            *extensions = Value::Object(Map::new());
        }
        let settings = extensions
            .as_object_mut()
            .map(|e| e.entry("settings").or_insert_with(|| Value::Object(Map::new())));
        match settings {
            Some(Value::Object(map)) => Ok(map),
            _ => Err(ExtKeeperError::MissingSettings { path }),
        }
    }

    /// Replace the whole `extensions.settings` subtree
    pub fn replace_settings(&mut self, settings: Value) -> Result<()> {
        let path = self.path.clone();
        let root = self.root_object_mut()?;
        let extensions = root
            .entry("extensions")
            .or_insert_with(|| Value::Object(Map::new()));
        if !extensions.is_object() {
            *extensions = Value::Object(Map::new());
        }
        match extensions.as_object_mut() {
            Some(ext) => {
                ext.insert("settings".to_string(), settings);
                Ok(())
            }
            None => Err(ExtKeeperError::MissingSettings { path }),
        }
    }

    fn root_object_mut(&mut self) -> Result<&mut Map<String, Value>> {
        let path = self.path.clone();
        self.root.as_object_mut().ok_or(ExtKeeperError::JsonParse {
            path,
            message: "top-level value is not an object".to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let indent = match &self.indent {
            Some(indent) => indent,
            None => {
                return serde_json::to_string(&self.root)
                    .map_err(|e| ExtKeeperError::json(&self.path, e))
            }
        };
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(indent.as_bytes());
        let mut ser = Serializer::with_formatter(&mut buf, formatter);
        self.root
            .serialize(&mut ser)
            .map_err(|e| ExtKeeperError::json(&self.path, e))?;
        String::from_utf8(buf).map_err(|e| ExtKeeperError::JsonParse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Rewrite the file in place over the same handle
    ///
    /// Serialization happens before the file is opened. A failure after the
    /// open can leave the file truncated; callers restore from `.bak`.
    pub fn save(&self) -> Result<()> {
        let content = self.to_json()?;
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.set_len(content.len() as u64)?;
        file.flush()?;
        Ok(())
    }
}

/// Leading whitespace of the first indented line, if the text spans lines
fn detect_indent(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if !trimmed.contains('\n') {
        return None;
    }
    let indent = trimmed
        .lines()
        .skip(1)
        .map(|line| {
            line.chars()
                .take_while(|c| *c == ' ' || *c == '\t')
                .collect::<String>()
        })
        .find(|ws| !ws.is_empty())
        .unwrap_or_else(|| "  ".to_string());
    Some(indent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_prefs(dir: &Path, content: &str) {
        fs::write(preferences_path(dir), content).unwrap();
    }

    #[test]
    fn load_missing_is_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = PreferencesDocument::load(tmp.path()).unwrap_err();
        assert!(matches!(err, ExtKeeperError::PreferencesNotFound { .. }));
    }

    #[test]
    fn load_malformed_is_parse_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_prefs(tmp.path(), "{ not json");
        let err = PreferencesDocument::load(tmp.path()).unwrap_err();
        assert!(matches!(err, ExtKeeperError::JsonParse { .. }));
    }

    #[test]
    fn profile_name_ignores_blank() {
        let doc = PreferencesDocument::parse(
            PathBuf::from("P"),
            r#"{"profile":{"name":"   "}}"#,
        )
        .unwrap();
        assert!(doc.profile_name().is_none());

        let doc =
            PreferencesDocument::parse(PathBuf::from("P"), r#"{"profile":{"name":"Work"}}"#)
                .unwrap();
        assert_eq!(doc.profile_name(), Some("Work"));
    }

    #[test]
    fn save_preserves_unrelated_keys_and_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let original = r#"{"zeta":1,"alpha":{"b":2,"a":1.50},"extensions":{"settings":{"x":{"state":1}}},"mid":[3,2,1]}"#;
        write_prefs(tmp.path(), original);

        let mut doc = PreferencesDocument::load(tmp.path()).unwrap();
        doc.settings_mut().unwrap()["x"]["state"] = json!(0);
        doc.save().unwrap();

        let written = fs::read_to_string(preferences_path(tmp.path())).unwrap();
        assert_eq!(
            written,
            r#"{"zeta":1,"alpha":{"b":2,"a":1.50},"extensions":{"settings":{"x":{"state":0}}},"mid":[3,2,1]}"#
        );
    }

    #[test]
    fn save_keeps_four_space_indent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let original = "{\n    \"keep\": [\n        1\n    ],\n    \"extensions\": {\n        \"settings\": {}\n    }\n}";
        write_prefs(tmp.path(), original);

        let mut doc = PreferencesDocument::load(tmp.path()).unwrap();
        doc.ensure_settings().unwrap();
        doc.save().unwrap();

        assert_eq!(
            fs::read_to_string(preferences_path(tmp.path())).unwrap(),
            original
        );
    }

    #[test]
    fn detect_indent_variants() {
        assert_eq!(detect_indent(r#"{"a":1}"#), None);
        assert_eq!(detect_indent("{\n  \"a\": 1\n}").as_deref(), Some("  "));
        assert_eq!(detect_indent("{\n\t\"a\": 1\n}").as_deref(), Some("\t"));
    }

    #[test]
    fn save_truncates_shorter_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_prefs(
            tmp.path(),
            r#"{"extensions":{"settings":{"x":{"state":1,"padding":"aaaaaaaaaaaaaaaa"}}}}"#,
        );
        let mut doc = PreferencesDocument::load(tmp.path()).unwrap();
        doc.settings_mut().unwrap().remove("x");
        doc.save().unwrap();

        let reloaded = PreferencesDocument::load(tmp.path()).unwrap();
        assert!(reloaded.settings().unwrap().is_empty());
    }

    #[test]
    fn ensure_settings_creates_structure() {
        let mut doc = PreferencesDocument::parse(PathBuf::from("P"), r#"{"a":1}"#).unwrap();
        assert!(doc.settings().is_none());
        doc.ensure_settings().unwrap().insert("id".into(), json!({}));
        assert!(doc.extension_entry("id").is_some());
        assert_eq!(doc.root()["a"], json!(1));
    }

    #[test]
    fn backup_and_restore_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_prefs(tmp.path(), r#"{"v":1}"#);
        let bak = create_backup(tmp.path()).unwrap();
        assert_eq!(bak, backup_path(tmp.path()));

        write_prefs(tmp.path(), "garbage");
        restore_backup(tmp.path()).unwrap();
        let content = fs::read_to_string(preferences_path(tmp.path())).unwrap();
        assert_eq!(content, r#"{"v":1}"#);
        assert!(backup_path(tmp.path()).exists());
        assert!(!tmp.path().join("Preferences.restore").exists());
    }
}
