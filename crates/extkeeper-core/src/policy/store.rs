//! Policy store backends
//!
//! The store holds no cached copy: every call re-reads the backing namespace.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{parse_dword, PolicyValue};
use crate::error::{ExtKeeperError, Result};

/// Result of a removal; a missing value is benign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveStatus {
    Removed,
    NotFound,
}

/// Typed key/value access to machine-wide policy under one root scope
///
/// `scope` is a child path relative to the root (`""` for the root itself).
/// Writes need elevated privilege on real backends; a refusal surfaces as
/// [`ExtKeeperError::AccessDenied`].
pub trait PolicyStore {
    /// Root scope this store is bound to
    fn root(&self) -> &str;

    fn set_value(&self, scope: &str, name: &str, value: &PolicyValue) -> Result<()>;

    fn remove_value(&self, scope: &str, name: &str) -> Result<RemoveStatus>;

    /// `None` means "not configured", which is not an error
    fn get_value(&self, scope: &str, name: &str) -> Result<Option<PolicyValue>>;

    /// All values directly under `scope`, in store order
    fn list_values(&self, scope: &str) -> Result<Vec<(String, PolicyValue)>>;
}

/// Full key path for a child scope
pub(crate) fn scope_path(root: &str, scope: &str) -> String {
    if scope.is_empty() {
        root.to_string()
    } else {
        format!("{}\\{}", root, scope)
    }
}

fn map_write_error(e: io::Error) -> ExtKeeperError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        ExtKeeperError::AccessDenied
    } else {
        ExtKeeperError::Io(e)
    }
}

// =========================================================================
// JSON file backend
// =========================================================================

/// Policy namespace persisted as a JSON file
///
/// Layout: `{ "<root>\\<scope>": { "<name>": { "type": "dword", "value": 1 } } }`.
/// DWORD values written by hand as `"0x1"` or `"1"` are read back as numbers.
#[derive(Debug, Clone)]
pub struct JsonFilePolicyStore {
    path: PathBuf,
    root: String,
}

type Namespace = Map<String, Value>;

impl JsonFilePolicyStore {
    pub fn new(path: impl Into<PathBuf>, root: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            root: root.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Namespace> {
        if !self.path.exists() {
            return Ok(Namespace::new());
        }
        let content = fs::read_to_string(&self.path).map_err(map_write_error)?;
        if content.trim().is_empty() {
            return Ok(Namespace::new());
        }
        match serde_json::from_str(&content).map_err(|e| ExtKeeperError::json(&self.path, e))? {
            Value::Object(map) => Ok(map),
            _ => Err(ExtKeeperError::JsonParse {
                path: self.path.clone(),
                message: "top-level value is not an object".to_string(),
            }),
        }
    }

    /// Write through a sibling temp file and rename over the original
    fn store(&self, namespace: &Namespace) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(map_write_error)?;
            }
        }
        let content = serde_json::to_string_pretty(namespace)
            .map_err(|e| ExtKeeperError::json(&self.path, e))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, content).map_err(map_write_error)?;
        fs::rename(&tmp, &self.path).map_err(map_write_error)?;
        Ok(())
    }

    fn key(&self, scope: &str) -> String {
        scope_path(&self.root, scope)
    }
}

fn encode(value: &PolicyValue) -> Value {
    let mut entry = Map::new();
    entry.insert("type".to_string(), Value::from(value.kind().as_str()));
    let raw = match value {
        PolicyValue::String(s) => Value::from(s.as_str()),
        PolicyValue::Dword(n) => Value::from(*n),
    };
    entry.insert("value".to_string(), raw);
    Value::Object(entry)
}

fn decode(entry: &Value) -> Option<PolicyValue> {
    let raw = entry.get("value")?;
    match entry.get("type").and_then(Value::as_str) {
        Some("dword") => match raw {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => parse_dword(s),
            _ => None,
        }
        .map(PolicyValue::Dword),
        Some("string") => raw.as_str().map(|s| PolicyValue::String(s.to_string())),
        _ => None,
    }
}

impl PolicyStore for JsonFilePolicyStore {
    fn root(&self) -> &str {
        &self.root
    }

    fn set_value(&self, scope: &str, name: &str, value: &PolicyValue) -> Result<()> {
        let mut namespace = self.load()?;
        let key = namespace
            .entry(self.key(scope))
            .or_insert_with(|| Value::Object(Map::new()));
        if !key.is_object() {
            *key = Value::Object(Map::new());
        }
        if let Value::Object(values) = key {
            values.insert(name.to_string(), encode(value));
        }
        self.store(&namespace)?;
        tracing::debug!(scope, name, %value, "policy value set");
        Ok(())
    }

    fn remove_value(&self, scope: &str, name: &str) -> Result<RemoveStatus> {
        let mut namespace = self.load()?;
        let key = self.key(scope);
        let removed = match namespace.get_mut(&key).and_then(Value::as_object_mut) {
            Some(values) => values.shift_remove(name).is_some(),
            None => false,
        };
        if !removed {
            return Ok(RemoveStatus::NotFound);
        }
        let now_empty = namespace
            .get(&key)
            .and_then(Value::as_object)
            .map(Map::is_empty)
            .unwrap_or(false);
        if now_empty {
            namespace.shift_remove(&key);
        }
        self.store(&namespace)?;
        tracing::debug!(scope, name, "policy value removed");
        Ok(RemoveStatus::Removed)
    }

    fn get_value(&self, scope: &str, name: &str) -> Result<Option<PolicyValue>> {
        let namespace = self.load()?;
        Ok(namespace
            .get(&self.key(scope))
            .and_then(|values| values.get(name))
            .and_then(decode))
    }

    fn list_values(&self, scope: &str) -> Result<Vec<(String, PolicyValue)>> {
        let namespace = self.load()?;
        let values = match namespace.get(&self.key(scope)).and_then(Value::as_object) {
            Some(values) => values,
            None => return Ok(Vec::new()),
        };
        Ok(values
            .iter()
            .filter_map(|(name, entry)| decode(entry).map(|v| (name.clone(), v)))
            .collect())
    }
}

// =========================================================================
// Windows registry backend
// =========================================================================

#[cfg(windows)]
mod registry {
    use std::io;

    use winreg::enums::{RegType, HKEY_LOCAL_MACHINE, KEY_READ, KEY_SET_VALUE};
    use winreg::types::FromRegValue;
    use winreg::{RegKey, RegValue};

    use super::{map_write_error, scope_path, PolicyStore, RemoveStatus};
    use crate::error::{ExtKeeperError, Result};
    use crate::policy::PolicyValue;

    /// Policy namespace under `HKEY_LOCAL_MACHINE\<root>`
    #[derive(Debug, Clone)]
    pub struct RegistryPolicyStore {
        root: String,
    }

    impl RegistryPolicyStore {
        pub fn new(root: impl Into<String>) -> Self {
            Self { root: root.into() }
        }

        fn open(&self, scope: &str, flags: u32) -> Result<Option<RegKey>> {
            let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
            match hklm.open_subkey_with_flags(scope_path(&self.root, scope), flags) {
                Ok(key) => Ok(Some(key)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(map_write_error(e)),
            }
        }
    }

    fn decode(raw: &RegValue) -> Result<Option<PolicyValue>> {
        let value = match raw.vtype {
            RegType::REG_SZ | RegType::REG_EXPAND_SZ => {
                Some(PolicyValue::String(String::from_reg_value(raw)?))
            }
            RegType::REG_DWORD => Some(PolicyValue::Dword(u32::from_reg_value(raw)?)),
            _ => None,
        };
        Ok(value)
    }

    impl PolicyStore for RegistryPolicyStore {
        fn root(&self) -> &str {
            &self.root
        }

        fn set_value(&self, scope: &str, name: &str, value: &PolicyValue) -> Result<()> {
            let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
            let (key, _) = hklm
                .create_subkey(scope_path(&self.root, scope))
                .map_err(map_write_error)?;
            match value {
                PolicyValue::String(s) => key.set_value(name, s),
                PolicyValue::Dword(n) => key.set_value(name, n),
            }
            .map_err(map_write_error)?;
            tracing::debug!(scope, name, %value, "registry value set");
            Ok(())
        }

        fn remove_value(&self, scope: &str, name: &str) -> Result<RemoveStatus> {
            let key = match self.open(scope, KEY_SET_VALUE)? {
                Some(key) => key,
                None => return Ok(RemoveStatus::NotFound),
            };
            match key.delete_value(name) {
                Ok(()) => Ok(RemoveStatus::Removed),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RemoveStatus::NotFound),
                Err(e) => Err(map_write_error(e)),
            }
        }

        fn get_value(&self, scope: &str, name: &str) -> Result<Option<PolicyValue>> {
            let key = match self.open(scope, KEY_READ)? {
                Some(key) => key,
                None => return Ok(None),
            };
            match key.get_raw_value(name) {
                Ok(raw) => decode(&raw),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(map_write_error(e)),
            }
        }

        fn list_values(&self, scope: &str) -> Result<Vec<(String, PolicyValue)>> {
            let key = match self.open(scope, KEY_READ)? {
                Some(key) => key,
                None => return Ok(Vec::new()),
            };
            let mut values = Vec::new();
            for item in key.enum_values() {
                let (name, raw) = item.map_err(ExtKeeperError::Io)?;
                if let Some(value) = decode(&raw)? {
                    values.push((name, value));
                }
            }
            Ok(values)
        }
    }
}

#[cfg(windows)]
pub use registry::RegistryPolicyStore;

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = r"SOFTWARE\Policies\Google\Chrome";

    fn store(dir: &Path) -> JsonFilePolicyStore {
        JsonFilePolicyStore::new(dir.join("policies.json"), ROOT)
    }

    #[test]
    fn missing_file_is_unconfigured() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(tmp.path());
        assert_eq!(s.get_value("", "HomepageLocation").unwrap(), None);
        assert!(s.list_values("URLBlocklist").unwrap().is_empty());
    }

    #[test]
    fn set_get_remove_cycle() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(tmp.path());

        s.set_value("", "ShowHomeButton", &PolicyValue::Dword(1)).unwrap();
        s.set_value("", "HomepageLocation", &PolicyValue::String("https://example.com".into()))
            .unwrap();
        assert_eq!(
            s.get_value("", "ShowHomeButton").unwrap(),
            Some(PolicyValue::Dword(1))
        );

        assert_eq!(
            s.remove_value("", "ShowHomeButton").unwrap(),
            RemoveStatus::Removed
        );
        assert_eq!(
            s.remove_value("", "ShowHomeButton").unwrap(),
            RemoveStatus::NotFound
        );
        assert_eq!(s.get_value("", "ShowHomeButton").unwrap(), None);
        assert!(s.get_value("", "HomepageLocation").unwrap().is_some());
    }

    #[test]
    fn scopes_are_separate_keys() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(tmp.path());
        s.set_value("URLBlocklist", "1", &PolicyValue::String("*.bad".into()))
            .unwrap();

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(s.path()).unwrap()).unwrap();
        let key = format!("{}\\URLBlocklist", ROOT);
        assert_eq!(raw[key.as_str()]["1"]["type"], "string");
        assert_eq!(s.get_value("", "1").unwrap(), None);
    }

    #[test]
    fn hand_written_hex_dword_is_read() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(tmp.path());
        fs::write(
            s.path(),
            format!(
                r#"{{"{}": {{"BrowserSignin": {{"type": "dword", "value": "0x2"}}}}}}"#,
                ROOT.replace('\\', "\\\\")
            ),
        )
        .unwrap();
        assert_eq!(
            s.get_value("", "BrowserSignin").unwrap(),
            Some(PolicyValue::Dword(2))
        );
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(tmp.path());
        fs::write(s.path(), "[1,2").unwrap();
        assert!(matches!(
            s.get_value("", "x"),
            Err(ExtKeeperError::JsonParse { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn read_only_target_is_access_denied() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let locked = tmp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        let s = store(&locked);

        let result = s.set_value("", "ShowHomeButton", &PolicyValue::Dword(1));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Running as root bypasses directory permissions
        if let Err(e) = result {
            assert!(matches!(e, ExtKeeperError::AccessDenied));
            assert_eq!(e.to_string(), "Access Denied");
        }
    }
}
