//! # Policy Module
//!
//! Machine-wide browser policy, held in a flat key/value namespace under one
//! root scope per browser (`SOFTWARE\Policies\Google\Chrome`, ...).
//!
//! ## Module layout
//!
//! - `store`: the `PolicyStore` port and its backends (JSON file, Windows registry)
//! - `indexed`: list-style policies whose value names are `1`, `2`, ...
//! - `catalog`: builtin policy definitions and the apply/status/reset helpers
//!
//! ## Example
//!
//! ```rust,no_run
//! use extkeeper_core::policy::{JsonFilePolicyStore, PolicyStore, PolicyValue};
//!
//! let store = JsonFilePolicyStore::new("/tmp/policies.json", r"SOFTWARE\Policies\Google\Chrome");
//! store.set_value("", "ShowHomeButton", &PolicyValue::Dword(1))?;
//! assert_eq!(store.get_value("", "ShowHomeButton")?, Some(PolicyValue::Dword(1)));
//! # Ok::<(), extkeeper_core::ExtKeeperError>(())
//! ```

mod catalog;
mod indexed;
mod store;

use std::fmt;
use std::path::PathBuf;

use crate::browser::Browser;
use crate::config::PolicyBackend;
use crate::error::Result;

pub use catalog::{
    PolicyCatalog, PolicyDef, PolicyInput, PolicyOption, PolicySetting, PolicyStatus,
    BUILTIN_POLICIES, UNSET_SENTINEL,
};
pub use indexed::{
    next_free_index, AddOutcome, ForcedExtension, ForcedExtensions, IndexedEntry, IndexedList,
    UrlBlocklist,
};
#[cfg(windows)]
pub use store::RegistryPolicyStore;
pub use store::{JsonFilePolicyStore, PolicyStore, RemoveStatus};

/// Update URL written after the id in forced-install entries
pub const DEFAULT_UPDATE_URL: &str = "https://clients2.google.com/service/update2/crx";

/// Child scope holding the forced-install list
pub const FORCELIST_SCOPE: &str = "ExtensionInstallForcelist";

/// Child scope holding the URL blocklist
pub const BLOCKLIST_SCOPE: &str = "URLBlocklist";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// `REG_SZ`
    String,
    /// `REG_DWORD`
    Dword,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Dword => "dword",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed policy value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyValue {
    String(String),
    Dword(u32),
}

impl PolicyValue {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::String(_) => PolicyKind::String,
            Self::Dword(_) => PolicyKind::Dword,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Dword(_) => None,
        }
    }

    /// Numeric reading; string values are accepted in hex or decimal
    pub fn as_dword(&self) -> Option<u32> {
        match self {
            Self::Dword(n) => Some(*n),
            Self::String(s) => parse_dword(s),
        }
    }
}

impl fmt::Display for PolicyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Dword(n) => write!(f, "{}", n),
        }
    }
}

/// Parse a DWORD rendered as `0x1f` or `31`
pub fn parse_dword(text: &str) -> Option<u32> {
    let text = text.trim();
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Open the policy store selected by configuration
///
/// `Auto` picks the registry on Windows and the JSON file elsewhere.
pub fn open_store(
    backend: PolicyBackend,
    browser: Browser,
    file: PathBuf,
) -> Result<Box<dyn PolicyStore>> {
    let root = browser.policy_root();
    match backend {
        PolicyBackend::File => Ok(Box::new(JsonFilePolicyStore::new(file, root))),
        PolicyBackend::Registry => registry_store(root),
        PolicyBackend::Auto if cfg!(windows) => registry_store(root),
        PolicyBackend::Auto => Ok(Box::new(JsonFilePolicyStore::new(file, root))),
    }
}

#[cfg(windows)]
fn registry_store(root: &str) -> Result<Box<dyn PolicyStore>> {
    Ok(Box::new(RegistryPolicyStore::new(root)))
}

#[cfg(not(windows))]
fn registry_store(_root: &str) -> Result<Box<dyn PolicyStore>> {
    Err(crate::error::ExtKeeperError::PolicyStore {
        message: "the registry backend is only available on Windows".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dword_accepts_hex_and_decimal() {
        assert_eq!(parse_dword("0x1"), Some(1));
        assert_eq!(parse_dword("0X0000000a"), Some(10));
        assert_eq!(parse_dword(" 4 "), Some(4));
        assert_eq!(parse_dword("-1"), None);
        assert_eq!(parse_dword("0xZZ"), None);
    }

    #[test]
    fn as_dword_reads_string_renderings() {
        assert_eq!(PolicyValue::String("0x2".into()).as_dword(), Some(2));
        assert_eq!(PolicyValue::Dword(3).as_dword(), Some(3));
        assert_eq!(PolicyValue::String("https://x".into()).as_dword(), None);
    }

    #[test]
    fn open_file_store_explicitly() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = open_store(
            PolicyBackend::File,
            Browser::Edge,
            tmp.path().join("p.json"),
        )
        .unwrap();
        assert_eq!(store.root(), r"SOFTWARE\Policies\Microsoft\Edge");
    }

    #[cfg(not(windows))]
    #[test]
    fn registry_backend_rejected_off_windows() {
        use crate::error::ExtKeeperError;
        let result = open_store(PolicyBackend::Registry, Browser::Chrome, PathBuf::from("x"));
        assert!(matches!(result, Err(ExtKeeperError::PolicyStore { .. })));
    }
}
