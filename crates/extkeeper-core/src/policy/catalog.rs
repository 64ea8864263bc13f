//! Builtin Policy Definitions
//!
//! Static catalog of the policies the editor knows about, with their legal
//! values. An option whose value is [`UNSET_SENTINEL`] means "not
//! configured" and is applied as a removal.

use super::{parse_dword, PolicyKind, PolicyStore, PolicyValue, RemoveStatus};
use crate::error::{ExtKeeperError, Result};
use crate::oplog::OpLog;

/// Option value meaning "remove the override"
pub const UNSET_SENTINEL: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyOption {
    pub label: &'static str,
    pub value: i64,
}

const fn opt(label: &'static str, value: i64) -> PolicyOption {
    PolicyOption { label, value }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyInput {
    /// Pick one of a fixed set of DWORD values
    Choice(&'static [PolicyOption]),
    /// Free text; empty input unsets
    Text { placeholder: &'static str },
}

/// One policy in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDef {
    pub category: &'static str,
    /// Human-readable title
    pub name: &'static str,
    /// Child scope under the browser root (`""` = root)
    pub scope: &'static str,
    pub value_name: &'static str,
    pub kind: PolicyKind,
    pub input: PolicyInput,
    pub help: &'static str,
}

const SECURITY: &str = "Security & Privacy";
const STARTUP: &str = "Startup, Homepage & UI";
const CONTENT: &str = "Content Settings (JavaScript, Cookies, etc.)";
const HARDWARE: &str = "Hardware & Performance";

const FORCE_TOGGLE: &[PolicyOption] = &[
    opt("Default", UNSET_SENTINEL),
    opt("Force Enabled", 1),
    opt("Force Disabled", 0),
];

const ALLOW_BLOCK: &[PolicyOption] = &[
    opt("Default", UNSET_SENTINEL),
    opt("Allow", 1),
    opt("Block", 2),
];

const fn choice(
    category: &'static str,
    name: &'static str,
    value_name: &'static str,
    options: &'static [PolicyOption],
    help: &'static str,
) -> PolicyDef {
    PolicyDef {
        category,
        name,
        scope: "",
        value_name,
        kind: PolicyKind::Dword,
        input: PolicyInput::Choice(options),
        help,
    }
}

const fn text(
    category: &'static str,
    name: &'static str,
    scope: &'static str,
    value_name: &'static str,
    help: &'static str,
) -> PolicyDef {
    PolicyDef {
        category,
        name,
        scope,
        value_name,
        kind: PolicyKind::String,
        input: PolicyInput::Text {
            placeholder: "Enter URL",
        },
        help,
    }
}

const INCOGNITO_MODE_AVAILABILITY_OPTIONS: &[PolicyOption] = &[
    opt("Default Enabled", UNSET_SENTINEL),
    opt("Enabled", 0),
    opt("Disabled", 1),
    opt("Forced", 2),
];

const PASSWORD_MANAGER_ENABLED_OPTIONS: &[PolicyOption] = &[
    opt("Allow users to decide", UNSET_SENTINEL),
    opt("Force Enabled", 1),
    opt("Force Disabled", 0),
];

const SAFE_BROWSING_PROTECTION_LEVEL_OPTIONS: &[PolicyOption] = &[
    opt("Default", UNSET_SENTINEL),
    opt("No Protection", 0),
    opt("Standard", 1),
    opt("Enhanced", 2),
];

const DOWNLOAD_RESTRICTIONS_OPTIONS: &[PolicyOption] = &[
    opt("Default", UNSET_SENTINEL),
    opt("No Special Restrictions", 0),
    opt("Block Malicious", 1),
    opt("Block Dangerous", 2),
    opt("Block All", 4),
];

const DEVELOPER_TOOLS_AVAILABILITY_OPTIONS: &[PolicyOption] = &[
    opt("Default", UNSET_SENTINEL),
    opt("Allowed", 0),
    opt("Disallowed", 1),
    opt("Disallowed for Extensions", 2),
];

const NETWORK_PREDICTION_OPTIONS: &[PolicyOption] = &[
    opt("Default", UNSET_SENTINEL),
    opt("Standard", 0),
    opt("Wi-Fi Only", 1),
    opt("Disabled", 2),
];

const BROWSER_SIGNIN_OPTIONS: &[PolicyOption] = &[
    opt("Default", UNSET_SENTINEL),
    opt("Allow", 0),
    opt("Force users to sign-in", 1),
    opt("Disable sign-in", 2),
];

const RESTORE_ON_STARTUP_OPTIONS: &[PolicyOption] = &[
    opt("Default", UNSET_SENTINEL),
    opt("Open New Tab Page", 1),
    opt("Restore Last Session", 4),
    opt("Open Specific URLs", 5),
];

const DEFAULT_COOKIES_SETTING_OPTIONS: &[PolicyOption] = &[
    opt("Default", UNSET_SENTINEL),
    opt("Allow All", 1),
    opt("Block Third-Party", 3),
    opt("Block All", 2),
];

const DEFAULT_IMAGES_SETTING_OPTIONS: &[PolicyOption] = &[
    opt("Default", UNSET_SENTINEL),
    opt("Show All", 1),
    opt("Block All", 2),
];

pub const BUILTIN_POLICIES: &[PolicyDef] = &[
    // Security & Privacy
    choice(
        SECURITY,
        "Incognito Mode Availability",
        "IncognitoModeAvailability",
        INCOGNITO_MODE_AVAILABILITY_OPTIONS,
        "0: Default, 1: Incognito disabled, 2: All windows are Incognito.",
    ),
    choice(
        SECURITY,
        "Password Manager",
        "PasswordManagerEnabled",
        PASSWORD_MANAGER_ENABLED_OPTIONS,
        "Controls the built-in password saving functionality.",
    ),
    choice(
        SECURITY,
        "Safe Browsing Protection Level",
        "SafeBrowsingProtectionLevel",
        SAFE_BROWSING_PROTECTION_LEVEL_OPTIONS,
        "Enforces a minimum level of Safe Browsing.",
    ),
    choice(
        SECURITY,
        "Block Insecure Downloads",
        "DownloadRestrictions",
        DOWNLOAD_RESTRICTIONS_OPTIONS,
        "Restricts downloading of insecure or dangerous files.",
    ),
    choice(
        SECURITY,
        "Developer Tools Availability",
        "DeveloperToolsAvailability",
        DEVELOPER_TOOLS_AVAILABILITY_OPTIONS,
        "Controls access to developer tools (F12).",
    ),
    choice(
        SECURITY,
        "Network Prediction (Prefetch)",
        "NetworkPredictionOptions",
        NETWORK_PREDICTION_OPTIONS,
        "Disables pre-connecting to links for privacy. May slow down browsing.",
    ),
    choice(
        SECURITY,
        "Browser Sign-In",
        "BrowserSignin",
        BROWSER_SIGNIN_OPTIONS,
        "Controls if users can sign in to the browser with their account.",
    ),
    // Startup, Homepage & UI
    choice(
        STARTUP,
        "Action on Startup",
        "RestoreOnStartup",
        RESTORE_ON_STARTUP_OPTIONS,
        "Defines what the browser opens on launch.",
    ),
    text(
        STARTUP,
        "URLs to Open on Startup",
        "RestoreOnStartupURLs",
        "1",
        "Set a URL to open on startup. Only works if 'Action on Startup' is 'Open Specific URLs'.",
    ),
    text(
        STARTUP,
        "Homepage Location",
        "",
        "HomepageLocation",
        "Sets the homepage URL. Example: https://www.google.com",
    ),
    choice(
        STARTUP,
        "Show Home Button",
        "ShowHomeButton",
        FORCE_TOGGLE,
        "Forces the Home button to be visible or not.",
    ),
    choice(
        STARTUP,
        "Bookmark Bar",
        "BookmarkBarEnabled",
        FORCE_TOGGLE,
        "Controls the visibility of the bookmarks bar.",
    ),
    // Content settings
    choice(
        CONTENT,
        "Default Cookies Setting",
        "DefaultCookiesSetting",
        DEFAULT_COOKIES_SETTING_OPTIONS,
        "Sets the default behavior for handling cookies.",
    ),
    choice(
        CONTENT,
        "Default JavaScript Setting",
        "DefaultJavaScriptSetting",
        ALLOW_BLOCK,
        "Sets the default behavior for running JavaScript.",
    ),
    choice(
        CONTENT,
        "Default Popups Setting",
        "DefaultPopupsSetting",
        ALLOW_BLOCK,
        "Sets the default behavior for pop-up windows.",
    ),
    choice(
        CONTENT,
        "Default Images Setting",
        "DefaultImagesSetting",
        DEFAULT_IMAGES_SETTING_OPTIONS,
        "Controls whether images are loaded by default.",
    ),
    // Hardware & Performance
    choice(
        HARDWARE,
        "Hardware Acceleration Mode",
        "HardwareAccelerationModeEnabled",
        FORCE_TOGGLE,
        "Forces hardware acceleration on or off. A restart is required.",
    ),
];

/// What applying a user selection amounts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySetting {
    Unset,
    Value(PolicyValue),
}

/// Current state of a policy in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyStatus {
    NotConfigured,
    Configured {
        raw: String,
        /// Option label matching the stored value, for choice policies
        label: Option<&'static str>,
    },
}

impl PolicyDef {
    /// Short identifier used on the command line
    ///
    /// The value name, or the scope for policies stored as a list element.
    pub fn key(&self) -> &'static str {
        if self.scope.is_empty() {
            self.value_name
        } else {
            self.scope
        }
    }

    pub fn options(&self) -> &'static [PolicyOption] {
        match self.input {
            PolicyInput::Choice(options) => options,
            PolicyInput::Text { .. } => &[],
        }
    }

    pub fn label_for(&self, value: i64) -> Option<&'static str> {
        self.options()
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label)
    }

    /// Turn user input into a setting
    ///
    /// Choice policies accept an option label (any case) or its numeric
    /// value in decimal or hex. Text policies take the trimmed text; empty
    /// text unsets.
    pub fn resolve(&self, input: &str) -> Result<PolicySetting> {
        let input = input.trim();
        let invalid = || ExtKeeperError::InvalidPolicyValue {
            policy: self.key().to_string(),
            value: input.to_string(),
        };

        match self.input {
            PolicyInput::Text { .. } => Ok(if input.is_empty() {
                PolicySetting::Unset
            } else {
                PolicySetting::Value(PolicyValue::String(input.to_string()))
            }),
            PolicyInput::Choice(options) => {
                let by_label = options.iter().find(|o| o.label.eq_ignore_ascii_case(input));
                let value = match by_label {
                    Some(o) => o.value,
                    None => {
                        let n = input
                            .parse::<i64>()
                            .ok()
                            .or_else(|| parse_dword(input).map(i64::from))
                            .ok_or_else(invalid)?;
                        options
                            .iter()
                            .find(|o| o.value == n)
                            .ok_or_else(invalid)?
                            .value
                    }
                };
                if value == UNSET_SENTINEL {
                    return Ok(PolicySetting::Unset);
                }
                u32::try_from(value)
                    .map(|n| PolicySetting::Value(PolicyValue::Dword(n)))
                    .map_err(|_| invalid())
            }
        }
    }

    /// Write the resolved setting, translating the sentinel into a removal
    pub fn apply(&self, store: &dyn PolicyStore, input: &str, log: &mut OpLog) -> Result<PolicySetting> {
        let setting = self.resolve(input)?;
        match &setting {
            PolicySetting::Unset => {
                self.reset(store, log)?;
            }
            PolicySetting::Value(value) => {
                store
                    .set_value(self.scope, self.value_name, value)
                    .map_err(|e| {
                        log.error(format!("Failed to set {}: {}", self.name, e));
                        e
                    })?;
                log.info(format!(
                    "Policy '{}' set to {} ({}).",
                    self.name,
                    value,
                    self.kind
                ));
            }
        }
        Ok(setting)
    }

    /// Remove the override; an unconfigured policy is not an error
    pub fn reset(&self, store: &dyn PolicyStore, log: &mut OpLog) -> Result<RemoveStatus> {
        let status = store
            .remove_value(self.scope, self.value_name)
            .map_err(|e| {
                log.error(format!("Failed to reset {}: {}", self.name, e));
                e
            })?;
        match status {
            RemoveStatus::Removed => log.info(format!("Policy '{}' removed.", self.name)),
            RemoveStatus::NotFound => {
                log.info(format!("Policy '{}' was not configured.", self.name))
            }
        }
        Ok(status)
    }

    pub fn status(&self, store: &dyn PolicyStore) -> Result<PolicyStatus> {
        let value = match store.get_value(self.scope, self.value_name)? {
            Some(value) => value,
            None => return Ok(PolicyStatus::NotConfigured),
        };
        let label = match self.input {
            PolicyInput::Choice(_) => value
                .as_dword()
                .and_then(|n| self.label_for(i64::from(n))),
            PolicyInput::Text { .. } => None,
        };
        Ok(PolicyStatus::Configured {
            raw: value.to_string(),
            label,
        })
    }
}

/// Lookup over a set of policy definitions
#[derive(Debug, Clone, Copy)]
pub struct PolicyCatalog {
    defs: &'static [PolicyDef],
}

impl Default for PolicyCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PolicyCatalog {
    pub fn builtin() -> Self {
        Self {
            defs: BUILTIN_POLICIES,
        }
    }

    pub fn all(&self) -> &'static [PolicyDef] {
        self.defs
    }

    /// Categories in catalog order
    pub fn categories(&self) -> Vec<&'static str> {
        let mut seen = Vec::new();
        for def in self.defs {
            if !seen.contains(&def.category) {
                seen.push(def.category);
            }
        }
        seen
    }

    pub fn in_category<'a>(&self, category: &'a str) -> impl Iterator<Item = &'static PolicyDef> + 'a {
        let defs = self.defs;
        defs.iter().filter(move |d| d.category == category)
    }

    /// Find by key (`ShowHomeButton`, `RestoreOnStartupURLs`) or title, ignoring case
    pub fn find(&self, query: &str) -> Result<&'static PolicyDef> {
        let query = query.trim();
        let defs = self.defs;
        defs.iter()
            .find(|d| d.key().eq_ignore_ascii_case(query))
            .or_else(|| defs.iter().find(|d| d.name.eq_ignore_ascii_case(query)))
            .ok_or_else(|| ExtKeeperError::PolicyDefinitionNotFound {
                name: query.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::JsonFilePolicyStore;

    fn store(tmp: &tempfile::TempDir) -> JsonFilePolicyStore {
        JsonFilePolicyStore::new(tmp.path().join("p.json"), r"SOFTWARE\Policies\Google\Chrome")
    }

    #[test]
    fn builtin_catalog_shape() {
        let catalog = PolicyCatalog::builtin();
        assert_eq!(catalog.all().len(), 17);
        assert_eq!(
            catalog.categories(),
            vec![SECURITY, STARTUP, CONTENT, HARDWARE]
        );
        assert_eq!(catalog.in_category(CONTENT).count(), 4);

        // Every choice policy can be unset
        for def in catalog.all() {
            if let PolicyInput::Choice(options) = def.input {
                assert!(options.iter().any(|o| o.value == UNSET_SENTINEL), "{}", def.name);
            }
        }
    }

    #[test]
    fn find_by_key_or_title() {
        let catalog = PolicyCatalog::builtin();
        assert_eq!(catalog.find("showhomebutton").unwrap().name, "Show Home Button");
        assert_eq!(catalog.find("Bookmark Bar").unwrap().value_name, "BookmarkBarEnabled");
        let urls = catalog.find("RestoreOnStartupURLs").unwrap();
        assert_eq!((urls.scope, urls.value_name), ("RestoreOnStartupURLs", "1"));
        assert!(matches!(
            catalog.find("NoSuchPolicy"),
            Err(ExtKeeperError::PolicyDefinitionNotFound { .. })
        ));
    }

    #[test]
    fn resolve_choice() {
        let def = PolicyCatalog::builtin().find("DownloadRestrictions").unwrap();
        assert_eq!(
            def.resolve("block all").unwrap(),
            PolicySetting::Value(PolicyValue::Dword(4))
        );
        assert_eq!(
            def.resolve("2").unwrap(),
            PolicySetting::Value(PolicyValue::Dword(2))
        );
        assert_eq!(def.resolve("Default").unwrap(), PolicySetting::Unset);
        assert_eq!(def.resolve("-1").unwrap(), PolicySetting::Unset);
        assert!(def.resolve("3").is_err());
        assert!(def.resolve("sometimes").is_err());
    }

    #[test]
    fn apply_sentinel_removes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp);
        let def = PolicyCatalog::builtin().find("PasswordManagerEnabled").unwrap();
        let mut log = OpLog::new();

        def.apply(&s, "Force Disabled", &mut log).unwrap();
        assert_eq!(
            s.get_value("", "PasswordManagerEnabled").unwrap(),
            Some(PolicyValue::Dword(0))
        );

        assert_eq!(
            def.apply(&s, "Allow users to decide", &mut log).unwrap(),
            PolicySetting::Unset
        );
        assert_eq!(s.get_value("", "PasswordManagerEnabled").unwrap(), None);
        assert_eq!(def.status(&s).unwrap(), PolicyStatus::NotConfigured);
    }

    #[test]
    fn status_tolerates_hex_rendering() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp);
        let def = PolicyCatalog::builtin().find("RestoreOnStartup").unwrap();
        s.set_value("", "RestoreOnStartup", &PolicyValue::String("0x5".into()))
            .unwrap();

        assert_eq!(
            def.status(&s).unwrap(),
            PolicyStatus::Configured {
                raw: "0x5".to_string(),
                label: Some("Open Specific URLs"),
            }
        );
    }

    #[test]
    fn text_policy_and_reset() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp);
        let def = PolicyCatalog::builtin().find("HomepageLocation").unwrap();
        let mut log = OpLog::new();

        def.apply(&s, " https://example.com ", &mut log).unwrap();
        assert_eq!(
            def.status(&s).unwrap(),
            PolicyStatus::Configured {
                raw: "https://example.com".to_string(),
                label: None,
            }
        );

        assert_eq!(def.reset(&s, &mut log).unwrap(), RemoveStatus::Removed);
        assert_eq!(def.reset(&s, &mut log).unwrap(), RemoveStatus::NotFound);
        assert!(log.contains("was not configured"));
    }
}
