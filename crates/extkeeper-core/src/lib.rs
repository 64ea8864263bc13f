pub mod browser;
pub mod config;
pub mod error;
pub mod extension;
pub mod mutator;
pub mod naming;
pub mod oplog;
pub mod policy;
pub mod prefs;
pub mod profile;

pub use browser::Browser;
pub use config::{Config, PolicyBackend};
pub use error::{ErrorKind, ExtKeeperError, Result};
pub use extension::{
    find_extension, is_extension_id, list_extensions, ExtensionMap, ExtensionRecord,
    ExtensionState, ManifestSource,
};
pub use mutator::{
    backup, disable_non_default, install_extension_entry, install_to_profiles,
    remove_extension_entry, remove_from_profiles, restore, set_extension_state,
    suggested_backup_name, BackupBundle, FanOutReport, InstallOutcome, ProfileOutcome,
    ProfileStatus, RemoveOutcome,
};
pub use oplog::{LogLevel, LogLine, OpLog, OPLOG_TARGET};
pub use prefs::PreferencesDocument;
pub use profile::{find_profile, Profile, ProfileLocator, ProfileMap};

// Policy store
pub use policy::{
    open_store, ForcedExtensions, JsonFilePolicyStore, PolicyCatalog, PolicyDef, PolicyStatus,
    PolicyStore, PolicyValue, RemoveStatus, UrlBlocklist,
};
