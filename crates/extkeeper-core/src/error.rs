use std::path::PathBuf;
use thiserror::Error;

/// Broad failure classes shared by every engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Parse,
    Io,
    PermissionDenied,
    InvalidFormat,
    Config,
}

#[derive(Debug, Error)]
pub enum ExtKeeperError {
    #[error("Profile not found: {name}")]
    ProfileNotFound { name: String },

    #[error("Preferences file not found: {path}")]
    PreferencesNotFound { path: PathBuf },

    #[error("Extension {id} not found in Preferences")]
    ExtensionNotFound { id: String },

    #[error("'extensions.settings' structure not found in {path}")]
    MissingSettings { path: PathBuf },

    #[error("Extension folder not found: {path}")]
    AssetFolderNotFound { path: PathBuf },

    #[error("Browser user data directory not found: {path}")]
    UserDataDirNotFound { path: PathBuf },

    #[error("Could not determine user data directory for {browser} on this OS")]
    UserDataDirUnresolved { browser: String },

    #[error("Policy not found in catalog: {name}")]
    PolicyDefinitionNotFound { name: String },

    #[error("JSON error in {path}: {message}")]
    JsonParse { path: PathBuf, message: String },

    #[error("Failed to copy {from} to {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Access Denied")]
    AccessDenied,

    #[error("Policy store error: {message}")]
    PolicyStore { message: String },

    #[error("Invalid extension ID: {id}")]
    InvalidExtensionId { id: String },

    #[error("Invalid backup format: {message}")]
    InvalidBackupFormat { message: String },

    #[error("Invalid value '{value}' for policy {policy}")]
    InvalidPolicyValue { policy: String, value: String },

    #[error("Failed to parse config {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidConfigValue { key: String, message: String },

    #[error("Unknown config key: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Home directory not found")]
    HomeNotFound,
}

pub type Result<T> = std::result::Result<T, ExtKeeperError>;

impl ExtKeeperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProfileNotFound { .. }
            | Self::PreferencesNotFound { .. }
            | Self::ExtensionNotFound { .. }
            | Self::AssetFolderNotFound { .. }
            | Self::UserDataDirNotFound { .. }
            | Self::UserDataDirUnresolved { .. }
            | Self::PolicyDefinitionNotFound { .. } => ErrorKind::NotFound,
            Self::JsonParse { .. } => ErrorKind::Parse,
            Self::CopyFailed { .. } | Self::Io(_) | Self::PolicyStore { .. } => ErrorKind::Io,
            Self::AccessDenied => ErrorKind::PermissionDenied,
            Self::MissingSettings { .. }
            | Self::InvalidExtensionId { .. }
            | Self::InvalidBackupFormat { .. }
            | Self::InvalidPolicyValue { .. } => ErrorKind::InvalidFormat,
            Self::ConfigParse { .. }
            | Self::InvalidConfigValue { .. }
            | Self::ConfigKeyNotFound { .. }
            | Self::TomlSer(_)
            | Self::TomlDe(_)
            | Self::HomeNotFound => ErrorKind::Config,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::NotFound => 2,
            ErrorKind::Parse => 3,
            ErrorKind::PermissionDenied => 4,
            ErrorKind::InvalidFormat => 5,
            ErrorKind::Config => 6,
            ErrorKind::Io => 1,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, err: serde_json::Error) -> Self {
        Self::JsonParse {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
