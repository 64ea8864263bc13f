use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use extkeeper_core::Browser;

#[derive(Parser)]
#[command(name = "extkeeper")]
#[command(about = "Manage browser extensions across profiles and machine-wide browser policy")]
#[command(version)]
pub struct Cli {
    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Base directory (default: ~/.extkeeper)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Browser to manage (overrides browser.kind)
    #[arg(long, global = true, value_parser = parse_browser)]
    pub browser: Option<Browser>,

    /// Browser user data directory (overrides browser.user_data_dir)
    #[arg(long, global = true)]
    pub user_data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

fn parse_browser(s: &str) -> Result<Browser, String> {
    s.parse()
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List browser profiles
    Profiles,

    /// List extensions installed in a profile
    Extensions {
        /// Profile display name or directory name (e.g., "Default", "Profile 2")
        profile: String,
    },

    /// Show details of one extension
    Show {
        /// Profile display name or directory name
        profile: String,

        /// Extension display name or 32-character ID
        extension: String,
    },

    /// Enable an extension in a profile
    Enable {
        /// Profile display name or directory name
        profile: String,

        /// Extension display name or 32-character ID
        extension: String,
    },

    /// Disable an extension in a profile
    Disable {
        /// Profile display name or directory name
        profile: String,

        /// Extension display name or 32-character ID
        extension: String,
    },

    /// Disable every enabled extension not installed by default
    Panic {
        /// Profile display name or directory name
        profile: String,
    },

    /// Copy an extension from one profile into all other profiles
    Install {
        /// Source profile display name or directory name
        source: String,

        /// Extension display name or 32-character ID (as listed in the source profile)
        extension: String,
    },

    /// Remove an extension from all profiles
    Uninstall {
        /// Extension 32-character ID, or a display name when --from is given
        extension: String,

        /// Profile used to resolve a display name to an ID
        #[arg(long)]
        from: Option<String>,
    },

    /// Back up a profile's extension settings to a JSON file
    Backup {
        /// Profile display name or directory name
        profile: String,

        /// Output file (default: <browser>_extensions_backup_<dir>_<date>.json)
        file: Option<PathBuf>,
    },

    /// Replace a profile's extension settings from a backup file
    Restore {
        /// Profile display name or directory name
        profile: String,

        /// Backup file to read
        file: PathBuf,
    },

    /// Inspect and edit catalog policies
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },

    /// Manage the forced-install extension list
    Forcelist {
        #[command(subcommand)]
        action: IndexedAction,
    },

    /// Manage the URL blocklist
    Blocklist {
        #[command(subcommand)]
        action: IndexedAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum PolicyAction {
    /// List catalog policies with their current state
    List {
        /// Only show one category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Show one policy, its options and current value
    Get {
        /// Policy key (e.g., ShowHomeButton) or title
        policy: String,
    },

    /// Set a policy by option label, numeric value or text
    Set {
        /// Policy key (e.g., ShowHomeButton) or title
        policy: String,

        /// Option label (e.g., "Force Enabled"), value, or text; "Default" unsets
        value: String,
    },

    /// Remove a policy override
    Reset {
        /// Policy key (e.g., ShowHomeButton) or title
        policy: String,
    },
}

#[derive(Subcommand)]
pub enum IndexedAction {
    /// List entries by index
    List,

    /// Add an entry (extension ID for forcelist, URL pattern for blocklist)
    Add {
        value: String,
    },

    /// Remove the entry at an index
    Remove {
        index: u32,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g., browser.kind)
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., policy.store)
        key: String,

        /// Value to set (e.g., "edge", "file", "default" to clear a path)
        value: String,
    },

    /// List all config values
    List,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init,
}
