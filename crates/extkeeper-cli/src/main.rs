use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use extkeeper_core::config::Config;
use extkeeper_core::extension::{find_extension, is_extension_id, list_extensions, ExtensionState};
use extkeeper_core::mutator::{self, FanOutReport, ProfileStatus};
use extkeeper_core::oplog::{LogLevel, OpLog, OPLOG_TARGET};
use extkeeper_core::policy::{
    open_store, AddOutcome, ForcedExtensions, PolicyCatalog, PolicyDef, PolicyInput,
    PolicySetting, PolicyStatus, PolicyStore, RemoveStatus, UrlBlocklist,
};
use extkeeper_core::profile::{find_profile, ProfileLocator, ProfileMap};
use extkeeper_core::{Browser, ExtKeeperError, Result};

mod args;
use args::{Cli, Commands, ConfigAction, IndexedAction, PolicyAction, Shell};

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let base_dir = resolve_base_dir(cli.base_dir.clone());
    let output = Output {
        verbose: cli.verbose > 0,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Some(Commands::Config { action }) => handle_config(action, &base_dir),
        Some(Commands::Completions { shell }) => {
            handle_completions(shell);
            Ok(())
        }
        Some(command) => Context::load(&base_dir, cli.browser, cli.user_data_dir, output)
            .and_then(|ctx| run(command, &ctx)),
        None => {
            Cli::command().print_help().ok();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(command: Commands, ctx: &Context) -> Result<()> {
    match command {
        Commands::Profiles => handle_profiles(ctx),
        Commands::Extensions { profile } => handle_extensions(ctx, &profile),
        Commands::Show { profile, extension } => handle_show(ctx, &profile, &extension),
        Commands::Enable { profile, extension } => {
            handle_set_state(ctx, &profile, &extension, ExtensionState::Enabled)
        }
        Commands::Disable { profile, extension } => {
            handle_set_state(ctx, &profile, &extension, ExtensionState::Disabled)
        }
        Commands::Panic { profile } => handle_panic(ctx, &profile),
        Commands::Install { source, extension } => handle_install(ctx, &source, &extension),
        Commands::Uninstall { extension, from } => {
            handle_uninstall(ctx, &extension, from.as_deref())
        }
        Commands::Backup { profile, file } => handle_backup(ctx, &profile, file),
        Commands::Restore { profile, file } => handle_restore(ctx, &profile, &file),
        Commands::Policy { action } => handle_policy(ctx, action),
        Commands::Forcelist { action } => handle_forcelist(ctx, action),
        Commands::Blocklist { action } => handle_blocklist(ctx, action),
        Commands::Config { .. } | Commands::Completions { .. } => Ok(()),
    }
}

/// Initialize tracing with appropriate verbosity
///
/// Operation log lines are printed by the CLI itself, so their mirror
/// events are filtered out here.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let filter = EnvFilter::new(format!("{},{}=off", level, OPLOG_TARGET));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "extkeeper", &mut io::stdout());
}

fn resolve_base_dir(cli_base: Option<PathBuf>) -> PathBuf {
    if let Some(base) = cli_base {
        return base;
    }

    if let Ok(base) = std::env::var("EXTKEEPER_BASE") {
        return PathBuf::from(base);
    }

    dirs::home_dir()
        .map(|h| h.join(".extkeeper"))
        .unwrap_or_else(|| PathBuf::from(".extkeeper"))
}

// =========================================================================
// Shared context
// =========================================================================

#[derive(Clone, Copy)]
struct Output {
    verbose: bool,
    quiet: bool,
}

impl Output {
    /// Print collected log lines: info with -v, warnings unless -q, errors always
    fn flush(&self, log: &mut OpLog) {
        for line in log.drain() {
            match line.level {
                LogLevel::Info if self.verbose => {
                    println!("{} {}", "[INFO]".blue(), line.message)
                }
                LogLevel::Warn if !self.quiet => {
                    eprintln!("{} {}", "[WARN]".yellow(), line.message)
                }
                LogLevel::Error => eprintln!("{} {}", "[ERROR]".red().bold(), line.message),
                _ => {}
            }
        }
    }

    fn ok(&self, message: impl AsRef<str>) {
        if !self.quiet {
            println!("{} {}", "[OK]".green(), message.as_ref());
        }
    }
}

struct Context {
    base_dir: PathBuf,
    config: Config,
    browser: Browser,
    user_data_dir: PathBuf,
    out: Output,
}

impl Context {
    fn load(
        base_dir: &Path,
        browser: Option<Browser>,
        user_data_dir: Option<PathBuf>,
        out: Output,
    ) -> Result<Self> {
        let mut config = Config::load(base_dir)?;
        if let Some(browser) = browser {
            config.browser.kind = browser;
            // The configured override belongs to the configured browser
            if user_data_dir.is_none() {
                config.browser.user_data_dir = None;
            }
        }
        let user_data_dir = match user_data_dir {
            Some(dir) => dir,
            None => config.user_data_dir()?,
        };
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            browser: config.browser.kind,
            config,
            user_data_dir,
            out,
        })
    }

    /// Scan profiles; an unreachable user data directory is fatal here
    fn profiles(&self) -> Result<ProfileMap> {
        if !self.user_data_dir.is_dir() {
            return Err(ExtKeeperError::UserDataDirNotFound {
                path: self.user_data_dir.clone(),
            });
        }
        let mut log = OpLog::new();
        let profiles = ProfileLocator::new(self.user_data_dir.clone()).scan(&mut log);
        self.out.flush(&mut log);
        Ok(profiles)
    }

    fn policy_store(&self) -> Result<Box<dyn PolicyStore>> {
        open_store(
            self.config.policy.store,
            self.browser,
            self.config.policy_file(&self.base_dir),
        )
    }
}

/// Resolve an extension argument (display name or id) within one profile
fn resolve_extension_id(ctx: &Context, profile_dir: &Path, query: &str) -> Result<String> {
    let mut log = OpLog::new();
    let extensions = list_extensions(profile_dir, &mut log);
    ctx.out.flush(&mut log);
    find_extension(&extensions, query)
        .map(|r| r.id.clone())
        .ok_or_else(|| ExtKeeperError::ExtensionNotFound {
            id: query.to_string(),
        })
}

// =========================================================================
// Profiles and extensions
// =========================================================================

fn handle_profiles(ctx: &Context) -> Result<()> {
    let profiles = ctx.profiles()?;

    println!();
    println!(
        "{} profiles in {}",
        ctx.browser.name().bold(),
        ctx.user_data_dir.display()
    );
    println!();
    if profiles.is_empty() {
        println!("  (none)");
    }
    for profile in profiles.values() {
        println!("  {:<32} {}", profile.name.cyan(), profile.dir_name.dimmed());
    }
    println!();
    Ok(())
}

fn handle_extensions(ctx: &Context, profile: &str) -> Result<()> {
    let profiles = ctx.profiles()?;
    let profile = find_profile(&profiles, profile)?;

    let mut log = OpLog::new();
    let extensions = list_extensions(&profile.path, &mut log);
    ctx.out.flush(&mut log);

    println!();
    println!("Extensions in {}:", profile.name.bold());
    println!();
    if extensions.is_empty() {
        println!("  (none)");
    }
    for record in extensions.values() {
        let state = if record.is_enabled() {
            record.state.label().green()
        } else {
            record.state.label().red()
        };
        println!(
            "  {:<9} {:<40} {:<12} {}",
            state,
            record.display_name.cyan(),
            record.version,
            record.id.dimmed()
        );
    }
    println!();
    Ok(())
}

fn handle_show(ctx: &Context, profile: &str, extension: &str) -> Result<()> {
    let profiles = ctx.profiles()?;
    let profile = find_profile(&profiles, profile)?;

    let mut log = OpLog::new();
    let extensions = list_extensions(&profile.path, &mut log);
    ctx.out.flush(&mut log);
    let record =
        find_extension(&extensions, extension).ok_or_else(|| ExtKeeperError::ExtensionNotFound {
            id: extension.to_string(),
        })?;

    println!();
    println!("{}", record.display_name.bold());
    println!("  {:<20} {}", "ID:".cyan(), record.id);
    println!("  {:<20} {}", "Version:".cyan(), record.version);
    println!("  {:<20} {}", "State:".cyan(), record.state);
    println!(
        "  {:<20} {}",
        "Installed by default:".cyan(),
        if record.installed_by_default { "yes" } else { "no" }
    );
    println!("  {:<20} {}", "Path:".cyan(), record.install_path);
    println!("  {:<20} {:?}", "Manifest:".cyan(), record.manifest_source);
    println!("  {}", "Permissions:".cyan());
    if record.permissions.is_empty() {
        println!("    (none)");
    }
    for permission in &record.permissions {
        println!("    - {}", permission);
    }
    println!();
    Ok(())
}

fn handle_set_state(
    ctx: &Context,
    profile: &str,
    extension: &str,
    state: ExtensionState,
) -> Result<()> {
    let profiles = ctx.profiles()?;
    let profile = find_profile(&profiles, profile)?;
    let id = resolve_extension_id(ctx, &profile.path, extension)?;

    let mut log = OpLog::new();
    let result = mutator::set_extension_state(&profile.path, &id, state, &mut log);
    ctx.out.flush(&mut log);
    result?;

    ctx.out.ok(format!(
        "{} {} in '{}'. Restart the browser to apply.",
        state,
        extension,
        profile.name
    ));
    Ok(())
}

fn handle_panic(ctx: &Context, profile: &str) -> Result<()> {
    let profiles = ctx.profiles()?;
    let profile = find_profile(&profiles, profile)?;

    let mut log = OpLog::new();
    let disabled = mutator::disable_non_default(&profile.path, &mut log);
    ctx.out.flush(&mut log);

    ctx.out.ok(format!(
        "Disabled {} extension(s) in '{}'. Restart the browser if it was running.",
        disabled, profile.name
    ));
    Ok(())
}

fn handle_install(ctx: &Context, source: &str, extension: &str) -> Result<()> {
    let profiles = ctx.profiles()?;
    let source = find_profile(&profiles, source)?;
    let id = resolve_extension_id(ctx, &source.path, extension)?;

    let mut log = OpLog::new();
    let report = mutator::install_to_profiles(source, profiles.values(), &id, &mut log);
    ctx.out.flush(&mut log);
    let report = report?;

    print_failures(&report);
    ctx.out.ok(format!(
        "Installed {} to {} other profile(s).",
        id, report.succeeded
    ));
    Ok(())
}

fn handle_uninstall(ctx: &Context, extension: &str, from: Option<&str>) -> Result<()> {
    let profiles = ctx.profiles()?;
    let id = match from {
        Some(from) => {
            let profile = find_profile(&profiles, from)?;
            resolve_extension_id(ctx, &profile.path, extension)?
        }
        None if is_extension_id(extension) => extension.to_string(),
        None => {
            return Err(ExtKeeperError::ExtensionNotFound {
                id: format!("{} (pass a 32-character ID, or --from <profile>)", extension),
            })
        }
    };

    let mut log = OpLog::new();
    let report = mutator::remove_from_profiles(profiles.values(), &id, &mut log);
    ctx.out.flush(&mut log);

    print_failures(&report);
    ctx.out.ok(format!(
        "Uninstalled {} from {} profile(s).",
        id, report.succeeded
    ));
    Ok(())
}

fn print_failures(report: &FanOutReport) {
    for outcome in report.failed() {
        if let ProfileStatus::Failed(message) = &outcome.status {
            eprintln!(
                "{} {}: {}",
                "[FAILED]".red(),
                outcome.profile.yellow(),
                message
            );
        }
    }
}

fn handle_backup(ctx: &Context, profile: &str, file: Option<PathBuf>) -> Result<()> {
    let profiles = ctx.profiles()?;
    let profile = find_profile(&profiles, profile)?;
    let destination =
        file.unwrap_or_else(|| PathBuf::from(mutator::suggested_backup_name(ctx.browser, profile)));

    let mut log = OpLog::new();
    let result = mutator::backup(&profile.path, &destination, &mut log);
    ctx.out.flush(&mut log);
    let bundle = result?;

    let count = bundle
        .extensions_settings
        .as_ref()
        .and_then(|v| v.as_object())
        .map(|m| m.len())
        .unwrap_or(0);
    ctx.out.ok(format!(
        "Backed up {} entries from '{}' to {}",
        count,
        profile.name,
        destination.display()
    ));
    Ok(())
}

fn handle_restore(ctx: &Context, profile: &str, file: &Path) -> Result<()> {
    let profiles = ctx.profiles()?;
    let profile = find_profile(&profiles, profile)?;

    let mut log = OpLog::new();
    let result = mutator::restore(&profile.path, file, &mut log);
    ctx.out.flush(&mut log);
    let count = result?;

    ctx.out.ok(format!(
        "Restored {} entries into '{}'. Restart the browser to apply changes.",
        count, profile.name
    ));
    Ok(())
}

// =========================================================================
// Policy
// =========================================================================

fn describe_status(status: &PolicyStatus) -> String {
    match status {
        PolicyStatus::NotConfigured => "Not configured".dimmed().to_string(),
        PolicyStatus::Configured {
            raw,
            label: Some(label),
        } => format!("{} ({})", label.green(), raw),
        PolicyStatus::Configured { raw, label: None } => raw.green().to_string(),
    }
}

fn handle_policy(ctx: &Context, action: PolicyAction) -> Result<()> {
    let store = ctx.policy_store()?;
    let catalog = PolicyCatalog::builtin();

    match action {
        PolicyAction::List { category } => {
            println!();
            println!(
                "Policies under {}",
                format!("HKLM\\{}", store.root()).dimmed()
            );
            for name in catalog.categories() {
                if let Some(filter) = &category {
                    if !name.to_lowercase().contains(&filter.to_lowercase()) {
                        continue;
                    }
                }
                println!();
                println!("{}", name.bold());
                for def in catalog.in_category(name) {
                    let status = def.status(store.as_ref())?;
                    println!(
                        "  {:<34} {:<32} {}",
                        def.name,
                        def.key().cyan(),
                        describe_status(&status)
                    );
                }
            }
            println!();
        }
        PolicyAction::Get { policy } => {
            let def = catalog.find(&policy)?;
            print_policy(def, &def.status(store.as_ref())?);
        }
        PolicyAction::Set { policy, value } => {
            let def = catalog.find(&policy)?;
            let mut log = OpLog::new();
            let result = def.apply(store.as_ref(), &value, &mut log);
            ctx.out.flush(&mut log);
            match result? {
                PolicySetting::Unset => ctx.out.ok(format!("{} reset to default.", def.key())),
                PolicySetting::Value(v) => ctx.out.ok(format!("{} = {}", def.key(), v)),
            }
        }
        PolicyAction::Reset { policy } => {
            let def = catalog.find(&policy)?;
            let mut log = OpLog::new();
            let result = def.reset(store.as_ref(), &mut log);
            ctx.out.flush(&mut log);
            match result? {
                RemoveStatus::Removed => ctx.out.ok(format!("{} reset to default.", def.key())),
                RemoveStatus::NotFound => ctx.out.ok(format!("{} was not configured.", def.key())),
            }
        }
    }

    Ok(())
}

fn print_policy(def: &PolicyDef, status: &PolicyStatus) {
    println!();
    println!("{} ({})", def.name.bold(), def.category);
    println!("  {:<10} {}", "Key:".cyan(), def.key());
    println!("  {:<10} {}", "Type:".cyan(), def.kind);
    println!("  {:<10} {}", "Current:".cyan(), describe_status(status));
    println!("  {:<10} {}", "Help:".cyan(), def.help);
    match def.input {
        PolicyInput::Choice(options) => {
            println!("  {}", "Options:".cyan());
            for option in options {
                println!("    {:>3}  {}", option.value, option.label);
            }
        }
        PolicyInput::Text { placeholder } => {
            println!("  {:<10} {} (empty resets)", "Input:".cyan(), placeholder);
        }
    }
    println!();
}

fn handle_forcelist(ctx: &Context, action: IndexedAction) -> Result<()> {
    let store = ctx.policy_store()?;
    let mut forced = ForcedExtensions::new(store.as_ref(), ctx.config.policy.update_url.clone());
    let mut log = OpLog::new();

    let result = match action {
        IndexedAction::List => forced.list().map(|entries| {
            println!();
            if entries.is_empty() {
                println!("  (no forced extensions)");
            }
            for entry in entries {
                println!(
                    "  {:>4}  {}  {}",
                    entry.index.to_string().cyan(),
                    entry.id,
                    entry.update_url.unwrap_or_default().dimmed()
                );
            }
            println!();
        }),
        IndexedAction::Add { value } => forced.add(&value, &mut log).map(|outcome| match outcome {
            AddOutcome::Added(i) => ctx.out.ok(format!("Forced {} at index {}.", value, i)),
            AddOutcome::AlreadyListed(i) => {
                ctx.out.ok(format!("{} is already listed at index {}.", value, i))
            }
        }),
        IndexedAction::Remove { index } => forced.remove(index, &mut log).map(|status| {
            if status == RemoveStatus::Removed {
                ctx.out.ok(format!("Removed index {}.", index));
            }
        }),
    };

    ctx.out.flush(&mut log);
    result
}

fn handle_blocklist(ctx: &Context, action: IndexedAction) -> Result<()> {
    let store = ctx.policy_store()?;
    let mut blocklist = UrlBlocklist::new(store.as_ref());
    let mut log = OpLog::new();

    let result = match action {
        IndexedAction::List => blocklist.list().map(|entries| {
            println!();
            if entries.is_empty() {
                println!("  (no blocked URLs)");
            }
            for entry in entries {
                println!("  {:>4}  {}", entry.index.to_string().cyan(), entry.value);
            }
            println!();
        }),
        IndexedAction::Add { value } => blocklist.add(&value, &mut log).map(|outcome| {
            if let AddOutcome::Added(i) = outcome {
                ctx.out.ok(format!("Blocked {} at index {}.", value.trim(), i));
            }
        }),
        IndexedAction::Remove { index } => blocklist.remove(index, &mut log).map(|status| {
            if status == RemoveStatus::Removed {
                ctx.out.ok(format!("Removed index {}.", index));
            }
        }),
    };

    ctx.out.flush(&mut log);
    result
}

// =========================================================================
// Config
// =========================================================================

fn handle_config(action: ConfigAction, base_dir: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(base_dir)?;
            match config.get(&key) {
                Some(value) => {
                    println!("{}", value);
                }
                None => {
                    return Err(ExtKeeperError::ConfigKeyNotFound { key });
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(base_dir)?;
            config.set(&key, &value)?;
            config.save(base_dir)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = Config::load(base_dir)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            let path = Config::path(base_dir);
            println!("{}", path.display());
        }
        ConfigAction::Init => {
            let path = Config::init(base_dir)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}
