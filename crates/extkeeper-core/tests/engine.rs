//! End-to-end checks across profile discovery, inventory and mutation

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::TempDir;

use extkeeper_core::extension::asset_folder;
use extkeeper_core::mutator::{self, ProfileStatus};
use extkeeper_core::policy::{next_free_index, IndexedList, PolicyValue, BLOCKLIST_SCOPE};
use extkeeper_core::prefs::{backup_path, preferences_path};
use extkeeper_core::{
    list_extensions, ExtensionState, JsonFilePolicyStore, OpLog, PolicyStore, ProfileLocator,
};

const ID_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const ID_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const ID_C: &str = "cccccccccccccccccccccccccccccccc";

fn write_profile(root: &Path, dir: &str, prefs: &Value) -> PathBuf {
    let path = root.join(dir);
    fs::create_dir_all(&path).unwrap();
    fs::write(preferences_path(&path), prefs.to_string()).unwrap();
    path
}

fn read_prefs(profile_dir: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(preferences_path(profile_dir)).unwrap()).unwrap()
}

fn entry(name: &str, state: i64) -> Value {
    json!({
        "state": state,
        "path": "x/1.0",
        "manifest": {"name": name, "version": "1.0", "permissions": ["tabs", "storage"]}
    })
}

#[test]
fn duplicate_names_are_numbered_in_first_seen_order() {
    let tmp = TempDir::new().unwrap();
    let same = json!({"profile": {"name": "Shared"}});
    write_profile(tmp.path(), "Default", &same);
    write_profile(tmp.path(), "Profile 1", &same);
    write_profile(tmp.path(), "Profile 2", &same);

    let profiles = ProfileLocator::new(tmp.path().to_path_buf()).scan(&mut OpLog::new());
    let names: Vec<&str> = profiles.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["Shared", "Shared (2)", "Shared (3)"]);

    let dir = write_profile(
        tmp.path(),
        "Profile 3",
        &json!({"extensions": {"settings": {
            ID_A: entry("Tool", 1),
            ID_B: entry("Tool", 1),
            ID_C: entry("Tool", 0)
        }}}),
    );
    let extensions = list_extensions(&dir, &mut OpLog::new());
    assert_eq!(extensions["Tool"].id, ID_A);
    assert_eq!(extensions["Tool (2)"].id, ID_B);
    assert_eq!(extensions["Tool (3)"].id, ID_C);
}

#[test]
fn set_state_changes_only_the_state() {
    let tmp = TempDir::new().unwrap();
    let dir = write_profile(
        tmp.path(),
        "Default",
        &json!({"extensions": {"settings": {ID_A: entry("Alpha", 1)}}}),
    );

    let before = list_extensions(&dir, &mut OpLog::new())["Alpha"].clone();
    mutator::set_extension_state(&dir, ID_A, ExtensionState::Disabled, &mut OpLog::new())
        .unwrap();
    let after = list_extensions(&dir, &mut OpLog::new())["Alpha"].clone();

    assert_eq!(after.state, ExtensionState::Disabled);
    assert_eq!(
        after,
        extkeeper_core::ExtensionRecord {
            state: ExtensionState::Disabled,
            ..before
        }
    );
}

#[test]
fn backup_then_restore_keeps_settings() {
    let tmp = TempDir::new().unwrap();
    let dir = write_profile(
        tmp.path(),
        "Default",
        &json!({
            "profile": {"name": "Me"},
            "extensions": {"settings": {
                ID_A: entry("Alpha", 1),
                ID_B: {"state": 0, "nested": {"deep": [1, 2.50, "x"]}}
            }}
        }),
    );
    let original = read_prefs(&dir)["extensions"]["settings"].clone();
    let bundle = tmp.path().join("bundle.json");

    mutator::backup(&dir, &bundle, &mut OpLog::new()).unwrap();
    mutator::restore(&dir, &bundle, &mut OpLog::new()).unwrap();

    assert_eq!(read_prefs(&dir)["extensions"]["settings"], original);
}

#[test]
fn indexed_list_never_reuses_freed_indices() {
    assert_eq!(next_free_index([1, 2, 5]), Some(6));

    let tmp = TempDir::new().unwrap();
    let store = JsonFilePolicyStore::new(tmp.path().join("p.json"), r"SOFTWARE\Policies\Google\Chrome");
    for (index, url) in [(1, "a.com"), (2, "b.com"), (5, "c.com")] {
        store
            .set_value(BLOCKLIST_SCOPE, &index.to_string(), &PolicyValue::String(url.into()))
            .unwrap();
    }

    let mut list = IndexedList::new(&store, BLOCKLIST_SCOPE);
    assert_eq!(list.next_index().unwrap(), 6);

    list.remove(5).unwrap();
    assert_eq!(list.push("d.com").unwrap(), 6);

    list.remove(6).unwrap();
    let next = list.push("e.com").unwrap();
    assert_ne!(next, 5);
    assert_eq!(next, 7);
}

#[test]
fn install_fan_out_continues_past_a_failed_profile() {
    let tmp = TempDir::new().unwrap();
    let source = write_profile(
        tmp.path(),
        "Default",
        &json!({"extensions": {"settings": {ID_A: entry("Alpha", 1)}}}),
    );
    let version = asset_folder(&source, ID_A).join("1.0");
    fs::create_dir_all(&version).unwrap();
    fs::write(version.join("manifest.json"), r#"{"name":"Alpha"}"#).unwrap();

    for dir in ["Profile 1", "Profile 2", "Profile 3"] {
        write_profile(tmp.path(), dir, &json!({}));
    }
    // A plain file where the asset tree should go makes the copy fail
    fs::write(tmp.path().join("Profile 2").join("Extensions"), "blocker").unwrap();

    let profiles = ProfileLocator::new(tmp.path().to_path_buf()).scan(&mut OpLog::new());
    let mut log = OpLog::new();
    let report =
        mutator::install_to_profiles(&profiles["Default"], profiles.values(), ID_A, &mut log)
            .unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.outcomes.len(), 3);
    assert!(matches!(report.outcomes[1].status, ProfileStatus::Failed(_)));
    assert!(log.contains("Failed for 'Profile 2'"));

    let third = tmp.path().join("Profile 3");
    assert!(read_prefs(&third)["extensions"]["settings"][ID_A].is_object());
    assert!(asset_folder(&third, ID_A).join("1.0/manifest.json").is_file());
    assert!(read_prefs(&tmp.path().join("Profile 2")).get("extensions").is_none());
}

#[test]
fn placeholder_names_resolve_through_locale_messages() {
    let tmp = TempDir::new().unwrap();
    let manifest = json!({"name": "__MSG_appName__", "default_locale": "en", "version": "2.0"});
    let dir = write_profile(
        tmp.path(),
        "Default",
        &json!({"extensions": {"settings": {
            ID_A: {"state": 1, "path": format!("{}/2.0", ID_A), "manifest": manifest.clone()},
            ID_B: {"state": 1, "path": format!("{}/2.0", ID_B), "manifest": manifest.clone()}
        }}}),
    );

    let locale = asset_folder(&dir, ID_A).join("2.0/_locales/en");
    fs::create_dir_all(&locale).unwrap();
    fs::write(
        locale.join("messages.json"),
        r#"{"appName": {"message": "Foo Bar"}}"#,
    )
    .unwrap();

    let extensions = list_extensions(&dir, &mut OpLog::new());
    assert_eq!(extensions["Foo Bar"].id, ID_A);
    assert_eq!(extensions[ID_B].id, ID_B);
}

#[test]
fn remove_entry_leaves_original_in_backup() {
    let tmp = TempDir::new().unwrap();
    let dir = write_profile(
        tmp.path(),
        "Default",
        &json!({"extensions": {"settings": {ID_A: {"state": 1}}}}),
    );

    let outcome = mutator::remove_extension_entry(&dir, ID_A, &mut OpLog::new()).unwrap();
    assert!(outcome.settings_removed);
    assert!(!outcome.folder_removed);

    assert!(list_extensions(&dir, &mut OpLog::new()).is_empty());
    assert!(read_prefs(&dir)["extensions"]["settings"].get(ID_A).is_none());

    let bak: Value =
        serde_json::from_str(&fs::read_to_string(backup_path(&dir)).unwrap()).unwrap();
    assert_eq!(bak["extensions"]["settings"][ID_A]["state"], json!(1));
}
