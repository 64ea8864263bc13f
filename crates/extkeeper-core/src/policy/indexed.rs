//! List-style policies
//!
//! Each element is stored as its own value whose name is a positive decimal
//! index. New elements go to `max + 1`; indices freed by a removal are never
//! handed out again by the same [`IndexedList`].

use super::{PolicyStore, PolicyValue, RemoveStatus, BLOCKLIST_SCOPE, FORCELIST_SCOPE};
use crate::error::{ExtKeeperError, Result};
use crate::extension::is_extension_id;
use crate::oplog::OpLog;

/// `max(existing) + 1`, or `1` when empty; `None` once `u32::MAX` is taken
pub fn next_free_index(existing: impl IntoIterator<Item = u32>) -> Option<u32> {
    existing.into_iter().max().map_or(Some(1), |max| max.checked_add(1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedEntry {
    pub index: u32,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added(u32),
    /// Already listed at this index; nothing written
    AlreadyListed(u32),
}

impl AddOutcome {
    pub fn index(&self) -> u32 {
        match self {
            Self::Added(i) | Self::AlreadyListed(i) => *i,
        }
    }
}

/// One indexed scope with a session high-water mark
pub struct IndexedList<'s> {
    store: &'s dyn PolicyStore,
    scope: &'static str,
    high_water: u32,
}

impl<'s> IndexedList<'s> {
    pub fn new(store: &'s dyn PolicyStore, scope: &'static str) -> Self {
        Self {
            store,
            scope,
            high_water: 0,
        }
    }

    pub fn scope(&self) -> &str {
        self.scope
    }

    /// Current entries sorted by index
    ///
    /// Values whose name is not a positive integer are ignored.
    pub fn entries(&mut self) -> Result<Vec<IndexedEntry>> {
        let mut entries: Vec<IndexedEntry> = self
            .store
            .list_values(self.scope)?
            .into_iter()
            .filter_map(|(name, value)| {
                let index = name.trim().parse::<u32>().ok().filter(|i| *i > 0)?;
                Some(IndexedEntry {
                    index,
                    value: value.to_string(),
                })
            })
            .collect();
        entries.sort_by_key(|e| e.index);
        if let Some(last) = entries.last() {
            self.high_water = self.high_water.max(last.index);
        }
        Ok(entries)
    }

    /// Index the next [`push`](Self::push) will use
    pub fn next_index(&mut self) -> Result<u32> {
        let existing = self.entries()?;
        next_free_index(existing.iter().map(|e| e.index).chain([self.high_water])).ok_or_else(
            || ExtKeeperError::PolicyStore {
                message: format!("no free index left in {}", self.scope),
            },
        )
    }

    /// Append `value` at the next free index
    pub fn push(&mut self, value: &str) -> Result<u32> {
        let index = self.next_index()?;
        self.store.set_value(
            self.scope,
            &index.to_string(),
            &PolicyValue::String(value.to_string()),
        )?;
        self.high_water = index;
        Ok(index)
    }

    pub fn remove(&mut self, index: u32) -> Result<RemoveStatus> {
        let status = self.store.remove_value(self.scope, &index.to_string())?;
        // Only an index that was really in use is retired
        if status == RemoveStatus::Removed {
            self.high_water = self.high_water.max(index);
        }
        Ok(status)
    }
}

// =========================================================================
// Forced-install list
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedExtension {
    pub index: u32,
    pub id: String,
    /// Text after the `;`, if any
    pub update_url: Option<String>,
}

impl From<IndexedEntry> for ForcedExtension {
    fn from(entry: IndexedEntry) -> Self {
        let (id, update_url) = match entry.value.split_once(';') {
            Some((id, url)) => (id.trim().to_string(), Some(url.trim().to_string())),
            None => (entry.value.trim().to_string(), None),
        };
        Self {
            index: entry.index,
            id,
            update_url,
        }
    }
}

/// `ExtensionInstallForcelist`: values are `"<id>;<update-url>"`
pub struct ForcedExtensions<'s> {
    list: IndexedList<'s>,
    update_url: String,
}

impl<'s> ForcedExtensions<'s> {
    pub fn new(store: &'s dyn PolicyStore, update_url: impl Into<String>) -> Self {
        Self {
            list: IndexedList::new(store, FORCELIST_SCOPE),
            update_url: update_url.into(),
        }
    }

    pub fn list(&mut self) -> Result<Vec<ForcedExtension>> {
        Ok(self
            .list
            .entries()?
            .into_iter()
            .map(ForcedExtension::from)
            .collect())
    }

    pub fn add(&mut self, ext_id: &str, log: &mut OpLog) -> Result<AddOutcome> {
        if !is_extension_id(ext_id) {
            log.error(format!("Invalid extension ID: {}", ext_id));
            return Err(ExtKeeperError::InvalidPolicyValue {
                policy: FORCELIST_SCOPE.to_string(),
                value: ext_id.to_string(),
            });
        }

        if let Some(existing) = self.list()?.into_iter().find(|e| e.id == ext_id) {
            log.info(format!(
                "Extension {} is already in the policy list.",
                ext_id
            ));
            return Ok(AddOutcome::AlreadyListed(existing.index));
        }

        let index = self.list.next_index()?;
        log.info(format!("Adding policy for {} at index {}...", ext_id, index));
        let value = format!("{};{}", ext_id, self.update_url);
        let index = self.list.push(&value).map_err(|e| {
            log.error(format!("Failed to add {}: {}", ext_id, e));
            e
        })?;
        log.info("Policy set successfully.");
        Ok(AddOutcome::Added(index))
    }

    pub fn remove(&mut self, index: u32, log: &mut OpLog) -> Result<RemoveStatus> {
        log.info(format!("Removing policy at index {}...", index));
        remove_logged(&mut self.list, index, log)
    }
}

// =========================================================================
// URL blocklist
// =========================================================================

/// `URLBlocklist`: values are raw URL patterns
pub struct UrlBlocklist<'s> {
    list: IndexedList<'s>,
}

impl<'s> UrlBlocklist<'s> {
    pub fn new(store: &'s dyn PolicyStore) -> Self {
        Self {
            list: IndexedList::new(store, BLOCKLIST_SCOPE),
        }
    }

    pub fn list(&mut self) -> Result<Vec<IndexedEntry>> {
        self.list.entries()
    }

    pub fn add(&mut self, pattern: &str, log: &mut OpLog) -> Result<AddOutcome> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(ExtKeeperError::InvalidPolicyValue {
                policy: BLOCKLIST_SCOPE.to_string(),
                value: pattern.to_string(),
            });
        }

        if let Some(existing) = self.list()?.into_iter().find(|e| e.value == pattern) {
            log.warn(format!("'{}' is already in the blocklist.", pattern));
            return Ok(AddOutcome::AlreadyListed(existing.index));
        }

        let index = self.list.push(pattern).map_err(|e| {
            log.error(format!("Failed to block '{}': {}", pattern, e));
            e
        })?;
        log.info(format!("Blocked '{}' at index {}.", pattern, index));
        Ok(AddOutcome::Added(index))
    }

    pub fn remove(&mut self, index: u32, log: &mut OpLog) -> Result<RemoveStatus> {
        remove_logged(&mut self.list, index, log)
    }
}

fn remove_logged(list: &mut IndexedList<'_>, index: u32, log: &mut OpLog) -> Result<RemoveStatus> {
    match list.remove(index) {
        Ok(RemoveStatus::Removed) => {
            log.info(format!("Removed {} index {}.", list.scope(), index));
            Ok(RemoveStatus::Removed)
        }
        Ok(RemoveStatus::NotFound) => {
            log.warn(format!(
                "{} index {} was not found; nothing to remove.",
                list.scope(),
                index
            ));
            Ok(RemoveStatus::NotFound)
        }
        Err(e) => {
            log.error(format!("Failed to remove {} index {}: {}", list.scope(), index, e));
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{JsonFilePolicyStore, DEFAULT_UPDATE_URL};

    const ID: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn store(tmp: &tempfile::TempDir) -> JsonFilePolicyStore {
        JsonFilePolicyStore::new(tmp.path().join("p.json"), r"SOFTWARE\Policies\Google\Chrome")
    }

    #[test]
    fn next_free_index_basics() {
        assert_eq!(next_free_index([]), Some(1));
        assert_eq!(next_free_index([1, 2, 5]), Some(6));
        assert_eq!(next_free_index([3]), Some(4));
        assert_eq!(next_free_index([1, u32::MAX]), None);
    }

    #[test]
    fn push_after_max_index_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp);
        s.set_value(BLOCKLIST_SCOPE, "4294967295", &PolicyValue::String("x.com".into()))
            .unwrap();

        let mut list = IndexedList::new(&s, BLOCKLIST_SCOPE);
        assert!(matches!(
            list.push("y.com"),
            Err(ExtKeeperError::PolicyStore { .. })
        ));
        assert_eq!(s.list_values(BLOCKLIST_SCOPE).unwrap().len(), 1);
        assert_eq!(s.get_value(BLOCKLIST_SCOPE, "0").unwrap(), None);
    }

    #[test]
    fn removing_absent_index_keeps_high_water() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp);
        let mut list = IndexedList::new(&s, BLOCKLIST_SCOPE);

        assert_eq!(list.push("a.com").unwrap(), 1);
        assert_eq!(list.remove(u32::MAX).unwrap(), RemoveStatus::NotFound);
        assert_eq!(list.push("b.com").unwrap(), 2);
    }

    #[test]
    fn entries_ignore_non_numeric_names() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp);
        s.set_value(BLOCKLIST_SCOPE, "2", &PolicyValue::String("b".into())).unwrap();
        s.set_value(BLOCKLIST_SCOPE, "junk", &PolicyValue::String("x".into())).unwrap();
        s.set_value(BLOCKLIST_SCOPE, "0", &PolicyValue::String("z".into())).unwrap();
        s.set_value(BLOCKLIST_SCOPE, "10", &PolicyValue::String("c".into())).unwrap();

        let mut list = IndexedList::new(&s, BLOCKLIST_SCOPE);
        let indices: Vec<u32> = list.entries().unwrap().iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![2, 10]);
    }

    #[test]
    fn forced_add_writes_id_and_update_url() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp);
        let mut forced = ForcedExtensions::new(&s, DEFAULT_UPDATE_URL);
        let mut log = OpLog::new();

        assert_eq!(forced.add(ID, &mut log).unwrap(), AddOutcome::Added(1));
        assert_eq!(
            s.get_value(FORCELIST_SCOPE, "1").unwrap(),
            Some(PolicyValue::String(format!("{};{}", ID, DEFAULT_UPDATE_URL)))
        );

        assert_eq!(forced.add(ID, &mut log).unwrap(), AddOutcome::AlreadyListed(1));
        assert!(log.contains("already in the policy list"));

        let listed = forced.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, ID);
        assert_eq!(listed[0].update_url.as_deref(), Some(DEFAULT_UPDATE_URL));
    }

    #[test]
    fn forced_add_rejects_bad_id() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp);
        let mut forced = ForcedExtensions::new(&s, DEFAULT_UPDATE_URL);
        assert!(matches!(
            forced.add("short", &mut OpLog::new()),
            Err(ExtKeeperError::InvalidPolicyValue { .. })
        ));
    }

    #[test]
    fn blocklist_duplicates_and_removal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp);
        let mut blocklist = UrlBlocklist::new(&s);
        let mut log = OpLog::new();

        assert_eq!(blocklist.add("example.com", &mut log).unwrap(), AddOutcome::Added(1));
        assert_eq!(blocklist.add("*.ads.net", &mut log).unwrap(), AddOutcome::Added(2));
        assert_eq!(
            blocklist.add(" example.com ", &mut log).unwrap(),
            AddOutcome::AlreadyListed(1)
        );

        assert_eq!(blocklist.remove(2, &mut log).unwrap(), RemoveStatus::Removed);
        assert_eq!(blocklist.remove(2, &mut log).unwrap(), RemoveStatus::NotFound);
        // Index 2 is not reused within this session
        assert_eq!(blocklist.add("tracker.io", &mut log).unwrap(), AddOutcome::Added(3));

        let values: Vec<String> = blocklist.list().unwrap().into_iter().map(|e| e.value).collect();
        assert_eq!(values, vec!["example.com", "tracker.io"]);
    }
}
