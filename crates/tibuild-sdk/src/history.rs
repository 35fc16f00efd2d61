//! Recently executed build targets.
//!
//! The store is bounded to [`HISTORY_LIMIT`] entries, most recent first.

use std::fs;
use std::path::Path;

use crate::prompt::SelectableItem;
use crate::types::{BuildError, BuildTarget};

/// Maximum number of remembered targets.
pub const HISTORY_LIMIT: usize = 10;

/// Bounded, most-recent-first list of build targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryStore {
    entries: Vec<BuildTarget>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from entries ordered most recent first.
    pub fn from_entries(mut entries: Vec<BuildTarget>) -> Self {
        entries.truncate(HISTORY_LIMIT);
        Self { entries }
    }

    /// Inserts `target` at the front, evicting the oldest entries past the limit.
    pub fn push(&mut self, target: BuildTarget) {
        self.entries.insert(0, target);
        self.entries.truncate(HISTORY_LIMIT);
    }

    /// The most recent target. Never reorders.
    pub fn head(&self) -> Option<&BuildTarget> {
        self.entries.first()
    }

    /// Items for a selection list, indexed by position.
    pub fn browse(&self) -> Vec<SelectableItem> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, target)| {
                SelectableItem::detailed(
                    format!("{} / {}", target.project_name(), target.name),
                    target.args.join(" "),
                    index,
                )
            })
            .collect()
    }

    /// Moves entry `index` to the front, keeping the others in order.
    pub fn promote(&mut self, index: usize) -> Option<&BuildTarget> {
        if index >= self.entries.len() {
            return None;
        }
        let target = self.entries.remove(index);
        self.entries.insert(0, target);
        self.entries.first()
    }

    pub fn entries(&self) -> &[BuildTarget] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads a store saved with [`HistoryStore::save`].
    ///
    /// A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = fs::read_to_string(path)?;
        let entries: Vec<BuildTarget> = serde_json::from_str(&contents).map_err(|e| {
            BuildError::Config(format!("invalid history file {}: {}", path.display(), e))
        })?;
        Ok(Self::from_entries(entries))
    }

    /// Writes the store as JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), BuildError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(|e| {
            BuildError::Config(format!("failed to serialize history: {}", e))
        })?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeploymentTarget, Platform};

    fn target(name: &str) -> BuildTarget {
        BuildTarget::new(
            Platform::Android,
            Some(DeploymentTarget::Device),
            name,
            "titanium",
            vec!["build".into(), "--target".into(), name.into()],
            "/work/App",
        )
    }

    fn names(store: &HistoryStore) -> Vec<&str> {
        store.entries().iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_push_is_most_recent_first() {
        let mut store = HistoryStore::new();
        store.push(target("a"));
        store.push(target("b"));
        assert_eq!(names(&store), vec!["b", "a"]);
        assert_eq!(store.head().map(|t| t.name.as_str()), Some("b"));
    }

    #[test]
    fn test_eleventh_push_evicts_oldest() {
        let mut store = HistoryStore::new();
        for i in 0..11 {
            store.push(target(&i.to_string()));
        }
        assert_eq!(store.len(), HISTORY_LIMIT);
        assert_eq!(store.head().unwrap().name, "10");
        assert!(!names(&store).contains(&"0"));
        assert_eq!(store.entries().last().unwrap().name, "1");
    }

    #[test]
    fn test_head_does_not_reorder() {
        let mut store = HistoryStore::new();
        store.push(target("a"));
        store.push(target("b"));
        let before = store.clone();
        let _ = store.head();
        let _ = store.head();
        assert_eq!(store, before);
    }

    #[test]
    fn test_promote_keeps_relative_order() {
        let mut store = HistoryStore::new();
        for name in ["e", "d", "c", "b", "a"] {
            store.push(target(name));
        }
        assert_eq!(names(&store), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(store.promote(3).map(|t| t.name.clone()), Some("d".into()));
        assert_eq!(names(&store), vec!["d", "a", "b", "c", "e"]);
        assert_eq!(store.len(), 5);
        assert!(store.promote(9).is_none());
    }

    #[test]
    fn test_browse_items() {
        let mut store = HistoryStore::new();
        store.push(target("device"));
        let items = store.browse();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label(), "App / device");
        assert_eq!(items[0].detail(), Some("build --target device"));
        assert_eq!(items[0].index(), Some(0));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/history.json");

        let mut store = HistoryStore::new();
        store.push(target("a"));
        store.push(target("b"));
        store.save(&path).unwrap();

        let loaded = HistoryStore::load(&path).unwrap();
        assert_eq!(loaded, store);

        let missing = HistoryStore::load(&dir.path().join("missing.json")).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_from_entries_truncates() {
        let entries = (0..15).map(|i| target(&i.to_string())).collect();
        let store = HistoryStore::from_entries(entries);
        assert_eq!(store.len(), HISTORY_LIMIT);
        assert_eq!(store.head().unwrap().name, "0");
    }
}
