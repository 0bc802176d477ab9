use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Named sampling selections, persisted as a JSON map next to the binary.
/// Loaded at startup and written back on shutdown.
#[derive(Debug, Clone, Default)]
pub struct SelectionStore {
    path: PathBuf,
    entries: BTreeMap<String, Vec<String>>,
}

impl SelectionStore {
    /// Reads the store from disk. A missing or unreadable file starts an
    /// empty store rather than failing startup.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(event = "selection_store_corrupt", path = %path.display(), error = %err);
                    BTreeMap::new()
                }
            },
            Err(err) => {
                warn!(event = "selection_store_missing", path = %path.display(), error = %err);
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saves a selection under `name`. Existing names are kept as-is, same
    /// as refusing the save in the UI.
    pub fn insert(&mut self, name: &str, vars: Vec<String>) -> bool {
        if self.entries.contains_key(name) {
            warn!(event = "selection_name_taken", name);
            return false;
        }
        self.entries.insert(name.to_string(), vars);
        true
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Whether `name` holds the same variable set as `current`, ignoring
    /// order. Re-requesting the active selection is pointless.
    pub fn is_same_selection(&self, name: &str, current: &[String]) -> bool {
        let Some(stored) = self.entries.get(name) else {
            return false;
        };
        let stored: HashSet<&str> = stored.iter().map(String::as_str).collect();
        let current: HashSet<&str> = current.iter().map(String::as_str).collect();
        stored == current
    }

    pub fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.entries).context("serialize selections")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("write selections to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SelectionStore::load(dir.path().join("selections.txt"));
        assert_eq!(store.names().count(), 0);
    }

    #[test]
    fn persist_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selections.txt");

        let mut store = SelectionStore::load(&path);
        assert!(store.insert("hot-cores", vec!["cpu0:insn".into(), "cpu1:insn".into()]));
        store.persist().unwrap();

        let reloaded = SelectionStore::load(&path);
        assert_eq!(
            reloaded.get("hot-cores").unwrap(),
            &["cpu0:insn".to_string(), "cpu1:insn".to_string()]
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SelectionStore::load(dir.path().join("selections.txt"));
        assert!(store.insert("a", vec!["x".into()]));
        assert!(!store.insert("a", vec!["y".into()]));
        assert_eq!(store.get("a").unwrap(), &["x".to_string()]);
    }

    #[test]
    fn same_selection_ignores_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SelectionStore::load(dir.path().join("selections.txt"));
        store.insert("s", vec!["a".into(), "b".into()]);
        assert!(store.is_same_selection("s", &["b".into(), "a".into()]));
        assert!(!store.is_same_selection("s", &["a".into()]));
        assert!(!store.is_same_selection("missing", &[]));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selections.txt");
        fs::write(&path, "{not json").unwrap();
        let store = SelectionStore::load(&path);
        assert_eq!(store.names().count(), 0);
    }
}
