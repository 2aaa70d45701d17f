use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};

/// JSON key/value file standing in for browser storage.
///
/// Every call re-reads the file and writes only the key it touches, so two
/// handles on one file do not clobber each other. An unreadable or
/// non-object file reads as empty.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.load().remove(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(value) if !value.trim().is_empty() => Some(value),
            _ => None,
        }
    }

    pub fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.clone()).as_ref() != Some(&value)
        })
    }

    pub fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.update(|entries| entries.remove(key).is_some())
    }

    /// Applies `change` to a fresh read; writes only when it reports a change.
    fn update<F>(&self, change: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Map<String, Value>) -> bool,
    {
        let mut entries = self.load();
        if !change(&mut entries) {
            return Ok(());
        }
        self.save(&entries)
    }

    fn load(&self) -> Map<String, Value> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .and_then(|value| match value {
                Value::Object(entries) => Some(entries),
                _ => None,
            })
            .unwrap_or_default()
    }

    // Written beside the target and renamed over it, so a crash mid-write
    // leaves the previous file intact.
    fn save(&self, entries: &Map<String, Value>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, serde_json::to_vec_pretty(entries)?)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        std::fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::LocalStore;

    #[test]
    fn store_round_trips_values() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalStore::new(temp.path().join("storage.json"));
        store.set("api_key", json!("AIza-test"))?;
        assert_eq!(store.get_string("api_key").as_deref(), Some("AIza-test"));

        let reopened = LocalStore::new(temp.path().join("storage.json"));
        assert_eq!(reopened.get("api_key"), Some(json!("AIza-test")));
        Ok(())
    }

    #[test]
    fn remove_deletes_key_on_disk() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        let store = LocalStore::new(&path);
        store.set("a", json!(1))?;
        store.set("b", json!(2))?;
        store.remove("a")?;

        let reopened = LocalStore::new(&path);
        assert_eq!(reopened.get("a"), None);
        assert_eq!(reopened.get("b"), Some(json!(2)));
        Ok(())
    }

    #[test]
    fn handles_on_one_file_merge_their_writes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        let store_a = LocalStore::new(&path);
        let store_b = LocalStore::new(&path);

        store_a.set("a", json!(1))?;
        store_b.set("b", json!(2))?;
        store_a.set("c", json!(3))?;

        let reloaded = LocalStore::new(path);
        assert_eq!(reloaded.get("a"), Some(json!(1)));
        assert_eq!(reloaded.get("b"), Some(json!(2)));
        assert_eq!(reloaded.get("c"), Some(json!(3)));
        Ok(())
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_replaced_on_write() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        std::fs::write(&path, "[1, 2, not json")?;

        let store = LocalStore::new(&path);
        assert_eq!(store.get("anything"), None);
        store.set("fresh", json!(true))?;

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(raw, json!({"fresh": true}));
        Ok(())
    }

    #[test]
    fn unchanged_value_does_not_rewrite() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        let store = LocalStore::new(&path);
        store.set("a", json!(1))?;
        std::fs::write(&path, "{\"a\": 1, \"hand_edit\": true}")?;
        store.set("a", json!(1))?;
        assert!(std::fs::read_to_string(&path)?.contains("hand_edit"));
        assert!(!path.with_extension("json.tmp").exists());
        Ok(())
    }

    #[test]
    fn blank_strings_read_as_missing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalStore::new(temp.path().join("storage.json"));
        store.set("api_key", json!("   "))?;
        assert_eq!(store.get_string("api_key"), None);
        Ok(())
    }
}
