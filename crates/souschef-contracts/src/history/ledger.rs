use std::path::PathBuf;

use serde_json::Value;

use crate::storage::LocalStore;

pub const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryCategory {
    Quotes,
    RecipeTitles,
    PlanTitles,
    PassportDishes,
}

impl HistoryCategory {
    pub const ALL: [HistoryCategory; 4] = [
        HistoryCategory::Quotes,
        HistoryCategory::RecipeTitles,
        HistoryCategory::PlanTitles,
        HistoryCategory::PassportDishes,
    ];

    pub fn storage_key(self) -> &'static str {
        match self {
            HistoryCategory::Quotes => "history.quotes",
            HistoryCategory::RecipeTitles => "history.recipe_titles",
            HistoryCategory::PlanTitles => "history.plan_titles",
            HistoryCategory::PassportDishes => "history.passport_dishes",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HistoryCategory::Quotes => "quotes",
            HistoryCategory::RecipeTitles => "recipes",
            HistoryCategory::PlanTitles => "plans",
            HistoryCategory::PassportDishes => "passport",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.label() == wanted)
    }
}

/// Composite ledger key for a passport dish, scoped by destination.
pub fn passport_key(destination: &str, dish: &str) -> String {
    format!("{}|{}", destination.trim(), dish.trim())
}

/// Seen-item history, newest first, capped per category.
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    store: LocalStore,
}

impl HistoryLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: LocalStore::new(path),
        }
    }

    /// Current list for a category. Anything that is not an array of strings
    /// is treated as empty and reset on disk.
    pub fn list(&mut self, category: HistoryCategory) -> Vec<String> {
        let key = category.storage_key();
        match self.store.get(key) {
            None => Vec::new(),
            Some(value) => match parse_entries(&value) {
                Some(entries) => entries,
                None => {
                    let _ = self.store.set(key, Value::Array(Vec::new()));
                    Vec::new()
                }
            },
        }
    }

    pub fn record(&mut self, category: HistoryCategory, key: &str) -> anyhow::Result<()> {
        self.record_all(category, [key])
    }

    /// Records keys in order, so the last one ends up newest.
    pub fn record_all<I, S>(&mut self, category: HistoryCategory, keys: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = self.list(category);
        let mut changed = false;
        for key in keys {
            let key = key.as_ref().trim();
            if key.is_empty() {
                continue;
            }
            entries.retain(|existing| existing != key);
            entries.insert(0, key.to_string());
            changed = true;
        }
        if !changed {
            return Ok(());
        }
        entries.truncate(HISTORY_CAPACITY);
        self.store.set(
            category.storage_key(),
            Value::Array(entries.into_iter().map(Value::String).collect()),
        )
    }

    pub fn clear(&mut self, category: HistoryCategory) -> anyhow::Result<()> {
        self.store
            .set(category.storage_key(), Value::Array(Vec::new()))
    }
}

fn parse_entries(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}
