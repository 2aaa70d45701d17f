use std::path::Path;

use anyhow::Context;
use indexmap::IndexSet;

/// De-duplicated shopping list, first occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShoppingList {
    items: IndexSet<String>,
}

impl ShoppingList {
    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    pub fn items(&self) -> Vec<&str> {
        self.items.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Body of the downloadable list: one item per line.
    pub fn download_content(&self) -> String {
        self.items
            .iter()
            .map(String::as_str)
            .collect::<Vec<&str>>()
            .join("\n")
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.download_content())
            .with_context(|| format!("failed to write shopping list {}", path.display()))
    }
}
