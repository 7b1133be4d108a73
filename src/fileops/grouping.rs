use anyhow::Result;
use std::collections::HashSet;

use crate::db::{CatalogStore, ItemInfo};

/// Items plus the companions grouped under them (RAW+JPEG pairs and the like).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedItemsFinder {
    /// Inputs in their given order, then grouped companions; unique by id.
    pub items: Vec<ItemInfo>,
}

impl GroupedItemsFinder {
    pub fn new(store: &dyn CatalogStore, items: &[ItemInfo]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut expanded = Vec::with_capacity(items.len());

        for item in items {
            if seen.insert(item.id) {
                expanded.push(item.clone());
            }
        }

        for item in items {
            for companion in store.grouped_items(item.id)? {
                if seen.insert(companion.id) {
                    expanded.push(companion);
                }
            }
        }

        Ok(Self { items: expanded })
    }

    pub fn ids(&self) -> Vec<i64> {
        self.items.iter().map(|i| i.id).collect()
    }
}
