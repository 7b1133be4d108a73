mod schema;
pub mod sqlite;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

pub use schema::{MIGRATIONS, SCHEMA, SCHEMA_VERSION};
pub use sqlite::SqliteCatalog;

/// Stored album row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumInfo {
    pub id: i64,
    pub album_root_id: i32,
    pub relative_path: String,
    pub caption: String,
    pub collection: String,
    pub date: Option<NaiveDate>,
    /// Location of the icon item: its album root and its path relative to that root.
    pub icon_root_id: Option<i32>,
    pub icon_relative_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub id: i64,
    pub pid: i64,
    pub name: String,
    /// System icon name.
    pub icon: Option<String>,
    pub icon_root_id: Option<i32>,
    pub icon_relative_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchInfo {
    pub id: i64,
    pub name: String,
    pub query: String,
    pub temporary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
    pub id: i64,
    pub album_id: i64,
    pub album_root_id: i32,
    /// Relative path of the owning album.
    pub album_path: String,
    pub name: String,
    pub group_leader: Option<i64>,
}

impl ItemInfo {
    /// Path of the item relative to its album root.
    pub fn relative_path(&self) -> String {
        child_path(&self.album_path, &self.name)
    }
}

/// Join a root-relative directory path and an entry name (`/` + `a` is `/a`).
pub fn child_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{}/{}", parent, name)
}

/// Icon assigned to a tag: a system icon name or a catalogued item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagIcon {
    pub icon: Option<String>,
    pub item_id: Option<i64>,
}

/// Advance notice that files are about to change under a watched root, so the
/// change is not mistaken for an external modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferHint {
    AlbumTransfer { src_album_id: i64, dst_album_id: i64 },
    ItemsTransfer { item_ids: Vec<i64>, dst_album_id: i64 },
    ItemRename { item_id: i64, new_name: String },
}

/// The catalog was written by a newer build.
#[derive(Error, Debug)]
#[error("Catalog schema version {found} is newer than supported version {supported}")]
pub struct SchemaVersionError {
    pub found: i32,
    pub supported: i32,
}

/// Relational catalog the engine reads and writes.
///
/// All methods take `&self`; implementations serialize access internally so
/// one store can be shared between the album manager and the file operations.
pub trait CatalogStore: Send + Sync {
    /// Create tables and apply migrations. Fails with [`SchemaVersionError`]
    /// when the catalog is too new to be touched.
    fn initialize(&self) -> Result<()>;

    /// On-disk database file, `None` for in-memory stores.
    fn database_file(&self) -> Option<PathBuf>;

    // === Albums ===

    fn scan_albums(&self) -> Result<Vec<AlbumInfo>>;
    fn add_album(
        &self,
        album_root_id: i32,
        relative_path: &str,
        caption: &str,
        date: Option<NaiveDate>,
        collection: &str,
    ) -> Result<i64>;
    fn rename_album(&self, album_id: i64, new_relative_path: &str) -> Result<()>;
    fn delete_album(&self, album_id: i64) -> Result<()>;
    fn set_album_icon(&self, album_id: i64, item_id: Option<i64>) -> Result<()>;
    /// Icon item id of an album.
    fn album_icon(&self, album_id: i64) -> Result<Option<i64>>;
    fn album_item_counts(&self) -> Result<HashMap<i64, usize>>;

    // === Tags ===

    fn scan_tags(&self) -> Result<Vec<TagInfo>>;
    fn add_tag(&self, pid: i64, name: &str, icon: Option<&str>, icon_item: Option<i64>) -> Result<i64>;
    fn set_tag_name(&self, tag_id: i64, name: &str) -> Result<()>;
    fn delete_tag(&self, tag_id: i64) -> Result<()>;
    fn set_tag_parent_id(&self, tag_id: i64, pid: i64) -> Result<()>;
    fn set_tag_icon(&self, tag_id: i64, icon: Option<&str>, icon_item: Option<i64>) -> Result<()>;
    fn tag_icon(&self, tag_id: i64) -> Result<TagIcon>;
    /// Ids of the tags named by `a/b/c` style paths; unknown paths are omitted.
    fn tags_from_paths(&self, paths: &[String]) -> Result<Vec<i64>>;
    fn tag_item_counts(&self) -> Result<HashMap<i64, usize>>;
    fn add_item_tag(&self, item_id: i64, tag_id: i64) -> Result<()>;

    // === Searches ===

    fn scan_searches(&self) -> Result<Vec<SearchInfo>>;
    fn add_search(&self, name: &str, query: &str, temporary: bool) -> Result<i64>;
    fn update_search(&self, search_id: i64, name: &str, query: &str) -> Result<()>;
    fn delete_search(&self, search_id: i64) -> Result<()>;

    // === Items ===

    /// Distinct capture timestamps with the number of items carrying each.
    fn scan_item_dates(&self) -> Result<Vec<(NaiveDateTime, usize)>>;
    fn item(&self, item_id: i64) -> Result<Option<ItemInfo>>;
    fn items_in_album(&self, album_id: i64) -> Result<Vec<ItemInfo>>;
    /// Items grouped under `leader_id`, excluding the leader itself.
    fn grouped_items(&self, leader_id: i64) -> Result<Vec<ItemInfo>>;
    fn add_item(&self, album_id: i64, name: &str, taken_at: Option<NaiveDateTime>) -> Result<i64>;
    fn group_item(&self, item_id: i64, leader_id: Option<i64>) -> Result<()>;
    /// Re-point an item row. A different row already at the destination is
    /// replaced.
    fn move_item(&self, item_id: i64, dst_album_id: i64, dst_name: &str) -> Result<()>;
    fn delete_item(&self, item_id: i64) -> Result<()>;

    // === Settings ===

    fn setting(&self, key: &str) -> Result<Option<String>>;
    fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    // === Transactions ===

    /// Nested calls are counted; only the outermost pair reaches the database.
    fn begin_transaction(&self) -> Result<()>;
    fn commit_transaction(&self) -> Result<()>;
    fn rollback_transaction(&self) -> Result<()>;

    // === Transfer hints ===

    fn hint_album_transfer(&self, src_album_id: i64, dst_album_id: i64) {
        self.record_hint(TransferHint::AlbumTransfer {
            src_album_id,
            dst_album_id,
        });
    }

    fn hint_items_transfer(&self, item_ids: &[i64], dst_album_id: i64) {
        self.record_hint(TransferHint::ItemsTransfer {
            item_ids: item_ids.to_vec(),
            dst_album_id,
        });
    }

    fn hint_item_rename(&self, item_id: i64, new_name: &str) {
        self.record_hint(TransferHint::ItemRename {
            item_id,
            new_name: new_name.to_string(),
        });
    }

    fn record_hint(&self, hint: TransferHint);
    /// Drain pending hints.
    fn take_hints(&self) -> Vec<TransferHint>;
}

/// Scoped write transaction. Commits when dropped, or when [`commit`](Self::commit)
/// is called to observe the result; rolls back if dropped during a panic.
pub struct Transaction<'a> {
    store: &'a dyn CatalogStore,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn begin(store: &'a dyn CatalogStore) -> Result<Self> {
        store.begin_transaction()?;
        Ok(Self {
            store,
            finished: false,
        })
    }

    pub fn store(&self) -> &'a dyn CatalogStore {
        self.store
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.store.commit_transaction()
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.store.rollback_transaction()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if std::thread::panicking() {
            let _ = self.store.rollback_transaction();
        } else if let Err(e) = self.store.commit_transaction() {
            tracing::error!("Failed to commit catalog transaction: {:#}", e);
        }
    }
}

/// Run `f` inside a transaction; commit on `Ok`, roll back on `Err`.
pub fn with_transaction<T, E>(
    store: &dyn CatalogStore,
    f: impl FnOnce(&dyn CatalogStore) -> std::result::Result<T, E>,
) -> std::result::Result<T, E>
where
    E: From<anyhow::Error>,
{
    let txn = Transaction::begin(store)?;
    match f(store) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = txn.rollback() {
                tracing::error!("Failed to roll back catalog transaction: {:#}", rollback);
            }
            Err(e)
        }
    }
}
