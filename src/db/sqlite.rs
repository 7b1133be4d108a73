//! SQLite catalog.

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::schema::{MIGRATIONS, SCHEMA, SCHEMA_VERSION};
use super::{
    child_path, AlbumInfo, CatalogStore, ItemInfo, SchemaVersionError, SearchInfo, TagIcon,
    TagInfo, TransferHint,
};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

struct Inner {
    conn: Connection,
    depth: u32,
    /// An inner transaction rolled back; the outermost one must not commit.
    rollback_only: bool,
}

pub struct SqliteCatalog {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
    hints: Mutex<Vec<TransferHint>>,
}

impl SqliteCatalog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalog {}", path.display()))?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                depth: 0,
                rollback_only: false,
            }),
            path,
            hints: Mutex::new(Vec::new()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("Catalog connection lock poisoned"))
    }

    /// Current nesting level of open transactions.
    pub fn transaction_depth(&self) -> u32 {
        self.inner.lock().map(|inner| inner.depth).unwrap_or(0)
    }

    fn run_migrations(conn: &Connection) {
        for migration in MIGRATIONS {
            let _ = conn.execute(migration, []);
        }
    }
}

fn parse_date(value: Option<String>) -> Option<NaiveDate> {
    value.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok())
}

fn icon_path(album_path: Option<String>, name: Option<String>) -> Option<String> {
    match (album_path, name) {
        (Some(album_path), Some(name)) => Some(child_path(&album_path, &name)),
        _ => None,
    }
}

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<ItemInfo> {
    Ok(ItemInfo {
        id: row.get(0)?,
        album_id: row.get(1)?,
        album_root_id: row.get(2)?,
        album_path: row.get(3)?,
        name: row.get(4)?,
        group_leader: row.get(5)?,
    })
}

const ITEM_COLUMNS: &str = r#"
    SELECT i.id, i.album, a.album_root, a.relative_path, i.name, i.group_leader
    FROM items i
    JOIN albums a ON a.id = i.album
"#;

impl CatalogStore for SqliteCatalog {
    fn initialize(&self) -> Result<()> {
        let inner = self.lock()?;
        let conn = &inner.conn;

        let found: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if found > SCHEMA_VERSION {
            return Err(SchemaVersionError {
                found,
                supported: SCHEMA_VERSION,
            }
            .into());
        }

        conn.execute_batch(SCHEMA)?;
        Self::run_migrations(conn);
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    fn database_file(&self) -> Option<PathBuf> {
        self.path.clone()
    }

    // ========================================================================
    // Albums
    // ========================================================================

    fn scan_albums(&self) -> Result<Vec<AlbumInfo>> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            r#"
            SELECT a.id, a.album_root, a.relative_path, a.caption, a.collection, a.date,
                   ia.album_root, ia.relative_path, i.name
            FROM albums a
            LEFT JOIN items i ON i.id = a.icon
            LEFT JOIN albums ia ON ia.id = i.album
            ORDER BY a.id
            "#,
        )?;
        let albums = stmt
            .query_map([], |row| {
                Ok(AlbumInfo {
                    id: row.get(0)?,
                    album_root_id: row.get(1)?,
                    relative_path: row.get(2)?,
                    caption: row.get(3)?,
                    collection: row.get(4)?,
                    date: parse_date(row.get(5)?),
                    icon_root_id: row.get(6)?,
                    icon_relative_path: icon_path(row.get(7)?, row.get(8)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(albums)
    }

    fn add_album(
        &self,
        album_root_id: i32,
        relative_path: &str,
        caption: &str,
        date: Option<NaiveDate>,
        collection: &str,
    ) -> Result<i64> {
        let inner = self.lock()?;
        let date = date.map(|d| d.format(DATE_FORMAT).to_string());
        inner.conn.execute(
            r#"
            INSERT INTO albums (album_root, relative_path, caption, collection, date)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![album_root_id, relative_path, caption, collection, date],
        )?;
        Ok(inner.conn.last_insert_rowid())
    }

    fn rename_album(&self, album_id: i64, new_relative_path: &str) -> Result<()> {
        let inner = self.lock()?;
        inner.conn.execute(
            "UPDATE albums SET relative_path = ? WHERE id = ?",
            params![new_relative_path, album_id],
        )?;
        Ok(())
    }

    fn delete_album(&self, album_id: i64) -> Result<()> {
        let inner = self.lock()?;
        inner
            .conn
            .execute("DELETE FROM albums WHERE id = ?", [album_id])?;
        Ok(())
    }

    fn set_album_icon(&self, album_id: i64, item_id: Option<i64>) -> Result<()> {
        let inner = self.lock()?;
        inner.conn.execute(
            "UPDATE albums SET icon = ? WHERE id = ?",
            params![item_id, album_id],
        )?;
        Ok(())
    }

    fn album_icon(&self, album_id: i64) -> Result<Option<i64>> {
        let inner = self.lock()?;
        let result = inner.conn.query_row(
            "SELECT icon FROM albums WHERE id = ?",
            [album_id],
            |row| row.get::<_, Option<i64>>(0),
        );
        match result {
            Ok(icon) => Ok(icon),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn album_item_counts(&self) -> Result<HashMap<i64, usize>> {
        let inner = self.lock()?;
        let mut stmt = inner
            .conn
            .prepare("SELECT album, COUNT(*) FROM items GROUP BY album")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(counts)
    }

    // ========================================================================
    // Tags
    // ========================================================================

    fn scan_tags(&self) -> Result<Vec<TagInfo>> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            r#"
            SELECT t.id, t.pid, t.name, t.iconkde, a.album_root, a.relative_path, i.name
            FROM tags t
            LEFT JOIN items i ON i.id = t.icon
            LEFT JOIN albums a ON a.id = i.album
            ORDER BY t.id
            "#,
        )?;
        let tags = stmt
            .query_map([], |row| {
                Ok(TagInfo {
                    id: row.get(0)?,
                    pid: row.get(1)?,
                    name: row.get(2)?,
                    icon: row.get(3)?,
                    icon_root_id: row.get(4)?,
                    icon_relative_path: icon_path(row.get(5)?, row.get(6)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    fn add_tag(&self, pid: i64, name: &str, icon: Option<&str>, icon_item: Option<i64>) -> Result<i64> {
        let inner = self.lock()?;
        inner.conn.execute(
            "INSERT INTO tags (pid, name, iconkde, icon) VALUES (?, ?, ?, ?)",
            params![pid, name, icon, icon_item],
        )?;
        Ok(inner.conn.last_insert_rowid())
    }

    fn set_tag_name(&self, tag_id: i64, name: &str) -> Result<()> {
        let inner = self.lock()?;
        inner
            .conn
            .execute("UPDATE tags SET name = ? WHERE id = ?", params![name, tag_id])?;
        Ok(())
    }

    fn delete_tag(&self, tag_id: i64) -> Result<()> {
        let inner = self.lock()?;
        inner.conn.execute("DELETE FROM tags WHERE id = ?", [tag_id])?;
        Ok(())
    }

    fn set_tag_parent_id(&self, tag_id: i64, pid: i64) -> Result<()> {
        let inner = self.lock()?;
        inner
            .conn
            .execute("UPDATE tags SET pid = ? WHERE id = ?", params![pid, tag_id])?;
        Ok(())
    }

    fn set_tag_icon(&self, tag_id: i64, icon: Option<&str>, icon_item: Option<i64>) -> Result<()> {
        let inner = self.lock()?;
        inner.conn.execute(
            "UPDATE tags SET iconkde = ?, icon = ? WHERE id = ?",
            params![icon, icon_item, tag_id],
        )?;
        Ok(())
    }

    fn tag_icon(&self, tag_id: i64) -> Result<TagIcon> {
        let inner = self.lock()?;
        let icon = inner
            .conn
            .query_row(
                "SELECT iconkde, icon FROM tags WHERE id = ?",
                [tag_id],
                |row| {
                    Ok(TagIcon {
                        icon: row.get(0)?,
                        item_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(icon.unwrap_or_default())
    }

    fn tags_from_paths(&self, paths: &[String]) -> Result<Vec<i64>> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare("SELECT id, pid, name FROM tags")?;
        let by_parent: HashMap<(i64, String), i64> = stmt
            .query_map([], |row| {
                Ok(((row.get::<_, i64>(1)?, row.get::<_, String>(2)?), row.get::<_, i64>(0)?))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut ids = Vec::new();
        for path in paths {
            let mut current = 0i64;
            let mut found = true;
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                match by_parent.get(&(current, segment.to_string())) {
                    Some(id) => current = *id,
                    None => {
                        found = false;
                        break;
                    }
                }
            }
            if found && current != 0 {
                ids.push(current);
            }
        }
        Ok(ids)
    }

    fn tag_item_counts(&self) -> Result<HashMap<i64, usize>> {
        let inner = self.lock()?;
        let mut stmt = inner
            .conn
            .prepare("SELECT tag, COUNT(*) FROM item_tags GROUP BY tag")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(counts)
    }

    fn add_item_tag(&self, item_id: i64, tag_id: i64) -> Result<()> {
        let inner = self.lock()?;
        inner.conn.execute(
            "INSERT OR IGNORE INTO item_tags (item, tag) VALUES (?, ?)",
            params![item_id, tag_id],
        )?;
        Ok(())
    }

    // ========================================================================
    // Searches
    // ========================================================================

    fn scan_searches(&self) -> Result<Vec<SearchInfo>> {
        let inner = self.lock()?;
        let mut stmt = inner
            .conn
            .prepare("SELECT id, name, query, temporary FROM searches ORDER BY id")?;
        let searches = stmt
            .query_map([], |row| {
                Ok(SearchInfo {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    query: row.get(2)?,
                    temporary: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(searches)
    }

    fn add_search(&self, name: &str, query: &str, temporary: bool) -> Result<i64> {
        let inner = self.lock()?;
        inner.conn.execute(
            "INSERT INTO searches (name, query, temporary) VALUES (?, ?, ?)",
            params![name, query, temporary as i64],
        )?;
        Ok(inner.conn.last_insert_rowid())
    }

    fn update_search(&self, search_id: i64, name: &str, query: &str) -> Result<()> {
        let inner = self.lock()?;
        inner.conn.execute(
            "UPDATE searches SET name = ?, query = ? WHERE id = ?",
            params![name, query, search_id],
        )?;
        Ok(())
    }

    fn delete_search(&self, search_id: i64) -> Result<()> {
        let inner = self.lock()?;
        inner
            .conn
            .execute("DELETE FROM searches WHERE id = ?", [search_id])?;
        Ok(())
    }

    // ========================================================================
    // Items
    // ========================================================================

    fn scan_item_dates(&self) -> Result<Vec<(NaiveDateTime, usize)>> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            r#"
            SELECT taken_at, COUNT(*) FROM items
            WHERE taken_at IS NOT NULL
            GROUP BY taken_at
            ORDER BY taken_at
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let dates = rows
            .into_iter()
            .filter_map(|(taken_at, count)| {
                match NaiveDateTime::parse_from_str(&taken_at, DATETIME_FORMAT) {
                    Ok(dt) => Some((dt, count)),
                    Err(_) => {
                        tracing::warn!("Ignoring unparseable item date {:?}", taken_at);
                        None
                    }
                }
            })
            .collect();
        Ok(dates)
    }

    fn item(&self, item_id: i64) -> Result<Option<ItemInfo>> {
        let inner = self.lock()?;
        let sql = format!("{} WHERE i.id = ?", ITEM_COLUMNS);
        let item = inner
            .conn
            .query_row(&sql, [item_id], row_to_item)
            .optional()?;
        Ok(item)
    }

    fn items_in_album(&self, album_id: i64) -> Result<Vec<ItemInfo>> {
        let inner = self.lock()?;
        let sql = format!("{} WHERE i.album = ? ORDER BY i.name", ITEM_COLUMNS);
        let mut stmt = inner.conn.prepare(&sql)?;
        let items = stmt
            .query_map([album_id], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn grouped_items(&self, leader_id: i64) -> Result<Vec<ItemInfo>> {
        let inner = self.lock()?;
        let sql = format!(
            "{} WHERE i.group_leader = ? AND i.id != ? ORDER BY i.id",
            ITEM_COLUMNS
        );
        let mut stmt = inner.conn.prepare(&sql)?;
        let items = stmt
            .query_map([leader_id, leader_id], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn add_item(&self, album_id: i64, name: &str, taken_at: Option<NaiveDateTime>) -> Result<i64> {
        let inner = self.lock()?;
        let taken_at = taken_at.map(|dt| dt.format(DATETIME_FORMAT).to_string());
        inner.conn.execute(
            "INSERT INTO items (album, name, taken_at) VALUES (?, ?, ?)",
            params![album_id, name, taken_at],
        )?;
        Ok(inner.conn.last_insert_rowid())
    }

    fn group_item(&self, item_id: i64, leader_id: Option<i64>) -> Result<()> {
        let inner = self.lock()?;
        inner.conn.execute(
            "UPDATE items SET group_leader = ? WHERE id = ?",
            params![leader_id, item_id],
        )?;
        Ok(())
    }

    fn move_item(&self, item_id: i64, dst_album_id: i64, dst_name: &str) -> Result<()> {
        let inner = self.lock()?;
        inner.conn.execute(
            "DELETE FROM items WHERE album = ? AND name = ? AND id != ?",
            params![dst_album_id, dst_name, item_id],
        )?;
        inner.conn.execute(
            "UPDATE items SET album = ?, name = ? WHERE id = ?",
            params![dst_album_id, dst_name, item_id],
        )?;
        Ok(())
    }

    fn delete_item(&self, item_id: i64) -> Result<()> {
        let inner = self.lock()?;
        inner.conn.execute("DELETE FROM items WHERE id = ?", [item_id])?;
        Ok(())
    }

    // ========================================================================
    // Settings
    // ========================================================================

    fn setting(&self, key: &str) -> Result<Option<String>> {
        let inner = self.lock()?;
        let value = inner
            .conn
            .query_row(
                "SELECT value FROM settings WHERE keyword = ?",
                [key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let inner = self.lock()?;
        inner.conn.execute(
            "INSERT OR REPLACE INTO settings (keyword, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    fn begin_transaction(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.depth == 0 {
            inner.conn.execute_batch("BEGIN IMMEDIATE")?;
            inner.rollback_only = false;
        }
        inner.depth += 1;
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.depth == 0 {
            anyhow::bail!("Commit without an open transaction");
        }
        inner.depth -= 1;
        if inner.depth == 0 {
            let statement = if inner.rollback_only { "ROLLBACK" } else { "COMMIT" };
            inner.conn.execute_batch(statement)?;
        }
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.depth == 0 {
            anyhow::bail!("Rollback without an open transaction");
        }
        inner.depth -= 1;
        if inner.depth == 0 {
            inner.conn.execute_batch("ROLLBACK")?;
        } else {
            inner.rollback_only = true;
        }
        Ok(())
    }

    // ========================================================================
    // Hints
    // ========================================================================

    fn record_hint(&self, hint: TransferHint) {
        tracing::debug!("Transfer hint: {:?}", hint);
        if let Ok(mut hints) = self.hints.lock() {
            hints.push(hint);
        }
    }

    fn take_hints(&self) -> Vec<TransferHint> {
        self.hints
            .lock()
            .map(|mut hints| std::mem::take(&mut *hints))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn catalog() -> SqliteCatalog {
        let db = SqliteCatalog::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let db = SqliteCatalog::open(&path).unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();
        assert_eq!(db.database_file(), Some(path));
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let db = SqliteCatalog::open_in_memory().unwrap();
        db.lock()
            .unwrap()
            .conn
            .pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        let err = db.initialize().unwrap_err();
        assert!(err.downcast_ref::<SchemaVersionError>().is_some());
    }

    #[test]
    fn test_album_round_trip_with_icon() {
        let db = catalog();
        let date = NaiveDate::from_ymd_opt(2020, 5, 17);
        let album = db.add_album(1, "/2020", "Summer", date, "Family").unwrap();
        let item = db.add_item(album, "a.jpg", None).unwrap();
        db.set_album_icon(album, Some(item)).unwrap();

        let albums = db.scan_albums().unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].caption, "Summer");
        assert_eq!(albums[0].collection, "Family");
        assert_eq!(albums[0].date, date);
        assert_eq!(albums[0].icon_root_id, Some(1));
        assert_eq!(albums[0].icon_relative_path.as_deref(), Some("/2020/a.jpg"));
        assert_eq!(db.album_icon(album).unwrap(), Some(item));
    }

    #[test]
    fn test_duplicate_album_path_rejected() {
        let db = catalog();
        db.add_album(1, "/a", "", None, "").unwrap();
        assert!(db.add_album(1, "/a", "", None, "").is_err());
        assert!(db.add_album(2, "/a", "", None, "").is_ok());
    }

    #[test]
    fn test_delete_album_cascades_items() {
        let db = catalog();
        let album = db.add_album(1, "/a", "", None, "").unwrap();
        let item = db.add_item(album, "x.jpg", None).unwrap();
        db.delete_album(album).unwrap();
        assert!(db.item(item).unwrap().is_none());
    }

    #[test]
    fn test_tags_from_paths() {
        let db = catalog();
        let people = db.add_tag(0, "People", None, None).unwrap();
        let alice = db.add_tag(people, "Alice", None, None).unwrap();
        let ids = db
            .tags_from_paths(&["People/Alice".into(), "/People".into(), "Nope".into()])
            .unwrap();
        assert_eq!(ids, vec![alice, people]);
    }

    #[test]
    fn test_tag_counts_and_icon() {
        let db = catalog();
        let album = db.add_album(1, "/a", "", None, "").unwrap();
        let item = db.add_item(album, "x.jpg", None).unwrap();
        let tag = db.add_tag(0, "Cats", Some("animal"), None).unwrap();
        db.add_item_tag(item, tag).unwrap();
        db.add_item_tag(item, tag).unwrap();

        assert_eq!(db.tag_item_counts().unwrap().get(&tag), Some(&1));
        assert_eq!(db.tag_icon(tag).unwrap().icon.as_deref(), Some("animal"));

        db.set_tag_icon(tag, None, Some(item)).unwrap();
        let tags = db.scan_tags().unwrap();
        assert_eq!(tags[0].icon, None);
        assert_eq!(tags[0].icon_relative_path.as_deref(), Some("/a/x.jpg"));
    }

    #[test]
    fn test_move_item_replaces_destination_row() {
        let db = catalog();
        let src = db.add_album(1, "/src", "", None, "").unwrap();
        let dst = db.add_album(1, "/dst", "", None, "").unwrap();
        let moving = db.add_item(src, "a.jpg", None).unwrap();
        let stale = db.add_item(dst, "a.jpg", None).unwrap();

        db.move_item(moving, dst, "a.jpg").unwrap();

        assert!(db.item(stale).unwrap().is_none());
        let moved = db.item(moving).unwrap().unwrap();
        assert_eq!(moved.album_id, dst);
        assert_eq!(moved.relative_path(), "/dst/a.jpg");
    }

    #[test]
    fn test_grouped_items_excludes_leader() {
        let db = catalog();
        let album = db.add_album(1, "/a", "", None, "").unwrap();
        let raw = db.add_item(album, "a.nef", None).unwrap();
        let jpg = db.add_item(album, "a.jpg", None).unwrap();
        db.group_item(jpg, Some(raw)).unwrap();
        db.group_item(raw, Some(raw)).unwrap();

        let grouped = db.grouped_items(raw).unwrap();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].id, jpg);
    }

    #[test]
    fn test_item_dates_grouped() {
        let db = catalog();
        let album = db.add_album(1, "/a", "", None, "").unwrap();
        let when = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        db.add_item(album, "1.jpg", Some(when)).unwrap();
        db.add_item(album, "2.jpg", Some(when)).unwrap();
        db.add_item(album, "3.jpg", None).unwrap();

        assert_eq!(db.scan_item_dates().unwrap(), vec![(when, 2)]);
    }

    #[test]
    fn test_searches_and_settings() {
        let db = catalog();
        let id = db.add_search("Cats", "1.key=keyword\n1.value=cat", false).unwrap();
        db.update_search(id, "Kittens", "1.key=keyword\n1.value=kitten").unwrap();
        let searches = db.scan_searches().unwrap();
        assert_eq!(searches[0].name, "Kittens");
        assert!(!searches[0].temporary);

        assert_eq!(db.setting("Locale").unwrap(), None);
        db.set_setting("Locale", "UTF-8").unwrap();
        assert_eq!(db.setting("Locale").unwrap().as_deref(), Some("UTF-8"));
    }

    #[test]
    fn test_hints_are_drained() {
        let db = catalog();
        db.hint_item_rename(3, "b.jpg");
        assert_eq!(
            db.take_hints(),
            vec![TransferHint::ItemRename {
                item_id: 3,
                new_name: "b.jpg".into()
            }]
        );
        assert!(db.take_hints().is_empty());
    }
}
