//! Album manager: owns the hierarchy and keeps it in step with the catalog.

use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use super::sync;
use super::tree::{AlbumHandle, AlbumTree};
use crate::collection::LocationResolver;
use crate::db::{CatalogStore, SchemaVersionError};
use crate::error::AlbumError;
use crate::events::{CatalogEvent, EventBus};
use crate::watch::DirectoryWatch;

const LOCALE_SETTING: &str = "Locale";

/// What the caller should do after opening the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAdvice {
    Success,
    /// The catalog could not be opened; the manager keeps only its roots.
    ContinueWithoutDatabase(String),
    /// The catalog must not be touched (written by a newer build).
    AbortImmediately(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocaleCheck {
    Unchanged,
    /// No locale was stored yet; the current one was recorded.
    Recorded,
    Changed { stored: String, current: String },
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    /// Rows whose parent could not be resolved; retried on the next pass.
    pub skipped: usize,
}

impl AddAssign for SyncReport {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
        self.skipped += other.skipped;
    }
}

pub struct AlbumManager {
    pub(super) store: Option<Arc<dyn CatalogStore>>,
    pub(super) resolver: Arc<dyn LocationResolver>,
    pub(super) watch: Option<Box<dyn DirectoryWatch>>,
    pub(super) tree: AlbumTree,
    pub(super) events: EventBus,
    pub(super) show_item_counts: bool,
    pub(super) next_date_id: i64,
    db_dir_mtimes: Option<Vec<(PathBuf, Option<SystemTime>)>>,
}

impl AlbumManager {
    pub fn new(
        store: Option<Arc<dyn CatalogStore>>,
        resolver: Arc<dyn LocationResolver>,
        events: EventBus,
        show_item_counts: bool,
    ) -> Self {
        Self {
            store,
            resolver,
            watch: None,
            tree: AlbumTree::new(events.clone()),
            events,
            show_item_counts,
            next_date_id: 1,
            db_dir_mtimes: None,
        }
    }

    /// Initialize `store` and build a manager around it. When the store
    /// cannot be used the manager is built without one and the advice says
    /// whether to carry on.
    pub fn open(
        store: Arc<dyn CatalogStore>,
        resolver: Arc<dyn LocationResolver>,
        events: EventBus,
        show_item_counts: bool,
    ) -> (Self, StoreAdvice) {
        let (store, advice) = match store.initialize() {
            Ok(()) => (Some(store), StoreAdvice::Success),
            Err(e) if e.downcast_ref::<SchemaVersionError>().is_some() => {
                tracing::error!("Refusing to open catalog: {:#}", e);
                (None, StoreAdvice::AbortImmediately(format!("{:#}", e)))
            }
            Err(e) => {
                tracing::error!("Failed to open catalog: {:#}", e);
                (None, StoreAdvice::ContinueWithoutDatabase(format!("{:#}", e)))
            }
        };
        (Self::new(store, resolver, events, show_item_counts), advice)
    }

    pub fn with_watch(mut self, watch: Box<dyn DirectoryWatch>) -> Self {
        self.watch = Some(watch);
        self
    }

    /// Load the hierarchy. A changed locale stops the load and is returned so
    /// the caller can [`accept_locale_change`](Self::accept_locale_change) and
    /// start again, or give up.
    pub fn start(&mut self) -> Result<LocaleCheck, AlbumError> {
        if self.store.is_none() {
            self.events.emit(CatalogEvent::AllAlbumsLoaded);
            return Ok(LocaleCheck::Unchanged);
        }

        let locale = self.check_locale()?;
        if matches!(locale, LocaleCheck::Changed { .. }) {
            return Ok(locale);
        }

        for path in self.resolver.available_root_paths() {
            self.watch_dir(&path);
        }
        self.db_dir_mtimes = self.database_dir().map(|dir| dir_mtimes(&dir));

        self.refresh()?;
        self.events.emit(CatalogEvent::AllAlbumsLoaded);
        Ok(locale)
    }

    pub fn has_database(&self) -> bool {
        self.store.is_some()
    }

    pub(super) fn store(&self) -> Result<Arc<dyn CatalogStore>, AlbumError> {
        self.store.clone().ok_or(AlbumError::NoDatabase)
    }

    pub fn tree(&self) -> &AlbumTree {
        &self.tree
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn set_current(&mut self, handle: Option<AlbumHandle>) {
        self.tree.set_current(handle);
    }

    pub fn current(&self) -> Option<AlbumHandle> {
        self.tree.current()
    }

    // ========================================================================
    // Locale
    // ========================================================================

    pub fn check_locale(&self) -> Result<LocaleCheck, AlbumError> {
        self.check_locale_against(&current_encoding())
    }

    pub(crate) fn check_locale_against(&self, current: &str) -> Result<LocaleCheck, AlbumError> {
        let store = self.store()?;
        match store.setting(LOCALE_SETTING)? {
            None => {
                store.set_setting(LOCALE_SETTING, current)?;
                tracing::info!("Recorded catalog locale {}", current);
                Ok(LocaleCheck::Recorded)
            }
            Some(stored) if stored == current => Ok(LocaleCheck::Unchanged),
            Some(stored) => {
                tracing::warn!("Catalog locale changed from {} to {}", stored, current);
                Ok(LocaleCheck::Changed {
                    stored,
                    current: current.to_string(),
                })
            }
        }
    }

    pub fn accept_locale_change(&self) -> Result<(), AlbumError> {
        let store = self.store()?;
        store.set_setting(LOCALE_SETTING, &current_encoding())?;
        Ok(())
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Reconcile every kind against the store.
    pub fn refresh(&mut self) -> Result<SyncReport, AlbumError> {
        let store = self.store()?;
        let mut report = SyncReport::default();

        report += sync::physical(&mut self.tree, store.as_ref(), self.resolver.as_ref(), &self.events)?;
        report += sync::tags(&mut self.tree, store.as_ref(), self.resolver.as_ref(), &self.events)?;
        report += sync::searches(&mut self.tree, store.as_ref(), &self.events)?;
        report += sync::dates(&mut self.tree, store.as_ref(), &self.events, &mut self.next_date_id)?;

        if self.show_item_counts {
            self.events
                .emit(CatalogEvent::PhysicalItemsDirty(store.album_item_counts()?));
            self.events
                .emit(CatalogEvent::TagItemsDirty(store.tag_item_counts()?));
        }

        tracing::info!(
            "Album sync: {} added, {} removed, {} skipped",
            report.added,
            report.removed,
            report.skipped
        );
        Ok(report)
    }

    /// React to a change under `path`. Changes inside the catalog's own
    /// directory are ignored while its file timestamps stay the same.
    /// Returns `None` when the change was filtered.
    pub fn handle_dirty(&mut self, path: &Path) -> Result<Option<SyncReport>, AlbumError> {
        self.store()?;

        if let Some(dir) = self.database_dir() {
            if path.starts_with(&dir) {
                let mtimes = dir_mtimes(&dir);
                if self.db_dir_mtimes.as_ref() == Some(&mtimes) {
                    tracing::debug!("Ignoring catalog directory change at {}", path.display());
                    return Ok(None);
                }
                self.db_dir_mtimes = Some(mtimes);
            }
        }

        self.refresh().map(Some)
    }

    /// An album root appeared or disappeared.
    pub fn location_status_changed(&mut self, root_id: i32) -> Result<SyncReport, AlbumError> {
        if let Some(path) = self.resolver.album_root_path(root_id) {
            if self.resolver.is_available(root_id) {
                self.watch_dir(&path);
            } else if let Some(watch) = self.watch.as_mut() {
                if watch.contains(&path) {
                    if let Err(e) = watch.remove_dir(&path) {
                        tracing::warn!("{:#}", e);
                    }
                }
            }
        }
        self.refresh()
    }

    fn watch_dir(&mut self, path: &Path) {
        if let Some(watch) = self.watch.as_mut() {
            if !watch.contains(path) {
                if let Err(e) = watch.add_dir(path) {
                    tracing::warn!("{:#}", e);
                }
            }
        }
    }

    fn database_dir(&self) -> Option<PathBuf> {
        let file = self.store.as_ref()?.database_file()?;
        file.parent().map(Path::to_path_buf)
    }

    /// Drop every album and stop watching. The manager is left with empty roots.
    pub fn close(&mut self) {
        if let Some(watch) = self.watch.as_mut() {
            for path in self.resolver.available_root_paths() {
                if watch.contains(&path) {
                    if let Err(e) = watch.remove_dir(&path) {
                        tracing::warn!("Cannot stop watching {}: {}", path.display(), e);
                    }
                }
            }
        }
        self.tree.clear();
    }
}

/// Text encoding of the process locale, `UTF-8` when none is set.
fn current_encoding() -> String {
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .and_then(|value| encoding_of(&value))
        .unwrap_or_else(|| "UTF-8".to_string())
}

/// `en_US.UTF-8@euro` → `UTF-8`.
fn encoding_of(locale: &str) -> Option<String> {
    let (_, rest) = locale.split_once('.')?;
    let encoding = rest.split('@').next().unwrap_or(rest);
    (!encoding.is_empty()).then(|| encoding.to_string())
}

fn dir_mtimes(dir: &Path) -> Vec<(PathBuf, Option<SystemTime>)> {
    let mut entries: Vec<(PathBuf, Option<SystemTime>)> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| {
                    let modified = e.metadata().and_then(|m| m.modified()).ok();
                    (e.path(), modified)
                })
                .collect()
        })
        .unwrap_or_default();
    entries.sort();
    entries
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::album::{AlbumKind, GlobalId};
    use crate::collection::{AlbumRoot, CollectionManager};
    use crate::db::SqliteCatalog;
    use chrono::NaiveDate;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::{tempdir, TempDir};

    pub(in crate::album) struct Fixture {
        pub dir: TempDir,
        pub db: Arc<SqliteCatalog>,
        pub manager: AlbumManager,
        pub events: mpsc::Receiver<CatalogEvent>,
    }

    impl Fixture {
        pub fn photos(&self) -> PathBuf {
            self.dir.path().join("photos")
        }

        pub fn drain(&self) -> Vec<CatalogEvent> {
            self.events.try_iter().collect()
        }

        pub fn physical_keys(&self) -> Vec<(i32, String)> {
            let tree = self.manager.tree();
            let mut keys: Vec<(i32, String)> = tree
                .iter(tree.root(AlbumKind::Physical))
                .filter_map(|h| tree.physical_location(h))
                .collect();
            keys.sort();
            keys
        }
    }

    /// Root 1 is an existing directory, root 2 points nowhere.
    pub(in crate::album) fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("photos")).unwrap();
        fs::create_dir(dir.path().join("db")).unwrap();

        let db = Arc::new(SqliteCatalog::open(&dir.path().join("db").join("catalog.db")).unwrap());
        db.initialize().unwrap();
        let store: Arc<dyn CatalogStore> = db.clone();

        let resolver = Arc::new(CollectionManager::new(vec![
            AlbumRoot {
                id: 1,
                path: dir.path().join("photos"),
                label: "Photos".into(),
            },
            AlbumRoot {
                id: 2,
                path: dir.path().join("offline"),
                label: "Offline".into(),
            },
        ]));

        let bus = EventBus::new();
        let events = bus.subscribe();
        let manager = AlbumManager::new(Some(store), resolver, bus, true);
        Fixture {
            dir,
            db,
            manager,
            events,
        }
    }

    #[test]
    fn test_parents_are_inserted_before_children() {
        let mut fx = fixture();
        // Child first in row order.
        fx.db.add_album(1, "/2020/trip", "", None, "").unwrap();
        fx.db.add_album(1, "/2020", "", None, "").unwrap();

        let report = fx.manager.refresh().unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.skipped, 0);

        let tree = fx.manager.tree();
        let year = tree.find_physical(1, "/2020").unwrap();
        let trip = tree.find_physical(1, "/2020/trip").unwrap();
        assert_eq!(tree.get(year).unwrap().parent(), Some(tree.root(AlbumKind::Physical)));
        assert_eq!(tree.get(trip).unwrap().parent(), Some(year));
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let mut fx = fixture();
        fx.db.add_album(1, "/a", "", None, "").unwrap();
        fx.db.add_album(1, "/a/b", "", None, "").unwrap();
        let tag = fx.db.add_tag(0, "people", None, None).unwrap();
        fx.db.add_tag(tag, "alice", None, None).unwrap();
        fx.db.add_search("cats", "1.key=keyword\n1.value=cat", false).unwrap();

        fx.manager.refresh().unwrap();
        let before = fx.manager.tree().len();
        fx.drain();

        let report = fx.manager.refresh().unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(fx.manager.tree().len(), before);
        assert!(!fx
            .drain()
            .iter()
            .any(|e| matches!(e, CatalogEvent::AlbumAdded(_) | CatalogEvent::AlbumDeleted(_))));
    }

    #[test]
    fn test_root_rows_and_orphans_are_skipped() {
        let mut fx = fixture();
        fx.db.add_album(1, "/", "", None, "").unwrap();
        fx.db.add_album(1, "/missing/child", "", None, "").unwrap();
        fx.db.add_album(1, "/ok", "Caption", NaiveDate::from_ymd_opt(2021, 5, 1), "Trips").unwrap();

        let report = fx.manager.refresh().unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(fx.physical_keys(), vec![(1, "/ok".to_string())]);

        let tree = fx.manager.tree();
        let ok = tree.get(tree.find_physical(1, "/ok").unwrap()).unwrap();
        let data = ok.as_physical().unwrap();
        assert_eq!(data.caption, "Caption");
        assert_eq!(data.collection, "Trips");
        assert_eq!(data.date, NaiveDate::from_ymd_opt(2021, 5, 1));

        // The orphan's parent arrives later and both appear on the next pass.
        fx.db.add_album(1, "/missing", "", None, "").unwrap();
        let report = fx.manager.refresh().unwrap();
        assert_eq!(report.added, 2);
        assert!(fx.manager.tree().find_physical(1, "/missing/child").is_some());
    }

    #[test]
    fn test_vanished_rows_remove_topmost_node() {
        let mut fx = fixture();
        let a = fx.db.add_album(1, "/a", "", None, "").unwrap();
        let b = fx.db.add_album(1, "/a/b", "", None, "").unwrap();
        fx.manager.refresh().unwrap();
        fx.drain();

        fx.db.delete_album(b).unwrap();
        fx.db.delete_album(a).unwrap();
        let report = fx.manager.refresh().unwrap();
        assert_eq!(report.removed, 2);
        assert!(fx.physical_keys().is_empty());

        let deleted: Vec<GlobalId> = fx
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                CatalogEvent::AlbumDeleted(gid) => Some(gid),
                _ => None,
            })
            .collect();
        assert_eq!(
            deleted,
            vec![
                GlobalId::new(AlbumKind::Physical, b),
                GlobalId::new(AlbumKind::Physical, a)
            ]
        );
    }

    #[test]
    fn test_unavailable_root_is_left_alone() {
        let mut fx = fixture();
        fx.db.add_album(2, "/offline-album", "", None, "").unwrap();
        fx.db.add_album(1, "/online", "", None, "").unwrap();
        fx.manager.refresh().unwrap();
        assert_eq!(fx.physical_keys(), vec![(1, "/online".to_string())]);

        // Bring root 2 online, sync, then take it away again.
        let offline = fx.dir.path().join("offline");
        fs::create_dir(&offline).unwrap();
        fx.manager.location_status_changed(2).unwrap();
        assert!(fx.manager.tree().find_physical(2, "/offline-album").is_some());

        fs::remove_dir(&offline).unwrap();
        fx.manager.location_status_changed(2).unwrap();
        assert!(fx.manager.tree().find_physical(2, "/offline-album").is_some());
    }

    #[test]
    fn test_item_counts_follow_setting() {
        let mut fx = fixture();
        let album = fx.db.add_album(1, "/a", "", None, "").unwrap();
        fx.db.add_item(album, "x.jpg", None).unwrap();
        fx.manager.refresh().unwrap();
        let counts = fx.drain().into_iter().find_map(|e| match e {
            CatalogEvent::PhysicalItemsDirty(counts) => Some(counts),
            _ => None,
        });
        assert_eq!(counts.unwrap().get(&album), Some(&1));

        fx.manager.show_item_counts = false;
        fx.manager.refresh().unwrap();
        assert!(!fx
            .drain()
            .iter()
            .any(|e| matches!(e, CatalogEvent::PhysicalItemsDirty(_) | CatalogEvent::TagItemsDirty(_))));
    }

    #[test]
    fn test_start_loads_and_announces() {
        let mut fx = fixture();
        fx.db.set_setting(LOCALE_SETTING, &current_encoding()).unwrap();
        fx.db.add_album(1, "/a", "", None, "").unwrap();

        assert_eq!(fx.manager.start().unwrap(), LocaleCheck::Unchanged);
        assert!(fx.manager.tree().find_physical(1, "/a").is_some());
        assert_eq!(fx.drain().last(), Some(&CatalogEvent::AllAlbumsLoaded));
    }

    #[test]
    fn test_start_stops_on_locale_change() {
        let mut fx = fixture();
        fx.db.set_setting(LOCALE_SETTING, "no-such-encoding").unwrap();
        fx.db.add_album(1, "/a", "", None, "").unwrap();

        let check = fx.manager.start().unwrap();
        assert!(matches!(check, LocaleCheck::Changed { ref stored, .. } if stored == "no-such-encoding"));
        assert!(fx.manager.tree().find_physical(1, "/a").is_none());

        fx.manager.accept_locale_change().unwrap();
        assert_eq!(fx.manager.start().unwrap(), LocaleCheck::Unchanged);
        assert!(fx.manager.tree().find_physical(1, "/a").is_some());
    }

    #[test]
    fn test_locale_is_recorded_once() {
        let fx = fixture();
        assert_eq!(fx.manager.check_locale_against("UTF-8").unwrap(), LocaleCheck::Recorded);
        assert_eq!(fx.manager.check_locale_against("UTF-8").unwrap(), LocaleCheck::Unchanged);
        assert_eq!(
            fx.manager.check_locale_against("ISO-8859-1").unwrap(),
            LocaleCheck::Changed {
                stored: "UTF-8".into(),
                current: "ISO-8859-1".into()
            }
        );
    }

    #[test]
    fn test_encoding_parsing() {
        assert_eq!(encoding_of("en_US.UTF-8").as_deref(), Some("UTF-8"));
        assert_eq!(encoding_of("de_DE.ISO-8859-15@euro").as_deref(), Some("ISO-8859-15"));
        assert_eq!(encoding_of("C"), None);
    }

    #[test]
    fn test_without_database_only_roots_remain() {
        let dir = tempdir().unwrap();
        let resolver = Arc::new(CollectionManager::new(Vec::new()));
        let bus = EventBus::new();
        let events = bus.subscribe();
        let mut manager = AlbumManager::new(None, resolver, bus, true);

        assert_eq!(manager.start().unwrap(), LocaleCheck::Unchanged);
        assert_eq!(events.try_recv().unwrap(), CatalogEvent::AllAlbumsLoaded);
        assert_eq!(manager.tree().len(), 4);
        assert!(matches!(manager.refresh(), Err(AlbumError::NoDatabase)));
        assert!(matches!(manager.handle_dirty(dir.path()), Err(AlbumError::NoDatabase)));
        assert!(matches!(manager.check_locale(), Err(AlbumError::NoDatabase)));
    }

    #[test]
    fn test_newer_catalog_aborts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch("PRAGMA user_version = 999;").unwrap();
        }
        let store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalog::open(&path).unwrap());
        let resolver = Arc::new(CollectionManager::new(Vec::new()));

        let (manager, advice) = AlbumManager::open(store, resolver, EventBus::new(), true);
        assert!(matches!(advice, StoreAdvice::AbortImmediately(_)));
        assert!(!manager.has_database());
    }

    #[test]
    fn test_catalog_directory_changes_are_filtered() {
        let mut fx = fixture();
        fx.db.set_setting(LOCALE_SETTING, &current_encoding()).unwrap();
        fx.manager.start().unwrap();
        let db_dir = fx.dir.path().join("db");

        assert_eq!(fx.manager.handle_dirty(&db_dir.join("catalog.db")).unwrap(), None);

        fs::write(db_dir.join("catalog.db-journal"), b"x").unwrap();
        assert!(fx.manager.handle_dirty(&db_dir.join("catalog.db")).unwrap().is_some());

        // Outside the catalog directory always triggers a pass.
        fx.db.add_album(1, "/new", "", None, "").unwrap();
        let report = fx.manager.handle_dirty(&fx.photos().join("new")).unwrap().unwrap();
        assert_eq!(report.added, 1);
    }

    #[test]
    fn test_close_clears_tree() {
        let mut fx = fixture();
        fx.db.add_album(1, "/a", "", None, "").unwrap();
        fx.manager.refresh().unwrap();
        fx.drain();

        fx.manager.close();
        assert_eq!(fx.manager.tree().len(), 4);
        assert_eq!(fx.drain(), vec![CatalogEvent::AlbumsCleared]);
    }

    struct StuckWatch {
        removals: std::sync::Arc<std::sync::Mutex<Vec<PathBuf>>>,
    }

    impl DirectoryWatch for StuckWatch {
        fn add_dir(&mut self, _path: &Path) -> anyhow::Result<()> {
            Ok(())
        }

        fn remove_dir(&mut self, path: &Path) -> anyhow::Result<()> {
            self.removals.lock().unwrap().push(path.to_path_buf());
            anyhow::bail!("watch backend gone")
        }

        fn contains(&self, _path: &Path) -> bool {
            true
        }
    }

    #[test]
    fn test_close_survives_watch_errors() {
        let mut fx = fixture();
        fx.db.add_album(1, "/a", "", None, "").unwrap();
        fx.manager.refresh().unwrap();
        let removals = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        fx.manager.watch = Some(Box::new(StuckWatch {
            removals: removals.clone(),
        }));

        fx.manager.close();
        assert_eq!(*removals.lock().unwrap(), vec![fx.photos()]);
        assert_eq!(fx.manager.tree().len(), 4);
    }
}
