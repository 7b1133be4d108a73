//! Album, tag and search edits made by the user.
//!
//! Each edit validates against the tree, writes the store (and the
//! filesystem for physical albums), then patches the tree through the same
//! insert/remove primitives the reconciliation passes use.

use chrono::NaiveDate;
use std::fs;
use std::path::Path;

use super::manager::AlbumManager;
use super::tree::AlbumHandle;
use super::{Album, AlbumData, AlbumKind, PhysicalAlbum, SearchAlbum, TagAlbum};
use crate::collection::resolve_album_path;
use crate::db::{child_path, with_transaction};
use crate::error::AlbumError;
use crate::events::CatalogEvent;

fn validate_name(name: &str, what: &str) -> Result<(), AlbumError> {
    if name.trim().is_empty() {
        return Err(AlbumError::InvalidName(format!("{} name cannot be empty", what)));
    }
    if name.contains('/') {
        return Err(AlbumError::InvalidName(format!(
            "{} name cannot contain '/'",
            what
        )));
    }
    Ok(())
}

impl AlbumManager {
    fn require(&self, handle: AlbumHandle, kind: AlbumKind) -> Result<&Album, AlbumError> {
        let album = self
            .tree
            .get(handle)
            .ok_or_else(|| AlbumError::NotFound("Album no longer exists".into()))?;
        if album.kind() != kind {
            return Err(AlbumError::InvalidOperation(format!(
                "Expected a {:?} album",
                kind
            )));
        }
        Ok(album)
    }

    fn require_child(&self, handle: AlbumHandle, kind: AlbumKind) -> Result<&Album, AlbumError> {
        let album = self.require(handle, kind)?;
        if album.is_root() {
            return Err(AlbumError::InvalidOperation(format!(
                "Cannot change the root album \"{}\"",
                album.title()
            )));
        }
        Ok(album)
    }

    fn sibling_named(&self, parent: AlbumHandle, name: &str, except: Option<AlbumHandle>) -> bool {
        self.tree
            .children(parent)
            .into_iter()
            .filter(|&h| Some(h) != except)
            .any(|h| self.tree.get(h).is_some_and(|a| a.title() == name))
    }

    fn parent_id(&self, handle: AlbumHandle) -> i64 {
        self.tree
            .get(handle)
            .and_then(|a| a.parent())
            .and_then(|p| self.tree.get(p))
            .map(|p| p.id())
            .unwrap_or(0)
    }

    // ========================================================================
    // Physical albums
    // ========================================================================

    /// Create a directory and its album below `parent`. Below the physical
    /// root, `root_path` names the album root to create it in; deeper down
    /// the parent's root is used.
    pub fn create_physical(
        &mut self,
        parent: AlbumHandle,
        root_path: &Path,
        name: &str,
        caption: &str,
        date: Option<NaiveDate>,
        collection: &str,
    ) -> Result<AlbumHandle, AlbumError> {
        let store = self.store()?;
        let parent_album = self.require(parent, AlbumKind::Physical)?;
        validate_name(name, "Album")?;

        let (root_id, parent_path) = if parent_album.is_root() {
            match self.resolver.locate(root_path) {
                Some((root_id, path)) if path == "/" => (root_id, path),
                _ => {
                    return Err(AlbumError::NotFound(format!(
                        "{} is not an album root",
                        root_path.display()
                    )))
                }
            }
        } else {
            self.tree
                .physical_location(parent)
                .ok_or_else(|| AlbumError::NotFound("Parent album no longer exists".into()))?
        };

        let relative_path = child_path(&parent_path, name);
        if self.tree.find_physical(root_id, &relative_path).is_some() {
            return Err(AlbumError::NameConflict(
                "An existing album has the same name".into(),
            ));
        }
        if !self.resolver.is_available(root_id) {
            return Err(AlbumError::NotFound("The album root is not available".into()));
        }
        let dir = resolve_album_path(self.resolver.as_ref(), root_id, &relative_path)
            .ok_or_else(|| AlbumError::NotFound(format!("Unknown album root {}", root_id)))?;

        fs::create_dir(&dir)?;
        tracing::info!("Created album directory {}", dir.display());

        let id = store.add_album(root_id, &relative_path, caption, date, collection)?;
        let data = PhysicalAlbum {
            album_root_id: root_id,
            caption: caption.to_string(),
            collection: collection.to_string(),
            date,
            icon: None,
        };
        self.tree.insert(parent, Album::physical(id, name, data))
    }

    /// Rename an album's directory and rewrite the stored path of the album
    /// and everything below it in one transaction.
    pub fn rename_physical(&mut self, album: AlbumHandle, new_name: &str) -> Result<(), AlbumError> {
        let store = self.store()?;
        let current = self.require_child(album, AlbumKind::Physical)?;
        validate_name(new_name, "Album")?;
        if current.title() == new_name {
            return Ok(());
        }
        let gid = current.gid();
        let parent = current
            .parent()
            .ok_or_else(|| AlbumError::NotFound("Album has no parent".into()))?;
        if self.sibling_named(parent, new_name, Some(album)) {
            return Err(AlbumError::NameConflict(
                "An existing album has the same name".into(),
            ));
        }

        let (root_id, old_path) = self
            .tree
            .physical_location(album)
            .ok_or_else(|| AlbumError::NotFound("Album no longer exists".into()))?;
        let parent_path = self.tree.physical_path(parent).unwrap_or_else(|| "/".into());
        let new_path = child_path(&parent_path, new_name);

        let resolver = self.resolver.as_ref();
        let (Some(old_dir), Some(new_dir)) = (
            resolve_album_path(resolver, root_id, &old_path),
            resolve_album_path(resolver, root_id, &new_path),
        ) else {
            return Err(AlbumError::NotFound(format!("Unknown album root {}", root_id)));
        };
        if new_dir.exists() {
            return Err(AlbumError::Filesystem(
                "Another file or folder with same name exists".into(),
            ));
        }

        let renames: Vec<(i64, String)> = std::iter::once(album)
            .chain(self.tree.iter(album))
            .filter_map(|h| {
                let id = self.tree.get(h)?.id();
                let (_, path) = self.tree.physical_location(h)?;
                let suffix = path.strip_prefix(old_path.as_str())?;
                Some((id, format!("{}{}", new_path, suffix)))
            })
            .collect();

        fs::rename(&old_dir, &new_dir)?;

        let result = with_transaction(store.as_ref(), |store| {
            for (id, path) in &renames {
                store.rename_album(*id, path)?;
            }
            Ok::<(), AlbumError>(())
        });
        if let Err(e) = result {
            if let Err(undo) = fs::rename(&new_dir, &old_dir) {
                tracing::error!(
                    "Failed to restore {} after catalog error: {}",
                    old_dir.display(),
                    undo
                );
            }
            return Err(e);
        }

        self.tree.set_title(album, new_name);
        self.tree.rebuild_path_index();
        tracing::info!("Renamed album {} to {}", old_path, new_path);
        self.events.emit(CatalogEvent::AlbumRenamed(gid));
        Ok(())
    }

    pub fn set_physical_icon(&mut self, album: AlbumHandle, item_id: Option<i64>) -> Result<(), AlbumError> {
        let store = self.store()?;
        let gid = self.require_child(album, AlbumKind::Physical)?.gid();

        let icon = match item_id {
            Some(id) => {
                let item = store
                    .item(id)?
                    .ok_or_else(|| AlbumError::NotFound(format!("Item {} not found", id)))?;
                resolve_album_path(self.resolver.as_ref(), item.album_root_id, &item.relative_path())
            }
            None => None,
        };
        store.set_album_icon(gid.id, item_id)?;

        if let Some(AlbumData::Physical(data)) = self.tree.data_mut(album) {
            data.icon = icon;
        }
        self.events.emit(CatalogEvent::AlbumIconChanged(gid));
        Ok(())
    }

    /// Album holding the directory at `path`, if it is catalogued.
    pub fn find_physical_by_path(&self, path: &Path) -> Option<AlbumHandle> {
        let (root_id, relative_path) = self.resolver.locate(path)?;
        if relative_path == "/" {
            return Some(self.tree.root(AlbumKind::Physical));
        }
        self.tree.find_physical(root_id, &relative_path)
    }

    // ========================================================================
    // Tags
    // ========================================================================

    pub fn create_tag(
        &mut self,
        parent: AlbumHandle,
        name: &str,
        icon: Option<&str>,
    ) -> Result<AlbumHandle, AlbumError> {
        let store = self.store()?;
        let pid = self.require(parent, AlbumKind::Tag)?.id();
        validate_name(name, "Tag")?;
        if self.sibling_named(parent, name, None) {
            return Err(AlbumError::NameConflict(format!("Tag \"{}\" already exists here", name)));
        }

        let id = store.add_tag(pid, name, icon, None)?;
        let data = TagAlbum {
            pid,
            icon: icon.map(str::to_string),
            icon_path: None,
        };
        self.tree.insert(parent, Album::tag(id, name, data))
    }

    pub fn rename_tag(&mut self, tag: AlbumHandle, new_name: &str) -> Result<(), AlbumError> {
        let store = self.store()?;
        let current = self.require_child(tag, AlbumKind::Tag)?;
        validate_name(new_name, "Tag")?;
        if current.title() == new_name {
            return Ok(());
        }
        let gid = current.gid();
        if let Some(parent) = current.parent() {
            if self.sibling_named(parent, new_name, Some(tag)) {
                return Err(AlbumError::NameConflict(format!(
                    "Tag \"{}\" already exists here",
                    new_name
                )));
            }
        }

        store.set_tag_name(gid.id, new_name)?;
        self.tree.set_title(tag, new_name);
        self.events.emit(CatalogEvent::AlbumRenamed(gid));
        Ok(())
    }

    pub fn move_tag(&mut self, tag: AlbumHandle, new_parent: AlbumHandle) -> Result<(), AlbumError> {
        let store = self.store()?;
        let current = self.require_child(tag, AlbumKind::Tag)?;
        let gid = current.gid();
        let title = current.title().to_string();
        if current.parent() == Some(new_parent) {
            return Ok(());
        }
        let parent_gid = self.require(new_parent, AlbumKind::Tag)?.gid();
        if tag == new_parent || self.tree.is_ancestor(tag, new_parent) {
            return Err(AlbumError::InvalidOperation(
                "Cannot move a tag below itself".into(),
            ));
        }
        if self.sibling_named(new_parent, &title, None) {
            return Err(AlbumError::NameConflict(format!(
                "Tag \"{}\" already exists there",
                title
            )));
        }

        store.set_tag_parent_id(gid.id, parent_gid.id)?;
        self.tree.reparent(tag, new_parent)?;
        if let Some(AlbumData::Tag(data)) = self.tree.data_mut(tag) {
            data.pid = parent_gid.id;
        }
        self.events.emit(CatalogEvent::TagMoved {
            tag: gid,
            new_parent: parent_gid,
        });
        Ok(())
    }

    /// Set a system icon name or an item as the tag's icon.
    pub fn set_tag_icon(
        &mut self,
        tag: AlbumHandle,
        icon: Option<&str>,
        item_id: Option<i64>,
    ) -> Result<(), AlbumError> {
        let store = self.store()?;
        let gid = self.require_child(tag, AlbumKind::Tag)?.gid();

        let icon_path = match item_id {
            Some(id) => {
                let item = store
                    .item(id)?
                    .ok_or_else(|| AlbumError::NotFound(format!("Item {} not found", id)))?;
                resolve_album_path(self.resolver.as_ref(), item.album_root_id, &item.relative_path())
            }
            None => None,
        };
        store.set_tag_icon(gid.id, icon, item_id)?;

        if let Some(AlbumData::Tag(data)) = self.tree.data_mut(tag) {
            data.icon = icon.map(str::to_string);
            data.icon_path = icon_path;
        }
        self.events.emit(CatalogEvent::AlbumIconChanged(gid));
        Ok(())
    }

    /// Delete a tag and every tag below it.
    pub fn delete_tag(&mut self, tag: AlbumHandle) -> Result<(), AlbumError> {
        let store = self.store()?;
        self.require_child(tag, AlbumKind::Tag)?;

        let mut ids: Vec<i64> = std::iter::once(tag)
            .chain(self.tree.iter(tag))
            .filter_map(|h| self.tree.get(h).map(|a| a.id()))
            .collect();
        ids.reverse();

        with_transaction(store.as_ref(), |store| {
            for id in &ids {
                store.delete_tag(*id)?;
            }
            Ok::<(), AlbumError>(())
        })?;

        self.tree.remove(tag);
        Ok(())
    }

    /// Tag ids for `a/b/c` paths, creating whatever is missing.
    pub fn find_or_create_tags(&mut self, paths: &[String]) -> Result<Vec<i64>, AlbumError> {
        self.store()?;
        let mut ids = Vec::with_capacity(paths.len());

        for path in paths {
            let mut current = self.tree.root(AlbumKind::Tag);
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                let existing = self
                    .tree
                    .children(current)
                    .into_iter()
                    .find(|&h| self.tree.get(h).is_some_and(|a| a.title() == segment));
                current = match existing {
                    Some(h) => h,
                    None => self.create_tag(current, segment, None)?,
                };
            }
            match self.tree.get(current) {
                Some(album) if !album.is_root() => ids.push(album.id()),
                _ => {
                    return Err(AlbumError::InvalidName(format!(
                        "\"{}\" is not a tag path",
                        path
                    )))
                }
            }
        }

        Ok(ids)
    }

    /// `a/b/c` paths of known tag ids; unknown ids are left out.
    pub fn tag_paths(&self, tag_ids: &[i64], leading_slash: bool) -> Vec<String> {
        tag_ids
            .iter()
            .filter_map(|&id| self.tree.find_tag(id))
            .filter_map(|h| self.tree.tag_path(h, leading_slash))
            .collect()
    }

    pub fn tag_names(&self, tag_ids: &[i64]) -> Vec<String> {
        tag_ids
            .iter()
            .filter_map(|&id| self.tree.find_tag(id))
            .filter_map(|h| self.tree.get(h).map(|a| a.title().to_string()))
            .collect()
    }

    // ========================================================================
    // Searches
    // ========================================================================

    /// Save a search. A search with the same name is updated instead.
    pub fn create_search(&mut self, name: &str, query: &str, temporary: bool) -> Result<AlbumHandle, AlbumError> {
        let store = self.store()?;
        if name.trim().is_empty() {
            return Err(AlbumError::InvalidName("Search name cannot be empty".into()));
        }

        let root = self.tree.root(AlbumKind::Search);
        let existing = self
            .tree
            .children(root)
            .into_iter()
            .find(|&h| self.tree.get(h).is_some_and(|a| a.title() == name));
        if let Some(handle) = existing {
            self.update_search(handle, name, query)?;
            return Ok(handle);
        }

        let id = store.add_search(name, query, temporary)?;
        self.tree
            .insert(root, Album::search(id, name, SearchAlbum::new(query, temporary)))
    }

    pub fn update_search(&mut self, search: AlbumHandle, name: &str, query: &str) -> Result<(), AlbumError> {
        let store = self.store()?;
        let current = self.require_child(search, AlbumKind::Search)?;
        let gid = current.gid();
        let renamed = current.title() != name;
        let temporary = current.as_search().is_some_and(|s| s.temporary);

        store.update_search(gid.id, name, query)?;
        if renamed {
            self.tree.set_title(search, name);
        }
        if let Some(AlbumData::Search(data)) = self.tree.data_mut(search) {
            *data = SearchAlbum::new(query, temporary);
        }
        if renamed {
            self.events.emit(CatalogEvent::AlbumRenamed(gid));
        }
        Ok(())
    }

    pub fn delete_search(&mut self, search: AlbumHandle) -> Result<(), AlbumError> {
        let store = self.store()?;
        let id = self.require_child(search, AlbumKind::Search)?.id();
        store.delete_search(id)?;
        self.tree.remove(search);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::manager::tests::fixture;
    use crate::album::GlobalId;
    use crate::db::CatalogStore;

    #[test]
    fn test_create_physical_makes_directory_and_row() {
        let mut fx = fixture();
        let root = fx.manager.tree().root(AlbumKind::Physical);
        let photos = fx.photos();

        let year = fx
            .manager
            .create_physical(root, &photos, "2020", "Year", None, "")
            .unwrap();
        let trip = fx
            .manager
            .create_physical(year, &photos, "trip", "", None, "Holidays")
            .unwrap();

        assert!(photos.join("2020").join("trip").is_dir());
        assert_eq!(fx.manager.tree().physical_path(trip).as_deref(), Some("/2020/trip"));
        let rows = fx.db.scan_albums().unwrap();
        assert!(rows.iter().any(|r| r.relative_path == "/2020/trip" && r.collection == "Holidays"));

        // The new nodes match what a sync pass would build.
        assert_eq!(fx.manager.refresh().unwrap().added, 0);
    }

    #[test]
    fn test_create_physical_rejects_bad_names() {
        let mut fx = fixture();
        let root = fx.manager.tree().root(AlbumKind::Physical);
        let photos = fx.photos();

        let err = fx.manager.create_physical(root, &photos, "", "", None, "").unwrap_err();
        assert_eq!(err.to_string(), "Album name cannot be empty");
        let err = fx.manager.create_physical(root, &photos, "a/b", "", None, "").unwrap_err();
        assert_eq!(err.to_string(), "Album name cannot contain '/'");

        fx.manager.create_physical(root, &photos, "a", "", None, "").unwrap();
        let err = fx.manager.create_physical(root, &photos, "a", "", None, "").unwrap_err();
        assert!(matches!(err, AlbumError::NameConflict(_)));

        fs::create_dir(photos.join("b")).unwrap();
        let err = fx.manager.create_physical(root, &photos, "b", "", None, "").unwrap_err();
        assert_eq!(err.to_string(), "Another file or folder with same name exists");
        assert!(fx.manager.tree().find_physical(1, "/b").is_none());
    }

    #[test]
    fn test_rename_physical_rewrites_subtree_paths() {
        let mut fx = fixture();
        let photos = fx.photos();
        for dir in ["vacation/day1", "vacation/day2"] {
            fs::create_dir_all(photos.join(dir)).unwrap();
        }
        let vacation = fx.db.add_album(1, "/vacation", "", None, "").unwrap();
        let day1 = fx.db.add_album(1, "/vacation/day1", "", None, "").unwrap();
        fx.db.add_album(1, "/vacation/day2", "", None, "").unwrap();
        fx.manager.refresh().unwrap();
        fx.drain();

        let handle = fx.manager.tree().find_physical(1, "/vacation").unwrap();
        fx.manager.rename_physical(handle, "holiday").unwrap();

        assert!(photos.join("holiday").join("day1").is_dir());
        assert!(!photos.join("vacation").exists());
        assert_eq!(
            fx.physical_keys(),
            vec![
                (1, "/holiday".to_string()),
                (1, "/holiday/day1".to_string()),
                (1, "/holiday/day2".to_string()),
            ]
        );
        let mut stored: Vec<String> = fx
            .db
            .scan_albums()
            .unwrap()
            .into_iter()
            .map(|r| r.relative_path)
            .collect();
        stored.sort();
        assert_eq!(stored, vec!["/holiday", "/holiday/day1", "/holiday/day2"]);
        assert_eq!(fx.db.transaction_depth(), 0);
        assert_eq!(
            fx.drain(),
            vec![CatalogEvent::AlbumRenamed(GlobalId::new(AlbumKind::Physical, vacation))]
        );

        // Nothing left for the next pass to fix up.
        let report = fx.manager.refresh().unwrap();
        assert_eq!((report.added, report.removed), (0, 0));
        assert!(fx
            .manager
            .tree()
            .find(GlobalId::new(AlbumKind::Physical, day1))
            .is_some());
    }

    #[test]
    fn test_rename_physical_refusals() {
        let mut fx = fixture();
        let photos = fx.photos();
        let root = fx.manager.tree().root(AlbumKind::Physical);
        let a = fx.manager.create_physical(root, &photos, "a", "", None, "").unwrap();
        fx.manager.create_physical(root, &photos, "b", "", None, "").unwrap();

        assert!(matches!(
            fx.manager.rename_physical(root, "x"),
            Err(AlbumError::InvalidOperation(_))
        ));
        assert!(matches!(
            fx.manager.rename_physical(a, "b"),
            Err(AlbumError::NameConflict(_))
        ));
        assert!(matches!(
            fx.manager.rename_physical(a, "x/y"),
            Err(AlbumError::InvalidName(_))
        ));
        assert!(photos.join("a").is_dir());
    }

    #[test]
    fn test_physical_icon_and_lookup_by_path() {
        let mut fx = fixture();
        let photos = fx.photos();
        let root = fx.manager.tree().root(AlbumKind::Physical);
        let album = fx.manager.create_physical(root, &photos, "a", "", None, "").unwrap();
        let album_id = fx.manager.tree().get(album).unwrap().id();
        let item = fx.db.add_item(album_id, "cover.jpg", None).unwrap();
        fx.drain();

        fx.manager.set_physical_icon(album, Some(item)).unwrap();
        let data = fx.manager.tree().get(album).unwrap().as_physical().unwrap().clone();
        assert_eq!(data.icon, Some(photos.join("a").join("cover.jpg")));
        assert_eq!(fx.db.album_icon(album_id).unwrap(), Some(item));
        assert_eq!(
            fx.drain(),
            vec![CatalogEvent::AlbumIconChanged(GlobalId::new(AlbumKind::Physical, album_id))]
        );

        assert_eq!(fx.manager.find_physical_by_path(&photos.join("a")), Some(album));
        assert_eq!(fx.manager.find_physical_by_path(&photos), Some(root));
        assert_eq!(fx.manager.find_physical_by_path(&photos.join("zzz")), None);
    }

    #[test]
    fn test_tag_edits() {
        let mut fx = fixture();
        let root = fx.manager.tree().root(AlbumKind::Tag);
        let people = fx.manager.create_tag(root, "people", Some("user")).unwrap();
        let places = fx.manager.create_tag(root, "places", None).unwrap();
        let alice = fx.manager.create_tag(people, "alice", None).unwrap();

        assert!(matches!(
            fx.manager.create_tag(people, "alice", None),
            Err(AlbumError::NameConflict(_))
        ));
        assert!(matches!(
            fx.manager.move_tag(people, alice),
            Err(AlbumError::InvalidOperation(_))
        ));

        fx.manager.rename_tag(alice, "alicia").unwrap();
        fx.manager.move_tag(alice, places).unwrap();
        let alice_id = fx.manager.tree().get(alice).unwrap().id();
        let places_id = fx.manager.tree().get(places).unwrap().id();
        assert_eq!(fx.manager.tag_paths(&[alice_id], true), vec!["/places/alicia"]);
        assert_eq!(fx.manager.tag_names(&[alice_id, 999]), vec!["alicia"]);

        let stored = fx.db.scan_tags().unwrap();
        let row = stored.iter().find(|t| t.id == alice_id).unwrap();
        assert_eq!((row.name.as_str(), row.pid), ("alicia", places_id));

        // The tree already matches the store.
        let report = fx.manager.refresh().unwrap();
        assert_eq!((report.added, report.removed), (0, 0));
    }

    #[test]
    fn test_delete_tag_removes_descendants_from_store() {
        let mut fx = fixture();
        let root = fx.manager.tree().root(AlbumKind::Tag);
        let people = fx.manager.create_tag(root, "people", None).unwrap();
        fx.manager.create_tag(people, "alice", None).unwrap();
        fx.manager.create_tag(root, "places", None).unwrap();

        fx.manager.delete_tag(people).unwrap();
        let names: Vec<String> = fx.db.scan_tags().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["places"]);
        assert_eq!(fx.manager.tree().len(), 5);
        assert!(matches!(
            fx.manager.delete_tag(root),
            Err(AlbumError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_find_or_create_tags() {
        let mut fx = fixture();
        let root = fx.manager.tree().root(AlbumKind::Tag);
        let people = fx.manager.create_tag(root, "people", None).unwrap();
        let people_id = fx.manager.tree().get(people).unwrap().id();

        let ids = fx
            .manager
            .find_or_create_tags(&["people".to_string(), "/events/2020/party".to_string()])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], people_id);
        assert_eq!(fx.manager.tag_paths(&ids[1..], false), vec!["events/2020/party"]);
        assert_eq!(fx.db.tags_from_paths(&["events/2020/party".to_string()]).unwrap(), vec![ids[1]]);

        assert!(fx.manager.find_or_create_tags(&["/".to_string()]).is_err());
    }

    #[test]
    fn test_tag_icon() {
        let mut fx = fixture();
        let root = fx.manager.tree().root(AlbumKind::Tag);
        let tag = fx.manager.create_tag(root, "pets", None).unwrap();
        fx.manager.set_tag_icon(tag, Some("animal"), None).unwrap();

        let data = fx.manager.tree().get(tag).unwrap().as_tag().unwrap().clone();
        assert_eq!(data.icon.as_deref(), Some("animal"));
        let id = fx.manager.tree().get(tag).unwrap().id();
        assert_eq!(fx.db.tag_icon(id).unwrap().icon.as_deref(), Some("animal"));
    }

    #[test]
    fn test_searches() {
        let mut fx = fixture();
        let cats = fx.manager.create_search("cats", "1.key=keyword\n1.value=cat", false).unwrap();
        let again = fx.manager.create_search("cats", "1.key=album\n1.value=1", false).unwrap();
        assert_eq!(cats, again);
        assert_eq!(fx.db.scan_searches().unwrap().len(), 1);
        assert!(!fx.manager.tree().get(cats).unwrap().as_search().unwrap().simple);

        fx.manager.update_search(cats, "kittens", "1.key=keyword\n1.value=kitten").unwrap();
        let album = fx.manager.tree().get(cats).unwrap();
        assert_eq!(album.title(), "kittens");
        assert!(album.as_search().unwrap().simple);

        fx.manager.delete_search(cats).unwrap();
        assert!(fx.db.scan_searches().unwrap().is_empty());
        assert!(!fx.manager.tree().contains(cats));
    }

    #[test]
    fn test_edits_without_database() {
        let fx = fixture();
        let resolver = fx.manager.resolver.clone();
        let mut manager = AlbumManager::new(None, resolver, fx.manager.events().clone(), true);
        let root = manager.tree().root(AlbumKind::Tag);
        assert!(matches!(
            manager.create_tag(root, "x", None),
            Err(AlbumError::NoDatabase)
        ));
        assert!(matches!(
            manager.create_search("x", "q", false),
            Err(AlbumError::NoDatabase)
        ));
    }
}
