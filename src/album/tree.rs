//! Arena-backed album forest with one synthetic root per kind.

use std::collections::HashMap;

use super::{Album, AlbumData, AlbumKind, GlobalId, PhysicalLocation};
use crate::db::child_path;
use crate::error::AlbumError;
use crate::events::{CatalogEvent, EventBus};

/// Generational index into the tree. A handle to a removed node never
/// resolves again, even if its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlbumHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Links {
    pub(crate) parent: Option<AlbumHandle>,
    pub(crate) first_child: Option<AlbumHandle>,
    pub(crate) last_child: Option<AlbumHandle>,
    pub(crate) prev: Option<AlbumHandle>,
    pub(crate) next: Option<AlbumHandle>,
}

struct Slot {
    generation: u32,
    album: Option<Album>,
}

pub struct AlbumTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    roots: [AlbumHandle; 4],
    by_gid: HashMap<GlobalId, AlbumHandle>,
    by_path: HashMap<(i32, String), AlbumHandle>,
    by_date: HashMap<(i32, u32), AlbumHandle>,
    current: Option<AlbumHandle>,
    events: EventBus,
}

impl AlbumTree {
    pub fn new(events: EventBus) -> Self {
        let placeholder = AlbumHandle {
            index: 0,
            generation: 0,
        };
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            roots: [placeholder; 4],
            by_gid: HashMap::new(),
            by_path: HashMap::new(),
            by_date: HashMap::new(),
            current: None,
            events,
        };
        tree.create_roots();
        tree
    }

    fn create_roots(&mut self) {
        for kind in AlbumKind::ALL {
            let handle = self.alloc(Album::root(kind));
            self.by_gid.insert(GlobalId::root(kind), handle);
            self.roots[kind.index()] = handle;
        }
    }

    fn alloc(&mut self, album: Album) -> AlbumHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.album = Some(album);
            AlbumHandle {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                album: Some(album),
            });
            AlbumHandle {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    fn release(&mut self, handle: AlbumHandle) {
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            if slot.generation == handle.generation && slot.album.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(handle.index);
            }
        }
    }

    pub fn get(&self, handle: AlbumHandle) -> Option<&Album> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.album.as_ref())
    }

    fn get_mut(&mut self, handle: AlbumHandle) -> Option<&mut Album> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.album.as_mut())
    }

    pub fn contains(&self, handle: AlbumHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Mutable access to the payload; titles and links go through dedicated methods.
    pub fn data_mut(&mut self, handle: AlbumHandle) -> Option<&mut AlbumData> {
        self.get_mut(handle).map(|album| &mut album.data)
    }

    pub fn root(&self, kind: AlbumKind) -> AlbumHandle {
        self.roots[kind.index()]
    }

    /// Live nodes, roots included.
    pub fn len(&self) -> usize {
        self.by_gid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_gid.is_empty()
    }

    // ========================================================================
    // Insert / remove
    // ========================================================================

    /// Append `album` as the last child of `parent` and index it.
    pub fn insert(&mut self, parent: AlbumHandle, album: Album) -> Result<AlbumHandle, AlbumError> {
        let parent_album = self
            .get(parent)
            .ok_or_else(|| AlbumError::NotFound("Parent album no longer exists".into()))?;

        if parent_album.kind() != album.kind() {
            return Err(AlbumError::InvalidOperation(format!(
                "Cannot add a {:?} album below a {:?} album",
                album.kind(),
                parent_album.kind()
            )));
        }

        let gid = album.gid();
        if gid.id == 0 || self.by_gid.contains_key(&gid) {
            return Err(AlbumError::NameConflict(format!("Album {} already exists", gid)));
        }

        let path_key = match &album.data {
            AlbumData::Physical(p) => {
                if let Some(parent_data) = parent_album.as_physical() {
                    if !parent_album.is_root() && parent_data.album_root_id != p.album_root_id {
                        return Err(AlbumError::InvalidOperation(
                            "Album must live in the same album root as its parent".into(),
                        ));
                    }
                }
                let parent_path = self.physical_path(parent).unwrap_or_else(|| "/".into());
                let key = (p.album_root_id, child_path(&parent_path, &album.title));
                if self.by_path.contains_key(&key) {
                    return Err(AlbumError::NameConflict(
                        "An existing album has the same name".into(),
                    ));
                }
                Some(key)
            }
            _ => None,
        };

        let date_key = match &album.data {
            AlbumData::Date(d) => {
                let key = (d.year, d.month);
                if self.by_date.contains_key(&key) {
                    return Err(AlbumError::NameConflict(format!(
                        "Date album {:04}-{:02} already exists",
                        d.year, d.month
                    )));
                }
                Some(key)
            }
            _ => None,
        };

        let handle = self.alloc(album);
        self.link_last(parent, handle);

        self.by_gid.insert(gid, handle);
        if let Some(key) = path_key {
            self.by_path.insert(key, handle);
        }
        if let Some(key) = date_key {
            self.by_date.insert(key, handle);
        }

        self.events.emit(CatalogEvent::AlbumAdded(gid));
        Ok(handle)
    }

    /// Remove `handle` and everything below it, children first. Returns the
    /// number of nodes removed; roots are never removed.
    pub fn remove(&mut self, handle: AlbumHandle) -> usize {
        match self.get(handle) {
            Some(album) if !album.is_root() => {}
            _ => return 0,
        }

        let mut doomed: Vec<AlbumHandle> = std::iter::once(handle).chain(self.iter(handle)).collect();
        doomed.reverse();

        let keys: Vec<(AlbumHandle, GlobalId, Option<(i32, String)>, Option<(i32, u32)>)> = doomed
            .iter()
            .filter_map(|&h| {
                let album = self.get(h)?;
                let path_key = self.physical_location(h);
                let date_key = album.as_date().map(|d| (d.year, d.month));
                Some((h, album.gid(), path_key, date_key))
            })
            .collect();

        if self.current.is_some_and(|current| doomed.contains(&current)) {
            self.current = None;
            self.events.emit(CatalogEvent::CurrentAlbumChanged(None));
        }

        self.unlink(handle);

        for (h, gid, path_key, date_key) in &keys {
            self.by_gid.remove(gid);
            if let Some(key) = path_key {
                if self.by_path.get(key) == Some(h) {
                    self.by_path.remove(key);
                }
            }
            if let Some(key) = date_key {
                self.by_date.remove(key);
            }
            self.release(*h);
            self.events.emit(CatalogEvent::AlbumDeleted(*gid));
        }

        keys.len()
    }

    /// Drop every album and start over with four empty roots.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.by_gid.clear();
        self.by_path.clear();
        self.by_date.clear();
        self.current = None;
        self.create_roots();
        self.events.emit(CatalogEvent::AlbumsCleared);
    }

    fn link_last(&mut self, parent: AlbumHandle, child: AlbumHandle) {
        let last = self.get(parent).and_then(|p| p.links.last_child);

        if let Some(album) = self.get_mut(child) {
            album.links.parent = Some(parent);
            album.links.prev = last;
            album.links.next = None;
        }
        if let Some(last) = last {
            if let Some(album) = self.get_mut(last) {
                album.links.next = Some(child);
            }
        }
        if let Some(p) = self.get_mut(parent) {
            if p.links.first_child.is_none() {
                p.links.first_child = Some(child);
            }
            p.links.last_child = Some(child);
        }
    }

    fn unlink(&mut self, handle: AlbumHandle) {
        let Some(links) = self.get(handle).map(|a| a.links) else {
            return;
        };

        if let Some(prev) = links.prev {
            if let Some(album) = self.get_mut(prev) {
                album.links.next = links.next;
            }
        }
        if let Some(next) = links.next {
            if let Some(album) = self.get_mut(next) {
                album.links.prev = links.prev;
            }
        }
        if let Some(parent) = links.parent {
            if let Some(p) = self.get_mut(parent) {
                if p.links.first_child == Some(handle) {
                    p.links.first_child = links.next;
                }
                if p.links.last_child == Some(handle) {
                    p.links.last_child = links.prev;
                }
            }
        }
        if let Some(album) = self.get_mut(handle) {
            album.links.parent = None;
            album.links.prev = None;
            album.links.next = None;
        }
    }

    // ========================================================================
    // Structure edits
    // ========================================================================

    /// Move a node (with its subtree) to the end of `new_parent`'s children.
    pub fn reparent(&mut self, handle: AlbumHandle, new_parent: AlbumHandle) -> Result<(), AlbumError> {
        let album = self
            .get(handle)
            .ok_or_else(|| AlbumError::NotFound("Album no longer exists".into()))?;
        let parent = self
            .get(new_parent)
            .ok_or_else(|| AlbumError::NotFound("Destination album no longer exists".into()))?;

        if album.is_root() {
            return Err(AlbumError::InvalidOperation("Cannot move a root album".into()));
        }
        if album.kind() != parent.kind() {
            return Err(AlbumError::InvalidOperation(
                "Cannot move an album to a different hierarchy".into(),
            ));
        }
        if handle == new_parent || self.is_ancestor(handle, new_parent) {
            return Err(AlbumError::InvalidOperation(
                "Cannot move an album below itself".into(),
            ));
        }

        self.unlink(handle);
        self.link_last(new_parent, handle);
        Ok(())
    }

    /// Change a title. Physical callers must [`rebuild_path_index`](Self::rebuild_path_index).
    pub fn set_title(&mut self, handle: AlbumHandle, title: impl Into<String>) -> bool {
        match self.get_mut(handle) {
            Some(album) if !album.is_root => {
                album.title = title.into();
                true
            }
            _ => false,
        }
    }

    pub fn rebuild_path_index(&mut self) {
        let physical: Vec<AlbumHandle> = self.iter(self.root(AlbumKind::Physical)).collect();
        self.by_path = physical
            .into_iter()
            .filter_map(|h| self.physical_location(h).map(|key| (key, h)))
            .collect();
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn find(&self, gid: GlobalId) -> Option<AlbumHandle> {
        self.by_gid.get(&gid).copied()
    }

    pub fn find_physical(&self, album_root_id: i32, relative_path: &str) -> Option<AlbumHandle> {
        self.by_path
            .get(&(album_root_id, relative_path.to_string()))
            .copied()
    }

    pub fn find_tag(&self, tag_id: i64) -> Option<AlbumHandle> {
        self.find(GlobalId::new(AlbumKind::Tag, tag_id))
    }

    pub fn find_search(&self, search_id: i64) -> Option<AlbumHandle> {
        self.find(GlobalId::new(AlbumKind::Search, search_id))
    }

    pub fn find_date(&self, year: i32, month: u32) -> Option<AlbumHandle> {
        self.by_date.get(&(year, month)).copied()
    }

    /// Tag below the tag root named by `a/b/c` (leading slash optional).
    pub fn find_tag_by_path(&self, path: &str) -> Option<AlbumHandle> {
        let mut current = self.root(AlbumKind::Tag);
        let mut matched = false;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self
                .children(current)
                .into_iter()
                .find(|&h| self.get(h).is_some_and(|a| a.title() == segment))?;
            matched = true;
        }
        matched.then_some(current)
    }

    pub fn children(&self, handle: AlbumHandle) -> Vec<AlbumHandle> {
        let mut children = Vec::new();
        let mut next = self.get(handle).and_then(|a| a.links.first_child);
        while let Some(child) = next {
            children.push(child);
            next = self.get(child).and_then(|a| a.links.next);
        }
        children
    }

    /// Pre-order walk of the subtree below `handle`, excluding `handle`.
    pub fn iter(&self, handle: AlbumHandle) -> SubtreeIter<'_> {
        SubtreeIter {
            tree: self,
            top: handle,
            next: self.get(handle).and_then(|a| a.links.first_child),
        }
    }

    /// Root of `kind` followed by all its descendants.
    pub fn all_of_kind(&self, kind: AlbumKind) -> Vec<AlbumHandle> {
        let root = self.root(kind);
        std::iter::once(root).chain(self.iter(root)).collect()
    }

    pub fn is_ancestor(&self, ancestor: AlbumHandle, handle: AlbumHandle) -> bool {
        let mut next = self.get(handle).and_then(|a| a.links.parent);
        while let Some(parent) = next {
            if parent == ancestor {
                return true;
            }
            next = self.get(parent).and_then(|a| a.links.parent);
        }
        false
    }

    /// Relative path derived from the parent chain; `/` for the root.
    pub fn physical_path(&self, handle: AlbumHandle) -> Option<String> {
        let album = self.get(handle)?;
        album.as_physical()?;
        if album.is_root() {
            return Some("/".into());
        }
        Some(format!("/{}", self.titles_below_root(handle).join("/")))
    }

    /// Album root id and relative path of a non-root physical album.
    pub fn physical_location(&self, handle: AlbumHandle) -> Option<(i32, String)> {
        let album = self.get(handle)?;
        if album.is_root() {
            return None;
        }
        let root_id = album.as_physical()?.album_root_id;
        Some((root_id, self.physical_path(handle)?))
    }

    pub fn album_location(&self, handle: AlbumHandle) -> Option<PhysicalLocation> {
        let album = self.get(handle)?;
        let (album_root_id, relative_path) = self.physical_location(handle)?;
        Some(PhysicalLocation {
            album_id: album.id(),
            album_root_id,
            relative_path,
        })
    }

    /// `a/b/c` path of a tag, optionally with a leading slash.
    pub fn tag_path(&self, handle: AlbumHandle, leading_slash: bool) -> Option<String> {
        let album = self.get(handle)?;
        album.as_tag()?;
        if album.is_root() {
            return Some(if leading_slash { "/".into() } else { String::new() });
        }
        let path = self.titles_below_root(handle).join("/");
        Some(if leading_slash { format!("/{}", path) } else { path })
    }

    fn titles_below_root(&self, handle: AlbumHandle) -> Vec<String> {
        let mut titles = Vec::new();
        let mut next = Some(handle);
        while let Some(h) = next {
            match self.get(h) {
                Some(album) if !album.is_root() => {
                    titles.push(album.title.clone());
                    next = album.links.parent;
                }
                _ => break,
            }
        }
        titles.reverse();
        titles
    }

    // ========================================================================
    // Selection
    // ========================================================================

    pub fn current(&self) -> Option<AlbumHandle> {
        self.current.filter(|&h| self.contains(h))
    }

    pub fn set_current(&mut self, handle: Option<AlbumHandle>) {
        let handle = handle.filter(|&h| self.contains(h));
        if handle == self.current {
            return;
        }
        self.current = handle;
        let gid = handle.and_then(|h| self.get(h)).map(|a| a.gid());
        self.events.emit(CatalogEvent::CurrentAlbumChanged(gid));
    }
}

pub struct SubtreeIter<'a> {
    tree: &'a AlbumTree,
    top: AlbumHandle,
    next: Option<AlbumHandle>,
}

impl Iterator for SubtreeIter<'_> {
    type Item = AlbumHandle;

    fn next(&mut self) -> Option<AlbumHandle> {
        let current = self.next?;
        let links = self.tree.get(current)?.links;

        self.next = if links.first_child.is_some() {
            links.first_child
        } else {
            let mut cursor = Some(current);
            let mut found = None;
            while let Some(h) = cursor {
                if h == self.top {
                    break;
                }
                let l = self.tree.get(h).map(|a| a.links).unwrap_or_default();
                if l.next.is_some() {
                    found = l.next;
                    break;
                }
                cursor = l.parent;
            }
            found
        };

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::{PhysicalAlbum, TagAlbum};

    fn physical(id: i64, title: &str) -> Album {
        Album::physical(
            id,
            title,
            PhysicalAlbum {
                album_root_id: 1,
                ..Default::default()
            },
        )
    }

    fn tag(id: i64, title: &str) -> Album {
        Album::tag(id, title, TagAlbum::default())
    }

    #[test]
    fn test_new_tree_has_four_roots() {
        let tree = AlbumTree::new(EventBus::new());
        assert_eq!(tree.len(), 4);
        for kind in AlbumKind::ALL {
            let root = tree.get(tree.root(kind)).unwrap();
            assert!(root.is_root());
            assert_eq!(root.title(), kind.root_title());
            assert_eq!(tree.find(GlobalId::root(kind)), Some(tree.root(kind)));
        }
    }

    #[test]
    fn test_insert_indexes_physical_paths() {
        let events = EventBus::new();
        let rx = events.subscribe();
        let mut tree = AlbumTree::new(events);
        let root = tree.root(AlbumKind::Physical);

        let year = tree.insert(root, physical(1, "2020")).unwrap();
        let trip = tree.insert(year, physical(2, "trip")).unwrap();

        assert_eq!(tree.find_physical(1, "/2020"), Some(year));
        assert_eq!(tree.find_physical(1, "/2020/trip"), Some(trip));
        assert_eq!(tree.physical_path(trip).as_deref(), Some("/2020/trip"));
        assert_eq!(tree.get(trip).unwrap().parent(), Some(year));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                CatalogEvent::AlbumAdded(GlobalId::new(AlbumKind::Physical, 1)),
                CatalogEvent::AlbumAdded(GlobalId::new(AlbumKind::Physical, 2)),
            ]
        );
    }

    #[test]
    fn test_insert_rejects_duplicates_and_wrong_kind() {
        let mut tree = AlbumTree::new(EventBus::new());
        let root = tree.root(AlbumKind::Physical);
        tree.insert(root, physical(1, "a")).unwrap();

        assert!(matches!(
            tree.insert(root, physical(2, "a")),
            Err(AlbumError::NameConflict(_))
        ));
        assert!(matches!(
            tree.insert(root, physical(1, "b")),
            Err(AlbumError::NameConflict(_))
        ));
        assert!(matches!(
            tree.insert(root, tag(5, "x")),
            Err(AlbumError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_remove_cascades_and_clears_selection() {
        let events = EventBus::new();
        let mut tree = AlbumTree::new(events.clone());
        let root = tree.root(AlbumKind::Physical);
        let a = tree.insert(root, physical(1, "a")).unwrap();
        let b = tree.insert(a, physical(2, "b")).unwrap();
        let c = tree.insert(b, physical(3, "c")).unwrap();
        let d = tree.insert(a, physical(4, "d")).unwrap();
        tree.set_current(Some(c));

        let rx = events.subscribe();
        assert_eq!(tree.remove(a), 4);

        for h in [a, b, c, d] {
            assert!(!tree.contains(h));
        }
        assert_eq!(tree.find_physical(1, "/a/b"), None);
        assert_eq!(tree.find(GlobalId::new(AlbumKind::Physical, 3)), None);
        assert_eq!(tree.current(), None);
        assert_eq!(tree.len(), 4);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events[0], CatalogEvent::CurrentAlbumChanged(None));
        assert_eq!(events.len(), 5);
        // children before parents
        assert_eq!(
            events.last(),
            Some(&CatalogEvent::AlbumDeleted(GlobalId::new(AlbumKind::Physical, 1)))
        );
    }

    #[test]
    fn test_remove_refuses_roots() {
        let mut tree = AlbumTree::new(EventBus::new());
        assert_eq!(tree.remove(tree.root(AlbumKind::Tag)), 0);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_stale_handle_does_not_resolve_after_reuse() {
        let mut tree = AlbumTree::new(EventBus::new());
        let root = tree.root(AlbumKind::Tag);
        let old = tree.insert(root, tag(1, "old")).unwrap();
        tree.remove(old);
        let new = tree.insert(root, tag(2, "new")).unwrap();

        assert!(tree.get(old).is_none());
        assert_eq!(tree.get(new).unwrap().title(), "new");
    }

    #[test]
    fn test_iter_is_preorder() {
        let mut tree = AlbumTree::new(EventBus::new());
        let root = tree.root(AlbumKind::Tag);
        let a = tree.insert(root, tag(1, "a")).unwrap();
        let a1 = tree.insert(a, tag(2, "a1")).unwrap();
        let b = tree.insert(root, tag(3, "b")).unwrap();
        let a2 = tree.insert(a, tag(4, "a2")).unwrap();

        let order: Vec<_> = tree.iter(root).collect();
        assert_eq!(order, vec![a, a1, a2, b]);
        assert_eq!(tree.iter(a).collect::<Vec<_>>(), vec![a1, a2]);
        assert_eq!(tree.iter(a1).count(), 0);
    }

    #[test]
    fn test_reparent_refuses_cycles() {
        let mut tree = AlbumTree::new(EventBus::new());
        let root = tree.root(AlbumKind::Tag);
        let a = tree.insert(root, tag(1, "a")).unwrap();
        let b = tree.insert(a, tag(2, "b")).unwrap();
        let c = tree.insert(root, tag(3, "c")).unwrap();

        assert!(tree.reparent(a, b).is_err());
        assert!(tree.reparent(a, a).is_err());

        tree.reparent(b, c).unwrap();
        assert_eq!(tree.children(a), Vec::<AlbumHandle>::new());
        assert_eq!(tree.children(c), vec![b]);
        assert_eq!(tree.tag_path(b, true).as_deref(), Some("/c/b"));
        assert_eq!(tree.find_tag_by_path("c/b"), Some(b));
        assert_eq!(tree.find_tag_by_path("a/b"), None);
    }

    #[test]
    fn test_set_title_and_rebuild_path_index() {
        let mut tree = AlbumTree::new(EventBus::new());
        let root = tree.root(AlbumKind::Physical);
        let a = tree.insert(root, physical(1, "vacation")).unwrap();
        let b = tree.insert(a, physical(2, "day1")).unwrap();

        tree.set_title(a, "holiday");
        tree.rebuild_path_index();

        assert_eq!(tree.find_physical(1, "/holiday/day1"), Some(b));
        assert_eq!(tree.find_physical(1, "/vacation"), None);
    }

    #[test]
    fn test_clear_recreates_roots() {
        let events = EventBus::new();
        let mut tree = AlbumTree::new(events.clone());
        let root = tree.root(AlbumKind::Date);
        tree.insert(root, Album::date(1, 2020, 1)).unwrap();

        let rx = events.subscribe();
        tree.clear();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.find_date(2020, 1), None);
        assert_eq!(rx.try_recv().unwrap(), CatalogEvent::AlbumsCleared);
    }
}
