//! Set reconciliation between the tree and the catalog, one pass per kind.
//!
//! Every pass follows the same shape: snapshot the nodes already in the tree,
//! read the rows, drop what vanished (topmost nodes only, removal cascades),
//! then insert what is new with parents ahead of their children. A row whose
//! parent cannot be found is logged and skipped; it gets another chance on
//! the next pass.

use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use super::manager::SyncReport;
use super::tree::{AlbumHandle, AlbumTree};
use super::{Album, AlbumData, AlbumKind, GlobalId, PhysicalAlbum, SearchAlbum, TagAlbum};
use crate::collection::{resolve_album_path, LocationResolver};
use crate::db::{AlbumInfo, CatalogStore, TagInfo};
use crate::error::AlbumError;
use crate::events::{CatalogEvent, EventBus};

fn icon_path(
    resolver: &dyn LocationResolver,
    root_id: Option<i32>,
    relative_path: Option<&str>,
) -> Option<PathBuf> {
    resolve_album_path(resolver, root_id?, relative_path?)
}

/// Remove only nodes that have no doomed ancestor. Returns nodes removed.
fn remove_topmost(tree: &mut AlbumTree, doomed: &[AlbumHandle]) -> usize {
    let set: HashSet<AlbumHandle> = doomed.iter().copied().collect();
    let topmost: Vec<AlbumHandle> = doomed
        .iter()
        .copied()
        .filter(|&h| !set.iter().any(|&other| other != h && tree.is_ancestor(other, h)))
        .collect();

    topmost.into_iter().map(|h| tree.remove(h)).sum()
}

// ============================================================================
// Physical albums
// ============================================================================

fn physical_data(row: &AlbumInfo, resolver: &dyn LocationResolver) -> PhysicalAlbum {
    PhysicalAlbum {
        album_root_id: row.album_root_id,
        caption: row.caption.clone(),
        collection: row.collection.clone(),
        date: row.date,
        icon: icon_path(resolver, row.icon_root_id, row.icon_relative_path.as_deref()),
    }
}

fn path_depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

pub(super) fn physical(
    tree: &mut AlbumTree,
    store: &dyn CatalogStore,
    resolver: &dyn LocationResolver,
    events: &EventBus,
) -> Result<SyncReport, AlbumError> {
    let mut report = SyncReport::default();

    let mut incoming: HashMap<(i32, String), AlbumInfo> = HashMap::new();
    for row in store.scan_albums()? {
        if row.relative_path.is_empty() || row.relative_path == "/" {
            continue;
        }
        if !resolver.is_available(row.album_root_id) {
            continue;
        }
        incoming.insert((row.album_root_id, row.relative_path.clone()), row);
    }

    let root = tree.root(AlbumKind::Physical);
    let existing: Vec<AlbumHandle> = tree.iter(root).collect();
    let mut doomed = Vec::new();
    for handle in existing {
        let Some((root_id, path)) = tree.physical_location(handle) else {
            continue;
        };
        if !resolver.is_available(root_id) {
            continue;
        }
        let id = tree.get(handle).map(|a| a.id());
        match incoming.get(&(root_id, path)) {
            Some(row) if Some(row.id) == id => {}
            _ => doomed.push(handle),
        }
    }
    report.removed += remove_topmost(tree, &doomed);

    let mut new_rows = Vec::new();
    for (key, row) in incoming {
        match tree.find_physical(key.0, &key.1) {
            Some(handle) => update_physical(tree, handle, &row, resolver, events),
            None => new_rows.push(row),
        }
    }
    new_rows.sort_by(|a, b| {
        path_depth(&a.relative_path)
            .cmp(&path_depth(&b.relative_path))
            .then_with(|| a.relative_path.cmp(&b.relative_path))
    });

    for row in new_rows {
        let (parent_path, title) = match row.relative_path.rsplit_once('/') {
            Some((parent, title)) if !title.is_empty() => (parent, title),
            _ => {
                tracing::warn!("Skipping album with malformed path {:?}", row.relative_path);
                report.skipped += 1;
                continue;
            }
        };

        let parent = if parent_path.is_empty() {
            Some(root)
        } else {
            tree.find_physical(row.album_root_id, parent_path)
        };
        let Some(parent) = parent else {
            tracing::warn!(
                "No parent album for {} in root {}, skipping",
                row.relative_path,
                row.album_root_id
            );
            report.skipped += 1;
            continue;
        };

        let album = Album::physical(row.id, title, physical_data(&row, resolver));
        match tree.insert(parent, album) {
            Ok(_) => report.added += 1,
            Err(e) => {
                tracing::warn!("Cannot add album {}: {}", row.relative_path, e);
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

fn update_physical(
    tree: &mut AlbumTree,
    handle: AlbumHandle,
    row: &AlbumInfo,
    resolver: &dyn LocationResolver,
    events: &EventBus,
) {
    let fresh = physical_data(row, resolver);
    let Some(AlbumData::Physical(data)) = tree.data_mut(handle) else {
        return;
    };
    let icon_changed = data.icon != fresh.icon;
    *data = fresh;
    if icon_changed {
        events.emit(CatalogEvent::AlbumIconChanged(GlobalId::new(AlbumKind::Physical, row.id)));
    }
}

// ============================================================================
// Tags
// ============================================================================

fn tag_data(row: &TagInfo, resolver: &dyn LocationResolver) -> TagAlbum {
    TagAlbum {
        pid: row.pid,
        icon: row.icon.clone(),
        icon_path: icon_path(resolver, row.icon_root_id, row.icon_relative_path.as_deref()),
    }
}

/// New rows ordered so every parent precedes its children. Rows hanging off
/// an existing tag (or the root) start a branch; rows in a cycle are dropped.
fn order_new_tags(rows: Vec<TagInfo>) -> Vec<TagInfo> {
    let new_ids: HashSet<i64> = rows.iter().map(|r| r.id).collect();
    let mut children: BTreeMap<i64, Vec<TagInfo>> = BTreeMap::new();
    let mut branches = Vec::new();
    for row in rows {
        if new_ids.contains(&row.pid) {
            children.entry(row.pid).or_default().push(row);
        } else {
            branches.push(row);
        }
    }

    let mut ordered = Vec::new();
    let mut stack: Vec<TagInfo> = branches.into_iter().rev().collect();
    while let Some(row) = stack.pop() {
        if let Some(kids) = children.remove(&row.id) {
            stack.extend(kids.into_iter().rev());
        }
        ordered.push(row);
    }
    for row in children.into_values().flatten() {
        tracing::warn!("Tag {} ({}) is part of a parent cycle, skipping", row.id, row.name);
    }
    ordered
}

pub(super) fn tags(
    tree: &mut AlbumTree,
    store: &dyn CatalogStore,
    resolver: &dyn LocationResolver,
    events: &EventBus,
) -> Result<SyncReport, AlbumError> {
    let mut report = SyncReport::default();

    let mut incoming: HashMap<i64, TagInfo> = store
        .scan_tags()?
        .into_iter()
        .filter(|row| row.id != 0)
        .map(|row| (row.id, row))
        .collect();

    let root = tree.root(AlbumKind::Tag);
    let existing: Vec<AlbumHandle> = tree.iter(root).collect();
    let doomed: Vec<AlbumHandle> = existing
        .iter()
        .copied()
        .filter(|&h| tree.get(h).is_some_and(|a| !incoming.contains_key(&a.id())))
        .collect();
    report.removed += remove_topmost(tree, &doomed);

    // Survivors: follow renames and moves made behind our back. A move onto
    // a tag that is itself new waits until the inserts below are done.
    let survivors: Vec<AlbumHandle> = tree.iter(root).collect();
    let mut pending_moves = Vec::new();
    for handle in survivors {
        let Some(id) = tree.get(handle).map(|a| a.id()) else {
            continue;
        };
        let Some(row) = incoming.remove(&id) else {
            continue;
        };
        if !update_tag(tree, handle, &row, resolver, events) {
            pending_moves.push((handle, row));
        }
    }

    let mut rows: Vec<TagInfo> = incoming.into_values().collect();
    rows.sort_by_key(|r| r.id);
    let total = rows.len();
    let ordered = order_new_tags(rows);
    report.skipped += total - ordered.len();

    for row in ordered {
        let parent = if row.pid == 0 {
            Some(root)
        } else {
            tree.find_tag(row.pid)
        };
        let Some(parent) = parent else {
            tracing::warn!("No parent tag {} for tag {} ({}), skipping", row.pid, row.id, row.name);
            report.skipped += 1;
            continue;
        };

        let album = Album::tag(row.id, row.name.clone(), tag_data(&row, resolver));
        match tree.insert(parent, album) {
            Ok(_) => report.added += 1,
            Err(e) => {
                tracing::warn!("Cannot add tag {}: {}", row.name, e);
                report.skipped += 1;
            }
        }
    }

    for (handle, row) in pending_moves {
        if !move_tag_node(tree, handle, &row, events) {
            tracing::warn!("No parent tag {} for tag {}, leaving it in place", row.pid, row.name);
        }
    }

    Ok(report)
}

/// Returns false when the row's parent is not in the tree yet.
fn update_tag(
    tree: &mut AlbumTree,
    handle: AlbumHandle,
    row: &TagInfo,
    resolver: &dyn LocationResolver,
    events: &EventBus,
) -> bool {
    let gid = GlobalId::new(AlbumKind::Tag, row.id);

    if tree.get(handle).is_some_and(|a| a.title() != row.name) {
        tree.set_title(handle, row.name.clone());
        events.emit(CatalogEvent::AlbumRenamed(gid));
    }

    let fresh = tag_data(row, resolver);
    if let Some(AlbumData::Tag(data)) = tree.data_mut(handle) {
        let icon_changed = data.icon != fresh.icon || data.icon_path != fresh.icon_path;
        *data = fresh;
        if icon_changed {
            events.emit(CatalogEvent::AlbumIconChanged(gid));
        }
    }

    move_tag_node(tree, handle, row, events)
}

fn move_tag_node(
    tree: &mut AlbumTree,
    handle: AlbumHandle,
    row: &TagInfo,
    events: &EventBus,
) -> bool {
    let current_pid = tree
        .get(handle)
        .and_then(|a| a.parent())
        .and_then(|p| tree.get(p))
        .map(|p| p.id());
    if current_pid == Some(row.pid) {
        return true;
    }

    let new_parent = if row.pid == 0 {
        Some(tree.root(AlbumKind::Tag))
    } else {
        tree.find_tag(row.pid)
    };
    let Some(new_parent) = new_parent else {
        return false;
    };
    match tree.reparent(handle, new_parent) {
        Ok(()) => events.emit(CatalogEvent::TagMoved {
            tag: GlobalId::new(AlbumKind::Tag, row.id),
            new_parent: GlobalId::new(AlbumKind::Tag, row.pid),
        }),
        Err(e) => tracing::warn!("Cannot move tag {}: {}", row.name, e),
    }
    true
}

// ============================================================================
// Searches
// ============================================================================

pub(super) fn searches(
    tree: &mut AlbumTree,
    store: &dyn CatalogStore,
    events: &EventBus,
) -> Result<SyncReport, AlbumError> {
    let mut report = SyncReport::default();
    let rows = store.scan_searches()?;
    let ids: HashSet<i64> = rows.iter().map(|r| r.id).collect();

    let root = tree.root(AlbumKind::Search);
    let doomed: Vec<AlbumHandle> = tree
        .children(root)
        .into_iter()
        .filter(|&h| tree.get(h).is_some_and(|a| !ids.contains(&a.id())))
        .collect();
    for handle in doomed {
        report.removed += tree.remove(handle);
    }

    for row in rows {
        let data = SearchAlbum::new(row.query.clone(), row.temporary);
        match tree.find_search(row.id) {
            Some(handle) => {
                let gid = GlobalId::new(AlbumKind::Search, row.id);
                if tree.get(handle).is_some_and(|a| a.title() != row.name) {
                    tree.set_title(handle, row.name.clone());
                    events.emit(CatalogEvent::AlbumRenamed(gid));
                }
                if let Some(AlbumData::Search(search)) = tree.data_mut(handle) {
                    *search = data;
                }
            }
            None => {
                tree.insert(root, Album::search(row.id, row.name, data))?;
                report.added += 1;
            }
        }
    }

    Ok(report)
}

// ============================================================================
// Dates
// ============================================================================

pub(super) fn dates(
    tree: &mut AlbumTree,
    store: &dyn CatalogStore,
    events: &EventBus,
    next_id: &mut i64,
) -> Result<SyncReport, AlbumError> {
    let mut report = SyncReport::default();

    let mut months: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    let mut days: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for (taken_at, count) in store.scan_item_dates()? {
        *months.entry((taken_at.year(), taken_at.month())).or_default() += count;
        *days.entry(taken_at.date()).or_default() += count;
    }

    let root = tree.root(AlbumKind::Date);
    let doomed: Vec<AlbumHandle> = tree
        .children(root)
        .into_iter()
        .filter(|&h| {
            tree.get(h)
                .and_then(|a| a.as_date())
                .is_some_and(|d| !months.contains_key(&(d.year, d.month)))
        })
        .collect();
    for handle in doomed {
        report.removed += tree.remove(handle);
    }

    for &(year, month) in months.keys() {
        if tree.find_date(year, month).is_some() {
            continue;
        }
        tree.insert(root, Album::date(*next_id, year, month))?;
        *next_id += 1;
        report.added += 1;
    }

    events.emit(CatalogEvent::DateAlbumsDirty(months));
    events.emit(CatalogEvent::DatesMapDirty(days));
    Ok(report)
}
