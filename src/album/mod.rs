//! Album hierarchy: physical folders, tags, saved searches and dates.

mod edit;
pub mod manager;
mod sync;
pub mod tree;

use chrono::NaiveDate;
use std::path::PathBuf;

use crate::db::AlbumInfo;

pub use manager::{AlbumManager, LocaleCheck, StoreAdvice, SyncReport};
pub use tree::{AlbumHandle, AlbumTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlbumKind {
    Physical,
    Tag,
    Search,
    Date,
}

impl AlbumKind {
    pub const ALL: [AlbumKind; 4] = [
        AlbumKind::Physical,
        AlbumKind::Tag,
        AlbumKind::Search,
        AlbumKind::Date,
    ];

    pub fn root_title(&self) -> &'static str {
        match self {
            AlbumKind::Physical => "My Albums",
            AlbumKind::Tag => "My Tags",
            AlbumKind::Search => "My Searches",
            AlbumKind::Date => "My Dates",
        }
    }

    fn index(&self) -> usize {
        match self {
            AlbumKind::Physical => 0,
            AlbumKind::Tag => 1,
            AlbumKind::Search => 2,
            AlbumKind::Date => 3,
        }
    }
}

/// Identity of an album across all kinds. Roots use id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId {
    pub kind: AlbumKind,
    pub id: i64,
}

impl GlobalId {
    pub fn new(kind: AlbumKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn root(kind: AlbumKind) -> Self {
        Self { kind, id: 0 }
    }
}

impl std::fmt::Display for GlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.id)
    }
}

/// Where a physical album lives: its row id, album root and root-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalLocation {
    pub album_id: i64,
    pub album_root_id: i32,
    pub relative_path: String,
}

impl From<&AlbumInfo> for PhysicalLocation {
    fn from(info: &AlbumInfo) -> Self {
        Self {
            album_id: info.id,
            album_root_id: info.album_root_id,
            relative_path: info.relative_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicalAlbum {
    pub album_root_id: i32,
    pub caption: String,
    pub collection: String,
    pub date: Option<NaiveDate>,
    pub icon: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagAlbum {
    pub pid: i64,
    /// System icon name.
    pub icon: Option<String>,
    /// Icon taken from a catalogued item.
    pub icon_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchAlbum {
    pub query: String,
    pub simple: bool,
    pub temporary: bool,
}

impl SearchAlbum {
    pub fn new(query: impl Into<String>, temporary: bool) -> Self {
        let query = query.into();
        Self {
            simple: is_simple_query(&query),
            query,
            temporary,
        }
    }
}

/// A query whose first key is `keyword` is a simple (free text) search.
pub fn is_simple_query(query: &str) -> bool {
    query
        .split(|c| c == '\n' || c == '&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == "1.key")
        .map(|(_, value)| value.trim() == "keyword")
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateAlbum {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlbumData {
    Physical(PhysicalAlbum),
    Tag(TagAlbum),
    Search(SearchAlbum),
    Date(DateAlbum),
}

impl AlbumData {
    pub fn kind(&self) -> AlbumKind {
        match self {
            AlbumData::Physical(_) => AlbumKind::Physical,
            AlbumData::Tag(_) => AlbumKind::Tag,
            AlbumData::Search(_) => AlbumKind::Search,
            AlbumData::Date(_) => AlbumKind::Date,
        }
    }

    fn empty(kind: AlbumKind) -> Self {
        match kind {
            AlbumKind::Physical => AlbumData::Physical(PhysicalAlbum::default()),
            AlbumKind::Tag => AlbumData::Tag(TagAlbum::default()),
            AlbumKind::Search => AlbumData::Search(SearchAlbum::default()),
            AlbumKind::Date => AlbumData::Date(DateAlbum::default()),
        }
    }
}

/// One node of the hierarchy. Links are owned by [`AlbumTree`].
#[derive(Debug, Clone)]
pub struct Album {
    id: i64,
    title: String,
    data: AlbumData,
    is_root: bool,
    pub(crate) links: tree::Links,
}

impl Album {
    pub fn new(id: i64, title: impl Into<String>, data: AlbumData) -> Self {
        Self {
            id,
            title: title.into(),
            data,
            is_root: false,
            links: tree::Links::default(),
        }
    }

    pub fn physical(id: i64, title: impl Into<String>, data: PhysicalAlbum) -> Self {
        Self::new(id, title, AlbumData::Physical(data))
    }

    pub fn tag(id: i64, title: impl Into<String>, data: TagAlbum) -> Self {
        Self::new(id, title, AlbumData::Tag(data))
    }

    pub fn search(id: i64, title: impl Into<String>, data: SearchAlbum) -> Self {
        Self::new(id, title, AlbumData::Search(data))
    }

    pub fn date(id: i64, year: i32, month: u32) -> Self {
        Self::new(
            id,
            format!("{:04}-{:02}", year, month),
            AlbumData::Date(DateAlbum { year, month }),
        )
    }

    fn root(kind: AlbumKind) -> Self {
        Self {
            id: 0,
            title: kind.root_title().to_string(),
            data: AlbumData::empty(kind),
            is_root: true,
            links: tree::Links::default(),
        }
    }

    pub fn gid(&self) -> GlobalId {
        GlobalId::new(self.kind(), self.id)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn kind(&self) -> AlbumKind {
        self.data.kind()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn data(&self) -> &AlbumData {
        &self.data
    }

    pub fn parent(&self) -> Option<AlbumHandle> {
        self.links.parent
    }

    pub fn as_physical(&self) -> Option<&PhysicalAlbum> {
        match &self.data {
            AlbumData::Physical(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&TagAlbum> {
        match &self.data {
            AlbumData::Tag(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_search(&self) -> Option<&SearchAlbum> {
        match &self.data {
            AlbumData::Search(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateAlbum> {
        match &self.data {
            AlbumData::Date(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_query_detection() {
        assert!(is_simple_query("1.key=keyword\n1.op=Like\n1.value=cat"));
        assert!(is_simple_query("type=keyword&1.key=keyword&1.value=cat"));
        assert!(!is_simple_query("1.key=album\n1.value=2"));
        assert!(!is_simple_query("<search/>"));
    }

    #[test]
    fn test_date_album_title() {
        let album = Album::date(7, 2021, 3);
        assert_eq!(album.title(), "2021-03");
        assert_eq!(album.gid(), GlobalId::new(AlbumKind::Date, 7));
        assert_eq!(album.as_date(), Some(&DateAlbum { year: 2021, month: 3 }));
    }
}
