//! Album roots: mapping between root ids, absolute paths and root-relative paths.

use std::path::{Component, Path, PathBuf};

use crate::config::AlbumRootConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRoot {
    pub id: i32,
    pub path: PathBuf,
    pub label: String,
}

pub trait LocationResolver: Send + Sync {
    fn album_root_path(&self, root_id: i32) -> Option<PathBuf>;

    /// Root id and `/`-prefixed relative path of an absolute path, using the
    /// deepest root containing it.
    fn locate(&self, path: &Path) -> Option<(i32, String)>;

    fn is_available(&self, root_id: i32) -> bool;

    fn available_root_paths(&self) -> Vec<PathBuf>;

    fn all_roots(&self) -> Vec<AlbumRoot>;
}

/// Absolute path of a root-relative path, if the root is known.
pub fn resolve_album_path(
    resolver: &dyn LocationResolver,
    root_id: i32,
    relative_path: &str,
) -> Option<PathBuf> {
    let root = resolver.album_root_path(root_id)?;
    let relative = relative_path.trim_start_matches('/');
    if relative.is_empty() {
        Some(root)
    } else {
        Some(root.join(relative))
    }
}

/// Resolver backed by the configured album roots. A root is available when
/// its directory exists.
#[derive(Debug, Clone, Default)]
pub struct CollectionManager {
    roots: Vec<AlbumRoot>,
}

impl CollectionManager {
    pub fn new(roots: Vec<AlbumRoot>) -> Self {
        Self { roots }
    }

    pub fn from_config(roots: &[AlbumRootConfig]) -> Self {
        Self::new(
            roots
                .iter()
                .map(|r| AlbumRoot {
                    id: r.id,
                    path: r.path.clone(),
                    label: r.label.clone(),
                })
                .collect(),
        )
    }

    fn root(&self, root_id: i32) -> Option<&AlbumRoot> {
        self.roots.iter().find(|r| r.id == root_id)
    }
}

impl LocationResolver for CollectionManager {
    fn album_root_path(&self, root_id: i32) -> Option<PathBuf> {
        self.root(root_id).map(|r| r.path.clone())
    }

    fn locate(&self, path: &Path) -> Option<(i32, String)> {
        let root = self
            .roots
            .iter()
            .filter(|r| path.starts_with(&r.path))
            .max_by_key(|r| r.path.components().count())?;

        let rest = path.strip_prefix(&root.path).ok()?;
        let parts: Vec<String> = rest
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();

        Some((root.id, format!("/{}", parts.join("/"))))
    }

    fn is_available(&self, root_id: i32) -> bool {
        self.root(root_id).map(|r| r.path.is_dir()).unwrap_or(false)
    }

    fn available_root_paths(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .filter(|r| r.path.is_dir())
            .map(|r| r.path.clone())
            .collect()
    }

    fn all_roots(&self) -> Vec<AlbumRoot> {
        self.roots.clone()
    }
}
