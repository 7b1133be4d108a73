//! Caches keyed by file location that must follow renames.

use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::config::ThumbnailConfig;

/// Notified after a successful rename.
pub trait CacheInvalidator: Send {
    /// Drop whatever is cached for the old location.
    fn delete_thumbnail(&self, old: &Url);

    /// The file at `new` changed; anything cached for it is stale.
    fn file_changed(&self, new: &Url);
}

/// On-disk thumbnail cache, one file per source path.
pub struct ThumbnailCache {
    cache_dir: PathBuf,
}

impl ThumbnailCache {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            cache_dir: config.path.clone(),
        }
    }

    /// Cache filename derived from a hash of the original path
    pub fn cache_path(&self, original: &Path) -> PathBuf {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        original.to_string_lossy().hash(&mut hasher);
        let hash = hasher.finish();

        self.cache_dir.join(format!("{:016x}.jpg", hash))
    }

    pub fn get_cached_path(&self, original: &Path) -> Option<PathBuf> {
        let cache_path = self.cache_path(original);
        cache_path.exists().then_some(cache_path)
    }

    fn evict(&self, url: &Url) {
        let Ok(path) = url.to_file_path() else {
            return;
        };
        if let Some(cached) = self.get_cached_path(&path) {
            if let Err(e) = fs::remove_file(&cached) {
                tracing::warn!("Failed to remove thumbnail {}: {}", cached.display(), e);
            }
        }
    }
}

impl CacheInvalidator for ThumbnailCache {
    fn delete_thumbnail(&self, old: &Url) {
        self.evict(old);
    }

    fn file_changed(&self, new: &Url) {
        self.evict(new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_rename_evicts_both_locations() {
        let dir = tempdir().unwrap();
        let cache = ThumbnailCache::new(&ThumbnailConfig {
            path: dir.path().to_path_buf(),
        });
        let old = dir.path().join("photo.nef");
        let new = dir.path().join("photo2.nef");
        fs::write(cache.cache_path(&old), b"thumb").unwrap();
        fs::write(cache.cache_path(&new), b"stale").unwrap();

        cache.delete_thumbnail(&Url::from_file_path(&old).unwrap());
        assert!(cache.get_cached_path(&old).is_none());
        assert!(cache.get_cached_path(&new).is_some());

        cache.file_changed(&Url::from_file_path(&new).unwrap());
        assert!(cache.get_cached_path(&new).is_none());
    }

    #[test]
    fn test_cache_paths_are_stable_and_distinct() {
        let cache = ThumbnailCache::new(&ThumbnailConfig {
            path: PathBuf::from("/cache"),
        });
        let a = cache.cache_path(Path::new("/photos/a.jpg"));
        assert_eq!(a, cache.cache_path(Path::new("/photos/a.jpg")));
        assert_ne!(a, cache.cache_path(Path::new("/photos/b.jpg")));
        assert!(a.starts_with("/cache"));
    }
}
