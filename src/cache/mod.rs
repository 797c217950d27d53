//! Caching of file handles.
//!
//! A context shares one [`FilesCache`] among its file systems so that two
//! resolutions of the same name return the same [`FileObject`] handle. The
//! cache strategy decides how long an unused handle stays shared; it is
//! selected with a [`CacheConfig`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use static_assertions::assert_obj_safe;

use crate::fs::{FileObject, FileSystemId};
use crate::name::FileName;

pub use self::lru::LruFilesCache;
pub use self::timed::TimedFilesCache;
pub use self::tracked::TrackedFilesCache;
pub use self::unbounded::UnboundedFilesCache;

mod lru;
mod sweeper;
mod timed;
mod tracked;
mod unbounded;

/// A cache of file handles, keyed by file system and name.
///
/// Implementations are safe to call from several threads at once. A cache
/// never fails; a miss is reported by [`get_file`] returning `None`, and
/// removing a file which is not cached does nothing.
///
/// [`get_file`]: FilesCache::get_file
pub trait FilesCache: Send + Sync {
    /// Add `file` to the cache, replacing any cached file with the same
    /// name.
    fn put_file(&self, file: &Arc<FileObject>);

    /// Add `file` to the cache unless a file with the same name is already
    /// cached.
    ///
    /// Returns whether `file` became the cached instance. When several
    /// threads race to cache the same name, exactly one wins; the others
    /// must discard their file and use the winner.
    fn put_file_if_absent(&self, file: &Arc<FileObject>) -> bool;

    /// Return the cached file for `name`, if any.
    fn get_file(&self, fs: FileSystemId, name: &FileName) -> Option<Arc<FileObject>>;

    /// Remove the cached file for `name`, if any.
    fn remove_file(&self, fs: FileSystemId, name: &FileName);

    /// Record that `file` was used.
    ///
    /// This is a hint; strategies which do not track recency ignore it.
    fn touch_file(&self, file: &Arc<FileObject>);

    /// Drop all files cached for `fs`.
    fn clear(&self, fs: FileSystemId);

    /// Drop everything and release the resources the cache owns.
    ///
    /// Safe to call more than once. The cache is not used after the
    /// context which owns it closes.
    fn close(&self);
}

assert_obj_safe!(FilesCache);

/// A strategy for caching file handles.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum CacheConfig {
    /// Cache every file until its file system is closed.
    ///
    /// This is the default strategy.
    Unbounded,

    /// Keep at most `capacity` files per file system, evicting the least
    /// recently used first.
    ///
    /// Files which are attached or have open content are never evicted, so
    /// the cache can hold more than `capacity` files while entries are
    /// pinned.
    Lru {
        /// The number of files kept per file system.
        capacity: usize,
    },

    /// Drop files which have not been used for `ttl`.
    ///
    /// A background sweeper evicts expired files, skipping files with open
    /// content. With a `capacity`, the sweeper also evicts the least
    /// recently used files beyond it, expired or not.
    Timed {
        /// How long an unused file stays cached.
        ttl: Duration,
        /// An optional bound on the number of files cached per context.
        capacity: Option<usize>,
    },

    /// Keep a file only while a handle to it is held outside the cache.
    ///
    /// The cache holds files weakly; once the last outside handle is
    /// dropped, the next resolution constructs a fresh file. A background
    /// sweeper trims the dead entries.
    Tracked,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::Unbounded
    }
}

impl CacheConfig {
    /// Construct the cache this configuration describes.
    pub(crate) fn build(&self) -> Arc<dyn FilesCache> {
        match self {
            CacheConfig::Unbounded => Arc::new(UnboundedFilesCache::new()),
            CacheConfig::Lru { capacity } => Arc::new(LruFilesCache::new(*capacity)),
            CacheConfig::Timed { ttl, capacity } => {
                Arc::new(TimedFilesCache::new(*ttl, *capacity))
            }
            CacheConfig::Tracked => Arc::new(TrackedFilesCache::new()),
        }
    }
}
