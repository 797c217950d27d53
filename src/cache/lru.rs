/*
 * Copyright 2022 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use lru::LruCache;
use tracing::{debug, warn};

use super::FilesCache;
use crate::fs::{FileObject, FileSystemId};
use crate::name::FileName;

/// The number of files kept per file system when none is given.
pub const DEFAULT_LRU_CAPACITY: usize = 100;

/// A cache which keeps a bounded number of files per file system, evicting
/// the least recently used first.
///
/// Eviction is vetoed for files which are attached or have content open;
/// evicting those would detach a file out from under a caller. Vetoed files
/// stay cached, so the cache can hold more than its capacity while files
/// are pinned.
pub struct LruFilesCache {
    capacity: usize,
    filesystems: RwLock<HashMap<FileSystemId, LruCache<FileName, Arc<FileObject>>>>,
}

impl LruFilesCache {
    pub fn new(capacity: usize) -> Self {
        LruFilesCache {
            capacity: capacity.max(1),
            filesystems: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, file: &Arc<FileObject>, replace: bool) -> bool {
        let mut filesystems = self.filesystems.write().unwrap();
        let files = filesystems
            .entry(file.file_system().id())
            .or_insert_with(LruCache::unbounded);
        if !replace && files.contains(file.name()) {
            return false;
        }
        files.push(file.name().clone(), Arc::clone(file));
        Self::evict(self.capacity, files);
        true
    }

    fn evict(capacity: usize, files: &mut LruCache<FileName, Arc<FileObject>>) {
        while files.len() > capacity {
            let victim = files
                .iter()
                .rev()
                .find(|(_, file)| !file.is_attached() && !file.is_content_open())
                .map(|(name, _)| name.clone());
            match victim {
                Some(name) => {
                    files.pop(&name);
                    debug!(
                        target: "omnivfs::cache",
                        name = %name,
                        "evicted least recently used file",
                    );
                }
                None => {
                    warn!(
                        target: "omnivfs::cache",
                        capacity,
                        held = files.len(),
                        "pinned files hold the cache over capacity",
                    );
                    break;
                }
            }
        }
    }
}

impl Default for LruFilesCache {
    fn default() -> Self {
        Self::new(DEFAULT_LRU_CAPACITY)
    }
}

impl FilesCache for LruFilesCache {
    fn put_file(&self, file: &Arc<FileObject>) {
        self.insert(file, true);
    }

    fn put_file_if_absent(&self, file: &Arc<FileObject>) -> bool {
        self.insert(file, false)
    }

    fn get_file(&self, fs: FileSystemId, name: &FileName) -> Option<Arc<FileObject>> {
        let filesystems = self.filesystems.read().unwrap();
        let files = filesystems.get(&fs)?;
        files.peek(name).cloned()
    }

    fn remove_file(&self, fs: FileSystemId, name: &FileName) {
        let mut filesystems = self.filesystems.write().unwrap();
        if let Some(files) = filesystems.get_mut(&fs) {
            files.pop(name);
        }
    }

    fn touch_file(&self, file: &Arc<FileObject>) {
        let mut filesystems = self.filesystems.write().unwrap();
        if let Some(files) = filesystems.get_mut(&file.file_system().id()) {
            files.promote(file.name());
        }
    }

    fn clear(&self, fs: FileSystemId) {
        let mut filesystems = self.filesystems.write().unwrap();
        filesystems.remove(&fs);
    }

    fn close(&self) {
        let mut filesystems = self.filesystems.write().unwrap();
        filesystems.clear();
    }
}

impl fmt::Debug for LruFilesCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruFilesCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
