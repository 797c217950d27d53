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
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::debug;

use super::sweeper::{Sweep, Sweeper};
use super::FilesCache;
use crate::fs::{FileObject, FileSystemId};
use crate::name::FileName;

const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// A cache which keeps a file only while a handle to it is held outside
/// the cache.
///
/// Files are held weakly, so the cache alone never keeps a file alive.
/// Open content streams hold their file, which keeps a file shared for as
/// long as it is being read or written. A background sweeper trims entries
/// whose file has been dropped; a lookup that finds a dead entry removes it
/// on the spot.
pub struct TrackedFilesCache {
    inner: Arc<TrackedInner>,
    sweeper: Sweeper,
}

struct TrackedInner {
    filesystems: Mutex<HashMap<FileSystemId, HashMap<FileName, Weak<FileObject>>>>,
}

impl TrackedFilesCache {
    pub fn new() -> Self {
        TrackedFilesCache {
            inner: Arc::new(TrackedInner {
                filesystems: Mutex::new(HashMap::new()),
            }),
            sweeper: Sweeper::new(SWEEP_INTERVAL),
        }
    }

    fn task(&self) -> Arc<dyn Sweep> {
        Arc::clone(&self.inner) as Arc<dyn Sweep>
    }
}

impl Default for TrackedFilesCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Sweep for TrackedInner {
    fn sweep(&self) -> bool {
        let mut filesystems = self.filesystems.lock().unwrap();
        let mut swept = 0usize;
        for files in filesystems.values_mut() {
            files.retain(|_, file| {
                let live = file.strong_count() > 0;
                if !live {
                    swept += 1;
                }
                live
            });
        }
        filesystems.retain(|_, files| !files.is_empty());
        if swept > 0 {
            debug!(target: "omnivfs::cache", swept, "swept dropped files");
        }
        !filesystems.is_empty()
    }

    fn has_entries(&self) -> bool {
        let filesystems = self.filesystems.lock().unwrap();
        filesystems.values().any(|files| !files.is_empty())
    }
}

impl FilesCache for TrackedFilesCache {
    fn put_file(&self, file: &Arc<FileObject>) {
        {
            let mut filesystems = self.inner.filesystems.lock().unwrap();
            let files = filesystems.entry(file.file_system().id()).or_default();
            files.insert(file.name().clone(), Arc::downgrade(file));
        }
        self.sweeper.entry_added(self.task());
    }

    fn put_file_if_absent(&self, file: &Arc<FileObject>) -> bool {
        let added = {
            let mut filesystems = self.inner.filesystems.lock().unwrap();
            let files = filesystems.entry(file.file_system().id()).or_default();
            match files.get(file.name()) {
                Some(existing) if existing.strong_count() > 0 => false,
                _ => {
                    files.insert(file.name().clone(), Arc::downgrade(file));
                    true
                }
            }
        };
        if added {
            self.sweeper.entry_added(self.task());
        }
        added
    }

    fn get_file(&self, fs: FileSystemId, name: &FileName) -> Option<Arc<FileObject>> {
        let mut filesystems = self.inner.filesystems.lock().unwrap();
        let files = filesystems.get_mut(&fs)?;
        match files.get(name).and_then(Weak::upgrade) {
            Some(file) => Some(file),
            None => {
                files.remove(name);
                None
            }
        }
    }

    fn remove_file(&self, fs: FileSystemId, name: &FileName) {
        let mut filesystems = self.inner.filesystems.lock().unwrap();
        if let Some(files) = filesystems.get_mut(&fs) {
            files.remove(name);
        }
    }

    fn touch_file(&self, _file: &Arc<FileObject>) {}

    fn clear(&self, fs: FileSystemId) {
        let mut filesystems = self.inner.filesystems.lock().unwrap();
        filesystems.remove(&fs);
    }

    fn close(&self) {
        self.sweeper.close();
        let mut filesystems = self.inner.filesystems.lock().unwrap();
        filesystems.clear();
    }
}

impl fmt::Debug for TrackedFilesCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedFilesCache").finish_non_exhaustive()
    }
}
