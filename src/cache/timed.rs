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
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use super::sweeper::{Sweep, Sweeper};
use super::FilesCache;
use crate::fs::{FileObject, FileSystemId};
use crate::name::FileName;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// A cache which drops files that have not been used for a while.
///
/// Every cached file carries a last-used timestamp, refreshed each time the
/// file is resolved. A background sweeper evicts files whose timestamp is
/// older than the TTL, skipping files with open content. With a capacity,
/// the sweeper also evicts the least recently used files beyond it, expired
/// or not.
pub struct TimedFilesCache {
    inner: Arc<TimedInner>,
    sweeper: Sweeper,
}

struct TimedInner {
    ttl: Duration,
    capacity: Option<usize>,
    filesystems: Mutex<HashMap<FileSystemId, HashMap<FileName, TimedEntry>>>,
}

struct TimedEntry {
    file: Arc<FileObject>,
    last_touch: Instant,
}

impl TimedFilesCache {
    pub fn new(ttl: Duration, capacity: Option<usize>) -> Self {
        let interval = ttl.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
        TimedFilesCache {
            inner: Arc::new(TimedInner {
                ttl,
                capacity,
                filesystems: Mutex::new(HashMap::new()),
            }),
            sweeper: Sweeper::new(interval),
        }
    }

    fn task(&self) -> Arc<dyn Sweep> {
        Arc::clone(&self.inner) as Arc<dyn Sweep>
    }
}

impl Sweep for TimedInner {
    fn sweep(&self) -> bool {
        let mut filesystems = self.filesystems.lock().unwrap();
        let now = Instant::now();
        let mut evicted = 0usize;
        for files in filesystems.values_mut() {
            files.retain(|_, entry| {
                let keep = now.duration_since(entry.last_touch) < self.ttl
                    || entry.file.is_content_open();
                if !keep {
                    evicted += 1;
                }
                keep
            });
        }
        if let Some(capacity) = self.capacity {
            let total: usize = filesystems.values().map(HashMap::len).sum();
            if total > capacity {
                let mut candidates: Vec<(FileSystemId, FileName, Instant)> = filesystems
                    .iter()
                    .flat_map(|(fs, files)| {
                        files.iter().filter_map(move |(name, entry)| {
                            if entry.file.is_content_open() {
                                None
                            } else {
                                Some((*fs, name.clone(), entry.last_touch))
                            }
                        })
                    })
                    .collect();
                candidates.sort_by_key(|(_, _, touch)| *touch);
                for (fs, name, _) in candidates.into_iter().take(total - capacity) {
                    if let Some(files) = filesystems.get_mut(&fs) {
                        files.remove(&name);
                        evicted += 1;
                    }
                }
            }
        }
        filesystems.retain(|_, files| !files.is_empty());
        if evicted > 0 {
            debug!(target: "omnivfs::cache", evicted, "swept unused files");
        }
        !filesystems.is_empty()
    }

    fn has_entries(&self) -> bool {
        let filesystems = self.filesystems.lock().unwrap();
        filesystems.values().any(|files| !files.is_empty())
    }
}

impl FilesCache for TimedFilesCache {
    fn put_file(&self, file: &Arc<FileObject>) {
        {
            let mut filesystems = self.inner.filesystems.lock().unwrap();
            let files = filesystems.entry(file.file_system().id()).or_default();
            files.insert(
                file.name().clone(),
                TimedEntry {
                    file: Arc::clone(file),
                    last_touch: Instant::now(),
                },
            );
        }
        self.sweeper.entry_added(self.task());
    }

    fn put_file_if_absent(&self, file: &Arc<FileObject>) -> bool {
        let added = {
            let mut filesystems = self.inner.filesystems.lock().unwrap();
            let files = filesystems.entry(file.file_system().id()).or_default();
            if files.contains_key(file.name()) {
                false
            } else {
                files.insert(
                    file.name().clone(),
                    TimedEntry {
                        file: Arc::clone(file),
                        last_touch: Instant::now(),
                    },
                );
                true
            }
        };
        if added {
            self.sweeper.entry_added(self.task());
        }
        added
    }

    fn get_file(&self, fs: FileSystemId, name: &FileName) -> Option<Arc<FileObject>> {
        let filesystems = self.inner.filesystems.lock().unwrap();
        let files = filesystems.get(&fs)?;
        files.get(name).map(|entry| Arc::clone(&entry.file))
    }

    fn remove_file(&self, fs: FileSystemId, name: &FileName) {
        let mut filesystems = self.inner.filesystems.lock().unwrap();
        if let Some(files) = filesystems.get_mut(&fs) {
            files.remove(name);
        }
    }

    fn touch_file(&self, file: &Arc<FileObject>) {
        let mut filesystems = self.inner.filesystems.lock().unwrap();
        if let Some(files) = filesystems.get_mut(&file.file_system().id()) {
            if let Some(entry) = files.get_mut(file.name()) {
                entry.last_touch = Instant::now();
            }
        }
    }

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

impl fmt::Debug for TimedFilesCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedFilesCache")
            .field("ttl", &self.inner.ttl)
            .field("capacity", &self.inner.capacity)
            .finish_non_exhaustive()
    }
}
