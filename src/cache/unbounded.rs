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
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::FilesCache;
use crate::fs::{FileObject, FileSystemId};
use crate::name::FileName;

/// A cache which keeps every file until its file system is closed.
///
/// Files are held in one concurrent map per file system, so lookups from
/// different file systems never contend.
#[derive(Debug, Default)]
pub struct UnboundedFilesCache {
    filesystems: DashMap<FileSystemId, Arc<DashMap<FileName, Arc<FileObject>>>>,
}

impl UnboundedFilesCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn files_for(&self, fs: FileSystemId) -> Arc<DashMap<FileName, Arc<FileObject>>> {
        if let Some(files) = self.filesystems.get(&fs) {
            return Arc::clone(&files);
        }
        Arc::clone(&self.filesystems.entry(fs).or_default())
    }
}

impl FilesCache for UnboundedFilesCache {
    fn put_file(&self, file: &Arc<FileObject>) {
        let files = self.files_for(file.file_system().id());
        files.insert(file.name().clone(), Arc::clone(file));
    }

    fn put_file_if_absent(&self, file: &Arc<FileObject>) -> bool {
        let files = self.files_for(file.file_system().id());
        let inserted = match files.entry(file.name().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(file));
                true
            }
        };
        inserted
    }

    fn get_file(&self, fs: FileSystemId, name: &FileName) -> Option<Arc<FileObject>> {
        let files = self.filesystems.get(&fs)?;
        let file = files.get(name)?;
        Some(Arc::clone(&file))
    }

    fn remove_file(&self, fs: FileSystemId, name: &FileName) {
        if let Some(files) = self.filesystems.get(&fs) {
            files.remove(name);
        }
    }

    fn touch_file(&self, _file: &Arc<FileObject>) {}

    fn clear(&self, fs: FileSystemId) {
        self.filesystems.remove(&fs);
    }

    fn close(&self) {
        self.filesystems.clear();
    }
}
