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
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::backend::{FileBackend, FileProvider, FileSystemBackend};
use super::error::{Error, Result};
use crate::error::CapacityError;
use crate::fs::Capability;
use crate::name::{parser, FileName, FileType, NameParser, PrefixNameParser};

/// The configuration for a [`RamFileProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RamConfig {
    /// The most bytes of content each file system holds, or `None` for no
    /// limit.
    pub max_size: Option<u64>,
}

/// A file provider which stores files in memory.
///
/// Files created through this provider are not stored persistently and are
/// only accessible to the current process. Each file system created by this
/// provider is a separate store. This provider is useful for testing and for
/// staging files which do not need to outlive the process.
///
/// A capacity can be set with [`with_capacity`]; writes which would grow a
/// file system past its capacity fail with [`Error::CapacityExceeded`].
///
/// [`with_capacity`]: RamFileProvider::with_capacity
/// [`Error::CapacityExceeded`]: crate::Error::CapacityExceeded
#[derive(Debug)]
pub struct RamFileProvider {
    parser: PrefixNameParser,
    max_size: Option<u64>,
}

impl RamFileProvider {
    /// Create a new `RamFileProvider` with no capacity limit.
    pub fn new() -> Self {
        Self::with_config(RamConfig::default())
    }

    /// Create a new `RamFileProvider` with the given configuration.
    pub fn with_config(config: RamConfig) -> Self {
        RamFileProvider {
            parser: PrefixNameParser::default(),
            max_size: config.max_size,
        }
    }

    /// Create a new `RamFileProvider` whose file systems each hold at most
    /// `max_size` bytes of content.
    pub fn with_capacity(max_size: u64) -> Self {
        Self::with_config(RamConfig {
            max_size: Some(max_size),
        })
    }
}

impl Default for RamFileProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FileProvider for RamFileProvider {
    fn name_parser(&self) -> &dyn NameParser {
        &self.parser
    }

    fn create_file_system(&self, _root: &FileName) -> Result<Box<dyn FileSystemBackend>> {
        Ok(Box::new(RamFileSystem::new(self.max_size)))
    }
}

/// A file in a `RamStore`.
#[derive(Debug)]
struct RamEntry {
    file_type: FileType,
    content: Vec<u8>,
    last_modified: SystemTime,
}

impl RamEntry {
    fn file() -> Self {
        RamEntry {
            file_type: FileType::File,
            content: Vec::new(),
            last_modified: SystemTime::now(),
        }
    }

    fn folder() -> Self {
        RamEntry {
            file_type: FileType::Folder,
            content: Vec::new(),
            last_modified: SystemTime::now(),
        }
    }
}

/// The files of one in-memory file system, keyed by path.
///
/// `used` is the total size of all file contents in bytes.
#[derive(Debug)]
struct RamStore {
    files: HashMap<String, RamEntry>,
    used: u64,
}

#[derive(Debug)]
struct RamFileSystem {
    store: Arc<RwLock<RamStore>>,
    max_size: Option<u64>,
}

impl RamFileSystem {
    fn new(max_size: Option<u64>) -> Self {
        let mut files = HashMap::new();
        files.insert(String::from("/"), RamEntry::folder());
        RamFileSystem {
            store: Arc::new(RwLock::new(RamStore { files, used: 0 })),
            max_size,
        }
    }
}

impl FileSystemBackend for RamFileSystem {
    fn capabilities(&self) -> Capability {
        Capability::READ_CONTENT
            | Capability::WRITE_CONTENT
            | Capability::APPEND_CONTENT
            | Capability::CREATE
            | Capability::DELETE
            | Capability::RENAME
            | Capability::GET_TYPE
            | Capability::LIST_CHILDREN
            | Capability::GET_LAST_MODIFIED
            | Capability::URI
    }

    fn create_file(&self, name: &FileName) -> Result<Box<dyn FileBackend>> {
        Ok(Box::new(RamFile {
            store: Arc::clone(&self.store),
            max_size: self.max_size,
            path: name.path().to_owned(),
        }))
    }
}

#[derive(Debug)]
struct RamFile {
    store: Arc<RwLock<RamStore>>,
    max_size: Option<u64>,
    path: String,
}

impl RamFile {
    fn missing(&self) -> Error {
        Error::msg(format!("the file `{}` does not exist", self.path))
    }
}

impl FileBackend for RamFile {
    fn file_type(&self) -> Result<FileType> {
        let store = self.store.read().unwrap();
        Ok(store
            .files
            .get(&self.path)
            .map_or(FileType::Imaginary, |entry| entry.file_type))
    }

    fn list_children(&self) -> Result<Vec<String>> {
        let store = self.store.read().unwrap();
        let prefix = if self.path == "/" {
            String::from("/")
        } else {
            format!("{}/", self.path)
        };
        let mut children = Vec::new();
        for path in store.files.keys() {
            match path.strip_prefix(&prefix) {
                Some(base) if !base.is_empty() && !base.contains('/') => {
                    children.push(parser::decode(base)?);
                }
                _ => continue,
            }
        }
        children.sort();
        Ok(children)
    }

    fn open_read(&self) -> Result<Box<dyn Read + Send>> {
        let store = self.store.read().unwrap();
        let entry = store.files.get(&self.path).ok_or_else(|| self.missing())?;
        Ok(Box::new(Cursor::new(entry.content.clone())))
    }

    fn open_write(&mut self, append: bool) -> Result<Box<dyn Write + Send>> {
        let buffer = if append {
            let store = self.store.read().unwrap();
            store
                .files
                .get(&self.path)
                .map(|entry| entry.content.clone())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(Box::new(RamWriter {
            store: Arc::clone(&self.store),
            max_size: self.max_size,
            path: self.path.clone(),
            buffer,
            failed: false,
        }))
    }

    fn content_size(&self) -> Result<u64> {
        let store = self.store.read().unwrap();
        let entry = store.files.get(&self.path).ok_or_else(|| self.missing())?;
        Ok(entry.content.len() as u64)
    }

    fn last_modified(&self) -> Result<SystemTime> {
        let store = self.store.read().unwrap();
        let entry = store.files.get(&self.path).ok_or_else(|| self.missing())?;
        Ok(entry.last_modified)
    }

    fn create_folder(&mut self) -> Result<()> {
        let mut store = self.store.write().unwrap();
        store.files.insert(self.path.clone(), RamEntry::folder());
        Ok(())
    }

    fn delete(&mut self) -> Result<()> {
        let mut store = self.store.write().unwrap();
        if let Some(entry) = store.files.remove(&self.path) {
            store.used -= entry.content.len() as u64;
        }
        Ok(())
    }

    fn rename_to(&mut self, new_name: &FileName) -> Result<()> {
        let mut store = self.store.write().unwrap();
        if let Some(parent) = new_name.parent() {
            let parent_is_folder = store
                .files
                .get(parent.path())
                .map_or(false, |entry| entry.file_type == FileType::Folder);
            if !parent_is_folder {
                return Err(Error::msg(format!(
                    "the folder `{}` does not exist",
                    parent.path()
                )));
            }
        }
        let old_prefix = format!("{}/", self.path);
        let new_prefix = format!("{}/", new_name.path());
        let moved = store
            .files
            .keys()
            .filter(|path| **path == self.path || path.starts_with(&old_prefix))
            .cloned()
            .collect::<Vec<_>>();
        if moved.is_empty() {
            return Err(self.missing());
        }
        for path in moved {
            if let Some(entry) = store.files.remove(&path) {
                let new_path = if path == self.path {
                    new_name.path().to_owned()
                } else {
                    format!("{}{}", new_prefix, &path[old_prefix.len()..])
                };
                store.files.insert(new_path, entry);
            }
        }
        Ok(())
    }
}

fn capacity_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, CapacityError)
}

/// A writer for a file in a `RamFileSystem`.
///
/// Writes accumulate in a buffer; the buffer becomes the file's contents when
/// the writer is flushed. A writer which has rejected a write for capacity
/// also refuses to flush, leaving the file's previous contents in place.
#[derive(Debug)]
struct RamWriter {
    store: Arc<RwLock<RamStore>>,
    max_size: Option<u64>,
    path: String,
    buffer: Vec<u8>,
    failed: bool,
}

impl RamWriter {
    /// Return an error if the store cannot grow to hold `incoming` more bytes.
    fn check_capacity(&self, store: &RamStore, incoming: u64) -> io::Result<()> {
        let max_size = match self.max_size {
            Some(max_size) => max_size,
            None => return Ok(()),
        };
        let committed = store
            .files
            .get(&self.path)
            .map_or(0, |entry| entry.content.len() as u64);
        let new_used = store.used - committed + self.buffer.len() as u64 + incoming;
        if new_used > max_size {
            return Err(capacity_error());
        }
        Ok(())
    }
}

impl Write for RamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failed {
            return Err(capacity_error());
        }
        {
            let store = self.store.read().unwrap();
            if let Err(err) = self.check_capacity(&store, buf.len() as u64) {
                self.failed = true;
                return Err(err);
            }
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.failed {
            return Err(capacity_error());
        }
        let mut store = self.store.write().unwrap();
        self.check_capacity(&store, 0)?;
        let committed = store
            .files
            .get(&self.path)
            .map_or(0, |entry| entry.content.len() as u64);
        store.used = store.used - committed + self.buffer.len() as u64;
        let entry = store
            .files
            .entry(self.path.clone())
            .or_insert_with(RamEntry::file);
        entry.content = self.buffer.clone();
        entry.last_modified = SystemTime::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::{FileBackend, FileProvider, FileSystemBackend, RamFileProvider};
    use crate::error::CapacityError;
    use crate::name::{FileName, FileType};

    fn name(path: &str, file_type: FileType) -> FileName {
        FileName::with_prefix("ram", "", path, file_type)
    }

    fn backend_for(
        fs: &dyn FileSystemBackend,
        path: &str,
        file_type: FileType,
    ) -> Box<dyn FileBackend> {
        fs.create_file(&name(path, file_type)).unwrap()
    }

    #[test]
    fn contents_appear_when_the_writer_is_flushed() {
        let provider = RamFileProvider::new();
        let fs = provider
            .create_file_system(&name("/", FileType::Folder))
            .unwrap();
        let mut file = backend_for(fs.as_ref(), "/file", FileType::File);

        let mut writer = file.open_write(false).unwrap();
        writer.write_all(b"spam").unwrap();
        assert_eq!(file.file_type().unwrap(), FileType::Imaginary);

        writer.flush().unwrap();
        assert_eq!(file.file_type().unwrap(), FileType::File);
        assert_eq!(file.content_size().unwrap(), 4);

        let mut contents = Vec::new();
        file.open_read().unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"spam");
    }

    #[test]
    fn appending_extends_the_contents() {
        let provider = RamFileProvider::new();
        let fs = provider
            .create_file_system(&name("/", FileType::Folder))
            .unwrap();
        let mut file = backend_for(fs.as_ref(), "/file", FileType::File);

        let mut writer = file.open_write(false).unwrap();
        writer.write_all(b"spam").unwrap();
        writer.flush().unwrap();

        let mut writer = file.open_write(true).unwrap();
        writer.write_all(b" eggs").unwrap();
        writer.flush().unwrap();

        let mut contents = Vec::new();
        file.open_read().unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"spam eggs");
    }

    #[test]
    fn writes_past_the_capacity_are_rejected() {
        let provider = RamFileProvider::with_capacity(8);
        let fs = provider
            .create_file_system(&name("/", FileType::Folder))
            .unwrap();
        let mut file = backend_for(fs.as_ref(), "/file", FileType::File);

        let mut writer = file.open_write(false).unwrap();
        writer.write_all(b"12345678").unwrap();
        writer.flush().unwrap();

        let mut other = backend_for(fs.as_ref(), "/other", FileType::File);
        let mut writer = other.open_write(false).unwrap();
        let error = writer.write(b"9").unwrap_err();
        assert!(error.get_ref().unwrap().is::<CapacityError>());
    }

    #[test]
    fn a_failed_write_leaves_the_previous_contents() {
        let provider = RamFileProvider::with_capacity(8);
        let fs = provider
            .create_file_system(&name("/", FileType::Folder))
            .unwrap();
        let mut file = backend_for(fs.as_ref(), "/file", FileType::File);

        let mut writer = file.open_write(false).unwrap();
        writer.write_all(b"12345678").unwrap();
        writer.flush().unwrap();

        let mut writer = file.open_write(false).unwrap();
        let error = writer.write(b"123456789").unwrap_err();
        assert!(error.get_ref().unwrap().is::<CapacityError>());
        assert!(writer.flush().is_err());

        let mut contents = Vec::new();
        file.open_read().unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"12345678");
    }

    #[test]
    fn rewriting_a_file_reclaims_its_capacity() {
        let provider = RamFileProvider::with_capacity(8);
        let fs = provider
            .create_file_system(&name("/", FileType::Folder))
            .unwrap();
        let mut file = backend_for(fs.as_ref(), "/file", FileType::File);

        let mut writer = file.open_write(false).unwrap();
        writer.write_all(b"12345678").unwrap();
        writer.flush().unwrap();

        let mut writer = file.open_write(false).unwrap();
        writer.write_all(b"87654321").unwrap();
        writer.flush().unwrap();

        assert_eq!(file.content_size().unwrap(), 8);
    }

    #[test]
    fn deleting_reclaims_capacity() {
        let provider = RamFileProvider::with_capacity(8);
        let fs = provider
            .create_file_system(&name("/", FileType::Folder))
            .unwrap();
        let mut file = backend_for(fs.as_ref(), "/file", FileType::File);

        let mut writer = file.open_write(false).unwrap();
        writer.write_all(b"12345678").unwrap();
        writer.flush().unwrap();
        file.delete().unwrap();

        let mut other = backend_for(fs.as_ref(), "/other", FileType::File);
        let mut writer = other.open_write(false).unwrap();
        writer.write_all(b"12345678").unwrap();
        writer.flush().unwrap();
    }

    #[test]
    fn children_are_the_names_directly_below_a_folder() {
        let provider = RamFileProvider::new();
        let fs = provider
            .create_file_system(&name("/", FileType::Folder))
            .unwrap();

        backend_for(fs.as_ref(), "/dir", FileType::Folder)
            .create_folder()
            .unwrap();
        backend_for(fs.as_ref(), "/dir/nested", FileType::Folder)
            .create_folder()
            .unwrap();
        let mut file = backend_for(fs.as_ref(), "/dir/file", FileType::File);
        file.open_write(false).unwrap().flush().unwrap();

        let root = backend_for(fs.as_ref(), "/", FileType::Folder);
        assert_eq!(root.list_children().unwrap(), vec!["dir"]);

        let dir = backend_for(fs.as_ref(), "/dir", FileType::Folder);
        assert_eq!(dir.list_children().unwrap(), vec!["file", "nested"]);
    }

    #[test]
    fn escaped_names_list_as_plain_names() {
        let provider = RamFileProvider::new();
        let fs = provider
            .create_file_system(&name("/", FileType::Folder))
            .unwrap();

        let mut file = backend_for(fs.as_ref(), "/a%25b", FileType::File);
        file.open_write(false).unwrap().flush().unwrap();

        let root = backend_for(fs.as_ref(), "/", FileType::Folder);
        assert_eq!(root.list_children().unwrap(), vec!["a%b"]);
    }

    #[test]
    fn renaming_moves_a_folder_and_its_descendants() {
        let provider = RamFileProvider::new();
        let fs = provider
            .create_file_system(&name("/", FileType::Folder))
            .unwrap();

        backend_for(fs.as_ref(), "/old", FileType::Folder)
            .create_folder()
            .unwrap();
        let mut file = backend_for(fs.as_ref(), "/old/file", FileType::File);
        let mut writer = file.open_write(false).unwrap();
        writer.write_all(b"spam").unwrap();
        writer.flush().unwrap();

        let mut old = backend_for(fs.as_ref(), "/old", FileType::Folder);
        old.rename_to(&name("/new", FileType::Folder)).unwrap();

        assert_eq!(old.file_type().unwrap(), FileType::Imaginary);
        let new = backend_for(fs.as_ref(), "/new", FileType::Folder);
        assert_eq!(new.file_type().unwrap(), FileType::Folder);
        let moved = backend_for(fs.as_ref(), "/new/file", FileType::File);
        assert_eq!(moved.content_size().unwrap(), 4);
    }

    #[test]
    fn each_file_system_is_a_separate_store() {
        let provider = RamFileProvider::new();
        let first = provider
            .create_file_system(&name("/", FileType::Folder))
            .unwrap();
        let second = provider
            .create_file_system(&name("/", FileType::Folder))
            .unwrap();

        let mut file = backend_for(first.as_ref(), "/file", FileType::File);
        file.open_write(false).unwrap().flush().unwrap();

        let other = backend_for(second.as_ref(), "/file", FileType::File);
        assert_eq!(other.file_type().unwrap(), FileType::Imaginary);
    }
}
