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
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bitflags::bitflags;
use tracing::debug;

use super::file::FileObject;
use crate::cache::FilesCache;
use crate::error::{mask_credentials, Error, ErrorCode, Result};
use crate::name::{check_scope, parser, FileName, FileType, NameParser, NameScope};
use crate::provider::{FileProvider, FileSystemBackend};

uuid_type! {
    /// Uniquely identifies a file system within a context.
    FileSystemId
}

bitflags! {
    /// The set of operations a file system supports.
    ///
    /// Every file system advertises its capabilities once, at construction.
    /// Operations outside the set fail without reaching the backend.
    pub struct Capability: u32 {
        /// File contents can be read.
        const READ_CONTENT = 1 << 0;

        /// File contents can be written.
        const WRITE_CONTENT = 1 << 1;

        /// File contents can be appended to.
        const APPEND_CONTENT = 1 << 2;

        /// Files and folders can be created.
        const CREATE = 1 << 3;

        /// Files and folders can be deleted.
        const DELETE = 1 << 4;

        /// Files can be renamed within the file system.
        const RENAME = 1 << 5;

        /// The type of a file can be determined.
        const GET_TYPE = 1 << 6;

        /// The children of a folder can be listed.
        const LIST_CHILDREN = 1 << 7;

        /// The last-modified time of a file can be read.
        const GET_LAST_MODIFIED = 1 << 8;

        /// Files are addressable by URI.
        const URI = 1 << 9;
    }
}

/// A listener for changes to the files of a file system.
///
/// Listeners are registered for a single file name with
/// [`FileSystem::add_listener`] and are called after the change has been
/// applied.
pub trait FileListener: Send + Sync {
    /// Called after the file named `name` is created.
    fn file_created(&self, name: &FileName);

    /// Called after the file named `name` is deleted.
    fn file_deleted(&self, name: &FileName);

    /// Called after the contents of the file named `name` change.
    fn file_changed(&self, name: &FileName);
}

/// A single file system within a [`VfsContext`].
///
/// A file system is created the first time a name under a new root is
/// resolved, and is shared by every file under that root. It looks files up
/// through the context's cache so that resolving the same name twice returns
/// the same [`FileObject`] while the cache holds it.
///
/// [`VfsContext`]: crate::VfsContext
pub struct FileSystem {
    id: FileSystemId,
    this: Weak<FileSystem>,
    root_name: FileName,
    provider: Arc<dyn FileProvider>,
    backend: Box<dyn FileSystemBackend>,
    capabilities: Capability,
    cache: Arc<dyn FilesCache>,
    listeners: Mutex<HashMap<FileName, Vec<Arc<dyn FileListener>>>>,
    open_streams: AtomicUsize,
    closed: AtomicBool,
}

impl FileSystem {
    pub(crate) fn new(
        root_name: FileName,
        provider: Arc<dyn FileProvider>,
        backend: Box<dyn FileSystemBackend>,
        cache: Arc<dyn FilesCache>,
    ) -> Arc<Self> {
        let capabilities = backend.capabilities();
        Arc::new_cyclic(|this| FileSystem {
            id: FileSystemId::random(),
            this: this.clone(),
            root_name,
            provider,
            backend,
            capabilities,
            cache,
            listeners: Mutex::new(HashMap::new()),
            open_streams: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Return the unique ID of this file system.
    pub fn id(&self) -> FileSystemId {
        self.id
    }

    /// Return the name of the root folder of this file system.
    pub fn root_name(&self) -> &FileName {
        &self.root_name
    }

    /// Return the operations this file system supports.
    pub fn capabilities(&self) -> Capability {
        self.capabilities
    }

    /// Return whether this file system supports all of `capability`.
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Return an error with `code` unless the file system supports
    /// `capability`.
    pub(crate) fn require(
        &self,
        capability: Capability,
        code: ErrorCode,
        name: &FileName,
    ) -> Result<()> {
        if self.capabilities.contains(capability) {
            Ok(())
        } else {
            Err(Error::fs(code, name.friendly_uri()))
        }
    }

    /// Return the root folder of this file system.
    ///
    /// # Errors
    /// - `Error::Closed`: This file system has been closed.
    pub fn root(&self) -> Result<Arc<FileObject>> {
        self.resolve(&self.root_name)
    }

    /// Return the file with the given `name`.
    ///
    /// If the file is cached, the cached instance is returned; otherwise a
    /// new file is constructed from the backend and offered to the cache.
    /// The file need not exist.
    ///
    /// # Errors
    /// - `Error::Closed`: This file system has been closed.
    /// - `Error::MismatchedFileSystem`: `name` belongs to a different file
    ///   system.
    /// - `Error::FileSystem`: The backend could not construct the file.
    pub fn resolve(&self, name: &FileName) -> Result<Arc<FileObject>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        if name.root_uri() != self.root_name.root_uri() {
            return Err(Error::MismatchedFileSystem(name.friendly_uri()));
        }
        let fs = self.this.upgrade().ok_or(Error::Closed)?;

        // Offer a new file to the cache and retry on a racing clear, so that
        // exactly one instance per name wins.
        loop {
            if let Some(file) = self.cache.get_file(self.id, name) {
                self.cache.touch_file(&file);
                return Ok(file);
            }
            let backend = self
                .backend
                .create_file(name)
                .map_err(|err| Error::backend(ErrorCode::ResolveFile, name.friendly_uri(), err))?;
            let file = FileObject::from_parts(name.clone(), Arc::clone(&fs), backend);
            if self.cache.put_file_if_absent(&file) {
                return Ok(file);
            }
        }
    }

    /// Resolve `path` against `base` and return the resulting name.
    ///
    /// `path` may be absolute within the file system or relative to `base`,
    /// and may contain `.` and `..` segments. The resolved name must fall
    /// within `scope` of `base`.
    ///
    /// # Errors
    /// - `Error::InvalidRelativePath`: `path` climbs past the root.
    /// - `Error::OutOfScope`: The resolved name is not within `scope` of
    ///   `base`.
    /// - `Error::MalformedUri`: `path` contains an invalid escape sequence.
    pub fn resolve_name(&self, base: &FileName, path: &str, scope: NameScope) -> Result<FileName> {
        resolve_name_with(self.provider.name_parser(), base, path, scope)
    }

    /// Return the cached file with the given `name`, without constructing
    /// one on a miss.
    pub(crate) fn cached_file(&self, name: &FileName) -> Option<Arc<FileObject>> {
        self.cache.get_file(self.id, name)
    }

    /// Register `listener` for changes to the file named `name`.
    pub fn add_listener(&self, name: &FileName, listener: Arc<dyn FileListener>) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.entry(name.clone()).or_default().push(listener);
    }

    /// Remove a previously registered `listener` for the file named `name`.
    ///
    /// Listeners are compared by identity; removing a listener that was
    /// never added does nothing.
    pub fn remove_listener(&self, name: &FileName, listener: &Arc<dyn FileListener>) {
        let mut listeners = self.listeners.lock().unwrap();
        if let Some(registered) = listeners.get_mut(name) {
            registered.retain(|other| !Arc::ptr_eq(other, listener));
            if registered.is_empty() {
                listeners.remove(name);
            }
        }
    }

    /// Return the listeners registered for `name`.
    ///
    /// The registry lock is released before this returns so that listeners
    /// are never called while it is held.
    fn listeners_for(&self, name: &FileName) -> Vec<Arc<dyn FileListener>> {
        let listeners = self.listeners.lock().unwrap();
        listeners.get(name).cloned().unwrap_or_default()
    }

    pub(crate) fn fire_created(&self, name: &FileName) {
        for listener in self.listeners_for(name) {
            listener.file_created(name);
        }
    }

    pub(crate) fn fire_deleted(&self, name: &FileName) {
        for listener in self.listeners_for(name) {
            listener.file_deleted(name);
        }
    }

    pub(crate) fn fire_changed(&self, name: &FileName) {
        for listener in self.listeners_for(name) {
            listener.file_changed(name);
        }
    }

    pub(crate) fn stream_opened(&self) {
        self.open_streams.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn stream_closed(&self) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }

    /// Return the number of content streams currently open on this file
    /// system.
    pub fn open_stream_count(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Return whether this file system can be discarded.
    ///
    /// A file system with open content streams is still in use and must not
    /// be closed out from under them.
    pub fn is_releaseable(&self) -> bool {
        self.open_stream_count() == 0
    }

    /// Close this file system, releasing its cached files and its backend.
    ///
    /// Closing is idempotent. Resolving through a closed file system fails
    /// with `Error::Closed`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(
            target: "omnivfs::fs",
            root = %self.root_name,
            "closing file system",
        );
        self.cache.clear(self.id);
        self.backend.close();
    }
}

impl fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystem")
            .field("id", &self.id)
            .field("root_name", &self.root_name)
            .field("capabilities", &self.capabilities)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolve `path` against `base` using `parser`, checking `scope`.
///
/// This is the path arithmetic behind [`FileSystem::resolve_name`], split out
/// so a context can run it with the parser of whichever provider owns `base`.
pub(crate) fn resolve_name_with(
    parser: &dyn NameParser,
    base: &FileName,
    path: &str,
    scope: NameScope,
) -> Result<FileName> {
    let mut buffer = path.to_owned();
    parser::fix_separators(&mut buffer);
    if buffer.is_empty() || !buffer.starts_with('/') {
        buffer.insert(0, '/');
        buffer.insert_str(0, base.path());
    }
    let file_type = parser::normalize_path(&mut buffer)?;
    if !check_scope(base.path(), &buffer, scope) {
        return Err(Error::OutOfScope {
            name: mask_credentials(path),
            scope,
        });
    }

    // Parse the name fresh from the root URI so escapes decode and the
    // trailing separator selects the file type.
    let trailing = if file_type == FileType::Folder { "/" } else { "" };
    let full = format!("{}{}{}", base.root_uri(), &buffer[1..], trailing);
    parser.parse_uri(&full)
}
