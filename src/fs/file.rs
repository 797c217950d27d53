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
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;

use super::content::{io_to_error, FileContent};
use super::filesystem::{Capability, FileSystem};
use super::selector::{traverse, FileSelector, Selectors};
use crate::error::{Error, ErrorCode, Result};
use crate::name::{parser, FileName, FileType, NameScope};
use crate::provider::FileBackend;

/// A file within a file system.
///
/// A `FileObject` is a stateful handle to one name in a file system. The
/// file it names need not exist; its type is [`FileType::Imaginary`] until
/// it is created. Handles are shared through the context's cache, so two
/// resolutions of the same name normally return the same instance.
///
/// The handle attaches to its backend lazily, on the first operation that
/// needs it, and caches the file's type and children until it is detached
/// with [`refresh`]. All state transitions are serialized internally; a
/// `FileObject` can be used from several threads at once.
///
/// [`refresh`]: FileObject::refresh
pub struct FileObject {
    name: FileName,
    fs: Arc<FileSystem>,
    this: Weak<FileObject>,
    content_open: AtomicUsize,
    state: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    backend: Box<dyn FileBackend>,
    attached: bool,
    file_type: Option<FileType>,
    children: Option<Vec<FileName>>,
}

impl FileObject {
    pub(crate) fn from_parts(
        name: FileName,
        fs: Arc<FileSystem>,
        backend: Box<dyn FileBackend>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| FileObject {
            name,
            fs,
            this: this.clone(),
            content_open: AtomicUsize::new(0),
            state: Mutex::new(FileState {
                backend,
                attached: false,
                file_type: None,
                children: None,
            }),
        })
    }

    /// Return the name of this file.
    pub fn name(&self) -> &FileName {
        &self.name
    }

    /// Return the file system this file belongs to.
    pub fn file_system(&self) -> &Arc<FileSystem> {
        &self.fs
    }

    pub(crate) fn promote(&self) -> Result<Arc<FileObject>> {
        self.this.upgrade().ok_or(Error::Closed)
    }

    /// Return whether this file is attached to its backend.
    pub fn is_attached(&self) -> bool {
        self.state.lock().unwrap().attached
    }

    /// Return whether any content streams are open on this file.
    pub fn is_content_open(&self) -> bool {
        self.content_open.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn stream_opened(&self) {
        self.content_open.fetch_add(1, Ordering::SeqCst);
        self.fs.stream_opened();
    }

    pub(crate) fn stream_closed(&self) {
        self.content_open.fetch_sub(1, Ordering::SeqCst);
        self.fs.stream_closed();
    }

    /// Attach the backend, if it is not attached already.
    fn attach(&self, state: &mut FileState) -> Result<()> {
        if state.attached {
            return Ok(());
        }
        state
            .backend
            .attach()
            .map_err(|err| Error::backend(ErrorCode::Attach, self.name.friendly_uri(), err))?;
        state.attached = true;
        Ok(())
    }

    fn detach(&self, state: &mut FileState) {
        if state.attached {
            state.backend.detach();
            state.attached = false;
        }
        state.file_type = None;
        state.children = None;
    }

    /// Discard this file's cached state and detach it from its backend.
    ///
    /// The next operation attaches the file again and sees fresh state.
    pub fn refresh(&self) {
        let mut state = self.state.lock().unwrap();
        self.detach(&mut state);
    }

    /// Return the cached type, querying the backend on the first call.
    fn resolved_type(&self, state: &mut FileState) -> Result<FileType> {
        self.attach(state)?;
        if let Some(file_type) = state.file_type {
            return Ok(file_type);
        }
        let file_type = state
            .backend
            .file_type()
            .map_err(|err| Error::backend(ErrorCode::GetType, self.name.friendly_uri(), err))?;
        state.file_type = Some(file_type);
        Ok(file_type)
    }

    /// Return the type of this file.
    ///
    /// A file which does not exist has the type [`FileType::Imaginary`].
    pub fn file_type(&self) -> Result<FileType> {
        let mut state = self.state.lock().unwrap();
        self.resolved_type(&mut state)
    }

    /// Return whether this file exists.
    pub fn exists(&self) -> Result<bool> {
        Ok(self.file_type()? != FileType::Imaginary)
    }

    /// Return whether this file exists and is a regular file.
    pub fn is_file(&self) -> Result<bool> {
        Ok(self.file_type()? == FileType::File)
    }

    /// Return whether this file exists and is a folder.
    pub fn is_folder(&self) -> Result<bool> {
        Ok(self.file_type()? == FileType::Folder)
    }

    /// Return the children of this folder.
    ///
    /// # Errors
    /// - `Error::FileSystem` with `ErrorCode::NotAFolder`: This file is not
    ///   a folder.
    /// - `Error::FileSystem` with `ErrorCode::ListChildren`: The children
    ///   could not be listed.
    pub fn children(&self) -> Result<Vec<Arc<FileObject>>> {
        self.child_names()?
            .iter()
            .map(|name| self.fs.resolve(name))
            .collect()
    }

    fn child_names(&self) -> Result<Vec<FileName>> {
        let mut state = self.state.lock().unwrap();
        if !self.resolved_type(&mut state)?.has_children() {
            return Err(Error::fs(ErrorCode::NotAFolder, self.name.friendly_uri()));
        }
        if let Some(children) = &state.children {
            return Ok(children.clone());
        }
        self.fs
            .require(Capability::LIST_CHILDREN, ErrorCode::ListChildren, &self.name)?;
        let base_names = state
            .backend
            .list_children()
            .map_err(|err| Error::backend(ErrorCode::ListChildren, self.name.friendly_uri(), err))?;
        let mut children = Vec::with_capacity(base_names.len());
        for base_name in &base_names {
            let encoded = parser::encode(base_name, &[]);
            children.push(
                self.fs
                    .resolve_name(&self.name, &encoded, NameScope::Child)?,
            );
        }
        state.children = Some(children.clone());
        Ok(children)
    }

    /// Return the direct child of this folder with the given base name.
    ///
    /// `name` is a plain file name, not encoded for use in a URI. The child
    /// need not exist.
    ///
    /// # Errors
    /// - `Error::OutOfScope`: `name` is empty or contains a separator.
    pub fn child(&self, name: &str) -> Result<Arc<FileObject>> {
        let encoded = parser::encode(name, &[]);
        let child_name = self
            .fs
            .resolve_name(&self.name, &encoded, NameScope::Child)?;
        self.fs.resolve(&child_name)
    }

    /// Return the parent folder of this file, or `None` if this is the root
    /// of its file system.
    pub fn parent(&self) -> Result<Option<Arc<FileObject>>> {
        match self.name.parent() {
            Some(parent_name) => Ok(Some(self.fs.resolve(&parent_name)?)),
            None => Ok(None),
        }
    }

    /// Return the content of this file.
    pub fn content(&self) -> FileContent<'_> {
        FileContent::new(self)
    }

    /// Create this file as a folder, creating any missing ancestors.
    ///
    /// Does nothing if the folder already exists.
    ///
    /// # Errors
    /// - `Error::FileSystem` with `ErrorCode::CreateFolderMismatched`: The
    ///   file or one of its ancestors exists and is not a folder.
    /// - `Error::FileSystem` with `ErrorCode::ReadOnly`: The file system
    ///   does not support creating files.
    pub fn create_folder(&self) -> Result<()> {
        match self.file_type()? {
            FileType::Folder => return Ok(()),
            FileType::File => {
                return Err(Error::fs(
                    ErrorCode::CreateFolderMismatched,
                    self.name.friendly_uri(),
                ))
            }
            FileType::Imaginary => {}
        }
        self.fs
            .require(Capability::CREATE, ErrorCode::ReadOnly, &self.name)?;
        if let Some(parent) = self.parent()? {
            parent.create_folder()?;
        }
        {
            let mut state = self.state.lock().unwrap();
            self.attach(&mut state)?;
            state.backend.create_folder().map_err(|err| {
                Error::backend(ErrorCode::CreateFolder, self.name.friendly_uri(), err)
            })?;
        }
        self.handle_create(FileType::Folder);
        Ok(())
    }

    /// Create this file as an empty regular file, creating any missing
    /// ancestor folders.
    ///
    /// Does nothing if the file already exists.
    ///
    /// # Errors
    /// - `Error::FileSystem` with `ErrorCode::CreateFileMismatched`: The
    ///   file exists and is not a regular file.
    /// - `Error::FileSystem` with `ErrorCode::ReadOnly`: The file system
    ///   does not support creating files.
    pub fn create_file(&self) -> Result<()> {
        match self.file_type()? {
            FileType::File => return Ok(()),
            FileType::Folder => {
                return Err(Error::fs(
                    ErrorCode::CreateFileMismatched,
                    self.name.friendly_uri(),
                ))
            }
            FileType::Imaginary => {}
        }
        self.fs
            .require(Capability::CREATE, ErrorCode::ReadOnly, &self.name)?;
        self.content().open_write()?.close()
    }

    /// Delete this file if it exists and, when it is a folder, has no
    /// children.
    ///
    /// Returns whether the file was deleted. A file which does not exist
    /// and a folder with children are left alone.
    pub fn delete(&self) -> Result<bool> {
        match self.file_type()? {
            FileType::Imaginary => return Ok(false),
            FileType::Folder => {
                if !self.child_names()?.is_empty() {
                    return Ok(false);
                }
            }
            FileType::File => {}
        }
        self.delete_self()?;
        Ok(true)
    }

    fn delete_self(&self) -> Result<()> {
        self.fs
            .require(Capability::DELETE, ErrorCode::ReadOnly, &self.name)?;
        {
            let mut state = self.state.lock().unwrap();
            self.attach(&mut state)?;
            state
                .backend
                .delete()
                .map_err(|err| Error::backend(ErrorCode::Delete, self.name.friendly_uri(), err))?;
        }
        self.handle_delete();
        Ok(())
    }

    /// Delete the files under this file which match `selector`, children
    /// before parents.
    ///
    /// Returns the number of files deleted. Deleting is not transactional;
    /// the first error stops the walk and files already deleted stay
    /// deleted.
    ///
    /// # Errors
    /// - `Error::FileSystem` with `ErrorCode::DeleteNotEmpty`: A selected
    ///   folder still has children the selector did not match.
    pub fn delete_matching(&self, selector: &dyn FileSelector) -> Result<usize> {
        let files = self.find_files(selector, true)?;
        let mut deleted = 0;
        for file in files {
            match file.file_type()? {
                FileType::Imaginary => continue,
                FileType::Folder => {
                    if !file.child_names()?.is_empty() {
                        return Err(Error::fs(
                            ErrorCode::DeleteNotEmpty,
                            file.name.friendly_uri(),
                        ));
                    }
                }
                FileType::File => {}
            }
            file.delete_self()?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Delete this file and all of its descendants.
    ///
    /// Returns the number of files deleted.
    pub fn delete_all(&self) -> Result<usize> {
        self.delete_matching(&Selectors::All)
    }

    /// Return the files at or under this file which match `selector`.
    ///
    /// When `depthwise` is true children appear in the result before their
    /// parents; otherwise parents appear first.
    pub fn find_files(
        &self,
        selector: &dyn FileSelector,
        depthwise: bool,
    ) -> Result<Vec<Arc<FileObject>>> {
        let root = self.promote()?;
        let mut selected = Vec::new();
        traverse(&root, &root.name, 0, selector, depthwise, &mut selected)?;
        Ok(selected)
    }

    /// Copy the files matching `selector` under `src` to the corresponding
    /// names under this file.
    ///
    /// Files are copied parents-first. A destination which exists with a
    /// different type than its source is deleted and recreated. Copying is
    /// not transactional; the first error stops the copy.
    ///
    /// # Errors
    /// - `Error::FileSystem` with `ErrorCode::CopyMissingSource`: `src`
    ///   does not exist.
    pub fn copy_from(&self, src: &FileObject, selector: &dyn FileSelector) -> Result<()> {
        if !src.exists()? {
            return Err(Error::fs(
                ErrorCode::CopyMissingSource,
                src.name.friendly_uri(),
            ));
        }
        self.fs
            .require(Capability::WRITE_CONTENT, ErrorCode::ReadOnly, &self.name)?;
        for file in src.find_files(selector, false)? {
            let relative = src.name.relative_name(&file.name);
            let dest_name = self
                .fs
                .resolve_name(&self.name, &relative, NameScope::FileSystem)?;
            let dest = self.fs.resolve(&dest_name)?;
            let src_type = file.file_type()?;
            if dest.exists()? && dest.file_type()? != src_type {
                dest.delete_all()?;
            }
            match src_type {
                FileType::Folder => dest.create_folder()?,
                FileType::File => {
                    let mut reader = file.content().open_read()?;
                    let mut writer = dest.content().open_write()?;
                    io::copy(&mut reader, &mut writer)
                        .map_err(|err| io_to_error(err, ErrorCode::CopyFile, &dest.name))?;
                    writer.close()?;
                }
                FileType::Imaginary => {}
            }
        }
        Ok(())
    }

    /// Move this file to `dest`.
    ///
    /// When both files are in the same file system and it supports renames,
    /// the backend renames in place; otherwise the file is copied to `dest`
    /// and then deleted. A `dest` which already exists is deleted first.
    ///
    /// # Errors
    /// - `Error::FileSystem` with `ErrorCode::CopyMissingSource`: This file
    ///   does not exist.
    pub fn move_to(&self, dest: &FileObject) -> Result<()> {
        let file_type = self.file_type()?;
        if file_type == FileType::Imaginary {
            return Err(Error::fs(
                ErrorCode::CopyMissingSource,
                self.name.friendly_uri(),
            ));
        }
        if dest.exists()? {
            dest.delete_all()?;
        }
        if self.can_rename_to(dest) {
            {
                let mut state = self.state.lock().unwrap();
                self.attach(&mut state)?;
                state.backend.rename_to(&dest.name).map_err(|err| {
                    Error::backend(ErrorCode::Rename, self.name.friendly_uri(), err)
                })?;
            }
            self.handle_delete();
            dest.handle_create(file_type);
        } else {
            dest.copy_from(self, &Selectors::All)?;
            self.delete_all()?;
        }
        Ok(())
    }

    fn can_rename_to(&self, dest: &FileObject) -> bool {
        self.fs.id() == dest.fs.id() && self.fs.has_capability(Capability::RENAME)
    }

    pub(crate) fn content_size(&self) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if self.resolved_type(&mut state)? != FileType::File {
            return Err(Error::fs(ErrorCode::ContentSize, self.name.friendly_uri()));
        }
        state
            .backend
            .content_size()
            .map_err(|err| Error::backend(ErrorCode::ContentSize, self.name.friendly_uri(), err))
    }

    pub(crate) fn last_modified_time(&self) -> Result<SystemTime> {
        self.fs.require(
            Capability::GET_LAST_MODIFIED,
            ErrorCode::LastModified,
            &self.name,
        )?;
        let mut state = self.state.lock().unwrap();
        if self.resolved_type(&mut state)? == FileType::Imaginary {
            return Err(Error::fs(ErrorCode::LastModified, self.name.friendly_uri()));
        }
        state
            .backend
            .last_modified()
            .map_err(|err| Error::backend(ErrorCode::LastModified, self.name.friendly_uri(), err))
    }

    pub(crate) fn open_read_stream(&self) -> Result<Box<dyn Read + Send>> {
        self.fs
            .require(Capability::READ_CONTENT, ErrorCode::ReadContent, &self.name)?;
        let mut state = self.state.lock().unwrap();
        match self.resolved_type(&mut state)? {
            FileType::File => {}
            FileType::Folder => {
                return Err(Error::fs(ErrorCode::ReadNotFile, self.name.friendly_uri()))
            }
            FileType::Imaginary => {
                return Err(Error::fs(ErrorCode::ReadContent, self.name.friendly_uri()))
            }
        }
        state
            .backend
            .open_read()
            .map_err(|err| Error::backend(ErrorCode::ReadContent, self.name.friendly_uri(), err))
    }

    pub(crate) fn open_write_stream(&self, append: bool) -> Result<Box<dyn Write + Send>> {
        if append {
            self.fs.require(
                Capability::APPEND_CONTENT,
                ErrorCode::AppendNotSupported,
                &self.name,
            )?;
        } else {
            self.fs
                .require(Capability::WRITE_CONTENT, ErrorCode::ReadOnly, &self.name)?;
        }
        match self.file_type()? {
            FileType::Folder => {
                return Err(Error::fs(ErrorCode::WriteNotFile, self.name.friendly_uri()))
            }
            FileType::Imaginary => {
                // The file springs into existence when the writer commits,
                // but its ancestors have to be real folders first.
                if let Some(parent) = self.parent()? {
                    parent.create_folder()?;
                }
            }
            FileType::File => {}
        }
        let mut state = self.state.lock().unwrap();
        self.attach(&mut state)?;
        state
            .backend
            .open_write(append)
            .map_err(|err| Error::backend(ErrorCode::WriteContent, self.name.friendly_uri(), err))
    }

    /// Record that this file now exists with `file_type`, tell a cached
    /// parent that its children changed, and notify listeners.
    pub(crate) fn handle_create(&self, file_type: FileType) {
        {
            let mut state = self.state.lock().unwrap();
            if state.attached {
                state.file_type = Some(file_type);
                state.children = None;
            }
        }
        self.notify_parent();
        self.fs.fire_created(&self.name);
    }

    /// Record that this file no longer exists and notify listeners.
    ///
    /// The handle stays cached with the type `Imaginary` so that a later
    /// create through the same handle sees consistent state.
    pub(crate) fn handle_delete(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.attached {
                state.file_type = Some(FileType::Imaginary);
                state.children = None;
            }
        }
        self.notify_parent();
        self.fs.fire_deleted(&self.name);
    }

    pub(crate) fn handle_changed(&self) {
        self.fs.fire_changed(&self.name);
    }

    /// Called when a content writer commits.
    pub(crate) fn handle_written(&self) -> Result<()> {
        if self.file_type()? == FileType::Imaginary {
            self.handle_create(FileType::File);
        } else {
            self.handle_changed();
        }
        Ok(())
    }

    fn notify_parent(&self) {
        if let Some(parent_name) = self.name.parent() {
            if let Some(parent) = self.fs.cached_file(&parent_name) {
                parent.children_changed();
            }
        }
    }

    pub(crate) fn children_changed(&self) {
        let mut state = self.state.lock().unwrap();
        state.children = None;
    }
}

impl fmt::Debug for FileObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileObject")
            .field("name", &self.name)
            .field("fs", &self.fs.id())
            .finish_non_exhaustive()
    }
}

impl Drop for FileObject {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            if state.attached {
                state.backend.detach();
                state.attached = false;
            }
        }
    }
}
