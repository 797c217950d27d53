use std::fmt;
use std::io::{Read, Write};
use std::time::SystemTime;

use static_assertions::assert_obj_safe;

use super::error::Result;
use crate::fs::Capability;
use crate::name::{FileName, FileType, NameParser};

/// A factory for the file systems of one URI scheme.
///
/// A provider is registered with a [`VfsContext`] under a scheme. It supplies
/// the parser for that scheme's names and constructs a [`FileSystemBackend`]
/// the first time a name in a new file system is resolved.
///
/// [`VfsContext`]: crate::VfsContext
pub trait FileProvider: fmt::Debug + Send + Sync {
    /// Return the parser for this provider's file names.
    fn name_parser(&self) -> &dyn NameParser;

    /// Construct the backend for the file system with the given `root` name.
    ///
    /// This is called once per file system; the backend is shared by every
    /// file in it.
    fn create_file_system(&self, root: &FileName) -> Result<Box<dyn FileSystemBackend>>;

    /// Return whether `path` is an absolute path of the platform this
    /// provider can resolve without a scheme.
    ///
    /// The default accepts nothing.
    fn accepts_absolute_path(&self, _path: &str) -> bool {
        false
    }
}

/// The backend of one file system.
///
/// A file system hands out per-file [`FileBackend`] hooks and declares which
/// operations it supports. Backends do not need to provide their own caching;
/// files are cached above this layer.
pub trait FileSystemBackend: fmt::Debug + Send + Sync {
    /// Return the operations this file system supports.
    fn capabilities(&self) -> Capability;

    /// Construct the backend hooks for the file with the given `name`.
    ///
    /// The file need not exist; hooks are created for imaginary files too.
    fn create_file(&self, name: &FileName) -> Result<Box<dyn FileBackend>>;

    /// Release any resources held by this backend.
    ///
    /// The default does nothing.
    fn close(&self) {}
}

/// The backend hooks for a single file.
///
/// Hooks are called with the file attached, after [`attach`] has returned
/// `Ok`. A hook is only called when the operation makes sense for the file's
/// type and the file system's capabilities; `list_children` is never called
/// on a regular file, and `delete` is never called on a folder with children.
///
/// [`attach`]: FileBackend::attach
pub trait FileBackend: fmt::Debug + Send {
    /// Attach this file to its underlying resource.
    ///
    /// This is called before any other hook, and may be called again after
    /// [`detach`]. The default does nothing.
    ///
    /// [`detach`]: FileBackend::detach
    fn attach(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the resources held for this file.
    ///
    /// The default does nothing.
    fn detach(&mut self) {}

    /// Return the type of the file.
    ///
    /// A file which does not exist has the type [`FileType::Imaginary`].
    fn file_type(&self) -> Result<FileType>;

    /// Return the base names of the children of this folder.
    ///
    /// The names are plain names, not encoded for use in a URI.
    fn list_children(&self) -> Result<Vec<String>>;

    /// Open the contents of the file for reading.
    fn open_read(&self) -> Result<Box<dyn Read + Send>>;

    /// Open the contents of the file for writing, creating the file if it
    /// does not exist.
    ///
    /// If `append` is true, writes extend the existing contents; otherwise
    /// the contents are replaced.
    fn open_write(&mut self, append: bool) -> Result<Box<dyn Write + Send>>;

    /// Return the size of the file's contents in bytes.
    fn content_size(&self) -> Result<u64>;

    /// Return the time the file was last modified.
    fn last_modified(&self) -> Result<SystemTime>;

    /// Create this file as a folder.
    ///
    /// This is only called when the file does not exist and its parent is a
    /// folder.
    fn create_folder(&mut self) -> Result<()>;

    /// Delete the file.
    fn delete(&mut self) -> Result<()>;

    /// Rename the file to `new_name`, which belongs to the same file system.
    ///
    /// The parent of `new_name` is not created; renaming into a folder which
    /// does not exist is an error.
    fn rename_to(&mut self, new_name: &FileName) -> Result<()>;
}

assert_obj_safe!(FileProvider, FileSystemBackend, FileBackend);
