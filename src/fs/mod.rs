//! Files, folders, and the operations between them.
//!
//! A [`FileSystem`] owns the files reachable from one root name and hands
//! out shared [`FileObject`] handles for them. A handle caches what it
//! learns from its provider backend until it is refreshed, reads and
//! writes content through [`FileContent`], and walks trees of files with a
//! [`FileSelector`].

pub use self::content::{ContentReader, ContentWriter, FileContent};
pub use self::file::FileObject;
pub use self::filesystem::{Capability, FileListener, FileSystem, FileSystemId};
pub use self::selector::{FileInfo, FileSelector, Selectors};

pub(crate) use self::filesystem::resolve_name_with;

mod content;
mod file;
mod filesystem;
mod selector;
