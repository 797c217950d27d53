//! Backends for file systems.
//!
//! This module provides the traits a file system provider implements to plug
//! a new URI scheme into a [`VfsContext`]. A provider supplies a name parser
//! and constructs one [`FileSystemBackend`] per file system; the backend in
//! turn constructs the [`FileBackend`] hooks for each file. The hooks only
//! perform the raw operations; resolution, caching, and capability checks are
//! handled above this layer.
//!
//! Two providers are included: [`RamFileProvider`], which stores files in
//! memory, and [`LocalFileProvider`], which wraps the local file system. The
//! local provider is gated behind the `provider-local` feature.
//!
//! [`VfsContext`]: crate::VfsContext

pub use self::backend::{FileBackend, FileProvider, FileSystemBackend};
pub use self::error::{Error, Result};
#[cfg(feature = "provider-local")]
pub use self::local::{LocalConfig, LocalFileProvider};
pub use self::ram::{RamConfig, RamFileProvider};

mod backend;
mod error;
mod local;
mod ram;
