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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CacheConfig, FilesCache};
use crate::error::{mask_credentials, Error, ErrorCode, Result};
use crate::fs::{resolve_name_with, FileContent, FileObject, FileSelector, FileSystem};
use crate::name::{check_scope, parser, FileName, FileType, NameScope};
use crate::provider::FileProvider;

/// When the cached state of a resolved file is refreshed.
///
/// Files cache their type and children once they learn them from their
/// backend. When a file system is shared with other processes, that cached
/// state can go stale; the strategy decides when it is thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheStrategy {
    /// Never refresh automatically.
    ///
    /// Cached state is kept until [`FileHandle::refresh`] is called.
    Manual,

    /// Refresh a file each time the context resolves it.
    ///
    /// This is the default strategy.
    OnResolve,

    /// Refresh a file before every operation on its handle.
    ///
    /// This keeps handles consistent with file systems modified behind the
    /// context's back, at the cost of a backend round trip per operation.
    OnCall,
}

impl Default for CacheStrategy {
    fn default() -> Self {
        CacheStrategy::OnResolve
    }
}

/// The configuration for a [`VfsContext`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    /// How resolved files are cached and shared.
    pub cache: CacheConfig,

    /// When the cached state of a resolved file is refreshed.
    pub refresh: CacheStrategy,
}

/// The entry point of the virtual file system.
///
/// A context maps URI schemes to registered [`FileProvider`] values, resolves
/// URIs into [`FileHandle`] values through them, and owns the cache the
/// resolved files are shared through. Contexts are self-contained; two
/// contexts never share providers, file systems, or cached files.
///
/// # Examples
/// ```
/// use omni_vfs::provider::RamFileProvider;
/// use omni_vfs::{ContextConfig, VfsContext};
///
/// # fn main() -> omni_vfs::Result<()> {
/// let context = VfsContext::new(ContextConfig::default());
/// context.register_provider("ram", RamFileProvider::new())?;
///
/// let file = context.resolve("ram:///docs/report.txt")?;
/// file.create_file()?;
/// assert!(file.exists()?);
/// # Ok(())
/// # }
/// ```
pub struct VfsContext {
    /// The configuration this context was opened with.
    config: ContextConfig,

    /// The cache shared by every file system in this context.
    cache: Arc<dyn FilesCache>,

    /// Registered providers, in registration order.
    ///
    /// Registration order matters when resolving absolute platform paths;
    /// the first provider which claims the path wins.
    providers: RwLock<Vec<(String, Arc<dyn FileProvider>)>>,

    /// Live file systems, keyed by their root URI.
    filesystems: Mutex<HashMap<String, Arc<FileSystem>>>,

    /// The file relative URIs resolve against.
    base: Mutex<Option<FileHandle>>,

    closed: AtomicBool,
}

impl VfsContext {
    /// Open a new context with the given `config`.
    ///
    /// The context starts with no providers; nothing resolves until at least
    /// one is registered with [`register_provider`][Self::register_provider].
    pub fn new(config: ContextConfig) -> Self {
        let cache = config.cache.build();
        VfsContext {
            config,
            cache,
            providers: RwLock::new(Vec::new()),
            filesystems: Mutex::new(HashMap::new()),
            base: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Return the configuration this context was opened with.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Register `provider` to resolve URIs with the given `scheme`.
    ///
    /// Schemes are matched case-sensitively; by convention they are
    /// lowercase.
    ///
    /// # Errors
    /// - `Error::DuplicateScheme`: A provider is already registered for
    ///   `scheme`.
    /// - `Error::Closed`: This context has been closed.
    pub fn register_provider(
        &self,
        scheme: impl Into<String>,
        provider: impl FileProvider + 'static,
    ) -> Result<()> {
        self.ensure_open()?;
        let scheme = scheme.into();
        let mut providers = self.providers.write().unwrap();
        if providers.iter().any(|(registered, _)| *registered == scheme) {
            return Err(Error::DuplicateScheme(scheme));
        }
        debug!(target: "omnivfs::fs", scheme = %scheme, "registered provider");
        providers.push((scheme, Arc::new(provider)));
        Ok(())
    }

    /// Return whether a provider is registered for `scheme`.
    pub fn has_provider(&self, scheme: &str) -> bool {
        let providers = self.providers.read().unwrap();
        providers
            .iter()
            .any(|(registered, _)| registered.as_str() == scheme)
    }

    /// Return the registered schemes, in registration order.
    pub fn schemes(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap();
        providers.iter().map(|(scheme, _)| scheme.clone()).collect()
    }

    /// Set the file relative URIs are resolved against, or clear it with
    /// `None`.
    pub fn set_base_file(&self, base: Option<FileHandle>) {
        *self.base.lock().unwrap() = base;
    }

    /// Return the file relative URIs are resolved against.
    pub fn base_file(&self) -> Option<FileHandle> {
        self.base.lock().unwrap().clone()
    }

    /// Resolve `uri` to a file.
    ///
    /// The URI is tried in this order:
    /// 1. A URI with a registered scheme, like `ram:///path`, resolves
    ///    through that scheme's provider.
    /// 2. An absolute platform path, like `/home/user` or `C:\Users`,
    ///    resolves through the first registered provider which claims it.
    /// 3. Anything else resolves relative to the base file set with
    ///    [`set_base_file`][Self::set_base_file].
    ///
    /// # Errors
    /// - `Error::MalformedUri`: `uri` contains an invalid escape sequence or
    ///   does not parse under its provider's grammar.
    /// - `Error::UnknownScheme`: `uri` has a scheme no provider is
    ///   registered for.
    /// - `Error::RelativeWithoutBase`: `uri` is relative and no base file is
    ///   set.
    /// - `Error::Closed`: This context has been closed.
    pub fn resolve(&self, uri: &str) -> Result<FileHandle> {
        let base = self.base.lock().unwrap().clone();
        self.resolve_uri(base.as_ref(), uri)
    }

    /// Resolve `uri` to a file, resolving relative URIs against `base`
    /// instead of the context's base file.
    ///
    /// # Errors
    /// See [`resolve`][Self::resolve].
    pub fn resolve_with(&self, base: &FileHandle, uri: &str) -> Result<FileHandle> {
        self.resolve_uri(Some(base), uri)
    }

    fn resolve_uri(&self, base: Option<&FileHandle>, uri: &str) -> Result<FileHandle> {
        self.ensure_open()?;
        parser::check_escapes(uri)?;

        // A URI with a registered scheme is absolute.
        if let Some((scheme, _)) = parser::extract_scheme(uri) {
            if let Some(provider) = self.provider_for(scheme) {
                let name = provider.name_parser().parse_uri(uri)?;
                return self.find_file(&provider, &name);
            }
        }

        // An absolute platform path resolves through the first provider
        // which claims it. This is what lets a plain `/home/user` resolve
        // without a `file:` prefix.
        let absolute = {
            let providers = self.providers.read().unwrap();
            providers
                .iter()
                .find(|(_, provider)| provider.accepts_absolute_path(uri))
                .map(|(scheme, provider)| (scheme.clone(), Arc::clone(provider)))
        };
        if let Some((scheme, provider)) = absolute {
            let full = format!("{}:{}", scheme, uri);
            let name = provider.name_parser().parse_uri(&full)?;
            return self.find_file(&provider, &name);
        }

        if let Some((scheme, _)) = parser::extract_scheme(uri) {
            return Err(Error::UnknownScheme(scheme.to_owned()));
        }

        let base = base.ok_or_else(|| Error::RelativeWithoutBase(mask_credentials(uri)))?;
        let file = base.file();
        let fs = file.file_system();
        let name = fs.resolve_name(file.name(), uri, NameScope::FileSystem)?;
        let resolved = fs.resolve(&name)?;
        Ok(self.finish(resolved))
    }

    /// Resolve `path` against `base` and return the resulting name, without
    /// resolving a file.
    ///
    /// `path` may be relative to `base`, absolute within its file system, or
    /// a full URI with a registered scheme. The resolved name must fall
    /// within `scope` of `base`; a scheme-qualified name in a different file
    /// system is only accepted with [`NameScope::FileSystem`].
    ///
    /// # Errors
    /// - `Error::MalformedUri`: `path` contains an invalid escape sequence.
    /// - `Error::InvalidRelativePath`: `path` climbs past the root.
    /// - `Error::OutOfScope`: The resolved name is not within `scope` of
    ///   `base`.
    /// - `Error::UnknownScheme`: No provider is registered for the scheme
    ///   of `base`.
    pub fn resolve_name(&self, base: &FileName, path: &str, scope: NameScope) -> Result<FileName> {
        let mut fixed = path.to_owned();
        parser::fix_separators(&mut fixed);
        if let Some((scheme, _)) = parser::extract_scheme(&fixed) {
            if let Some(provider) = self.provider_for(scheme) {
                let name = provider.name_parser().parse_uri(&fixed)?;
                if scope != NameScope::FileSystem
                    && (name.root_uri() != base.root_uri()
                        || !check_scope(base.path(), name.path(), scope))
                {
                    return Err(Error::OutOfScope {
                        name: mask_credentials(path),
                        scope,
                    });
                }
                return Ok(name);
            }
        }

        let provider = self
            .provider_for(base.scheme())
            .ok_or_else(|| Error::UnknownScheme(base.scheme().to_owned()))?;
        resolve_name_with(provider.name_parser(), base, path, scope)
    }

    /// Close every file system with no open content streams.
    ///
    /// Resolving a file in a freed file system constructs the file system
    /// again.
    pub fn free_unused_filesystems(&self) {
        let mut filesystems = self.filesystems.lock().unwrap();
        filesystems.retain(|_, fs| {
            if fs.is_releaseable() {
                fs.close();
                false
            } else {
                true
            }
        });
    }

    /// Close this context, closing every file system it opened.
    ///
    /// Closing is idempotent. Resolving through a closed context fails with
    /// `Error::Closed`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.base.lock().unwrap() = None;
        let filesystems = {
            let mut filesystems = self.filesystems.lock().unwrap();
            filesystems.drain().map(|(_, fs)| fs).collect::<Vec<_>>()
        };
        for fs in filesystems {
            fs.close();
        }
        self.cache.close();
        debug!(target: "omnivfs::fs", "context closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn provider_for(&self, scheme: &str) -> Option<Arc<dyn FileProvider>> {
        let providers = self.providers.read().unwrap();
        providers
            .iter()
            .find(|(registered, _)| registered.as_str() == scheme)
            .map(|(_, provider)| Arc::clone(provider))
    }

    /// Resolve `name` in the file system which owns it, constructing the
    /// file system on first use.
    fn find_file(&self, provider: &Arc<dyn FileProvider>, name: &FileName) -> Result<FileHandle> {
        let fs = self.filesystem_for(provider, name)?;
        let file = fs.resolve(name)?;
        Ok(self.finish(file))
    }

    fn filesystem_for(
        &self,
        provider: &Arc<dyn FileProvider>,
        name: &FileName,
    ) -> Result<Arc<FileSystem>> {
        let mut filesystems = self.filesystems.lock().unwrap();
        if let Some(fs) = filesystems.get(name.root_uri()) {
            return Ok(Arc::clone(fs));
        }

        let root = name.root();
        let backend = provider
            .create_file_system(&root)
            .map_err(|err| Error::backend(ErrorCode::CreateFileSystem, root.friendly_uri(), err))?;
        let fs = FileSystem::new(root, Arc::clone(provider), backend, Arc::clone(&self.cache));
        debug!(
            target: "omnivfs::fs",
            root = %fs.root_name(),
            "created file system",
        );
        filesystems.insert(name.root_uri().to_owned(), Arc::clone(&fs));
        Ok(fs)
    }

    fn finish(&self, file: Arc<FileObject>) -> FileHandle {
        if self.config.refresh == CacheStrategy::OnResolve {
            file.refresh();
        }
        FileHandle::new(file, self.config.refresh)
    }
}

impl Default for VfsContext {
    fn default() -> Self {
        VfsContext::new(ContextConfig::default())
    }
}

impl fmt::Debug for VfsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsContext")
            .field("config", &self.config)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for VfsContext {
    fn drop(&mut self) {
        self.close();
    }
}

/// A file resolved by a [`VfsContext`].
///
/// A handle pairs a shared [`FileObject`] with the [`CacheStrategy`] of the
/// context which resolved it and applies the strategy in front of every
/// operation. Handles are cheap to clone; clones share the underlying file.
#[derive(Debug, Clone)]
pub struct FileHandle {
    file: Arc<FileObject>,
    strategy: CacheStrategy,
}

impl FileHandle {
    fn new(file: Arc<FileObject>, strategy: CacheStrategy) -> Self {
        FileHandle { file, strategy }
    }

    /// The underlying file, refreshed first under [`CacheStrategy::OnCall`].
    ///
    /// Every operation on this handle dispatches through here.
    fn target(&self) -> &Arc<FileObject> {
        if self.strategy == CacheStrategy::OnCall {
            self.file.refresh();
        }
        &self.file
    }

    fn wrap(&self, file: Arc<FileObject>) -> FileHandle {
        FileHandle::new(file, self.strategy)
    }

    /// Return the underlying file, without applying the cache strategy.
    pub fn file(&self) -> &Arc<FileObject> {
        &self.file
    }

    /// Return the name of this file.
    pub fn name(&self) -> &FileName {
        self.file.name()
    }

    /// Return the file system this file belongs to.
    pub fn file_system(&self) -> &Arc<FileSystem> {
        self.file.file_system()
    }

    /// Discard this file's cached state.
    ///
    /// The next operation sees fresh state from the backend.
    pub fn refresh(&self) {
        self.file.refresh();
    }

    /// Resolve `path` relative to this file.
    ///
    /// `path` may contain `.` and `..` segments and may be absolute within
    /// this file's file system.
    pub fn resolve(&self, path: &str) -> Result<FileHandle> {
        let file = self.target();
        let fs = file.file_system();
        let name = fs.resolve_name(file.name(), path, NameScope::FileSystem)?;
        let resolved = fs.resolve(&name)?;
        if self.strategy == CacheStrategy::OnResolve {
            resolved.refresh();
        }
        Ok(self.wrap(resolved))
    }

    /// Return the type of this file.
    pub fn file_type(&self) -> Result<FileType> {
        self.target().file_type()
    }

    /// Return whether this file exists.
    pub fn exists(&self) -> Result<bool> {
        self.target().exists()
    }

    /// Return whether this file exists and is a regular file.
    pub fn is_file(&self) -> Result<bool> {
        self.target().is_file()
    }

    /// Return whether this file exists and is a folder.
    pub fn is_folder(&self) -> Result<bool> {
        self.target().is_folder()
    }

    /// Return the children of this folder.
    pub fn children(&self) -> Result<Vec<FileHandle>> {
        let children = self.target().children()?;
        Ok(children.into_iter().map(|child| self.wrap(child)).collect())
    }

    /// Return the child of this folder with the given base `name`.
    pub fn child(&self, name: &str) -> Result<FileHandle> {
        let child = self.target().child(name)?;
        Ok(self.wrap(child))
    }

    /// Return the parent of this file, or `None` at the root.
    pub fn parent(&self) -> Result<Option<FileHandle>> {
        let parent = self.target().parent()?;
        Ok(parent.map(|parent| self.wrap(parent)))
    }

    /// Return the content of this file.
    pub fn content(&self) -> FileContent<'_> {
        self.target().content()
    }

    /// Return the size of this file's content in bytes.
    pub fn size(&self) -> Result<u64> {
        self.content().size()
    }

    /// Return the time this file's content was last modified.
    pub fn last_modified(&self) -> Result<SystemTime> {
        self.content().last_modified()
    }

    /// Create this file as a folder, creating any missing ancestors.
    pub fn create_folder(&self) -> Result<()> {
        self.target().create_folder()
    }

    /// Create this file as an empty regular file, creating any missing
    /// ancestor folders.
    pub fn create_file(&self) -> Result<()> {
        self.target().create_file()
    }

    /// Delete this file if it exists and, for a folder, is empty.
    ///
    /// Returns whether the file was deleted.
    pub fn delete(&self) -> Result<bool> {
        self.target().delete()
    }

    /// Delete the files at or under this file which match `selector`.
    ///
    /// Returns the number of files deleted.
    pub fn delete_matching(&self, selector: &dyn FileSelector) -> Result<usize> {
        self.target().delete_matching(selector)
    }

    /// Delete this file and everything under it.
    ///
    /// Returns the number of files deleted.
    pub fn delete_all(&self) -> Result<usize> {
        self.target().delete_all()
    }

    /// Return the files at or under this file which match `selector`.
    ///
    /// When `depthwise` is true children appear in the result before their
    /// parents; otherwise parents appear first.
    pub fn find_files(
        &self,
        selector: &dyn FileSelector,
        depthwise: bool,
    ) -> Result<Vec<FileHandle>> {
        let found = self.target().find_files(selector, depthwise)?;
        Ok(found.into_iter().map(|file| self.wrap(file)).collect())
    }

    /// Copy the files matching `selector` under `src` to the corresponding
    /// names under this file.
    pub fn copy_from(&self, src: &FileHandle, selector: &dyn FileSelector) -> Result<()> {
        self.target().copy_from(src.target(), selector)
    }

    /// Move this file to `dest`.
    ///
    /// Within one file system this renames the file where the backend
    /// supports it; otherwise it falls back to a copy and delete.
    pub fn move_to(&self, dest: &FileHandle) -> Result<()> {
        self.target().move_to(dest.target())
    }
}
