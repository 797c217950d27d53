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

#![cfg(feature = "provider-local")]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::backend::{FileBackend, FileProvider, FileSystemBackend};
use super::error::{Error, Result};
use crate::fs::Capability;
use crate::name::{FileName, FileType, NameParser, PrefixNameParser};

#[cfg(not(windows))]
use crate::name::GenericRootExtractor;
#[cfg(windows)]
use crate::name::WindowsRootExtractor;

/// The configuration for a [`LocalFileProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(docsrs, doc(cfg(feature = "provider-local")))]
pub struct LocalConfig {
    /// The directory the provider's files are stored under.
    pub root: PathBuf,
}

/// A provider which stores files on the local disk, under a configured root
/// directory.
///
/// A name's path is relative to the configured root, so with the scheme
/// `file` registered for this provider, `file:///logs/app.log` is the file
/// `logs/app.log` under the root directory. On Windows the parser also
/// accepts drive letters and UNC shares in place of the plain `/` root.
#[derive(Debug)]
#[cfg_attr(docsrs, doc(cfg(feature = "provider-local")))]
pub struct LocalFileProvider {
    parser: PrefixNameParser,
    config: LocalConfig,
}

impl LocalFileProvider {
    pub fn new(config: LocalConfig) -> Self {
        LocalFileProvider {
            parser: platform_parser(),
            config,
        }
    }
}

#[cfg(windows)]
fn platform_parser() -> PrefixNameParser {
    PrefixNameParser::new(WindowsRootExtractor)
}

#[cfg(not(windows))]
fn platform_parser() -> PrefixNameParser {
    PrefixNameParser::new(GenericRootExtractor)
}

impl FileProvider for LocalFileProvider {
    fn name_parser(&self) -> &dyn NameParser {
        &self.parser
    }

    fn create_file_system(&self, _root: &FileName) -> Result<Box<dyn FileSystemBackend>> {
        Ok(Box::new(LocalFileSystem {
            root: self.config.root.clone(),
        }))
    }

    fn accepts_absolute_path(&self, path: &str) -> bool {
        if cfg!(windows) {
            let bytes = path.as_bytes();
            path.starts_with("//")
                || path.starts_with(r"\\")
                || (bytes.len() >= 3
                    && bytes[0].is_ascii_alphabetic()
                    && bytes[1] == b':'
                    && (bytes[2] == b'/' || bytes[2] == b'\\'))
        } else {
            path.starts_with('/')
        }
    }
}

#[derive(Debug)]
struct LocalFileSystem {
    root: PathBuf,
}

impl FileSystemBackend for LocalFileSystem {
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
        Ok(Box::new(LocalFile {
            path: real_path(&self.root, name)?,
            root: self.root.clone(),
        }))
    }
}

/// Map `name` to its place under the root directory.
///
/// The canonical path has no `.` or `..` segments, so the mapped path can
/// not escape the root.
fn real_path(root: &Path, name: &FileName) -> Result<PathBuf> {
    let decoded = name.decoded_path().map_err(Error::new)?;
    let mut path = root.to_path_buf();
    for segment in decoded.split('/').filter(|segment| !segment.is_empty()) {
        path.push(segment);
    }
    Ok(path)
}

#[derive(Debug)]
struct LocalFile {
    path: PathBuf,
    root: PathBuf,
}

impl FileBackend for LocalFile {
    fn file_type(&self) -> Result<FileType> {
        match fs::metadata(&self.path) {
            Ok(metadata) if metadata.is_dir() => Ok(FileType::Folder),
            Ok(_) => Ok(FileType::File),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(FileType::Imaginary),
            Err(err) => Err(Error::new(err)),
        }
    }

    fn list_children(&self) -> Result<Vec<String>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            children.push(entry?.file_name().to_string_lossy().into_owned());
        }
        children.sort();
        Ok(children)
    }

    fn open_read(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn open_write(&mut self, append: bool) -> Result<Box<dyn Write + Send>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(&self.path)?;
        Ok(Box::new(file))
    }

    fn content_size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn last_modified(&self) -> Result<SystemTime> {
        Ok(fs::metadata(&self.path)?.modified()?)
    }

    fn create_folder(&mut self) -> Result<()> {
        fs::create_dir(&self.path)?;
        Ok(())
    }

    fn delete(&mut self) -> Result<()> {
        if fs::metadata(&self.path)?.is_dir() {
            fs::remove_dir(&self.path)?;
        } else {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn rename_to(&mut self, new_name: &FileName) -> Result<()> {
        fs::rename(&self.path, real_path(&self.root, new_name)?)?;
        Ok(())
    }
}
