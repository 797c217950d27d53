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
use std::sync::Arc;
use std::time::SystemTime;

use super::file::FileObject;
use crate::error::{CapacityError, Error, ErrorCode, Result};
use crate::name::FileName;

/// The content of a file.
///
/// This value is returned by [`FileObject::content`] and borrows the file.
/// Streams opened through it count toward the file's open-content count
/// until they are dropped; the cache uses that count to avoid evicting
/// files which are being read or written.
#[derive(Debug)]
pub struct FileContent<'a> {
    file: &'a FileObject,
}

impl<'a> FileContent<'a> {
    pub(crate) fn new(file: &'a FileObject) -> Self {
        FileContent { file }
    }

    /// Return the size of this file's contents in bytes.
    ///
    /// # Errors
    /// - `Error::FileSystem` with `ErrorCode::ContentSize`: The file is not
    ///   a regular file or its size could not be determined.
    pub fn size(&self) -> Result<u64> {
        self.file.content_size()
    }

    /// Return the time this file was last modified.
    ///
    /// # Errors
    /// - `Error::FileSystem` with `ErrorCode::LastModified`: The file does
    ///   not exist, or the file system cannot report modification times.
    pub fn last_modified(&self) -> Result<SystemTime> {
        self.file.last_modified_time()
    }

    /// Open this file's contents for reading.
    ///
    /// # Errors
    /// - `Error::FileSystem` with `ErrorCode::ReadNotFile`: The file is a
    ///   folder.
    /// - `Error::FileSystem` with `ErrorCode::ReadContent`: The file does
    ///   not exist or could not be opened.
    pub fn open_read(&self) -> Result<ContentReader> {
        let inner = self.file.open_read_stream()?;
        let file = self.file.promote()?;
        file.stream_opened();
        Ok(ContentReader { inner, file })
    }

    /// Open this file's contents for writing, replacing them.
    ///
    /// The file is created if it does not exist, along with any missing
    /// ancestor folders. The new contents are committed when the writer is
    /// closed.
    ///
    /// # Errors
    /// - `Error::FileSystem` with `ErrorCode::WriteNotFile`: The file is a
    ///   folder.
    /// - `Error::FileSystem` with `ErrorCode::ReadOnly`: The file system
    ///   does not support writing.
    pub fn open_write(&self) -> Result<ContentWriter> {
        self.open_writer(false)
    }

    /// Open this file's contents for writing, keeping the current contents
    /// and appending to them.
    ///
    /// # Errors
    /// - `Error::FileSystem` with `ErrorCode::AppendNotSupported`: The file
    ///   system does not support appending.
    /// - `Error::FileSystem` with `ErrorCode::WriteNotFile`: The file is a
    ///   folder.
    pub fn open_append(&self) -> Result<ContentWriter> {
        self.open_writer(true)
    }

    fn open_writer(&self, append: bool) -> Result<ContentWriter> {
        let inner = self.file.open_write_stream(append)?;
        let file = self.file.promote()?;
        file.stream_opened();
        Ok(ContentWriter {
            inner,
            file,
            closed: false,
        })
    }

    /// Read this file's entire contents into a buffer.
    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        let mut reader = self.open_read()?;
        let mut contents = Vec::new();
        reader
            .read_to_end(&mut contents)
            .map_err(|err| io_to_error(err, ErrorCode::ReadContent, self.file.name()))?;
        Ok(contents)
    }

    /// Replace this file's contents with `contents`.
    pub fn write_all(&self, contents: &[u8]) -> Result<()> {
        let mut writer = self.open_write()?;
        Write::write_all(&mut writer, contents)
            .map_err(|err| io_to_error(err, ErrorCode::WriteContent, self.file.name()))?;
        writer.close()
    }
}

/// A stream reading the contents of a file.
///
/// Dropping the reader releases its claim on the file.
pub struct ContentReader {
    inner: Box<dyn Read + Send>,
    file: Arc<FileObject>,
}

impl Read for ContentReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for ContentReader {
    fn drop(&mut self) {
        self.file.stream_closed();
    }
}

impl fmt::Debug for ContentReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentReader")
            .field("file", self.file.name())
            .finish_non_exhaustive()
    }
}

/// A stream writing the contents of a file.
///
/// The written contents are committed by [`close`]. A writer that is
/// dropped without being closed still commits, but any error from the
/// commit is lost, so prefer closing explicitly.
///
/// [`close`]: ContentWriter::close
pub struct ContentWriter {
    inner: Box<dyn Write + Send>,
    file: Arc<FileObject>,
    closed: bool,
}

impl ContentWriter {
    /// Flush and commit the written contents.
    ///
    /// Committing fires the created or changed notification for the file.
    ///
    /// # Errors
    /// - `Error::CapacityExceeded`: The contents do not fit in the file
    ///   system.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner
            .flush()
            .map_err(|err| io_to_error(err, ErrorCode::WriteContent, self.file.name()))?;
        self.file.handle_written()
    }
}

impl Write for ContentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Drop for ContentWriter {
    fn drop(&mut self) {
        let _ = self.finish();
        self.file.stream_closed();
    }
}

impl fmt::Debug for ContentWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentWriter")
            .field("file", self.file.name())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Convert an I/O error from a content stream into a crate error,
/// surfacing a backend capacity refusal as [`Error::CapacityExceeded`].
pub(crate) fn io_to_error(err: io::Error, code: ErrorCode, name: &FileName) -> Error {
    let capacity = err
        .get_ref()
        .map_or(false, |cause| cause.is::<CapacityError>());
    if capacity {
        Error::CapacityExceeded
    } else {
        Error::backend(code, name.friendly_uri(), crate::provider::Error::new(err))
    }
}
