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

use crate::name::{parser, FileName, NameParser};
use crate::{Error, Result, UriErrorKind};

/// A strategy for popping the root prefix off the front of a path.
///
/// Root prefix syntax is where file systems rooted in a path diverge, so the
/// [`PrefixNameParser`] delegates it. An extractor consumes the prefix from
/// the path and returns it, or reports that the path has no valid root.
pub trait RootPrefixExtractor: fmt::Debug + Send + Sync {
    /// Split the root prefix off the front of `path`.
    ///
    /// `uri` is the original URI, for error reporting. On success `path`
    /// holds the remaining absolute path.
    fn extract(&self, uri: &str, path: &mut String) -> Result<String>;
}

/// A parser for URI rooted in a path prefix rather than a network authority,
/// like `ram:///path` or `file:///C:/path`.
///
/// The double slash after the scheme is optional, so `file:/C:/path` and
/// `file:C:/path` parse to the same name as `file:///C:/path`.
#[derive(Debug)]
pub struct PrefixNameParser {
    extractor: Box<dyn RootPrefixExtractor>,
}

impl PrefixNameParser {
    /// Construct a new parser which extracts root prefixes with `extractor`.
    pub fn new(extractor: impl RootPrefixExtractor + 'static) -> Self {
        PrefixNameParser {
            extractor: Box::new(extractor),
        }
    }
}

impl Default for PrefixNameParser {
    fn default() -> Self {
        Self::new(GenericRootExtractor)
    }
}

impl NameParser for PrefixNameParser {
    fn parse_uri(&self, uri: &str) -> Result<FileName> {
        let (scheme, rest) = parser::extract_scheme(uri)
            .ok_or_else(|| Error::malformed(uri, UriErrorKind::MissingScheme))?;

        let mut path = parser::canonicalize(rest, self)?;
        parser::fix_separators(&mut path);
        let prefix = self.extractor.extract(uri, &mut path)?;
        let file_type = parser::normalize_path(&mut path)?;

        Ok(FileName::with_prefix(scheme, prefix, path, file_type))
    }
}

/// An extractor for file systems rooted at `/`.
///
/// The root prefix is empty and the path must be absolute.
#[derive(Debug, Clone, Copy)]
pub struct GenericRootExtractor;

impl RootPrefixExtractor for GenericRootExtractor {
    fn extract(&self, uri: &str, path: &mut String) -> Result<String> {
        if !path.starts_with('/') {
            return Err(Error::malformed(uri, UriErrorKind::NotAbsolutePath));
        }
        Ok(String::new())
    }
}

/// An extractor for Windows roots: a drive letter like `C:` or a UNC share
/// like `//host/share`.
///
/// Up to four leading separators are skipped before the root, so every form
/// from `file:C:/x` to `file:///C:/x` names the same file. A UNC name needs
/// at least two of them.
#[derive(Debug, Clone, Copy)]
pub struct WindowsRootExtractor;

impl RootPrefixExtractor for WindowsRootExtractor {
    fn extract(&self, uri: &str, path: &mut String) -> Result<String> {
        let bytes = path.as_bytes();
        let max_skip = bytes.len().min(4);
        let mut skipped = 0;
        while skipped < max_skip && bytes[skipped] == b'/' {
            skipped += 1;
        }
        if skipped == max_skip && bytes.len() > skipped + 1 && bytes[skipped + 1] == b'/' {
            return Err(Error::malformed(uri, UriErrorKind::NotAbsolutePath));
        }
        path.drain(..skipped);

        if let Some(drive) = split_drive_prefix(path) {
            return Ok(drive);
        }

        // A UNC name, which must have started with at least two separators.
        if skipped < 2 {
            return Err(Error::malformed(uri, UriErrorKind::NotAbsolutePath));
        }
        split_share_prefix(uri, path)
    }
}

/// Split a drive prefix like `C:` off the front of `path`, whose leading
/// separators have been removed.
fn split_drive_prefix(path: &mut String) -> Option<String> {
    let bytes = path.as_bytes();
    if bytes.len() < 3 {
        return None;
    }
    if bytes[0] == b'/' || bytes[0] == b':' || bytes[1] != b':' || bytes[2] != b'/' {
        return None;
    }

    let drive = path[..2].to_owned();
    path.drain(..2);
    Some(drive)
}

/// Split a UNC prefix like `//host/share` off the front of `path`, whose
/// leading separators have been removed.
fn split_share_prefix(uri: &str, path: &mut String) -> Result<String> {
    let bytes = path.as_bytes();
    let max = bytes.len();

    let mut pos = 0;
    while pos < max && bytes[pos] != b'/' {
        pos += 1;
    }
    pos += 1;
    if pos >= max {
        return Err(Error::malformed(uri, UriErrorKind::MissingShareName));
    }

    let share_start = pos;
    while pos < max && bytes[pos] != b'/' {
        pos += 1;
    }
    if pos == share_start {
        return Err(Error::malformed(uri, UriErrorKind::MissingShareName));
    }

    let mut prefix = String::with_capacity(pos + 2);
    prefix.push_str("//");
    prefix.push_str(&path[..pos]);
    path.drain(..pos);
    Ok(prefix)
}
