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

//! Low-level primitives for parsing URI strings.
//!
//! These functions are the building blocks of the name parsers in
//! [`crate::name`]. They operate on plain strings so custom parsers can
//! compose them differently.

use crate::name::{FileType, NameParser};
use crate::{Error, Result, UriErrorKind};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Append `byte` to `buffer` as a percent escape with lowercase hex digits.
fn push_escaped(buffer: &mut String, byte: u8) {
    buffer.push('%');
    buffer.push(HEX_DIGITS[(byte >> 4) as usize] as char);
    buffer.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
}

/// Decode all percent escapes in `encoded`.
///
/// Each escape decodes to a single byte. This returns `Error::MalformedUri`
/// if the string contains a truncated or non-hex escape sequence.
pub fn decode(encoded: &str) -> Result<String> {
    if !encoded.contains('%') {
        return Ok(encoded.to_owned());
    }

    let chars = encoded.chars().collect::<Vec<_>>();
    let mut decoded = String::with_capacity(encoded.len());
    let mut index = 0;

    while index < chars.len() {
        if chars[index] == '%' {
            decoded.push(parse_escape(encoded, &chars, index)? as char);
            index += 3;
        } else {
            decoded.push(chars[index]);
            index += 1;
        }
    }

    Ok(decoded)
}

/// Check that every percent escape in `uri` is well formed.
pub fn check_escapes(uri: &str) -> Result<()> {
    decode(uri).map(|_| ())
}

/// Percent encode `%` and every character in `reserved`.
pub fn encode(input: &str, reserved: &[char]) -> String {
    let mut encoded = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch == '%' || reserved.contains(&ch) {
            push_escaped(&mut encoded, ch as u8);
        } else {
            encoded.push(ch);
        }
    }
    encoded
}

/// Parse the escape sequence starting at `chars[index]` into a byte.
fn parse_escape(input: &str, chars: &[char], index: usize) -> Result<u8> {
    if chars.len() - index < 3 {
        let sequence = chars[index..].iter().collect();
        return Err(Error::malformed(input, UriErrorKind::InvalidEscape(sequence)));
    }
    match (chars[index + 1].to_digit(16), chars[index + 2].to_digit(16)) {
        (Some(high), Some(low)) => Ok((high << 4 | low) as u8),
        _ => {
            let sequence = chars[index..index + 3].iter().collect();
            Err(Error::malformed(input, UriErrorKind::InvalidEscape(sequence)))
        }
    }
}

/// Put the path part of a URI into canonical form.
///
/// Escapes of unreserved characters are decoded. Escapes of characters the
/// `parser` keeps encoded are preserved with their original hex digits, and
/// bare occurrences of those characters are encoded.
pub fn canonicalize(input: &str, parser: &dyn NameParser) -> Result<String> {
    let chars = input.chars().collect::<Vec<_>>();
    let mut canonical = String::with_capacity(input.len());
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        if ch == '%' {
            let value = parse_escape(input, &chars, index)? as char;
            if parser.encode_char(value) {
                // A reserved character stays escaped, keeping its hex digits.
                canonical.push('%');
                canonical.push(chars[index + 1]);
                canonical.push(chars[index + 2]);
            } else {
                canonical.push(value);
            }
            index += 3;
        } else if parser.encode_char(ch) {
            push_escaped(&mut canonical, ch as u8);
            index += 1;
        } else {
            canonical.push(ch);
            index += 1;
        }
    }

    Ok(canonical)
}

/// Replace Windows separators in `path` with `/`.
pub fn fix_separators(path: &mut String) {
    if path.contains('\\') {
        *path = path.replace('\\', "/");
    }
}

/// Normalize `path` in place and return the file type it denotes.
///
/// Empty segments and `.` segments are dropped, `..` segments consume the
/// segment before them, and any trailing separator is removed. The path
/// denotes a folder if it is empty or ends with a separator, and a regular
/// file otherwise.
///
/// This returns `Error::InvalidRelativePath` if a `..` segment tries to
/// climb past the start of the path.
pub fn normalize_path(path: &mut String) -> Result<FileType> {
    if path.is_empty() {
        return Ok(FileType::Folder);
    }

    let file_type = if path.ends_with('/') {
        FileType::Folder
    } else {
        FileType::File
    };
    let absolute = path.starts_with('/');

    let mut stack = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return Err(Error::InvalidRelativePath(path.clone()));
                }
            }
            _ => stack.push(segment),
        }
    }

    let mut normalized = String::with_capacity(path.len());
    if absolute {
        normalized.push('/');
    }
    normalized.push_str(&stack.join("/"));

    *path = normalized;
    Ok(file_type)
}

/// Split the scheme off the front of `uri`.
///
/// This returns the scheme and the remainder after the `:`, or `None` if the
/// URI does not start with a valid scheme.
pub fn extract_scheme(uri: &str) -> Option<(&str, &str)> {
    let colon = uri.find(':')?;
    let scheme = &uri[..colon];
    let mut chars = scheme.chars();

    if !chars.next()?.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.')) {
        return None;
    }

    Some((scheme, &uri[colon + 1..]))
}

/// Split the query string off the end of `path`.
///
/// The query is everything after the first `?`, returned without it. The
/// query is not decoded.
pub fn extract_query(path: &mut String) -> Option<String> {
    let pos = path.find('?')?;
    let query = path[pos + 1..].to_owned();
    path.truncate(pos);
    Some(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::GenericRootExtractor;
    use crate::name::PrefixNameParser;

    fn default_parser() -> PrefixNameParser {
        PrefixNameParser::new(GenericRootExtractor)
    }

    #[test]
    fn decode_replaces_escapes() {
        assert_eq!(decode("a%20b").unwrap(), "a b");
        assert_eq!(decode("%73%6f%6d%65%20%66%69%6c%65").unwrap(), "some file");
        assert_eq!(decode("plain").unwrap(), "plain");
    }

    #[test]
    fn decode_rejects_bad_escapes() {
        assert!(decode("%").is_err());
        assert!(decode("a%5").is_err());
        assert!(decode("%qq").is_err());
    }

    #[test]
    fn encode_escapes_reserved_characters() {
        assert_eq!(encode("a%b", &[]), "a%25b");
        assert_eq!(encode("a#b", &['#']), "a%23b");
        assert_eq!(encode("plain", &['#']), "plain");
    }

    #[test]
    fn canonicalize_decodes_unreserved_escapes() {
        let parser = default_parser();
        assert_eq!(canonicalize("%73%6f%6d%65%20file", &parser).unwrap(), "some file");
    }

    #[test]
    fn canonicalize_keeps_reserved_escapes_verbatim() {
        let parser = default_parser();
        assert_eq!(canonicalize("a%25b", &parser).unwrap(), "a%25b");
        assert_eq!(canonicalize("a%2Fb", &parser).unwrap(), "a/b");
    }

    #[test]
    fn canonicalize_rejects_bad_escapes() {
        let parser = default_parser();
        assert!(canonicalize("%", &parser).is_err());
        assert!(canonicalize("%5", &parser).is_err());
        assert!(canonicalize("%q5", &parser).is_err());
    }

    #[test]
    fn normalize_collapses_dot_segments() {
        let mut path = String::from("/a/./b/../c");
        assert_eq!(normalize_path(&mut path).unwrap(), FileType::File);
        assert_eq!(path, "/a/c");
    }

    #[test]
    fn normalize_drops_empty_segments() {
        let mut path = String::from("/a//b///c");
        normalize_path(&mut path).unwrap();
        assert_eq!(path, "/a/b/c");
    }

    #[test]
    fn normalize_reports_folders_by_trailing_separator() {
        let mut path = String::from("/a/b/");
        assert_eq!(normalize_path(&mut path).unwrap(), FileType::Folder);
        assert_eq!(path, "/a/b");

        let mut root = String::from("/");
        assert_eq!(normalize_path(&mut root).unwrap(), FileType::Folder);
        assert_eq!(root, "/");
    }

    #[test]
    fn normalize_rejects_paths_climbing_past_the_root() {
        let mut path = String::from("/..");
        assert!(normalize_path(&mut path).is_err());

        let mut path = String::from("/a/../..");
        assert!(normalize_path(&mut path).is_err());
    }

    #[test]
    fn extract_scheme_requires_valid_grammar() {
        assert_eq!(extract_scheme("ftp://host/"), Some(("ftp", "//host/")));
        assert_eq!(extract_scheme("a+b-c.d:rest"), Some(("a+b-c.d", "rest")));
        assert_eq!(extract_scheme("c:/path"), Some(("c", "/path")));
        assert_eq!(extract_scheme("/no/scheme"), None);
        assert_eq!(extract_scheme("1st:rest"), None);
        assert_eq!(extract_scheme("no colon"), None);
    }

    #[test]
    fn extract_query_splits_at_the_first_question_mark() {
        let mut path = String::from("/a/b?key=value&x=1");
        assert_eq!(extract_query(&mut path).as_deref(), Some("key=value&x=1"));
        assert_eq!(path, "/a/b");

        let mut plain = String::from("/a/b");
        assert_eq!(extract_query(&mut plain), None);
        assert_eq!(plain, "/a/b");
    }

    #[test]
    fn fix_separators_rewrites_backslashes() {
        let mut path = String::from("\\a\\b/c");
        fix_separators(&mut path);
        assert_eq!(path, "/a/b/c");
    }
}
