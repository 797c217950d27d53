use std::fmt;

use static_assertions::assert_obj_safe;

use crate::name::FileName;
use crate::Result;

/// The type of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// A regular file, which has content.
    File,

    /// A folder, which has children.
    Folder,

    /// A file which does not exist.
    Imaginary,
}

impl FileType {
    /// Return whether files of this type can have children.
    pub fn has_children(self) -> bool {
        self == FileType::Folder
    }

    /// Return whether files of this type can have content.
    pub fn has_content(self) -> bool {
        self == FileType::File
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::File => f.write_str("file"),
            FileType::Folder => f.write_str("folder"),
            FileType::Imaginary => f.write_str("imaginary"),
        }
    }
}

/// How tightly a resolved name must be related to the name it is resolved
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameScope {
    /// The name must be a direct child of the base name.
    Child,

    /// The name must be a descendant of the base name, at any depth.
    Descendant,

    /// The name must be the base name itself or one of its descendants.
    DescendantOrSelf,

    /// The name may be anywhere in the file system the base name belongs to.
    FileSystem,
}

impl fmt::Display for NameScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameScope::Child => f.write_str("child"),
            NameScope::Descendant => f.write_str("descendant"),
            NameScope::DescendantOrSelf => f.write_str("descendant or self"),
            NameScope::FileSystem => f.write_str("name in the file system"),
        }
    }
}

/// A parser which turns URI strings into [`FileName`] values.
///
/// A provider supplies one of these to describe the shape of the URIs it
/// accepts. Implementations must produce names in canonical form: percent
/// escapes decoded apart from reserved characters, separators normalized to
/// `/`, and `.` and `..` segments collapsed.
pub trait NameParser: fmt::Debug + Send + Sync {
    /// Parse an absolute `uri` into a file name.
    fn parse_uri(&self, uri: &str) -> Result<FileName>;

    /// Return whether `ch` must stay percent encoded in a canonical path.
    ///
    /// The default keeps `%` encoded, which every implementation must do for
    /// canonical paths to round trip.
    fn encode_char(&self, ch: char) -> bool {
        ch == '%'
    }
}

assert_obj_safe!(NameParser);
