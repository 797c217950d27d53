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
use std::sync::Arc;

use super::file::FileObject;
use crate::name::FileName;
use crate::Result;

/// Information about a file being considered by a [`FileSelector`].
#[derive(Debug)]
pub struct FileInfo<'a> {
    base: &'a FileName,
    file: &'a Arc<FileObject>,
    depth: u32,
}

impl<'a> FileInfo<'a> {
    /// The name the search started from.
    pub fn base(&self) -> &FileName {
        self.base
    }

    /// The file being considered.
    pub fn file(&self) -> &Arc<FileObject> {
        self.file
    }

    /// The depth of the file below the base, where the base itself is `0`.
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// Chooses the files included in a traversal.
///
/// A selector makes two decisions for every file the traversal reaches:
/// whether the file itself is part of the result, and whether the traversal
/// descends into its children. The two are independent, so a selector can
/// match only leaves while still walking the whole tree.
pub trait FileSelector: Send + Sync {
    /// Return whether the file is included in the selection.
    fn include(&self, info: &FileInfo<'_>) -> Result<bool>;

    /// Return whether the children of a folder are searched.
    fn descend(&self, info: &FileInfo<'_>) -> Result<bool>;
}

/// Ready-made selectors for the common traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selectors {
    /// The file itself and all of its descendants.
    All,
    /// The file itself only.
    SelfOnly,
    /// All of the file's descendants, without the file itself.
    ExcludeSelf,
    /// The direct children of the file.
    Children,
    /// The regular files at any depth, including the file itself.
    Files,
    /// The folders at any depth, including the file itself.
    Folders,
}

impl FileSelector for Selectors {
    fn include(&self, info: &FileInfo<'_>) -> Result<bool> {
        match self {
            Selectors::All => Ok(true),
            Selectors::SelfOnly => Ok(info.depth() == 0),
            Selectors::ExcludeSelf => Ok(info.depth() > 0),
            Selectors::Children => Ok(info.depth() == 1),
            Selectors::Files => info.file().is_file(),
            Selectors::Folders => info.file().is_folder(),
        }
    }

    fn descend(&self, info: &FileInfo<'_>) -> Result<bool> {
        match self {
            Selectors::All | Selectors::ExcludeSelf | Selectors::Files | Selectors::Folders => {
                Ok(true)
            }
            Selectors::SelfOnly => Ok(false),
            Selectors::Children => Ok(info.depth() == 0),
        }
    }
}

/// Walk the tree under `file`, collecting the files `selector` includes.
///
/// Children are always visited before their parent. When `depthwise` is
/// false, an included parent is inserted ahead of its children in the
/// result; when it is true, the parent follows them.
pub(crate) fn traverse(
    file: &Arc<FileObject>,
    base: &FileName,
    depth: u32,
    selector: &dyn FileSelector,
    depthwise: bool,
    selected: &mut Vec<Arc<FileObject>>,
) -> Result<()> {
    let index = selected.len();
    let descend = {
        let info = FileInfo { base, file, depth };
        file.file_type()?.has_children() && selector.descend(&info)?
    };
    if descend {
        for child in file.children()? {
            traverse(&child, base, depth + 1, selector, depthwise, selected)?;
        }
    }
    let include = {
        let info = FileInfo { base, file, depth };
        selector.include(&info)?
    };
    if include {
        if depthwise {
            selected.push(Arc::clone(file));
        } else {
            selected.insert(index, Arc::clone(file));
        }
    }
    Ok(())
}
