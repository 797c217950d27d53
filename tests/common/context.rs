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

use rstest::*;

use omni_vfs::provider::RamFileProvider;
use omni_vfs::{CacheStrategy, ContextConfig, FileHandle, VfsContext};

/// Open a context with the given `config` and a provider for the `ram`
/// scheme.
pub fn ram_context(config: ContextConfig) -> anyhow::Result<VfsContext> {
    let context = VfsContext::new(config);
    context.register_provider("ram", RamFileProvider::new())?;
    Ok(context)
}

/// A context with the default configuration and a provider for the `ram`
/// scheme.
#[fixture]
pub fn context() -> VfsContext {
    ram_context(ContextConfig::default()).unwrap()
}

/// A context which never refreshes resolved files on its own.
#[fixture]
pub fn manual_context() -> VfsContext {
    ram_context(ContextConfig {
        refresh: CacheStrategy::Manual,
        ..ContextConfig::default()
    })
    .unwrap()
}

/// Create a file at `uri` with the given `contents` and return its handle.
pub fn write_file(
    context: &VfsContext,
    uri: &str,
    contents: &[u8],
) -> anyhow::Result<FileHandle> {
    let file = context.resolve(uri)?;
    file.content().write_all(contents)?;
    Ok(file)
}
