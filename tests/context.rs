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
use std::time::Duration;

use rstest::*;

use omni_vfs::cache::CacheConfig;
use omni_vfs::name::{NameParser, NameScope, UrlNameParser};
use omni_vfs::provider::RamFileProvider;
use omni_vfs::{CacheStrategy, ContextConfig, Error, UriErrorKind, VfsContext};

use common::*;

mod common;

#[rstest]
fn registering_a_scheme_twice_is_an_error(context: VfsContext) {
    assert_that!(context.register_provider("ram", RamFileProvider::new()))
        .is_err_variant(Error::DuplicateScheme(String::new()));
}

#[rstest]
fn registered_schemes_are_listed_in_order(context: VfsContext) -> anyhow::Result<()> {
    context.register_provider("mem", RamFileProvider::new())?;

    assert_that!(context.has_provider("ram")).is_true();
    assert_that!(context.has_provider("mem")).is_true();
    assert_that!(context.has_provider("ftp")).is_false();
    assert_that!(context.schemes()).is_equal_to(vec!["ram".to_string(), "mem".to_string()]);

    Ok(())
}

#[rstest]
fn resolving_an_unknown_scheme_is_an_error(context: VfsContext) {
    assert_that!(context.resolve("ftp://example.com/file.txt"))
        .is_err_variant(Error::UnknownScheme(String::new()));
}

#[rstest]
fn relative_uris_need_a_base_file(context: VfsContext) {
    assert_that!(context.resolve("docs/file.txt"))
        .is_err_variant(Error::RelativeWithoutBase(String::new()));
}

#[rstest]
fn bad_escapes_are_rejected_before_resolution(context: VfsContext) {
    assert_that!(context.resolve("ram:///file%zz")).is_err_variant(Error::MalformedUri {
        uri: String::new(),
        kind: UriErrorKind::InvalidEscape(String::new()),
    });
}

#[rstest]
fn relative_uris_resolve_against_the_base_file(context: VfsContext) -> anyhow::Result<()> {
    let docs = context.resolve("ram:///docs/")?;
    context.set_base_file(Some(docs.clone()));
    assert_that!(context.base_file()).is_some();

    let file = context.resolve("reports/2022.pdf")?;
    assert_that!(file.name().path()).is_equal_to("/docs/reports/2022.pdf");

    let sibling = context.resolve("../readme.txt")?;
    assert_that!(sibling.name().path()).is_equal_to("/readme.txt");

    context.set_base_file(None);
    assert_that!(context.resolve("reports/2022.pdf"))
        .is_err_variant(Error::RelativeWithoutBase(String::new()));

    Ok(())
}

#[rstest]
fn resolve_with_overrides_the_base(context: VfsContext) -> anyhow::Result<()> {
    let base = context.resolve("ram:///a/b/")?;

    let nested = context.resolve_with(&base, "c.txt")?;
    assert_that!(nested.name().path()).is_equal_to("/a/b/c.txt");

    let absolute = context.resolve_with(&base, "/top.txt")?;
    assert_that!(absolute.name().path()).is_equal_to("/top.txt");

    Ok(())
}

#[rstest]
fn resolving_the_same_uri_shares_the_file(context: VfsContext) -> anyhow::Result<()> {
    let first = context.resolve("ram:///file.txt")?;
    let second = context.resolve("ram:///file.txt")?;
    let normalized = context.resolve("ram:///dir/../file.txt")?;

    assert_that!(Arc::ptr_eq(first.file(), second.file())).is_true();
    assert_that!(Arc::ptr_eq(first.file(), normalized.file())).is_true();

    Ok(())
}

#[rstest]
fn resolving_refreshes_the_file_by_default(context: VfsContext) -> anyhow::Result<()> {
    let file = context.resolve("ram:///file.txt")?;
    file.exists()?;
    assert_that!(file.file().is_attached()).is_true();

    // The second resolve returns the same file and discards its cached state.
    context.resolve("ram:///file.txt")?;
    assert_that!(file.file().is_attached()).is_false();

    Ok(())
}

#[rstest]
fn manual_strategy_keeps_cached_state(manual_context: VfsContext) -> anyhow::Result<()> {
    let file = manual_context.resolve("ram:///file.txt")?;
    file.exists()?;
    assert_that!(file.file().is_attached()).is_true();

    manual_context.resolve("ram:///file.txt")?;
    assert_that!(file.file().is_attached()).is_true();

    Ok(())
}

#[rstest]
fn operations_work_under_the_on_call_strategy() -> anyhow::Result<()> {
    let context = ram_context(ContextConfig {
        refresh: CacheStrategy::OnCall,
        ..ContextConfig::default()
    })?;

    let file = context.resolve("ram:///docs/report.txt")?;
    file.content().write_all(b"contents")?;

    assert_that!(file.is_file()?).is_true();
    assert_that!(file.content().read_to_vec()?).is_equal_to(b"contents".to_vec());

    let folder = context.resolve("ram:///docs/")?;
    assert_that!(folder.children()?).has_length(1);

    Ok(())
}

#[rstest]
#[case::direct_child("file.txt", NameScope::Child, Some("/base/dir/file.txt"))]
#[case::nested_is_not_a_child("sub/file.txt", NameScope::Child, None)]
#[case::self_is_not_a_child(".", NameScope::Child, None)]
#[case::nested_descendant("sub/deep/file.txt", NameScope::Descendant, Some("/base/dir/sub/deep/file.txt"))]
#[case::self_is_not_a_descendant(".", NameScope::Descendant, None)]
#[case::descendant_or_self_accepts_self(".", NameScope::DescendantOrSelf, Some("/base/dir"))]
#[case::descendant_or_self_accepts_children("file.txt", NameScope::DescendantOrSelf, Some("/base/dir/file.txt"))]
#[case::parent_stays_in_the_file_system("..", NameScope::FileSystem, Some("/base"))]
#[case::absolute_path_in_the_file_system("/other/file.txt", NameScope::FileSystem, Some("/other/file.txt"))]
#[case::escaping_a_child_scope("../sibling", NameScope::Child, None)]
fn resolve_name_enforces_the_scope(
    context: VfsContext,
    #[case] path: &str,
    #[case] scope: NameScope,
    #[case] expected: Option<&str>,
) -> anyhow::Result<()> {
    let base = context.resolve("ram:///base/dir/")?.name().clone();

    match expected {
        Some(resolved_path) => {
            let name = context.resolve_name(&base, path, scope)?;
            assert_that!(name.path()).is_equal_to(resolved_path);
        }
        None => {
            assert_that!(context.resolve_name(&base, path, scope)).is_err_variant(
                Error::OutOfScope {
                    name: String::new(),
                    scope,
                },
            );
        }
    }

    Ok(())
}

#[rstest]
fn resolve_name_rejects_climbing_past_the_root(context: VfsContext) -> anyhow::Result<()> {
    let base = context.resolve("ram:///base/dir/")?.name().clone();

    assert_that!(context.resolve_name(&base, "../../..", NameScope::FileSystem))
        .is_err_variant(Error::InvalidRelativePath(String::new()));

    Ok(())
}

#[rstest]
fn resolve_name_accepts_full_uris(context: VfsContext) -> anyhow::Result<()> {
    context.register_provider("mem", RamFileProvider::new())?;
    let base = context.resolve("ram:///base/")?.name().clone();

    let same_fs = context.resolve_name(&base, "ram:///other/file.txt", NameScope::FileSystem)?;
    assert_that!(same_fs.path()).is_equal_to("/other/file.txt");

    let cross_fs = context.resolve_name(&base, "mem:///other/file.txt", NameScope::FileSystem)?;
    assert_that!(cross_fs.scheme()).is_equal_to("mem");

    // A name in another file system cannot satisfy a narrower scope.
    assert_that!(context.resolve_name(&base, "mem:///other/file.txt", NameScope::Descendant))
        .is_err_variant(Error::OutOfScope {
            name: String::new(),
            scope: NameScope::Descendant,
        });

    Ok(())
}

#[rstest]
fn resolve_name_requires_a_provider_for_the_base(context: VfsContext) -> anyhow::Result<()> {
    let foreign = UrlNameParser::new().parse_uri("ftp://host/docs/")?;

    assert_that!(context.resolve_name(&foreign, "file.txt", NameScope::Child))
        .is_err_variant(Error::UnknownScheme(String::new()));

    Ok(())
}

#[rstest]
fn a_closed_context_refuses_every_operation(context: VfsContext) -> anyhow::Result<()> {
    let file = context.resolve("ram:///file.txt")?;
    file.create_file()?;

    context.close();
    context.close();

    assert_that!(context.resolve("ram:///file.txt")).is_err_variant(Error::Closed);
    assert_that!(context.register_provider("mem", RamFileProvider::new()))
        .is_err_variant(Error::Closed);

    // Held handles lose their file system when the context closes.
    assert_that!(file.parent()).is_err_variant(Error::Closed);

    Ok(())
}

#[rstest]
fn freeing_unused_file_systems_rebuilds_them_on_demand(context: VfsContext) -> anyhow::Result<()> {
    let file = write_file(&context, "ram:///keep.txt", b"contents")?;
    let old_id = file.file_system().id();

    context.free_unused_filesystems();

    let fresh = context.resolve("ram:///keep.txt")?;
    assert_ne!(fresh.file_system().id(), old_id);
    // The replacement file system starts out empty.
    assert_that!(fresh.exists()?).is_false();

    Ok(())
}

#[rstest]
fn file_systems_with_open_streams_are_not_freed(context: VfsContext) -> anyhow::Result<()> {
    let file = write_file(&context, "ram:///keep.txt", b"contents")?;
    let reader = file.content().open_read()?;
    let id = file.file_system().id();

    context.free_unused_filesystems();

    let same = context.resolve("ram:///keep.txt")?;
    assert_eq!(same.file_system().id(), id);
    assert_that!(same.exists()?).is_true();

    drop(reader);
    Ok(())
}

#[rstest]
fn handles_resolve_relative_paths(context: VfsContext) -> anyhow::Result<()> {
    let file = write_file(&context, "ram:///docs/reports/2022.pdf", b"report")?;
    let docs = context.resolve("ram:///docs/")?;

    let found = docs.resolve("reports/2022.pdf")?;
    assert_that!(Arc::ptr_eq(found.file(), file.file())).is_true();

    let up = found.resolve("../..")?;
    assert_that!(up.name().path()).is_equal_to("/docs");

    Ok(())
}

#[test]
fn context_config_round_trips_through_serde() -> anyhow::Result<()> {
    let config = ContextConfig {
        cache: CacheConfig::Timed {
            ttl: Duration::from_secs(30),
            capacity: Some(100),
        },
        refresh: CacheStrategy::OnCall,
    };

    let serialized = serde_json::to_string(&config)?;
    let deserialized: ContextConfig = serde_json::from_str(&serialized)?;

    assert_that!(deserialized).is_equal_to(&config);

    Ok(())
}
