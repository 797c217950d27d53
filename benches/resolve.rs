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

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use omni_vfs::name::{NameParser, UrlNameParser};
use omni_vfs::provider::RamFileProvider;
use omni_vfs::{ContextConfig, VfsContext};

/// Return a URI with `depth` path segments for benchmarking.
fn deep_uri(depth: usize) -> String {
    let mut uri = String::from("ram://");
    for segment in 0..depth {
        uri.push_str(&format!("/dir{}", segment));
    }
    uri.push_str("/file.txt");
    uri
}

/// Return a new context with a RAM provider for benchmarking.
fn new_context() -> VfsContext {
    let context = VfsContext::new(ContextConfig::default());
    context
        .register_provider("ram", RamFileProvider::new())
        .unwrap();
    context
}

pub fn parse_file_name(criterion: &mut Criterion) {
    let parser = UrlNameParser::new();
    let mut group = criterion.benchmark_group("Parse a file name");

    for depth in [2, 8, 32].iter() {
        let uri = deep_uri(*depth);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            format!("with {} path segments", depth),
            &uri,
            |bencher, uri| {
                bencher.iter(|| parser.parse_uri(uri).unwrap());
            },
        );
    }
}

pub fn resolve_cached_file(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("Resolve a cached file");

    for num_files in [200, 1_000, 5_000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            format!("with {} cached files", num_files),
            num_files,
            |bencher, num_files| {
                // Create a new context and fill its cache.
                let context = new_context();
                for i in 0..*num_files {
                    context
                        .resolve(&format!("ram:///cached/file{}.txt", i))
                        .unwrap();
                }

                // Benchmark resolving a file which is already cached.
                bencher.iter(|| context.resolve("ram:///cached/file0.txt").unwrap());
            },
        );
    }
}

pub fn resolve_relative_path(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("Resolve a relative path");

    for hops in [1usize, 4, 16].iter() {
        let context = new_context();
        let base = context.resolve(&deep_uri(32)).unwrap();
        let path = "../".repeat(*hops) + "other/file.txt";

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            format!("with {} parent hops", hops),
            &path,
            |bencher, path| {
                bencher.iter(|| base.resolve(path).unwrap());
            },
        );
    }
}

criterion_group!(
    resolve,
    parse_file_name,
    resolve_cached_file,
    resolve_relative_path
);
criterion_main!(resolve);
