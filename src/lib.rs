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

//! `omni-vfs` is a library for accessing files in different kinds of storage through one API.
//!
//! This crate resolves URIs like `ram:///docs/report.txt` into file handles that read, write,
//! copy, move, and traverse files the same way regardless of where the files live. Storage
//! backends are small traits that are easy to implement, and this library builds on top of them
//! to provide the following features:
//! - One URI grammar, with percent escapes, relative name resolution, and credential masking
//! - Shared file handles, so every resolution of a name sees the same state
//! - Pluggable caching of resolved files, from unbounded to LRU, expiring, and liveness-based
//! - Capability negotiation, so unsupported operations fail before reaching the backend
//! - Change listeners for file creation, deletion, and modification
//!
//! A [`VfsContext`] is the entry point. It maps URI schemes to file providers and resolves URIs
//! through them. The following providers are provided out of the box:
//! - `RamFileProvider` keeps files in memory.
//! - `LocalFileProvider` exposes a directory in the local file system.
//!
//! # Examples
//! ```
//! use omni_vfs::provider::RamFileProvider;
//! use omni_vfs::{ContextConfig, VfsContext};
//!
//! fn main() -> omni_vfs::Result<()> {
//!     // Open a context and register a provider for the `ram` scheme.
//!     let context = VfsContext::new(ContextConfig::default());
//!     context.register_provider("ram", RamFileProvider::new())?;
//!
//!     // Resolve a file and write to it. Missing ancestor folders are
//!     // created when the content is committed.
//!     let file = context.resolve("ram:///docs/report.txt")?;
//!     file.content().write_all(b"quarterly numbers")?;
//!
//!     // Resolve a name relative to another file and read it back.
//!     let docs = context.resolve("ram:///docs")?;
//!     let found = docs.resolve("report.txt")?;
//!     assert_eq!(found.content().read_to_vec()?, b"quarterly numbers");
//!
//!     // Folders know their children.
//!     let names = docs
//!         .children()?
//!         .iter()
//!         .map(|child| child.name().base_name().to_owned())
//!         .collect::<Vec<_>>();
//!     assert_eq!(names, vec![String::from("report.txt")]);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Features
//! Some functionality is gated behind cargo features:
//!
//! Type | Cargo Feature
//! --- | ---
//! `LocalFileProvider` | `provider-local`
//!
//! To use one of these types, you must enable the corresponding feature in your `Cargo.toml`.

#![allow(dead_code)]

pub use uuid;

pub use error::{Error, ErrorCode, Result, UriErrorKind};
pub use manager::{CacheStrategy, ContextConfig, FileHandle, VfsContext};

mod id;

mod error;
mod manager;

pub mod cache;
pub mod fs;
pub mod name;
pub mod provider;
