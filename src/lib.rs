// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # superpmi
//!
//! Capture and replay of JIT compilations, independent of a live runtime.
//!
//! A *method context* is the complete record of every JIT-EE interface call made while one
//! method was compiled: the questions the JIT asked, the answers the execution engine gave, and
//! (optionally) what the JIT produced. This crate records method contexts through a transparent
//! recording shim, serializes them into a compact self-describing binary format, and answers the
//! same questions again later from the recording alone.
//!
//! ## Features
//!
//! - **Lightweight maps** - append-only key/value and dense stores with content-addressed buffers
//! - **Recording shim** - forwards every EE call to the real implementation and records it
//! - **Replay** - a fake EE that answers from a recorded context and flags unexpected queries
//! - **Identity hashing** - MD5 fingerprints for dedup of large corpora
//! - **Archives** - `.mch` concatenations with `.mct` tables of contents and `.mcl` range lists
//!
//! ## Quick Start
//!
//! ```rust
//! use superpmi::prelude::*;
//!
//! let mut mc = MethodContext::new();
//! let mut token = ResolvedToken::new(
//!     ContextHandle(0x1000),
//!     ModuleHandle(0x2000),
//!     Token::new(0x0600_0001),
//!     CorInfoTokenKind::METHOD,
//! );
//! token.h_method = MethodHandle(0x3000);
//! mc.rec_resolve_token(&token, 0);
//!
//! let bytes = mc.to_bytes()?;
//! let replayed = MethodContext::from_bytes(&bytes)?;
//!
//! let mut query = ResolvedToken::new(
//!     ContextHandle(0x1000),
//!     ModuleHandle(0x2000),
//!     Token::new(0x0600_0001),
//!     CorInfoTokenKind::METHOD,
//! );
//! replayed.rep_resolve_token(&mut query)?;
//! assert_eq!(query.h_method, MethodHandle(0x3000));
//! # Ok::<(), superpmi::Error>(())
//! ```
//!
//! ## Archive handling
//!
//! ```rust,no_run
//! use superpmi::archive::{self, Archive, MergeOptions, TableOfContents};
//!
//! let stats = archive::merge("all.mch", "captures/*.mc", &MergeOptions::default().dedup(true))?;
//! println!("kept {} of {} contexts", stats.written, stats.read);
//!
//! let archive = Archive::open("all.mch")?;
//! let toc = TableOfContents::build(&archive)?;
//! toc.write(archive::toc_path_for("all.mch"))?;
//! # Ok::<(), superpmi::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. [`Error::kind`] classifies every error into the
//! categories operators care about; most importantly [`ErrorKind::NotRecorded`] separates
//! "this query was never captured" from "the recorded answer is legitimately empty".

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Raw byte access: backends, little-endian primitives, read and write cursors.
///
/// Archives are read through a [`file::Backend`] (memory-mapped [`file::Physical`] or in-memory
/// [`file::Memory`]) and parsed with a bounds-checked [`file::Parser`]; records are produced
/// with a growable [`file::Writer`].
pub mod file;

/// Lightweight maps, the storage behind every recorded JIT-EE query.
pub mod lwm;

/// The JIT-EE data model: handles, tokens, enums, live query structures and the interface traits.
pub mod corinfo;

/// Method contexts: recording, replay, serialization, compile results and identity.
pub mod methodcontext;

/// The capture side: recording shim, replay interface, capture sessions and configuration.
pub mod shim;

/// Archive tooling over concatenated method contexts.
///
/// # Key Components
///
/// - [`archive::Archive`] - sequential access to an `.mch` file
/// - [`archive::TableOfContents`] - random access index stored as `.mct`
/// - [`archive::MclList`] - `.mcl` range lists for copy/strip/fracture
/// - [`archive::merge`], [`archive::concat`], [`archive::fracture`], [`archive::remove_dup`]
/// - [`archive::integrity_check`], [`archive::stat`], [`archive::dump`]
pub mod archive;

/// Convenient re-exports of the most commonly used types and traits.
///
/// ```rust
/// use superpmi::prelude::*;
///
/// let mc = MethodContext::new();
/// assert!(mc.compile_result().is_none());
/// ```
pub mod prelude;

/// `superpmi` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `superpmi` Error type
///
/// The main error type for all operations in this crate. See [`ErrorKind`] for the coarse
/// classification used by replay drivers and tooling.
pub use error::{Error, ErrorKind};

pub use archive::{Archive, MclList, TableOfContents};
pub use file::{Parser, Writer};
pub use methodcontext::{CompileResult, MethodContext, MethodContextHash};
