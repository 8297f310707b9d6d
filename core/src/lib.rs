// Copyright 2024 Kevin Ludwig
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

//! Decoder for Files-11 ODS-2 volume images.
//!
//! This crate is a pure in-memory library: it knows how to make sense of the
//! bytes of an ODS-2 disk image, but has no opinion about how those bytes
//! reach it or how the decoded filesystem is exposed to a kernel. A
//! `fuser`-based adaptor consuming this crate lives in the sibling `fuse`
//! crate.

pub mod cursor;
pub mod directory;
pub mod fileid;
pub mod header;
pub mod map;
pub mod time;
pub mod volume;

pub use cursor::ByteCursor;
pub use directory::{DirectoryEntry, DirectoryRecord};
pub use fileid::FileId;
pub use header::FileHeader;
pub use map::Extent;
pub use volume::Volume;

/// Every logical and virtual block on an ODS-2 volume is exactly this many
/// bytes; the format has no variant that changes it.
pub const BLOCK_SIZE: usize = 512;
