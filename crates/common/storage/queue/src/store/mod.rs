// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hierarchical byte-store abstraction.
//!
//! The queue never touches a filesystem directly. Everything goes through a
//! [`StreamStore`], a small file-system-like contract:
//! - open an object for (live) reading
//! - create an object for appending
//! - create directories, stat entries and list directories
//!
//! Stores speak plain [`std::io::Result`]. A missing object must be reported
//! as [`io::ErrorKind::NotFound`] so the source can tell "not written yet"
//! apart from real failures.
//!
//! ## Live reads
//!
//! Readers returned by [`StreamStore::open_read`] observe bytes appended
//! after they were opened. A `read` returning `0` means "nothing more right
//! now"; a later call may return more data once the writer appends it.

mod fs;
mod memory;

use std::{
    io::{self, Read, Write},
    path::Path,
};

pub use fs::FsStreamStore;
pub use memory::MemStreamStore;

/// Name and kind of a store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Last path component (`"/"` for the store root).
    pub name:   String,
    pub is_dir: bool,
    /// Object size in bytes, `0` for directories.
    pub len:    u64,
}

/// Write handle for a single object.
pub trait SegmentWriter: Write + Send {
    /// Finalizes the object and releases the handle.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// A file-system-like backend holding queue segments.
pub trait StreamStore: Send + Sync {
    /// Opens an existing object for reading.
    ///
    /// Returns an error of kind [`io::ErrorKind::NotFound`] if the object
    /// does not exist.
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Creates (or truncates) an object for writing. The parent directory
    /// must already exist.
    fn create(&self, path: &Path) -> io::Result<Box<dyn SegmentWriter>>;

    /// Creates a directory and all missing ancestors.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn stat(&self, path: &Path) -> io::Result<EntryInfo>;

    /// Lists the direct children of a directory, sorted by name.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<EntryInfo>>;
}

impl<S: StreamStore + ?Sized> StreamStore for std::sync::Arc<S> {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        (**self).open_read(path)
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn SegmentWriter>> { (**self).create(path) }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> { (**self).create_dir_all(path) }

    fn stat(&self, path: &Path) -> io::Result<EntryInfo> { (**self).stat(path) }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<EntryInfo>> { (**self).read_dir(path) }
}
