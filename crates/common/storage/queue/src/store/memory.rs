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

use std::{
    collections::BTreeMap,
    io::{self, Read, Write},
    ops::Bound,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;

use super::{EntryInfo, SegmentWriter, StreamStore};

type SharedBytes = Arc<RwLock<Vec<u8>>>;

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(SharedBytes),
}

/// An in-memory [`StreamStore`].
///
/// Suitable for tests and ephemeral queues. Clones share the same tree, so a
/// sink and a source can be handed separate clones of one store.
///
/// Objects become visible as soon as they are created, and readers see
/// bytes appended after they were opened.
#[derive(Debug, Clone, Default)]
pub struct MemStreamStore {
    nodes: Arc<RwLock<BTreeMap<PathBuf, Node>>>,
}

impl MemStreamStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Returns a copy of an object's raw bytes, if it exists.
    #[must_use]
    pub fn object_bytes(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.nodes.read().get(&normalize(path.as_ref())) {
            Some(Node::File(data)) => Some(data.read().clone()),
            _ => None,
        }
    }

    /// Writes an object with the given contents, creating its parent
    /// directories. Replaces any existing object.
    pub fn put_object(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> io::Result<()> {
        let path = normalize(path.as_ref());
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent)?;
        }
        let mut writer = self.create(&path)?;
        writer.write_all(&data.into())?;
        writer.close()
    }
}

fn normalize(path: &Path) -> PathBuf { Path::new("/").join(path).components().collect() }

fn is_root(path: &Path) -> bool { path.parent().is_none() }

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| "/".to_string(), |name| name.to_string_lossy().into_owned())
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

fn not_a_directory(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotADirectory,
        format!("{} is not a directory", path.display()),
    )
}

fn is_a_directory(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::IsADirectory,
        format!("{} is a directory", path.display()),
    )
}

impl StreamStore for MemStreamStore {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let path = normalize(path);
        match self.nodes.read().get(&path) {
            Some(Node::File(data)) => Ok(Box::new(MemReader {
                data:     Arc::clone(data),
                position: 0,
            })),
            Some(Node::Dir) => Err(is_a_directory(&path)),
            None if is_root(&path) => Err(is_a_directory(&path)),
            None => Err(not_found(&path)),
        }
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn SegmentWriter>> {
        let path = normalize(path);
        let Some(parent) = path.parent() else {
            return Err(is_a_directory(&path));
        };

        let mut nodes = self.nodes.write();
        if !is_root(parent) && !matches!(nodes.get(parent), Some(Node::Dir)) {
            return Err(not_found(parent));
        }
        if matches!(nodes.get(&path), Some(Node::Dir)) {
            return Err(is_a_directory(&path));
        }

        let data = SharedBytes::default();
        nodes.insert(path, Node::File(Arc::clone(&data)));
        Ok(Box::new(MemWriter { data }))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        let mut nodes = self.nodes.write();

        let missing: Vec<&Path> = path
            .ancestors()
            .filter(|dir| !is_root(dir))
            .filter_map(|dir| match nodes.get(dir) {
                Some(Node::Dir) => None,
                Some(Node::File(_)) => Some(Err(not_a_directory(dir))),
                None => Some(Ok(dir)),
            })
            .collect::<io::Result<_>>()?;

        for dir in missing {
            nodes.insert(dir.to_path_buf(), Node::Dir);
        }
        Ok(())
    }

    fn stat(&self, path: &Path) -> io::Result<EntryInfo> {
        let path = normalize(path);
        if is_root(&path) {
            return Ok(EntryInfo {
                name:   entry_name(&path),
                is_dir: true,
                len:    0,
            });
        }

        match self.nodes.read().get(&path) {
            Some(Node::Dir) => Ok(EntryInfo {
                name:   entry_name(&path),
                is_dir: true,
                len:    0,
            }),
            Some(Node::File(data)) => Ok(EntryInfo {
                name:   entry_name(&path),
                is_dir: false,
                len:    data.read().len() as u64,
            }),
            None => Err(not_found(&path)),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<EntryInfo>> {
        let path = normalize(path);
        let nodes = self.nodes.read();

        match nodes.get(&path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(not_a_directory(&path)),
            None if is_root(&path) => {}
            None => return Err(not_found(&path)),
        }

        let entries = nodes
            .range::<PathBuf, _>((Bound::Excluded(&path), Bound::Unbounded))
            .take_while(|(child, _)| child.starts_with(&path))
            .filter(|(child, _)| child.parent() == Some(path.as_path()))
            .map(|(child, node)| EntryInfo {
                name:   entry_name(child),
                is_dir: matches!(node, Node::Dir),
                len:    match node {
                    Node::Dir => 0,
                    Node::File(data) => data.read().len() as u64,
                },
            })
            .collect();
        Ok(entries)
    }
}

/// Live reader over an in-memory object.
struct MemReader {
    data:     SharedBytes,
    position: usize,
}

impl Read for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.read();
        let available = data.get(self.position..).unwrap_or_default();
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}

struct MemWriter {
    data: SharedBytes,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.write().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl SegmentWriter for MemWriter {
    fn close(self: Box<Self>) -> io::Result<()> { Ok(()) }
}
