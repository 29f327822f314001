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
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Component, Path, PathBuf},
};

use super::{EntryInfo, SegmentWriter, StreamStore};

/// A [`StreamStore`] backed by the local filesystem.
///
/// Store paths are resolved under `base`: `/queue/00` maps to
/// `base/queue/00`. Only normal path components are honoured, so a store
/// path can never name a file outside `base`.
///
/// # Durability
///
/// Writers are buffered. `flush()` hands data to the OS and `close()`
/// additionally calls `File::sync_all()`.
#[derive(Debug, Clone)]
pub struct FsStreamStore {
    base: PathBuf,
}

impl FsStreamStore {
    pub fn new(base: impl Into<PathBuf>) -> Self { Self { base: base.into() } }

    #[must_use]
    pub fn base(&self) -> &Path { &self.base }

    fn resolve(&self, path: &Path) -> PathBuf {
        let mut resolved = self.base.clone();
        resolved.extend(path.components().filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        }));
        resolved
    }
}

fn entry_info(name: String, meta: &fs::Metadata) -> EntryInfo {
    EntryInfo {
        name,
        is_dir: meta.is_dir(),
        len: if meta.is_dir() { 0 } else { meta.len() },
    }
}

impl StreamStore for FsStreamStore {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.resolve(path))?;
        if file.metadata()?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", path.display()),
            ));
        }
        Ok(Box::new(BufReader::new(file)))
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn SegmentWriter>> {
        let file = File::create(self.resolve(path))?;
        Ok(Box::new(FsSegmentWriter {
            inner: BufWriter::new(file),
        }))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path))
    }

    fn stat(&self, path: &Path) -> io::Result<EntryInfo> {
        let meta = fs::metadata(self.resolve(path))?;
        let name = path
            .file_name()
            .map_or_else(|| "/".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(entry_info(name, &meta))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<EntryInfo>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(entry_info(
                entry.file_name().to_string_lossy().into_owned(),
                &meta,
            ));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

struct FsSegmentWriter {
    inner: BufWriter<File>,
}

impl Write for FsSegmentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> { self.inner.write(buf) }

    fn flush(&mut self) -> io::Result<()> { self.inner.flush() }
}

impl SegmentWriter for FsSegmentWriter {
    fn close(self: Box<Self>) -> io::Result<()> {
        let file = self.inner.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn fs_paths_resolve_under_base() {
        let store = FsStreamStore::new("/data");
        assert_eq!(
            store.resolve(Path::new("/queue/00/01")),
            PathBuf::from("/data/queue/00/01")
        );
        assert_eq!(
            store.resolve(Path::new("../../etc/passwd")),
            PathBuf::from("/data/etc/passwd")
        );
        assert_eq!(store.resolve(Path::new("/")), PathBuf::from("/data"));
    }

    #[test]
    fn fs_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStreamStore::new(temp_dir.path());

        store.create_dir_all(Path::new("/q")).unwrap();
        let mut writer = store.create(Path::new("/q/seg")).unwrap();
        writer.write_all(b"persistent").unwrap();
        writer.close().unwrap();

        let mut contents = Vec::new();
        store
            .open_read(Path::new("/q/seg"))
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();
        assert_eq!(contents, b"persistent");
        assert!(temp_dir.path().join("q/seg").exists());
    }

    #[test]
    fn fs_missing_object_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStreamStore::new(temp_dir.path());
        let err = store.open_read(Path::new("/absent")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn fs_flushed_bytes_are_visible_to_open_reader() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStreamStore::new(temp_dir.path());

        let mut writer = store.create(Path::new("/tail")).unwrap();
        let mut reader = store.open_read(Path::new("/tail")).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);

        writer.write_all(b"abcd").unwrap();
        writer.flush().unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abcd");
        writer.close().unwrap();
    }

    #[test]
    fn fs_stat_and_read_dir() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStreamStore::new(temp_dir.path());

        store.create_dir_all(Path::new("/foo/bar")).unwrap();
        store.create(Path::new("/foo/01")).unwrap().close().unwrap();
        store.create(Path::new("/foo/00")).unwrap().close().unwrap();

        let info = store.stat(Path::new("/foo/bar")).unwrap();
        assert!(info.is_dir);
        assert_eq!(info.name, "bar");

        let names: Vec<_> = store
            .read_dir(Path::new("/foo"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["00", "01", "bar"]);
    }
}
