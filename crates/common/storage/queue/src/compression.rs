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

//! Transparent segment compression.
//!
//! Compression is a [`StreamStore`] decorator: the sink and source never see
//! compressed bytes. Both sides must be configured with the same
//! [`Compression`].
//!
//! ## Tailing compressed segments
//!
//! Every `flush` on a zstd writer emits a complete zstd block, so a reader can
//! decode everything written so far without waiting for the frame epilogue
//! that `close` writes. The read side decodes incrementally and reports
//! "no bytes yet" when the compressed stream stops mid-frame, just like an
//! uncompressed live reader.

use std::{
    io::{self, Read, Write},
    path::Path,
    str::FromStr,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use zstd::stream::raw::{self, Operation};

use crate::store::{EntryInfo, SegmentWriter, StreamStore};

/// zstd compression level for segment writers.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

const INPUT_BUFFER_SIZE: usize = 32 * 1024;

/// Stream transform applied to every segment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Segments are stored as written.
    #[default]
    #[display("none")]
    None,
    /// Segments are zstd streams.
    #[display("zstd")]
    Zstd,
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "zstd" => Ok(Self::Zstd),
            other => Err(format!("unknown compression type: {other}")),
        }
    }
}

/// Wraps `store` with the requested compression.
pub fn with_compression(store: Arc<dyn StreamStore>, compression: Compression) -> Arc<dyn StreamStore> {
    match compression {
        Compression::None => store,
        Compression::Zstd => Arc::new(ZstdStreamStore::new(store)),
    }
}

/// Compresses written objects and decompresses read objects with zstd.
/// Directory operations pass through untouched.
#[derive(Debug, Clone)]
pub struct ZstdStreamStore<S> {
    inner: S,
}

impl<S> ZstdStreamStore<S> {
    pub const fn new(inner: S) -> Self { Self { inner } }
}

impl<S: StreamStore> StreamStore for ZstdStreamStore<S> {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let reader = self.inner.open_read(path)?;
        Ok(Box::new(TailingDecoder::new(reader)?))
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn SegmentWriter>> {
        let writer = self.inner.create(path)?;
        let encoder = zstd::stream::write::Encoder::new(writer, DEFAULT_ZSTD_LEVEL)?;
        Ok(Box::new(ZstdSegmentWriter { encoder }))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> { self.inner.create_dir_all(path) }

    fn stat(&self, path: &Path) -> io::Result<EntryInfo> { self.inner.stat(path) }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<EntryInfo>> { self.inner.read_dir(path) }
}

struct ZstdSegmentWriter {
    encoder: zstd::stream::write::Encoder<'static, Box<dyn SegmentWriter>>,
}

impl Write for ZstdSegmentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> { self.encoder.write(buf) }

    fn flush(&mut self) -> io::Result<()> { self.encoder.flush() }
}

impl SegmentWriter for ZstdSegmentWriter {
    fn close(self: Box<Self>) -> io::Result<()> {
        let inner = self.encoder.finish()?;
        inner.close()
    }
}

/// Incremental zstd decoder that tolerates a stream which is still growing.
struct TailingDecoder<R> {
    inner:   R,
    decoder: raw::Decoder<'static>,
    input:   Box<[u8]>,
    pos:     usize,
    end:     usize,
}

impl<R: Read> TailingDecoder<R> {
    fn new(inner: R) -> io::Result<Self> {
        Ok(Self {
            inner,
            decoder: raw::Decoder::new()?,
            input: vec![0u8; INPUT_BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            end: 0,
        })
    }
}

impl<R: Read> Read for TailingDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let mut drained = false;
            if self.pos == self.end {
                self.pos = 0;
                self.end = self.inner.read(&mut self.input)?;
                drained = self.end == 0;
            }

            let status = self
                .decoder
                .run_on_buffers(&self.input[self.pos..self.end], buf)?;
            self.pos += status.bytes_read;

            if status.bytes_written > 0 {
                return Ok(status.bytes_written);
            }
            if drained {
                return Ok(0);
            }
        }
    }
}
