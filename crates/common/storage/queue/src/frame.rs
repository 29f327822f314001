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

//! Message framing within a segment.
//!
//! ## On-Disk Format
//!
//! ```text
//! ┌─────────────────┬──────────────────────┐
//! │  Length (4B)    │   Payload (variable) │   ... repeated ...
//! │  little-endian  │   raw bytes          │
//! └─────────────────┴──────────────────────┘
//! ┌─────────────────┐
//! │  0u32 (4B)      │   end marker, nothing may follow
//! └─────────────────┘
//! ```
//!
//! A zero length is reserved for the end marker, so empty messages cannot be
//! framed.

use std::io::{self, ErrorKind, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use snafu::{OptionExt, ResultExt, ensure};

use crate::{
    Result,
    error::{EmptyPayloadSnafu, FrameTooLargeSnafu, ReadFrameSnafu, ShortReadSnafu, TrailingDataSnafu},
};

/// Size of the length prefix in bytes (4 bytes = u32).
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// The zero-length frame that terminates a segment.
pub const END_MARKER: [u8; LENGTH_PREFIX_SIZE] = [0; LENGTH_PREFIX_SIZE];

/// Encodes `payload` as a single length-prefixed frame.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    ensure!(!payload.is_empty(), EmptyPayloadSnafu);
    let len = u32::try_from(payload.len()).ok().context(FrameTooLargeSnafu {
        len: payload.len(),
    })?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32_le(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Writes the end marker.
pub fn write_end_marker<W: Write + ?Sized>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&END_MARKER)
}

/// One decoding step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete message.
    Message(Bytes),
    /// The end marker was read and nothing follows it.
    EndOfSegment,
    /// No bytes are available at a frame boundary. The segment is still
    /// being written; try again later.
    Pending,
}

/// Decodes frames from a segment stream.
pub struct FrameReader<R> {
    inner:    R,
    sequence: u64,
}

impl<R: Read> FrameReader<R> {
    /// `sequence` is only used to give errors context.
    pub const fn new(inner: R, sequence: u64) -> Self { Self { inner, sequence } }

    /// Reads the next frame.
    ///
    /// A partially written frame is a [`ShortRead`](crate::Error::ShortRead)
    /// error and bytes after the end marker are a
    /// [`TrailingData`](crate::Error::TrailingData) error. Neither can be
    /// recovered from.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
        let read = self.read_full(&mut len_buf)?;
        if read == 0 {
            return Ok(Frame::Pending);
        }
        ensure!(
            read == LENGTH_PREFIX_SIZE,
            ShortReadSnafu {
                sequence: self.sequence,
                part:     "length prefix",
                expected: LENGTH_PREFIX_SIZE,
                actual:   read,
            }
        );

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 {
            return self.expect_end();
        }

        // A corrupt prefix may claim up to 4 GiB; grow only with bytes read.
        let mut payload = Vec::new();
        let read = self.read_exact_or_less(len, &mut payload)?;
        ensure!(
            read == len,
            ShortReadSnafu {
                sequence: self.sequence,
                part:     "payload",
                expected: len,
                actual:   read,
            }
        );
        Ok(Frame::Message(Bytes::from(payload)))
    }

    fn expect_end(&mut self) -> Result<Frame> {
        let mut probe = [0u8; 1];
        let read = self.read_full(&mut probe)?;
        ensure!(
            read == 0,
            TrailingDataSnafu {
                sequence: self.sequence,
            }
        );
        Ok(Frame::EndOfSegment)
    }

    /// Appends up to `len` bytes to `buf`, stopping early once the stream
    /// reports no more data.
    fn read_exact_or_less(&mut self, len: usize, buf: &mut Vec<u8>) -> Result<usize> {
        (&mut self.inner)
            .take(len as u64)
            .read_to_end(buf)
            .context(ReadFrameSnafu {
                sequence: self.sequence,
            })
    }

    /// Fills `buf` until it is full or the stream reports no more data.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(e).context(ReadFrameSnafu {
                        sequence: self.sequence,
                    });
                }
            }
        }
        Ok(filled)
    }
}
