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

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Boxed error returned by message handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The queue root (or a segment's parent directory) could not be created.
    #[snafu(display("Failed to create directory {}", path.display()))]
    CreateDir {
        path:   PathBuf,
        source: io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// A segment could not be created for writing.
    #[snafu(display("Failed to open segment {} for writing", path.display()))]
    OpenSegment {
        path:   PathBuf,
        source: io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// A segment exists (or might) but could not be opened for reading.
    #[snafu(display("Failed to open segment {} for reading", path.display()))]
    OpenRead {
        path:   PathBuf,
        source: io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to write to segment {sequence}"))]
    WriteFrame {
        sequence: u64,
        source:   io::Error,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    #[snafu(display("Failed to close segment {sequence}"))]
    CloseSegment {
        sequence: u64,
        source:   io::Error,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    /// An earlier write or finalize failed and segment `sequence` may hold a
    /// torn frame or lack its end marker. The sink accepts nothing more.
    #[snafu(display("Sink is unusable after a failed write to segment {sequence}"))]
    Poisoned {
        sequence: u64,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    #[snafu(display("Failed to read from segment {sequence}"))]
    ReadFrame {
        sequence: u64,
        source:   io::Error,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    /// The segment ended in the middle of a frame.
    #[snafu(display(
        "Short read in segment {sequence}: expected {expected} bytes of {part}, got {actual}"
    ))]
    ShortRead {
        sequence: u64,
        part:     &'static str,
        expected: usize,
        actual:   usize,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    /// Bytes were found after the end marker of a segment.
    #[snafu(display("Segment {sequence} has data past its end marker"))]
    TrailingData {
        sequence: u64,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    /// A zero-length payload would be indistinguishable from the end marker.
    #[snafu(display("Refusing to append an empty message"))]
    EmptyPayload {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Message of {len} bytes exceeds the maximum frame size"))]
    FrameTooLarge {
        len: usize,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Sequence {sequence} does not fit the segment path scheme"))]
    SequenceOverflow {
        sequence: u64,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    /// The consumer callback rejected a message.
    #[snafu(display("Message handler failed in segment {sequence}"))]
    Handler {
        sequence: u64,
        source:   BoxError,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    /// Consumption was stopped for a reason other than cancel or deadline.
    #[snafu(display("Consumption aborted: {reason}"))]
    Aborted {
        reason: String,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}

impl Error {
    /// Returns `true` if the error means a segment violates the framing
    /// protocol. These are never recoverable by retrying.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::ShortRead { .. } | Self::TrailingData { .. })
    }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, Error>;
