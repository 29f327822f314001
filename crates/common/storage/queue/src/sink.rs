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

//! Message writer (sink) for producing to the queue.
//!
//! The [`MessageSink`] appends framed messages to the current segment and
//! rotates to a new segment according to its [`RotationPolicy`]. Rotation
//! writes the end marker, closes the segment and opens the next sequence
//! number; a closed segment is never written again.
//!
//! Rotation is only evaluated when [`MessageSink::put_message`] is about to
//! append. A time-based limit therefore takes effect on the first write after
//! it expires, and an idle sink keeps its segment open. Segments are never
//! left empty by rotation.
//!
//! A failed frame write or a failed finalize poisons the sink: the segment
//! may end in a torn frame or lack its end marker, so appending after it or
//! recreating it would corrupt or destroy messages already written. Every
//! later call returns [`Error::Poisoned`](crate::Error::Poisoned). A failure
//! to open the next segment is not poisoning; nothing was written to it and
//! the next [`MessageSink::put_message`] retries.
//!
//! Only one sink may write to a given root at a time.

use std::{
    fmt,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use snafu::{ResultExt, ensure};
use tracing::{debug, error, info, warn};

use crate::{
    MessageSinkConfig, Result,
    compression::with_compression,
    config::RotationPolicy,
    error::{CloseSegmentSnafu, CreateDirSnafu, OpenSegmentSnafu, PoisonedSnafu, WriteFrameSnafu},
    frame::{encode_frame, write_end_marker},
    path::segment_path,
    store::{SegmentWriter, StreamStore},
};

/// A writer for appending messages to the queue.
pub struct MessageSink {
    store:         Arc<dyn StreamStore>,
    root:          PathBuf,
    policy:        RotationPolicy,
    /// Sequence number of the open segment, or of the next one to open.
    sequence:      u64,
    /// `None` only after a rotation whose new segment failed to open.
    writer:        Option<Box<dyn SegmentWriter>>,
    /// Messages appended to the open segment.
    unflushed:     u64,
    last_rotation: Instant,
    poisoned:      bool,
}

impl MessageSink {
    /// Creates the queue root if needed and opens segment 0 for writing.
    ///
    /// An existing segment 0 is truncated: a sink always starts a fresh
    /// queue.
    pub fn new(store: Arc<dyn StreamStore>, config: MessageSinkConfig) -> Result<Self> {
        let store = with_compression(store, config.compression);
        let root = config.path.clone();
        store
            .create_dir_all(&root)
            .context(CreateDirSnafu { path: root.clone() })?;

        let writer = open_segment(store.as_ref(), &root, 0)?;
        info!(
            root = %root.display(),
            compression = %config.compression,
            "opened message sink"
        );

        Ok(Self {
            store,
            root,
            policy: RotationPolicy::from(&config),
            sequence: 0,
            writer: Some(writer),
            unflushed: 0,
            last_rotation: Instant::now(),
            poisoned: false,
        })
    }

    /// Appends one message.
    ///
    /// If the open segment already holds messages and has reached a rotation
    /// limit, it is finalized first and the message starts the next segment.
    /// The frame is flushed through the store before returning so that a
    /// live source can read it.
    pub fn put_message(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_usable()?;
        let frame = encode_frame(payload)?;

        if self.writer.is_some()
            && self.unflushed > 0
            && self
                .policy
                .should_rotate(self.unflushed, self.last_rotation.elapsed())
        {
            self.rotate()?;
        }

        let sequence = self.sequence;
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => {
                let writer = open_segment(self.store.as_ref(), &self.root, sequence)?;
                self.last_rotation = Instant::now();
                self.writer.insert(writer)
            }
        };
        let written = writer
            .write_all(&frame)
            .and_then(|()| writer.flush())
            .context(WriteFrameSnafu { sequence });
        self.poison_on_err(written)?;
        self.unflushed += 1;
        Ok(())
    }

    /// Finalizes the open segment. Consumes the sink; nothing can be written
    /// after this.
    pub fn close(mut self) -> Result<()> {
        self.ensure_usable()?;
        let unflushed = self.unflushed;
        self.finish_segment()?;
        debug!(
            root = %self.root.display(),
            last_sequence = self.sequence.saturating_sub(1),
            unflushed,
            "closed message sink"
        );
        Ok(())
    }

    /// Sequence number of the segment currently being written.
    #[must_use]
    pub const fn sequence(&self) -> u64 { self.sequence }

    /// Messages written to the current segment so far.
    #[must_use]
    pub const fn unflushed_messages(&self) -> u64 { self.unflushed }

    #[must_use]
    pub fn root(&self) -> &Path { &self.root }

    /// Whether an earlier write failure made the sink unusable.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool { self.poisoned }

    fn ensure_usable(&self) -> Result<()> {
        ensure!(
            !self.poisoned,
            PoisonedSnafu {
                sequence: self.sequence,
            }
        );
        Ok(())
    }

    /// Drops the writer and refuses further work if `result` is an error.
    fn poison_on_err<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!(
                root = %self.root.display(),
                sequence = self.sequence,
                error = %e,
                "segment write failed; sink poisoned"
            );
            self.writer = None;
            self.poisoned = true;
        }
        result
    }

    fn rotate(&mut self) -> Result<()> {
        let closed = self.sequence;
        let messages = self.unflushed;
        self.finish_segment()?;

        let writer = open_segment(self.store.as_ref(), &self.root, self.sequence)?;
        self.writer = Some(writer);
        self.last_rotation = Instant::now();
        debug!(closed, messages, next = self.sequence, "rotated segment");
        Ok(())
    }

    /// Writes the end marker and closes the open segment. Bookkeeping only
    /// advances once the close succeeded; any failure poisons the sink.
    fn finish_segment(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        let sequence = self.sequence;

        let finished = write_end_marker(&mut writer)
            .context(WriteFrameSnafu { sequence })
            .and_then(|()| writer.close().context(CloseSegmentSnafu { sequence }));
        self.poison_on_err(finished)?;

        self.sequence += 1;
        self.unflushed = 0;
        Ok(())
    }
}

impl Drop for MessageSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            warn!(
                root = %self.root.display(),
                sequence = self.sequence,
                "message sink dropped without close; segment has no end marker"
            );
        }
    }
}

impl fmt::Debug for MessageSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSink")
            .field("root", &self.root)
            .field("sequence", &self.sequence)
            .field("open", &self.writer.is_some())
            .field("unflushed", &self.unflushed)
            .field("poisoned", &self.poisoned)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn open_segment(store: &dyn StreamStore, root: &Path, sequence: u64) -> Result<Box<dyn SegmentWriter>> {
    let path = segment_path(root, sequence)?;
    if let Some(parent) = path.parent() {
        store
            .create_dir_all(parent)
            .context(CreateDirSnafu { path: parent })?;
    }
    store.create(&path).context(OpenSegmentSnafu { path })
}
