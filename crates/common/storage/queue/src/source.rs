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

//! Message reader (source) for tailing the queue.
//!
//! A [`MessageSource`] starts at segment 0 and alternates between two
//! phases:
//!
//! - **acquisition**: open the segment at the current sequence number. If it
//!   does not exist yet, wait one poll period (or until the stop signal
//!   fires) and try again.
//! - **drain**: decode frames and hand each payload to the handler. The end
//!   marker moves on to the next sequence number. Running out of bytes at a
//!   frame boundary means the sink is still writing this segment, so the
//!   source waits and keeps reading from the same handle.
//!
//! There is no terminal success state: consumption ends when the signal
//! fires, the handler fails, or a segment turns out to be corrupt.

use std::{
    fmt,
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use snafu::ResultExt;
use tracing::{debug, error, trace};

use crate::{
    MessageSourceConfig, Result,
    compression::with_compression,
    config::DEFAULT_POLL_PERIOD,
    error::{AbortedSnafu, BoxError, HandlerSnafu, OpenReadSnafu},
    frame::{Frame, FrameReader},
    path::segment_path,
    signal::{StopReason, StopSignal},
    store::StreamStore,
};

/// What a message handler returns. An error stops consumption.
pub type HandlerResult = std::result::Result<(), BoxError>;

/// A reader that replays every message of a queue in write order.
pub struct MessageSource {
    store:       Arc<dyn StreamStore>,
    root:        PathBuf,
    poll_period: Duration,
    sequence:    u64,
}

impl MessageSource {
    pub fn new(store: Arc<dyn StreamStore>, config: MessageSourceConfig) -> Self {
        let poll_period = if config.poll_period.is_zero() {
            DEFAULT_POLL_PERIOD
        } else {
            config.poll_period
        };
        Self {
            store: with_compression(store, config.compression),
            root: config.path,
            poll_period,
            sequence: 0,
        }
    }

    /// Sequence number of the segment being read or waited for.
    #[must_use]
    pub const fn sequence(&self) -> u64 { self.sequence }

    #[must_use]
    pub const fn poll_period(&self) -> Duration { self.poll_period }

    #[must_use]
    pub fn root(&self) -> &Path { &self.root }

    /// Delivers every message to `handler` until `signal` fires.
    ///
    /// Returns `Ok(())` when the signal is cancelled or its deadline passes,
    /// and [`Error::Aborted`](crate::Error::Aborted) when it is aborted. A
    /// handler error stops consumption immediately and is returned as
    /// [`Error::Handler`](crate::Error::Handler); the failed message is not
    /// retried.
    ///
    /// The signal is only observed while waiting for data. Once a segment
    /// has bytes available they are delivered, so a handler that stops the
    /// signal still sees the rest of what is already readable.
    pub async fn consume_messages<F, Fut>(&mut self, signal: &StopSignal, mut handler: F) -> Result<()>
    where
        F: FnMut(Bytes) -> Fut,
        Fut: Future<Output = HandlerResult>,
    {
        loop {
            let Some(mut frames) = self.acquire(signal).await? else {
                return Ok(());
            };

            loop {
                let frame = frames.read_frame().inspect_err(|e| {
                    if e.is_corruption() {
                        error!(sequence = self.sequence, error = %e, "corrupt segment");
                    }
                })?;

                match frame {
                    Frame::Message(payload) => {
                        handler(payload).await.context(HandlerSnafu {
                            sequence: self.sequence,
                        })?;
                    }
                    Frame::EndOfSegment => {
                        debug!(finished = self.sequence, "segment exhausted");
                        self.sequence += 1;
                        break;
                    }
                    Frame::Pending => {
                        trace!(sequence = self.sequence, "waiting for more data");
                        if !self.wait(signal).await? {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Opens the current segment, waiting for it to appear. `None` means the
    /// signal stopped gracefully first.
    async fn acquire(&self, signal: &StopSignal) -> Result<Option<FrameReader<Box<dyn io::Read + Send>>>> {
        let path = segment_path(&self.root, self.sequence)?;
        loop {
            match self.store.open_read(&path) {
                Ok(reader) => {
                    debug!(sequence = self.sequence, path = %path.display(), "reading segment");
                    return Ok(Some(FrameReader::new(reader, self.sequence)));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    trace!(sequence = self.sequence, "segment not there yet");
                    if !self.wait(signal).await? {
                        return Ok(None);
                    }
                }
                Err(e) => return Err(e).context(OpenReadSnafu { path }),
            }
        }
    }

    /// Sleeps one poll period. Returns `false` if the signal stopped
    /// gracefully instead.
    async fn wait(&self, signal: &StopSignal) -> Result<bool> {
        tokio::select! {
            () = tokio::time::sleep(self.poll_period) => Ok(true),
            reason = signal.stopped() => match reason {
                StopReason::Cancelled | StopReason::DeadlineExceeded => {
                    debug!(sequence = self.sequence, ?reason, "consumer stopped");
                    Ok(false)
                }
                StopReason::Aborted(reason) => AbortedSnafu { reason }.fail(),
            },
        }
    }
}

impl fmt::Debug for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSource")
            .field("root", &self.root)
            .field("poll_period", &self.poll_period)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}
