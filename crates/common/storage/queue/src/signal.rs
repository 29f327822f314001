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

//! Cooperative cancellation for consumers.
//!
//! A [`StopSignal`] wraps a [`CancellationToken`] and remembers *why* it
//! fired. Cancellation and an elapsed deadline are graceful stops; an abort
//! carries a reason that the consumer surfaces as an error.

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`StopSignal`] fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit [`StopSignal::cancel`] or a cancelled parent token.
    Cancelled,
    /// The signal's deadline passed.
    DeadlineExceeded,
    /// [`StopSignal::abort`] was called.
    Aborted(String),
}

impl StopReason {
    /// Graceful reasons end consumption without an error.
    #[must_use]
    pub const fn is_graceful(&self) -> bool { matches!(self, Self::Cancelled | Self::DeadlineExceeded) }
}

/// Cloneable stop signal shared between a consumer and whoever controls it.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token:    CancellationToken,
    reason:   Arc<OnceLock<StopReason>>,
    deadline: Option<Instant>,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// A signal that stops with [`StopReason::DeadlineExceeded`] once
    /// `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self { Self::with_deadline(Instant::now() + timeout) }

    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    /// Follows an externally owned token. Cancelling that token counts as
    /// [`StopReason::Cancelled`].
    #[must_use]
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    /// Requests a graceful stop.
    pub fn cancel(&self) { self.fire(StopReason::Cancelled); }

    /// Requests a stop that the consumer reports as an error.
    pub fn abort(&self, reason: impl Into<String>) { self.fire(StopReason::Aborted(reason.into())); }

    /// Whether the signal has fired, including an elapsed deadline.
    #[must_use]
    pub fn is_stopped(&self) -> bool { self.reason().is_some() }

    /// The reason the signal fired, if it has.
    #[must_use]
    pub fn reason(&self) -> Option<StopReason> {
        if let Some(reason) = self.reason.get() {
            return Some(reason.clone());
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.fire(StopReason::DeadlineExceeded);
            return self.reason.get().cloned();
        }
        self.token.is_cancelled().then_some(StopReason::Cancelled)
    }

    /// Waits until the signal fires and returns why.
    pub async fn stopped(&self) -> StopReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => self.fire(StopReason::DeadlineExceeded),
                }
            }
            None => self.token.cancelled().await,
        }
        self.reason.get().cloned().unwrap_or(StopReason::Cancelled)
    }

    /// The underlying token, e.g. to hand to tasks that only need to know
    /// *that* the consumer is stopping.
    #[must_use]
    pub fn token(&self) -> CancellationToken { self.token.clone() }

    /// First reason wins.
    fn fire(&self, reason: StopReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }
}
