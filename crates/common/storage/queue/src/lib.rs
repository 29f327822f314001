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

//! Durable append-only message queue over a hierarchical byte store.
//!
//! A [`MessageSink`] appends length-prefixed messages to numbered segment
//! objects and rotates to a new segment by message count or age. A
//! [`MessageSource`] replays every segment from sequence 0 and then keeps
//! polling for new data until its [`StopSignal`] fires.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use freezer_queue::{
//!     MessageSink, MessageSinkConfig, MessageSource, MessageSourceConfig, StopSignal,
//!     store::MemStreamStore,
//! };
//!
//! # async fn run() -> freezer_queue::Result<()> {
//! let store = Arc::new(MemStreamStore::new());
//!
//! let mut sink = MessageSink::new(store.clone(), MessageSinkConfig::builder().path("/q").build())?;
//! sink.put_message(b"hello")?;
//! sink.close()?;
//!
//! let signal = StopSignal::with_timeout(std::time::Duration::from_secs(1));
//! let mut source = MessageSource::new(store, MessageSourceConfig::builder().path("/q").build());
//! source
//!     .consume_messages(&signal, |payload| async move {
//!         println!("{payload:?}");
//!         Ok(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod config;
pub mod error;
pub mod frame;
pub mod path;
pub mod signal;
pub mod sink;
pub mod source;
pub mod store;

pub use compression::Compression;
pub use config::{MessageSinkConfig, MessageSourceConfig};
pub use error::{BoxError, Error, Result};
pub use signal::{StopReason, StopSignal};
pub use sink::MessageSink;
pub use source::{HandlerResult, MessageSource};
