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

//! Process-wide `tracing` setup.
//!
//! Libraries in this workspace only emit events through the `tracing`
//! macros. Binaries call [`init_global_logging`] once at startup and tests
//! call [`init_default_ut_logging`].

use std::{
    env,
    io::IsTerminal,
    sync::{Mutex, Once},
};

use bon::Builder;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Layer, Registry, filter, layer::SubscriberExt};

/// Deserializes a string, treating the empty string as `T::default()`.
///
/// # Errors
/// Returns an error if the non-empty string is not a valid `T`.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        return Ok(T::default());
    }
    T::deserialize(de::value::StrDeserializer::new(&s))
        .map_err(|e: de::value::Error| de::Error::custom(format!("invalid value {s:?}: {e}")))
}

/// Directory used for log files when a caller asks for file logging without
/// naming one.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Filter applied when neither [`LoggingOptions::level`] nor `RUST_LOG` is
/// set.
const DEFAULT_LOG_TARGETS: &str = "info";

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for hourly rotated log files. Empty disables file logging.
    #[default = ""]
    #[builder(default, into)]
    pub dir: String,

    /// Filter directives such as `"info"` or `"info,freezer_queue=trace"`.
    /// Falls back to `RUST_LOG`, then to `info`.
    #[builder(into)]
    pub level: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Rotated files kept per log stream.
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Also write to stdout. When stdout carries program output the caller
    /// should turn this off or route output elsewhere.
    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,
}

/// Log line format.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event.
    #[display("json")]
    Json,
    /// Human-readable lines.
    #[default]
    #[display("text")]
    Text,
}

static GLOBAL_UT_LOG_GUARD: Lazy<Mutex<Option<Vec<WorkerGuard>>>> = Lazy::new(|| Mutex::new(None));

/// Logging for tests. Safe to call from every test; only the first call
/// does anything.
///
/// Logs go to files under `UNITTEST_LOG_DIR` (default
/// `/tmp/__unittest_logs`) filtered by `UNITTEST_LOG_LEVEL` (default
/// `debug`).
pub fn init_default_ut_logging() {
    static START: Once = Once::new();

    START.call_once(|| {
        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());
        let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());

        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            append_stdout: false,
            ..Default::default()
        };
        let guards = init_global_logging("unittest", &opts);
        if let Ok(mut slot) = GLOBAL_UT_LOG_GUARD.lock() {
            *slot = Some(guards);
        }

        tracing::info!("logs dir = {}", dir);
    });
}

/// Installs the global subscriber. Only the first call in a process has an
/// effect; later calls return no guards.
///
/// The returned guards flush the non-blocking writers when dropped, so keep
/// them alive for as long as the program logs.
///
/// Layers, each enabled by `opts`:
///
/// - stdout, if `append_stdout`
/// - `<dir>/<app_name>.<hour>` with everything that passes the filter
/// - `<dir>/<app_name>-err.<hour>` with errors only
///
/// # Panics
///
/// On an unparsable level filter, an unusable log directory, or when another
/// global subscriber was already installed. Logging problems should stop a
/// process at startup rather than leave it running blind.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = vec![];

    START.call_once(|| {
        // A second bridge is harmless; ignore it.
        let _ = LogTracer::init();

        let stdout_layer = opts.append_stdout.then(|| {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            guards.push(guard);
            let ansi = std::io::stdout().is_terminal();
            match opts.log_format {
                LogFormat::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(ansi)
                    .with_current_span(true)
                    .with_span_list(true)
                    .boxed(),
                LogFormat::Text => tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(ansi)
                    .boxed(),
            }
        });

        let file_layer = (!opts.dir.is_empty()).then(|| {
            let (writer, guard) =
                tracing_appender::non_blocking(rolling_appender(opts, app_name.to_string()));
            guards.push(guard);
            match opts.log_format {
                LogFormat::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_span_list(true)
                    .boxed(),
                LogFormat::Text => tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .boxed(),
            }
        });

        let err_file_layer = (!opts.dir.is_empty()).then(|| {
            let (writer, guard) =
                tracing_appender::non_blocking(rolling_appender(opts, format!("{app_name}-err")));
            guards.push(guard);
            match opts.log_format {
                LogFormat::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(filter::LevelFilter::ERROR)
                    .boxed(),
                LogFormat::Text => tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(filter::LevelFilter::ERROR)
                    .boxed(),
            }
        });

        let targets = resolve_targets(opts.level.as_deref());
        let subscriber = Registry::default()
            .with(targets)
            .with(stdout_layer)
            .with(file_layer)
            .with(err_file_layer);

        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            panic!("error setting global tracing subscriber: {e}");
        }
    });

    guards
}

/// Parses the effective filter: explicit level, then `RUST_LOG`, then the
/// default.
fn resolve_targets(level: Option<&str>) -> filter::Targets {
    let from_env = env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = level
        .or(from_env.as_deref())
        .unwrap_or(DEFAULT_LOG_TARGETS);
    directives
        .parse::<filter::Targets>()
        .unwrap_or_else(|e| panic!("error parsing log level string {directives:?}: {e}"))
}

fn rolling_appender(opts: &LoggingOptions, prefix: String) -> RollingFileAppender {
    RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(opts.max_log_files)
        .build(&opts.dir)
        .unwrap_or_else(|e| {
            panic!(
                "initializing rolling file appender at {} failed: {e}",
                opts.dir
            )
        })
}
