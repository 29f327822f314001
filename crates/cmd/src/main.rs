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
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use freezer_queue::{
    BoxError, Compression, MessageSink, MessageSource, StopSignal,
    path::{scan_segments, segment_path},
    store::{FsStreamStore, StreamStore},
};
use humantime_serde::re::humantime;
use snafu::{ResultExt, Whatever};
use tracing::{info, warn};

mod build_info;
mod settings;

use settings::FreezerSettings;

#[derive(Debug, Parser)]
#[clap(
    name = "freezer",
    about = "Append to and tail segmented message queues",
    author = build_info::AUTHOR,
    version = build_info::VERSION,
    long_version = build_info::LONG_VERSION
)]
struct Cli {
    /// TOML settings file. `FREEZER__*` environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the queue store.
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Produce(ProduceArgs),
    Consume(ConsumeArgs),
    Segments(SegmentsArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Appends one message per line of standard input and closes the queue at EOF.
Empty lines are skipped.
Examples:

printf 'a\nb\n' | freezer produce --path /events --max-unflushed-messages 100

")]
struct ProduceArgs {
    /// Queue root inside the store.
    #[arg(long)]
    path: Option<PathBuf>,

    /// Rotate after this many messages (0 disables).
    #[arg(long)]
    max_unflushed_messages: Option<u64>,

    /// Rotate once a segment is this old, e.g. `30s` (0 disables).
    #[arg(long, value_parser = humantime::parse_duration)]
    max_unflushed_time: Option<Duration>,

    /// `none` or `zstd`.
    #[arg(long)]
    compression: Option<Compression>,
}

impl ProduceArgs {
    fn run(self, mut settings: FreezerSettings) -> Result<(), Whatever> {
        if let Some(path) = self.path {
            settings.set_queue_path(path);
        }
        let mut config = settings.sink;
        if let Some(n) = self.max_unflushed_messages {
            config.max_unflushed_messages = n;
        }
        if let Some(age) = self.max_unflushed_time {
            config.max_unflushed_time = age;
        }
        if let Some(compression) = self.compression {
            config.compression = compression;
        }

        let store = open_store(&settings.store_dir);
        let mut sink = MessageSink::new(store, config).whatever_context("failed to open sink")?;

        let mut produced = 0u64;
        for line in io::stdin().lock().lines() {
            let line = line.whatever_context("failed to read stdin")?;
            if line.is_empty() {
                continue;
            }
            sink.put_message(line.as_bytes())
                .whatever_context("failed to append message")?;
            produced += 1;
        }
        let last_sequence = sink.sequence();
        sink.close().whatever_context("failed to close sink")?;
        info!(produced, last_sequence, "producer finished");
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Prints every message of a queue, oldest first, then waits for more.
Stops cleanly on Ctrl-C or when --timeout elapses.
Examples:

freezer consume --path /events --poll-period 500ms

")]
struct ConsumeArgs {
    /// Queue root inside the store.
    #[arg(long)]
    path: Option<PathBuf>,

    /// How often to look for new segments, e.g. `500ms`.
    #[arg(long, value_parser = humantime::parse_duration)]
    poll_period: Option<Duration>,

    /// Must match what the producer used.
    #[arg(long)]
    compression: Option<Compression>,

    /// Stop after this long instead of running until Ctrl-C.
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
}

impl ConsumeArgs {
    async fn run(self, mut settings: FreezerSettings) -> Result<(), Whatever> {
        if let Some(path) = self.path {
            settings.set_queue_path(path);
        }
        let mut config = settings.source;
        if let Some(period) = self.poll_period {
            config.poll_period = period;
        }
        if let Some(compression) = self.compression {
            config.compression = compression;
        }

        let signal = self
            .timeout
            .map_or_else(StopSignal::new, StopSignal::with_timeout);
        let on_interrupt = signal.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => on_interrupt.cancel(),
                Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
            }
        });

        let mut source = MessageSource::new(open_store(&settings.store_dir), config);
        let stdout = io::stdout();
        source
            .consume_messages(&signal, |payload| {
                let printed = writeln!(stdout.lock(), "{}", String::from_utf8_lossy(&payload));
                async move { printed.map_err(BoxError::from) }
            })
            .await
            .whatever_context("consumer failed")?;
        info!(sequence = source.sequence(), "consumer stopped");
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Lists the segments of a queue with their sequence numbers.
Examples:

freezer segments --path /events

")]
struct SegmentsArgs {
    /// Queue root inside the store.
    #[arg(long)]
    path: Option<PathBuf>,
}

impl SegmentsArgs {
    fn run(self, mut settings: FreezerSettings) -> Result<(), Whatever> {
        if let Some(path) = self.path {
            settings.set_queue_path(path);
        }
        let store = open_store(&settings.store_dir);
        let root = &settings.queue_path;

        let sequences = scan_segments(store.as_ref(), root)
            .whatever_context("failed to list segments")?;
        let mut out = io::stdout().lock();
        for sequence in sequences {
            let path = segment_path(root, sequence).whatever_context("invalid segment")?;
            let len = store.stat(&path).map(|info| info.len).unwrap_or_default();
            writeln!(out, "{sequence}\t{len}\t{}", path.display())
                .whatever_context("failed to write to stdout")?;
        }
        Ok(())
    }
}

fn open_store(dir: &std::path::Path) -> Arc<dyn StreamStore> { Arc::new(FsStreamStore::new(dir)) }

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();

    let mut settings =
        FreezerSettings::load(cli.config.as_deref()).whatever_context("failed to load settings")?;
    if let Some(dir) = cli.store_dir {
        settings.store_dir = dir;
    }

    let _guards = freezer_common_telemetry::init_global_logging("freezer", &settings.logging);
    freezer_common_telemetry::set_panic_hook();

    match cli.commands {
        Commands::Produce(args) => args.run(settings),
        Commands::Consume(args) => args.run(settings).await,
        Commands::Segments(args) => args.run(settings),
    }
}
