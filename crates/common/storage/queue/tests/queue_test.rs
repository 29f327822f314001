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

use std::{path::Path, sync::Arc, time::Duration};

use bytes::Bytes;
use freezer_common_telemetry::init_default_ut_logging;
use freezer_queue::{
    Compression, Error, MessageSink, MessageSinkConfig, MessageSource, MessageSourceConfig,
    StopSignal,
    frame::{END_MARKER, encode_frame},
    path::{scan_segments, segment_path},
    store::{FsStreamStore, MemStreamStore, StreamStore},
};
use parking_lot::Mutex;
use tempfile::TempDir;
use test_case::test_case;

fn sink_config(path: &str, compression: Compression) -> MessageSinkConfig {
    MessageSinkConfig::builder()
        .path(path)
        .compression(compression)
        .build()
}

fn source_config(path: &str, compression: Compression) -> MessageSourceConfig {
    MessageSourceConfig::builder()
        .path(path)
        .poll_period(Duration::from_millis(20))
        .compression(compression)
        .build()
}

/// Consumes until `signal` stops and returns what was delivered.
async fn drain(
    store: Arc<dyn StreamStore>,
    config: MessageSourceConfig,
    signal: &StopSignal,
) -> (freezer_queue::Result<()>, Vec<Bytes>) {
    let seen = Mutex::new(Vec::new());
    let mut source = MessageSource::new(store, config);
    let result = source
        .consume_messages(signal, |payload| {
            seen.lock().push(payload);
            async { Ok(()) }
        })
        .await;
    (result, seen.into_inner())
}

#[test_case(Compression::None ; "plain")]
#[test_case(Compression::Zstd ; "zstd")]
#[tokio::test]
async fn round_trip_preserves_order_across_segments(compression: Compression) {
    init_default_ut_logging();
    let store: Arc<dyn StreamStore> = Arc::new(MemStreamStore::new());

    let payloads: Vec<Vec<u8>> = (0..25u32)
        .map(|i| format!("message-{i:04}").repeat(i as usize % 4 + 1).into_bytes())
        .collect();

    let mut config = sink_config("/foo/bar/baz", compression);
    config.max_unflushed_messages = 7;
    let mut sink = MessageSink::new(store.clone(), config).unwrap();
    for payload in &payloads {
        sink.put_message(payload).unwrap();
    }
    sink.close().unwrap();

    assert_eq!(
        scan_segments(store.as_ref(), "/foo/bar/baz").unwrap(),
        vec![0, 1, 2, 3]
    );

    let signal = StopSignal::with_timeout(Duration::from_millis(300));
    let (result, seen) = drain(
        store,
        source_config("/foo/bar/baz", compression),
        &signal,
    )
    .await;

    result.unwrap();
    assert_eq!(seen, payloads);
}

#[test_case(Compression::None ; "plain")]
#[test_case(Compression::Zstd ; "zstd")]
#[tokio::test]
async fn source_waits_for_a_sink_to_appear(compression: Compression) {
    init_default_ut_logging();
    let store: Arc<dyn StreamStore> = Arc::new(MemStreamStore::new());
    let signal = StopSignal::with_timeout(Duration::from_secs(5));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let consumer = {
        let store = store.clone();
        let signal = signal.clone();
        let seen = seen.clone();
        tokio::spawn(async move {
            let stop = signal.clone();
            let mut source = MessageSource::new(store, source_config("/", compression));
            source
                .consume_messages(&signal, move |payload| {
                    seen.lock().push(payload);
                    stop.cancel();
                    async { Ok(()) }
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    let mut config = sink_config("/", compression);
    config.max_unflushed_time = Duration::from_millis(5);
    let mut sink = MessageSink::new(store, config).unwrap();
    sink.put_message(&[1, 2, 3, 4, 5]).unwrap();

    consumer.await.unwrap().unwrap();
    assert_eq!(*seen.lock(), vec![Bytes::from_static(&[1, 2, 3, 4, 5])]);
    assert_eq!(signal.reason(), Some(freezer_queue::StopReason::Cancelled));
    sink.close().unwrap();
}

#[test_case(Compression::None ; "plain")]
#[test_case(Compression::Zstd ; "zstd")]
#[tokio::test]
async fn source_follows_an_open_segment(compression: Compression) {
    init_default_ut_logging();
    let store: Arc<dyn StreamStore> = Arc::new(MemStreamStore::new());
    let mut sink = MessageSink::new(store.clone(), sink_config("/live", compression)).unwrap();
    sink.put_message(b"before").unwrap();

    let signal = StopSignal::with_timeout(Duration::from_secs(5));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let consumer = {
        let store = store.clone();
        let signal = signal.clone();
        let seen = seen.clone();
        tokio::spawn(async move {
            let stop = signal.clone();
            let mut source = MessageSource::new(store, source_config("/live", compression));
            source
                .consume_messages(&signal, move |payload| {
                    let mut seen = seen.lock();
                    seen.push(payload);
                    if seen.len() == 2 {
                        stop.cancel();
                    }
                    async { Ok(()) }
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    sink.put_message(b"after").unwrap();

    consumer.await.unwrap().unwrap();
    assert_eq!(
        *seen.lock(),
        vec![Bytes::from_static(b"before"), Bytes::from_static(b"after")]
    );
    sink.close().unwrap();
}

#[tokio::test]
async fn deadline_on_empty_root_is_a_clean_stop() {
    init_default_ut_logging();
    let store: Arc<dyn StreamStore> = Arc::new(MemStreamStore::new());

    let started = tokio::time::Instant::now();
    let signal = StopSignal::with_timeout(Duration::from_millis(100));
    let (result, seen) = drain(store, source_config("/nothing/here", Compression::None), &signal).await;

    result.unwrap();
    assert!(seen.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn cancelling_from_the_handler_delivers_the_in_flight_message() {
    init_default_ut_logging();
    let store: Arc<dyn StreamStore> = Arc::new(MemStreamStore::new());
    let mut sink = MessageSink::new(store.clone(), sink_config("/foo/bar/baz", Compression::None)).unwrap();
    sink.put_message(&[1]).unwrap();
    sink.put_message(&[2]).unwrap();
    sink.close().unwrap();

    let signal = StopSignal::with_timeout(Duration::from_secs(1));
    let stop = signal.clone();
    let seen = Mutex::new(Vec::new());
    let mut source = MessageSource::new(store, source_config("/foo/bar/baz", Compression::None));
    source
        .consume_messages(&signal, |payload| {
            seen.lock().push(payload);
            stop.cancel();
            async { Ok(()) }
        })
        .await
        .unwrap();

    let seen = seen.into_inner();
    assert_eq!(seen.first(), Some(&Bytes::from_static(&[1])));
    assert_eq!(signal.reason(), Some(freezer_queue::StopReason::Cancelled));
}

#[tokio::test]
async fn aborted_signal_surfaces_as_error() {
    init_default_ut_logging();
    let store: Arc<dyn StreamStore> = Arc::new(MemStreamStore::new());
    let signal = StopSignal::new();

    let aborter = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        aborter.abort("upstream closed");
    });

    let (result, _) = drain(store, source_config("/q", Compression::None), &signal).await;
    assert!(matches!(result, Err(Error::Aborted { ref reason, .. }) if reason == "upstream closed"));
}

#[test_case(Compression::None ; "plain")]
#[test_case(Compression::Zstd ; "zstd")]
#[tokio::test]
async fn byte_after_end_marker_is_fatal(compression: Compression) {
    init_default_ut_logging();
    let mem = MemStreamStore::new();
    let store: Arc<dyn StreamStore> = freezer_queue::compression::with_compression(
        Arc::new(mem.clone()),
        compression,
    );

    let mut segment = encode_frame(b"valid").unwrap().to_vec();
    segment.extend_from_slice(&END_MARKER);
    segment.push(0);
    let path = segment_path("/corrupt", 0).unwrap();
    store
        .create_dir_all(path.parent().unwrap_or(Path::new("/")))
        .unwrap();
    let mut writer = store.create(&path).unwrap();
    std::io::Write::write_all(&mut writer, &segment).unwrap();
    writer.close().unwrap();

    let signal = StopSignal::with_timeout(Duration::from_secs(1));
    let (result, seen) = drain(
        Arc::new(mem),
        source_config("/corrupt", compression),
        &signal,
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::TrailingData { sequence: 0, .. }), "{err}");
    assert!(err.is_corruption());
    assert_eq!(seen, vec![Bytes::from_static(b"valid")]);
}

#[tokio::test]
async fn truncated_frame_is_fatal() {
    init_default_ut_logging();
    let store = MemStreamStore::new();
    let mut segment = encode_frame(b"complete").unwrap().to_vec();
    segment.extend_from_slice(&encode_frame(b"cut short").unwrap()[..6]);
    store
        .put_object(segment_path("/short", 0).unwrap(), segment)
        .unwrap();

    let signal = StopSignal::with_timeout(Duration::from_secs(1));
    let (result, seen) = drain(
        Arc::new(store),
        source_config("/short", Compression::None),
        &signal,
    )
    .await;

    assert!(matches!(result, Err(Error::ShortRead { sequence: 0, .. })));
    assert_eq!(seen.len(), 1);
}

#[tokio::test]
async fn handler_error_stops_consumption() {
    init_default_ut_logging();
    let store: Arc<dyn StreamStore> = Arc::new(MemStreamStore::new());
    let mut config = sink_config("/q", Compression::None);
    config.max_unflushed_messages = 2;
    let mut sink = MessageSink::new(store.clone(), config).unwrap();
    for i in 0..6u8 {
        sink.put_message(&[i]).unwrap();
    }
    sink.close().unwrap();

    let seen = Mutex::new(Vec::new());
    let mut source = MessageSource::new(store, source_config("/q", Compression::None));
    let err = source
        .consume_messages(&StopSignal::with_timeout(Duration::from_secs(1)), |payload| {
            seen.lock().push(payload[0]);
            let fail = payload[0] == 3;
            async move {
                if fail {
                    return Err(freezer_queue::BoxError::from("cannot handle 3"));
                }
                Ok(())
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Handler { sequence: 1, .. }));
    assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
    assert_eq!(source.sequence(), 1);
}

#[test_case(Compression::None ; "plain")]
#[test_case(Compression::Zstd ; "zstd")]
#[tokio::test]
async fn filesystem_store_round_trip(compression: Compression) {
    init_default_ut_logging();
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn StreamStore> = Arc::new(FsStreamStore::new(dir.path()));

    let mut config = sink_config("/events", compression);
    config.max_unflushed_messages = 3;
    let mut sink = MessageSink::new(store.clone(), config).unwrap();
    for i in 0..10u32 {
        sink.put_message(&i.to_le_bytes()).unwrap();
    }
    sink.close().unwrap();

    assert!(dir.path().join("events/00/00/00/00/00/00/00").is_file());
    assert!(dir.path().join("events/00/00/00/00/00/00/03").is_file());
    assert_eq!(
        scan_segments(store.as_ref(), "/events").unwrap(),
        vec![0, 1, 2, 3]
    );

    let signal = StopSignal::with_timeout(Duration::from_millis(300));
    let (result, seen) = drain(store, source_config("/events", compression), &signal).await;
    result.unwrap();

    let decoded: Vec<u32> = seen
        .iter()
        .map(|payload| u32::from_le_bytes(payload[..].try_into().unwrap()))
        .collect();
    assert_eq!(decoded, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn independent_sources_each_replay_from_zero() {
    init_default_ut_logging();
    let store: Arc<dyn StreamStore> = Arc::new(MemStreamStore::new());
    let mut sink = MessageSink::new(store.clone(), sink_config("/fan", Compression::None)).unwrap();
    sink.put_message(b"x").unwrap();
    sink.close().unwrap();

    for _ in 0..2 {
        let signal = StopSignal::with_timeout(Duration::from_millis(50));
        let (result, seen) =
            drain(store.clone(), source_config("/fan", Compression::None), &signal).await;
        result.unwrap();
        assert_eq!(seen, vec![Bytes::from_static(b"x")]);
    }
}
