use super::session::Session;
use super::*;
use crate::{Error, FlushState, MemorySink, Payload, PayloadGenerator, RecordSource};
#[cfg(feature = "random")]
use crate::SeededPayload;
use bytes::Bytes;
use core::mem::size_of;
use futures::stream;
use std::io;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, PartialEq)]
enum Event {
    Append(String),
    Flush,
    Close,
}

/// Records every call in order.
#[derive(Default)]
struct EventSink {
    events: Vec<Event>,
}

impl Sink for EventSink {
    async fn append(&mut self, bytes: Bytes) -> io::Result<()> {
        let text = String::from_utf8(bytes.to_vec()).expect("utf-8 output");
        self.events.push(Event::Append(text));
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.events.push(Event::Flush);
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.events.push(Event::Close);
        Ok(())
    }
}

fn xyz(index: u64) -> Payload {
    match index {
        0 => Payload::new(1, 1.5, "x"),
        1 => Payload::new(2, 2.5, "y"),
        _ => Payload::new(3, 3.5, "z"),
    }
}

fn fixed(index: u64) -> Payload {
    Payload::new((index % 1000) as i32, 1.5, "x")
}

/// A generator that counts how many records were pulled from it.
fn counting(pulls: Arc<AtomicU64>) -> impl PayloadGenerator + Send {
    move |index| {
        pulls.fetch_add(1, Ordering::SeqCst);
        fixed(index)
    }
}

#[cfg(feature = "random")]
fn expected_records(seed: u64, count: u64) -> Vec<Record> {
    let mut generator = SeededPayload::new(seed);
    (0..count)
        .map(|index| Record::from_payload(index, generator.generate(index)))
        .collect()
}

fn streaming_policies() -> [FlushPolicy; 3] {
    [
        FlushPolicy::EveryRecord,
        FlushPolicy::every(7).unwrap(),
        FlushPolicy::every(10_000).unwrap(),
    ]
}

#[tokio::test]
async fn three_records_flush_twice_then_close() {
    let mut sink = EventSink::default();
    let summary = encode(RecordSource::new(3, xyz), &mut sink, FlushPolicy::EveryRecord)
        .await
        .unwrap();

    assert_eq!(
        sink.events,
        [
            Event::Append(r#"[{"index":"0","a":"1","b":"1.5","c":"x"}"#.into()),
            Event::Flush,
            Event::Append(r#",{"index":"1","a":"2","b":"2.5","c":"y"}"#.into()),
            Event::Flush,
            Event::Append(r#",{"index":"2","a":"3","b":"3.5","c":"z"}"#.into()),
            Event::Append("]".into()),
            Event::Flush,
            Event::Close,
        ]
    );
    assert_eq!(summary.records, 3);
    assert_eq!(summary.flushes, 3);
}

#[tokio::test]
async fn three_records_exact_output() {
    let mut sink = MemorySink::new();
    encode(RecordSource::new(3, xyz), &mut sink, FlushPolicy::EveryRecord)
        .await
        .unwrap();

    assert_eq!(
        sink.delivered(),
        concat!(
            r#"[{"index":"0","a":"1","b":"1.5","c":"x"},"#,
            r#"{"index":"1","a":"2","b":"2.5","c":"y"},"#,
            r#"{"index":"2","a":"3","b":"3.5","c":"z"}]"#
        )
        .as_bytes()
    );
    assert_eq!(sink.closes(), 1);
}

#[tokio::test]
async fn unbounded_writes_once() {
    let mut sink = EventSink::default();
    let policy = FlushPolicy::Unbounded { max_records: None };
    let summary = encode(RecordSource::new(3, xyz), &mut sink, policy)
        .await
        .unwrap();

    assert_eq!(
        sink.events,
        [
            Event::Append(
                concat!(
                    r#"[{"index":"0","a":"1","b":"1.5","c":"x"},"#,
                    r#"{"index":"1","a":"2","b":"2.5","c":"y"},"#,
                    r#"{"index":"2","a":"3","b":"3.5","c":"z"}]"#
                )
                .into()
            ),
            Event::Flush,
            Event::Close,
        ]
    );
    assert_eq!(summary.flushes, 1);
}

#[tokio::test]
async fn streaming_yields_every_index_in_order() {
    for policy in streaming_policies() {
        for count in [0, 1, 2, 7, 100, 1_000] {
            let mut sink = MemorySink::new();
            let summary = encode(RecordSource::new(count, fixed), &mut sink, policy)
                .await
                .unwrap();

            let records: Vec<Record> = serde_json::from_slice(sink.delivered()).unwrap();
            let indices: Vec<u64> = records.iter().map(|r| r.index).collect();
            assert_eq!(indices, (0..count).collect::<Vec<_>>(), "{policy} N={count}");
            assert_eq!(summary.records, count);
            assert_eq!(summary.flushes, sink.flushes());
            assert_eq!(summary.bytes, sink.bytes_delivered());
            assert_eq!(sink.closes(), 1);
        }
    }
}

#[tokio::test]
async fn empty_sequence_is_an_empty_array() {
    for policy in streaming_policies() {
        let mut sink = MemorySink::new();
        encode(RecordSource::new(0, fixed), &mut sink, policy)
            .await
            .unwrap();
        assert_eq!(sink.delivered(), b"[]");
        assert_eq!(sink.flushes(), 1);
        assert_eq!(sink.closes(), 1);
    }
}

#[tokio::test]
async fn every_n_amortizes_flushes() {
    let policy = FlushPolicy::every(10).unwrap();

    // Flushes at 10 and 20, then the closing flush.
    let mut sink = MemorySink::new();
    encode(RecordSource::new(25, fixed), &mut sink, policy)
        .await
        .unwrap();
    assert_eq!(sink.flushes(), 3);

    // The flush at 20 is the last record, so it folds into the closing flush.
    let mut sink = MemorySink::new();
    encode(RecordSource::new(20, fixed), &mut sink, policy)
        .await
        .unwrap();
    assert_eq!(sink.flushes(), 2);

    // Fewer records than K: only the closing flush.
    let mut sink = MemorySink::new();
    encode(RecordSource::new(9, fixed), &mut sink, policy)
        .await
        .unwrap();
    assert_eq!(sink.flushes(), 1);
}

#[cfg(feature = "random")]
#[tokio::test]
async fn unbounded_and_streaming_are_byte_identical() {
    const SEED: u64 = 0x5eed;
    for count in [0, 1, 3, 257, 5_000] {
        let mut baseline = MemorySink::new();
        encode(
            RecordSource::new(count, SeededPayload::new(SEED)),
            &mut baseline,
            FlushPolicy::Unbounded { max_records: None },
        )
        .await
        .unwrap();

        for policy in streaming_policies() {
            let mut sink = MemorySink::new();
            encode(
                RecordSource::new(count, SeededPayload::new(SEED)),
                &mut sink,
                policy,
            )
            .await
            .unwrap();
            assert_eq!(sink.delivered(), baseline.delivered(), "{policy} N={count}");
        }
    }
}

#[cfg(feature = "random")]
#[tokio::test]
async fn output_round_trips_to_original_records() {
    const SEED: u64 = 42;
    let mut sink = MemorySink::new();
    encode(
        RecordSource::new(500, SeededPayload::new(SEED)),
        &mut sink,
        FlushPolicy::every(64).unwrap(),
    )
    .await
    .unwrap();

    // Every value is a JSON string on the wire.
    let raw: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_slice(sink.delivered()).unwrap();
    for object in &raw {
        assert_eq!(object.len(), 4);
        for key in ["index", "a", "b", "c"] {
            assert!(object[key].is_string(), "{key} is not a string");
        }
    }

    let parsed: Vec<Record> = serde_json::from_slice(sink.delivered()).unwrap();
    assert_eq!(parsed, expected_records(SEED, 500));
}

#[tokio::test]
async fn streaming_memory_stays_flat() {
    const K: i64 = 100;
    let policy = FlushPolicy::every(K).unwrap();
    let mut peaks = Vec::new();

    for count in [10, 10_000, 1_000_000] {
        let mut sink = MemorySink::counting();
        let summary = encode(RecordSource::new(count, fixed), &mut sink, policy)
            .await
            .unwrap();
        assert_eq!(summary.records, count);

        // Pending bytes never exceed K records' worth.
        assert!(sink.peak_pending() <= K as usize * 64, "N={count}");
        peaks.push(summary.peak_working_bytes);
    }

    assert!(peaks.iter().all(|&peak| peak == peaks[0]), "{peaks:?}");
    assert!(peaks[0] <= 256);
}

#[tokio::test]
async fn unbounded_memory_grows_linearly() {
    let policy = FlushPolicy::Unbounded { max_records: None };
    let mut peaks = Vec::new();

    for count in [10, 1_000, 100_000] {
        let mut sink = MemorySink::counting();
        let summary = encode(RecordSource::new(count, fixed), &mut sink, policy)
            .await
            .unwrap();
        assert!(summary.peak_working_bytes >= count as usize * size_of::<Record>());
        peaks.push(summary.peak_working_bytes);
    }

    assert!(peaks[1] > 50 * peaks[0], "{peaks:?}");
    assert!(peaks[2] > 50 * peaks[1], "{peaks:?}");
}

#[tokio::test]
async fn resource_limit_aborts_before_any_write() {
    let mut sink = MemorySink::new();
    let err = encode(
        RecordSource::new(11, fixed),
        &mut sink,
        FlushPolicy::unbounded(10),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::ResourceLimit { limit: 10 }));
    assert_eq!(sink.appends(), 0);
    assert_eq!(sink.flushes(), 0);
    assert_eq!(sink.closes(), 1);

    let mut sink = MemorySink::new();
    encode(
        RecordSource::new(10, fixed),
        &mut sink,
        FlushPolicy::unbounded(10),
    )
    .await
    .unwrap();
    assert_eq!(sink.flushes(), 1);
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let sink = MemorySink::new();

    let count = RecordSource::try_new(-1, fixed).err().unwrap();
    let interval = FlushPolicy::every(0).unwrap_err();

    assert!(count.is_configuration());
    assert!(interval.is_configuration());
    assert_eq!(sink.appends(), 0);
    assert_eq!(sink.closes(), 0);
}

#[tokio::test]
async fn disconnect_stops_pulling_and_closes_once() {
    let cancel = CancellationToken::new();
    let pulls = Arc::new(AtomicU64::new(0));
    // The opening bracket rides with the first record, so two appends are
    // two records.
    let mut sink = MemorySink::new()
        .disconnect_after(2)
        .with_hang_up(cancel.clone());

    let err = StreamingEncoder::new(FlushPolicy::EveryRecord)
        .with_cancellation(cancel)
        .encode(RecordSource::new(5, counting(Arc::clone(&pulls))), &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(pulls.load(Ordering::SeqCst), 2);
    assert_eq!(sink.flushes(), 2);
    assert_eq!(sink.closes(), 1);

    // Two records made it out; the array is left unterminated.
    let delivered = sink.delivered();
    assert!(delivered.starts_with(b"[{"));
    assert!(!delivered.ends_with(b"]"));
    let partial = serde_json::from_slice::<Vec<Record>>(delivered).unwrap_err();
    assert!(partial.is_eof());
}

#[tokio::test]
async fn unreported_disconnect_fails_the_next_write() {
    let mut sink = MemorySink::new().disconnect_after(2);

    let err = encode(RecordSource::new(5, fixed), &mut sink, FlushPolicy::EveryRecord)
        .await
        .unwrap_err();

    assert!(matches!(&err, Error::Transport(e) if e.kind() == io::ErrorKind::BrokenPipe));
    assert_eq!(sink.flushes(), 2);
    assert_eq!(sink.closes(), 1);
}

#[tokio::test]
async fn cancellation_is_observed_at_the_next_suspension_point() {
    let cancel = CancellationToken::new();
    let pulls = Arc::new(AtomicU64::new(0));
    let generator = {
        let cancel = cancel.clone();
        let pulls = Arc::clone(&pulls);
        move |index| {
            pulls.fetch_add(1, Ordering::SeqCst);
            if index == 1 {
                cancel.cancel();
            }
            fixed(index)
        }
    };

    let mut sink = MemorySink::new();
    let err = StreamingEncoder::new(FlushPolicy::EveryRecord)
        .with_cancellation(cancel)
        .encode(RecordSource::new(5, generator), &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(pulls.load(Ordering::SeqCst), 2);
    assert_eq!(sink.flushes(), 1);
    assert_eq!(sink.closes(), 1);
}

#[tokio::test]
async fn cancelled_before_start_never_pulls() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let pulls = Arc::new(AtomicU64::new(0));

    for policy in [FlushPolicy::EveryRecord, FlushPolicy::unbounded(100)] {
        let mut sink = MemorySink::new();
        let err = StreamingEncoder::new(policy)
            .with_cancellation(cancel.clone())
            .encode(RecordSource::new(5, counting(Arc::clone(&pulls))), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(sink.appends(), 0);
        assert_eq!(sink.closes(), 1);
    }
    assert_eq!(pulls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn source_fault_still_closes_sink() {
    let source = stream::iter([
        Ok(Record::new(0, 1, 1.5, "x")),
        Ok(Record::new(1, 2, 2.5, "y")),
        Err(Error::Source {
            reason: "fixture exhausted".into(),
        }),
    ]);

    let mut sink = MemorySink::new();
    let err = encode(source, &mut sink, FlushPolicy::EveryRecord)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Source { .. }));
    assert_eq!(sink.closes(), 1);
    assert_eq!(
        sink.delivered(),
        br#"[{"index":"0","a":"1","b":"1.5","c":"x"},{"index":"1","a":"2","b":"2.5","c":"y"}"#
    );
}

#[tokio::test]
async fn session_walks_the_flush_states() {
    let cancel = CancellationToken::new();
    let mut sink = MemorySink::new();
    let mut session = Session::begin(&mut sink);
    assert_eq!(session.state(), FlushState::Idle);

    session
        .write_record(&Record::new(0, 1, 1.5, "x"))
        .await
        .unwrap();
    assert_eq!(session.state(), FlushState::Accumulating);
    assert_eq!(session.since_flush(), 1);

    session
        .write_record(&Record::new(1, 2, 2.5, "y"))
        .await
        .unwrap();
    assert_eq!(session.since_flush(), 2);

    session.flush(&cancel).await.unwrap();
    assert_eq!(session.state(), FlushState::Idle);
    assert_eq!(session.since_flush(), 0);

    // Nothing pending: no extra flush reaches the sink.
    session.flush(&cancel).await.unwrap();

    let summary = session.finish(Ok(()), &cancel).await.unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.flushes, 2);
    assert_eq!(sink.flushes(), 2);
    assert!(sink.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_streams_run_concurrently() {
    let tasks: Vec<_> = (0..8_u64)
        .map(|i| {
            tokio::spawn(async move {
                let count = 100 * (i + 1);
                let policy = FlushPolicy::every(i as i64 + 1)?;
                let mut sink = MemorySink::new();
                encode(RecordSource::new(count, fixed), &mut sink, policy).await?;
                Ok::<_, Error>((count, sink))
            })
        })
        .collect();

    for task in tasks {
        let (count, sink) = task.await.unwrap().unwrap();
        let records: Vec<Record> = serde_json::from_slice(sink.delivered()).unwrap();
        assert_eq!(records.len() as u64, count);
        assert_eq!(sink.closes(), 1);
    }
}
