//! End-to-end scenarios S1-S6 from the design's testable-properties list,
//! driven against temp directories and an in-process `WebPoster` stub
//! rather than a real socket.

use std::fs;
use std::sync::Arc;

use eos_metrics::cache::record::{AggregateRecord, IndividualRecord, SequenceRecord};
use eos_metrics::cache::PersistentCache;
use eos_metrics::cancel::CancelToken;
use eos_metrics::config::MetricsConfig;
use eos_metrics::connection::Connection;
use eos_metrics::host_identity::{FixedHostIdentity, HostIdentityProvider};
use eos_metrics::sender::Sender;
use eos_metrics::types::{Capacity, MetricValue, Payload};
use eos_metrics::web_poster::testing::StubWebPoster;
use eos_metrics::web_poster::WebPoster;

fn fixed_identity() -> Arc<dyn HostIdentityProvider> {
    Arc::new(FixedHostIdentity {
        fingerprint: "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa".to_string(),
        machine_id: 1108152157446,
    })
}

fn payload_with(n: i64) -> Payload {
    let mut p = Payload::new();
    p.insert("n".to_string(), MetricValue::Int64(n));
    p
}

#[test]
fn s1_happy_send() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(MetricsConfig::rooted_at(dir.path()));
    let poster = Arc::new(StubWebPoster::always_ok());
    let conn = Connection::new(config, fixed_identity(), poster.clone());

    let mut payload = Payload::new();
    payload.insert("clicks".to_string(), MetricValue::Int64(5));
    payload.insert("timestamp".to_string(), MetricValue::Int64(1234));

    let cancel = CancelToken::new();
    conn.send_sync(&payload, &cancel).unwrap();

    let calls = poster.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let parsed: serde_json::Value = serde_json::from_str(&calls[0]).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!({
            "data": {
                "clicks": 5,
                "timestamp": 1234,
                "fingerprint": "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa",
                "machine": 1108152157446i64
            }
        })
    );
}

#[test]
fn s2_fail_then_queue_then_drain() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(MetricsConfig::rooted_at(dir.path()));
    let failing_poster = Arc::new(StubWebPoster::fail_n_times(3));
    let conn = Connection::new(config.clone(), fixed_identity(), failing_poster);
    let sender = Sender::new(conn, dir.path().join("queue.json"));
    let cancel = CancelToken::new();

    for n in 1..=3 {
        sender.send_data_sync(&payload_with(n), &cancel).unwrap();
    }

    let queue_contents = fs::read_to_string(dir.path().join("queue.json")).unwrap();
    let queued: Vec<Payload> = serde_json::from_str(&queue_contents).unwrap();
    assert_eq!(queued.len(), 3);

    let ok_poster = Arc::new(StubWebPoster::always_ok());
    let conn = Connection::new(config, fixed_identity(), ok_poster.clone());
    let sender = Sender::new(conn, dir.path().join("queue.json"));
    sender.drain_queue_sync(&cancel).unwrap();

    assert_eq!(ok_poster.call_count(), 3);
    assert_eq!(
        fs::read_to_string(dir.path().join("queue.json")).unwrap(),
        "[]"
    );
}

#[test]
fn s3_cache_bounded() {
    let dir = tempfile::tempdir().unwrap();
    // event_id(1 byte) + ts(8) + aux-tag(1) = 10 byte payload -> 18 bytes
    // framed; budget covers two records but not a third.
    let cache = PersistentCache::init(dir.path(), 36).unwrap();

    let make = |n: u8| IndividualRecord {
        event_id: vec![n],
        timestamp: n as i64,
        aux: None,
    };

    cache.store(&[make(1)], &[], &[]).unwrap();
    cache.store(&[make(2)], &[], &[]).unwrap();
    assert_ne!(cache.capacity(), Capacity::Max);

    cache.store(&[make(3)], &[], &[]).unwrap();
    assert_eq!(cache.capacity(), Capacity::Max);

    let (individual, aggregate, sequence) = cache.drain().unwrap();
    assert_eq!(individual.len(), 2);
    assert_eq!(individual[0].event_id, vec![1]);
    assert_eq!(individual[1].event_id, vec![2]);
    assert!(aggregate.is_empty());
    assert!(sequence.is_empty());
}

#[test]
fn s4_version_migration_wipe() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = PersistentCache::init(dir.path(), 1_000_000).unwrap();
        let individual = vec![IndividualRecord {
            event_id: vec![1],
            timestamp: 1,
            aux: None,
        }];
        let aggregate = vec![AggregateRecord {
            event_id: vec![2],
            count: 1,
            timestamp: 1,
            aux: None,
        }];
        let sequence = vec![SequenceRecord {
            event_id: vec![3],
            events: vec![(1, None)],
        }];
        cache.store(&individual, &aggregate, &sequence).unwrap();
    }

    fs::write(dir.path().join("cache.version"), "1").unwrap();

    let cache = PersistentCache::init(dir.path(), 1_000_000).unwrap();
    let (individual, aggregate, sequence) = cache.drain().unwrap();
    assert!(individual.is_empty());
    assert!(aggregate.is_empty());
    assert!(sequence.is_empty());
}

#[test]
fn s5_invalid_endpoint_config() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("endpoint.json"), "not json at all").unwrap();
    let config = Arc::new(MetricsConfig::rooted_at(dir.path()));
    let poster = Arc::new(StubWebPoster::always_ok());
    let conn = Connection::new(config, fixed_identity(), poster);
    assert_eq!(conn.endpoint(), "http://localhost:3000");
}

#[test]
fn s6_drain_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(MetricsConfig::rooted_at(dir.path()));
    let failing_poster = Arc::new(StubWebPoster::fail_n_times(3));
    let conn = Connection::new(config.clone(), fixed_identity(), failing_poster);
    let sender = Sender::new(conn, dir.path().join("queue.json"));
    let cancel = CancelToken::new();

    sender.send_data_sync(&payload_with(1), &cancel).unwrap();
    sender.send_data_sync(&payload_with(2), &cancel).unwrap();
    sender.send_data_sync(&payload_with(3), &cancel).unwrap();

    let ok_poster = Arc::new(StubWebPoster::always_ok());
    let conn = Connection::new(config, fixed_identity(), ok_poster.clone());
    let sender = Sender::new(conn, dir.path().join("queue.json"));
    sender.drain_queue_sync(&cancel).unwrap();

    let bodies = ok_poster.calls.lock().unwrap();
    assert_eq!(bodies.len(), 3);
    for (i, body) in bodies.iter().enumerate() {
        let parsed: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(parsed["data"]["n"], (i as i64) + 1);
    }
}

#[tokio::test]
async fn async_send_and_drain_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(MetricsConfig::rooted_at(dir.path()));
    let poster = Arc::new(StubWebPoster::fail_n_times(1));
    let conn = Connection::new(config, fixed_identity(), poster);
    let sender = Arc::new(Sender::new(conn, dir.path().join("queue.json")));
    let cancel = CancelToken::new();

    sender
        .send_data_async(payload_with(1), cancel.clone())
        .await
        .unwrap();

    let queue_contents = fs::read_to_string(dir.path().join("queue.json")).unwrap();
    let queued: Vec<Payload> = serde_json::from_str(&queue_contents).unwrap();
    assert_eq!(queued.len(), 1);

    sender.clone().drain_queue_async(cancel).await.unwrap();
}
