//! Integration tests for the session loop against a loopback aggregator.

use std::io::Write;

use tokio_util::sync::CancellationToken;

use agency_client::models::{Batch, Record};
use agency_client::protocol::codec::encode_batch;
use agency_client::session::{SessionLoop, SessionState};
use agency_client::shutdown::ShutdownCoordinator;
use agency_client::source::{CsvRecordSource, MemorySource};
use agency_client::AppError;

use super::test_helpers::{sample_records, spawn_aggregator, test_config, Exchange, Script};

fn wire(agency: u8, records: &[Record]) -> Vec<u8> {
    encode_batch(&Batch::new(agency, records.to_vec()))
        .expect("encode")
        .iter()
        .flat_map(|f| f.iter().copied())
        .collect()
}

#[tokio::test]
async fn three_records_in_batches_of_two_use_three_connections() {
    let records = sample_records(3);
    let agg = spawn_aggregator(Script {
        connections: 3,
        winners: vec![30_000_001, 30_000_002],
        ..Script::default()
    })
    .await;

    let config = test_config(&agg.addr, 5, 2, 0);
    let coordinator = ShutdownCoordinator::new(CancellationToken::new());
    let report = SessionLoop::new(&config, MemorySource::new(records.clone()), coordinator)
        .run()
        .await
        .expect("session succeeds");

    let exchanges = agg.handle.await.expect("aggregator");
    assert_eq!(exchanges.len(), 3);

    match &exchanges[0] {
        Exchange::Batch { raw, batch, trailing } => {
            assert_eq!(raw, &wire(5, &records[..2]));
            assert_eq!(batch.records(), &records[..2]);
            assert!(trailing.is_empty(), "nothing may follow the batch");
        }
        other => panic!("connection 1: expected batch, got {other:?}"),
    }

    match &exchanges[1] {
        Exchange::Batch { raw, batch, trailing } => {
            assert_eq!(raw, &wire(5, &records[2..]));
            assert_eq!(batch.len(), 1);
            assert!(trailing.is_empty());
        }
        other => panic!("connection 2: expected batch, got {other:?}"),
    }

    match &exchanges[2] {
        Exchange::Final { raw, after_winners } => {
            assert_eq!(raw, &vec![0x00, 0x00, 5]);
            assert_eq!(after_winners, &vec![0x02]);
        }
        other => panic!("connection 3: expected end marker, got {other:?}"),
    }

    assert_eq!(report.final_state, SessionState::Done);
    assert_eq!(report.rounds, 2);
    assert_eq!(report.records_sent, 3);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.rejected, 0);
    assert!(!report.cancelled);

    let winners = report.winners.expect("winner set");
    assert_eq!(winners.len(), 2);
    assert!(winners.contains(30_000_001));
}

#[tokio::test]
async fn empty_source_goes_straight_to_finalizing() {
    let agg = spawn_aggregator(Script::default()).await;
    let config = test_config(&agg.addr, 1, 10, 0);
    let coordinator = ShutdownCoordinator::new(CancellationToken::new());

    let report = SessionLoop::new(&config, MemorySource::default(), coordinator)
        .run()
        .await
        .expect("session succeeds");

    let exchanges = agg.handle.await.expect("aggregator");
    assert!(matches!(exchanges[0], Exchange::Final { .. }));
    assert_eq!(report.rounds, 0);
    assert!(report.winners.expect("winner set").is_empty());
}

#[tokio::test]
async fn large_batch_spans_several_frames_on_one_connection() {
    let records = sample_records(600);
    let agg = spawn_aggregator(Script {
        connections: 2,
        ..Script::default()
    })
    .await;

    let config = test_config(&agg.addr, 8, 600, 0);
    let coordinator = ShutdownCoordinator::new(CancellationToken::new());
    let report = SessionLoop::new(&config, MemorySource::new(records.clone()), coordinator)
        .run()
        .await
        .expect("session succeeds");

    let exchanges = agg.handle.await.expect("aggregator");
    match &exchanges[0] {
        Exchange::Batch { raw, batch, .. } => {
            assert!(raw.len() > 8000, "batch must exceed one frame");
            assert_eq!(batch.records(), &records[..]);
        }
        other => panic!("expected batch, got {other:?}"),
    }
    assert_eq!(report.records_sent, 600);
}

#[tokio::test]
async fn failed_answers_are_counted_and_the_loop_continues() {
    let agg = spawn_aggregator(Script {
        connections: 3,
        answer: 1,
        ..Script::default()
    })
    .await;

    let config = test_config(&agg.addr, 2, 1, 0);
    let coordinator = ShutdownCoordinator::new(CancellationToken::new());
    let report = SessionLoop::new(&config, MemorySource::new(sample_records(2)), coordinator)
        .run()
        .await
        .expect("session succeeds");

    agg.handle.await.expect("aggregator");
    assert_eq!(report.accepted, 0);
    assert_eq!(report.rejected, 2);
    assert!(report.winners.is_some());
}

#[tokio::test]
async fn oversized_name_abandons_only_its_round() {
    let mut records = vec![Record::new("x".repeat(300), "y", 1, "2000-01-01", 1).expect("record")];
    records.extend(sample_records(1));

    let agg = spawn_aggregator(Script {
        connections: 3,
        ..Script::default()
    })
    .await;

    let config = test_config(&agg.addr, 3, 1, 0);
    let coordinator = ShutdownCoordinator::new(CancellationToken::new());
    let report = SessionLoop::new(&config, MemorySource::new(records), coordinator)
        .run()
        .await
        .expect("session succeeds");

    let exchanges = agg.handle.await.expect("aggregator");
    assert!(matches!(exchanges[0], Exchange::Idle), "nothing written for the bad batch");
    assert!(matches!(exchanges[1], Exchange::Batch { .. }));
    assert!(matches!(exchanges[2], Exchange::Final { .. }));

    assert_eq!(report.rounds, 2);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.records_sent, 1);
}

#[tokio::test]
async fn csv_source_at_batch_boundary_spends_an_idle_connection() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "Ana,Li,1,2000-01-01,1").expect("write");
    writeln!(file, "Bo,Ma,2,2000-01-02,2").expect("write");

    let agg = spawn_aggregator(Script {
        connections: 3,
        winners: vec![2],
        ..Script::default()
    })
    .await;

    let config = test_config(&agg.addr, 4, 2, 0);
    let source = CsvRecordSource::open(file.path()).await.expect("open");
    let coordinator = ShutdownCoordinator::new(CancellationToken::new());
    let report = SessionLoop::new(&config, source, coordinator)
        .run()
        .await
        .expect("session succeeds");

    let exchanges = agg.handle.await.expect("aggregator");
    assert!(matches!(exchanges[0], Exchange::Batch { .. }));
    assert!(matches!(exchanges[1], Exchange::Idle));
    assert!(matches!(exchanges[2], Exchange::Final { .. }));
    assert!(report.winners.expect("winners").contains(2));
}

#[tokio::test]
async fn peer_hang_up_aborts_without_retry() {
    let agg = spawn_aggregator(Script {
        connections: 1,
        hang_up: true,
        ..Script::default()
    })
    .await;

    let config = test_config(&agg.addr, 1, 1, 0);
    let coordinator = ShutdownCoordinator::new(CancellationToken::new());
    let result = SessionLoop::new(&config, MemorySource::new(sample_records(3)), coordinator)
        .run()
        .await;

    assert!(matches!(result, Err(AppError::Transport(_))), "got: {result:?}");
    let exchanges = agg.handle.await.expect("aggregator");
    assert_eq!(exchanges.len(), 1);
}

#[tokio::test]
async fn unreachable_server_aborts() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);

    let config = test_config(&addr, 1, 1, 0);
    let coordinator = ShutdownCoordinator::new(CancellationToken::new());
    let result = SessionLoop::new(&config, MemorySource::new(sample_records(1)), coordinator)
        .run()
        .await;

    assert!(matches!(result, Err(AppError::Transport(_))), "got: {result:?}");
}

#[tokio::test]
async fn unreadable_row_aborts_the_session() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "Ana,Li,1,2000-01-01,1").expect("write");
    writeln!(file, "Bo,Ma,not-a-number,2000-01-02,2").expect("write");

    let agg = spawn_aggregator(Script {
        connections: 2,
        ..Script::default()
    })
    .await;

    let config = test_config(&agg.addr, 4, 1, 0);
    let source = CsvRecordSource::open(file.path()).await.expect("open");
    let coordinator = ShutdownCoordinator::new(CancellationToken::new());
    let result = SessionLoop::new(&config, source, coordinator).run().await;

    assert!(matches!(result, Err(AppError::Source(_))), "got: {result:?}");
    let exchanges = agg.handle.await.expect("aggregator");
    assert!(matches!(exchanges[1], Exchange::Idle));
}
