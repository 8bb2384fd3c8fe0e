//! Unit tests for the full-read / full-write primitives.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use agency_client::protocol::io::Connection;
use agency_client::AppError;

#[tokio::test]
async fn read_exact_assembles_short_reads() {
    // A 2-byte pipe forces the payload to arrive in several short reads.
    let (client, mut server) = tokio::io::duplex(2);
    let mut conn = Connection::new(client, "duplex", &CancellationToken::new());

    let payload: Vec<u8> = (0u8..32).collect();
    let expected = payload.clone();
    tokio::spawn(async move {
        server.write_all(&payload).await.expect("write");
        // Keep the pipe open until the reader is done.
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    assert_eq!(conn.read_exact(32).await.expect("read"), expected);
}

#[tokio::test]
async fn read_exact_of_zero_bytes_returns_immediately() {
    let (client, _server) = tokio::io::duplex(8);
    let mut conn = Connection::new(client, "duplex", &CancellationToken::new());
    assert!(conn.read_exact(0).await.expect("read").is_empty());
}

#[tokio::test]
async fn read_exact_reports_peer_close_as_transport_error() {
    let (client, mut server) = tokio::io::duplex(8);
    let mut conn = Connection::new(client, "duplex", &CancellationToken::new());

    server.write_all(&[1, 2]).await.expect("write");
    drop(server);

    match conn.read_exact(4).await {
        Err(AppError::Transport(msg)) => assert!(msg.contains("peer closed"), "got: {msg}"),
        other => panic!("expected Transport, got: {other:?}"),
    }
}

#[tokio::test]
async fn write_exact_delivers_everything_through_a_narrow_pipe() {
    let (client, mut server) = tokio::io::duplex(3);
    let mut conn = Connection::new(client, "duplex", &CancellationToken::new());

    let reader = tokio::spawn(async move {
        let mut received = vec![0u8; 100];
        server.read_exact(&mut received).await.expect("read");
        received
    });

    let payload: Vec<u8> = (0u8..100).collect();
    conn.write_exact(&payload).await.expect("write");

    assert_eq!(reader.await.expect("join"), payload);
}

#[tokio::test]
async fn force_close_unblocks_pending_read_as_shutdown() {
    let (client, _server) = tokio::io::duplex(8);
    let mut conn = Connection::new(client, "duplex", &CancellationToken::new());
    let handle = conn.handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.close();
    });

    let result = tokio::time::timeout(Duration::from_secs(2), conn.read_exact(1))
        .await
        .expect("read must be unblocked by the close switch");

    assert!(matches!(result, Err(AppError::Shutdown(_))), "got: {result:?}");
    assert!(conn.is_closed());
}

#[tokio::test]
async fn force_close_unblocks_pending_write_as_shutdown() {
    // Nobody drains the 1-byte pipe, so the write blocks.
    let (client, _server) = tokio::io::duplex(1);
    let mut conn = Connection::new(client, "duplex", &CancellationToken::new());
    let handle = conn.handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.close();
    });

    let result = tokio::time::timeout(Duration::from_secs(2), conn.write_exact(&[0u8; 64]))
        .await
        .expect("write must be unblocked by the close switch");

    assert!(matches!(result, Err(AppError::Shutdown(_))), "got: {result:?}");
}

#[tokio::test]
async fn process_cancellation_trips_every_connection() {
    let token = CancellationToken::new();
    let (client, _server) = tokio::io::duplex(8);
    let mut conn = Connection::new(client, "duplex", &token);

    token.cancel();

    assert!(conn.handle().is_closed());
    assert!(matches!(conn.read_exact(1).await, Err(AppError::Shutdown(_))));
}

#[tokio::test]
async fn close_is_idempotent() {
    let (client, _server) = tokio::io::duplex(8);
    let mut conn = Connection::new(client, "duplex", &CancellationToken::new());

    conn.close().await;
    conn.close().await;
    conn.handle().close();

    assert!(conn.is_closed());
}

#[tokio::test]
async fn io_after_normal_close_is_a_transport_error() {
    let (client, _server) = tokio::io::duplex(8);
    let mut conn = Connection::new(client, "duplex", &CancellationToken::new());
    conn.close().await;

    assert!(matches!(conn.write_exact(&[1]).await, Err(AppError::Transport(_))));
}

#[tokio::test]
async fn connect_failure_is_a_transport_error() {
    // Bind then drop to obtain a port with no listener.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);

    let result = Connection::connect(&addr, &CancellationToken::new()).await;
    assert!(matches!(result, Err(AppError::Transport(_))), "got: {result:?}");
}

#[tokio::test]
async fn connect_after_cancellation_is_shutdown() {
    let token = CancellationToken::new();
    token.cancel();

    let result = Connection::connect("127.0.0.1:9", &token).await;
    assert!(matches!(result, Err(AppError::Shutdown(_))), "got: {result:?}");
}
