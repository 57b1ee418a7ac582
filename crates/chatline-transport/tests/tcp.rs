//! Integration tests for the plain TCP transport.

use std::sync::Arc;
use std::time::Duration;

use chatline_transport::{Connection, TcpTransport, Transport, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn bind() -> (TcpTransport, String) {
    let transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("local addr").to_string();
    (transport, addr)
}

#[tokio::test]
async fn test_tcp_accept_and_send_receive() {
    let (mut transport, addr) = bind().await;

    let server_handle =
        tokio::spawn(async move { transport.accept().await.expect("accept") });
    let mut client = TcpStream::connect(&addr).await.expect("connect");
    let server_conn = server_handle.await.expect("task should complete");

    client.write_all(b"1 alice\r\n").await.unwrap();
    let received = server_conn
        .recv()
        .await
        .expect("recv should succeed")
        .expect("should have data");
    assert_eq!(received, b"1 alice\r\n");

    server_conn.send(b"bob: hi\n").await.expect("send");
    let mut buf = [0u8; 64];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"bob: hi\n");
}

#[tokio::test]
async fn test_tcp_recv_returns_none_on_client_eof() {
    let (mut transport, addr) = bind().await;

    let server_handle =
        tokio::spawn(async move { transport.accept().await.expect("accept") });
    let client = TcpStream::connect(&addr).await.expect("connect");
    let server_conn = server_handle.await.unwrap();

    drop(client);

    let result = server_conn.recv().await.expect("recv should not error");
    assert!(result.is_none());
}

#[tokio::test]
async fn test_tcp_close_sends_eof_and_rejects_later_writes() {
    let (mut transport, addr) = bind().await;

    let server_handle =
        tokio::spawn(async move { transport.accept().await.expect("accept") });
    let mut client = TcpStream::connect(&addr).await.expect("connect");
    let server_conn = server_handle.await.unwrap();

    server_conn.close().await.expect("close");
    server_conn.close().await.expect("second close is a no-op");

    let mut buf = [0u8; 8];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "client should observe EOF");

    let result = server_conn.send(b"late\n").await;
    assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
}

#[tokio::test]
async fn test_tcp_connections_get_distinct_ids() {
    let (mut transport, addr) = bind().await;

    let server_handle = tokio::spawn(async move {
        let a = transport.accept().await.expect("accept a");
        let b = transport.accept().await.expect("accept b");
        (a, b)
    });
    let _c1 = TcpStream::connect(&addr).await.unwrap();
    let _c2 = TcpStream::connect(&addr).await.unwrap();
    let (a, b) = server_handle.await.unwrap();

    assert_ne!(a.id(), b.id());
}

#[tokio::test]
async fn test_tcp_interrupted_write_refuses_later_writes() {
    let (mut transport, addr) = bind().await;

    let server_handle =
        tokio::spawn(async move { transport.accept().await.expect("accept") });
    // Connected but never read from, so the socket buffers fill up.
    let _client = TcpStream::connect(&addr).await.expect("connect");
    let server_conn = server_handle.await.unwrap();

    let chunk = vec![b'x'; 64 * 1024];
    let mut interrupted = false;
    for _ in 0..4096 {
        let write = tokio::time::timeout(
            Duration::from_millis(100),
            server_conn.send(&chunk),
        )
        .await;
        if write.is_err() {
            interrupted = true;
            break;
        }
        write.unwrap().expect("write before the buffer fills");
    }
    assert!(interrupted, "socket buffers never filled");

    let result = server_conn.send(b"alice: after\n").await;
    assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
}

#[tokio::test]
async fn test_tcp_close_wakes_parked_recv() {
    let (mut transport, addr) = bind().await;

    let server_handle =
        tokio::spawn(async move { transport.accept().await.expect("accept") });
    let _client = TcpStream::connect(&addr).await.expect("connect");
    let server_conn = Arc::new(server_handle.await.unwrap());

    let reader = {
        let conn = Arc::clone(&server_conn);
        tokio::spawn(async move { conn.recv().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    server_conn.close().await.expect("close");

    let result = tokio::time::timeout(Duration::from_secs(2), reader)
        .await
        .expect("recv should return after close")
        .unwrap();
    assert!(result.expect("recv should not error").is_none());
}

#[tokio::test]
async fn test_tcp_dropping_transport_stops_listening() {
    let (transport, addr) = bind().await;

    drop(transport);

    assert!(TcpStream::connect(&addr).await.is_err());
}
