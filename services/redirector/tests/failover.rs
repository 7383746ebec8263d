
use harness::{closed_by_peer, refused_addr, try_roundtrip, RedirectorHandle, ReplyBackend, TcpEchoBackend};
use rrredir::Target;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn refused_first_target_fails_over_to_second() {
    let dead = refused_addr().await;
    let backend = ReplyBackend::spawn(b"PONG").await.unwrap();

    let redirector = RedirectorHandle::spawn(vec![Target::new(dead), Target::new(backend.addr)])
        .await
        .unwrap();

    let reply = try_roundtrip(redirector.listen_addr, b"PING").await;
    assert_eq!(reply.as_deref(), Ok(&b"PONG"[..]));
    assert_eq!(backend.received(), b"PING");
    assert_eq!(backend.connection_count(), 1);
    assert_eq!(redirector.stat(|s| &s.upstream_connected), 1);
}

#[tokio::test]
async fn first_reachable_target_wins_for_every_connection() {
    let primary = TcpEchoBackend::spawn().await.unwrap();
    let secondary = TcpEchoBackend::spawn().await.unwrap();

    let redirector = RedirectorHandle::spawn(vec![
        Target::new(primary.addr),
        Target::new(secondary.addr),
    ])
    .await
    .unwrap();

    for i in 0..4 {
        let payload = format!("req{}", i);
        let reply = try_roundtrip(redirector.listen_addr, payload.as_bytes()).await;
        assert_eq!(reply.as_deref(), Ok(payload.as_bytes()), "request {}", i);
    }

    // No rotation across connections: the secondary is never used.
    assert_eq!(primary.connection_count(), 4);
    assert_eq!(secondary.connection_count(), 0);
}

#[tokio::test]
async fn later_target_used_after_several_refusals() {
    let backend = TcpEchoBackend::spawn().await.unwrap();

    let redirector = RedirectorHandle::spawn(vec![
        Target::new(refused_addr().await),
        Target::new(refused_addr().await),
        Target::new(refused_addr().await),
        Target::new(backend.addr),
    ])
    .await
    .unwrap();

    let reply = try_roundtrip(redirector.listen_addr, b"hello").await;
    assert_eq!(reply.as_deref(), Ok(&b"hello"[..]));
    assert_eq!(backend.connection_count(), 1);
}

#[tokio::test]
async fn client_closed_when_no_target_reachable() {
    let redirector = RedirectorHandle::spawn(vec![
        Target::new(refused_addr().await),
        Target::new(refused_addr().await),
    ])
    .await
    .unwrap();

    let mut client = TcpStream::connect(redirector.listen_addr).await.unwrap();
    assert!(closed_by_peer(&mut client).await);

    assert_eq!(redirector.wait_for_stat(|s| &s.upstream_failed, 1).await, 1);
    // The worker is reaped even though it never relayed anything.
    assert_eq!(redirector.wait_for_stat(|s| &s.connections_active, 0).await, 0);
    assert_eq!(redirector.wait_for_stat(|s| &s.connections_closed, 1).await, 1);
}

#[tokio::test]
async fn relay_preserves_bidirectional_stream() {
    let backend = TcpEchoBackend::spawn().await.unwrap();
    let redirector = RedirectorHandle::spawn(vec![Target::new(backend.addr)])
        .await
        .unwrap();

    let mut client = TcpStream::connect(redirector.listen_addr).await.unwrap();

    // Larger than one relay buffer, so it crosses several reads.
    let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
    let (mut reader, mut writer) = client.split();

    let send = async {
        writer.write_all(&payload).await.unwrap();
    };
    let recv = async {
        let mut echoed = vec![0u8; payload.len()];
        reader.read_exact(&mut echoed).await.unwrap();
        echoed
    };
    let ((), echoed) = tokio::join!(send, recv);
    assert_eq!(echoed, payload);

    drop(client);
    assert_eq!(redirector.wait_for_stat(|s| &s.connections_closed, 1).await, 1);
    assert_eq!(redirector.stat(|s| &s.bytes_to_upstream), payload.len() as u64);
    assert_eq!(redirector.stat(|s| &s.bytes_from_upstream), payload.len() as u64);
}

#[tokio::test]
async fn client_half_close_ends_relay() {
    let backend = ReplyBackend::spawn(b"bye").await.unwrap();
    let redirector = RedirectorHandle::spawn(vec![Target::new(backend.addr)])
        .await
        .unwrap();

    let mut client = TcpStream::connect(redirector.listen_addr).await.unwrap();
    client.write_all(b"hi").await.unwrap();

    let mut buf = [0u8; 3];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"bye");

    client.shutdown().await.unwrap();
    assert!(closed_by_peer(&mut client).await);
}
