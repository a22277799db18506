//! End-to-end tests: server connection, client and wire format together.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use ether::protocol::{
    build_frame, decode_header, encode_header, read_message, write_message, Command, Header,
    Message, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION,
};
use ether::server::{Connection, ServerConfig, ServerState};
use ether::{Client, ClientConfig, EtherError, Server};

/// Serve one in-memory connection with fresh state; the task yields the
/// state back once the peer hangs up.
fn spawn_server(config: ServerConfig) -> (DuplexStream, JoinHandle<ServerState>) {
    let (local, remote) = duplex(64 * 1024);
    let task = tokio::spawn(async move {
        let mut state = ServerState::new(&config);
        let mut conn = Connection::new(remote, config.max_payload_size);
        conn.run(&mut state).await.unwrap();
        state
    });
    (local, task)
}

async fn call(stream: &mut DuplexStream, request: Message) -> Message {
    write_message(stream, &request).await.unwrap();
    read_message(stream, MAX_PAYLOAD_SIZE).await.unwrap()
}

fn write_request(handle: u64, data: &[u8]) -> Message {
    Message::with_payload(Command::Write, handle, Bytes::copy_from_slice(data)).unwrap()
}

#[tokio::test]
async fn test_scenario_a_alloc_write_read_free() {
    let (mut stream, server) = spawn_server(ServerConfig::default());

    let response = call(&mut stream, Message::request(Command::Alloc, 0, 100)).await;
    assert!(response.is_ok());
    assert_eq!(response.handle(), 1);

    let response = call(&mut stream, write_request(1, b"hello\0")).await;
    assert!(response.is_ok());
    assert_eq!(response.handle(), 1);

    let response = call(&mut stream, Message::request(Command::Read, 1, 6)).await;
    assert!(response.is_ok());
    assert_eq!(response.payload(), b"hello\0");

    let response = call(&mut stream, Message::request(Command::Free, 1, 0)).await;
    assert!(response.is_ok());

    let response = call(&mut stream, Message::request(Command::Read, 1, 6)).await;
    assert!(response.is_error());
    assert_eq!(response.handle(), 1);

    drop(stream);
    let state = server.await.unwrap();
    assert!(state.handles().is_empty());
    assert_eq!(state.statistics().current_usage, 0);
}

#[tokio::test]
async fn test_scenario_b_write_overflow() {
    let (mut stream, server) = spawn_server(ServerConfig::default());

    let handle = call(&mut stream, Message::request(Command::Alloc, 0, 10))
        .await
        .handle();

    let response = call(&mut stream, write_request(handle, &[0x5A; 100])).await;
    assert!(response.is_error());
    assert_eq!(response.handle(), handle);

    // The stream stays aligned after the rejected payload.
    let response = call(&mut stream, Message::request(Command::Ping, 0, 0)).await;
    assert_eq!(response.command(), Some(Command::Pong));

    drop(stream);
    let state = server.await.unwrap();
    let entry = state.handles().lookup(handle).unwrap();
    assert_eq!(entry.size, 10);
    assert_eq!(state.allocator().size_of(entry.region), 10);
}

#[test]
fn test_scenario_c_header_fields_survive() {
    let mut header = Header::new(Command::Alloc, 0xDEAD_BEEF_CAFE_BABE, 12345);
    header.flags = 0xA5A5;
    header.reserved = 0x0102_0304;

    let bytes = encode_header(&header);
    assert_eq!(bytes.len(), HEADER_SIZE);

    let decoded = decode_header(&bytes).unwrap();
    assert_eq!(decoded.magic, MAGIC);
    assert_eq!(decoded.version, PROTOCOL_VERSION);
    assert_eq!(decoded.command, Command::Alloc.code());
    assert_eq!(decoded.flags, 0xA5A5);
    assert_eq!(decoded.handle, 0xDEAD_BEEF_CAFE_BABE);
    assert_eq!(decoded.size, 12345);
    assert_eq!(decoded.reserved, 0x0102_0304);
}

#[tokio::test]
async fn test_scenario_d_free_never_issued() {
    let (mut stream, server) = spawn_server(ServerConfig::default());

    call(&mut stream, Message::request(Command::Alloc, 0, 32)).await;
    let response = call(&mut stream, Message::request(Command::Free, 0x4242, 0)).await;
    assert!(response.is_error());
    assert_eq!(response.handle(), 0x4242);

    drop(stream);
    let stats = server.await.unwrap().statistics();
    assert_eq!(stats.num_allocs, 1);
    assert_eq!(stats.num_frees, 0);
    assert_eq!(stats.total_freed, 0);
    assert_eq!(stats.current_usage, 32);
}

#[tokio::test]
async fn test_read_caps_while_write_rejects() {
    let (mut stream, server) = spawn_server(ServerConfig::default());

    let handle = call(&mut stream, Message::request(Command::Alloc, 0, 8))
        .await
        .handle();
    call(&mut stream, write_request(handle, b"12345678")).await;

    let response = call(&mut stream, Message::request(Command::Read, handle, 64)).await;
    assert!(response.is_ok());
    assert_eq!(response.header.size, 8);
    assert_eq!(response.payload(), b"12345678");

    let response = call(&mut stream, write_request(handle, b"123456789")).await;
    assert!(response.is_error());

    drop(stream);
    server.await.unwrap();
}

#[tokio::test]
async fn test_invalid_headers_are_dropped() {
    let (mut stream, server) = spawn_server(ServerConfig::default());

    let mut bad_magic = Message::request(Command::Ping, 0, 0);
    bad_magic.header.magic = 0x1234_5678;
    let mut bad_version = Message::request(Command::Ping, 0, 0);
    bad_version.header.version = 9;
    let mut too_large = Message::request(Command::Ping, 0, 0);
    too_large.header.size = MAX_PAYLOAD_SIZE + 1;

    for msg in [&bad_magic, &bad_version, &too_large] {
        stream.write_all(&build_frame(msg)).await.unwrap();
    }

    let response = call(&mut stream, Message::request(Command::Ping, 0, 0)).await;
    assert_eq!(response.command(), Some(Command::Pong));

    drop(stream);
    server.await.unwrap();
}

#[tokio::test]
async fn test_unknown_command_payload_is_consumed() {
    let (mut stream, server) = spawn_server(ServerConfig::default());

    let mut unknown = Message::with_payload(Command::Write, 0, Bytes::from_static(b"junk")).unwrap();
    unknown.header.command = 0x77;
    let response = call(&mut stream, unknown).await;
    assert!(response.is_error());
    assert_eq!(response.handle(), 0);

    let response = call(&mut stream, Message::request(Command::Realloc, 0, 64)).await;
    assert!(response.is_error());
    assert_eq!(response.handle(), 0);

    let response = call(&mut stream, Message::request(Command::Ping, 0, 0)).await;
    assert_eq!(response.command(), Some(Command::Pong));

    drop(stream);
    server.await.unwrap();
}

#[tokio::test]
async fn test_handle_table_ceiling() {
    let config = ServerConfig {
        max_handles: 2,
        ..ServerConfig::default()
    };
    let (mut stream, server) = spawn_server(config);

    assert!(call(&mut stream, Message::request(Command::Alloc, 0, 4)).await.is_ok());
    assert!(call(&mut stream, Message::request(Command::Alloc, 0, 4)).await.is_ok());
    let response = call(&mut stream, Message::request(Command::Alloc, 0, 4)).await;
    assert!(response.is_error());

    let response = call(&mut stream, Message::request(Command::Free, 1, 0)).await;
    assert!(response.is_ok());
    let response = call(&mut stream, Message::request(Command::Alloc, 0, 4)).await;
    assert!(response.is_ok());
    assert_eq!(response.handle(), 3);

    drop(stream);
    let state = server.await.unwrap();
    assert_eq!(state.handles().len(), 2);
    assert_eq!(state.statistics().current_usage, 8);
}

#[tokio::test]
async fn test_client_over_duplex() {
    let (stream, server) = spawn_server(ServerConfig::default());
    let mut client = Client::with_stream(stream, ClientConfig::default());

    client.ping().await.unwrap();

    let token = client.alloc(16).await.unwrap();
    assert_eq!(client.size(token), Some(16));

    client.write(token, b"remote").await.unwrap();
    assert_eq!(&client.mirror(token).unwrap()[..6], b"remote");

    let data = client.read(token, 100).await.unwrap();
    assert_eq!(data.len(), 16);
    assert_eq!(&data[..6], b"remote");
    assert!(data[6..].iter().all(|&b| b == 0));

    assert!(matches!(
        client.write(token, &[1; 17]).await,
        Err(EtherError::Overflow { len: 17, size: 16 })
    ));

    client.free(token).await.unwrap();
    assert!(client.cache().is_empty());
    assert!(matches!(client.read(token, 1).await, Err(EtherError::NotFound(_))));

    drop(client);
    let stats = server.await.unwrap().statistics();
    assert_eq!(stats.num_allocs, 1);
    assert_eq!(stats.num_frees, 1);
    assert_eq!(stats.peak_usage, 16);
}

#[tokio::test]
async fn test_client_alloc_above_payload_bound_returns_error() {
    let (stream, server) = spawn_server(ServerConfig::default());
    let mut client = Client::with_stream(stream, ClientConfig::default());

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        client.alloc(MAX_PAYLOAD_SIZE as usize + 1),
    )
    .await
    .expect("oversized alloc must fail without waiting for a reply");
    assert!(matches!(result, Err(EtherError::InvalidArgument(_))));

    client.ping().await.unwrap();
    drop(client);
    assert_eq!(server.await.unwrap().statistics().num_allocs, 0);
}

#[tokio::test]
async fn test_client_alloc_rejected_by_memory_limit() {
    let mut config = ServerConfig::default();
    config.allocator.memory_limit = Some(100);
    let (stream, server) = spawn_server(config);
    let mut client = Client::with_stream(stream, ClientConfig::default());

    let first = client.alloc(60).await.unwrap();
    assert!(matches!(
        client.alloc(60).await,
        Err(EtherError::Rejected { command: "ALLOC", handle: 0 })
    ));
    client.free(first).await.unwrap();
    client.alloc(60).await.unwrap();

    drop(client);
    server.await.unwrap();
}

#[tokio::test]
async fn test_tcp_handles_survive_reconnect() {
    let mut server = Server::builder()
        .bind("127.0.0.1:0")
        .max_handles(16)
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let daemon = tokio::spawn(async move {
        server
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
            .unwrap();
        server.shutdown()
    });

    let work = async {
        let mut first = ether::transport::connect(addr).await.unwrap();
        write_message(&mut first, &Message::request(Command::Alloc, 0, 32))
            .await
            .unwrap();
        let handle = read_message(&mut first, MAX_PAYLOAD_SIZE).await.unwrap().handle();
        write_message(&mut first, &write_request(handle, b"persist"))
            .await
            .unwrap();
        assert!(read_message(&mut first, MAX_PAYLOAD_SIZE).await.unwrap().is_ok());
        drop(first);

        let mut second = ether::transport::connect(addr).await.unwrap();
        write_message(&mut second, &Message::request(Command::Read, handle, 7))
            .await
            .unwrap();
        let response = read_message(&mut second, MAX_PAYLOAD_SIZE).await.unwrap();
        assert!(response.is_ok());
        assert_eq!(response.payload(), b"persist");
        drop(second);

        let mut client = Client::connect(addr).await.unwrap();
        let token = client.alloc(8).await.unwrap();
        client.write(token, b"tcp").await.unwrap();
        assert_eq!(&client.read(token, 3).await.unwrap()[..], b"tcp");
    };
    tokio::time::timeout(Duration::from_secs(10), work)
        .await
        .expect("loopback exchange timed out");

    stop_tx.send(()).unwrap();
    let stats = daemon.await.unwrap();
    assert_eq!(stats.num_allocs, 2);
    assert_eq!(stats.num_frees, 2);
    assert_eq!(stats.current_usage, 0);
    assert_eq!(stats.peak_usage, 40);
}
