//! Integration tests for the TCP chat server.
//!
//! These tests run a real `ChatServer` on an ephemeral localhost port and
//! talk to it over newline-delimited JSON, covering login, membership
//! notifications, chat fan-out, terminal errors and disconnect cleanup.
//!
//! Tests CAN use `.unwrap()` and `.expect()`; the panic-free behavior of
//! production code is checked through assertions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parley_core::{ChannelName, UserName};
use parley_protocol::{
    codec, ClientMessage, ErrorCode, MessageType, ProtocolVersion, ServerMessage,
    MAX_MESSAGE_SIZE,
};
use parleyd::config::ServerConfig;
use parleyd::registry::ServerState;
use parleyd::server::ChatServer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on waiting for any expected frame
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a client must stay quiet to count as "received nothing"
const SILENCE: Duration = Duration::from_millis(150);

/// Interval between registry state checks
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Helpers
// ============================================================================

fn user(name: &str) -> UserName {
    UserName::new(name).unwrap()
}

fn channel(name: &str) -> ChannelName {
    ChannelName::new(name).unwrap()
}

/// Test server context that manages server lifecycle.
struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(ServerConfig::default()).await
    }

    async fn spawn_with(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let state = Arc::new(ServerState::new());
        let cancel_token = CancellationToken::new();
        let server = ChatServer::new(config, Arc::clone(&state), cancel_token.clone());

        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        TestServer {
            addr,
            state,
            cancel_token,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect to server");
        TestClient::new(stream)
    }

    /// Connects and completes the hello handshake.
    async fn login(&self, name: &str) -> TestClient {
        let mut client = self.connect().await;
        client.send(ClientMessage::hello(user(name))).await;
        match client.recv().await {
            ServerMessage::Welcome { name: welcomed, .. } => assert_eq!(welcomed.as_str(), name),
            other => panic!("Expected Welcome, got {other:?}"),
        }
        client
    }

    /// Sorted member names of `name`, or `None` if the channel does not exist.
    async fn members(&self, name: &str) -> Option<Vec<String>> {
        let channel = self.state.channels().get(name).await?;
        Some(
            channel
                .member_names()
                .await
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }

    /// Polls until the channel's members equal `expected`.
    async fn wait_for_members(&self, name: &str, expected: &[&str]) {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let members = self.members(name).await.unwrap_or_default();
            if members == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "{name} members stayed {members:?}, expected {expected:?}"
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Polls until `name` is no longer registered.
    async fn wait_for_logout(&self, name: &str) {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        while self.state.users().contains(name).await {
            assert!(
                tokio::time::Instant::now() < deadline,
                "{name} is still registered"
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    fn shutdown(self) {
        self.cancel_token.cancel();
    }
}

/// Test client connection with protocol helpers.
struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, msg: ClientMessage) {
        let line = codec::encode(&msg).unwrap();
        self.send_raw(&line).await;
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn join(&mut self, name: &str) {
        self.send(ClientMessage::join(channel(name))).await;
    }

    async fn part(&mut self, name: &str) {
        self.send(ClientMessage::part(channel(name))).await;
    }

    async fn say(&mut self, name: &str, content: &str) {
        self.send(ClientMessage::chat(channel(name), content)).await;
    }

    /// Receives the next frame, failing the test if none arrives in time.
    async fn recv(&mut self) -> ServerMessage {
        let mut line = String::new();
        let read = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a frame")
            .unwrap();
        assert!(read > 0, "connection closed while waiting for a frame");
        codec::decode(&line, MAX_MESSAGE_SIZE).unwrap()
    }

    /// Asserts that nothing arrives for a short while.
    async fn assert_silent(&mut self) {
        let mut line = String::new();
        if let Ok(read) = timeout(SILENCE, self.reader.read_line(&mut line)).await {
            panic!("expected silence, got {read:?}: {line:?}");
        }
    }

    /// Expects an `Error` frame with `code`, then end of stream.
    async fn expect_error_and_close(&mut self, code: ErrorCode) {
        match self.recv().await {
            ServerMessage::Error { code: got, .. } => assert_eq!(got, code),
            other => panic!("Expected Error({code}), got {other:?}"),
        }
        self.expect_closed().await;
    }

    async fn expect_closed(&mut self) {
        let mut line = String::new();
        let read = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("server did not close the connection")
            .unwrap_or(0);
        assert_eq!(read, 0, "expected end of stream, got {line:?}");
    }
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_hello_is_welcomed() {
    let server = TestServer::spawn().await;
    let _alice = server.login("alice").await;

    assert!(server.state.users().contains("alice").await);
    server.shutdown();
}

#[tokio::test]
async fn test_first_message_must_be_hello() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.join("general").await;
    client.expect_error_and_close(ErrorCode::ProtocolError).await;
    assert!(server.state.channels().is_empty().await);
    server.shutdown();
}

#[tokio::test]
async fn test_name_conflict_leaves_existing_session_alone() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;
    alice.join("general").await;
    server.wait_for_members("general", &["alice"]).await;

    let mut impostor = server.connect().await;
    impostor.send(ClientMessage::hello(user("alice"))).await;
    impostor.expect_error_and_close(ErrorCode::NameConflict).await;

    // The first session still works.
    let mut bob = server.login("bob").await;
    bob.join("general").await;
    assert_eq!(alice.recv().await, ServerMessage::join(channel("general"), user("bob")));
    alice.say("general", "still here").await;
    assert_eq!(
        bob.recv().await,
        ServerMessage::chat(channel("general"), user("alice"), "still here")
    );
    server.shutdown();
}

#[tokio::test]
async fn test_incompatible_protocol_version() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let hello = ClientMessage {
        protocol_version: ProtocolVersion::new(2, 0),
        message: MessageType::Hello { name: user("zed") },
    };
    client.send(hello).await;
    client.expect_error_and_close(ErrorCode::ProtocolError).await;
    assert!(!server.state.users().contains("zed").await);
    server.shutdown();
}

#[tokio::test]
async fn test_malformed_line_ends_session() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;
    alice.join("general").await;
    server.wait_for_members("general", &["alice"]).await;

    alice.send_raw("{\"type\": \"join\"\n").await;
    alice.expect_error_and_close(ErrorCode::ProtocolError).await;

    server.wait_for_logout("alice").await;
    server.wait_for_members("general", &[]).await;
    server.shutdown();
}

#[tokio::test]
async fn test_invalid_name_is_malformed() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let raw = serde_json::json!({
        "protocol_version": {"major": 1, "minor": 0},
        "type": "hello",
        "name": "has space",
    });
    client.send_raw(&format!("{raw}\n")).await;
    client.expect_error_and_close(ErrorCode::ProtocolError).await;
    assert!(server.state.users().is_empty().await);
    server.shutdown();
}

// ============================================================================
// Membership and Chat Scenarios
// ============================================================================

#[tokio::test]
async fn test_join_chat_part_scenarios() {
    let server = TestServer::spawn().await;

    // A: alice creates general, bob joins and alice is told.
    let mut alice = server.login("alice").await;
    alice.join("general").await;
    server.wait_for_members("general", &["alice"]).await;

    let mut bob = server.login("bob").await;
    bob.join("general").await;
    assert_eq!(alice.recv().await, ServerMessage::join(channel("general"), user("bob")));
    assert_eq!(
        server.members("general").await,
        Some(vec!["alice".to_string(), "bob".to_string()])
    );

    // B: alice's message reaches bob only.
    alice.say("general", "hi").await;
    assert_eq!(
        bob.recv().await,
        ServerMessage::chat(channel("general"), user("alice"), "hi")
    );

    // C: bob leaves and alice is told.
    bob.part("general").await;
    assert_eq!(alice.recv().await, ServerMessage::part(channel("general"), user("bob")));
    assert_eq!(server.members("general").await, Some(vec!["alice".to_string()]));

    alice.assert_silent().await;
    bob.assert_silent().await;
    server.shutdown();
}

#[tokio::test]
async fn test_send_reaches_every_other_member() {
    let server = TestServer::spawn().await;
    let names = ["ann", "ben", "cat", "dan"];

    let mut clients = Vec::new();
    for name in names {
        let mut client = server.login(name).await;
        client.join("room").await;
        clients.push(client);
    }
    server.wait_for_members("room", &names).await;

    // Drain the join notices each earlier member received.
    for (i, client) in clients.iter_mut().enumerate() {
        for _ in (i + 1)..names.len() {
            assert!(matches!(client.recv().await, ServerMessage::Join { .. }));
        }
    }

    clients[0].say("room", "hello room").await;
    for client in clients.iter_mut().skip(1) {
        assert_eq!(
            client.recv().await,
            ServerMessage::chat(channel("room"), user("ann"), "hello room")
        );
    }
    clients[0].assert_silent().await;
    server.shutdown();
}

#[tokio::test]
async fn test_double_join_terminates_session() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;
    alice.join("general").await;
    server.wait_for_members("general", &["alice"]).await;

    // D: the second join fails with AlreadyMember and ends bob's session.
    let mut bob = server.login("bob").await;
    bob.join("general").await;
    bob.join("general").await;
    bob.expect_error_and_close(ErrorCode::AlreadyMember).await;

    assert_eq!(alice.recv().await, ServerMessage::join(channel("general"), user("bob")));
    assert_eq!(alice.recv().await, ServerMessage::part(channel("general"), user("bob")));
    alice.assert_silent().await;

    server.wait_for_members("general", &["alice"]).await;
    server.wait_for_logout("bob").await;
    server.shutdown();
}

#[tokio::test]
async fn test_chat_to_unknown_channel_terminates_session() {
    let server = TestServer::spawn().await;

    // E: nobody ever joined "nowhere".
    let mut charlie = server.login("charlie").await;
    charlie.say("nowhere", "anyone?").await;
    charlie
        .expect_error_and_close(ErrorCode::ChannelNotFound)
        .await;

    server.wait_for_logout("charlie").await;
    assert!(server.state.channels().get("nowhere").await.is_none());
    server.shutdown();
}

#[tokio::test]
async fn test_send_without_membership_terminates_session() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;
    alice.join("general").await;
    server.wait_for_members("general", &["alice"]).await;

    let mut mallory = server.login("mallory").await;
    mallory.say("general", "lurking").await;
    mallory.expect_error_and_close(ErrorCode::NotAMember).await;

    alice.assert_silent().await;
    server.shutdown();
}

#[tokio::test]
async fn test_abrupt_disconnect_cleans_up() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;
    alice.join("general").await;
    alice.join("random").await;
    server.wait_for_members("general", &["alice"]).await;
    server.wait_for_members("random", &["alice"]).await;

    let mut bob = server.login("bob").await;
    bob.join("random").await;
    assert_eq!(alice.recv().await, ServerMessage::join(channel("random"), user("bob")));

    // F: alice vanishes; both channels survive, alice is gone from each.
    drop(alice);
    assert_eq!(bob.recv().await, ServerMessage::part(channel("random"), user("alice")));

    server.wait_for_logout("alice").await;
    server.wait_for_members("general", &[]).await;
    server.wait_for_members("random", &["bob"]).await;
    assert_eq!(server.state.channels().len().await, 2);

    // The name is free again.
    let _alice = server.login("alice").await;
    server.shutdown();
}

#[tokio::test]
async fn test_concurrent_joins_share_one_channel() {
    let server = TestServer::spawn().await;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let mut client = server.login(&format!("user{i}")).await;
        tasks.push(tokio::spawn(async move {
            client.join("lobby").await;
            client
        }));
    }

    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap());
    }

    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        let count = match server.state.channels().get("lobby").await {
            Some(lobby) => lobby.member_count().await,
            None => 0,
        };
        if count == 16 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "only {count} joined");
        sleep(POLL_INTERVAL).await;
    }
    assert_eq!(server.state.channels().len().await, 1);
    server.shutdown();
}

// ============================================================================
// Server Limits and Shutdown
// ============================================================================

#[tokio::test]
async fn test_server_full_rejects_extra_connection() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let server = TestServer::spawn_with(config).await;
    let _alice = server.login("alice").await;

    let mut extra = server.connect().await;
    extra.expect_error_and_close(ErrorCode::ServerFull).await;
    server.shutdown();
}

#[tokio::test]
async fn test_oversized_line_ends_session() {
    let config = ServerConfig {
        max_message_size: 256,
        ..ServerConfig::default()
    };
    let server = TestServer::spawn_with(config).await;
    let mut alice = server.login("alice").await;
    alice.join("general").await;

    let long = "x".repeat(1024);
    alice.say("general", &long).await;

    // The unread tail of the line may turn the close into a reset, so the
    // error frame is checked only if it arrives.
    let mut line = String::new();
    if let Ok(Ok(read)) = timeout(RECV_TIMEOUT, alice.reader.read_line(&mut line)).await {
        if read > 0 {
            let frame: ServerMessage = codec::decode(&line, MAX_MESSAGE_SIZE).unwrap();
            assert!(matches!(
                frame,
                ServerMessage::Error {
                    code: ErrorCode::ProtocolError,
                    ..
                }
            ));
        }
    }
    server.wait_for_logout("alice").await;
    assert!(server.state.channels().get("general").await.is_some());
    server.shutdown();
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;
    alice.join("general").await;
    server.wait_for_members("general", &["alice"]).await;

    let state = Arc::clone(&server.state);
    server.shutdown();

    alice.expect_closed().await;
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while !state.users().is_empty().await {
        assert!(tokio::time::Instant::now() < deadline, "users left after shutdown");
        sleep(POLL_INTERVAL).await;
    }
}
