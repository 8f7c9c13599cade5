//! Server connection for the parley terminal client.
//!
//! [`ChatClient`] connects over TCP, performs the hello handshake and then
//! runs two tasks that share a `CancellationToken`:
//! - inbound: socket lines are decoded and forwarded as events
//! - outbound: commands are framed and written to the socket
//!
//! Whichever task finishes first (server closed, user quit, I/O error)
//! cancels the other. There is no reconnection.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use parley_core::UserName;
use parley_protocol::{
    codec, ClientMessage, MessageType, ProtocolVersion, ServerMessage, MAX_MESSAGE_SIZE,
};

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for the chat client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, `host:port`.
    pub server: String,

    /// Name to log in with.
    pub name: UserName,

    /// Upper bound on establishing the TCP connection.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Default server address.
    pub const DEFAULT_SERVER: &'static str = "127.0.0.1:50051";

    pub fn new(name: UserName) -> Self {
        Self {
            server: Self::DEFAULT_SERVER.to_string(),
            name,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Chat Client
// ============================================================================

/// A single logged-in connection to the chat server.
pub struct ChatClient {
    config: ClientConfig,
    cancel_token: CancellationToken,
}

impl ChatClient {
    /// Creates a client; nothing is sent until [`ChatClient::run`].
    #[must_use]
    pub fn new(config: ClientConfig, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            cancel_token,
        }
    }

    /// Connects, logs in and pumps messages until either side is done.
    ///
    /// `commands` carries outbound requests (dropping its sender ends the
    /// session); every server frame, starting with the `Welcome`, is
    /// forwarded to `events`.
    ///
    /// # Errors
    ///
    /// Fails if the connection cannot be established, the server rejects
    /// the hello, or the transport breaks.
    pub async fn run(
        &self,
        commands: mpsc::Receiver<MessageType>,
        events: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<()> {
        let stream = self.connect().await?;
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let welcome = handshake(&mut lines, &mut writer, &self.config.name).await?;
        info!(name = %self.config.name, server = %self.config.server, "Logged in");
        if events.send(welcome).is_err() {
            debug!("Event receiver dropped");
            return Ok(());
        }

        let cancel = self.cancel_token.child_token();
        let inbound = tokio::spawn(inbound_loop(lines, events, cancel.clone()));
        let outbound = tokio::spawn(outbound_loop(writer, commands, cancel));

        let (inbound, outbound) = tokio::join!(inbound, outbound);
        flatten(inbound)?;
        flatten(outbound)
    }

    async fn connect(&self) -> Result<TcpStream> {
        let server = &self.config.server;
        debug!(%server, "Connecting");

        match timeout(self.config.connect_timeout, TcpStream::connect(server)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ClientError::Connection {
                server: server.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ClientError::Connection {
                server: server.clone(),
                reason: "timed out".to_string(),
            }),
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| ClientError::Task(e.to_string()))?
}

/// Sends the hello and waits for the server's verdict.
async fn handshake<R, W>(
    lines: &mut Lines<BufReader<R>>,
    writer: &mut W,
    name: &UserName,
) -> Result<ServerMessage>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    send_message(writer, &ClientMessage::hello(name.clone())).await?;

    let line = lines.next_line().await?.ok_or(ClientError::Closed)?;
    let response: ServerMessage = codec::decode(&line, MAX_MESSAGE_SIZE)?;

    match response {
        ServerMessage::Welcome {
            protocol_version, ..
        } if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) => {
            Err(ClientError::VersionMismatch {
                client_version: ProtocolVersion::CURRENT.to_string(),
                server_version: protocol_version.to_string(),
            })
        }
        ServerMessage::Welcome { .. } => Ok(response),
        ServerMessage::Error { code, message } => Err(ClientError::Rejected { code, message }),
        other => Err(ClientError::ProtocolError(format!(
            "Unexpected response to hello: {other:?}"
        ))),
    }
}

/// Writes one newline-delimited frame.
async fn send_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &ClientMessage) -> Result<()> {
    let line = codec::encode(message)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    debug!(message_type = message.message.kind(), "Sent message to server");
    Ok(())
}

/// Forwards server frames to `events` until EOF or cancellation.
async fn inbound_loop<R: AsyncRead + Unpin>(
    mut lines: Lines<BufReader<R>>,
    events: mpsc::UnboundedSender<ServerMessage>,
    cancel: CancellationToken,
) -> Result<()> {
    let result: Result<()> = loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Server closed the connection");
                break Ok(());
            }
            Err(e) => break Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }

        match codec::decode::<ServerMessage>(&line, MAX_MESSAGE_SIZE) {
            Ok(msg) => {
                if let ServerMessage::Error { code, message } = &msg {
                    warn!(%code, %message, "Server reported an error");
                }
                if events.send(msg).is_err() {
                    debug!("Event receiver dropped");
                    break Ok(());
                }
            }
            Err(e) => break Err(e.into()),
        }
    };

    cancel.cancel();
    result
}

/// Writes commands to the socket until the command sender is dropped or
/// the token is cancelled. Dropping the writer half-closes the socket.
async fn outbound_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut commands: mpsc::Receiver<MessageType>,
    cancel: CancellationToken,
) -> Result<()> {
    let result: Result<()> = loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            command = commands.recv() => command,
        };

        let Some(command) = command else {
            debug!("Command stream ended");
            break writer.shutdown().await.map_err(ClientError::from);
        };

        if let Err(e) = send_message(&mut writer, &ClientMessage::new(command)).await {
            break Err(e);
        }
    };

    cancel.cancel();
    result
}
