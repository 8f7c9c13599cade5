//! Per-connection session state machine.
//!
//! ```text
//! AwaitingHello ──Hello ok──▶ Active ──any error / end of stream──▶ Terminated
//!       │                                                              ▲
//!       └──────────── not Hello / name conflict / read error ─────────┘
//! ```
//!
//! Every error in `Active` is terminal: the session reports it to the client
//! (when the connection can still carry it), then cleans up. Cleanup always
//! runs: the user is deregistered and parted from every channel in its own
//! membership index.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use parley_protocol::{ClientMessage, CodecError, ErrorCode, MessageType, ServerMessage};

use crate::registry::{RegistryError, ServerState, User};
use crate::sink::SharedSink;

/// Source of inbound client messages for one connection.
#[async_trait]
pub trait MessageSource: Send {
    /// Waits for the next message. `Ok(None)` means the peer closed the stream.
    async fn recv(&mut self) -> Result<Option<ClientMessage>, SessionError>;
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Wrong message kind for the current state, or an incompatible version.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The inbound bytes could not be framed or parsed.
    #[error(transparent)]
    Malformed(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Read timeout")]
    Timeout,

    /// The connection was torn down from the outside (write failure or shutdown).
    #[error("Session cancelled")]
    Cancelled,
}

impl SessionError {
    /// Code reported to the client, or `None` when the connection itself is gone.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Protocol(_) | Self::Malformed(_) => Some(ErrorCode::ProtocolError),
            Self::Registry(e) => Some(e.code()),
            Self::Io(_) | Self::Timeout | Self::Cancelled => None,
        }
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug)]
pub enum SessionState {
    AwaitingHello,
    Active(Arc<User>),
    Terminated,
}

/// Drives one connection from Hello to cleanup.
pub struct Session<S> {
    id: u64,
    source: S,
    sink: SharedSink,
    state: Arc<ServerState>,
    phase: SessionState,
}

impl<S: MessageSource> Session<S> {
    /// Creates a session in `AwaitingHello`.
    ///
    /// # Arguments
    ///
    /// * `id` - Connection number, used in logs
    /// * `source` - Inbound messages
    /// * `sink` - Outbound messages for this connection (replies and notifications)
    /// * `state` - Shared registries
    pub fn new(id: u64, source: S, sink: SharedSink, state: Arc<ServerState>) -> Self {
        Self {
            id,
            source,
            sink,
            state,
            phase: SessionState::AwaitingHello,
        }
    }

    /// Runs the session to completion.
    ///
    /// Returns `Ok(())` when the client closed the stream, or the error that
    /// terminated the session. Cleanup has already run either way.
    pub async fn run(mut self) -> Result<(), SessionError> {
        debug!(session = self.id, "Session started");

        let result = self.drive().await;
        if let Err(e) = &result {
            self.report(e);
        }
        self.terminate().await;

        result
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        let Some(user) = self.authenticate().await? else {
            return Ok(());
        };

        while let Some(msg) = self.source.recv().await? {
            self.dispatch(&user, msg).await?;
        }

        debug!(session = self.id, user = %user.name(), "Client closed stream");
        Ok(())
    }

    /// `AwaitingHello`: exactly one message, which must be a compatible Hello
    /// with a free name.
    async fn authenticate(&mut self) -> Result<Option<Arc<User>>, SessionError> {
        let Some(msg) = self.source.recv().await? else {
            debug!(session = self.id, "Client closed stream before hello");
            return Ok(None);
        };

        msg.protocol_version
            .ensure_compatible()
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        let name = match msg.message {
            MessageType::Hello { name } => name,
            other => {
                return Err(SessionError::Protocol(format!(
                    "expected hello, got {}",
                    other.kind()
                )))
            }
        };

        let user = self
            .state
            .users()
            .register(name, Arc::clone(&self.sink))
            .await?;
        self.phase = SessionState::Active(Arc::clone(&user));

        if let Err(e) = user.deliver(ServerMessage::welcome(user.name().clone())) {
            warn!(session = self.id, user = %user.name(), error = %e, "Failed to send welcome");
        }

        info!(session = self.id, user = %user.name(), "Client logged in");
        Ok(Some(user))
    }

    /// `Active`: route one message to the registries.
    async fn dispatch(&self, user: &Arc<User>, msg: ClientMessage) -> Result<(), SessionError> {
        debug!(
            session = self.id,
            user = %user.name(),
            kind = msg.message.kind(),
            "Received message"
        );

        match msg.message {
            MessageType::Hello { .. } => Err(SessionError::Protocol(
                "hello is only valid as the first message".to_string(),
            )),
            MessageType::Join { channel } => {
                let channel = self.state.channels().get_or_create(&channel).await;
                channel.join(user).await?;
                Ok(())
            }
            MessageType::Part { channel } => {
                let channel = self.state.channels().lookup(&channel).await?;
                channel.part(user.name()).await?;
                Ok(())
            }
            MessageType::ChatMessage { channel, content } => {
                let channel = self.state.channels().lookup(&channel).await?;
                channel.send(user.name(), &content).await?;
                Ok(())
            }
        }
    }

    /// Tells the client why its session is ending, if it can still hear it.
    fn report(&self, error: &SessionError) {
        let user = match &self.phase {
            SessionState::Active(user) => Some(user.name().to_string()),
            _ => None,
        };
        info!(session = self.id, user = ?user, error = %error, "Session terminated");

        let Some(code) = error.code() else {
            return;
        };
        if let Err(e) = self.sink.deliver(ServerMessage::error(code, error.to_string())) {
            debug!(session = self.id, error = %e, "Could not report session error");
        }
    }

    /// Enters `Terminated`: deregister, then part every joined channel.
    ///
    /// The name is free again before the parts finish. A new session that
    /// logs in under it and joins a channel not yet parted gets
    /// `AlreadyMember` for that channel.
    async fn terminate(&mut self) {
        let previous = std::mem::replace(&mut self.phase, SessionState::Terminated);
        let SessionState::Active(user) = previous else {
            debug!(session = self.id, "Session ended before login");
            return;
        };

        self.state.users().deregister(&user).await;

        for name in user.channels().await {
            let Some(channel) = self.state.channels().get(name.as_str()).await else {
                continue;
            };
            if let Err(e) = channel.part(user.name()).await {
                debug!(session = self.id, channel = %name, error = %e, "Cleanup part skipped");
            }
        }

        info!(session = self.id, user = %user.name(), "Client disconnected");
    }
}
