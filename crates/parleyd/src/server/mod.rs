//! TCP server for the parley daemon.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Runs one [`Session`] per client against the shared [`ServerState`]
//! - Caps concurrent connections with a semaphore
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐  outbound   ┌─────────────────┐
//! │ Session task    │────────────▶│  Writer task    │──▶ socket
//! │ (LineSource)    │  mpsc queue │  (write_loop)   │
//! └───────┬─────────┘             └─────────────────┘
//!         │ join / part / send
//!         ▼
//! ┌─────────────────┐
//! │   ServerState   │
//! │ users, channels │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{write_frame, write_loop, ConnectionError, LineSource};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use parley_protocol::{ErrorCode, ServerMessage};

use crate::config::ServerConfig;
use crate::registry::ServerState;
use crate::session::Session;
use crate::sink::SharedSink;

/// How long shutdown waits for open sessions to finish their cleanup.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// TCP server for the chat daemon.
pub struct ChatServer {
    /// Listener and per-connection limits
    config: ServerConfig,

    /// Registries shared by every session
    state: Arc<ServerState>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating connection IDs
    connection_counter: AtomicU64,

    /// One permit per open connection
    permits: Arc<Semaphore>,
}

impl ChatServer {
    /// Creates a new chat server.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated server configuration
    /// * `state` - Shared user and channel registries
    /// * `cancel_token` - Token for graceful shutdown
    pub fn new(
        mut config: ServerConfig,
        state: Arc<ServerState>,
        cancel_token: CancellationToken,
    ) -> Self {
        config.max_connections = config.max_connections.min(Semaphore::MAX_PERMITS);
        let permits = Arc::new(Semaphore::new(config.max_connections));
        Self {
            config,
            state,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            permits,
        }
    }

    /// Returns the shared registries.
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Returns the number of currently open connections.
    pub fn open_connections(&self) -> usize {
        self.config
            .max_connections
            .saturating_sub(self.permits.available_permits())
    }

    /// Binds the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.listen;
        TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::SocketSetup {
                addr,
                error: e.to_string(),
            })
    }

    /// Binds the configured address and serves until cancelled.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections on `listener` until the cancellation token is
    /// triggered, then waits briefly for open sessions to clean up.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::SocketSetup {
                addr: self.config.listen,
                error: e.to_string(),
            })?;

        info!(%addr, "Chat server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let id = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, id);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        drop(listener);
        self.drain().await;
        Ok(())
    }

    /// Spawns the session and writer tasks for a new client.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, id: u64) {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    connection = id,
                    %peer,
                    max = self.config.max_connections,
                    "Connection limit reached, rejecting client"
                );
                tokio::spawn(reject_full(stream, self.config.write_timeout()));
                return;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection = id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_queue);
        let cancel = self.cancel_token.child_token();
        let write_timeout = self.config.write_timeout();

        let writer_task = tokio::spawn(write_loop(
            id,
            writer,
            outbound_rx,
            cancel.clone(),
            write_timeout,
        ));

        let source = LineSource::new(
            reader,
            cancel.clone(),
            self.config.idle_timeout(),
            self.config.max_message_size,
        );
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let _permit = permit;
            debug!(connection = id, %peer, "Client connected");

            let sink: SharedSink = Arc::new(outbound_tx);
            if let Err(e) = Session::new(id, source, sink, state).run().await {
                debug!(connection = id, error = %e, "Session ended with error");
            }

            // The session dropped its sender, so the writer exits once the
            // queue is flushed.
            if timeout(write_timeout, writer_task).await.is_err() {
                debug!(connection = id, "Writer did not drain in time");
            }
            cancel.cancel();

            debug!(connection = id, %peer, "Client disconnected");
        });
    }

    /// Waits for open connections to release their permits.
    async fn drain(&self) {
        let open = self.open_connections();
        if open == 0 {
            info!("Server stopped");
            return;
        }

        debug!(open, "Waiting for sessions to finish");
        let all = u32::try_from(self.config.max_connections).unwrap_or(u32::MAX);
        match timeout(SHUTDOWN_GRACE, self.permits.acquire_many(all)).await {
            Ok(_) => info!("Server stopped"),
            Err(_) => warn!(
                open = self.open_connections(),
                "Server stopped with sessions still closing"
            ),
        }
    }
}

/// Tells a client the server is full and closes the connection.
async fn reject_full(stream: TcpStream, write_timeout: Duration) {
    let (_reader, mut writer) = stream.into_split();
    let msg = ServerMessage::error(ErrorCode::ServerFull, "server is full");
    if let Err(e) = write_frame(&mut writer, &msg, write_timeout).await {
        debug!(error = %e, "Failed to send server-full rejection");
    }
}

/// Errors that can occur in the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to set up socket at {addr}: {error}")]
    SocketSetup { addr: SocketAddr, error: String },
}
