//! Line-oriented transport for a single TCP connection.
//!
//! Each connection is served by two cooperating tasks that share one
//! `CancellationToken`:
//! - the session task reads frames through [`LineSource`]
//! - the writer task drains the connection's outbound queue ([`write_loop`])
//!
//! A failed write cancels the token, which makes the next read return
//! `SessionError::Cancelled` so the session terminates and cleans up.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_protocol::{codec, ClientMessage, CodecError, ServerMessage};

use crate::session::{MessageSource, SessionError};

/// Reads newline-delimited JSON client messages.
pub struct LineSource<R> {
    reader: BufReader<R>,
    cancel: CancellationToken,
    idle_timeout: Option<Duration>,
    max_message_size: usize,
    line: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> LineSource<R> {
    /// Creates a source over the read half of a connection.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the stream
    /// * `cancel` - Token shared with the connection's writer task
    /// * `idle_timeout` - Maximum wait for the next line (`None` waits forever)
    /// * `max_message_size` - Longest accepted line in bytes
    pub fn new(
        reader: R,
        cancel: CancellationToken,
        idle_timeout: Option<Duration>,
        max_message_size: usize,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            cancel,
            idle_timeout,
            max_message_size,
            line: Vec::new(),
        }
    }

    /// Reads one line into `self.line`, never buffering more than one byte
    /// past the size limit.
    async fn read_line(&mut self) -> Result<usize, SessionError> {
        self.line.clear();

        let limit = u64::try_from(self.max_message_size)
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let mut limited = (&mut self.reader).take(limit);
        let read = limited.read_until(b'\n', &mut self.line);

        let result = match self.idle_timeout {
            Some(idle) => timeout(idle, read)
                .await
                .map_err(|_| SessionError::Timeout)?,
            None => read.await,
        };

        result.map_err(|e| SessionError::Io(e.to_string()))
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> MessageSource for LineSource<R> {
    async fn recv(&mut self) -> Result<Option<ClientMessage>, SessionError> {
        let cancel = self.cancel.clone();

        loop {
            let bytes = tokio::select! {
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                result = self.read_line() => result?,
            };

            if bytes == 0 {
                return Ok(None);
            }
            if self.line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let msg = codec::decode_bytes(&self.line, self.max_message_size)?;
            return Ok(Some(msg));
        }
    }
}

/// Errors raised while writing to a client.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Encode(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,
}

/// Writes one framed message, bounded by `limit`.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &ServerMessage,
    limit: Duration,
) -> Result<(), ConnectionError> {
    let line = codec::encode(msg)?;

    match timeout(limit, async {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Drains a connection's outbound queue to the socket.
///
/// Runs until every sender is gone and the queue is empty, the token is
/// cancelled, or a write fails (which cancels the token).
pub async fn write_loop<W: AsyncWrite + Unpin>(
    connection: u64,
    writer: W,
    mut outbound: mpsc::Receiver<ServerMessage>,
    cancel: CancellationToken,
    write_timeout: Duration,
) {
    let mut writer = BufWriter::new(writer);

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = outbound.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        if let Err(e) = write_frame(&mut writer, &msg, write_timeout).await {
            warn!(connection, error = %e, "Failed to write to client");
            cancel.cancel();
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(connection, error = %e, "Failed to shut down write half");
    }
    debug!(connection, "Writer finished");
}
