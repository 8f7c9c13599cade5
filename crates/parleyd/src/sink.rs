//! Outbound event sinks.
//!
//! A sink is the only way the core talks back to a connection. Delivery
//! never blocks: the production sink is a bounded per-connection queue that
//! a writer task drains to the socket, so one stuck peer cannot stall the
//! user whose action triggered the notification.

use std::sync::Arc;

use tokio::sync::mpsc;

use parley_protocol::ServerMessage;

/// Shared handle to a connection's outbound sink.
pub type SharedSink = Arc<dyn EventSink>;

/// Destination for server-to-client messages.
pub trait EventSink: Send + Sync {
    /// Attempts to hand one message to the connection without blocking.
    fn deliver(&self, msg: ServerMessage) -> Result<(), DeliveryError>;
}

/// Why a single delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    QueueFull,

    #[error("connection is closed")]
    Closed,
}

impl EventSink for mpsc::Sender<ServerMessage> {
    fn deliver(&self, msg: ServerMessage) -> Result<(), DeliveryError> {
        self.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
