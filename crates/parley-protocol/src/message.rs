//! Protocol message types for client/server communication.

use crate::version::ProtocolVersion;
use parley_core::{ChannelName, UserName};
use serde::{Deserialize, Serialize};

/// Message kinds a client can send to the server.
///
/// `Hello` must be the first message on a connection; the others are only
/// valid afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Log in under a unique name
    Hello { name: UserName },

    /// Request membership of a channel (created on first join)
    Join { channel: ChannelName },

    /// Leave a channel
    Part { channel: ChannelName },

    /// Post text to a channel the sender is a member of
    ChatMessage {
        channel: ChannelName,
        content: String,
    },
}

impl MessageType {
    /// Short name of the kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Join { .. } => "join",
            Self::Part { .. } => "part",
            Self::ChatMessage { .. } => "chat_message",
        }
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Protocol version
    pub protocol_version: ProtocolVersion,

    /// Message payload
    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn hello(name: UserName) -> Self {
        Self::new(MessageType::Hello { name })
    }

    pub fn join(channel: ChannelName) -> Self {
        Self::new(MessageType::Join { channel })
    }

    pub fn part(channel: ChannelName) -> Self {
        Self::new(MessageType::Part { channel })
    }

    pub fn chat(channel: ChannelName, content: impl Into<String>) -> Self {
        Self::new(MessageType::ChatMessage {
            channel,
            content: content.into(),
        })
    }
}

/// Machine-readable reason attached to a terminal [`ServerMessage::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ProtocolError,
    NameConflict,
    ChannelNotFound,
    AlreadyMember,
    NotAMember,
    ServerFull,
}

impl ErrorCode {
    /// Returns the wire spelling of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProtocolError => "protocol_error",
            Self::NameConflict => "name_conflict",
            Self::ChannelNotFound => "channel_not_found",
            Self::AlreadyMember => "already_member",
            Self::NotAMember => "not_a_member",
            Self::ServerFull => "server_full",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages sent from server to clients.
///
/// `Join`, `Part` and `ChatMessage` are notifications about *other*
/// members; a client never receives its own actions echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Hello accepted; the session is active
    Welcome {
        protocol_version: ProtocolVersion,
        name: UserName,
    },

    /// Another user joined a channel this client is in
    Join { channel: ChannelName, user: UserName },

    /// Another user left a channel this client is in
    Part { channel: ChannelName, user: UserName },

    /// Another member posted to a shared channel
    ChatMessage {
        channel: ChannelName,
        sender: UserName,
        content: String,
    },

    /// The session is ending; the server closes the connection after this
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    pub fn welcome(name: UserName) -> Self {
        Self::Welcome {
            protocol_version: ProtocolVersion::CURRENT,
            name,
        }
    }

    pub fn join(channel: ChannelName, user: UserName) -> Self {
        Self::Join { channel, user }
    }

    pub fn part(channel: ChannelName, user: UserName) -> Self {
        Self::Part { channel, user }
    }

    pub fn chat(channel: ChannelName, sender: UserName, content: impl Into<String>) -> Self {
        Self::ChatMessage {
            channel,
            sender,
            content: content.into(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str) -> ChannelName {
        ChannelName::new(name).unwrap()
    }

    fn user(name: &str) -> UserName {
        UserName::new(name).unwrap()
    }

    #[test]
    fn test_client_message_serialization() {
        let msg = ClientMessage::chat(channel("general"), "hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"chat_message\""));
        assert!(json.contains("\"channel\":\"general\""));
        assert!(json.contains("\"protocol_version\":{\"major\":1,\"minor\":0}"));
    }

    #[test]
    fn test_client_message_parses_flat_object() {
        let json = r#"{"protocol_version":{"major":1,"minor":0},"type":"hello","name":"alice"}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, ClientMessage::hello(user("alice")));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"protocol_version":{"major":1,"minor":0},"type":"kick","user":"bob"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_invalid_name_is_rejected() {
        let json = r#"{"protocol_version":{"major":1,"minor":0},"type":"join","channel":""}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_server_notification_serialization() {
        let msg = ServerMessage::chat(channel("general"), user("alice"), "hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"chat_message","channel":"general","sender":"alice","content":"hi"}"#
        );
    }

    #[test]
    fn test_error_code_serialization() {
        let msg = ServerMessage::error(ErrorCode::ChannelNotFound, "no such channel nowhere");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"code\":\"channel_not_found\""));

        let parsed: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_error_code_display_matches_wire() {
        for code in [
            ErrorCode::ProtocolError,
            ErrorCode::NameConflict,
            ErrorCode::ChannelNotFound,
            ErrorCode::AlreadyMember,
            ErrorCode::NotAMember,
            ErrorCode::ServerFull,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{code}\""));
        }
    }

    #[test]
    fn test_message_kind_names() {
        assert_eq!(ClientMessage::part(channel("x")).message.kind(), "part");
        assert_eq!(ClientMessage::hello(user("x")).message.kind(), "hello");
    }
}
