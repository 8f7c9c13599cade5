//! Formatting of server events for the terminal.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};

use parley_protocol::ServerMessage;

const TIME_FORMAT: &str = "%H:%M:%S";

/// Renders one server event as a single timestamped line.
///
/// ```text
/// 12:00:01 [general] <alice> hi
/// 12:00:02 [general] * bob has joined
/// ```
pub fn render_event<Tz>(msg: &ServerMessage, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let time = at.format(TIME_FORMAT);

    match msg {
        ServerMessage::Welcome {
            name,
            protocol_version,
        } => format!("{time} * connected as {name} (protocol {protocol_version})"),
        ServerMessage::Join { channel, user } => {
            format!("{time} [{channel}] * {user} has joined")
        }
        ServerMessage::Part { channel, user } => format!("{time} [{channel}] * {user} has left"),
        ServerMessage::ChatMessage {
            channel,
            sender,
            content,
        } => format!("{time} [{channel}] <{sender}> {content}"),
        ServerMessage::Error { code, message } => {
            format!("{time} ! server closed the session ({code}): {message}")
        }
    }
}

/// Renders a locally generated notice (input errors, help).
pub fn render_notice<Tz>(text: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{} ! {text}", at.format(TIME_FORMAT))
}
