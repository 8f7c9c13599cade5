//! Line input handling for the terminal client.
//!
//! [`parse_line`] turns one line of user input into an [`Input`]; a
//! [`Focus`] remembers which channels the user is in and resolves inputs
//! into protocol messages. All argument errors stay local and never reach
//! the server.

use parley_core::{ChannelName, DomainError};
use parley_protocol::MessageType;

/// Text shown for `/help`.
pub const HELP: &str = "\
commands:
  /join <channel>         join (or create) a channel
  /part <channel>         leave a channel
  /msg <channel> <text>   send to a specific channel
  /quit                   disconnect
  /help                   show this help
anything else is sent to the most recently joined channel";

// ============================================================================
// Parsed Input
// ============================================================================

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Join(ChannelName),
    Part(ChannelName),
    Msg { channel: ChannelName, text: String },
    /// Plain text for the current channel.
    Say(String),
    Quit,
    Help,
    /// Blank line.
    Empty,
}

/// Problems with a line of input.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown command /{0} (try /help)")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    InvalidName(#[from] DomainError),

    #[error("not in any channel (try /join <channel>)")]
    NoCurrentChannel,

    #[error("already in {0}")]
    AlreadyJoined(ChannelName),

    #[error("not in {0}")]
    NotJoined(ChannelName),
}

/// Parses one line of user input.
pub fn parse_line(line: &str) -> Result<Input, InputError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(Input::Empty);
    }

    let Some(command) = line.strip_prefix('/') else {
        return Ok(Input::Say(line.to_string()));
    };

    let (verb, rest) = match command.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (command, ""),
    };

    match verb {
        "join" => single_channel(rest, "/join <channel>").map(Input::Join),
        "part" => single_channel(rest, "/part <channel>").map(Input::Part),
        "msg" => {
            let (channel, text) = rest
                .split_once(char::is_whitespace)
                .ok_or(InputError::Usage("/msg <channel> <text>"))?;
            let text = text.trim_start();
            if text.is_empty() {
                return Err(InputError::Usage("/msg <channel> <text>"));
            }
            Ok(Input::Msg {
                channel: ChannelName::new(channel)?,
                text: text.to_string(),
            })
        }
        "quit" => Ok(Input::Quit),
        "help" => Ok(Input::Help),
        other => Err(InputError::UnknownCommand(other.to_string())),
    }
}

fn single_channel(rest: &str, usage: &'static str) -> Result<ChannelName, InputError> {
    let mut args = rest.split_whitespace();
    match (args.next(), args.next()) {
        (Some(name), None) => Ok(ChannelName::new(name)?),
        _ => Err(InputError::Usage(usage)),
    }
}

// ============================================================================
// Channel Focus
// ============================================================================

/// What the caller should do with a resolved input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send(MessageType),
    Help,
    Quit,
    None,
}

/// Tracks joined channels; the most recently joined one is current.
#[derive(Debug, Default)]
pub struct Focus {
    joined: Vec<ChannelName>,
}

impl Focus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the channel plain text goes to.
    pub fn current(&self) -> Option<&ChannelName> {
        self.joined.last()
    }

    pub fn is_joined(&self, channel: &ChannelName) -> bool {
        self.joined.contains(channel)
    }

    /// Resolves an input against the joined set, updating it for joins and
    /// parts.
    pub fn apply(&mut self, input: Input) -> Result<Action, InputError> {
        match input {
            Input::Join(channel) => {
                if self.is_joined(&channel) {
                    return Err(InputError::AlreadyJoined(channel));
                }
                self.joined.push(channel.clone());
                Ok(Action::Send(MessageType::Join { channel }))
            }
            Input::Part(channel) => {
                let Some(pos) = self.joined.iter().position(|c| c == &channel) else {
                    return Err(InputError::NotJoined(channel));
                };
                self.joined.remove(pos);
                Ok(Action::Send(MessageType::Part { channel }))
            }
            Input::Msg { channel, text } => Ok(Action::Send(MessageType::ChatMessage {
                channel,
                content: text,
            })),
            Input::Say(text) => {
                let channel = self.current().ok_or(InputError::NoCurrentChannel)?.clone();
                Ok(Action::Send(MessageType::ChatMessage {
                    channel,
                    content: text,
                }))
            }
            Input::Quit => Ok(Action::Quit),
            Input::Help => Ok(Action::Help),
            Input::Empty => Ok(Action::None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str) -> ChannelName {
        ChannelName::new(name).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line("/join general"), Ok(Input::Join(channel("general"))));
        assert_eq!(parse_line("/part  general \n"), Ok(Input::Part(channel("general"))));
        assert_eq!(
            parse_line("/msg rust hello there"),
            Ok(Input::Msg {
                channel: channel("rust"),
                text: "hello there".to_string()
            })
        );
        assert_eq!(parse_line("/quit"), Ok(Input::Quit));
        assert_eq!(parse_line("/help"), Ok(Input::Help));
    }

    #[test]
    fn test_plain_text_and_blank_lines() {
        assert_eq!(parse_line("hi all\n"), Ok(Input::Say("hi all".to_string())));
        assert_eq!(parse_line("   \r\n"), Ok(Input::Empty));
    }

    #[test]
    fn test_argument_errors_stay_local() {
        assert_eq!(parse_line("/join"), Err(InputError::Usage("/join <channel>")));
        assert_eq!(parse_line("/join a b"), Err(InputError::Usage("/join <channel>")));
        assert_eq!(parse_line("/msg rust"), Err(InputError::Usage("/msg <channel> <text>")));
        assert_eq!(
            parse_line("/kick bob"),
            Err(InputError::UnknownCommand("kick".to_string()))
        );
    }

    #[test]
    fn test_say_goes_to_most_recent_channel() {
        let mut focus = Focus::new();
        assert_eq!(
            focus.apply(Input::Say("x".into())),
            Err(InputError::NoCurrentChannel)
        );

        focus.apply(Input::Join(channel("a"))).unwrap();
        focus.apply(Input::Join(channel("b"))).unwrap();
        assert_eq!(
            focus.apply(Input::Say("hi".into())).unwrap(),
            Action::Send(MessageType::ChatMessage {
                channel: channel("b"),
                content: "hi".to_string()
            })
        );

        focus.apply(Input::Part(channel("b"))).unwrap();
        assert_eq!(focus.current(), Some(&channel("a")));
    }

    #[test]
    fn test_duplicate_join_and_stray_part_are_local_errors() {
        let mut focus = Focus::new();
        focus.apply(Input::Join(channel("a"))).unwrap();

        assert_eq!(
            focus.apply(Input::Join(channel("a"))),
            Err(InputError::AlreadyJoined(channel("a")))
        );
        assert_eq!(
            focus.apply(Input::Part(channel("z"))),
            Err(InputError::NotJoined(channel("z")))
        );
    }
}
