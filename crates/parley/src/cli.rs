//! Command-line entry point for the `parley` binary.
//!
//! # Usage
//!
//! ```bash
//! # Log in as alice on the local server
//! parley alice
//!
//! # Connect to a remote server
//! parley alice --server chat.example.org:50051
//!
//! # Show connection diagnostics on stderr
//! RUST_LOG=parley_client=debug parley alice
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use parley_core::UserName;
use parley_protocol::MessageType;

use crate::client::{ChatClient, ClientConfig};
use crate::input::{parse_line, Action, Focus, HELP};
use crate::render::{render_event, render_notice};

/// parley - terminal chat client
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct Args {
    /// Name to log in with
    pub name: String,

    /// Server address (host:port)
    #[arg(short, long, env = "PARLEY_SERVER", default_value = ClientConfig::DEFAULT_SERVER)]
    pub server: String,
}

/// Parses arguments and runs an interactive session on stdin/stdout.
pub fn main() -> Result<()> {
    let args = Args::parse();
    run(args)
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    // Logs go to stderr so they never interleave with chat output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let name = UserName::new(args.name).context("Invalid user name")?;
    let config = ClientConfig {
        server: args.server,
        ..ClientConfig::new(name)
    };

    let cancel_token = CancellationToken::new();
    let client = ChatClient::new(config, cancel_token.clone());

    let (command_tx, command_rx) = mpsc::channel(32);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("{}", render_event(&event, &Local::now()));
        }
    });
    let input = tokio::spawn(input_loop(
        spawn_stdin_reader(),
        command_tx,
        cancel_token.clone(),
    ));

    let result = client.run(command_rx, event_tx).await;

    cancel_token.cancel();
    let _ = input.await;
    let _ = printer.await;

    result.context("Connection ended")
}

/// Reads stdin on a plain thread so a pending read never holds up runtime
/// shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Turns user lines into protocol commands. Returning drops `commands`,
/// which ends the session.
pub async fn input_loop(
    mut lines: mpsc::Receiver<String>,
    commands: mpsc::Sender<MessageType>,
    cancel: CancellationToken,
) {
    let mut focus = Focus::new();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        match parse_line(&line).and_then(|input| focus.apply(input)) {
            Ok(Action::Send(msg)) => {
                if commands.send(msg).await.is_err() {
                    break;
                }
            }
            Ok(Action::Help) => println!("{HELP}"),
            Ok(Action::Quit) => break,
            Ok(Action::None) => {}
            Err(e) => println!("{}", render_notice(&e.to_string(), &Local::now())),
        }
    }
}
