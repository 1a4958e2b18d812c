//! Line-oriented chat REPL for the avatar session.
//!
//! Each input line is sent as a query and the reply is spoken through the
//! configured speech backend. Spoken sentences are echoed to stdout as they
//! start; tracing output goes to stderr.
//!
//! Commands: `/stop` interrupts speech, `/image <url> <text>` sends a query
//! with an image, `/history` prints the conversation, `/quit` ends the
//! session.

use std::path::PathBuf;
use std::sync::Arc;

use avatar_chat::speech::SpeechEvent;
use avatar_chat::{AvatarChatConfig, AvatarError, Session};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Talk to a speaking avatar backed by a chat model.
#[derive(Parser)]
#[command(name = "avatar-chat", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive conversation (default).
    Chat,
    /// Write a default configuration file and exit.
    InitConfig,
}

enum Input<'a> {
    Query { text: &'a str, image: Option<&'a str> },
    Stop,
    History,
    Quit,
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/stop" => Input::Stop,
        "/history" => Input::History,
        "/quit" | "/exit" => Input::Quit,
        _ => match line.strip_prefix("/image ") {
            Some(rest) => {
                let (url, text) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
                Input::Query {
                    text: text.trim(),
                    image: Some(url),
                }
            }
            None => Input::Query {
                text: line,
                image: None,
            },
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("avatar_chat=info,reqwest=warn")),
        )
        .init();

    let cli = Cli::parse();
    let path = cli
        .config
        .unwrap_or_else(AvatarChatConfig::default_config_path);

    match cli.command.unwrap_or(Command::Chat) {
        Command::InitConfig => {
            AvatarChatConfig::default().save_to_file(&path)?;
            println!("wrote {}", path.display());
            Ok(())
        }
        Command::Chat => {
            let config = AvatarChatConfig::from_file(&path)
                .map_err(|e| anyhow::anyhow!("loading {}: {e}", path.display()))?;
            run_chat(config).await
        }
    }
}

async fn run_chat(config: AvatarChatConfig) -> anyhow::Result<()> {
    let session = Arc::new(Session::start(config)?);
    info!(session_id = session.id(), "avatar-chat ready");

    let mut events = session.speech().subscribe();
    let echo = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "speech events lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                SpeechEvent::UtteranceStarted { text, .. } if !text.trim().is_empty() => {
                    println!("avatar: {}", text.trim());
                }
                SpeechEvent::UtteranceFailed { id, error } => {
                    warn!(utterance_id = id, %error, "could not speak sentence");
                }
                _ => {}
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Empty => {}
            Input::Stop => session.stop_speaking().await,
            Input::History => {
                for message in session.history() {
                    println!("[{}] {}: {}", message.sequence, message.role, message.content.text());
                }
            }
            Input::Quit => break,
            Input::Query { text, image } => {
                let session = Arc::clone(&session);
                let text = text.to_owned();
                let image = image.map(str::to_owned);
                tokio::spawn(async move {
                    match session.submit_query(&text, image.as_deref()).await {
                        Ok(outcome) if outcome.interrupted => info!("reply interrupted"),
                        Ok(_) => {}
                        Err(AvatarError::Cancelled(reason)) => info!(%reason, "query dropped"),
                        Err(e) => eprintln!("error: {e}"),
                    }
                });
            }
        }
    }

    session.stop().await;
    echo.abort();
    info!("avatar-chat shut down cleanly");
    Ok(())
}
