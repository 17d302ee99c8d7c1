//! Line-oriented chat front end
//!
//! Reads lines from stdin and prints the conversation to stdout. Lines
//! starting with `/` are commands; anything else is sent as a message.

use hive_core::{ChatMessage, ChatStore};
use hive_net::{ChatClient, ClientEvent, CloseCause, Error as NetError, Reconciled};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// What a line of input asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Say(String),
    /// Reprint the whole conversation
    History,
    Quit,
    Help,
    Unknown(String),
    Empty,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }

        match line {
            "/quit" | "/exit" => Input::Quit,
            "/history" => Input::History,
            "/help" => Input::Help,
            // Doubled slash escapes a leading slash
            _ if line.starts_with("//") => Input::Say(line[1..].to_string()),
            _ if line.starts_with('/') => Input::Unknown(line.to_string()),
            _ => Input::Say(line.to_string()),
        }
    }
}

const HELP: &str = "Commands: /history, /quit, /help. Start a message with // to send a leading slash.";

/// Format one message for display
pub fn format_message(message: &ChatMessage, pending: bool) -> String {
    let mut line = format!(
        "[{}] {}: {}",
        message.format_timestamp(),
        message.sender,
        message.text
    );
    if pending {
        line.push_str(" (sending)");
    }
    line
}

/// Human-readable reason a session ended
pub fn describe_close(cause: &CloseCause) -> String {
    match cause {
        CloseCause::Requested => "Disconnected.".to_string(),
        CloseCause::Remote(Some(info)) if !info.reason.is_empty() => {
            format!("Server closed the connection: {} ({})", info.reason, info.code)
        }
        CloseCause::Remote(_) => "Server closed the connection.".to_string(),
        other => match other.error() {
            Some(e) => format!("Connection lost: {}", e),
            None => "Connection lost.".to_string(),
        },
    }
}

/// Ask for the connection password on stdin
pub async fn prompt_secret(lines: &mut Lines<BufReader<Stdin>>) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Password: ").await?;
    stdout.flush().await?;

    match lines.next_line().await? {
        Some(secret) if !secret.trim().is_empty() => Ok(secret.trim().to_string()),
        _ => Err(Error::MissingSecret),
    }
}

pub fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

/// Connect and run the chat loop until the user quits or the session ends
pub async fn run(
    mut client: ChatClient,
    mut lines: Lines<BufReader<Stdin>>,
    identity: String,
    secret: String,
) -> Result<()> {
    if let Err(e) = client.connect(identity.clone(), &secret).await {
        let message = client.last_error().await.unwrap_or_else(|| e.to_string());
        println!("Could not connect: {}", message);
        return Err(e.into());
    }
    drop(secret);
    println!("Connecting as {}...", identity);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    // stdin closed
                    None => break,
                };

                match Input::parse(&line) {
                    Input::Say(text) => match client.send(text).await {
                        Ok(message_id) => debug!(message_id = %message_id, "Queued message"),
                        Err(NetError::SendBusy) => {
                            println!("Still sending the previous message, try again shortly.");
                        }
                        Err(e) => println!("Not sent: {}", e),
                    },
                    Input::History => print_history(&client).await,
                    Input::Help => println!("{}", HELP),
                    Input::Unknown(command) => println!("Unknown command {}. {}", command, HELP),
                    Input::Quit => break,
                    Input::Empty => {}
                }
            }

            event = client.next_event() => {
                let event = match event {
                    Some(event) => event,
                    None => break,
                };
                if !render_event(&client, event).await {
                    break;
                }
            }
        }
    }

    client.disconnect().await;
    info!("Chat session ended");
    Ok(())
}

/// Print whatever the event changed. Returns false once the session is over.
async fn render_event(client: &ChatClient, event: ClientEvent) -> bool {
    match event {
        ClientEvent::StateChanged(state) => {
            debug!(state = ?state, "Connection state changed");
            true
        }
        ClientEvent::StoreUpdated(Reconciled::Replaced { .. }) => {
            print_history(client).await;
            true
        }
        ClientEvent::StoreUpdated(Reconciled::Upserted { message_id, .. }) => {
            if let Some(message) = client.messages().await.get(&message_id) {
                println!("{}", format_message(message, false));
            }
            true
        }
        ClientEvent::SendConfirmed { .. } => true,
        ClientEvent::SendTimedOut { message_id } => {
            debug!(message_id = %message_id, "Send timed out");
            true
        }
        ClientEvent::Disconnected { cause } => {
            println!("{}", describe_close(&cause));
            false
        }
    }
}

async fn print_history(client: &ChatClient) {
    let store: ChatStore = client.messages().await;
    let pending = client.pending().await;

    if store.is_empty() {
        println!("No messages yet.");
        return;
    }
    for message in store.ordered() {
        println!(
            "{}",
            format_message(message, pending.contains(&message.message_id))
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hive_core::MessageId;
    use hive_net::CloseInfo;

    #[test]
    fn test_parse_input() {
        assert_eq!(Input::parse("  hello  "), Input::Say("hello".into()));
        assert_eq!(Input::parse("/quit"), Input::Quit);
        assert_eq!(Input::parse("/exit"), Input::Quit);
        assert_eq!(Input::parse("/history"), Input::History);
        assert_eq!(Input::parse("   "), Input::Empty);
        assert_eq!(Input::parse("/nope"), Input::Unknown("/nope".into()));
        assert_eq!(Input::parse("//quit"), Input::Say("/quit".into()));
    }

    #[test]
    fn test_format_message() {
        let message = ChatMessage {
            message_id: MessageId::from("m1"),
            sender: "alice".into(),
            text: "hi".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 7, 0).unwrap(),
        };

        assert_eq!(format_message(&message, false), "[09:07] alice: hi");
        assert_eq!(format_message(&message, true), "[09:07] alice: hi (sending)");
    }

    #[test]
    fn test_describe_close() {
        let remote = CloseCause::Remote(Some(CloseInfo {
            code: 1001,
            reason: "going away".into(),
        }));
        assert!(describe_close(&remote).contains("going away"));
        assert!(describe_close(&CloseCause::Transport("reset".into())).contains("reset"));
        assert!(describe_close(&CloseCause::SendTimeout(MessageId::from("m")))
            .contains("not confirmed in time"));
        assert_eq!(describe_close(&CloseCause::Requested), "Disconnected.");
    }
}
