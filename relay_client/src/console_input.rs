use smol::io::{AsyncBufReadExt, BufReader};
use smol::stream::StreamExt;

use crate::client_socket_mgr::RelayClient;
use crate::prelude::*;

#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleLine {
    Message(String),
    Quit,
}

/// Forwards each stdin line as a chat message to `channel_id`. `.quit` stops the relay.
pub async fn process_console_input(client: RelayClient, channel_id: i64) {
    let mut lines = BufReader::new(smol::Unblock::new(std::io::stdin())).lines();

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read console input: {e}");
                break;
            }
        };

        match parse_line(&line) {
            Some(ConsoleLine::Quit) => {
                info!("Stopping relay client");
                client.stop();
                break;
            }
            Some(ConsoleLine::Message(message)) => {
                if let Err(e) = client.send_message(channel_id, message) {
                    warn!("{e}");
                    break;
                }
            }
            None => {}
        }
    }
}

pub fn parse_line(line: &str) -> Option<ConsoleLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    if line.trim() == ".quit" {
        return Some(ConsoleLine::Quit);
    }
    Some(ConsoleLine::Message(line.to_string()))
}
