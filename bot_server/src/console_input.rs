use std::time::Duration;

use smol::io::{AsyncBufReadExt, BufReader};
use smol::stream::StreamExt;

use crate::connection::events::{WorldCommand, WorldEvent};
use crate::prelude::*;
use crate::world::ShutdownExitCode;

/// Reads operator commands from stdin and queues them for the world. Ends when stdin closes or the
/// world is gone.
pub async fn process_console_commands(world_sender: flume::Sender<WorldEvent>) {
    let mut lines = BufReader::new(smol::Unblock::new(std::io::stdin())).lines();

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read console input: {e}");
                break;
            }
        };

        match parse_command(&line) {
            Ok(Some(command)) => {
                if world_sender.send_async(WorldEvent::Command(command)).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("{e}"),
        }
    }
}

pub fn parse_command(line: &str) -> Result<Option<WorldCommand>> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };

    let command = match command.to_ascii_lowercase().as_str() {
        "shutdown" | "restart" => {
            let exit_code = if command.eq_ignore_ascii_case("restart") {
                ShutdownExitCode::Restart
            } else {
                ShutdownExitCode::Shutdown
            };
            let seconds: u64 = words
                .next()
                .ok_or_else(|| anyhow!("Usage: {command} <seconds> [reason]"))?
                .parse()
                .map_err(|e| anyhow!("Invalid delay: {e}"))?;
            WorldCommand::Shutdown {
                delay: Duration::from_secs(seconds),
                exit_code,
                reason: words.collect::<Vec<_>>().join(" "),
            }
        }
        "cancel" => WorldCommand::CancelShutdown,
        "kick" => {
            let account_id = words
                .next()
                .ok_or_else(|| anyhow!("Usage: kick <account id>"))?
                .parse()
                .map_err(|e| anyhow!("Invalid account id: {e}"))?;
            WorldCommand::Kick { account_id }
        }
        "close" => WorldCommand::SetClosed(true),
        "open" => WorldCommand::SetClosed(false),
        "online" => WorldCommand::ReportOnline,
        "exit" => WorldCommand::StopNow(ShutdownExitCode::Shutdown),
        other => bail!("Unknown command '{other}'. Commands: shutdown, restart, cancel, kick, close, open, online, exit"),
    };

    Ok(Some(command))
}
