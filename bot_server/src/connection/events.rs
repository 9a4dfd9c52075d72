use std::fmt;
use std::time::Duration;

use crate::session::Session;
use crate::world::ShutdownExitCode;

/// Events produced by the network/IO layer and the console, consumed by the world on its own tick.
pub enum WorldEvent {
    /// A socket finished authenticating. The session is registered on the next world update.
    AddSession(Box<Session>),
    Command(WorldCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldCommand {
    Shutdown {
        delay: Duration,
        exit_code: ShutdownExitCode,
        reason: String,
    },
    CancelShutdown,
    Kick {
        account_id: u32,
    },
    SetClosed(bool),
    ReportOnline,
    StopNow(ShutdownExitCode),
}

impl fmt::Display for WorldEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldEvent::AddSession(session) => write!(f, "AddSession({})", session.account_id()),
            WorldEvent::Command(command) => write!(f, "Command({command:?})"),
        }
    }
}
