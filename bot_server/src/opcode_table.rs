use herald_shared::prelude::*;

use crate::handlers::*;
use crate::session::{Session, SessionContext};

pub type SessionHandler = fn(&mut Session, &SessionContext<'_>, &mut InboundPacket) -> Result<(), PacketError>;

#[derive(Clone, Copy)]
pub enum ServerHandler {
    /// Dispatched by the session on the world tick.
    Session(SessionHandler),
    /// Handled by the socket before a session exists.
    EarlyProcess,
    /// Only ever sent by the bot server.
    ServerSide,
}

pub type ServerOpcodeTable = OpcodeTable<ServerHandler>;

pub fn build_opcode_table() -> ServerOpcodeTable {
    OpcodeTable::new(|opcode| match opcode {
        Opcode::Null => None,
        Opcode::ClientSendHello => Some(ServerHandler::Session(handle_client_send_hello)),
        Opcode::ClientAuthSession => Some(ServerHandler::EarlyProcess),
        Opcode::ClientSendMessage => Some(ServerHandler::Session(handle_client_send_message)),
        Opcode::ClientSendMessageEmbed => Some(ServerHandler::Session(handle_client_send_message_embed)),
        Opcode::ClientSendPing => Some(ServerHandler::Session(handle_client_send_ping)),
        Opcode::ServerSendAuthResponse => Some(ServerHandler::ServerSide),
        Opcode::ServerSendPong => Some(ServerHandler::ServerSide),
    })
}
