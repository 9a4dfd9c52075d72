//! Client protocol role on top of the shared socket loop.
//!
//! - Sends `CLIENT_AUTH_SESSION` before anything else, straight into the write queue.
//! - Producer packets queued on the handle are only written once the bot server accepted the
//!   login. Until then they stay in the outbound queue.
//! - Everything the manager needs to know (login result, pongs, close) is reported as a
//!   `ClientSocketEvent` tagged with the socket's generation, so events of a replaced socket can be
//!   told apart from the current one.

use std::sync::Arc;
use std::time::Instant;

use herald_shared::prelude::*;
use herald_shared::reader::PacketReader;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSocketEventKind {
    Authenticated,
    AuthRejected(AuthResponseCode),
    Pong { ping: u32, received_at: Instant },
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSocketEvent {
    pub generation: u32,
    pub kind: ClientSocketEventKind,
}

pub type ClientHandler = fn(&mut ClientSocket, &mut InboundPacket) -> Result<()>;
pub type ClientOpcodeTable = OpcodeTable<ClientHandler>;

pub fn build_client_opcode_table() -> ClientOpcodeTable {
    OpcodeTable::new(|opcode| -> Option<ClientHandler> {
        match opcode {
            Opcode::ServerSendAuthResponse => Some(handle_server_auth_response),
            Opcode::ServerSendPong => Some(handle_server_pong),
            Opcode::Null
            | Opcode::ClientSendHello
            | Opcode::ClientAuthSession
            | Opcode::ClientSendMessage
            | Opcode::ClientSendMessageEmbed
            | Opcode::ClientSendPing => None,
        }
    })
}

pub struct ClientSocket {
    handle: Arc<SocketHandle>,
    generation: u32,
    account_name: String,
    reader: PacketReader,
    opcode_table: Arc<ClientOpcodeTable>,
    auth_answered: bool,
    events: flume::Sender<ClientSocketEvent>,
}

impl ClientSocket {
    pub fn new(
        handle: Arc<SocketHandle>,
        generation: u32,
        account_name: String,
        frame_config: &FrameConfig,
        opcode_table: Arc<ClientOpcodeTable>,
        events: flume::Sender<ClientSocketEvent>,
    ) -> Self {
        Self {
            handle,
            generation,
            account_name,
            reader: PacketReader::new(frame_config),
            opcode_table,
            auth_answered: false,
            events,
        }
    }

    fn emit(&self, kind: ClientSocketEventKind) {
        // The manager may already be gone during shutdown.
        let _ = self.events.send(ClientSocketEvent {
            generation: self.generation,
            kind,
        });
    }

    fn read_data_handler(&mut self, mut packet: InboundPacket) -> Result<()> {
        let opcode = packet.opcode();
        let Some(entry) = self.opcode_table.get(opcode) else {
            bail!("Bot server sent unexpected opcode {}", opcode);
        };
        trace!("Received {} from bot server", entry.name);
        let handler = entry.handler;
        handler(self, &mut packet)
    }
}

fn handle_server_auth_response(socket: &mut ClientSocket, packet: &mut InboundPacket) -> Result<()> {
    if socket.auth_answered {
        bail!("Bot server sent a second auth response");
    }
    socket.auth_answered = true;

    let response = AuthResponse::read(packet)?;
    if response.code == AuthResponseCode::Ok {
        info!("Logged in to bot server as '{}'", socket.account_name);
        socket.handle.set_authed(true);
        socket.emit(ClientSocketEventKind::Authenticated);
    } else {
        error!("Bot server rejected login of '{}': {:?}", socket.account_name, response.code);
        socket.emit(ClientSocketEventKind::AuthRejected(response.code));
    }
    Ok(())
}

fn handle_server_pong(socket: &mut ClientSocket, packet: &mut InboundPacket) -> Result<()> {
    let pong = Pong::read(packet)?;
    socket.emit(ClientSocketEventKind::Pong {
        ping: pong.ping,
        received_at: Instant::now(),
    });
    Ok(())
}

impl SocketHandler for ClientSocket {
    fn start(&mut self, socket: &mut SocketCore) {
        debug!("Connected to bot server {}, sending auth session", self.handle.remote_address());
        socket.send_packet_now(
            AuthSession {
                account_name: self.account_name.clone(),
            }
            .to_packet(),
        );
    }

    fn read_handler(&mut self, socket: &mut SocketCore) -> bool {
        loop {
            let packet = match self.reader.read_packet(socket.read_buffer_mut()) {
                Ok(Some(packet)) => packet,
                Ok(None) => return true,
                Err(e) => {
                    error!("ClientSocket::read_handler: bot server sent an invalid frame: {e}");
                    return false;
                }
            };

            if let Err(e) = self.read_data_handler(packet) {
                error!("ClientSocket::read_handler: {e}");
                return false;
            }
        }
    }

    fn update(&mut self, socket: &mut SocketCore) -> bool {
        if self.handle.is_authed() {
            socket.drain_outbound();
        }
        true
    }

    fn on_close(&mut self, _socket: &mut SocketCore) {
        info!("Connection to bot server {} closed", self.handle.remote_address());
        self.handle.set_authed(false);
        self.emit(ClientSocketEventKind::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_table_binds_only_server_opcodes() {
        let table = build_client_opcode_table();
        let bound: Vec<_> = table.bound_opcodes().collect();
        assert_eq!(bound, vec![Opcode::ServerSendAuthResponse, Opcode::ServerSendPong]);
    }

    fn socket() -> (ClientSocket, Arc<SocketHandle>, flume::Receiver<ClientSocketEvent>) {
        let (handle, _signals) = SocketHandle::new("127.0.0.1:8090".parse().unwrap());
        handle.open();
        let (sender, receiver) = flume::unbounded();
        let socket = ClientSocket::new(
            handle.clone(),
            3,
            "gameserver".into(),
            &FrameConfig::default(),
            Arc::new(build_client_opcode_table()),
            sender,
        );
        (socket, handle, receiver)
    }

    fn auth_response(code: AuthResponseCode) -> InboundPacket {
        let packet = AuthResponse { code }.to_packet();
        InboundPacket::new(packet.opcode(), packet.payload().to_vec())
    }

    #[test]
    fn test_auth_ok_marks_socket_authed() {
        let (mut socket, handle, events) = socket();
        socket.read_data_handler(auth_response(AuthResponseCode::Ok)).unwrap();

        assert!(handle.is_authed());
        assert_eq!(
            events.try_recv().unwrap(),
            ClientSocketEvent {
                generation: 3,
                kind: ClientSocketEventKind::Authenticated
            }
        );
    }

    #[test]
    fn test_second_auth_response_is_an_error() {
        let (mut socket, _handle, _events) = socket();
        socket.read_data_handler(auth_response(AuthResponseCode::Ok)).unwrap();
        assert!(socket.read_data_handler(auth_response(AuthResponseCode::Ok)).is_err());
    }

    #[test]
    fn test_rejection_is_reported() {
        let (mut socket, handle, events) = socket();
        socket.read_data_handler(auth_response(AuthResponseCode::UnknownAccount)).unwrap();

        assert!(!handle.is_authed());
        assert_eq!(events.try_recv().unwrap().kind, ClientSocketEventKind::AuthRejected(AuthResponseCode::UnknownAccount));
    }

    #[test]
    fn test_client_opcode_from_server_is_an_error() {
        let (mut socket, _handle, _events) = socket();
        let packet = InboundPacket::new(Opcode::ClientSendHello, vec![]);
        assert!(socket.read_data_handler(packet).is_err());
    }
}
