//! Per-socket network handler for the bot server.
//!
//! - Plugs into the shared `run_socket` loop as the server protocol role. Framing, batching and the
//!   close handshake live there, this type only decides what complete packets mean.
//! - Performs the authentication handshake locally (IP ban check, `CLIENT_AUTH_SESSION`) because it
//!   has to answer before any session exists.
//! - Database lookups run in the background. Their callbacks are applied on the socket's own tick,
//!   so the socket never shares itself with a query.
//! - Once authenticated, every other packet is checked against the opcode table and handed to the
//!   session through its receive queue. The session itself is owned by the world, never by the socket.
//! - Packets pipelined behind the auth packet are held until the account lookup resolves, then
//!   handed to the new session in order. They are dropped if the login is rejected.

pub mod events;
mod state;

use std::sync::Arc;
use std::time::Duration;

use herald_db::{AccountStore, QueryCallbackProcessor};
use herald_shared::header::FrameConfig;
use herald_shared::prelude::*;
use herald_shared::queue::QueueSender;
use herald_shared::reader::PacketReader;

use crate::handlers::handle_client_auth_session;
use crate::opcode_table::ServerOpcodeTable;
use crate::prelude::*;
use crate::world::ServerState;
use events::WorldEvent;
pub use state::AuthState;

/// Packets a peer may pipeline behind its auth packet before the lookup resolves.
pub const MAX_PACKETS_AWAITING_LOGIN: usize = 256;

/// Shared by every socket the bot server accepts.
pub struct SocketContext {
    pub account_store: Arc<dyn AccountStore>,
    pub world_sender: flume::Sender<WorldEvent>,
    pub server_state: Arc<ServerState>,
    pub opcode_table: Arc<ServerOpcodeTable>,
    pub frame_config: FrameConfig,
    pub socket_update_interval: Duration,
    pub tcp_nodelay: bool,
}

pub struct DiscordSocket {
    handle: Arc<SocketHandle>,
    context: Arc<SocketContext>,
    reader: PacketReader,
    auth_state: AuthState,
    session_queue: Option<QueueSender<InboundPacket>>,
    awaiting_login: Vec<InboundPacket>,
    query_processor: QueryCallbackProcessor<DiscordSocket>,
}

impl DiscordSocket {
    pub fn new(handle: Arc<SocketHandle>, context: Arc<SocketContext>) -> Self {
        let reader = PacketReader::new(&context.frame_config);
        Self {
            handle,
            context,
            reader,
            auth_state: AuthState::CheckingIp,
            session_queue: None,
            awaiting_login: Vec::new(),
            query_processor: QueryCallbackProcessor::new(),
        }
    }

    pub fn handle(&self) -> &Arc<SocketHandle> {
        &self.handle
    }

    pub fn context(&self) -> &Arc<SocketContext> {
        &self.context
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.auth_state
    }

    pub fn set_auth_state(&mut self, auth_state: AuthState) {
        self.auth_state = auth_state;
    }

    pub fn query_processor_mut(&mut self) -> &mut QueryCallbackProcessor<DiscordSocket> {
        &mut self.query_processor
    }

    /// From now on packets go to the session behind `session_queue`.
    pub fn attach_session(&mut self, account_id: u32, session_queue: QueueSender<InboundPacket>) {
        self.handle.set_authed(true);
        self.auth_state = AuthState::Authenticated { account_id };
        for packet in self.awaiting_login.drain(..) {
            // A fresh queue only refuses once the socket closed it.
            if session_queue.enqueue(packet).is_err() {
                break;
            }
        }
        self.session_queue = Some(session_queue);
    }

    /// Answers with a failure code and closes once the answer is written.
    pub fn reject(&mut self, code: AuthResponseCode) {
        self.handle.send_packet(AuthResponse { code }.to_packet());
        self.handle.delayed_close_socket();
        self.auth_state = AuthState::Rejected;
        self.awaiting_login.clear();
    }

    fn check_ip_callback(&mut self, result: Result<bool>) {
        match result {
            Ok(true) => {
                error!("DiscordSocket::check_ip_callback: Sent auth response to banned IP {}", self.handle.remote_ip());
                self.reject(AuthResponseCode::BannedIp);
            }
            Ok(false) => self.auth_state = AuthState::Unauthenticated,
            Err(e) => {
                warn!("IP ban lookup for {} failed, letting it through: {e}", self.handle.remote_ip());
                self.auth_state = AuthState::Unauthenticated;
            }
        }
    }

    fn read_data_handler(&mut self, packet: InboundPacket) -> Result<()> {
        let opcode = packet.opcode();
        trace!("Received {} from {}", opcode, self.handle.remote_address());

        if opcode == Opcode::ClientAuthSession {
            return handle_client_auth_session(self, packet);
        }

        let awaiting_lookup = matches!(self.auth_state, AuthState::AwaitingDbLookup { .. });
        if self.session_queue.is_none() && !awaiting_lookup {
            bail!("{} sent {} before authenticating", self.handle.remote_address(), opcode);
        }

        if self.context.opcode_table.get(opcode).is_none() {
            bail!("No defined handler for opcode {} sent by {}", opcode, self.handle.remote_address());
        }

        match &self.session_queue {
            Some(session_queue) => session_queue
                .enqueue(packet)
                .map_err(|_| anyhow!("Session of {} no longer accepts packets", self.handle.remote_address())),
            None => {
                if self.awaiting_login.len() >= MAX_PACKETS_AWAITING_LOGIN {
                    bail!("{} sent too many packets while its login was pending", self.handle.remote_address());
                }
                self.awaiting_login.push(packet);
                Ok(())
            }
        }
    }

    fn process_query_callbacks(&mut self) {
        let mut processor = std::mem::take(&mut self.query_processor);
        processor.process_ready_callbacks(self);
        // Callbacks may have queued follow-up queries on the now empty slot.
        processor.append(&mut self.query_processor);
        self.query_processor = processor;
    }
}

impl SocketHandler for DiscordSocket {
    fn start(&mut self, _socket: &mut SocketCore) {
        let ip = self.handle.remote_ip();
        info!("Accepted relay connection from {}", self.handle.remote_address());

        let account_store = self.context.account_store.clone();
        self.query_processor
            .add_callback(async move { account_store.is_ip_banned(&ip).await }, |socket: &mut DiscordSocket, result| {
                socket.check_ip_callback(result)
            });
    }

    fn read_handler(&mut self, socket: &mut SocketCore) -> bool {
        loop {
            let packet = match self.reader.read_packet(socket.read_buffer_mut()) {
                Ok(Some(packet)) => packet,
                Ok(None) => return true,
                Err(e) => {
                    error!("DiscordSocket::read_handler: {} sent an invalid frame: {e}", self.handle.remote_address());
                    return false;
                }
            };

            if let Err(e) = self.read_data_handler(packet) {
                error!("DiscordSocket::read_handler: {e}");
                return false;
            }
        }
    }

    fn update(&mut self, socket: &mut SocketCore) -> bool {
        socket.drain_outbound();
        self.process_query_callbacks();
        true
    }

    fn on_close(&mut self, _socket: &mut SocketCore) {
        if let Some(session_queue) = self.session_queue.take() {
            session_queue.close();
        }
        match &self.auth_state {
            AuthState::Authenticated { account_id } => {
                info!("Relay connection of account {} from {} closed", account_id, self.handle.remote_address())
            }
            _ => debug!("Unauthenticated connection from {} closed", self.handle.remote_address()),
        }
    }

    fn wants_read(&self) -> bool {
        self.auth_state.accepts_reads()
    }
}
