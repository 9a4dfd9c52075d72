use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use herald_db::QueryCallbackProcessor;
use herald_shared::prelude::*;
use herald_shared::queue::QueueReceiver;

use crate::bot::ChatBot;
use crate::opcode_table::{ServerHandler, ServerOpcodeTable};
use crate::prelude::*;

/// What a session needs from the world while it handles packets.
pub struct SessionContext<'a> {
    pub opcode_table: &'a ServerOpcodeTable,
    pub bot: &'a dyn ChatBot,
    pub max_packets_per_update: usize,
}

/// Server-side state of one authenticated relay connection. Owned by the session registry and only
/// ever updated from the world tick.
pub struct Session {
    account_id: u32,
    account_name: String,
    remote_address: SocketAddr,
    socket: Option<Arc<SocketHandle>>,
    receive_queue: QueueReceiver<InboundPacket>,
    latency: u32,
    relayed_messages: u64,
    kicked: bool,
    query_processor: QueryCallbackProcessor<Session>,
}

impl Session {
    pub fn new(account_id: u32, account_name: String, socket: Arc<SocketHandle>, receive_queue: QueueReceiver<InboundPacket>) -> Self {
        Self {
            account_id,
            account_name,
            remote_address: socket.remote_address(),
            socket: Some(socket),
            receive_queue,
            latency: 0,
            relayed_messages: 0,
            kicked: false,
            query_processor: QueryCallbackProcessor::new(),
        }
    }

    pub fn account_id(&self) -> u32 {
        self.account_id
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }

    pub fn set_latency(&mut self, latency: u32) {
        self.latency = latency;
    }

    pub fn relayed_messages(&self) -> u64 {
        self.relayed_messages
    }

    pub fn note_relayed_message(&mut self) {
        self.relayed_messages += 1;
    }

    pub fn is_kicked(&self) -> bool {
        self.kicked
    }

    pub fn socket(&self) -> Option<&Arc<SocketHandle>> {
        self.socket.as_ref()
    }

    pub fn query_processor_mut(&mut self) -> &mut QueryCallbackProcessor<Session> {
        &mut self.query_processor
    }

    pub fn send_packet(&self, packet: OutboundPacket) {
        match &self.socket {
            Some(socket) => {
                trace!("Sending {} to account {}", packet.opcode(), self.account_id);
                socket.send_packet(packet);
            }
            None => trace!("Dropping {} for account {}, no socket", packet.opcode(), self.account_id),
        }
    }

    pub fn send_auth_response(&self, code: AuthResponseCode) {
        self.send_packet(AuthResponse { code }.to_packet());
    }

    /// Closes the transport. The registry drops the session on its next sweep.
    pub fn kick_session(&mut self, reason: &str, set_kicked: bool) {
        if let Some(socket) = &self.socket {
            info!("Kicking session of account {} ({}): {}", self.account_id, self.remote_address, reason);
            socket.close_socket();
        }
        if set_kicked {
            self.kicked = true;
        }
    }

    /// True once the transport stopped being open. The socket is released at that point.
    pub fn handle_socket_closed(&mut self) -> bool {
        match &self.socket {
            Some(socket) if !socket.is_open() => {
                self.socket = None;
                true
            }
            _ => false,
        }
    }

    /// Handles at most `max_packets_per_update` queued packets in arrival order, then ready query
    /// callbacks. Returns false once the session should be removed.
    pub fn update(&mut self, _diff: Duration, context: &SessionContext) -> bool {
        let mut processed = 0;
        while self.socket.is_some() && processed < context.max_packets_per_update {
            let Some(mut packet) = self.receive_queue.dequeue() else {
                break;
            };
            processed += 1;

            let opcode = packet.opcode();
            let Some(entry) = context.opcode_table.get(opcode) else {
                error!("Received unexpected opcode {} from account {}", opcode, self.account_id);
                continue;
            };

            match entry.handler {
                ServerHandler::Session(handler) => match handler(self, context, &mut packet) {
                    Ok(()) => self.log_unprocessed_tail(&packet),
                    Err(e) => {
                        error!(
                            "Session::update: {} from account {} could not be read: {e}. Skipped packet.",
                            entry.name, self.account_id
                        );
                        debug!("{}", packet.hexlike());
                    }
                },
                ServerHandler::EarlyProcess => {
                    error!("Received opcode {} from account {} that is handled by the socket", opcode, self.account_id);
                }
                ServerHandler::ServerSide => {
                    error!("Received server-side opcode {} from account {}", opcode, self.account_id);
                }
            }
        }

        self.process_query_callbacks();
        !self.kicked
    }

    fn log_unprocessed_tail(&self, packet: &InboundPacket) {
        if packet.remaining() == 0 {
            return;
        }
        warn!(
            "Unprocessed tail data (read stop at {} from {}) in {} from account {}",
            packet.rpos(),
            packet.size(),
            packet.opcode(),
            self.account_id
        );
        trace!("{}", packet.hexlike());
    }

    fn process_query_callbacks(&mut self) {
        if self.query_processor.is_empty() {
            return;
        }
        let mut processor = std::mem::take(&mut self.query_processor);
        processor.process_ready_callbacks(self);
        processor.append(&mut self.query_processor);
        self.query_processor = processor;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close_socket();
        }
    }
}
