//! Owns the single outbound connection to the bot server.
//!
//! - Resolves the bot server address once. A resolve failure gives up right away.
//! - Connects with a bounded number of attempts and a fixed delay between them. After the last
//!   failed attempt the status turns `GaveUp` and the manager stops.
//! - Producer packets wait in the manager until the current socket is authenticated, so nothing
//!   queued while disconnected is lost.
//! - Drives keepalive pings from a tick-driven scheduler and tracks their round trip.
//!
//! Producers talk to the manager through `RelayClient`, a cheap cloneable handle.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_io::Timer;
use flume::Receiver;
use herald_shared::prelude::*;
use herald_shared::scheduler::TaskScheduler;
use herald_shared::socket::run_socket;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use smol::future;
use smol::net::TcpStream;
use smol::stream::StreamExt;

use crate::client_socket::{build_client_opcode_table, ClientOpcodeTable, ClientSocket, ClientSocketEvent, ClientSocketEventKind};
use crate::config::ClientConfig;
use crate::prelude::*;

/// How long a stopping manager waits for the last queued packets to be written.
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RelayStatus {
    Disconnected = 0,
    Connecting,
    Connected,
    GaveUp,
}

pub enum RelayCommand {
    Send(OutboundPacket),
    Stop,
}

/// Handle producers use to push messages towards the bot server.
#[derive(Clone)]
pub struct RelayClient {
    commands: flume::Sender<RelayCommand>,
    status: Arc<AtomicU8>,
}

impl RelayClient {
    pub fn send_packet(&self, packet: OutboundPacket) -> Result<()> {
        self.commands
            .send(RelayCommand::Send(packet))
            .map_err(|_| anyhow!("Relay client is not running"))
    }

    pub fn send_hello(&self) -> Result<()> {
        self.send_packet(Hello.to_packet())
    }

    pub fn send_message(&self, channel_id: i64, message: impl Into<String>) -> Result<()> {
        self.send_packet(
            SendDiscordMessage {
                channel_id,
                message: message.into(),
            }
            .to_packet(),
        )
    }

    pub fn send_embed(
        &self,
        channel_id: i64,
        color: MessageColor,
        title: impl Into<String>,
        description: impl Into<String>,
        timestamp: i64,
    ) -> Result<()> {
        self.send_packet(
            SendDiscordEmbedMessage {
                channel_id,
                color: color.into(),
                title: title.into(),
                description: description.into(),
                timestamp,
            }
            .to_packet(),
        )
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus::try_from(self.status.load(Ordering::Acquire)).unwrap_or(RelayStatus::Disconnected)
    }

    /// Asks the manager to flush what it can and stop. Stopping twice is fine.
    pub fn stop(&self) {
        let _ = self.commands.send(RelayCommand::Stop);
    }
}

/// Round trip bookkeeping for keepalive pings. Only the newest ping is tracked.
#[derive(Debug, Default)]
pub struct PingTracker {
    next_ping: u32,
    outstanding: Option<(u32, Instant)>,
    latency_ms: u32,
}

impl PingTracker {
    /// Builds the next ping, carrying the last measured latency.
    pub fn next_ping(&mut self, now: Instant) -> Ping {
        self.next_ping = self.next_ping.wrapping_add(1);
        self.outstanding = Some((self.next_ping, now));
        Ping {
            ping: self.next_ping,
            latency: self.latency_ms,
        }
    }

    /// Returns false for pongs that do not answer the outstanding ping.
    pub fn on_pong(&mut self, ping: u32, received_at: Instant) -> bool {
        match self.outstanding {
            Some((id, sent_at)) if id == ping => {
                let latency = received_at.saturating_duration_since(sent_at).as_millis();
                self.latency_ms = u32::try_from(latency).unwrap_or(u32::MAX);
                self.outstanding = None;
                true
            }
            _ => false,
        }
    }

    pub fn latency_ms(&self) -> u32 {
        self.latency_ms
    }

    /// A new connection starts without an outstanding ping.
    pub fn reset(&mut self) {
        self.outstanding = None;
        self.latency_ms = 0;
    }
}

enum ClientSocketMgrEvent {
    Command(RelayCommand),
    Socket(ClientSocketEvent),
    Tick,
    Closed,
}

pub struct ClientSocketMgr {
    config: ClientConfig,
    commands: Receiver<RelayCommand>,
    status: Arc<AtomicU8>,
    events_sender: flume::Sender<ClientSocketEvent>,
    events: Receiver<ClientSocketEvent>,
    opcode_table: Arc<ClientOpcodeTable>,
    generation: u32,
    socket: Option<Arc<SocketHandle>>,
    pending: VecDeque<OutboundPacket>,
    scheduler: TaskScheduler,
    ping_due: Arc<AtomicBool>,
    ping: PingTracker,
    stopping: bool,
}

impl ClientSocketMgr {
    pub fn new(config: ClientConfig) -> (Self, RelayClient) {
        let (command_sender, commands) = flume::unbounded();
        let (events_sender, events) = flume::unbounded();
        let status = Arc::new(AtomicU8::new(RelayStatus::Disconnected.into()));

        let ping_due = Arc::new(AtomicBool::new(false));
        let mut scheduler = TaskScheduler::new();
        let due = ping_due.clone();
        scheduler.schedule(config.ping_interval, move |context| {
            due.store(true, Ordering::Release);
            context.repeat();
        });

        let manager = Self {
            config,
            commands,
            status: status.clone(),
            events_sender,
            events,
            opcode_table: Arc::new(build_client_opcode_table()),
            generation: 0,
            socket: None,
            pending: VecDeque::new(),
            scheduler,
            ping_due,
            ping: PingTracker::default(),
            stopping: false,
        };
        let client = RelayClient {
            commands: command_sender,
            status,
        };
        (manager, client)
    }

    /// Main loop: connects, then reacts to producer commands, socket events and its own tick until
    /// stopped or out of connection attempts.
    pub async fn run(mut self) {
        let address = match self.resolve().await {
            Ok(address) => address,
            Err(e) => {
                error!("Could not resolve bot server {}:{}: {e}", self.config.host, self.config.port);
                self.set_status(RelayStatus::GaveUp);
                return;
            }
        };

        if !self.connect(address).await {
            return;
        }

        let mut ticker = Timer::interval(self.config.socket_update_interval);
        let mut last_tick = Instant::now();
        loop {
            let event = future::race(
                receive_commands(&self.commands),
                future::race(receive_socket_events(&self.events), receive_tick(&mut ticker)),
            )
            .await;

            match event {
                ClientSocketMgrEvent::Command(RelayCommand::Send(packet)) => self.pending.push_back(packet),
                ClientSocketMgrEvent::Command(RelayCommand::Stop) | ClientSocketMgrEvent::Closed => {
                    self.stopping = true;
                }
                ClientSocketMgrEvent::Socket(event) => self.handle_socket_event(event),
                ClientSocketMgrEvent::Tick => {
                    let now = Instant::now();
                    let diff = now.duration_since(last_tick);
                    last_tick = now;

                    if self.socket.is_none() && self.status() != RelayStatus::GaveUp && !self.stopping {
                        info!("Reconnecting to bot server {address}");
                        if !self.connect(address).await {
                            break;
                        }
                        last_tick = Instant::now();
                        continue;
                    }
                    self.update(diff);
                }
            }

            if self.stopping || self.status() == RelayStatus::GaveUp {
                break;
            }
        }

        self.shutdown().await;
    }

    fn status(&self) -> RelayStatus {
        RelayStatus::try_from(self.status.load(Ordering::Acquire)).unwrap_or(RelayStatus::Disconnected)
    }

    fn set_status(&self, status: RelayStatus) {
        self.status.store(status.into(), Ordering::Release);
    }

    async fn resolve(&mut self) -> Result<SocketAddr> {
        let addresses = smol::net::resolve((self.config.host.as_str(), self.config.port)).await?;
        addresses
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no address found"))
    }

    /// Returns false if the manager should stop, either because the attempts ran out or because a
    /// stop was requested while waiting.
    async fn connect(&mut self, address: SocketAddr) -> bool {
        self.set_status(RelayStatus::Connecting);
        let attempts = self.config.reconnect_attempts.max(1);

        for attempt in 1..=attempts {
            match TcpStream::connect(address).await {
                Ok(stream) => {
                    self.start_socket(stream, address);
                    return true;
                }
                Err(e) => warn!("Connection attempt {attempt}/{attempts} to bot server {address} failed: {e}"),
            }

            if attempt < attempts {
                Timer::after(self.config.reconnect_delay).await;
                if !self.drain_commands() {
                    self.stopping = true;
                    return false;
                }
            }
        }

        error!("Giving up on bot server {address} after {attempts} failed connection attempts");
        self.set_status(RelayStatus::GaveUp);
        false
    }

    /// Picks up commands that arrived while connecting. False once a stop was requested.
    fn drain_commands(&mut self) -> bool {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                RelayCommand::Send(packet) => self.pending.push_back(packet),
                RelayCommand::Stop => return false,
            }
        }
        true
    }

    fn start_socket(&mut self, stream: TcpStream, address: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Could not set TCP_NODELAY towards {address}: {e}");
        }

        self.generation = self.generation.wrapping_add(1);
        let (handle, signals) = SocketHandle::new(address);
        let core = SocketCore::new(
            stream,
            handle.clone(),
            signals,
            self.config.frame,
            self.config.socket_update_interval,
        );
        let socket = ClientSocket::new(
            handle.clone(),
            self.generation,
            self.config.account_name.clone(),
            &self.config.frame,
            self.opcode_table.clone(),
            self.events_sender.clone(),
        );
        smol::spawn(run_socket(core, socket)).detach();

        self.socket = Some(handle);
        self.ping.reset();
    }

    fn handle_socket_event(&mut self, event: ClientSocketEvent) {
        if event.generation != self.generation {
            trace!("Ignoring {:?} of replaced socket {}", event.kind, event.generation);
            return;
        }

        match event.kind {
            ClientSocketEventKind::Authenticated => {
                self.set_status(RelayStatus::Connected);
                self.flush_pending();
            }
            ClientSocketEventKind::AuthRejected(code) => {
                error!("Bot server refused the relay login ({:?}), not reconnecting", code);
                if let Some(socket) = self.socket.take() {
                    socket.close_socket();
                }
                self.set_status(RelayStatus::GaveUp);
            }
            ClientSocketEventKind::Pong { ping, received_at } => {
                if self.ping.on_pong(ping, received_at) {
                    debug!("Bot server latency {} ms", self.ping.latency_ms());
                } else {
                    trace!("Ignoring stale pong {ping}");
                }
            }
            ClientSocketEventKind::Closed => {
                self.socket = None;
                if self.status() != RelayStatus::GaveUp {
                    self.set_status(RelayStatus::Disconnected);
                }
            }
        }
    }

    fn authed_socket(&self) -> Option<&Arc<SocketHandle>> {
        self.socket
            .as_ref()
            .filter(|socket| socket.is_open() && socket.is_authed())
    }

    fn flush_pending(&mut self) {
        let Some(socket) = self.authed_socket().cloned() else {
            return;
        };
        while let Some(packet) = self.pending.pop_front() {
            if !socket.send_packet(packet) {
                debug!("Socket closed while flushing, {} packets dropped", self.pending.len() + 1);
                break;
            }
        }
    }

    fn update(&mut self, diff: Duration) {
        self.scheduler.update(diff);
        self.flush_pending();

        if self.ping_due.swap(false, Ordering::AcqRel) {
            if let Some(socket) = self.authed_socket().cloned() {
                let ping = self.ping.next_ping(Instant::now());
                trace!("Sending ping {} (latency {} ms)", ping.ping, ping.latency);
                socket.send_packet(ping.to_packet());
            }
        }
    }

    /// Hands the remaining packets to an authenticated socket and waits briefly for them to leave.
    async fn shutdown(&mut self) {
        self.drain_commands();
        self.flush_pending();
        let Some(socket) = self.socket.take() else {
            if !self.pending.is_empty() {
                warn!("Relay stopped with {} undelivered packets", self.pending.len());
            }
            return;
        };

        socket.delayed_close_socket();
        let generation = self.generation;
        let events = self.events.clone();
        let closed = async move {
            while let Ok(event) = events.recv_async().await {
                if event.generation == generation && event.kind == ClientSocketEventKind::Closed {
                    return true;
                }
            }
            false
        };
        let timeout = async {
            Timer::after(SHUTDOWN_FLUSH_TIMEOUT).await;
            false
        };
        if !future::race(closed, timeout).await {
            warn!("Bot server socket did not close in time, closing it now");
            socket.close_socket();
        }
        info!("Relay client stopped");
    }
}

async fn receive_commands(receiver: &Receiver<RelayCommand>) -> ClientSocketMgrEvent {
    match receiver.recv_async().await {
        Ok(command) => ClientSocketMgrEvent::Command(command),
        Err(_) => ClientSocketMgrEvent::Closed,
    }
}

async fn receive_socket_events(receiver: &Receiver<ClientSocketEvent>) -> ClientSocketMgrEvent {
    match receiver.recv_async().await {
        Ok(event) => ClientSocketMgrEvent::Socket(event),
        // The manager holds a sender itself, so this never ends on its own.
        Err(_) => future::pending().await,
    }
}

async fn receive_tick(ticker: &mut Timer) -> ClientSocketMgrEvent {
    ticker.next().await;
    ClientSocketMgrEvent::Tick
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_ids_increase_and_carry_latency() {
        let mut tracker = PingTracker::default();
        let start = Instant::now();

        let first = tracker.next_ping(start);
        assert_eq!(first, Ping { ping: 1, latency: 0 });

        assert!(tracker.on_pong(1, start + Duration::from_millis(25)));
        assert_eq!(tracker.latency_ms(), 25);

        let second = tracker.next_ping(start + Duration::from_secs(30));
        assert_eq!(second, Ping { ping: 2, latency: 25 });
    }

    #[test]
    fn test_stale_pong_is_ignored() {
        let mut tracker = PingTracker::default();
        let start = Instant::now();
        tracker.next_ping(start);
        tracker.next_ping(start);

        assert!(!tracker.on_pong(1, start + Duration::from_millis(5)));
        assert!(tracker.on_pong(2, start + Duration::from_millis(7)));
        assert!(!tracker.on_pong(2, start + Duration::from_millis(9)));
        assert_eq!(tracker.latency_ms(), 7);
    }

    #[test]
    fn test_reset_forgets_outstanding_ping() {
        let mut tracker = PingTracker::default();
        let start = Instant::now();
        tracker.next_ping(start);
        tracker.reset();
        assert!(!tracker.on_pong(1, start));
        assert_eq!(tracker.latency_ms(), 0);
    }

    #[test]
    fn test_client_queues_and_reports_status() {
        let (manager, client) = ClientSocketMgr::new(ClientConfig::default());
        assert_eq!(client.status(), RelayStatus::Disconnected);

        client.send_hello().unwrap();
        client.send_message(7, "hi").unwrap();
        client.send_embed(7, MessageColor::Red, "t", "d", 0).unwrap();
        assert_eq!(manager.commands.len(), 3);

        drop(manager);
        assert!(client.send_hello().is_err());
    }
}
