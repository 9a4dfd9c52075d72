#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;
use herald_botserver::bot::{ChatBot, Embed};
use herald_botserver::connection::SocketContext;
use herald_botserver::connections::start_discord_network;
use herald_botserver::network_threads::NetworkThreads;
use herald_botserver::opcode_table::build_opcode_table;
use herald_botserver::world::{ServerState, ShutdownExitCode, World, WorldSettings};
use herald_db::{AccountStore, DBAccountInfo, DBIpBanInfo};
use herald_shared::header::{decode_header, encode_header, FrameConfig, DEFAULT_MAX_PAYLOAD_SIZE};
use herald_shared::messages::{AuthResponse, AuthResponseCode, AuthSession, Message};
use herald_shared::packet::InboundPacket;

#[derive(Default)]
pub struct MockAccountStore {
    pub accounts: HashMap<String, u32>,
    pub banned_ips: Vec<String>,
    pub fail_lookups: bool,
    /// Holds every account lookup back this long.
    pub lookup_delay: Option<Duration>,
    pub lookups: AtomicUsize,
}

impl MockAccountStore {
    pub fn with_account(name: &str, id: u32) -> Self {
        let mut store = Self::default();
        store.accounts.insert(name.to_string(), id);
        store
    }
}

#[async_trait]
impl AccountStore for MockAccountStore {
    async fn get_account_by_name(&self, account_name: &str) -> Result<Option<DBAccountInfo>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.lookup_delay {
            async_io::Timer::after(delay).await;
        }
        if self.fail_lookups {
            bail!("database unavailable");
        }
        Ok(self.accounts.get(account_name).map(|&id| DBAccountInfo { id }))
    }

    async fn get_ip_bans(&self, ip: &str) -> Result<Vec<DBIpBanInfo>> {
        if self.banned_ips.iter().any(|banned| banned == ip) {
            return Ok(vec![DBIpBanInfo { banned: 1 }]);
        }
        Ok(vec![])
    }

    async fn keep_alive(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relayed {
    Message(i64, String),
    Embed(i64, Embed),
}

#[derive(Default)]
pub struct RecordingBot {
    pub relayed: Mutex<Vec<Relayed>>,
}

impl ChatBot for RecordingBot {
    fn send_default_message(&self, channel_id: i64, message: &str) {
        self.relayed.lock().unwrap().push(Relayed::Message(channel_id, message.to_string()));
    }

    fn send_embed_message(&self, channel_id: i64, embed: &Embed) {
        self.relayed.lock().unwrap().push(Relayed::Embed(channel_id, embed.clone()));
    }
}

/// A bot server on a loopback port with its world ticking on a background thread.
pub struct TestServer {
    pub address: SocketAddr,
    pub state: Arc<ServerState>,
    pub bot: Arc<RecordingBot>,
    pub store: Arc<MockAccountStore>,
    pub sessions: Arc<AtomicUsize>,
    network: NetworkThreads,
    world_thread: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn start(store: MockAccountStore) -> Self {
        let network = NetworkThreads::start(2).unwrap();
        let state = ServerState::new();
        let bot = Arc::new(RecordingBot::default());
        let store = Arc::new(store);
        let opcode_table = Arc::new(build_opcode_table());
        let settings = WorldSettings {
            max_packets_per_update: 150,
            record_update_time_interval: Duration::from_secs(60),
            min_record_update_time: Duration::from_millis(100),
            db_keepalive_interval: Duration::from_secs(1800),
        };
        let mut world = World::new(settings, state.clone(), opcode_table.clone(), bot.clone());

        let context = Arc::new(SocketContext {
            account_store: store.clone(),
            world_sender: world.get_sender(),
            server_state: state.clone(),
            opcode_table,
            frame_config: FrameConfig::default(),
            socket_update_interval: Duration::from_millis(5),
            tcp_nodelay: true,
        });
        let address = smol::block_on(start_discord_network("127.0.0.1:0", &network, context)).unwrap();

        let sessions = Arc::new(AtomicUsize::new(0));
        let session_count = sessions.clone();
        let world_thread = std::thread::spawn(move || {
            let mut previous = Instant::now();
            while !world.is_stopped() {
                std::thread::sleep(Duration::from_millis(2));
                let now = Instant::now();
                world.update(now - previous);
                previous = now;
                session_count.store(world.active_session_count(), Ordering::SeqCst);
            }
            world.kick_all();
        });

        Self {
            address,
            state,
            bot,
            store,
            sessions,
            network,
            world_thread: Some(world_thread),
        }
    }

    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.address).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream
    }

    pub fn relayed(&self) -> Vec<Relayed> {
        self.bot.relayed.lock().unwrap().clone()
    }

    /// Polls until `count` items were relayed or five seconds passed.
    pub fn wait_for_relayed(&self, count: usize) -> Vec<Relayed> {
        wait_until(|| self.bot.relayed.lock().unwrap().len() >= count);
        self.relayed()
    }

    pub fn wait_for_sessions(&self, count: usize) {
        wait_until(|| self.sessions.load(Ordering::SeqCst) == count);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.state.stop_now(ShutdownExitCode::Shutdown);
        if let Some(thread) = self.world_thread.take() {
            let _ = thread.join();
        }
        self.network.stop();
    }
}

pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not met within 5 seconds");
}

pub fn send<M: Message>(stream: &mut TcpStream, message: &M) {
    let packet = message.to_packet();
    let header = encode_header(packet.size(), packet.opcode()).unwrap();
    stream.write_all(&header).unwrap();
    stream.write_all(packet.payload()).unwrap();
}

/// Next packet, or `None` once the server closed the connection.
pub fn read_packet(stream: &mut TcpStream) -> Option<InboundPacket> {
    let mut header = [0u8; 4];
    if let Err(e) = stream.read_exact(&mut header) {
        assert_ne!(e.kind(), ErrorKind::WouldBlock, "timed out waiting for a packet");
        return None;
    }
    let (length, opcode) = decode_header(&header, DEFAULT_MAX_PAYLOAD_SIZE).unwrap();
    let mut payload = vec![0u8; length];
    stream.read_exact(&mut payload).unwrap();
    Some(InboundPacket::new(opcode, payload))
}

pub fn read_auth_response(stream: &mut TcpStream) -> AuthResponseCode {
    let mut packet = read_packet(stream).expect("connection closed before the auth response");
    AuthResponse::read(&mut packet).unwrap().code
}

pub fn assert_closed(stream: &mut TcpStream) {
    let mut buffer = [0u8; 16];
    match stream.read(&mut buffer) {
        Ok(0) => {}
        Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted) => {}
        other => panic!("expected the server to close the connection, got {other:?}"),
    }
}

pub fn login(server: &TestServer, account_name: &str) -> TcpStream {
    let mut stream = server.connect();
    send(
        &mut stream,
        &AuthSession {
            account_name: account_name.to_string(),
        },
    );
    assert_eq!(read_auth_response(&mut stream), AuthResponseCode::Ok);
    stream
}
