//! The world owns everything the main thread ticks.
//!
//! - Connection tasks never touch world state. New sessions and console commands arrive as
//!   `WorldEvent`s on a flume channel and are applied at the start of the next update.
//! - `ServerState` is the only piece shared with other threads: the stop flag the main loop polls,
//!   the exit code and whether new logins are accepted.
//! - Shutdown is a countdown in whole seconds advanced by the update diff, so it needs no timers of
//!   its own.

mod update_time;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use herald_db::AccountStore;
use herald_shared::scheduler::TaskScheduler;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::bot::ChatBot;
use crate::connection::events::{WorldCommand, WorldEvent};
use crate::opcode_table::ServerOpcodeTable;
use crate::prelude::*;
use crate::session::{Session, SessionContext};
use crate::session_manager::SessionManager;
pub use update_time::UpdateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ShutdownExitCode {
    Shutdown = 0,
    Error = 1,
    Restart = 2,
}

/// Flags shared between the world, the main loop, connection tasks and the Ctrl+C handler.
pub struct ServerState {
    stop_event: AtomicBool,
    exit_code: AtomicU8,
    closed: AtomicBool,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            stop_event: AtomicBool::new(false),
            exit_code: AtomicU8::new(ShutdownExitCode::Shutdown.into()),
            closed: AtomicBool::new(false),
        }
    }
}

impl ServerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_event.load(Ordering::Acquire)
    }

    pub fn stop_now(&self, exit_code: ShutdownExitCode) {
        self.set_exit_code(exit_code);
        self.stop_event.store(true, Ordering::Release);
    }

    pub fn exit_code(&self) -> ShutdownExitCode {
        ShutdownExitCode::try_from(self.exit_code.load(Ordering::Acquire)).unwrap_or(ShutdownExitCode::Error)
    }

    fn set_exit_code(&self, exit_code: ShutdownExitCode) {
        self.exit_code.store(exit_code.into(), Ordering::Release);
    }

    /// A closed server answers new logins with `ServerOffline`.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct WorldSettings {
    pub max_packets_per_update: usize,
    pub record_update_time_interval: Duration,
    pub min_record_update_time: Duration,
    pub db_keepalive_interval: Duration,
}

pub struct World {
    sessions: SessionManager,
    scheduler: TaskScheduler,
    update_time: UpdateTime,
    server_state: Arc<ServerState>,
    opcode_table: Arc<ServerOpcodeTable>,
    bot: Arc<dyn ChatBot>,
    settings: WorldSettings,

    game_time: Duration,
    shutdown_timer: Duration,
    shutdown_elapsed: Duration,
    shutdown_reason: String,

    sender: flume::Sender<WorldEvent>,
    receiver: flume::Receiver<WorldEvent>,
}

impl World {
    pub fn new(settings: WorldSettings, server_state: Arc<ServerState>, opcode_table: Arc<ServerOpcodeTable>, bot: Arc<dyn ChatBot>) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sessions: SessionManager::new(),
            scheduler: TaskScheduler::new(),
            update_time: UpdateTime::new(settings.record_update_time_interval, settings.min_record_update_time),
            server_state,
            opcode_table,
            bot,
            settings,
            game_time: Duration::ZERO,
            shutdown_timer: Duration::ZERO,
            shutdown_elapsed: Duration::ZERO,
            shutdown_reason: String::new(),
            sender,
            receiver,
        }
    }

    pub fn get_sender(&self) -> flume::Sender<WorldEvent> {
        self.sender.clone()
    }

    pub fn server_state(&self) -> &Arc<ServerState> {
        &self.server_state
    }

    pub fn update_time(&self) -> &UpdateTime {
        &self.update_time
    }

    /// Pings the database on the scheduler so idle pools are not dropped by the server.
    pub fn schedule_database_keepalive(&mut self, account_store: Arc<dyn AccountStore>) {
        let interval = self.settings.db_keepalive_interval;
        if interval.is_zero() {
            return;
        }
        self.scheduler.schedule(interval, move |context| {
            debug!("Ping MySQL to keep connection alive");
            let account_store = account_store.clone();
            smol::spawn(async move {
                if let Err(e) = account_store.keep_alive().await {
                    error!("Database keepalive failed: {e}");
                }
            })
            .detach();
            context.repeat();
        });
    }

    pub fn update(&mut self, diff: Duration) {
        self.update_game_time(diff);

        self.update_time.update_with_diff(diff);
        self.update_time
            .record_update_time(self.game_time, self.sessions.active_session_count());
        self.update_time.record_update_time_reset();

        self.handle_world_events();
        self.update_time.record_update_time_duration("HandleWorldEvents");

        self.update_sessions(diff);
        self.update_time.record_update_time_duration("UpdateSessions");

        self.scheduler.update(diff);
    }

    fn handle_world_events(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            trace!("World event {}", event);
            match event {
                WorldEvent::AddSession(session) => self.add_session(*session),
                WorldEvent::Command(command) => self.handle_command(command),
            }
        }
    }

    pub fn handle_command(&mut self, command: WorldCommand) {
        match command {
            WorldCommand::Shutdown { delay, exit_code, reason } => self.shutdown_serv(delay, exit_code, &reason),
            WorldCommand::CancelShutdown => self.shutdown_cancel(),
            WorldCommand::Kick { account_id } => {
                if !self.kick_session(account_id) {
                    warn!("No session for account {}", account_id);
                }
            }
            WorldCommand::SetClosed(closed) => {
                self.set_closed(closed);
                info!("Server is now {} for new logins", if closed { "closed" } else { "open" });
            }
            WorldCommand::ReportOnline => {
                info!(
                    "Sessions online: {} (max {})",
                    self.active_session_count(),
                    self.max_active_session_count()
                );
                for session in self.sessions.sessions() {
                    info!(
                        "  account {} '{}' from {}, latency {} ms, {} messages relayed",
                        session.account_id(),
                        session.account_name(),
                        session.remote_address(),
                        session.latency(),
                        session.relayed_messages()
                    );
                }
            }
            WorldCommand::StopNow(exit_code) => self.stop_now(exit_code),
        }
    }

    pub fn add_session(&mut self, session: Session) {
        self.sessions.add_session(session);
    }

    pub fn kick_session(&mut self, account_id: u32) -> bool {
        self.sessions.kick_session(account_id)
    }

    pub fn find_session(&self, account_id: u32) -> Option<&Session> {
        self.sessions.find_session(account_id)
    }

    pub fn kick_all(&mut self) {
        self.sessions.kick_all();
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.active_session_count()
    }

    pub fn max_active_session_count(&self) -> usize {
        self.sessions.max_active_session_count()
    }

    fn update_sessions(&mut self, diff: Duration) {
        let context = SessionContext {
            opcode_table: &self.opcode_table,
            bot: self.bot.as_ref(),
            max_packets_per_update: self.settings.max_packets_per_update,
        };
        self.sessions.update_sessions(diff, &context);
    }

    fn update_game_time(&mut self, diff: Duration) {
        self.game_time += diff;

        if self.is_stopped() || self.shutdown_timer.is_zero() {
            return;
        }

        // The countdown moves in whole seconds, sub-second diffs are carried over.
        self.shutdown_elapsed += diff;
        let elapsed = Duration::from_secs(self.shutdown_elapsed.as_secs());
        if elapsed.is_zero() {
            return;
        }
        self.shutdown_elapsed -= elapsed;

        if self.shutdown_timer <= elapsed {
            self.server_state.stop_event.store(true, Ordering::Release);
        } else {
            self.shutdown_timer -= elapsed;
            self.shutdown_msg(false);
        }
    }

    pub fn shutdown_serv(&mut self, time: Duration, exit_code: ShutdownExitCode, reason: &str) {
        if self.is_stopped() {
            return;
        }

        self.server_state.set_exit_code(exit_code);

        let mut time = Duration::from_secs(time.as_secs());
        if time < Duration::from_secs(2) && self.active_session_count() > 0 {
            time = Duration::from_secs(2);
        }

        warn!("> Time left until shutdown/restart: {}", format_time(time));

        if time.is_zero() {
            self.server_state.stop_event.store(true, Ordering::Release);
        } else {
            self.shutdown_timer = time;
            self.shutdown_elapsed = Duration::ZERO;
            self.shutdown_reason = reason.to_string();
            self.shutdown_msg(true);
        }
    }

    /// Logs the countdown: every 15 s under 5 min, every minute under 15 min, every 5 min under
    /// 30 min, hourly under 12 h and every 12 h above that.
    pub fn shutdown_msg(&self, show: bool) {
        let secs = self.shutdown_timer.as_secs();
        if show || is_announcement_second(secs) {
            let action = match self.server_state.exit_code() {
                ShutdownExitCode::Restart => "restarting",
                _ => "shutting down",
            };
            warn!(
                "Server is {}. Time left '{}'. Reason '{}'",
                action,
                format_time(self.shutdown_timer),
                self.shutdown_reason
            );
        }
    }

    pub fn shutdown_cancel(&mut self) {
        if self.shutdown_timer.is_zero() || self.is_stopped() {
            return;
        }

        self.shutdown_timer = Duration::ZERO;
        self.shutdown_elapsed = Duration::ZERO;
        self.server_state.set_exit_code(ShutdownExitCode::Shutdown);
        warn!("Server restart cancelled.");
    }

    pub fn is_shutting_down(&self) -> bool {
        !self.shutdown_timer.is_zero()
    }

    pub fn shutdown_timer(&self) -> Duration {
        self.shutdown_timer
    }

    pub fn is_stopped(&self) -> bool {
        self.server_state.is_stopped()
    }

    pub fn stop_now(&self, exit_code: ShutdownExitCode) {
        self.server_state.stop_now(exit_code);
    }

    pub fn exit_code(&self) -> ShutdownExitCode {
        self.server_state.exit_code()
    }

    pub fn is_closed(&self) -> bool {
        self.server_state.is_closed()
    }

    pub fn set_closed(&self, closed: bool) {
        self.server_state.set_closed(closed);
    }
}

fn is_announcement_second(secs: u64) -> bool {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;

    (secs < 5 * MINUTE && secs % 15 == 0)
        || (secs < 15 * MINUTE && secs % MINUTE == 0)
        || (secs < 30 * MINUTE && secs % (5 * MINUTE) == 0)
        || (secs < 12 * HOUR && secs % HOUR == 0)
        || (secs > 12 * HOUR && secs % (12 * HOUR) == 0)
}

/// `1d 2h 3m 4s`, leaving out leading zero units.
pub fn format_time(time: Duration) -> String {
    let total = time.as_secs();
    let (days, hours, minutes, seconds) = (total / 86_400, total / 3_600 % 24, total / 60 % 60, total % 60);

    let mut parts = vec![];
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::Embed;
    use crate::opcode_table::build_opcode_table;
    use herald_shared::queue::closable_queue;
    use herald_shared::socket::SocketHandle;

    struct SilentBot;

    impl ChatBot for SilentBot {
        fn send_default_message(&self, _channel_id: i64, _message: &str) {}

        fn send_embed_message(&self, _channel_id: i64, _embed: &Embed) {}
    }

    fn world() -> World {
        let settings = WorldSettings {
            max_packets_per_update: 150,
            record_update_time_interval: Duration::from_secs(60),
            min_record_update_time: Duration::from_millis(100),
            db_keepalive_interval: Duration::from_secs(1800),
        };
        World::new(settings, ServerState::new(), Arc::new(build_opcode_table()), Arc::new(SilentBot))
    }

    fn add_session(world: &World, account_id: u32) -> Arc<SocketHandle> {
        let (handle, _signals) = SocketHandle::new("127.0.0.1:6000".parse().unwrap());
        handle.open();
        let (_sender, receiver) = closable_queue();
        let session = Session::new(account_id, "relay".into(), handle.clone(), receiver);
        world.get_sender().send(WorldEvent::AddSession(Box::new(session))).unwrap();
        handle
    }

    #[test]
    fn test_sessions_are_added_on_update() {
        let mut world = world();
        add_session(&world, 3);
        assert_eq!(world.active_session_count(), 0);

        world.update(Duration::from_millis(10));
        assert_eq!(world.active_session_count(), 1);
        assert!(world.find_session(3).is_some());
    }

    #[test]
    fn test_shutdown_countdown() {
        let mut world = world();
        world.shutdown_serv(Duration::from_secs(3), ShutdownExitCode::Restart, "update");
        assert!(world.is_shutting_down());
        assert_eq!(world.exit_code(), ShutdownExitCode::Restart);

        for _ in 0..20 {
            world.update(Duration::from_millis(100));
        }
        assert_eq!(world.shutdown_timer(), Duration::from_secs(1));
        assert!(!world.is_stopped());

        for _ in 0..10 {
            world.update(Duration::from_millis(100));
        }
        assert!(world.is_stopped());
        assert_eq!(world.exit_code(), ShutdownExitCode::Restart);
    }

    #[test]
    fn test_immediate_shutdown_waits_for_online_sessions() {
        let mut idle = world();
        idle.shutdown_serv(Duration::ZERO, ShutdownExitCode::Shutdown, "");
        assert!(idle.is_stopped());

        let mut busy = world();
        add_session(&busy, 1);
        busy.update(Duration::from_millis(10));
        busy.shutdown_serv(Duration::ZERO, ShutdownExitCode::Shutdown, "");
        assert!(!busy.is_stopped());
        assert_eq!(busy.shutdown_timer(), Duration::from_secs(2));
    }

    #[test]
    fn test_shutdown_cancel_resets_exit_code() {
        let mut world = world();
        world.shutdown_serv(Duration::from_secs(60), ShutdownExitCode::Restart, "patch");
        world.shutdown_cancel();

        assert!(!world.is_shutting_down());
        assert_eq!(world.exit_code(), ShutdownExitCode::Shutdown);
        world.update(Duration::from_secs(120));
        assert!(!world.is_stopped());
    }

    #[test]
    fn test_console_commands_go_through_the_event_queue() {
        let mut world = world();
        let handle = add_session(&world, 5);
        world.update(Duration::from_millis(10));

        let sender = world.get_sender();
        sender.send(WorldEvent::Command(WorldCommand::SetClosed(true))).unwrap();
        sender.send(WorldEvent::Command(WorldCommand::Kick { account_id: 5 })).unwrap();
        assert!(!world.is_closed());

        world.update(Duration::from_millis(10));
        assert!(world.is_closed());
        assert!(!handle.is_open());

        world.update(Duration::from_millis(10));
        assert!(world.find_session(5).is_none());
    }

    #[test]
    fn test_announcement_cadence() {
        assert!(is_announcement_second(4 * 60 + 45));
        assert!(!is_announcement_second(4 * 60 + 44));
        assert!(is_announcement_second(10 * 60));
        assert!(!is_announcement_second(10 * 60 + 15));
        assert!(is_announcement_second(25 * 60));
        assert!(is_announcement_second(5 * 3600));
        assert!(!is_announcement_second(5 * 3600 + 300));
        assert!(is_announcement_second(24 * 3600));
        assert!(!is_announcement_second(13 * 3600));
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(Duration::ZERO), "0s");
        assert_eq!(format_time(Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_time(Duration::from_secs(90_061)), "1d 1h 1m 1s");
        assert_eq!(format_time(Duration::from_secs(7200)), "2h");
    }
}
