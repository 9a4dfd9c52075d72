use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_ctrlc::CtrlC;
use clap::Parser;
use herald_botserver::bot::DiscordBot;
use herald_botserver::config::{Args, Config};
use herald_botserver::connection::SocketContext;
use herald_botserver::network_threads::NetworkThreads;
use herald_botserver::opcode_table::build_opcode_table;
use herald_botserver::prelude::*;
use herald_botserver::world::{ServerState, ShutdownExitCode, World, WorldSettings};
use herald_botserver::{connections, console_input};
use herald_db::{AccountStore, DiscordDatabase};
use herald_shared::config::load_environment;
use herald_shared::logging::init_logging;
use macro_rules_attribute::apply;
use smol_macros::main;

const DEFAULT_LOG_FILTER: &str = "herald=info,sqlx=warn";

#[apply(main!)]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    load_environment(args.config.as_deref())?;

    init_logging(DEFAULT_LOG_FILTER);

    info!("Starting Bot Server");
    let config = Config::from_env()?;

    let server_state = ServerState::new();
    let ctrlc_state = server_state.clone();
    let ctrlc = CtrlC::new().map_err(|e| anyhow!("Failed to register ctrl+c abort handler: {e}"))?;
    smol::spawn(async move {
        ctrlc.await;
        info!("Detected Ctrl+C, starting graceful shutdown");
        ctrlc_state.stop_now(ShutdownExitCode::Shutdown);
    })
    .detach();

    let database = DiscordDatabase::new(&config.database_url, config.db_connect_timeout).await?;
    let account_store: Arc<dyn AccountStore> = Arc::new(database);

    let bot = Arc::new(DiscordBot::start(&config.bot));
    let opcode_table = Arc::new(build_opcode_table());

    let settings = WorldSettings {
        max_packets_per_update: config.max_packets_per_update,
        record_update_time_interval: config.record_update_time_interval,
        min_record_update_time: config.min_record_update_time,
        db_keepalive_interval: config.db_keepalive_interval,
    };
    let mut world = World::new(settings, server_state.clone(), opcode_table.clone(), bot);
    world.schedule_database_keepalive(account_store.clone());

    let mut network = NetworkThreads::start(config.network_threads)?;
    let context = Arc::new(SocketContext {
        account_store,
        world_sender: world.get_sender(),
        server_state: server_state.clone(),
        opcode_table,
        frame_config: config.frame,
        socket_update_interval: config.socket_update_interval,
        tcp_nodelay: config.tcp_nodelay,
    });
    connections::start_discord_network(&config.bind_address, &network, context).await?;

    smol::spawn(console_input::process_console_commands(world.get_sender())).detach();

    info!("Bot Server ready");
    let mut previous = Instant::now();
    while !world.is_stopped() {
        let now = Instant::now();
        let diff = now.duration_since(previous);
        if diff < config.min_update_diff {
            async_io::Timer::after(config.min_update_diff - diff).await;
            continue;
        }
        previous = now;

        world.update(diff);

        let update_duration = now.elapsed();
        if update_duration > Duration::from_millis(500) {
            warn!("World update took {} ms", update_duration.as_millis());
        }
    }

    world.kick_all();
    network.stop();

    let exit_code = world.exit_code();
    info!("Bot Server shut down ({:?})", exit_code);
    Ok(ExitCode::from(u8::from(exit_code)))
}
