use async_ctrlc::CtrlC;
use clap::Parser;
use herald_relayclient::client_socket_mgr::{ClientSocketMgr, RelayStatus};
use herald_relayclient::config::{Args, ClientConfig};
use herald_relayclient::console_input;
use herald_relayclient::prelude::*;
use herald_shared::config::load_environment;
use herald_shared::logging::init_logging;
use macro_rules_attribute::apply;
use smol_macros::main;

const DEFAULT_LOG_FILTER: &str = "herald=info";

#[apply(main!)]
async fn main() -> Result<()> {
    let args = Args::parse();
    load_environment(args.config.as_deref())?;

    init_logging(DEFAULT_LOG_FILTER);

    let config = ClientConfig::from_env()?;
    if !config.enabled {
        info!("Relay client is disabled (DISCORD_SERVER_ENABLE=0)");
        return Ok(());
    }

    info!("Starting relay client towards {}:{}", config.host, config.port);
    let default_channel_id = config.default_channel_id;
    let (manager, client) = ClientSocketMgr::new(config);
    let manager = smol::spawn(manager.run());

    let ctrlc = CtrlC::new().map_err(|e| anyhow!("Failed to register ctrl+c abort handler: {e}"))?;
    let ctrlc_client = client.clone();
    smol::spawn(async move {
        ctrlc.await;
        info!("Detected Ctrl+C, stopping relay client");
        ctrlc_client.stop();
    })
    .detach();

    client.send_hello()?;
    smol::spawn(console_input::process_console_input(client.clone(), default_channel_id)).detach();

    manager.await;
    if client.status() == RelayStatus::GaveUp {
        bail!("Lost the bot server for good");
    }
    Ok(())
}
