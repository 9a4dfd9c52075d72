//! Relay inbound connection acceptor.
//!
//! High-level design:
//! - The bot server listens on `BIND_IP:BIND_PORT`. Binding happens before the loop starts so a
//!   port that is already taken fails startup instead of a background task.
//! - The accept loop is kept tiny: accept, apply socket options, and hand each stream to its own
//!   task on the network thread pool.
//! - Per-connection work is executed in detached tasks so a slow or faulty peer never stalls
//!   accepting new ones.
//! - The loop holds the pool's executor weakly. Once the pool stops, the next accept ends the loop.
//! - Public wrapper logs and swallows errors so a transient accept failure does not bring the
//!   whole server down.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use herald_shared::socket::{run_socket, SocketCore, SocketHandle};
use smol::{net::TcpListener, stream::StreamExt, Executor};

use crate::connection::{DiscordSocket, SocketContext};
use crate::network_threads::NetworkThreads;
use crate::prelude::*;

/// Binds the listener and starts accepting on the network threads. Returns the bound address.
pub async fn start_discord_network(bind_address: &str, network: &NetworkThreads, context: Arc<SocketContext>) -> Result<SocketAddr> {
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(|e| anyhow!("Failed to bind {bind_address}: {e}"))?;
    let local_address = listener.local_addr()?;
    info!("Listening for relay connections on {}", local_address);

    network
        .spawn(accept_discord_connections(listener, context, network.downgrade()))
        .ok_or_else(|| anyhow!("Network threads are not running"))?
        .detach();
    Ok(local_address)
}

/// Public entry point of the accept loop; centralizes error reporting.
pub async fn accept_discord_connections(listener: TcpListener, context: Arc<SocketContext>, executor: Weak<Executor<'static>>) {
    if let Err(e) = accept_discord_connections_impl(listener, context, executor).await {
        error!("Error in connections::accept_discord_connections: {e:?}");
    }
}

async fn accept_discord_connections_impl(listener: TcpListener, context: Arc<SocketContext>, executor: Weak<Executor<'static>>) -> Result<()> {
    let mut incoming_connections = listener.incoming();

    while let Some(tcp_stream) = incoming_connections.next().await {
        let tcp_stream = match tcp_stream {
            Ok(tcp_stream) => tcp_stream,
            Err(e) => {
                warn!("Failed to accept relay connection: {e}");
                continue;
            }
        };
        let Some(executor) = executor.upgrade() else {
            break;
        };

        if let Err(e) = tcp_stream.set_nodelay(context.tcp_nodelay) {
            warn!("Failed to set TCP_NODELAY: {e}");
        }
        let remote_address = match tcp_stream.peer_addr() {
            Ok(address) => address,
            Err(e) => {
                warn!("Dropping connection without peer address: {e}");
                continue;
            }
        };

        let (handle, signals) = SocketHandle::new(remote_address);
        let socket = SocketCore::new(tcp_stream, handle.clone(), signals, context.frame_config, context.socket_update_interval);
        let discord_socket = DiscordSocket::new(handle, context.clone());
        executor.spawn(run_socket(socket, discord_socket)).detach();
    }

    Ok(())
}
