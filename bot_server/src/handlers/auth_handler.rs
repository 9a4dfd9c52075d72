use herald_db::DBAccountInfo;
use herald_shared::prelude::*;
use herald_shared::queue::closable_queue;

use crate::connection::events::WorldEvent;
use crate::connection::{AuthState, DiscordSocket};
use crate::prelude::*;
use crate::session::Session;

/// Runs on the socket, before any session exists. A second auth packet on the same socket, or one
/// that does not decode, closes the connection.
pub fn handle_client_auth_session(socket: &mut DiscordSocket, mut packet: InboundPacket) -> Result<()> {
    if *socket.auth_state() != AuthState::Unauthenticated {
        warn!("duplicate login rejected!");
        bail!("{} sent auth session but was already logged in", socket.handle().remote_address());
    }

    let auth_session = AuthSession::read(&mut packet).map_err(|e| {
        debug!("{}", packet.hexlike());
        anyhow!("Malformed auth session from {}: {e}", socket.handle().remote_address())
    })?;

    info!("Account '{}' connecting from {}", auth_session.account_name, socket.handle().remote_address());

    let account_store = socket.context().account_store.clone();
    let account_name = auth_session.account_name;
    let query_name = account_name.clone();
    socket.set_auth_state(AuthState::AwaitingDbLookup {
        account_name: account_name.clone(),
    });
    socket.query_processor_mut().add_callback(
        async move { account_store.get_account_by_name(&query_name).await },
        move |socket: &mut DiscordSocket, result| handle_auth_session_callback(socket, account_name, result),
    );

    Ok(())
}

fn handle_auth_session_callback(socket: &mut DiscordSocket, account_name: String, result: Result<Option<DBAccountInfo>>) {
    let account = match result {
        Ok(Some(account)) => account,
        Ok(None) => {
            error!("Sent auth response (unknown account '{}') to {}", account_name, socket.handle().remote_address());
            socket.reject(AuthResponseCode::UnknownAccount);
            return;
        }
        Err(e) => {
            error!("Account lookup for '{}' failed: {e}", account_name);
            socket.reject(AuthResponseCode::Failed);
            return;
        }
    };

    if socket.context().server_state.is_closed() {
        error!("Sent auth response (server closed) to account '{}'", account_name);
        socket.reject(AuthResponseCode::ServerOffline);
        return;
    }

    let (session_sender, session_receiver) = closable_queue();
    let session = Session::new(account.id, account_name, socket.handle().clone(), session_receiver);
    socket.attach_session(account.id, session_sender);

    if socket.context().world_sender.send(WorldEvent::AddSession(Box::new(session))).is_err() {
        error!("World stopped accepting sessions, closing {}", socket.handle().remote_address());
        socket.handle().close_socket();
    }
}
