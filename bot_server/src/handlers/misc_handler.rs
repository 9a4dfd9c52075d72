use herald_shared::prelude::*;

use crate::prelude::*;
use crate::session::{Session, SessionContext};

pub fn handle_client_send_hello(session: &mut Session, _context: &SessionContext, packet: &mut InboundPacket) -> Result<(), PacketError> {
    Hello::read(packet)?;
    info!("Received hello from account {} ({})", session.account_id(), session.account_name());
    Ok(())
}

pub fn handle_client_send_ping(session: &mut Session, _context: &SessionContext, packet: &mut InboundPacket) -> Result<(), PacketError> {
    let ping = Ping::read(packet)?;
    session.set_latency(ping.latency);
    trace!("Ping {} from account {}, latency {} ms", ping.ping, session.account_id(), ping.latency);
    session.send_packet(Pong { ping: ping.ping }.to_packet());
    Ok(())
}
