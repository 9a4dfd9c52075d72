use herald_shared::prelude::*;

use crate::bot::Embed;
use crate::session::{Session, SessionContext};

pub fn handle_client_send_message(session: &mut Session, context: &SessionContext, packet: &mut InboundPacket) -> Result<(), PacketError> {
    let message = SendDiscordMessage::read(packet)?;
    context.bot.send_default_message(message.channel_id, &message.message);
    session.note_relayed_message();
    Ok(())
}

pub fn handle_client_send_message_embed(
    session: &mut Session,
    context: &SessionContext,
    packet: &mut InboundPacket,
) -> Result<(), PacketError> {
    let message = SendDiscordEmbedMessage::read(packet)?;
    let embed = Embed {
        color: message.color,
        title: message.title,
        description: message.description,
        timestamp: message.timestamp,
    };
    context.bot.send_embed_message(message.channel_id, &embed);
    session.note_relayed_message();
    Ok(())
}
