use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::PacketError;
use crate::opcodes::Opcode;
use crate::packet::{InboundPacket, OutboundPacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AuthResponseCode {
    Ok = 0,
    Failed,
    IncorrectKey,
    UnknownAccount,
    BannedAccount,
    BannedIp,
    BannedPermanentlyAccount,
    BannedPermanentlyIp,
    ServerOffline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum MessageColor {
    Blue = 0x28a745,
    Red = 0xdc3545,
    Orange = 0xfd7e14,
    Purple = 0x6f42c1,
    Indigo = 0x6610f2,
    Yellow = 0xffc107,
    Teal = 0x20c997,
    Cyan = 0x17a2b8,
    Gray = 0xadb5bd,
    White = 0xffffff,
}

/// A typed payload bound to one opcode.
pub trait Message: Sized {
    const OPCODE: Opcode;

    fn read(packet: &mut InboundPacket) -> Result<Self, PacketError>;

    fn write(&self, packet: &mut OutboundPacket);

    fn to_packet(&self) -> OutboundPacket {
        let mut packet = OutboundPacket::new(Self::OPCODE);
        self.write(&mut packet);
        packet
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hello;

impl Message for Hello {
    const OPCODE: Opcode = Opcode::ClientSendHello;

    fn read(_packet: &mut InboundPacket) -> Result<Self, PacketError> {
        Ok(Hello)
    }

    fn write(&self, _packet: &mut OutboundPacket) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub account_name: String,
}

impl Message for AuthSession {
    const OPCODE: Opcode = Opcode::ClientAuthSession;

    fn read(packet: &mut InboundPacket) -> Result<Self, PacketError> {
        Ok(Self {
            account_name: packet.read_string()?,
        })
    }

    fn write(&self, packet: &mut OutboundPacket) {
        packet.write_string(&self.account_name);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub code: AuthResponseCode,
}

impl Message for AuthResponse {
    const OPCODE: Opcode = Opcode::ServerSendAuthResponse;

    fn read(packet: &mut InboundPacket) -> Result<Self, PacketError> {
        let raw = packet.read_u8()?;
        let code = AuthResponseCode::try_from(raw).map_err(|_| PacketError::InvalidValue {
            opcode: Self::OPCODE,
            field: "code",
            value: raw as u64,
        })?;
        Ok(Self { code })
    }

    fn write(&self, packet: &mut OutboundPacket) {
        packet.write_u8(self.code.into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDiscordMessage {
    pub channel_id: i64,
    pub message: String,
}

impl Message for SendDiscordMessage {
    const OPCODE: Opcode = Opcode::ClientSendMessage;

    fn read(packet: &mut InboundPacket) -> Result<Self, PacketError> {
        Ok(Self {
            channel_id: packet.read_i64()?,
            message: packet.read_string()?,
        })
    }

    fn write(&self, packet: &mut OutboundPacket) {
        packet.write_i64(self.channel_id);
        packet.write_string(&self.message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDiscordEmbedMessage {
    pub channel_id: i64,
    pub color: u32,
    pub title: String,
    pub description: String,
    pub timestamp: i64,
}

impl Message for SendDiscordEmbedMessage {
    const OPCODE: Opcode = Opcode::ClientSendMessageEmbed;

    fn read(packet: &mut InboundPacket) -> Result<Self, PacketError> {
        Ok(Self {
            channel_id: packet.read_i64()?,
            color: packet.read_u32()?,
            title: packet.read_string()?,
            description: packet.read_string()?,
            timestamp: packet.read_i64()?,
        })
    }

    fn write(&self, packet: &mut OutboundPacket) {
        packet.write_i64(self.channel_id);
        packet.write_u32(self.color);
        packet.write_string(&self.title);
        packet.write_string(&self.description);
        packet.write_i64(self.timestamp);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub ping: u32,
    /// Round trip of the previous ping in milliseconds, 0 if none was measured yet.
    pub latency: u32,
}

impl Message for Ping {
    const OPCODE: Opcode = Opcode::ClientSendPing;

    fn read(packet: &mut InboundPacket) -> Result<Self, PacketError> {
        Ok(Self {
            ping: packet.read_u32()?,
            latency: packet.read_u32()?,
        })
    }

    fn write(&self, packet: &mut OutboundPacket) {
        packet.write_u32(self.ping);
        packet.write_u32(self.latency);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    pub ping: u32,
}

impl Message for Pong {
    const OPCODE: Opcode = Opcode::ServerSendPong;

    fn read(packet: &mut InboundPacket) -> Result<Self, PacketError> {
        Ok(Self { ping: packet.read_u32()? })
    }

    fn write(&self, packet: &mut OutboundPacket) {
        packet.write_u32(self.ping);
    }
}
