use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Number of opcode slots, including the reserved `Null` slot.
pub const NUM_MSG_TYPES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Opcode {
    Null = 0,
    ClientSendHello = 1,
    ClientAuthSession = 2,
    ClientSendMessage = 3,
    ClientSendMessageEmbed = 4,
    ClientSendPing = 5,
    ServerSendAuthResponse = 6,
    ServerSendPong = 7,
}

impl Opcode {
    /// Every opcode, ordered by wire value so that `ALL[n]` has value `n`.
    pub const ALL: [Opcode; NUM_MSG_TYPES] = [
        Opcode::Null,
        Opcode::ClientSendHello,
        Opcode::ClientAuthSession,
        Opcode::ClientSendMessage,
        Opcode::ClientSendMessageEmbed,
        Opcode::ClientSendPing,
        Opcode::ServerSendAuthResponse,
        Opcode::ServerSendPong,
    ];

    pub fn from_raw(raw: u16) -> Option<Self> {
        Self::try_from(raw).ok()
    }

    pub fn raw(self) -> u16 {
        self.into()
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Null => "NULL_OPCODE",
            Opcode::ClientSendHello => "CLIENT_SEND_HELLO",
            Opcode::ClientAuthSession => "CLIENT_AUTH_SESSION",
            Opcode::ClientSendMessage => "CLIENT_SEND_MESSAGE",
            Opcode::ClientSendMessageEmbed => "CLIENT_SEND_MESSAGE_EMBED",
            Opcode::ClientSendPing => "CLIENT_SEND_PING",
            Opcode::ServerSendAuthResponse => "SERVER_SEND_AUTH_RESPONSE",
            Opcode::ServerSendPong => "SERVER_SEND_PONG",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.raw();
        write!(f, "[{} 0x{:04X} ({})]", self.name(), raw, raw)
    }
}

/// Formats raw header values too, which may not map to a known opcode.
pub fn opcode_name_for_logging(raw: u16) -> String {
    match Opcode::from_raw(raw) {
        Some(opcode) => opcode.to_string(),
        None => format!("[UNKNOWN OPCODE 0x{raw:04X} ({raw})]"),
    }
}

pub struct OpcodeHandler<H> {
    pub name: &'static str,
    pub handler: H,
}

/// Fixed-size table indexed by opcode value.
///
/// Built once from a binding function. Callers write that function as an exhaustive `match` over
/// `Opcode`, so adding an opcode without deciding how it is handled fails to compile. The `Null`
/// slot always stays empty.
pub struct OpcodeTable<H> {
    handlers: [Option<OpcodeHandler<H>>; NUM_MSG_TYPES],
}

impl<H> OpcodeTable<H> {
    pub fn new(mut binding: impl FnMut(Opcode) -> Option<H>) -> Self {
        let handlers = std::array::from_fn(|index| {
            let opcode = Opcode::ALL[index];
            if opcode == Opcode::Null {
                return None;
            }
            binding(opcode).map(|handler| OpcodeHandler {
                name: opcode.name(),
                handler,
            })
        });
        Self { handlers }
    }

    pub fn get(&self, opcode: Opcode) -> Option<&OpcodeHandler<H>> {
        self.get_raw(opcode.raw())
    }

    /// Out of range values simply have no handler.
    pub fn get_raw(&self, raw: u16) -> Option<&OpcodeHandler<H>> {
        self.handlers.get(raw as usize)?.as_ref()
    }

    pub fn bound_opcodes(&self) -> impl Iterator<Item = Opcode> + '_ {
        Opcode::ALL.into_iter().filter(|opcode| self.get(*opcode).is_some())
    }
}
