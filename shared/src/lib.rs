//! Building blocks shared by the bot server and the relay client.
//!
//! - `opcodes` / `messages`: what travels over the wire and how each payload is laid out.
//! - `header`, `reader`, `writer`: framing. The reader reassembles frames that arrive split across
//!   arbitrary TCP segments, the writer batches queued packets into a few large send buffers.
//! - `buffer`: the growable byte cursor both of the above are built on.
//! - `queue`: closable multi-producer queue used to hand packets across threads.
//! - `socket`: the per-connection read/tick/close loop. Each process plugs its own protocol role
//!   into it through `SocketHandler`.
//! - `scheduler`: tiny tick-driven task scheduler used for keepalives.
//! - `config`: environment based settings both binaries read at startup.
//! - `logging`: the tracing subscriber both binaries install.

pub mod buffer;
pub mod config;
pub mod error;
pub mod header;
pub mod logging;
pub mod messages;
pub mod opcodes;
pub mod packet;
pub mod queue;
pub mod reader;
pub mod scheduler;
pub mod socket;
pub mod writer;

pub mod prelude {
    pub use super::buffer::MessageBuffer;
    pub use super::error::{BufferError, FrameError, PacketError, QueueClosed};
    pub use super::header::{FrameConfig, FrameFormat};
    pub use super::messages::*;
    pub use super::opcodes::{Opcode, OpcodeHandler, OpcodeTable};
    pub use super::packet::{InboundPacket, OutboundPacket};
    pub use super::socket::{SocketCore, SocketHandle, SocketHandler, SocketState};
}
