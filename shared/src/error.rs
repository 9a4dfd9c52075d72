use thiserror::Error;

use crate::opcodes::Opcode;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer has {remaining} bytes of free space but {requested} were written")]
    InsufficientSpace { requested: usize, remaining: usize },
}

/// Framing failures. Any of these is fatal to the connection that produced it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("declared frame size {size} is smaller than the opcode field")]
    InvalidSize { size: u16 },
    #[error("payload of {length} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { length: usize, limit: usize },
    #[error("opcode {opcode} is out of range")]
    InvalidOpcode { opcode: u16 },
}

/// Errors raised while reading typed fields out of an otherwise valid frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("attempted to read {requested} bytes at position {position} of {opcode} with size {size}")]
    ReadPastEnd {
        opcode: Opcode,
        position: usize,
        requested: usize,
        size: usize,
    },
    #[error("string starting at position {position} of {opcode} is not terminated")]
    UnterminatedString { opcode: Opcode, position: usize },
    #[error("string starting at position {position} of {opcode} is not valid UTF-8")]
    InvalidUtf8 { opcode: Opcode, position: usize },
    #[error("invalid value {value} for field {field} of {opcode}")]
    InvalidValue { opcode: Opcode, field: &'static str, value: u64 },
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[error("queue is closed")]
pub struct QueueClosed;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_packet() {
        let err = PacketError::ReadPastEnd {
            opcode: Opcode::ClientSendMessage,
            position: 8,
            requested: 4,
            size: 10,
        };
        assert_eq!(
            err.to_string(),
            "attempted to read 4 bytes at position 8 of [CLIENT_SEND_MESSAGE 0x0003 (3)] with size 10"
        );

        let err = FrameError::PayloadTooLarge { length: 20000, limit: 10240 };
        assert_eq!(err.to_string(), "payload of 20000 bytes exceeds the limit of 10240 bytes");
    }
}
