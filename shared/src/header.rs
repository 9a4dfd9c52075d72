use std::str::FromStr;

use anyhow::bail;
use byteorder::{BigEndian, ByteOrder};

use crate::buffer::DEFAULT_BUFFER_SIZE;
use crate::error::FrameError;
use crate::opcodes::{Opcode, NUM_MSG_TYPES};

/// `[u16 size][u16 opcode]`, both big-endian. `size` counts the opcode field plus the payload.
pub const SIZED_HEADER_SIZE: usize = 4;
/// A single opcode byte, payload length implied by the read.
pub const COMMAND_HEADER_SIZE: usize = 1;
pub const OPCODE_SIZE: usize = 2;
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 10240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFormat {
    #[default]
    Sized,
    Command,
}

impl FrameFormat {
    pub fn header_size(self) -> usize {
        match self {
            FrameFormat::Sized => SIZED_HEADER_SIZE,
            FrameFormat::Command => COMMAND_HEADER_SIZE,
        }
    }
}

impl FromStr for FrameFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sized" => Ok(FrameFormat::Sized),
            "command" => Ok(FrameFormat::Command),
            other => bail!("Unknown frame format '{other}', expected 'sized' or 'command'"),
        }
    }
}

/// Framing parameters one connection is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    pub format: FrameFormat,
    pub max_payload_size: usize,
    pub send_buffer_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            format: FrameFormat::Sized,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            send_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub size: u16,
    pub opcode: u16,
}

impl PacketHeader {
    pub fn new(payload_length: usize, opcode: Opcode) -> Result<Self, FrameError> {
        let size = u16::try_from(payload_length + OPCODE_SIZE).map_err(|_| FrameError::PayloadTooLarge {
            length: payload_length,
            limit: u16::MAX as usize - OPCODE_SIZE,
        })?;
        Ok(Self { size, opcode: opcode.raw() })
    }

    pub fn to_bytes(self) -> [u8; SIZED_HEADER_SIZE] {
        let mut bytes = [0u8; SIZED_HEADER_SIZE];
        BigEndian::write_u16(&mut bytes[0..2], self.size);
        BigEndian::write_u16(&mut bytes[2..4], self.opcode);
        bytes
    }

    pub fn from_bytes(bytes: &[u8; SIZED_HEADER_SIZE]) -> Self {
        Self {
            size: BigEndian::read_u16(&bytes[0..2]),
            opcode: BigEndian::read_u16(&bytes[2..4]),
        }
    }

    pub fn payload_length(&self) -> usize {
        (self.size as usize).saturating_sub(OPCODE_SIZE)
    }

    pub fn is_valid_size(&self, max_payload_size: usize) -> bool {
        self.size as usize >= OPCODE_SIZE && self.payload_length() <= max_payload_size
    }

    pub fn is_valid_opcode(&self) -> bool {
        (self.opcode as usize) < NUM_MSG_TYPES
    }

    /// Checks both fields before the declared length is trusted for an allocation.
    pub fn validate(&self, max_payload_size: usize) -> Result<(usize, Opcode), FrameError> {
        if (self.size as usize) < OPCODE_SIZE {
            return Err(FrameError::InvalidSize { size: self.size });
        }
        if !self.is_valid_size(max_payload_size) {
            return Err(FrameError::PayloadTooLarge {
                length: self.payload_length(),
                limit: max_payload_size,
            });
        }
        let opcode = Opcode::from_raw(self.opcode)
            .filter(|_| self.is_valid_opcode())
            .ok_or(FrameError::InvalidOpcode { opcode: self.opcode })?;

        Ok((self.payload_length(), opcode))
    }
}

pub fn encode_header(payload_length: usize, opcode: Opcode) -> Result<[u8; SIZED_HEADER_SIZE], FrameError> {
    Ok(PacketHeader::new(payload_length, opcode)?.to_bytes())
}

pub fn decode_header(bytes: &[u8; SIZED_HEADER_SIZE], max_payload_size: usize) -> Result<(usize, Opcode), FrameError> {
    PacketHeader::from_bytes(bytes).validate(max_payload_size)
}

/// Header bytes for either framing mode, returned with the number of bytes actually used.
pub fn encode_frame_header(format: FrameFormat, payload_length: usize, opcode: Opcode) -> Result<([u8; SIZED_HEADER_SIZE], usize), FrameError> {
    match format {
        FrameFormat::Sized => Ok((encode_header(payload_length, opcode)?, SIZED_HEADER_SIZE)),
        FrameFormat::Command => {
            let command = u8::try_from(opcode.raw()).map_err(|_| FrameError::InvalidOpcode { opcode: opcode.raw() })?;
            Ok(([command, 0, 0, 0], COMMAND_HEADER_SIZE))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip_for_all_valid_pairs() {
        for opcode in Opcode::ALL {
            for payload_length in 0..=DEFAULT_MAX_PAYLOAD_SIZE {
                let bytes = encode_header(payload_length, opcode).unwrap();
                assert_eq!(decode_header(&bytes, DEFAULT_MAX_PAYLOAD_SIZE), Ok((payload_length, opcode)));
            }
        }
    }

    #[test]
    fn test_header_is_big_endian_and_counts_opcode() {
        let bytes = encode_header(3, Opcode::ClientAuthSession).unwrap();
        assert_eq!(bytes, [0x00, 0x05, 0x00, 0x02]);
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let header = PacketHeader {
            size: (DEFAULT_MAX_PAYLOAD_SIZE + OPCODE_SIZE + 1) as u16,
            opcode: 3,
        };
        assert!(!header.is_valid_size(DEFAULT_MAX_PAYLOAD_SIZE));
        assert_eq!(
            header.validate(DEFAULT_MAX_PAYLOAD_SIZE),
            Err(FrameError::PayloadTooLarge {
                length: DEFAULT_MAX_PAYLOAD_SIZE + 1,
                limit: DEFAULT_MAX_PAYLOAD_SIZE
            })
        );
    }

    #[test]
    fn test_rejects_size_below_opcode_width() {
        let header = PacketHeader { size: 1, opcode: 1 };
        assert_eq!(header.validate(DEFAULT_MAX_PAYLOAD_SIZE), Err(FrameError::InvalidSize { size: 1 }));
    }

    #[test]
    fn test_rejects_unknown_opcode() {
        let header = PacketHeader {
            size: 2,
            opcode: NUM_MSG_TYPES as u16,
        };
        assert!(!header.is_valid_opcode());
        assert_eq!(
            header.validate(DEFAULT_MAX_PAYLOAD_SIZE),
            Err(FrameError::InvalidOpcode {
                opcode: NUM_MSG_TYPES as u16
            })
        );
    }

    #[test]
    fn test_payload_that_overflows_size_field() {
        assert!(matches!(
            encode_header(u16::MAX as usize, Opcode::ClientSendMessage),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_command_header() {
        let (bytes, used) = encode_frame_header(FrameFormat::Command, 100, Opcode::ClientSendPing).unwrap();
        assert_eq!(used, COMMAND_HEADER_SIZE);
        assert_eq!(bytes[0], 5);
    }

    #[test]
    fn test_frame_format_from_str() {
        assert_eq!("Sized".parse::<FrameFormat>().unwrap(), FrameFormat::Sized);
        assert_eq!(" command ".parse::<FrameFormat>().unwrap(), FrameFormat::Command);
        assert!("lines".parse::<FrameFormat>().is_err());
    }
}
