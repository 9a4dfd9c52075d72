//! Inbound and outbound packets.
//!
//! The two directions are separate types: an `InboundPacket` can only be read from and an
//! `OutboundPacket` can only be written to. Payload integers are little-endian and strings are
//! NUL-terminated UTF-8.

use std::time::Instant;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::PacketError;
use crate::opcodes::Opcode;

#[derive(Debug, Clone)]
pub struct InboundPacket {
    opcode: Opcode,
    storage: Vec<u8>,
    rpos: usize,
    received_at: Option<Instant>,
}

impl InboundPacket {
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            opcode,
            storage: payload,
            rpos: 0,
            received_at: None,
        }
    }

    pub fn with_received_time(mut self, received_at: Instant) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn received_at(&self) -> Option<Instant> {
        self.received_at
    }

    pub fn size(&self) -> usize {
        self.storage.len()
    }

    pub fn rpos(&self) -> usize {
        self.rpos
    }

    pub fn remaining(&self) -> usize {
        self.storage.len() - self.rpos
    }

    pub fn payload(&self) -> &[u8] {
        &self.storage
    }

    fn take(&mut self, count: usize) -> Result<&[u8], PacketError> {
        if count > self.remaining() {
            return Err(PacketError::ReadPastEnd {
                opcode: self.opcode,
                position: self.rpos,
                requested: count,
                size: self.storage.len(),
            });
        }
        let start = self.rpos;
        self.rpos += count;
        Ok(&self.storage[start..self.rpos])
    }

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, PacketError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, PacketError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, PacketError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, PacketError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_i64(&mut self) -> Result<i64, PacketError> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    pub fn read_string(&mut self) -> Result<String, PacketError> {
        let start = self.rpos;
        let length = self.storage[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or(PacketError::UnterminatedString {
                opcode: self.opcode,
                position: start,
            })?;
        let text = std::str::from_utf8(&self.storage[start..start + length])
            .map_err(|_| PacketError::InvalidUtf8 {
                opcode: self.opcode,
                position: start,
            })?
            .to_owned();
        self.rpos = start + length + 1;
        Ok(text)
    }

    pub fn read_skip(&mut self, count: usize) -> Result<(), PacketError> {
        self.take(count).map(|_| ())
    }

    pub fn hexlike(&self) -> String {
        hex::encode(&self.storage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    opcode: Opcode,
    storage: Vec<u8>,
}

impl OutboundPacket {
    pub fn new(opcode: Opcode) -> Self {
        Self::with_capacity(opcode, 0)
    }

    pub fn with_capacity(opcode: Opcode, capacity: usize) -> Self {
        Self {
            opcode,
            storage: Vec::with_capacity(capacity),
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn size(&self) -> usize {
        self.storage.len()
    }

    pub fn payload(&self) -> &[u8] {
        &self.storage
    }

    pub fn write_u8(&mut self, value: u8) {
        self.storage.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.storage.extend_from_slice(&bytes);
    }

    pub fn write_u32(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.storage.extend_from_slice(&bytes);
    }

    pub fn write_u64(&mut self, value: u64) {
        let mut bytes = [0u8; 8];
        LittleEndian::write_u64(&mut bytes, value);
        self.storage.extend_from_slice(&bytes);
    }

    pub fn write_i64(&mut self, value: i64) {
        let mut bytes = [0u8; 8];
        LittleEndian::write_i64(&mut bytes, value);
        self.storage.extend_from_slice(&bytes);
    }

    pub fn write_string(&mut self, value: &str) {
        self.storage.extend_from_slice(value.as_bytes());
        self.storage.push(0);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.storage.extend_from_slice(bytes);
    }
}
