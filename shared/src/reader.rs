use std::time::Instant;

use crate::buffer::MessageBuffer;
use crate::error::FrameError;
use crate::header::{FrameConfig, FrameFormat, PacketHeader, SIZED_HEADER_SIZE};
use crate::opcodes::{Opcode, NUM_MSG_TYPES};
use crate::packet::InboundPacket;

struct PendingPayload {
    opcode: Opcode,
    payload: MessageBuffer,
}

/// Reassembles packets from the bytes a socket read left in its receive buffer.
///
/// Sized frames are staged in two buffers: a fixed four byte header buffer and a payload buffer
/// allocated once the header was validated. Either may be filled over any number of reads. The
/// filled payload buffer is moved into the packet without copying.
pub struct PacketReader {
    format: FrameFormat,
    max_payload_size: usize,
    header: MessageBuffer,
    pending: Option<PendingPayload>,
}

impl PacketReader {
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            format: config.format,
            max_payload_size: config.max_payload_size,
            header: MessageBuffer::with_capacity(SIZED_HEADER_SIZE),
            pending: None,
        }
    }

    /// Consumes bytes from `input` until one packet is complete or `input` runs dry.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Call repeatedly until it does, since a single
    /// read may contain several packets.
    pub fn read_packet(&mut self, input: &mut MessageBuffer) -> Result<Option<InboundPacket>, FrameError> {
        match self.format {
            FrameFormat::Sized => self.read_sized(input),
            FrameFormat::Command => self.read_command(input),
        }
    }

    /// True while part of a frame is staged.
    pub fn is_mid_frame(&self) -> bool {
        self.pending.is_some() || !self.header.is_empty()
    }

    fn read_sized(&mut self, input: &mut MessageBuffer) -> Result<Option<InboundPacket>, FrameError> {
        if self.pending.is_none() {
            if !fill(&mut self.header, input) {
                return Ok(None);
            }

            let mut bytes = [0u8; SIZED_HEADER_SIZE];
            bytes.copy_from_slice(self.header.read_slice());
            self.header.reset();

            let (payload_length, opcode) = PacketHeader::from_bytes(&bytes).validate(self.max_payload_size)?;
            self.pending = Some(PendingPayload {
                opcode,
                payload: MessageBuffer::with_capacity(payload_length),
            });
        }

        let complete = match self.pending.as_mut() {
            Some(pending) => fill(&mut pending.payload, input),
            None => false,
        };
        if !complete {
            return Ok(None);
        }

        Ok(self
            .pending
            .take()
            .map(|pending| InboundPacket::new(pending.opcode, pending.payload.into_vec()).with_received_time(Instant::now())))
    }

    /// Every read is one command: the first byte is the opcode, everything after it the payload.
    fn read_command(&mut self, input: &mut MessageBuffer) -> Result<Option<InboundPacket>, FrameError> {
        let consumed = input.active_size();
        let Some((&command, payload)) = input.read_slice().split_first() else {
            return Ok(None);
        };

        let opcode = Opcode::from_raw(command as u16)
            .filter(|opcode| (opcode.raw() as usize) < NUM_MSG_TYPES)
            .ok_or(FrameError::InvalidOpcode { opcode: command as u16 })?;
        if payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                length: payload.len(),
                limit: self.max_payload_size,
            });
        }

        let packet = InboundPacket::new(opcode, payload.to_vec()).with_received_time(Instant::now());
        input.read_completed(consumed);
        Ok(Some(packet))
    }
}

/// Moves as many bytes as fit from `input` into `target`. Returns true once `target` is full.
fn fill(target: &mut MessageBuffer, input: &mut MessageBuffer) -> bool {
    let count = target.remaining_space().min(input.active_size());
    if count > 0 {
        target.write_slice()[..count].copy_from_slice(&input.read_slice()[..count]);
        target.write_completed(count);
        input.read_completed(count);
    }
    target.remaining_space() == 0
}
