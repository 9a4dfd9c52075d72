use tracing::error;

use crate::buffer::MessageBuffer;
use crate::header::{encode_frame_header, FrameConfig};
use crate::packet::OutboundPacket;

/// Serializes queued packets into as few send buffers as possible.
///
/// Packets are appended to a buffer of `send_buffer_size` bytes. When the next packet does not
/// fit, the buffer is flushed to the result and a fresh one is started. A packet that is larger
/// than `send_buffer_size` by itself gets a buffer of exactly its size. Packets whose payload
/// exceeds `max_payload_size` are logged and dropped, the peer would reject them anyway.
pub fn build_send_buffers(packets: impl IntoIterator<Item = OutboundPacket>, config: &FrameConfig) -> Vec<MessageBuffer> {
    let mut buffers = vec![];
    let mut buffer = MessageBuffer::with_capacity(config.send_buffer_size);

    for packet in packets {
        if packet.size() > config.max_payload_size {
            error!(
                "Dropping outgoing packet {} with payload of {} bytes (limit {})",
                packet.opcode(),
                packet.size(),
                config.max_payload_size
            );
            continue;
        }
        let (header, header_length) = match encode_frame_header(config.format, packet.size(), packet.opcode()) {
            Ok(header) => header,
            Err(e) => {
                error!("Dropping outgoing packet {}: {e}", packet.opcode());
                continue;
            }
        };
        let header = &header[..header_length];
        let packet_size = header_length + packet.size();

        if buffer.remaining_space() < packet_size && !buffer.is_empty() {
            buffers.push(std::mem::replace(&mut buffer, MessageBuffer::with_capacity(config.send_buffer_size)));
        }

        if buffer.remaining_space() >= packet_size {
            write_frame(&mut buffer, header, packet.payload());
        } else {
            let mut single = MessageBuffer::with_capacity(packet_size);
            write_frame(&mut single, header, packet.payload());
            buffers.push(single);
        }
    }

    if !buffer.is_empty() {
        buffers.push(buffer);
    }

    buffers
}

fn write_frame(buffer: &mut MessageBuffer, header: &[u8], payload: &[u8]) {
    // Callers checked the space, a failure here means the sizes above are wrong.
    if let Err(e) = buffer.write(header).and_then(|_| buffer.write(payload)) {
        error!("Failed to serialize packet into send buffer: {e}");
    }
}
