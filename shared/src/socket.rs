//! Per-connection socket loop shared by both protocol roles.
//!
//! - `SocketHandle` is the thread-safe face of a connection. Sessions and managers on other
//!   threads hold it to queue packets, ask whether the socket is still open, or close it.
//! - `SocketCore` owns the stream and its buffers and is only touched by the connection's own task.
//! - `run_socket` races socket reads against a periodic update tick and the close signal. A single
//!   task per connection means reads, writes and callbacks of one connection never overlap.
//! - Roles (bot server socket, relay client socket) implement `SocketHandler` and only decide what
//!   to do with complete packets and when to flush.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_io::Timer;
use smol::future;
use smol::io::{AsyncReadExt, AsyncWriteExt};
use smol::net::{Shutdown, TcpStream};
use smol::stream::StreamExt;
use tracing::{debug, trace};

use crate::buffer::MessageBuffer;
use crate::header::FrameConfig;
use crate::packet::OutboundPacket;
use crate::queue::{closable_queue, QueueReceiver, QueueSender};
use crate::writer::build_send_buffers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl SocketState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SocketState::Connecting,
            1 => SocketState::Open,
            2 => SocketState::Closing,
            _ => SocketState::Closed,
        }
    }
}

/// Receiving ends created alongside a `SocketHandle`, consumed by `SocketCore`.
pub struct SocketSignals {
    outbound: QueueReceiver<OutboundPacket>,
    close_receiver: flume::Receiver<()>,
}

impl SocketSignals {
    /// Packets queued through the handle and not yet taken by the socket task.
    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }
}

pub struct SocketHandle {
    remote_address: SocketAddr,
    state: AtomicU8,
    authed: AtomicBool,
    delayed_close: AtomicBool,
    outbound: QueueSender<OutboundPacket>,
    close_sender: flume::Sender<()>,
}

impl SocketHandle {
    pub fn new(remote_address: SocketAddr) -> (Arc<Self>, SocketSignals) {
        let (outbound_sender, outbound_receiver) = closable_queue();
        let (close_sender, close_receiver) = flume::bounded(1);
        let handle = Arc::new(Self {
            remote_address,
            state: AtomicU8::new(SocketState::Connecting as u8),
            authed: AtomicBool::new(false),
            delayed_close: AtomicBool::new(false),
            outbound: outbound_sender,
            close_sender,
        });
        let signals = SocketSignals {
            outbound: outbound_receiver,
            close_receiver,
        };
        (handle, signals)
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    pub fn remote_ip(&self) -> String {
        self.remote_address.ip().to_string()
    }

    pub fn state(&self) -> SocketState {
        SocketState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Connecting -> Open`. Fails if the socket was closed before it ever started.
    pub fn open(&self) -> bool {
        self.state
            .compare_exchange(
                SocketState::Connecting as u8,
                SocketState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SocketState::Open
    }

    pub fn is_authed(&self) -> bool {
        self.authed.load(Ordering::Acquire)
    }

    pub fn set_authed(&self, authed: bool) {
        self.authed.store(authed, Ordering::Release);
    }

    /// Queues a packet for the next write tick. Dropped once the socket stopped being open.
    pub fn send_packet(&self, packet: OutboundPacket) -> bool {
        if !self.is_open() {
            trace!("Dropping {} for closed socket {}", packet.opcode(), self.remote_address);
            return false;
        }
        self.outbound.enqueue(packet).is_ok()
    }

    /// Moves the socket to `Closing`, rejects further packets and wakes its task.
    pub fn close_socket(&self) {
        let changed = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| match SocketState::from_u8(state) {
                SocketState::Connecting | SocketState::Open => Some(SocketState::Closing as u8),
                SocketState::Closing | SocketState::Closed => None,
            })
            .is_ok();

        if changed {
            self.outbound.close();
            let _ = self.close_sender.try_send(());
        }
    }

    /// Closes once everything queued so far has been written. Reading stops immediately.
    pub fn delayed_close_socket(&self) {
        self.delayed_close.store(true, Ordering::Release);
    }

    pub fn is_delayed_close(&self) -> bool {
        self.delayed_close.load(Ordering::Acquire)
    }

    fn set_closed(&self) {
        self.state.store(SocketState::Closed as u8, Ordering::Release);
    }
}

pub struct SocketCore {
    stream: TcpStream,
    handle: Arc<SocketHandle>,
    outbound: QueueReceiver<OutboundPacket>,
    close_receiver: flume::Receiver<()>,
    read_buffer: MessageBuffer,
    write_queue: VecDeque<MessageBuffer>,
    frame_config: FrameConfig,
    update_interval: Duration,
}

impl SocketCore {
    pub fn new(stream: TcpStream, handle: Arc<SocketHandle>, signals: SocketSignals, frame_config: FrameConfig, update_interval: Duration) -> Self {
        Self {
            stream,
            handle,
            outbound: signals.outbound,
            close_receiver: signals.close_receiver,
            read_buffer: MessageBuffer::default(),
            write_queue: VecDeque::new(),
            frame_config,
            update_interval,
        }
    }

    pub fn handle(&self) -> &Arc<SocketHandle> {
        &self.handle
    }

    pub fn frame_config(&self) -> &FrameConfig {
        &self.frame_config
    }

    pub fn read_buffer_mut(&mut self) -> &mut MessageBuffer {
        &mut self.read_buffer
    }

    pub fn queue_packet(&mut self, buffer: MessageBuffer) {
        self.write_queue.push_back(buffer);
    }

    /// Serializes a packet straight into the write queue, skipping the outbound packet queue.
    pub fn send_packet_now(&mut self, packet: OutboundPacket) {
        for buffer in build_send_buffers([packet], &self.frame_config) {
            self.queue_packet(buffer);
        }
    }

    /// Moves every packet producers queued so far into send buffers.
    pub fn drain_outbound(&mut self) {
        let packets = self.outbound.drain();
        if packets.is_empty() {
            return;
        }
        for buffer in build_send_buffers(packets, &self.frame_config) {
            self.queue_packet(buffer);
        }
    }

    pub fn has_pending_output(&self) -> bool {
        !self.write_queue.is_empty() || !self.outbound.is_empty()
    }

    pub fn close_socket(&self) {
        self.handle.close_socket();
    }

    pub fn delayed_close_socket(&self) {
        self.handle.delayed_close_socket();
    }

    async fn flush(&mut self) -> Result<()> {
        if self.write_queue.is_empty() {
            return Ok(());
        }
        while let Some(buffer) = self.write_queue.pop_front() {
            self.stream.write_all(buffer.read_slice()).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }
}

/// One protocol role plugged into `run_socket`.
pub trait SocketHandler: Send {
    /// Called once before the first read.
    fn start(&mut self, socket: &mut SocketCore);

    /// New bytes are in the read buffer. Returning false closes the socket without flushing.
    fn read_handler(&mut self, socket: &mut SocketCore) -> bool;

    /// Periodic tick. Queue outgoing buffers here, they are written right after. Returning false
    /// closes the socket.
    fn update(&mut self, socket: &mut SocketCore) -> bool;

    /// Someone else asked this socket to close.
    fn stop(&mut self, _socket: &mut SocketCore) {}

    fn on_close(&mut self, socket: &mut SocketCore);

    /// Reads are only issued while this is true.
    fn wants_read(&self) -> bool {
        true
    }
}

enum SocketEvent {
    Read(usize),
    Tick,
    Close,
}

/// Drives one connection until it closes, then releases it.
pub async fn run_socket<H: SocketHandler>(mut socket: SocketCore, mut handler: H) {
    let address = socket.handle.remote_address();
    if socket.handle.open() {
        handler.start(&mut socket);
        if let Err(e) = drive(&mut socket, &mut handler).await {
            debug!("Socket {address} closed with error: {e}");
        }
    }

    socket.handle.close_socket();
    handler.on_close(&mut socket);
    if let Err(e) = socket.stream.shutdown(Shutdown::Both) {
        trace!("Shutdown of {address} failed: {e}");
    }
    socket.handle.set_closed();
}

async fn drive<H: SocketHandler>(socket: &mut SocketCore, handler: &mut H) -> Result<()> {
    let mut ticker = Timer::interval(socket.update_interval);

    while socket.handle.is_open() {
        let reading = handler.wants_read() && !socket.handle.is_delayed_close();
        socket.read_buffer.normalize();
        socket.read_buffer.ensure_free_space();

        let event = future::race(
            receive_from_peer(&mut socket.stream, &mut socket.read_buffer, reading),
            future::race(receive_tick(&mut ticker), receive_close(&socket.close_receiver)),
        )
        .await?;

        match event {
            SocketEvent::Read(0) => {
                trace!("Peer {} closed the connection", socket.handle.remote_address());
                break;
            }
            SocketEvent::Read(bytes) => {
                socket.read_buffer.write_completed(bytes);
                if !handler.read_handler(socket) {
                    socket.close_socket();
                }
            }
            SocketEvent::Tick => {
                if !handler.update(socket) {
                    break;
                }
                socket.flush().await?;
                if socket.handle.is_delayed_close() && !socket.has_pending_output() {
                    break;
                }
            }
            SocketEvent::Close => {
                handler.stop(socket);
                break;
            }
        }
    }

    Ok(())
}

async fn receive_from_peer(stream: &mut TcpStream, buffer: &mut MessageBuffer, reading: bool) -> Result<SocketEvent> {
    if !reading {
        return future::pending().await;
    }
    let bytes = stream.read(buffer.write_slice()).await?;
    Ok(SocketEvent::Read(bytes))
}

async fn receive_tick(ticker: &mut Timer) -> Result<SocketEvent> {
    ticker.next().await;
    Ok(SocketEvent::Tick)
}

async fn receive_close(close_receiver: &flume::Receiver<()>) -> Result<SocketEvent> {
    // A dropped sender means the handle is gone, which is a close as well.
    let _ = close_receiver.recv_async().await;
    Ok(SocketEvent::Close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::Opcode;

    fn handle() -> (Arc<SocketHandle>, SocketSignals) {
        SocketHandle::new("127.0.0.1:4000".parse().unwrap())
    }

    #[test]
    fn test_state_transitions() {
        let (handle, _signals) = handle();
        assert_eq!(handle.state(), SocketState::Connecting);
        assert!(!handle.is_open());

        assert!(handle.open());
        assert!(handle.is_open());
        assert!(!handle.open());

        handle.close_socket();
        assert_eq!(handle.state(), SocketState::Closing);
        handle.set_closed();
        handle.close_socket();
        assert_eq!(handle.state(), SocketState::Closed);
    }

    #[test]
    fn test_closed_before_start_never_opens() {
        let (handle, _signals) = handle();
        handle.close_socket();
        assert!(!handle.open());
    }

    #[test]
    fn test_send_packet_only_while_open() {
        let (handle, signals) = handle();
        assert!(!handle.send_packet(OutboundPacket::new(Opcode::ServerSendPong)));

        handle.open();
        assert!(handle.send_packet(OutboundPacket::new(Opcode::ServerSendPong)));
        assert_eq!(signals.outbound.len(), 1);

        handle.close_socket();
        assert!(!handle.send_packet(OutboundPacket::new(Opcode::ServerSendPong)));
        assert!(signals.close_receiver.try_recv().is_ok());
        assert!(signals.outbound.drain().is_empty());
    }

    #[test]
    fn test_remote_ip() {
        let (handle, _signals) = handle();
        assert_eq!(handle.remote_ip(), "127.0.0.1");
        assert_eq!(handle.remote_address().port(), 4000);
    }
}
