use std::sync::Arc;
use std::time::Duration;

use async_io::Timer;
use herald_shared::buffer::MessageBuffer;
use herald_shared::header::{encode_header, FrameConfig};
use herald_shared::messages::{Hello, Message, Ping, Pong};
use herald_shared::opcodes::Opcode;
use herald_shared::packet::InboundPacket;
use herald_shared::reader::PacketReader;
use herald_shared::socket::{run_socket, SocketCore, SocketHandle, SocketHandler, SocketState};
use smol::io::{AsyncReadExt, AsyncWriteExt};
use smol::net::{TcpListener, TcpStream};

struct PingResponder {
    reader: PacketReader,
    closed: flume::Sender<()>,
}

impl SocketHandler for PingResponder {
    fn start(&mut self, _socket: &mut SocketCore) {}

    fn read_handler(&mut self, socket: &mut SocketCore) -> bool {
        loop {
            match self.reader.read_packet(socket.read_buffer_mut()) {
                Ok(Some(mut packet)) => match packet.opcode() {
                    Opcode::ClientSendPing => {
                        let Ok(ping) = Ping::read(&mut packet) else {
                            return false;
                        };
                        socket.handle().send_packet(Pong { ping: ping.ping }.to_packet());
                    }
                    Opcode::ClientSendHello => {
                        socket.handle().send_packet(Pong { ping: 0 }.to_packet());
                        socket.delayed_close_socket();
                    }
                    _ => return false,
                },
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }

    fn update(&mut self, socket: &mut SocketCore) -> bool {
        socket.drain_outbound();
        true
    }

    fn on_close(&mut self, _socket: &mut SocketCore) {
        let _ = self.closed.send(());
    }
}

async fn with_timeout<T>(future: impl std::future::Future<Output = T>) -> T {
    smol::future::or(future, async {
        Timer::after(Duration::from_secs(5)).await;
        panic!("timed out");
    })
    .await
}

/// Starts a listener, returns the connected client stream plus the server side handle.
async fn connect() -> (TcpStream, Arc<SocketHandle>, flume::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let client = TcpStream::connect(address).await.unwrap();
    let (stream, peer) = listener.accept().await.unwrap();

    let (handle, signals) = SocketHandle::new(peer);
    let (closed_sender, closed_receiver) = flume::unbounded();
    let config = FrameConfig::default();
    let core = SocketCore::new(stream, handle.clone(), signals, config, Duration::from_millis(5));
    let responder = PingResponder {
        reader: PacketReader::new(&config),
        closed: closed_sender,
    };
    smol::spawn(run_socket(core, responder)).detach();

    (client, handle, closed_receiver)
}

fn frame<M: Message>(message: &M) -> Vec<u8> {
    let packet = message.to_packet();
    let mut bytes = encode_header(packet.size(), packet.opcode()).unwrap().to_vec();
    bytes.extend_from_slice(packet.payload());
    bytes
}

async fn read_packet(stream: &mut TcpStream, reader: &mut PacketReader, input: &mut MessageBuffer) -> Option<InboundPacket> {
    loop {
        if let Some(packet) = reader.read_packet(input).unwrap() {
            return Some(packet);
        }
        input.normalize();
        input.ensure_free_space();
        let bytes = stream.read(input.write_slice()).await.unwrap();
        if bytes == 0 {
            return None;
        }
        input.write_completed(bytes);
    }
}

#[test]
fn test_replies_in_order_across_split_writes() {
    smol::block_on(with_timeout(async {
        let (mut client, _handle, _closed) = connect().await;

        let mut bytes = frame(&Ping { ping: 1, latency: 0 });
        bytes.extend(frame(&Ping { ping: 2, latency: 0 }));
        let third = frame(&Ping { ping: 3, latency: 0 });
        client.write_all(&bytes).await.unwrap();
        client.write_all(&third[..5]).await.unwrap();
        Timer::after(Duration::from_millis(20)).await;
        client.write_all(&third[5..]).await.unwrap();

        let mut reader = PacketReader::new(&FrameConfig::default());
        let mut input = MessageBuffer::default();
        for expected in 1..=3 {
            let mut packet = read_packet(&mut client, &mut reader, &mut input).await.unwrap();
            assert_eq!(Pong::read(&mut packet).unwrap().ping, expected);
        }
    }));
}

#[test]
fn test_delayed_close_flushes_response_first() {
    smol::block_on(with_timeout(async {
        let (mut client, handle, closed) = connect().await;
        client.write_all(&frame(&Hello)).await.unwrap();

        let mut reader = PacketReader::new(&FrameConfig::default());
        let mut input = MessageBuffer::default();
        let packet = read_packet(&mut client, &mut reader, &mut input).await.unwrap();
        assert_eq!(packet.opcode(), Opcode::ServerSendPong);
        assert!(read_packet(&mut client, &mut reader, &mut input).await.is_none());

        closed.recv_async().await.unwrap();
        assert_eq!(handle.state(), SocketState::Closed);
    }));
}

#[test]
fn test_invalid_frame_closes_without_reply() {
    smol::block_on(with_timeout(async {
        let (mut client, _handle, closed) = connect().await;
        client.write_all(&[0x00, 0x02, 0x00, 0x7F]).await.unwrap();

        let mut reader = PacketReader::new(&FrameConfig::default());
        let mut input = MessageBuffer::default();
        assert!(read_packet(&mut client, &mut reader, &mut input).await.is_none());
        closed.recv_async().await.unwrap();
    }));
}

#[test]
fn test_close_from_another_thread() {
    smol::block_on(with_timeout(async {
        let (mut client, handle, closed) = connect().await;
        let remote = handle.clone();
        std::thread::spawn(move || remote.close_socket()).join().unwrap();

        let mut reader = PacketReader::new(&FrameConfig::default());
        let mut input = MessageBuffer::default();
        assert!(read_packet(&mut client, &mut reader, &mut input).await.is_none());
        closed.recv_async().await.unwrap();
        assert!(!handle.send_packet(Pong { ping: 1 }.to_packet()));
    }));
}
