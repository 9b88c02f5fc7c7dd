// Loopback JDWP peer for protocol tests

use crate::commands::event_kinds;
use crate::events::SuspendPolicy;
use crate::protocol::{
    CommandPacket, ReplyPacket, COMPOSITE_EVENT_COMMAND, EVENT_COMMAND_SET, HEADER_SIZE,
    JDWP_HANDSHAKE,
};
use bytes::BufMut;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct FakeVm {
    listener: TcpListener,
    pub addr: SocketAddr,
}

impl FakeVm {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        Self { listener, addr }
    }

    /// Accept one debugger and answer its handshake
    pub async fn accept(self) -> TcpStream {
        let (mut stream, _) = self.listener.accept().await.unwrap();
        let mut buf = vec![0u8; JDWP_HANDSHAKE.len()];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, JDWP_HANDSHAKE);
        stream.write_all(JDWP_HANDSHAKE).await.unwrap();
        stream
    }

    /// Accept one debugger and answer its handshake with garbage
    pub async fn accept_with_bad_handshake(self) {
        let (mut stream, _) = self.listener.accept().await.unwrap();
        let mut buf = vec![0u8; JDWP_HANDSHAKE.len()];
        stream.read_exact(&mut buf).await.unwrap();
        stream.write_all(b"NOT-A-HANDSHAK").await.unwrap();
    }

    pub async fn read_command(stream: &mut TcpStream) -> CommandPacket {
        let mut header = [0u8; HEADER_SIZE];
        stream.read_exact(&mut header).await.unwrap();
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        let mut data = vec![0u8; length - HEADER_SIZE];
        stream.read_exact(&mut data).await.unwrap();

        CommandPacket {
            id,
            command_set: header[9],
            command: header[10],
            data,
        }
    }

    pub async fn write_reply(stream: &mut TcpStream, id: u32, error_code: u16, data: &[u8]) {
        let reply = ReplyPacket {
            id,
            error_code,
            data: data.to_vec(),
        };
        stream.write_all(&reply.encode()).await.unwrap();
    }

    pub async fn write_breakpoint(stream: &mut TcpStream, policy: SuspendPolicy, thread: u64) {
        let mut payload = Vec::new();
        payload.put_u8(policy as u8);
        payload.put_i32(1);
        payload.put_u8(event_kinds::BREAKPOINT);
        payload.put_i32(5);
        payload.put_u64(thread);
        payload.put_u8(1);
        payload.put_u64(0x10);
        payload.put_u64(0x20);
        payload.put_u64(3);

        let mut event = CommandPacket::new(0x4000_0000, EVENT_COMMAND_SET, COMPOSITE_EVENT_COMMAND);
        event.data = payload;
        stream.write_all(&event.encode()).await.unwrap();
    }
}
