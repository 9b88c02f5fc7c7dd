// JDWP connection management
//
// Handles TCP connection, handshake, and event loop startup

use crate::eventloop::{spawn_event_loop, EventLoopHandle, LoopShared};
use crate::events::EventSet;
use crate::invoke::InvokingThreads;
use crate::protocol::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Timeouts and buffer sizes for a connection
#[derive(Debug, Clone)]
pub struct JdwpConfig {
    pub handshake_timeout: Duration,
    /// Upper bound for every ordinary command round trip
    pub reply_timeout: Duration,
    /// Upper bound for method invocation and object construction
    pub invoke_timeout: Duration,
    pub event_buffer: usize,
}

impl Default for JdwpConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(10),
            invoke_timeout: Duration::from_secs(30),
            event_buffer: 256,
        }
    }
}

/// Cheap to clone; clones share the socket, the packet id counter and the
/// invoking-thread table
#[derive(Debug, Clone)]
pub struct JdwpConnection {
    event_loop: EventLoopHandle,
    next_id: Arc<AtomicU32>,
    invoking: InvokingThreads,
    config: JdwpConfig,
}

impl JdwpConnection {
    /// Connect to a JVM via JDWP
    pub async fn connect(host: &str, port: u16) -> JdwpResult<Self> {
        Self::connect_with_config(host, port, JdwpConfig::default()).await
    }

    pub async fn connect_with_config(
        host: &str,
        port: u16,
        config: JdwpConfig,
    ) -> JdwpResult<Self> {
        info!("Connecting to JDWP at {}:{}", host, port);

        let connect = TcpStream::connect((host, port));
        let mut stream = tokio::time::timeout(config.handshake_timeout, connect)
            .await
            .map_err(|_| JdwpError::Timeout(config.handshake_timeout))??;
        let _ = stream.set_nodelay(true);

        // Perform JDWP handshake
        tokio::time::timeout(config.handshake_timeout, Self::handshake(&mut stream))
            .await
            .map_err(|_| JdwpError::Timeout(config.handshake_timeout))??;

        // Split stream and spawn event loop
        let (reader, writer) = stream.into_split();
        let next_id = Arc::new(AtomicU32::new(1));
        let invoking = InvokingThreads::new();
        let event_loop = spawn_event_loop(
            reader,
            writer,
            LoopShared {
                next_id: next_id.clone(),
                invoking: invoking.clone(),
                event_buffer: config.event_buffer,
            },
        );

        Ok(Self {
            event_loop,
            next_id,
            invoking,
            config,
        })
    }

    /// Perform JDWP handshake
    async fn handshake(stream: &mut TcpStream) -> JdwpResult<()> {
        debug!("Performing JDWP handshake");

        // Send handshake
        stream.write_all(JDWP_HANDSHAKE).await?;
        stream.flush().await?;

        // Receive handshake response
        let mut buf = vec![0u8; JDWP_HANDSHAKE.len()];
        stream.read_exact(&mut buf).await?;

        if buf != JDWP_HANDSHAKE {
            warn!("Invalid handshake response: {:?}", buf);
            return Err(JdwpError::InvalidHandshake);
        }

        info!("JDWP handshake successful");
        Ok(())
    }

    /// Send a command and wait for reply, bounded by the reply timeout
    pub async fn send_command(&self, packet: CommandPacket) -> JdwpResult<ReplyPacket> {
        self.send_command_with_timeout(packet, self.config.reply_timeout)
            .await
    }

    pub async fn send_command_with_timeout(
        &self,
        packet: CommandPacket,
        timeout: Duration,
    ) -> JdwpResult<ReplyPacket> {
        debug!("Sending command packet id={}", packet.id);
        self.event_loop.send_command(packet, timeout).await
    }

    /// Try to receive an event (non-blocking)
    pub async fn try_recv_event(&self) -> Option<EventSet> {
        self.event_loop.try_recv_event().await
    }

    /// Wait for the next event (blocking)
    pub async fn recv_event(&self) -> Option<EventSet> {
        self.event_loop.recv_event().await
    }

    /// Generate next packet ID
    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Whether the socket to the VM is gone
    pub fn is_closed(&self) -> bool {
        self.event_loop.is_closed()
    }

    pub fn invoking_threads(&self) -> &InvokingThreads {
        &self.invoking
    }

    pub fn config(&self) -> &JdwpConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVm;

    fn fast_config() -> JdwpConfig {
        JdwpConfig {
            reply_timeout: Duration::from_millis(100),
            ..JdwpConfig::default()
        }
    }

    #[tokio::test]
    async fn test_reply_is_routed_by_id() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;
            let cmd = FakeVm::read_command(&mut stream).await;
            assert_eq!((cmd.command_set, cmd.command), (1, 7));
            FakeVm::write_reply(&mut stream, cmd.id, 0, &[0, 0, 0, 8]).await;
        });

        let conn = JdwpConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        let reply = conn
            .send_command(CommandPacket::new(conn.next_id(), 1, 7))
            .await
            .unwrap();
        assert_eq!(reply.data(), &[0, 0, 0, 8]);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_reply_times_out() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;
            let _ = FakeVm::read_command(&mut stream).await;
            // Never reply, hold the socket open
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        let host = addr.ip().to_string();
        let conn = JdwpConnection::connect_with_config(&host, addr.port(), fast_config())
            .await
            .unwrap();
        let err = conn
            .send_command(CommandPacket::new(conn.next_id(), 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, JdwpError::Timeout(_)));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_hangup_reports_closed() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;
            let _ = FakeVm::read_command(&mut stream).await;
            drop(stream);
        });

        let conn = JdwpConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        let err = conn
            .send_command(CommandPacket::new(conn.next_id(), 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, JdwpError::ConnectionClosed));
        peer.await.unwrap();

        // Later commands fail fast once the loop has exited
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(conn.is_closed());
        let err = conn
            .send_command(CommandPacket::new(conn.next_id(), 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, JdwpError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_late_reply_after_timeout_does_not_disturb_next_command() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;
            let slow = FakeVm::read_command(&mut stream).await;
            let next = FakeVm::read_command(&mut stream).await;
            FakeVm::write_reply(&mut stream, slow.id, 0, &[1]).await;
            FakeVm::write_reply(&mut stream, next.id, 0, &[2]).await;
        });

        let host = addr.ip().to_string();
        let conn = JdwpConnection::connect_with_config(&host, addr.port(), fast_config())
            .await
            .unwrap();
        let err = conn
            .send_command(CommandPacket::new(conn.next_id(), 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, JdwpError::Timeout(_)));

        let reply = conn
            .send_command(CommandPacket::new(conn.next_id(), 1, 7))
            .await
            .unwrap();
        assert_eq!(reply.data(), &[2]);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_connection_closes_socket() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;
            let mut buf = [0u8; 1];
            tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
                .await
                .expect("debugger kept the socket open")
                .unwrap()
        });

        let conn = JdwpConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        let copy = conn.clone();
        drop(conn);
        drop(copy);

        assert_eq!(peer.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dispose_then_drop() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;
            let cmd = FakeVm::read_command(&mut stream).await;
            assert_eq!((cmd.command_set, cmd.command), (1, 6));
            FakeVm::write_reply(&mut stream, cmd.id, 0, &[]).await;

            let mut buf = [0u8; 1];
            tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
                .await
                .expect("debugger kept the socket open")
                .unwrap()
        });

        let conn = JdwpConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        conn.dispose().await.unwrap();
        drop(conn);

        assert_eq!(peer.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bad_handshake_rejected() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;
        let peer = tokio::spawn(vm.accept_with_bad_handshake());

        let err = JdwpConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap_err();
        assert!(matches!(err, JdwpError::InvalidHandshake));
        peer.await.unwrap();
    }
}
