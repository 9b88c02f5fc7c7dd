// JDWP Event Loop
//
// Handles concurrent reading of events and replies from JDWP socket

use crate::commands::{command_sets, thread_commands, vm_commands};
use crate::events::{parse_event_packet, EventSet, SuspendPolicy};
use crate::invoke::InvokingThreads;
use crate::protocol::{
    CommandPacket, JdwpError, JdwpResult, ReplyPacket, COMPOSITE_EVENT_COMMAND, EVENT_COMMAND_SET,
    HEADER_SIZE, REPLY_FLAG,
};
use bytes::{BufMut, BytesMut};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Maximum allowed JDWP packet size (10MB)
/// This prevents memory exhaustion from malicious or buggy JVMs
const MAX_PACKET_SIZE: usize = 10 * 1024 * 1024;

/// Request to send a command and get reply
pub struct CommandRequest {
    pub packet: CommandPacket,
    pub reply_tx: oneshot::Sender<JdwpResult<ReplyPacket>>,
}

/// Handle to the event loop for sending commands and receiving events
#[derive(Clone, Debug)]
pub struct EventLoopHandle {
    command_tx: mpsc::Sender<CommandRequest>,
    event_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<EventSet>>>,
}

impl EventLoopHandle {
    /// Send a command and wait at most `timeout` for its reply
    pub async fn send_command(
        &self,
        packet: CommandPacket,
        timeout: Duration,
    ) -> JdwpResult<ReplyPacket> {
        let (reply_tx, reply_rx) = oneshot::channel();

        let request = CommandRequest { packet, reply_tx };

        self.command_tx
            .send(request)
            .await
            .map_err(|_| JdwpError::ConnectionClosed)?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            // The loop dropped the pending reply: the socket is gone
            Ok(Err(_)) => Err(JdwpError::ConnectionClosed),
            Err(_) => Err(JdwpError::Timeout(timeout)),
        }
    }

    /// Whether the event loop has shut down
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Try to receive an event (non-blocking)
    pub async fn try_recv_event(&self) -> Option<EventSet> {
        let mut rx = self.event_rx.lock().await;
        rx.try_recv().ok()
    }

    /// Wait for the next event (blocking)
    pub async fn recv_event(&self) -> Option<EventSet> {
        let mut rx = self.event_rx.lock().await;
        rx.recv().await
    }
}

/// State the loop shares with the connection
pub struct LoopShared {
    pub next_id: Arc<AtomicU32>,
    pub invoking: InvokingThreads,
    pub event_buffer: usize,
}

/// Start the event loop task
pub fn spawn_event_loop(
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    shared: LoopShared,
) -> EventLoopHandle {
    let (command_tx, command_rx) = mpsc::channel(32);
    // Events are critical (breakpoints, exceptions) and shouldn't be dropped
    let (event_tx, event_rx) = mpsc::channel(shared.event_buffer);

    tokio::spawn(event_loop_task(reader, writer, command_rx, event_tx, shared));

    EventLoopHandle {
        command_tx,
        event_rx: Arc::new(tokio::sync::Mutex::new(event_rx)),
    }
}

/// Main event loop task
async fn event_loop_task(
    reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut command_rx: mpsc::Receiver<CommandRequest>,
    event_tx: mpsc::Sender<EventSet>,
    shared: LoopShared,
) {
    info!("Event loop started");

    // Socket reads live in their own task: read_exact is not cancel-safe
    let (packet_tx, mut packet_rx) = mpsc::channel(64);
    let reader_handle = tokio::spawn(reader_task(reader, packet_tx));

    let mut pending_replies: HashMap<u32, oneshot::Sender<JdwpResult<ReplyPacket>>> =
        HashMap::new();
    // Replies to resumes the loop issued on its own
    let mut internal_replies: HashSet<u32> = HashSet::new();

    loop {
        tokio::select! {
            // Handle outgoing commands
            cmd = command_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("Every connection handle dropped");
                    break;
                };
                let packet_id = cmd.packet.id;
                debug!("Sending command id={}", packet_id);

                if let Err(e) = write_packet(&mut writer, &cmd.packet).await {
                    error!("Failed to write command: {}", e);
                    cmd.reply_tx.send(Err(e)).ok();
                    continue;
                }

                // Callers that timed out have dropped their receivers
                pending_replies.retain(|_, tx| !tx.is_closed());
                pending_replies.insert(packet_id, cmd.reply_tx);
            }

            // Handle incoming packets
            incoming = packet_rx.recv() => {
                match incoming {
                    Some((is_reply, packet_id, data)) => {
                        if is_reply {
                            debug!("Received reply id={}", packet_id);

                            if let Some(tx) = pending_replies.remove(&packet_id) {
                                match ReplyPacket::decode(&data) {
                                    Ok(reply) => {
                                        tx.send(Ok(reply)).ok();
                                    }
                                    Err(e) => {
                                        warn!("Failed to decode reply: {}", e);
                                        tx.send(Err(e)).ok();
                                    }
                                }
                            } else if internal_replies.remove(&packet_id) {
                                if let Ok(reply) = ReplyPacket::decode(&data) {
                                    if let Err(e) = reply.check_error() {
                                        warn!("Resume of invoking thread failed: {}", e);
                                    }
                                }
                            } else {
                                warn!("Received reply for unknown command id={}", packet_id);
                            }
                        } else {
                            debug!("Received event packet, len={}", data.len());

                            if data[9] != EVENT_COMMAND_SET || data[10] != COMPOSITE_EVENT_COMMAND {
                                warn!("Ignoring VM command {}/{}", data[9], data[10]);
                                continue;
                            }

                            // Data starts after 11-byte header
                            let event_data = &data[HEADER_SIZE..];

                            match parse_event_packet(event_data) {
                                Ok(event_set) => {
                                    info!("Parsed event set: {} events, suspend_policy={:?}",
                                          event_set.events.len(), event_set.suspend_policy);

                                    if suspended_during_invoke(&event_set, &shared.invoking) {
                                        let resumed =
                                            resume_invoking(&mut writer, &event_set, &shared).await;
                                        match resumed {
                                            Ok(ids) => internal_replies.extend(ids),
                                            Err(e) => {
                                                error!("Failed to resume invoking thread: {}", e)
                                            }
                                        }
                                        continue;
                                    }

                                    match event_tx.try_send(event_set) {
                                        Ok(_) => {}
                                        Err(mpsc::error::TrySendError::Full(event)) => {
                                            error!(
                                                "Event channel full, dropping set of {} events",
                                                event.events.len()
                                            );
                                        }
                                        Err(mpsc::error::TrySendError::Closed(_)) => {
                                            warn!("Event receiver dropped, discarding events");
                                        }
                                    }
                                }
                                Err(e) => {
                                    warn!("Failed to parse event: {}", e);
                                }
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    // Dropping the senders wakes every waiter with ConnectionClosed
    if !pending_replies.is_empty() {
        warn!("Abandoning {} pending replies", pending_replies.len());
    }
    reader_handle.abort();
    if let Err(e) = writer.shutdown().await {
        debug!("Socket shutdown failed: {}", e);
    }
    info!("Event loop shutting down");
}

/// True when every event of the set was raised by a thread that is in the
/// middle of an evaluation-scoped invocation
fn suspended_during_invoke(event_set: &EventSet, invoking: &InvokingThreads) -> bool {
    !event_set.events.is_empty()
        && event_set
            .events
            .iter()
            .all(|e| e.details.thread().is_some_and(|t| invoking.contains(t)))
}

/// Undo the suspension an event set caused, per its suspend policy.
/// Returns the ids of the commands sent.
async fn resume_invoking(
    writer: &mut OwnedWriteHalf,
    event_set: &EventSet,
    shared: &LoopShared,
) -> JdwpResult<Vec<u32>> {
    let mut packets = Vec::new();

    match event_set.suspend_policy {
        SuspendPolicy::None => {}
        SuspendPolicy::EventThread => {
            let mut threads: Vec<_> = event_set.threads().collect();
            threads.dedup();
            for thread in threads {
                let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
                let mut packet =
                    CommandPacket::new(id, command_sets::THREAD_REFERENCE, thread_commands::RESUME);
                packet.data.put_u64(thread);
                packets.push(packet);
            }
        }
        SuspendPolicy::All => {
            let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
            packets.push(CommandPacket::new(
                id,
                command_sets::VIRTUAL_MACHINE,
                vm_commands::RESUME,
            ));
        }
    }

    let mut ids = Vec::with_capacity(packets.len());
    for packet in packets {
        info!("Resuming thread suspended during evaluation (command id={})", packet.id);
        write_packet(writer, &packet).await?;
        ids.push(packet.id);
    }

    Ok(ids)
}

/// Forward inbound packets to the event loop until the socket fails
async fn reader_task(
    mut reader: OwnedReadHalf,
    packet_tx: mpsc::Sender<(bool, u32, Vec<u8>)>,
) {
    loop {
        match read_packet(&mut reader).await {
            Ok(packet) => {
                if packet_tx.send(packet).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to read packet: {}", e);
                break;
            }
        }
    }
}

async fn write_packet(writer: &mut OwnedWriteHalf, packet: &CommandPacket) -> JdwpResult<()> {
    let encoded = packet.encode();
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a packet from the socket and determine if it's a reply or event
async fn read_packet(reader: &mut OwnedReadHalf) -> JdwpResult<(bool, u32, Vec<u8>)> {
    // Read header
    let mut header = BytesMut::with_capacity(HEADER_SIZE);
    header.resize(HEADER_SIZE, 0);

    reader
        .read_exact(&mut header)
        .await
        .map_err(JdwpError::Io)?;

    // Parse header
    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let packet_id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let flags = header[8];

    if length < HEADER_SIZE {
        return Err(JdwpError::Protocol(format!(
            "Invalid packet length: {}",
            length
        )));
    }

    if length > MAX_PACKET_SIZE {
        return Err(JdwpError::Protocol(format!(
            "Packet too large: {} bytes (max: {} bytes)",
            length, MAX_PACKET_SIZE
        )));
    }

    // Read rest of packet
    let data_len = length - HEADER_SIZE;
    let mut full_packet = header.to_vec();

    if data_len > 0 {
        let mut data = vec![0u8; data_len];
        reader.read_exact(&mut data).await.map_err(JdwpError::Io)?;
        full_packet.extend_from_slice(&data);
    }

    let is_reply = flags == REPLY_FLAG;

    Ok((is_reply, packet_id, full_packet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use crate::types::Location;

    fn breakpoint(thread: u64) -> Event {
        Event {
            kind: 2,
            request_id: 1,
            details: EventKind::Breakpoint {
                thread,
                location: Location {
                    type_tag: 1,
                    class_id: 1,
                    method_id: 1,
                    index: 0,
                },
            },
        }
    }

    #[test]
    fn test_swallow_only_when_every_event_is_invoking() {
        let invoking = InvokingThreads::new();
        let _scope = invoking.enter(7);

        let mixed = EventSet {
            suspend_policy: SuspendPolicy::All,
            events: vec![breakpoint(7), breakpoint(8)],
        };
        assert!(!suspended_during_invoke(&mixed, &invoking));

        let own = EventSet {
            suspend_policy: SuspendPolicy::EventThread,
            events: vec![breakpoint(7)],
        };
        assert!(suspended_during_invoke(&own, &invoking));

        let death = EventSet {
            suspend_policy: SuspendPolicy::None,
            events: vec![Event {
                kind: 99,
                request_id: 0,
                details: EventKind::VMDeath,
            }],
        };
        assert!(!suspended_during_invoke(&death, &invoking));
    }
}
