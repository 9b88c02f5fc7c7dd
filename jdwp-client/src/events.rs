// JDWP event handling
//
// Events are sent from the JVM to notify about breakpoints, steps, etc.

use crate::commands::event_kinds;
use crate::protocol::{JdwpError, JdwpResult};
use crate::reader::{read_i32, read_location, read_string, read_tagged_object_id, read_u64, read_u8};
use crate::types::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Suspend policy for events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SuspendPolicy {
    None = 0,
    EventThread = 1,
    All = 2,
}

impl SuspendPolicy {
    pub fn from_u8(policy: u8) -> JdwpResult<Self> {
        match policy {
            0 => Ok(SuspendPolicy::None),
            1 => Ok(SuspendPolicy::EventThread),
            2 => Ok(SuspendPolicy::All),
            other => Err(JdwpError::Protocol(format!("Invalid suspend policy: {}", other))),
        }
    }
}

/// Composite event packet (can contain multiple events)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSet {
    pub suspend_policy: SuspendPolicy,
    pub events: Vec<Event>,
}

impl EventSet {
    /// Threads mentioned by the events of this set
    pub fn threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.events.iter().filter_map(|e| e.details.thread())
    }
}

/// Single event within an event set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: u8,
    pub request_id: i32,
    pub details: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    VMStart {
        thread: ThreadId,
    },
    VMDeath,
    ThreadStart {
        thread: ThreadId,
    },
    ThreadDeath {
        thread: ThreadId,
    },
    ClassPrepare {
        thread: ThreadId,
        ref_type: ReferenceTypeId,
        signature: String,
        status: i32,
    },
    Breakpoint {
        thread: ThreadId,
        location: Location,
    },
    Step {
        thread: ThreadId,
        location: Location,
    },
    Exception {
        thread: ThreadId,
        location: Location,
        exception: ObjectId,
        catch_location: Option<Location>,
    },
    MethodEntry {
        thread: ThreadId,
        location: Location,
    },
    MethodExit {
        thread: ThreadId,
        location: Location,
    },
    Unknown {
        kind: u8,
    },
}

impl EventKind {
    /// The thread that triggered the event, if the event carries one
    pub fn thread(&self) -> Option<ThreadId> {
        match self {
            EventKind::VMStart { thread }
            | EventKind::ThreadStart { thread }
            | EventKind::ThreadDeath { thread }
            | EventKind::ClassPrepare { thread, .. }
            | EventKind::Breakpoint { thread, .. }
            | EventKind::Step { thread, .. }
            | EventKind::Exception { thread, .. }
            | EventKind::MethodEntry { thread, .. }
            | EventKind::MethodExit { thread, .. } => Some(*thread),
            EventKind::VMDeath | EventKind::Unknown { .. } => None,
        }
    }
}

/// Parse an event packet from JDWP
pub fn parse_event_packet(data: &[u8]) -> JdwpResult<EventSet> {
    let mut buf = data;

    let suspend_policy = SuspendPolicy::from_u8(read_u8(&mut buf)?)?;

    // Read number of events
    let event_count = read_i32(&mut buf)?;

    let mut events = Vec::with_capacity(event_count.max(0) as usize);

    for _ in 0..event_count {
        let kind = read_u8(&mut buf)?;
        let request_id = read_i32(&mut buf)?;

        let details = match kind {
            event_kinds::BREAKPOINT => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                EventKind::Breakpoint { thread, location }
            }
            event_kinds::SINGLE_STEP => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                EventKind::Step { thread, location }
            }
            event_kinds::EXCEPTION => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                let (_tag, exception) = read_tagged_object_id(&mut buf)?;
                let catch = read_location(&mut buf)?;
                // An all-zero catch location means the exception is uncaught
                let catch_location = if catch.class_id == 0 && catch.method_id == 0 {
                    None
                } else {
                    Some(catch)
                };
                EventKind::Exception {
                    thread,
                    location,
                    exception,
                    catch_location,
                }
            }
            event_kinds::METHOD_ENTRY => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                EventKind::MethodEntry { thread, location }
            }
            event_kinds::METHOD_EXIT => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                EventKind::MethodExit { thread, location }
            }
            event_kinds::CLASS_PREPARE => {
                let thread = read_u64(&mut buf)?;
                let _ref_type_tag = read_u8(&mut buf)?;
                let ref_type = read_u64(&mut buf)?;
                let signature = read_string(&mut buf)?;
                let status = read_i32(&mut buf)?;
                EventKind::ClassPrepare {
                    thread,
                    ref_type,
                    signature,
                    status,
                }
            }
            event_kinds::VM_START => {
                let thread = read_u64(&mut buf)?;
                EventKind::VMStart { thread }
            }
            event_kinds::VM_DEATH => EventKind::VMDeath,
            event_kinds::THREAD_START => {
                let thread = read_u64(&mut buf)?;
                EventKind::ThreadStart { thread }
            }
            event_kinds::THREAD_DEATH => {
                let thread = read_u64(&mut buf)?;
                EventKind::ThreadDeath { thread }
            }
            _ => {
                // The payload size of an unknown kind is unknown, so the rest
                // of the packet cannot be decoded
                warn!("Unsupported event kind: {}", kind);
                events.push(Event {
                    kind,
                    request_id,
                    details: EventKind::Unknown { kind },
                });
                break;
            }
        };

        events.push(Event {
            kind,
            request_id,
            details,
        });
    }

    Ok(EventSet {
        suspend_policy,
        events,
    })
}
