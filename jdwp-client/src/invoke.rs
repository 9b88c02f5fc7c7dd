// Method invocation (ObjectReference.InvokeMethod, ClassType.InvokeMethod,
// ClassType.NewInstance) and the invoking-thread table
//
// An invocation resumes the target thread until the method returns. If the
// invoked code hits a breakpoint or step request on that same thread, the VM
// suspends it again and the invocation never completes. The event loop
// consults `InvokingThreads` and resumes such threads instead of publishing
// the event, so evaluation-scoped calls always run to completion.

use crate::commands::{class_type_commands, command_sets, object_reference_commands};
use crate::connection::JdwpConnection;
use crate::protocol::{CommandPacket, JdwpResult};
use crate::reader::{read_tagged_object_id, read_tagged_value};
use crate::types::{ClassId, MethodId, ObjectId, ThreadId, Value};
use crate::writer::write_tagged_value;
use bytes::BufMut;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

/// Threads with an evaluation-scoped invocation outstanding
#[derive(Debug, Clone, Default)]
pub struct InvokingThreads {
    threads: Arc<Mutex<HashMap<ThreadId, usize>>>,
}

impl InvokingThreads {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ThreadId, usize>> {
        match self.threads.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("invoking-thread table poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    /// Mark `thread` as invoking until the returned scope is dropped
    pub fn enter(&self, thread: ThreadId) -> InvocationScope {
        *self.lock().entry(thread).or_insert(0) += 1;
        debug!("Thread {:x} entered invocation scope", thread);
        InvocationScope {
            table: self.clone(),
            thread,
        }
    }

    pub fn contains(&self, thread: ThreadId) -> bool {
        self.lock().contains_key(&thread)
    }

    fn exit(&self, thread: ThreadId) {
        let mut threads = self.lock();
        if let Some(count) = threads.get_mut(&thread) {
            *count -= 1;
            if *count == 0 {
                threads.remove(&thread);
            }
        }
    }
}

/// RAII marker returned by [`InvokingThreads::enter`]
#[derive(Debug)]
pub struct InvocationScope {
    table: InvokingThreads,
    thread: ThreadId,
}

impl Drop for InvocationScope {
    fn drop(&mut self) {
        self.table.exit(self.thread);
        debug!("Thread {:x} left invocation scope", self.thread);
    }
}

/// Reply of an invoke command: the returned value (or new object) plus the
/// exception thrown by the invoked code, 0 when none
#[derive(Debug, Clone)]
pub struct InvokeReply {
    pub value: Value,
    pub exception: ObjectId,
}

impl InvokeReply {
    pub fn threw(&self) -> bool {
        self.exception != 0
    }
}

impl JdwpConnection {
    /// Invoke an instance method (ObjectReference.InvokeMethod command)
    pub async fn invoke_method(
        &self,
        object_id: ObjectId,
        thread_id: ThreadId,
        class_id: ClassId,
        method_id: MethodId,
        args: &[Value],
        options: i32,
    ) -> JdwpResult<InvokeReply> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::OBJECT_REFERENCE,
            object_reference_commands::INVOKE_METHOD,
        );

        packet.data.put_u64(object_id);
        packet.data.put_u64(thread_id);
        packet.data.put_u64(class_id);
        packet.data.put_u64(method_id);
        write_arguments(&mut packet.data, args, options);

        self.send_invoke(packet).await
    }

    /// Invoke a static method (ClassType.InvokeMethod command)
    pub async fn invoke_static_method(
        &self,
        class_id: ClassId,
        thread_id: ThreadId,
        method_id: MethodId,
        args: &[Value],
        options: i32,
    ) -> JdwpResult<InvokeReply> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::CLASS_TYPE,
            class_type_commands::INVOKE_METHOD,
        );

        packet.data.put_u64(class_id);
        packet.data.put_u64(thread_id);
        packet.data.put_u64(method_id);
        write_arguments(&mut packet.data, args, options);

        self.send_invoke(packet).await
    }

    /// Construct a new instance with the given constructor (ClassType.NewInstance command)
    ///
    /// The reply's `value` is the tagged new object, null if the constructor threw
    pub async fn new_instance(
        &self,
        class_id: ClassId,
        thread_id: ThreadId,
        constructor_id: MethodId,
        args: &[Value],
        options: i32,
    ) -> JdwpResult<InvokeReply> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::CLASS_TYPE,
            class_type_commands::NEW_INSTANCE,
        );

        packet.data.put_u64(class_id);
        packet.data.put_u64(thread_id);
        packet.data.put_u64(constructor_id);
        write_arguments(&mut packet.data, args, options);

        let reply = self
            .send_command_with_timeout(packet, self.config().invoke_timeout)
            .await?;
        reply.check_error()?;

        let mut data = reply.data();
        let (tag, object) = read_tagged_object_id(&mut data)?;
        let (_tag, exception) = read_tagged_object_id(&mut data)?;

        Ok(InvokeReply {
            value: Value {
                tag,
                data: crate::types::ValueData::Object(object),
            },
            exception,
        })
    }

    async fn send_invoke(&self, packet: CommandPacket) -> JdwpResult<InvokeReply> {
        let reply = self
            .send_command_with_timeout(packet, self.config().invoke_timeout)
            .await?;
        reply.check_error()?;

        let mut data = reply.data();
        let value = read_tagged_value(&mut data)?;
        let (_tag, exception) = read_tagged_object_id(&mut data)?;

        Ok(InvokeReply { value, exception })
    }
}

fn write_arguments(buf: &mut Vec<u8>, args: &[Value], options: i32) {
    buf.put_i32(args.len() as i32);
    for arg in args {
        write_tagged_value(buf, arg);
    }
    buf.put_i32(options);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{invoke_options, thread_commands};
    use crate::connection::JdwpConfig;
    use crate::events::SuspendPolicy;
    use crate::testing::FakeVm;
    use crate::types::{TypeTag, ValueData};
    use bytes::Buf;
    use std::time::Duration;

    #[test]
    fn test_scopes_nest_per_thread() {
        let table = InvokingThreads::new();
        let outer = table.enter(1);
        let inner = table.enter(1);
        assert!(table.contains(1));
        drop(inner);
        assert!(table.contains(1));
        drop(outer);
        assert!(!table.contains(1));
    }

    #[tokio::test]
    async fn test_invoke_reports_exception() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;
            let cmd = FakeVm::read_command(&mut stream).await;
            assert_eq!(cmd.command_set, command_sets::OBJECT_REFERENCE);
            assert_eq!(cmd.command, object_reference_commands::INVOKE_METHOD);

            let mut body = Vec::new();
            body.put_u8(b'V');
            body.put_u8(b'L');
            body.put_u64(0xe1);
            FakeVm::write_reply(&mut stream, cmd.id, 0, &body).await;
        });

        let conn = JdwpConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        let reply = conn
            .invoke_method(0x10, 0x1, 0x2, 0x3, &[], invoke_options::INVOKE_SINGLE_THREADED)
            .await
            .unwrap();

        assert!(reply.threw());
        assert_eq!(reply.exception, 0xe1);
        assert_eq!(reply.value.data, ValueData::Void);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_breakpoint_during_invoke_is_resumed_not_published() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;
        let thread: ThreadId = 0x77;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;
            let invoke = FakeVm::read_command(&mut stream).await;
            assert_eq!(invoke.command, object_reference_commands::INVOKE_METHOD);

            // Invoked code hits a breakpoint on the invoking thread
            FakeVm::write_breakpoint(&mut stream, SuspendPolicy::EventThread, thread).await;

            // The client must resume that thread before the invoke can finish
            let resume = FakeVm::read_command(&mut stream).await;
            assert_eq!(resume.command_set, command_sets::THREAD_REFERENCE);
            assert_eq!(resume.command, thread_commands::RESUME);
            let mut data = &resume.data[..];
            assert_eq!(data.get_u64(), thread);
            FakeVm::write_reply(&mut stream, resume.id, 0, &[]).await;

            let mut body = Vec::new();
            body.put_u8(b'I');
            body.put_i32(42);
            body.put_u8(b'L');
            body.put_u64(0);
            FakeVm::write_reply(&mut stream, invoke.id, 0, &body).await;
        });

        let conn = JdwpConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();

        let scope = conn.invoking_threads().enter(thread);
        let args = [Value::new(TypeTag::Int, ValueData::Int(1))];
        let reply = conn
            .invoke_method(0x10, thread, 0x2, 0x3, &args, 0)
            .await
            .unwrap();
        drop(scope);

        assert!(!reply.threw());
        assert_eq!(reply.value.data, ValueData::Int(42));
        assert!(conn.try_recv_event().await.is_none());
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_breakpoint_on_other_thread_is_published() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;
            FakeVm::write_breakpoint(&mut stream, SuspendPolicy::All, 0x99).await;
            // Keep the socket open until the client is done
            let _ = FakeVm::read_command(&mut stream).await;
        });

        let config = JdwpConfig {
            reply_timeout: Duration::from_millis(200),
            ..JdwpConfig::default()
        };
        let conn = JdwpConnection::connect_with_config(&addr.ip().to_string(), addr.port(), config)
            .await
            .unwrap();
        let _scope = conn.invoking_threads().enter(0x77);

        let event = tokio::time::timeout(Duration::from_secs(5), conn.recv_event())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.threads().collect::<Vec<_>>(), vec![0x99]);

        // Unblock the peer
        let _ = conn
            .send_command(CommandPacket::new(conn.next_id(), 1, 1))
            .await;
        peer.await.unwrap();
    }
}
