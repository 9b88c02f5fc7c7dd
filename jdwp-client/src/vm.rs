// VirtualMachine command implementations
//
// These are the fundamental commands for interacting with the JVM

use crate::commands::{command_sets, vm_commands};
use crate::connection::JdwpConnection;
use crate::protocol::{CommandPacket, JdwpResult};
use crate::reader::{read_i32, read_string, read_u64, read_u8};
use crate::types::{ReferenceTypeId, StringId, ThreadId};
use crate::writer::write_string;
use serde::{Deserialize, Serialize};

/// JVM version information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmVersion {
    pub description: String,
    pub jdwp_major: i32,
    pub jdwp_minor: i32,
    pub vm_version: String,
    pub vm_name: String,
}

/// ID sizes used by the JVM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmIdSizes {
    pub field_id_size: i32,
    pub method_id_size: i32,
    pub object_id_size: i32,
    pub reference_type_id_size: i32,
    pub frame_id_size: i32,
}

impl VmIdSizes {
    /// This client encodes every id as 8 bytes
    pub fn all_eight_bytes(&self) -> bool {
        [
            self.field_id_size,
            self.method_id_size,
            self.object_id_size,
            self.reference_type_id_size,
            self.frame_id_size,
        ]
        .iter()
        .all(|size| *size == 8)
    }
}

/// Class information from ClassesBySignature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassInfo {
    pub ref_type_tag: u8, // 1=class, 2=interface, 3=array
    pub type_id: ReferenceTypeId,
    pub signature: String,
    pub status: i32,
}

impl JdwpConnection {
    /// Get JVM version information (VirtualMachine.Version command)
    pub async fn get_version(&self) -> JdwpResult<VmVersion> {
        let id = self.next_id();
        let packet = CommandPacket::new(id, command_sets::VIRTUAL_MACHINE, vm_commands::VERSION);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();

        let description = read_string(&mut data)?;
        let jdwp_major = read_i32(&mut data)?;
        let jdwp_minor = read_i32(&mut data)?;
        let vm_version = read_string(&mut data)?;
        let vm_name = read_string(&mut data)?;

        Ok(VmVersion {
            description,
            jdwp_major,
            jdwp_minor,
            vm_version,
            vm_name,
        })
    }

    /// Get ID sizes (VirtualMachine.IDSizes command)
    pub async fn get_id_sizes(&self) -> JdwpResult<VmIdSizes> {
        let id = self.next_id();
        let packet = CommandPacket::new(id, command_sets::VIRTUAL_MACHINE, vm_commands::ID_SIZES);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();

        Ok(VmIdSizes {
            field_id_size: read_i32(&mut data)?,
            method_id_size: read_i32(&mut data)?,
            object_id_size: read_i32(&mut data)?,
            reference_type_id_size: read_i32(&mut data)?,
            frame_id_size: read_i32(&mut data)?,
        })
    }

    /// Find classes by signature (VirtualMachine.ClassesBySignature command)
    /// Signature format: "Lcom/example/MyClass;" for classes
    pub async fn classes_by_signature(&self, signature: &str) -> JdwpResult<Vec<ClassInfo>> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::VIRTUAL_MACHINE,
            vm_commands::CLASSES_BY_SIGNATURE,
        );

        write_string(&mut packet.data, signature);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();

        let classes_count = read_i32(&mut data)?;
        let mut classes = Vec::with_capacity(classes_count.max(0) as usize);

        for _ in 0..classes_count {
            let ref_type_tag = read_u8(&mut data)?;
            let type_id = read_u64(&mut data)?;
            let status = read_i32(&mut data)?;

            classes.push(ClassInfo {
                ref_type_tag,
                type_id,
                signature: signature.to_string(),
                status,
            });
        }

        Ok(classes)
    }

    /// Get all threads (VirtualMachine.AllThreads)
    pub async fn get_all_threads(&self) -> JdwpResult<Vec<ThreadId>> {
        let id = self.next_id();
        let packet =
            CommandPacket::new(id, command_sets::VIRTUAL_MACHINE, vm_commands::ALL_THREADS);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();

        let threads_count = read_i32(&mut data)?;
        let mut threads = Vec::with_capacity(threads_count.max(0) as usize);

        for _ in 0..threads_count {
            threads.push(read_u64(&mut data)?);
        }

        Ok(threads)
    }

    /// Create a string in the target VM (VirtualMachine.CreateString)
    pub async fn create_string(&self, value: &str) -> JdwpResult<StringId> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::VIRTUAL_MACHINE, vm_commands::CREATE_STRING);

        write_string(&mut packet.data, value);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        read_u64(&mut data)
    }

    /// Suspend all threads (VirtualMachine.Suspend)
    pub async fn suspend_all(&self) -> JdwpResult<()> {
        let id = self.next_id();
        let packet = CommandPacket::new(id, command_sets::VIRTUAL_MACHINE, vm_commands::SUSPEND);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        Ok(())
    }

    /// Detach from the target (VirtualMachine.Dispose). Event requests are
    /// cleared and suspended threads resumed; the connection is unusable
    /// afterwards.
    pub async fn dispose(&self) -> JdwpResult<()> {
        let id = self.next_id();
        let packet = CommandPacket::new(id, command_sets::VIRTUAL_MACHINE, vm_commands::DISPOSE);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        Ok(())
    }

    /// Resume all threads (VirtualMachine.Resume)
    pub async fn resume_all(&self) -> JdwpResult<()> {
        let id = self.next_id();
        let packet = CommandPacket::new(id, command_sets::VIRTUAL_MACHINE, vm_commands::RESUME);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVm;
    use bytes::BufMut;

    #[test]
    fn test_id_size_check() {
        let mut sizes = VmIdSizes {
            field_id_size: 8,
            method_id_size: 8,
            object_id_size: 8,
            reference_type_id_size: 8,
            frame_id_size: 8,
        };
        assert!(sizes.all_eight_bytes());
        sizes.frame_id_size = 4;
        assert!(!sizes.all_eight_bytes());
    }

    #[tokio::test]
    async fn test_create_string_sends_jdwp_string() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;
            let cmd = FakeVm::read_command(&mut stream).await;
            assert_eq!(cmd.command, vm_commands::CREATE_STRING);
            assert_eq!(cmd.data, vec![0, 0, 0, 2, b'h', b'i']);
            let mut body = Vec::new();
            body.put_u64(0x5a);
            FakeVm::write_reply(&mut stream, cmd.id, 0, &body).await;
        });

        let conn = JdwpConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        assert_eq!(conn.create_string("hi").await.unwrap(), 0x5a);
        peer.await.unwrap();
    }
}
