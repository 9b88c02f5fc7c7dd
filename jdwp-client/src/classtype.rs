// ClassType and ArrayType command implementations
//
// Invocation and construction live in invoke.rs

use crate::commands::{array_type_commands, class_type_commands, command_sets};
use crate::connection::JdwpConnection;
use crate::protocol::{CommandPacket, JdwpResult};
use crate::reader::{read_tagged_object_id, read_u64};
use crate::types::{ArrayId, ArrayTypeId, ClassId, FieldId, Value};
use crate::writer::write_value;
use bytes::BufMut;

impl JdwpConnection {
    /// Get the superclass of a class, `None` for java.lang.Object (ClassType.Superclass)
    pub async fn get_superclass(&self, class_id: ClassId) -> JdwpResult<Option<ClassId>> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::CLASS_TYPE, class_type_commands::SUPERCLASS);

        packet.data.put_u64(class_id);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        let superclass = read_u64(&mut data)?;

        Ok((superclass != 0).then_some(superclass))
    }

    /// Assign static fields (ClassType.SetValues command)
    ///
    /// Values are written untagged; the VM uses the field's declared type
    pub async fn set_static_values(
        &self,
        class_id: ClassId,
        values: &[(FieldId, Value)],
    ) -> JdwpResult<()> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::CLASS_TYPE, class_type_commands::SET_VALUES);

        packet.data.put_u64(class_id);
        packet.data.put_i32(values.len() as i32);
        for (field_id, value) in values {
            packet.data.put_u64(*field_id);
            write_value(&mut packet.data, value);
        }

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        Ok(())
    }

    /// Allocate a zero-filled array (ArrayType.NewInstance command)
    pub async fn new_array(&self, array_type_id: ArrayTypeId, length: i32) -> JdwpResult<ArrayId> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::ARRAY_TYPE, array_type_commands::NEW_INSTANCE);

        packet.data.put_u64(array_type_id);
        packet.data.put_i32(length);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        let (_tag, array) = read_tagged_object_id(&mut data)?;

        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVm;

    #[tokio::test]
    async fn test_object_has_no_superclass() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;
            for parent in [0xb0u64, 0] {
                let cmd = FakeVm::read_command(&mut stream).await;
                assert_eq!(cmd.command, class_type_commands::SUPERCLASS);
                FakeVm::write_reply(&mut stream, cmd.id, 0, &parent.to_be_bytes()).await;
            }
        });

        let conn = JdwpConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        assert_eq!(conn.get_superclass(0xc1).await.unwrap(), Some(0xb0));
        assert_eq!(conn.get_superclass(0xb0).await.unwrap(), None);
        peer.await.unwrap();
    }
}
