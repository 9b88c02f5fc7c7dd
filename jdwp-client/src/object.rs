// ObjectReference command implementations
//
// Commands for working with object instances

use crate::commands::{command_sets, object_reference_commands};
use crate::connection::JdwpConnection;
use crate::protocol::{CommandPacket, JdwpResult};
use crate::reader::{read_i32, read_tagged_value, read_u64, read_u8};
use crate::types::{FieldId, ObjectId, ReferenceTypeId, Value};
use crate::writer::write_value;
use bytes::BufMut;

impl JdwpConnection {
    /// Get the runtime type of an object (ObjectReference.ReferenceType command)
    ///
    /// Returns the type tag (1=class, 2=interface, 3=array) and the type id
    pub async fn get_object_reference_type(
        &self,
        object_id: ObjectId,
    ) -> JdwpResult<(u8, ReferenceTypeId)> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::OBJECT_REFERENCE,
            object_reference_commands::REFERENCE_TYPE,
        );

        packet.data.put_u64(object_id);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();

        let type_tag = read_u8(&mut data)?;
        let reference_type_id = read_u64(&mut data)?;

        Ok((type_tag, reference_type_id))
    }

    /// Get field values from an object (ObjectReference.GetValues command)
    pub async fn get_object_values(
        &self,
        object_id: ObjectId,
        field_ids: &[FieldId],
    ) -> JdwpResult<Vec<Value>> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::OBJECT_REFERENCE,
            object_reference_commands::GET_VALUES,
        );

        packet.data.put_u64(object_id);
        packet.data.put_i32(field_ids.len() as i32);
        for field_id in field_ids {
            packet.data.put_u64(*field_id);
        }

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();

        let values_count = read_i32(&mut data)?;
        let mut values = Vec::with_capacity(values_count.max(0) as usize);

        for _ in 0..values_count {
            values.push(read_tagged_value(&mut data)?);
        }

        Ok(values)
    }

    /// Assign instance fields (ObjectReference.SetValues command)
    pub async fn set_object_values(
        &self,
        object_id: ObjectId,
        values: &[(FieldId, Value)],
    ) -> JdwpResult<()> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::OBJECT_REFERENCE,
            object_reference_commands::SET_VALUES,
        );

        packet.data.put_u64(object_id);
        packet.data.put_i32(values.len() as i32);
        for (field_id, value) in values {
            packet.data.put_u64(*field_id);
            write_value(&mut packet.data, value);
        }

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        Ok(())
    }
}
