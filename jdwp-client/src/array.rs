// ArrayReference command implementations

use crate::commands::{array_reference_commands, command_sets};
use crate::connection::JdwpConnection;
use crate::protocol::{CommandPacket, JdwpError, JdwpResult};
use crate::reader::{read_i32, read_tagged_value, read_u8, read_value};
use crate::types::{ArrayId, TypeTag, Value};
use crate::writer::write_value;
use bytes::BufMut;

impl JdwpConnection {
    /// Get the length of an array (ArrayReference.Length command)
    pub async fn get_array_length(&self, array_id: ArrayId) -> JdwpResult<i32> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::ARRAY_REFERENCE, array_reference_commands::LENGTH);

        packet.data.put_u64(array_id);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        read_i32(&mut data)
    }

    /// Read a range of array components (ArrayReference.GetValues command)
    pub async fn get_array_values(
        &self,
        array_id: ArrayId,
        first_index: i32,
        length: i32,
    ) -> JdwpResult<Vec<Value>> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::ARRAY_REFERENCE,
            array_reference_commands::GET_VALUES,
        );

        packet.data.put_u64(array_id);
        packet.data.put_i32(first_index);
        packet.data.put_i32(length);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        read_array_region(&mut data)
    }

    /// Write a range of array components (ArrayReference.SetValues command)
    pub async fn set_array_values(
        &self,
        array_id: ArrayId,
        first_index: i32,
        values: &[Value],
    ) -> JdwpResult<()> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::ARRAY_REFERENCE,
            array_reference_commands::SET_VALUES,
        );

        packet.data.put_u64(array_id);
        packet.data.put_i32(first_index);
        packet.data.put_i32(values.len() as i32);
        for value in values {
            write_value(&mut packet.data, value);
        }

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        Ok(())
    }
}

/// Decode an arrayregion: primitive regions are untagged, object regions
/// carry a tag per component
fn read_array_region(buf: &mut &[u8]) -> JdwpResult<Vec<Value>> {
    let tag = read_u8(buf)?;
    let kind = TypeTag::from_u8(tag)
        .ok_or_else(|| JdwpError::Protocol(format!("Unknown array region tag: {}", tag)))?;
    let count = read_i32(buf)?;
    let mut values = Vec::with_capacity(count.max(0) as usize);

    for _ in 0..count {
        let value = if kind.is_object() {
            read_tagged_value(buf)?
        } else {
            read_value(tag, buf)?
        };
        values.push(value);
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueData;

    #[test]
    fn test_primitive_region_is_untagged() {
        let data = [b'I', 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2];
        let mut buf = &data[..];
        let values = read_array_region(&mut buf).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1].data, ValueData::Int(2));
        assert_eq!(values[1].tag, b'I');
    }

    #[test]
    fn test_object_region_is_tagged() {
        let data = [
            b'L', 0, 0, 0, 2, //
            b's', 0, 0, 0, 0, 0, 0, 0, 9, //
            b'L', 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let mut buf = &data[..];
        let values = read_array_region(&mut buf).unwrap();
        assert_eq!(values[0].tag, b's');
        assert_eq!(values[0].data, ValueData::Object(9));
        assert!(values[1].is_null());
    }
}
