// StackFrame command implementations
//
// Commands for reading and writing the locals of a suspended frame

use crate::commands::{command_sets, stack_frame_commands};
use crate::connection::JdwpConnection;
use crate::protocol::{CommandPacket, JdwpError, JdwpResult};
use crate::reader::{read_i32, read_tagged_object_id, read_tagged_value};
use crate::types::{FrameId, ObjectId, ThreadId, Value};
use crate::writer::write_tagged_value;
use bytes::BufMut;

/// Variable slot information for GetValues
#[derive(Debug, Clone)]
pub struct VariableSlot {
    pub slot: i32,
    /// First byte of the variable's signature
    pub sig_byte: u8,
}

impl VariableSlot {
    pub fn new(slot: u32, signature: &str) -> JdwpResult<Self> {
        let slot = i32::try_from(slot)
            .map_err(|_| JdwpError::Protocol(format!("slot {} does not fit a JDWP int", slot)))?;
        Ok(Self {
            slot,
            sig_byte: signature.as_bytes().first().copied().unwrap_or(b'L'),
        })
    }
}

impl JdwpConnection {
    /// Get values for variable slots in a frame (StackFrame.GetValues command)
    pub async fn get_frame_values(
        &self,
        thread_id: ThreadId,
        frame_id: FrameId,
        slots: &[VariableSlot],
    ) -> JdwpResult<Vec<Value>> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::STACK_FRAME, stack_frame_commands::GET_VALUES);

        packet.data.put_u64(thread_id);
        packet.data.put_u64(frame_id);
        packet.data.put_i32(slots.len() as i32);

        for slot in slots {
            packet.data.put_i32(slot.slot);
            packet.data.put_u8(slot.sig_byte);
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

    /// Assign locals in a frame (StackFrame.SetValues command)
    pub async fn set_frame_values(
        &self,
        thread_id: ThreadId,
        frame_id: FrameId,
        values: &[(i32, Value)],
    ) -> JdwpResult<()> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::STACK_FRAME, stack_frame_commands::SET_VALUES);

        packet.data.put_u64(thread_id);
        packet.data.put_u64(frame_id);
        packet.data.put_i32(values.len() as i32);

        for (slot, value) in values {
            packet.data.put_i32(*slot);
            write_tagged_value(&mut packet.data, value);
        }

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        Ok(())
    }

    /// The frame's `this` as (tag, id); id 0 for static and native methods
    /// (StackFrame.ThisObject)
    pub async fn get_this_object(
        &self,
        thread_id: ThreadId,
        frame_id: FrameId,
    ) -> JdwpResult<(u8, ObjectId)> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::STACK_FRAME, stack_frame_commands::THIS_OBJECT);

        packet.data.put_u64(thread_id);
        packet.data.put_u64(frame_id);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        read_tagged_object_id(&mut data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_signature_byte() {
        assert_eq!(VariableSlot::new(2, "J").unwrap().sig_byte, b'J');
        assert_eq!(VariableSlot::new(0, "[I").unwrap().sig_byte, b'[');
        assert_eq!(VariableSlot::new(1, "").unwrap().sig_byte, b'L');
        assert!(matches!(VariableSlot::new(u32::MAX, "I"), Err(JdwpError::Protocol(_))));
    }
}
