// ReferenceType command implementations
//
// Commands for working with classes, interfaces, and arrays

use crate::commands::{command_sets, reference_type_commands};
use crate::connection::JdwpConnection;
use crate::protocol::{CommandPacket, JdwpResult};
use crate::reader::{read_i32, read_string, read_tagged_value, read_u64};
use crate::types::{FieldId, MethodId, ReferenceTypeId, Value};
use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// Modifier bit for static members
pub const ACC_STATIC: i32 = 0x0008;

/// Method information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodInfo {
    pub method_id: MethodId,
    pub name: String,
    pub signature: String,
    pub mod_bits: i32,
}

impl MethodInfo {
    pub fn is_static(&self) -> bool {
        self.mod_bits & ACC_STATIC != 0
    }

    /// Number of declared parameters, counted from the JNI signature
    pub fn arity(&self) -> usize {
        parameter_count(&self.signature)
    }
}

/// Field information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    pub field_id: FieldId,
    pub name: String,
    pub signature: String,
    pub mod_bits: i32,
}

impl FieldInfo {
    pub fn is_static(&self) -> bool {
        self.mod_bits & ACC_STATIC != 0
    }
}

/// Split the parameter list of a method signature such as
/// `(I[JLjava/lang/String;)V` into one type signature per parameter
pub fn parameter_signatures(signature: &str) -> Vec<&str> {
    let params = signature
        .strip_prefix('(')
        .and_then(|rest| rest.split(')').next())
        .unwrap_or("");

    let bytes = params.as_bytes();
    let mut result = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'[' => {
                pos += 1;
                continue;
            }
            b'L' => match params[pos..].find(';') {
                Some(end) => pos += end + 1,
                None => pos = bytes.len(),
            },
            _ => pos += 1,
        }
        result.push(&params[start..pos]);
        start = pos;
    }
    result
}

/// Number of parameters declared by a method signature
pub fn parameter_count(signature: &str) -> usize {
    parameter_signatures(signature).len()
}

impl JdwpConnection {
    /// Get the JNI signature of a reference type (ReferenceType.Signature command)
    pub async fn get_signature(&self, ref_type_id: ReferenceTypeId) -> JdwpResult<String> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::REFERENCE_TYPE,
            reference_type_commands::SIGNATURE,
        );

        packet.data.put_u64(ref_type_id);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        read_string(&mut data)
    }

    /// Get methods declared by a reference type (ReferenceType.Methods command)
    ///
    /// Inherited methods are not included
    pub async fn get_methods(&self, ref_type_id: ReferenceTypeId) -> JdwpResult<Vec<MethodInfo>> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::REFERENCE_TYPE, reference_type_commands::METHODS);

        packet.data.put_u64(ref_type_id);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();

        let methods_count = read_i32(&mut data)?;
        let mut methods = Vec::with_capacity(methods_count.max(0) as usize);

        for _ in 0..methods_count {
            let method_id = read_u64(&mut data)?;
            let name = read_string(&mut data)?;
            let signature = read_string(&mut data)?;
            let mod_bits = read_i32(&mut data)?;

            methods.push(MethodInfo {
                method_id,
                name,
                signature,
                mod_bits,
            });
        }

        Ok(methods)
    }

    /// Get fields declared by a reference type (ReferenceType.Fields command)
    pub async fn get_fields(&self, ref_type_id: ReferenceTypeId) -> JdwpResult<Vec<FieldInfo>> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::REFERENCE_TYPE, reference_type_commands::FIELDS);

        packet.data.put_u64(ref_type_id);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();

        let fields_count = read_i32(&mut data)?;
        let mut fields = Vec::with_capacity(fields_count.max(0) as usize);

        for _ in 0..fields_count {
            let field_id = read_u64(&mut data)?;
            let name = read_string(&mut data)?;
            let signature = read_string(&mut data)?;
            let mod_bits = read_i32(&mut data)?;

            fields.push(FieldInfo {
                field_id,
                name,
                signature,
                mod_bits,
            });
        }

        Ok(fields)
    }

    /// Get directly implemented interfaces (ReferenceType.Interfaces command)
    pub async fn get_interfaces(
        &self,
        ref_type_id: ReferenceTypeId,
    ) -> JdwpResult<Vec<ReferenceTypeId>> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::REFERENCE_TYPE,
            reference_type_commands::INTERFACES,
        );

        packet.data.put_u64(ref_type_id);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();

        let count = read_i32(&mut data)?;
        let mut interfaces = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            interfaces.push(read_u64(&mut data)?);
        }

        Ok(interfaces)
    }

    /// Read static field values (ReferenceType.GetValues command)
    pub async fn get_static_values(
        &self,
        ref_type_id: ReferenceTypeId,
        field_ids: &[FieldId],
    ) -> JdwpResult<Vec<Value>> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::REFERENCE_TYPE,
            reference_type_commands::GET_VALUES,
        );

        packet.data.put_u64(ref_type_id);
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVm;
    use crate::types::ValueData;

    #[test]
    fn test_parameter_signatures() {
        assert_eq!(
            parameter_signatures("(ILjava/lang/String;[[J)V"),
            vec!["I", "Ljava/lang/String;", "[[J"]
        );
        assert!(parameter_signatures("()V").is_empty());
    }

    #[test]
    fn test_parameter_count() {
        assert_eq!(parameter_count("()V"), 0);
        assert_eq!(parameter_count("(I)I"), 1);
        assert_eq!(parameter_count("(ILjava/lang/String;[[J)V"), 3);
        assert_eq!(parameter_count("([Ljava/lang/Object;Z)Ljava/lang/Object;"), 2);
    }

    #[tokio::test]
    async fn test_fields_and_static_values() {
        let vm = FakeVm::start().await;
        let addr = vm.addr;

        let peer = tokio::spawn(async move {
            let mut stream = vm.accept().await;

            let cmd = FakeVm::read_command(&mut stream).await;
            assert_eq!(cmd.command, reference_type_commands::FIELDS);
            let mut body = Vec::new();
            body.put_i32(1);
            body.put_u64(0xa1);
            crate::writer::write_string(&mut body, "COUNT");
            crate::writer::write_string(&mut body, "I");
            body.put_i32(ACC_STATIC | 0x0001);
            FakeVm::write_reply(&mut stream, cmd.id, 0, &body).await;

            let cmd = FakeVm::read_command(&mut stream).await;
            assert_eq!(cmd.command, reference_type_commands::GET_VALUES);
            let mut body = Vec::new();
            body.put_i32(1);
            body.put_u8(b'I');
            body.put_i32(9);
            FakeVm::write_reply(&mut stream, cmd.id, 0, &body).await;
        });

        let conn = JdwpConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();

        let fields = conn.get_fields(0xc1).await.unwrap();
        assert_eq!(fields[0].name, "COUNT");
        assert!(fields[0].is_static());

        let values = conn.get_static_values(0xc1, &[fields[0].field_id]).await.unwrap();
        assert_eq!(values[0].data, ValueData::Int(9));
        peer.await.unwrap();
    }
}
