// Helper functions for writing JDWP data types into command payloads

use crate::types::{Location, Value, ValueData};
use bytes::BufMut;

/// Write a JDWP string (4-byte length prefix + UTF-8 bytes)
pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

pub fn write_location(buf: &mut Vec<u8>, location: &Location) {
    buf.put_u8(location.type_tag);
    buf.put_u64(location.class_id);
    buf.put_u64(location.method_id);
    buf.put_u64(location.index);
}

/// Write a value without its tag (used where the slot type is implied)
pub fn write_value(buf: &mut Vec<u8>, value: &Value) {
    match value.data {
        ValueData::Byte(v) => buf.put_i8(v),
        ValueData::Char(v) => buf.put_u16(v),
        ValueData::Float(v) => buf.put_f32(v),
        ValueData::Double(v) => buf.put_f64(v),
        ValueData::Int(v) => buf.put_i32(v),
        ValueData::Long(v) => buf.put_i64(v),
        ValueData::Short(v) => buf.put_i16(v),
        ValueData::Boolean(v) => buf.put_u8(v as u8),
        ValueData::Object(id) => buf.put_u64(id),
        ValueData::Void => {}
    }
}

pub fn write_tagged_value(buf: &mut Vec<u8>, value: &Value) {
    buf.put_u8(value.tag);
    write_value(buf, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_tagged_value;
    use crate::types::TypeTag;

    #[test]
    fn test_tagged_long_layout() {
        let mut buf = Vec::new();
        write_tagged_value(&mut buf, &Value::new(TypeTag::Long, ValueData::Long(-1)));
        assert_eq!(buf, vec![b'J', 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_reads_back_what_it_writes() {
        let values = [
            Value::new(TypeTag::Char, ValueData::Char('x' as u16)),
            Value::new(TypeTag::Double, ValueData::Double(2.5)),
            Value::object(TypeTag::Array, 0x99),
            Value::void(),
        ];

        let mut buf = Vec::new();
        for value in &values {
            write_tagged_value(&mut buf, value);
        }

        let mut data = &buf[..];
        for value in &values {
            assert_eq!(&read_tagged_value(&mut data).unwrap(), value);
        }
    }

    #[test]
    fn test_string_prefix() {
        let mut buf = Vec::new();
        write_string(&mut buf, "Lfoo;");
        assert_eq!(&buf[..4], &[0, 0, 0, 5]);
        assert_eq!(&buf[4..], b"Lfoo;");
    }
}
