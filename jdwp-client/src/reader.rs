// Helper functions for reading JDWP data types from buffers

use crate::protocol::{JdwpError, JdwpResult};
use crate::types::{Location, ObjectId, TypeTag, Value, ValueData};
use bytes::Buf;

fn require(buf: &&[u8], n: usize, what: &str) -> JdwpResult<()> {
    if buf.remaining() < n {
        return Err(JdwpError::Protocol(format!("Not enough data for {}", what)));
    }
    Ok(())
}

/// Read a JDWP string (4-byte length prefix + UTF-8 bytes)
pub fn read_string(buf: &mut &[u8]) -> JdwpResult<String> {
    require(buf, 4, "string length")?;

    let len = buf.get_u32() as usize;

    if buf.remaining() < len {
        return Err(JdwpError::Protocol(format!(
            "Not enough data for string: expected {}, got {}",
            len,
            buf.remaining()
        )));
    }

    let bytes = &buf[..len];
    buf.advance(len);

    String::from_utf8(bytes.to_vec())
        .map_err(|e| JdwpError::Protocol(format!("Invalid UTF-8 in string: {}", e)))
}

/// Read a u32
pub fn read_u32(buf: &mut &[u8]) -> JdwpResult<u32> {
    require(buf, 4, "u32")?;
    Ok(buf.get_u32())
}

/// Read a i32
pub fn read_i32(buf: &mut &[u8]) -> JdwpResult<i32> {
    require(buf, 4, "i32")?;
    Ok(buf.get_i32())
}

/// Read a u8
pub fn read_u8(buf: &mut &[u8]) -> JdwpResult<u8> {
    require(buf, 1, "u8")?;
    Ok(buf.get_u8())
}

/// Read a u64
pub fn read_u64(buf: &mut &[u8]) -> JdwpResult<u64> {
    require(buf, 8, "u64")?;
    Ok(buf.get_u64())
}

/// Read a location (type tag, class, method, index)
pub fn read_location(buf: &mut &[u8]) -> JdwpResult<Location> {
    let type_tag = read_u8(buf)?;
    let class_id = read_u64(buf)?;
    let method_id = read_u64(buf)?;
    let index = read_u64(buf)?;

    Ok(Location {
        type_tag,
        class_id,
        method_id,
        index,
    })
}

/// Read an untagged value whose tag is already known
pub fn read_value(tag: u8, buf: &mut &[u8]) -> JdwpResult<Value> {
    let kind = TypeTag::from_u8(tag)
        .ok_or_else(|| JdwpError::Protocol(format!("Unknown value tag: {}", tag)))?;

    let data = match kind {
        TypeTag::Byte => {
            require(buf, 1, "byte")?;
            ValueData::Byte(buf.get_i8())
        }
        TypeTag::Char => {
            require(buf, 2, "char")?;
            ValueData::Char(buf.get_u16())
        }
        TypeTag::Double => {
            require(buf, 8, "double")?;
            ValueData::Double(buf.get_f64())
        }
        TypeTag::Float => {
            require(buf, 4, "float")?;
            ValueData::Float(buf.get_f32())
        }
        TypeTag::Int => ValueData::Int(read_i32(buf)?),
        TypeTag::Long => {
            require(buf, 8, "long")?;
            ValueData::Long(buf.get_i64())
        }
        TypeTag::Short => {
            require(buf, 2, "short")?;
            ValueData::Short(buf.get_i16())
        }
        TypeTag::Boolean => ValueData::Boolean(read_u8(buf)? != 0),
        TypeTag::Void => ValueData::Void,
        // Object types (L, s, t, g, l, c, [)
        _ => ValueData::Object(read_u64(buf)?),
    };

    Ok(Value { tag, data })
}

/// Read a tag byte followed by the value
pub fn read_tagged_value(buf: &mut &[u8]) -> JdwpResult<Value> {
    let tag = read_u8(buf)?;
    read_value(tag, buf)
}

/// Read a tagged object id (tag byte + object id)
pub fn read_tagged_object_id(buf: &mut &[u8]) -> JdwpResult<(u8, ObjectId)> {
    let tag = read_u8(buf)?;
    let id = read_u64(buf)?;
    Ok((tag, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_string_underflow() {
        let data = [0u8, 0, 0, 5, b'a', b'b'];
        let mut buf = &data[..];
        assert!(matches!(read_string(&mut buf), Err(JdwpError::Protocol(_))));
    }

    #[test]
    fn test_read_tagged_values() {
        let data = [
            b'I', 0xff, 0xff, 0xff, 0xfe, // int -2
            b'Z', 1, // true
            b's', 0, 0, 0, 0, 0, 0, 0, 0x42, // string @42
        ];
        let mut buf = &data[..];

        let int = read_tagged_value(&mut buf).unwrap();
        assert_eq!(int.data, ValueData::Int(-2));

        let boolean = read_tagged_value(&mut buf).unwrap();
        assert_eq!(boolean.data, ValueData::Boolean(true));

        let string = read_tagged_value(&mut buf).unwrap();
        assert_eq!(string.tag, b's');
        assert_eq!(string.data, ValueData::Object(0x42));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_value_short_buffer() {
        let data = [0u8, 1];
        let mut buf = &data[..];
        assert!(read_value(b'J', &mut buf).is_err());
        assert!(read_value(b'?', &mut buf).is_err());
    }
}
