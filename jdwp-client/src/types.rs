// JDWP type definitions
//
// Common types used across the JDWP protocol

use serde::{Deserialize, Serialize};

// Object IDs are 8 bytes in JDWP
pub type ObjectId = u64;
pub type ThreadId = ObjectId;
pub type StringId = ObjectId;
pub type ArrayId = ObjectId;

pub type ReferenceTypeId = u64;
pub type ClassId = ReferenceTypeId;
pub type ArrayTypeId = ReferenceTypeId;

pub type MethodId = u64;
pub type FieldId = u64;
pub type FrameId = u64;

// Location identifies a code position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub type_tag: u8, // 1=class, 2=interface, 3=array
    pub class_id: ReferenceTypeId,
    pub method_id: MethodId,
    pub index: u64, // bytecode index (PC)
}

impl Location {
    /// True when both locations are inside the same method
    pub fn same_method(&self, other: &Location) -> bool {
        self.class_id == other.class_id && self.method_id == other.method_id
    }
}

// Type tags for values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeTag {
    Array = 91,        // '['
    Byte = 66,         // 'B'
    Char = 67,         // 'C'
    Object = 76,       // 'L'
    Float = 70,        // 'F'
    Double = 68,       // 'D'
    Int = 73,          // 'I'
    Long = 74,         // 'J'
    Short = 83,        // 'S'
    Void = 86,         // 'V'
    Boolean = 90,      // 'Z'
    String = 115,      // 's'
    Thread = 116,      // 't'
    ThreadGroup = 103, // 'g'
    ClassLoader = 108, // 'l'
    ClassObject = 99,  // 'c'
}

impl TypeTag {
    pub fn from_u8(tag: u8) -> Option<Self> {
        let tag = match tag {
            b'[' => TypeTag::Array,
            b'B' => TypeTag::Byte,
            b'C' => TypeTag::Char,
            b'L' => TypeTag::Object,
            b'F' => TypeTag::Float,
            b'D' => TypeTag::Double,
            b'I' => TypeTag::Int,
            b'J' => TypeTag::Long,
            b'S' => TypeTag::Short,
            b'V' => TypeTag::Void,
            b'Z' => TypeTag::Boolean,
            b's' => TypeTag::String,
            b't' => TypeTag::Thread,
            b'g' => TypeTag::ThreadGroup,
            b'l' => TypeTag::ClassLoader,
            b'c' => TypeTag::ClassObject,
            _ => return None,
        };
        Some(tag)
    }

    /// Tags whose values are object ids
    pub fn is_object(self) -> bool {
        matches!(
            self,
            TypeTag::Array
                | TypeTag::Object
                | TypeTag::String
                | TypeTag::Thread
                | TypeTag::ThreadGroup
                | TypeTag::ClassLoader
                | TypeTag::ClassObject
        )
    }
}

// Tagged value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub tag: u8,
    pub data: ValueData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueData {
    Byte(i8),
    Char(u16),
    Float(f32),
    Double(f64),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    Object(ObjectId),
    Void,
}

impl Value {
    pub fn new(tag: TypeTag, data: ValueData) -> Self {
        Self {
            tag: tag as u8,
            data,
        }
    }

    pub fn object(tag: TypeTag, id: ObjectId) -> Self {
        Self::new(tag, ValueData::Object(id))
    }

    pub fn null() -> Self {
        Self::object(TypeTag::Object, 0)
    }

    pub fn void() -> Self {
        Self::new(TypeTag::Void, ValueData::Void)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.data, ValueData::Object(0))
    }

    /// Format value for display
    pub fn format(&self) -> String {
        match &self.data {
            ValueData::Byte(v) => format!("(byte) {}", v),
            ValueData::Char(v) => format!("(char) '{}'", char::from_u32(*v as u32).unwrap_or('?')),
            ValueData::Float(v) => format!("(float) {}", v),
            ValueData::Double(v) => format!("(double) {}", v),
            ValueData::Int(v) => format!("(int) {}", v),
            ValueData::Long(v) => format!("(long) {}", v),
            ValueData::Short(v) => format!("(short) {}", v),
            ValueData::Boolean(v) => format!("(boolean) {}", v),
            ValueData::Object(id) => {
                if *id == 0 {
                    "(object) null".to_string()
                } else {
                    format!("(object) @{:x}", id)
                }
            }
            ValueData::Void => "(void)".to_string(),
        }
    }
}

// Variable information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub code_index: u64,
    pub name: String,
    pub signature: String,
    pub length: u32,
    pub slot: u32,
}

impl Variable {
    /// Whether the variable is in scope at the given bytecode index
    pub fn is_live_at(&self, code_index: u64) -> bool {
        code_index >= self.code_index && code_index < self.code_index + self.length as u64
    }
}

// Stack frame information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameInfo {
    pub frame_id: FrameId,
    pub location: Location,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip_for_object_tags() {
        for tag in [b'[', b'L', b's', b't', b'g', b'l', b'c'] {
            let parsed = TypeTag::from_u8(tag).unwrap();
            assert_eq!(parsed as u8, tag);
            assert!(parsed.is_object());
        }
        assert!(!TypeTag::Int.is_object());
        assert_eq!(TypeTag::from_u8(b'?'), None);
    }

    #[test]
    fn test_variable_liveness() {
        let var = Variable {
            code_index: 4,
            name: "i".to_string(),
            signature: "I".to_string(),
            length: 10,
            slot: 1,
        };
        assert!(!var.is_live_at(3));
        assert!(var.is_live_at(4));
        assert!(var.is_live_at(13));
        assert!(!var.is_live_at(14));
    }

    #[test]
    fn test_null_format() {
        assert!(Value::null().is_null());
        assert_eq!(Value::null().format(), "(object) null");
        assert_eq!(Value::object(TypeTag::String, 0x2a).format(), "(object) @2a");
    }
}
