// Remote value model
//
// A RemoteValue is either an immediate primitive or a handle into the target
// VM's heap. Handles carry no state of their own; anything beyond identity and
// tag (class, array contents, string characters) costs a round trip.

use crate::error::{EvalResult, EvaluationError};
use jdwp_client::types::{ObjectId, TypeTag, Value, ValueData};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    /// JDWP tag, identical to the type's signature character
    pub fn tag(self) -> u8 {
        match self {
            PrimitiveKind::Boolean => b'Z',
            PrimitiveKind::Byte => b'B',
            PrimitiveKind::Char => b'C',
            PrimitiveKind::Short => b'S',
            PrimitiveKind::Int => b'I',
            PrimitiveKind::Long => b'J',
            PrimitiveKind::Float => b'F',
            PrimitiveKind::Double => b'D',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        let kind = match tag {
            b'Z' => PrimitiveKind::Boolean,
            b'B' => PrimitiveKind::Byte,
            b'C' => PrimitiveKind::Char,
            b'S' => PrimitiveKind::Short,
            b'I' => PrimitiveKind::Int,
            b'J' => PrimitiveKind::Long,
            b'F' => PrimitiveKind::Float,
            b'D' => PrimitiveKind::Double,
            _ => return None,
        };
        Some(kind)
    }

    /// Parse a one-character type signature such as `I`
    pub fn from_signature(signature: &str) -> Option<Self> {
        match signature.as_bytes() {
            [tag] => Self::from_tag(*tag),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Byte
                | PrimitiveKind::Char
                | PrimitiveKind::Short
                | PrimitiveKind::Int
                | PrimitiveKind::Long
        )
    }

    /// Identity or widening primitive conversion (JLS 5.1.2)
    pub fn widens_to(self, target: PrimitiveKind) -> bool {
        use PrimitiveKind::*;
        if self == target {
            return true;
        }
        match self {
            Byte => matches!(target, Short | Int | Long | Float | Double),
            Short | Char => matches!(target, Int | Long | Float | Double),
            Int => matches!(target, Long | Float | Double),
            Long => matches!(target, Float | Double),
            Float => target == Double,
            Double | Boolean => false,
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Boolean(_) => PrimitiveKind::Boolean,
            Primitive::Byte(_) => PrimitiveKind::Byte,
            Primitive::Char(_) => PrimitiveKind::Char,
            Primitive::Short(_) => PrimitiveKind::Short,
            Primitive::Int(_) => PrimitiveKind::Int,
            Primitive::Long(_) => PrimitiveKind::Long,
            Primitive::Float(_) => PrimitiveKind::Float,
            Primitive::Double(_) => PrimitiveKind::Double,
        }
    }

    /// Integral value widened to long; `None` for boolean and floating kinds
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Primitive::Byte(v) => Some(v as i64),
            Primitive::Char(v) => Some(v as i64),
            Primitive::Short(v) => Some(v as i64),
            Primitive::Int(v) => Some(v as i64),
            Primitive::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric value widened to double; `None` for boolean
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Primitive::Float(v) => Some(v as f64),
            Primitive::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Value of an operand that must undergo unary promotion to int
    pub fn as_int_index(&self) -> Option<i32> {
        match *self {
            Primitive::Byte(v) => Some(v as i32),
            Primitive::Char(v) => Some(v as i32),
            Primitive::Short(v) => Some(v as i32),
            Primitive::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_jdwp(&self) -> Value {
        let data = match *self {
            Primitive::Boolean(v) => ValueData::Boolean(v),
            Primitive::Byte(v) => ValueData::Byte(v),
            Primitive::Char(v) => ValueData::Char(v),
            Primitive::Short(v) => ValueData::Short(v),
            Primitive::Int(v) => ValueData::Int(v),
            Primitive::Long(v) => ValueData::Long(v),
            Primitive::Float(v) => ValueData::Float(v),
            Primitive::Double(v) => ValueData::Double(v),
        };
        Value {
            tag: self.kind().tag(),
            data,
        }
    }

    pub fn from_jdwp(data: &ValueData) -> Option<Self> {
        let primitive = match *data {
            ValueData::Boolean(v) => Primitive::Boolean(v),
            ValueData::Byte(v) => Primitive::Byte(v),
            ValueData::Char(v) => Primitive::Char(v),
            ValueData::Short(v) => Primitive::Short(v),
            ValueData::Int(v) => Primitive::Int(v),
            ValueData::Long(v) => Primitive::Long(v),
            ValueData::Float(v) => Primitive::Float(v),
            ValueData::Double(v) => Primitive::Double(v),
            ValueData::Object(_) | ValueData::Void => return None,
        };
        Some(primitive)
    }

    /// Zero value of a kind, as held by fresh fields and array slots
    pub fn default_of(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Boolean => Primitive::Boolean(false),
            PrimitiveKind::Byte => Primitive::Byte(0),
            PrimitiveKind::Char => Primitive::Char(0),
            PrimitiveKind::Short => Primitive::Short(0),
            PrimitiveKind::Int => Primitive::Int(0),
            PrimitiveKind::Long => Primitive::Long(0),
            PrimitiveKind::Float => Primitive::Float(0.0),
            PrimitiveKind::Double => Primitive::Double(0.0),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Primitive::Boolean(v) => write!(f, "(boolean) {}", v),
            Primitive::Byte(v) => write!(f, "(byte) {}", v),
            Primitive::Char(v) => write!(
                f,
                "(char) '{}'",
                char::from_u32(v as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
            ),
            Primitive::Short(v) => write!(f, "(short) {}", v),
            Primitive::Int(v) => write!(f, "(int) {}", v),
            Primitive::Long(v) => write!(f, "(long) {}", v),
            Primitive::Float(v) => write!(f, "(float) {}", v),
            Primitive::Double(v) => write!(f, "(double) {}", v),
        }
    }
}

fn object_tag() -> u8 {
    TypeTag::Object as u8
}

/// Handle to a non-array object; `tag` is its JDWP tag (object, string,
/// thread, thread group, class loader or class object)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub id: ObjectId,
    #[serde(default = "object_tag")]
    pub tag: u8,
}

impl ObjectHandle {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            tag: object_tag(),
        }
    }

    pub fn string(id: ObjectId) -> Self {
        Self {
            id,
            tag: TypeTag::String as u8,
        }
    }

    pub fn is_string(&self) -> bool {
        self.tag == TypeTag::String as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Primitive(PrimitiveKind),
    /// Signature of the component type, e.g. `Ljava/lang/String;` or `[I`
    Reference(String),
}

impl ElementType {
    pub fn from_component_signature(signature: &str) -> Self {
        match PrimitiveKind::from_signature(signature) {
            Some(kind) => ElementType::Primitive(kind),
            None => ElementType::Reference(signature.to_string()),
        }
    }

    pub fn signature(&self) -> String {
        match self {
            ElementType::Primitive(kind) => (kind.tag() as char).to_string(),
            ElementType::Reference(signature) => signature.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayHandle {
    pub id: ObjectId,
    pub element: ElementType,
}

impl ArrayHandle {
    /// Build a handle from the array's type signature, e.g. `[[I`
    pub fn from_signature(id: ObjectId, signature: &str) -> EvalResult<Self> {
        let component = signature.strip_prefix('[').ok_or_else(|| {
            EvaluationError::Protocol(format!("not an array signature: {}", signature))
        })?;
        Ok(Self {
            id,
            element: ElementType::from_component_signature(component),
        })
    }

    pub fn signature(&self) -> String {
        format!("[{}", self.element.signature())
    }
}

/// A value living in (or destined for) the target VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteValue {
    Primitive(Primitive),
    Object(ObjectHandle),
    Array(ArrayHandle),
    Null,
    Void,
}

impl RemoteValue {
    pub fn int(value: i32) -> Self {
        RemoteValue::Primitive(Primitive::Int(value))
    }

    pub fn boolean(value: bool) -> Self {
        RemoteValue::Primitive(Primitive::Boolean(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RemoteValue::Null)
    }

    /// Object, array or null
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            RemoteValue::Object(_) | RemoteValue::Array(_) | RemoteValue::Null
        )
    }

    /// Handle identity; `Null` is the same only as `Null`
    pub fn same_object(&self, other: &RemoteValue) -> bool {
        match (self.object_id(), other.object_id()) {
            (Some(a), Some(b)) => a == b,
            _ => self.is_null() && other.is_null(),
        }
    }

    /// Remote id of an object or array handle
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            RemoteValue::Object(handle) => Some(handle.id),
            RemoteValue::Array(handle) => Some(handle.id),
            _ => None,
        }
    }

    /// Short classification used in error messages
    pub fn type_name(&self) -> String {
        match self {
            RemoteValue::Primitive(p) => p.kind().name().to_string(),
            RemoteValue::Object(h) if h.is_string() => "java.lang.String".to_string(),
            RemoteValue::Object(_) => "object".to_string(),
            RemoteValue::Array(a) => a.signature(),
            RemoteValue::Null => "null".to_string(),
            RemoteValue::Void => "void".to_string(),
        }
    }

    pub fn to_jdwp(&self) -> Value {
        match self {
            RemoteValue::Primitive(p) => p.to_jdwp(),
            RemoteValue::Object(h) => Value {
                tag: h.tag,
                data: ValueData::Object(h.id),
            },
            RemoteValue::Array(a) => Value::object(TypeTag::Array, a.id),
            RemoteValue::Null => Value::null(),
            RemoteValue::Void => Value::void(),
        }
    }
}

impl From<Primitive> for RemoteValue {
    fn from(value: Primitive) -> Self {
        RemoteValue::Primitive(value)
    }
}

/// Local rendering, no round trips; see `EvaluationContext::describe` for
/// the full form with class names and string contents
impl fmt::Display for RemoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteValue::Primitive(p) => write!(f, "{}", p),
            RemoteValue::Object(h) => write!(f, "(object) @{:x}", h.id),
            RemoteValue::Array(a) => write!(f, "(array) {} @{:x}", a.signature(), a.id),
            RemoteValue::Null => f.write_str("null"),
            RemoteValue::Void => f.write_str("(void)"),
        }
    }
}

/// Classification of a wire value that needs no round trip
pub enum Classified {
    Known(RemoteValue),
    /// Array reference whose element type must be queried
    Array(ObjectId),
}

pub fn classify(value: &Value) -> EvalResult<Classified> {
    match value.data {
        ValueData::Void => Ok(Classified::Known(RemoteValue::Void)),
        ValueData::Object(0) => Ok(Classified::Known(RemoteValue::Null)),
        ValueData::Object(id) if value.tag == TypeTag::Array as u8 => Ok(Classified::Array(id)),
        ValueData::Object(id) => Ok(Classified::Known(RemoteValue::Object(ObjectHandle {
            id,
            tag: value.tag,
        }))),
        ref data => Primitive::from_jdwp(data)
            .map(|p| Classified::Known(RemoteValue::Primitive(p)))
            .ok_or_else(|| {
                EvaluationError::Protocol(format!("unexpected value tag {}", value.tag))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening_table() {
        use PrimitiveKind::*;
        assert!(Byte.widens_to(Int));
        assert!(Char.widens_to(Long));
        assert!(!Char.widens_to(Short));
        assert!(!Short.widens_to(Char));
        assert!(Long.widens_to(Float));
        assert!(!Double.widens_to(Float));
        assert!(!Boolean.widens_to(Int));
        assert!(Boolean.widens_to(Boolean));
    }

    #[test]
    fn test_identity_is_by_handle() {
        let a = RemoteValue::Object(ObjectHandle::new(7));
        let b = RemoteValue::Object(ObjectHandle::string(7));
        let c = RemoteValue::Object(ObjectHandle::new(8));
        assert!(a.same_object(&b));
        assert!(!a.same_object(&c));
        assert!(RemoteValue::Null.same_object(&RemoteValue::Null));
        assert!(!RemoteValue::Null.same_object(&a));
        assert!(!RemoteValue::int(1).same_object(&RemoteValue::int(1)));
    }

    #[test]
    fn test_classify_wire_values() {
        let array = Value::object(TypeTag::Array, 0x20);
        assert!(matches!(classify(&array).unwrap(), Classified::Array(0x20)));

        let null_array = Value::object(TypeTag::Array, 0);
        assert!(matches!(
            classify(&null_array).unwrap(),
            Classified::Known(RemoteValue::Null)
        ));

        let string = Value::object(TypeTag::String, 0x21);
        match classify(&string).unwrap() {
            Classified::Known(RemoteValue::Object(h)) => assert!(h.is_string()),
            _ => panic!("expected a string handle"),
        }
    }

    #[test]
    fn test_array_signature() {
        let handle = ArrayHandle::from_signature(1, "[[Ljava/lang/String;").unwrap();
        assert_eq!(
            handle.element,
            ElementType::Reference("[Ljava/lang/String;".to_string())
        );
        assert_eq!(handle.signature(), "[[Ljava/lang/String;");
        assert!(ArrayHandle::from_signature(1, "I").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(RemoteValue::int(5).to_string(), "(int) 5");
        assert_eq!(RemoteValue::Null.to_string(), "null");
        assert_eq!(RemoteValue::Void.to_string(), "(void)");
    }
}
