// The interpreter's view of the target VM
//
// Every method is one or a few protocol round trips. `JdwpVm` implements this
// over a live connection; `MockVm` implements it over an in-memory heap.

use crate::context::LocalSlot;
use crate::error::EvalResult;
use crate::value::{ArrayHandle, ObjectHandle, RemoteValue};
use async_trait::async_trait;
use jdwp_client::reftype::parameter_count;
use jdwp_client::types::{
    FieldId, FrameId, FrameInfo, Location, MethodId, ReferenceTypeId, ThreadId, Variable,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an instruction names a method: by name and arity, optionally pinned
/// to an exact JNI signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSelector {
    pub name: String,
    #[serde(default)]
    pub signature: Option<String>,
    pub arity: usize,
}

impl MethodSelector {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            signature: None,
            arity,
        }
    }

    pub fn with_signature(name: impl Into<String>, signature: impl Into<String>) -> Self {
        let signature = signature.into();
        Self {
            name: name.into(),
            arity: parameter_count(&signature),
            signature: Some(signature),
        }
    }

    pub fn matches(&self, name: &str, signature: &str) -> bool {
        name == self.name
            && match &self.signature {
                Some(wanted) => wanted == signature,
                None => parameter_count(signature) == self.arity,
            }
    }
}

impl fmt::Display for MethodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.signature {
            Some(signature) => write!(f, "{}{}", self.name, signature),
            None => write!(f, "{}/{}", self.name, self.arity),
        }
    }
}

/// A resolved field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub declaring_type: ReferenceTypeId,
    pub field_id: FieldId,
    pub name: String,
    pub signature: String,
    pub is_static: bool,
}

/// A resolved method or constructor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub declaring_type: ReferenceTypeId,
    pub method_id: MethodId,
    pub name: String,
    pub signature: String,
    pub is_static: bool,
}

/// Result of running code in the target
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeOutcome {
    Returned(RemoteValue),
    Threw(ObjectHandle),
}

#[async_trait]
pub trait RemoteVm: Send + Sync {
    /// Frame `depth` (0 = top) of a suspended thread
    async fn frame(&self, thread: ThreadId, depth: usize) -> EvalResult<FrameInfo>;

    /// Local variable table of the method containing `location`; empty when
    /// the class carries no debug information
    async fn variable_table(&self, location: &Location) -> EvalResult<Vec<Variable>>;

    /// The frame's `this`, `Null` in static frames
    async fn this_object(&self, thread: ThreadId, frame: FrameId) -> EvalResult<RemoteValue>;

    async fn frame_values(
        &self,
        thread: ThreadId,
        frame: FrameId,
        slots: &[LocalSlot],
    ) -> EvalResult<Vec<RemoteValue>>;

    async fn set_frame_value(
        &self,
        thread: ThreadId,
        frame: FrameId,
        slot: &LocalSlot,
        value: &RemoteValue,
    ) -> EvalResult<()>;

    async fn create_string(&self, text: &str) -> EvalResult<RemoteValue>;

    async fn string_value(&self, string: &ObjectHandle) -> EvalResult<String>;

    /// Runtime type signature of an object or array
    async fn type_signature(&self, value: &RemoteValue) -> EvalResult<String>;

    /// Signatures of the direct superclass and directly implemented
    /// interfaces of a loaded reference type
    async fn supertypes(&self, signature: &str) -> EvalResult<Vec<String>>;

    async fn array_length(&self, array: &ArrayHandle) -> EvalResult<i32>;

    async fn array_get(&self, array: &ArrayHandle, index: i32) -> EvalResult<RemoteValue>;

    async fn array_set(
        &self,
        array: &ArrayHandle,
        index: i32,
        value: &RemoteValue,
    ) -> EvalResult<()>;

    /// Allocate an array of the given array type signature, e.g. `[I`
    async fn new_array(&self, signature: &str, length: i32) -> EvalResult<RemoteValue>;

    /// Resolve a field of the receiver's runtime class or its superclasses
    async fn instance_field(&self, receiver: &RemoteValue, name: &str) -> EvalResult<FieldRef>;

    /// Resolve a static field of a class (or its superclasses) by signature
    async fn static_field(&self, class: &str, name: &str) -> EvalResult<FieldRef>;

    /// Read a field; `receiver` is ignored for static fields
    async fn get_field(
        &self,
        receiver: Option<&RemoteValue>,
        field: &FieldRef,
    ) -> EvalResult<RemoteValue>;

    async fn set_field(
        &self,
        receiver: Option<&RemoteValue>,
        field: &FieldRef,
        value: &RemoteValue,
    ) -> EvalResult<()>;

    /// Resolve an instance method, walking from the runtime class upward
    async fn instance_method(
        &self,
        receiver: &RemoteValue,
        selector: &MethodSelector,
    ) -> EvalResult<MethodRef>;

    async fn static_method(&self, class: &str, selector: &MethodSelector) -> EvalResult<MethodRef>;

    /// Resolve a constructor declared by `class` itself
    async fn constructor(&self, class: &str, selector: &MethodSelector) -> EvalResult<MethodRef>;

    /// Run a method in `thread` until it returns or throws. The call may let
    /// the thread run arbitrary code; implementations must not surface
    /// suspensions that happen on `thread` before the call completes.
    async fn invoke(
        &self,
        thread: ThreadId,
        receiver: Option<&RemoteValue>,
        method: &MethodRef,
        args: &[RemoteValue],
    ) -> EvalResult<InvokeOutcome>;

    async fn new_instance(
        &self,
        thread: ThreadId,
        constructor: &MethodRef,
        args: &[RemoteValue],
    ) -> EvalResult<InvokeOutcome>;
}
