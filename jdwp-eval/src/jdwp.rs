// RemoteVm over a live JDWP connection
//
// Class metadata (signature, hierarchy, fields, methods) never changes once a
// type is loaded, so it is fetched once per type and cached.

use crate::context::LocalSlot;
use crate::error::{EvalResult, EvaluationError};
use crate::remote::{FieldRef, InvokeOutcome, MethodRef, MethodSelector, RemoteVm};
use crate::signature::{self, OBJECT};
use crate::value::{classify, ArrayHandle, Classified, ObjectHandle, RemoteValue};
use async_trait::async_trait;
use jdwp_client::commands::{invoke_options, type_tags};
use jdwp_client::protocol::error_codes;
use jdwp_client::reftype::{FieldInfo, MethodInfo};
use jdwp_client::stackframe::VariableSlot;
use jdwp_client::types::{
    ClassId, FrameId, FrameInfo, Location, ObjectId, ReferenceTypeId, ThreadId, Value, Variable,
};
use jdwp_client::JdwpConnection;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Resume only the evaluating thread while invoked code runs
    pub single_threaded_invoke: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            single_threaded_invoke: true,
        }
    }
}

#[derive(Debug)]
struct TypeMetadata {
    signature: String,
    superclass: Option<ClassId>,
    interfaces: Vec<ReferenceTypeId>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
}

pub struct JdwpVm {
    conn: JdwpConnection,
    config: EvalConfig,
    types: Mutex<HashMap<ReferenceTypeId, Arc<TypeMetadata>>>,
}

impl JdwpVm {
    pub fn new(conn: JdwpConnection, config: EvalConfig) -> Self {
        Self {
            conn,
            config,
            types: Mutex::new(HashMap::new()),
        }
    }

    /// Wrap a fresh connection after checking the target's id sizes; every
    /// codec in the client assumes 8-byte ids
    pub async fn attach(conn: JdwpConnection, config: EvalConfig) -> EvalResult<Self> {
        let version = conn.get_version().await?;
        info!("Attached to {} ({})", version.vm_name, version.vm_version);

        let sizes = conn.get_id_sizes().await?;
        if !sizes.all_eight_bytes() {
            return Err(EvaluationError::Protocol(format!(
                "unsupported id sizes: {:?}",
                sizes
            )));
        }
        Ok(Self::new(conn, config))
    }

    pub fn connection(&self) -> &JdwpConnection {
        &self.conn
    }

    fn invoke_options(&self) -> i32 {
        if self.config.single_threaded_invoke {
            invoke_options::INVOKE_SINGLE_THREADED
        } else {
            0
        }
    }

    fn cached(&self, type_id: ReferenceTypeId) -> Option<Arc<TypeMetadata>> {
        self.types
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&type_id)
            .cloned()
    }

    async fn metadata(&self, type_id: ReferenceTypeId, tag: u8) -> EvalResult<Arc<TypeMetadata>> {
        if let Some(metadata) = self.cached(type_id) {
            return Ok(metadata);
        }

        let signature = self.conn.get_signature(type_id).await?;
        let superclass = if tag == type_tags::CLASS {
            self.conn.get_superclass(type_id).await?
        } else {
            None
        };
        let metadata = Arc::new(TypeMetadata {
            interfaces: self.conn.get_interfaces(type_id).await?,
            fields: self.conn.get_fields(type_id).await?,
            methods: self.conn.get_methods(type_id).await?,
            signature,
            superclass,
        });
        debug!(
            "Loaded {} ({} fields, {} methods)",
            metadata.signature,
            metadata.fields.len(),
            metadata.methods.len()
        );

        self.types
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(type_id, metadata.clone());
        Ok(metadata)
    }

    async fn class_by_signature(&self, signature: &str) -> EvalResult<(ReferenceTypeId, u8)> {
        self.conn
            .classes_by_signature(signature)
            .await?
            .first()
            .map(|class| (class.type_id, class.ref_type_tag))
            .ok_or_else(|| EvaluationError::NoSuchClass(signature::type_name(signature)))
    }

    /// Runtime type of an object; arrays resolve to java.lang.Object since
    /// that is where their members live
    async fn member_holder(&self, receiver: &RemoteValue) -> EvalResult<(ReferenceTypeId, u8)> {
        match receiver {
            RemoteValue::Object(handle) => {
                let (tag, type_id) = self.conn.get_object_reference_type(handle.id).await?;
                Ok((type_id, tag))
            }
            RemoteValue::Array(_) => self.class_by_signature(OBJECT).await,
            RemoteValue::Null => Err(EvaluationError::NullReceiver),
            other => Err(EvaluationError::TypeMismatch(format!(
                "{} has no members",
                other.type_name()
            ))),
        }
    }

    async fn to_remote(&self, value: &Value) -> EvalResult<RemoteValue> {
        match classify(value)? {
            Classified::Known(value) => Ok(value),
            Classified::Array(id) => {
                let (_, type_id) = self.conn.get_object_reference_type(id).await?;
                let signature = self.conn.get_signature(type_id).await?;
                Ok(RemoteValue::Array(ArrayHandle::from_signature(id, &signature)?))
            }
        }
    }

    async fn to_remote_all(&self, values: &[Value]) -> EvalResult<Vec<RemoteValue>> {
        let mut converted = Vec::with_capacity(values.len());
        for value in values {
            converted.push(self.to_remote(value).await?);
        }
        Ok(converted)
    }

    /// First field named `name` along the superclass chain
    async fn find_field(
        &self,
        start: (ReferenceTypeId, u8),
        name: &str,
        want_static: Option<bool>,
    ) -> EvalResult<FieldRef> {
        let mut next = Some(start);
        let mut holder = String::new();
        while let Some((type_id, tag)) = next {
            let metadata = self.metadata(type_id, tag).await?;
            if holder.is_empty() {
                holder = signature::type_name(&metadata.signature);
            }
            let found = metadata
                .fields
                .iter()
                .find(|f| f.name == name && want_static.map_or(true, |s| f.is_static() == s));
            if let Some(field) = found {
                return Ok(FieldRef {
                    declaring_type: type_id,
                    field_id: field.field_id,
                    name: field.name.clone(),
                    signature: field.signature.clone(),
                    is_static: field.is_static(),
                });
            }
            next = metadata.superclass.map(|c| (c, type_tags::CLASS));
        }
        Err(EvaluationError::NoSuchField(format!("{} in {}", name, holder)))
    }

    /// First matching method along the superclass chain, then among the
    /// chain's interfaces (default and static interface methods)
    async fn find_method(
        &self,
        start: (ReferenceTypeId, u8),
        selector: &MethodSelector,
        want_static: bool,
    ) -> EvalResult<MethodRef> {
        let mut interfaces = VecDeque::new();
        let mut next = Some(start);
        let mut holder = String::new();

        while let Some((type_id, tag)) = next {
            let metadata = self.metadata(type_id, tag).await?;
            if holder.is_empty() {
                holder = signature::type_name(&metadata.signature);
            }
            if let Some(method) = matching(&metadata, selector, want_static) {
                return Ok(method_ref(type_id, method));
            }
            interfaces.extend(metadata.interfaces.iter().copied());
            next = metadata.superclass.map(|c| (c, type_tags::CLASS));
        }

        let mut seen = HashSet::new();
        while let Some(type_id) = interfaces.pop_front() {
            if !seen.insert(type_id) {
                continue;
            }
            let metadata = self.metadata(type_id, type_tags::INTERFACE).await?;
            if let Some(method) = matching(&metadata, selector, want_static) {
                return Ok(method_ref(type_id, method));
            }
            interfaces.extend(metadata.interfaces.iter().copied());
        }

        Err(EvaluationError::NoSuchMethod(format!("{} in {}", selector, holder)))
    }

    fn outcome(&self, exception: ObjectId) -> Option<InvokeOutcome> {
        (exception != 0).then(|| InvokeOutcome::Threw(ObjectHandle::new(exception)))
    }
}

fn matching<'a>(
    metadata: &'a TypeMetadata,
    selector: &MethodSelector,
    want_static: bool,
) -> Option<&'a MethodInfo> {
    metadata
        .methods
        .iter()
        .find(|m| m.is_static() == want_static && selector.matches(&m.name, &m.signature))
}

fn method_ref(declaring_type: ReferenceTypeId, method: &MethodInfo) -> MethodRef {
    MethodRef {
        declaring_type,
        method_id: method.method_id,
        name: method.name.clone(),
        signature: method.signature.clone(),
        is_static: method.is_static(),
    }
}

fn first(mut values: Vec<RemoteValue>, what: &str) -> EvalResult<RemoteValue> {
    if values.is_empty() {
        return Err(EvaluationError::Protocol(format!("empty reply to {}", what)));
    }
    Ok(values.swap_remove(0))
}

/// Frame depths and slot indices travel as JDWP ints
fn wire_int<T>(value: T, what: &str) -> EvalResult<i32>
where
    T: TryInto<i32> + Copy + std::fmt::Display,
{
    value.try_into().map_err(|_| {
        EvaluationError::Protocol(format!("{} {} does not fit a JDWP int", what, value))
    })
}

#[async_trait]
impl RemoteVm for JdwpVm {
    async fn frame(&self, thread: ThreadId, depth: usize) -> EvalResult<FrameInfo> {
        let start = wire_int(depth, "frame depth")?;
        let mut frames = self.conn.get_frames(thread, start, 1).await?;
        if frames.is_empty() {
            return Err(EvaluationError::StaleFrame(format!(
                "thread {:x} has no frame {}",
                thread, depth
            )));
        }
        Ok(frames.swap_remove(0))
    }

    async fn variable_table(&self, location: &Location) -> EvalResult<Vec<Variable>> {
        match self
            .conn
            .get_variable_table(location.class_id, location.method_id)
            .await
        {
            Ok(variables) => Ok(variables),
            Err(e) if e.error_code() == Some(error_codes::ABSENT_INFORMATION) => {
                debug!("No variable table for method {:x}", location.method_id);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn this_object(&self, thread: ThreadId, frame: FrameId) -> EvalResult<RemoteValue> {
        let (tag, id) = self.conn.get_this_object(thread, frame).await?;
        self.to_remote(&Value {
            tag,
            data: jdwp_client::types::ValueData::Object(id),
        })
        .await
    }

    async fn frame_values(
        &self,
        thread: ThreadId,
        frame: FrameId,
        slots: &[LocalSlot],
    ) -> EvalResult<Vec<RemoteValue>> {
        let slots = slots
            .iter()
            .map(|s| VariableSlot::new(s.slot, &s.signature))
            .collect::<Result<Vec<_>, _>>()?;
        let values = self.conn.get_frame_values(thread, frame, &slots).await?;
        self.to_remote_all(&values).await
    }

    async fn set_frame_value(
        &self,
        thread: ThreadId,
        frame: FrameId,
        slot: &LocalSlot,
        value: &RemoteValue,
    ) -> EvalResult<()> {
        let index = wire_int(slot.slot, "slot")?;
        self.conn
            .set_frame_values(thread, frame, &[(index, value.to_jdwp())])
            .await?;
        Ok(())
    }

    async fn create_string(&self, text: &str) -> EvalResult<RemoteValue> {
        let id = self.conn.create_string(text).await?;
        Ok(RemoteValue::Object(ObjectHandle::string(id)))
    }

    async fn string_value(&self, string: &ObjectHandle) -> EvalResult<String> {
        Ok(self.conn.get_string_value(string.id).await?)
    }

    async fn type_signature(&self, value: &RemoteValue) -> EvalResult<String> {
        match value {
            RemoteValue::Array(handle) => Ok(handle.signature()),
            RemoteValue::Object(handle) => {
                let (tag, type_id) = self.conn.get_object_reference_type(handle.id).await?;
                Ok(self.metadata(type_id, tag).await?.signature.clone())
            }
            RemoteValue::Null => Err(EvaluationError::NullReceiver),
            other => Err(EvaluationError::TypeMismatch(format!(
                "{} has no runtime class",
                other.type_name()
            ))),
        }
    }

    async fn supertypes(&self, signature: &str) -> EvalResult<Vec<String>> {
        let (type_id, tag) = self.class_by_signature(signature).await?;
        let metadata = self.metadata(type_id, tag).await?;

        let mut supertypes = Vec::new();
        if let Some(superclass) = metadata.superclass {
            let parent = self.metadata(superclass, type_tags::CLASS).await?;
            supertypes.push(parent.signature.clone());
        }
        for interface in &metadata.interfaces {
            let parent = self.metadata(*interface, type_tags::INTERFACE).await?;
            supertypes.push(parent.signature.clone());
        }
        Ok(supertypes)
    }

    async fn array_length(&self, array: &ArrayHandle) -> EvalResult<i32> {
        Ok(self.conn.get_array_length(array.id).await?)
    }

    async fn array_get(&self, array: &ArrayHandle, index: i32) -> EvalResult<RemoteValue> {
        let values = self.conn.get_array_values(array.id, index, 1).await?;
        first(self.to_remote_all(&values).await?, "ArrayReference.GetValues")
    }

    async fn array_set(
        &self,
        array: &ArrayHandle,
        index: i32,
        value: &RemoteValue,
    ) -> EvalResult<()> {
        self.conn
            .set_array_values(array.id, index, &[value.to_jdwp()])
            .await?;
        Ok(())
    }

    async fn new_array(&self, signature: &str, length: i32) -> EvalResult<RemoteValue> {
        let (type_id, _) = self.class_by_signature(signature).await?;
        let id = self.conn.new_array(type_id, length).await?;
        Ok(RemoteValue::Array(ArrayHandle::from_signature(id, signature)?))
    }

    async fn instance_field(&self, receiver: &RemoteValue, name: &str) -> EvalResult<FieldRef> {
        let holder = self.member_holder(receiver).await?;
        self.find_field(holder, name, None).await
    }

    async fn static_field(&self, class: &str, name: &str) -> EvalResult<FieldRef> {
        let holder = self.class_by_signature(class).await?;
        self.find_field(holder, name, Some(true)).await
    }

    async fn get_field(
        &self,
        receiver: Option<&RemoteValue>,
        field: &FieldRef,
    ) -> EvalResult<RemoteValue> {
        let values = if field.is_static {
            self.conn
                .get_static_values(field.declaring_type, &[field.field_id])
                .await?
        } else {
            let object = receiver
                .and_then(RemoteValue::object_id)
                .ok_or(EvaluationError::NullReceiver)?;
            self.conn.get_object_values(object, &[field.field_id]).await?
        };
        first(self.to_remote_all(&values).await?, "GetValues")
    }

    async fn set_field(
        &self,
        receiver: Option<&RemoteValue>,
        field: &FieldRef,
        value: &RemoteValue,
    ) -> EvalResult<()> {
        let values = [(field.field_id, value.to_jdwp())];
        if field.is_static {
            self.conn
                .set_static_values(field.declaring_type, &values)
                .await?;
        } else {
            let object = receiver
                .and_then(RemoteValue::object_id)
                .ok_or(EvaluationError::NullReceiver)?;
            self.conn.set_object_values(object, &values).await?;
        }
        Ok(())
    }

    async fn instance_method(
        &self,
        receiver: &RemoteValue,
        selector: &MethodSelector,
    ) -> EvalResult<MethodRef> {
        let holder = self.member_holder(receiver).await?;
        self.find_method(holder, selector, false).await
    }

    async fn static_method(&self, class: &str, selector: &MethodSelector) -> EvalResult<MethodRef> {
        let holder = self.class_by_signature(class).await?;
        self.find_method(holder, selector, true).await
    }

    async fn constructor(&self, class: &str, selector: &MethodSelector) -> EvalResult<MethodRef> {
        let (type_id, tag) = self.class_by_signature(class).await?;
        let metadata = self.metadata(type_id, tag).await?;
        metadata
            .methods
            .iter()
            .find(|m| m.name == "<init>" && selector.matches(&m.name, &m.signature))
            .map(|m| method_ref(type_id, m))
            .ok_or_else(|| {
                EvaluationError::NoSuchMethod(format!(
                    "constructor {} in {}",
                    selector,
                    signature::type_name(class)
                ))
            })
    }

    async fn invoke(
        &self,
        thread: ThreadId,
        receiver: Option<&RemoteValue>,
        method: &MethodRef,
        args: &[RemoteValue],
    ) -> EvalResult<InvokeOutcome> {
        let args: Vec<Value> = args.iter().map(RemoteValue::to_jdwp).collect();
        let options = self.invoke_options();

        let reply = {
            let _scope = self.conn.invoking_threads().enter(thread);
            match receiver {
                Some(receiver) => {
                    let object = receiver.object_id().ok_or_else(|| {
                        EvaluationError::TypeMismatch(format!(
                            "cannot invoke {} on {}",
                            method.name,
                            receiver.type_name()
                        ))
                    })?;
                    self.conn
                        .invoke_method(
                            object,
                            thread,
                            method.declaring_type,
                            method.method_id,
                            &args,
                            options,
                        )
                        .await?
                }
                None => {
                    self.conn
                        .invoke_static_method(
                            method.declaring_type,
                            thread,
                            method.method_id,
                            &args,
                            options,
                        )
                        .await?
                }
            }
        };

        if let Some(threw) = self.outcome(reply.exception) {
            return Ok(threw);
        }
        Ok(InvokeOutcome::Returned(self.to_remote(&reply.value).await?))
    }

    async fn new_instance(
        &self,
        thread: ThreadId,
        constructor: &MethodRef,
        args: &[RemoteValue],
    ) -> EvalResult<InvokeOutcome> {
        let args: Vec<Value> = args.iter().map(RemoteValue::to_jdwp).collect();

        let reply = {
            let _scope = self.conn.invoking_threads().enter(thread);
            self.conn
                .new_instance(
                    constructor.declaring_type,
                    thread,
                    constructor.method_id,
                    &args,
                    self.invoke_options(),
                )
                .await?
        };

        if let Some(threw) = self.outcome(reply.exception) {
            return Ok(threw);
        }
        Ok(InvokeOutcome::Returned(self.to_remote(&reply.value).await?))
    }
}

impl std::fmt::Debug for JdwpVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JdwpVm")
            .field("config", &self.config)
            .field("cached_types", &self.types.lock().map(|t| t.len()).unwrap_or(0))
            .finish()
    }
}
