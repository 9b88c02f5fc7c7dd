// In-memory RemoteVm for tests
//
// A tiny heap of classes, objects, arrays and strings plus per-thread frame
// stacks. Every trait call is recorded in a call log, can be slowed down by a
// fixed delay, and fails with Disconnected once `disconnect` was called.

use crate::context::LocalSlot;
use crate::error::{EvalResult, EvaluationError};
use crate::remote::{FieldRef, InvokeOutcome, MethodRef, MethodSelector, RemoteVm};
use crate::signature::{OBJECT, STRING};
use crate::value::{ArrayHandle, ElementType, ObjectHandle, Primitive, PrimitiveKind, RemoteValue};
use async_trait::async_trait;
use jdwp_client::commands::type_tags;
use jdwp_client::types::{
    FrameId, FrameInfo, Location, MethodId, ObjectId, ReferenceTypeId, ThreadId, Variable,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub type MethodBody =
    Arc<dyn Fn(&MockVm, &RemoteValue, &[RemoteValue]) -> InvokeOutcome + Send + Sync>;

#[derive(Clone)]
struct MockMethod {
    name: String,
    signature: String,
    is_static: bool,
    body: MethodBody,
}

#[derive(Clone)]
struct MockField {
    name: String,
    signature: String,
    is_static: bool,
}

/// Class definition builder
#[derive(Clone)]
pub struct MockClass {
    signature: String,
    superclass: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<MockField>,
    methods: Vec<MockMethod>,
}

impl MockClass {
    /// A class extending java.lang.Object
    pub fn new(signature: &str) -> Self {
        Self {
            signature: signature.to_string(),
            superclass: (signature != OBJECT).then(|| OBJECT.to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Interfaces have no superclass
    pub fn interface(mut self) -> Self {
        self.superclass = None;
        self
    }

    pub fn superclass(mut self, signature: &str) -> Self {
        self.superclass = Some(signature.to_string());
        self
    }

    pub fn implements(mut self, signature: &str) -> Self {
        self.interfaces.push(signature.to_string());
        self
    }

    pub fn field(mut self, name: &str, signature: &str) -> Self {
        self.fields.push(MockField {
            name: name.to_string(),
            signature: signature.to_string(),
            is_static: false,
        });
        self
    }

    pub fn static_field(mut self, name: &str, signature: &str) -> Self {
        self.fields.push(MockField {
            name: name.to_string(),
            signature: signature.to_string(),
            is_static: true,
        });
        self
    }

    pub fn method<F>(self, name: &str, signature: &str, body: F) -> Self
    where
        F: Fn(&MockVm, &RemoteValue, &[RemoteValue]) -> InvokeOutcome + Send + Sync + 'static,
    {
        self.with_method(name, signature, false, Arc::new(body))
    }

    pub fn static_method<F>(self, name: &str, signature: &str, body: F) -> Self
    where
        F: Fn(&MockVm, &RemoteValue, &[RemoteValue]) -> InvokeOutcome + Send + Sync + 'static,
    {
        self.with_method(name, signature, true, Arc::new(body))
    }

    /// Constructor body; receives the freshly allocated object
    pub fn constructor<F>(self, signature: &str, body: F) -> Self
    where
        F: Fn(&MockVm, &RemoteValue, &[RemoteValue]) -> InvokeOutcome + Send + Sync + 'static,
    {
        self.with_method("<init>", signature, false, Arc::new(body))
    }

    fn with_method(
        mut self,
        name: &str,
        signature: &str,
        is_static: bool,
        body: MethodBody,
    ) -> Self {
        self.methods.push(MockMethod {
            name: name.to_string(),
            signature: signature.to_string(),
            is_static,
            body,
        });
        self
    }
}

/// A frame on a mock thread's stack
#[derive(Debug, Clone)]
pub struct MockFrame {
    location: Location,
    this: RemoteValue,
    locals: Vec<(Variable, RemoteValue)>,
}

impl MockFrame {
    pub fn new(class_id: ReferenceTypeId, method_id: MethodId) -> Self {
        Self {
            location: Location {
                type_tag: type_tags::CLASS,
                class_id,
                method_id,
                index: 0,
            },
            this: RemoteValue::Null,
            locals: Vec::new(),
        }
    }

    pub fn this(mut self, receiver: RemoteValue) -> Self {
        self.this = receiver;
        self
    }

    /// A local live for the whole method
    pub fn local(mut self, name: &str, signature: &str, value: RemoteValue) -> Self {
        let variable = Variable {
            code_index: 0,
            name: name.to_string(),
            signature: signature.to_string(),
            length: u32::MAX,
            slot: self.locals.len() as u32,
        };
        self.locals.push((variable, value));
        self
    }
}

struct LiveFrame {
    frame_id: FrameId,
    frame: MockFrame,
}

struct MockObject {
    class: String,
    fields: HashMap<String, RemoteValue>,
}

struct MockArray {
    handle: ArrayHandle,
    values: Vec<RemoteValue>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    class_ids: HashMap<String, ReferenceTypeId>,
    classes: HashMap<ReferenceTypeId, MockClass>,
    statics: HashMap<(ReferenceTypeId, String), RemoteValue>,
    objects: HashMap<ObjectId, MockObject>,
    arrays: HashMap<ObjectId, MockArray>,
    strings: HashMap<ObjectId, String>,
    threads: HashMap<ThreadId, Vec<LiveFrame>>,
}

impl MockState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn class(&self, signature: &str) -> EvalResult<(ReferenceTypeId, &MockClass)> {
        let id = *self
            .class_ids
            .get(signature)
            .ok_or_else(|| EvaluationError::NoSuchClass(signature.to_string()))?;
        let class = self
            .classes
            .get(&id)
            .ok_or_else(|| EvaluationError::NoSuchClass(signature.to_string()))?;
        Ok((id, class))
    }

    /// The class and its superclasses, most derived first
    fn lineage(&self, signature: &str) -> EvalResult<Vec<(ReferenceTypeId, &MockClass)>> {
        let mut chain = Vec::new();
        let mut next = Some(signature.to_string());
        while let Some(signature) = next {
            let (id, class) = self.class(&signature)?;
            next = class.superclass.clone();
            chain.push((id, class));
        }
        Ok(chain)
    }

    fn runtime_class(&self, value: &RemoteValue) -> EvalResult<String> {
        match value {
            RemoteValue::Object(handle) if self.strings.contains_key(&handle.id) => {
                Ok(STRING.to_string())
            }
            RemoteValue::Object(handle) => self
                .objects
                .get(&handle.id)
                .map(|o| o.class.clone())
                .ok_or(EvaluationError::StaleHandle),
            RemoteValue::Array(handle) => self
                .arrays
                .get(&handle.id)
                .map(|a| a.handle.signature())
                .ok_or(EvaluationError::StaleHandle),
            RemoteValue::Null => Err(EvaluationError::NullReceiver),
            other => Err(EvaluationError::TypeMismatch(format!(
                "{} has no runtime class",
                other.type_name()
            ))),
        }
    }

    fn live_frame(&mut self, thread: ThreadId, frame: FrameId) -> EvalResult<&mut MockFrame> {
        self.threads
            .get_mut(&thread)
            .and_then(|frames| frames.iter_mut().find(|f| f.frame_id == frame))
            .map(|f| &mut f.frame)
            .ok_or_else(|| EvaluationError::StaleFrame(format!("invalid frame id {:x}", frame)))
    }

    fn add_class(&mut self, class: MockClass) -> ReferenceTypeId {
        let id = self.allocate();
        for field in class.fields.iter().filter(|f| f.is_static) {
            self.statics
                .insert((id, field.name.clone()), default_value(&field.signature));
        }
        self.class_ids.insert(class.signature.clone(), id);
        self.classes.insert(id, class);
        id
    }

    fn new_object(&mut self, class: &str) -> RemoteValue {
        if !self.class_ids.contains_key(class) {
            self.add_class(MockClass::new(class));
        }
        let mut fields = HashMap::new();
        if let Ok(lineage) = self.lineage(class) {
            for (_, c) in lineage {
                for field in c.fields.iter().filter(|f| !f.is_static) {
                    fields
                        .entry(field.name.clone())
                        .or_insert_with(|| default_value(&field.signature));
                }
            }
        }

        let id = self.allocate();
        self.objects.insert(
            id,
            MockObject {
                class: class.to_string(),
                fields,
            },
        );
        RemoteValue::Object(ObjectHandle::new(id))
    }

    fn new_array(&mut self, signature: &str, values: Vec<RemoteValue>) -> EvalResult<RemoteValue> {
        let id = self.allocate();
        let handle = ArrayHandle::from_signature(id, signature)?;
        self.arrays.insert(
            id,
            MockArray {
                handle: handle.clone(),
                values,
            },
        );
        Ok(RemoteValue::Array(handle))
    }
}

fn default_value(signature: &str) -> RemoteValue {
    match PrimitiveKind::from_signature(signature) {
        Some(kind) => RemoteValue::Primitive(Primitive::default_of(kind)),
        None => RemoteValue::Null,
    }
}

pub struct MockVm {
    state: Mutex<MockState>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    disconnected: AtomicBool,
}

impl Default for MockVm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVm {
    /// A VM with java.lang.Object and java.lang.String loaded
    pub fn new() -> Self {
        let mut state = MockState {
            next_id: 0x100,
            ..MockState::default()
        };
        state.add_class(MockClass::new(OBJECT));
        state.add_class(MockClass::new(STRING));

        Self {
            state: Mutex::new(state),
            calls: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            disconnected: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sleep this long at the start of every remote operation
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|p| p.into_inner()) = Some(delay);
    }

    /// Every later operation fails with Disconnected
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    /// Operations performed so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn add_class(&self, class: MockClass) -> ReferenceTypeId {
        self.state().add_class(class)
    }

    pub fn new_object(&self, class: &str) -> RemoteValue {
        self.state().new_object(class)
    }

    pub fn new_string(&self, text: &str) -> RemoteValue {
        let mut state = self.state();
        let id = state.allocate();
        state.strings.insert(id, text.to_string());
        RemoteValue::Object(ObjectHandle::string(id))
    }

    pub fn new_int_array(&self, values: &[i32]) -> RemoteValue {
        let values = values.iter().map(|v| RemoteValue::int(*v)).collect();
        self.new_array("[I", values)
    }

    /// Array of the given array type signature holding `values`
    pub fn new_array(&self, signature: &str, values: Vec<RemoteValue>) -> RemoteValue {
        self.state()
            .new_array(signature, values)
            .unwrap_or(RemoteValue::Null)
    }

    /// Current contents of an array
    pub fn array_values(&self, array: &RemoteValue) -> Vec<RemoteValue> {
        let state = self.state();
        array
            .object_id()
            .and_then(|id| state.arrays.get(&id))
            .map(|a| a.values.clone())
            .unwrap_or_default()
    }

    pub fn field_value(&self, object: &RemoteValue, name: &str) -> Option<RemoteValue> {
        let state = self.state();
        let id = object.object_id()?;
        state.objects.get(&id)?.fields.get(name).cloned()
    }

    pub fn set_field_value(&self, object: &RemoteValue, name: &str, value: RemoteValue) {
        let mut state = self.state();
        if let Some(object) = object.object_id().and_then(|id| state.objects.get_mut(&id)) {
            object.fields.insert(name.to_string(), value);
        }
    }

    pub fn static_value(&self, class: &str, name: &str) -> Option<RemoteValue> {
        let state = self.state();
        let id = *state.class_ids.get(class)?;
        state.statics.get(&(id, name.to_string())).cloned()
    }

    pub fn set_static_value(&self, class: &str, name: &str, value: RemoteValue) {
        let mut state = self.state();
        if let Some(id) = state.class_ids.get(class).copied() {
            state.statics.insert((id, name.to_string()), value);
        }
    }

    /// Push a frame onto a thread's stack; it becomes frame 0
    pub fn push_frame(&self, thread: ThreadId, frame: MockFrame) -> FrameId {
        let mut state = self.state();
        let frame_id = state.allocate();
        state
            .threads
            .entry(thread)
            .or_default()
            .insert(0, LiveFrame { frame_id, frame });
        frame_id
    }

    /// Value of a frame local, looked up by name
    pub fn local_value(&self, thread: ThreadId, depth: usize, name: &str) -> Option<RemoteValue> {
        let state = self.state();
        let frame = state.threads.get(&thread)?.get(depth)?;
        frame
            .frame
            .locals
            .iter()
            .find(|(v, _)| v.name == name)
            .map(|(_, value)| value.clone())
    }

    /// Give every frame of a thread a fresh id, as a VM may after the thread ran
    pub fn reissue_frame_ids(&self, thread: ThreadId) {
        let mut state = self.state();
        let count = state.threads.get(&thread).map_or(0, |f| f.len());
        let fresh: Vec<_> = (0..count).map(|_| state.allocate()).collect();
        if let Some(frames) = state.threads.get_mut(&thread) {
            for (frame, id) in frames.iter_mut().zip(fresh) {
                frame.frame_id = id;
            }
        }
    }

    /// Drop the top frame of a thread, as if its method returned
    pub fn pop_frame(&self, thread: ThreadId) {
        if let Some(frames) = self.state().threads.get_mut(&thread) {
            if !frames.is_empty() {
                frames.remove(0);
            }
        }
    }

    async fn enter(&self, call: String) -> EvalResult<()> {
        let delay = *self.delay.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(EvaluationError::Disconnected);
        }
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).push(call);
        Ok(())
    }

    fn find_method(
        &self,
        class: &str,
        selector: &MethodSelector,
        want_static: bool,
        inherited: bool,
    ) -> EvalResult<MethodRef> {
        let state = self.state();
        let lineage = state.lineage(class)?;
        let searched = if inherited { lineage.len() } else { 1 };

        for (class_id, c) in lineage.into_iter().take(searched) {
            for (index, method) in c.methods.iter().enumerate() {
                if method.is_static == want_static
                    && selector.matches(&method.name, &method.signature)
                {
                    return Ok(MethodRef {
                        declaring_type: class_id,
                        method_id: index as MethodId,
                        name: method.name.clone(),
                        signature: method.signature.clone(),
                        is_static: method.is_static,
                    });
                }
            }
        }
        Err(EvaluationError::NoSuchMethod(format!("{} in {}", selector, class)))
    }

    fn find_field(&self, class: &str, name: &str) -> EvalResult<FieldRef> {
        let state = self.state();
        for (class_id, c) in state.lineage(class)? {
            for (index, field) in c.fields.iter().enumerate() {
                if field.name == name {
                    return Ok(FieldRef {
                        declaring_type: class_id,
                        field_id: index as u64,
                        name: field.name.clone(),
                        signature: field.signature.clone(),
                        is_static: field.is_static,
                    });
                }
            }
        }
        Err(EvaluationError::NoSuchField(format!("{} in {}", name, class)))
    }

    fn body(&self, method: &MethodRef) -> EvalResult<MethodBody> {
        let state = self.state();
        state
            .classes
            .get(&method.declaring_type)
            .and_then(|c| c.methods.get(method.method_id as usize))
            .map(|m| m.body.clone())
            .ok_or_else(|| EvaluationError::NoSuchMethod(method.name.clone()))
    }
}

#[async_trait]
impl RemoteVm for MockVm {
    async fn frame(&self, thread: ThreadId, depth: usize) -> EvalResult<FrameInfo> {
        self.enter(format!("frame {}", depth)).await?;
        let state = self.state();
        state
            .threads
            .get(&thread)
            .and_then(|frames| frames.get(depth))
            .map(|f| FrameInfo {
                frame_id: f.frame_id,
                location: f.frame.location,
            })
            .ok_or_else(|| {
                EvaluationError::StaleFrame(format!("thread {:x} has no frame {}", thread, depth))
            })
    }

    async fn variable_table(&self, location: &Location) -> EvalResult<Vec<Variable>> {
        self.enter("variable_table".to_string()).await?;
        let state = self.state();
        let variables = state
            .threads
            .values()
            .flatten()
            .find(|f| f.frame.location.same_method(location))
            .map(|f| f.frame.locals.iter().map(|(v, _)| v.clone()).collect())
            .unwrap_or_default();
        Ok(variables)
    }

    async fn this_object(&self, thread: ThreadId, frame: FrameId) -> EvalResult<RemoteValue> {
        self.enter("this_object".to_string()).await?;
        let mut state = self.state();
        Ok(state.live_frame(thread, frame)?.this.clone())
    }

    async fn frame_values(
        &self,
        thread: ThreadId,
        frame: FrameId,
        slots: &[LocalSlot],
    ) -> EvalResult<Vec<RemoteValue>> {
        self.enter("frame_values".to_string()).await?;
        let mut state = self.state();
        let frame = state.live_frame(thread, frame)?;
        slots
            .iter()
            .map(|slot| {
                frame
                    .locals
                    .iter()
                    .find(|(v, _)| v.slot == slot.slot)
                    .map(|(_, value)| value.clone())
                    .ok_or_else(|| EvaluationError::Protocol(format!("invalid slot {}", slot.slot)))
            })
            .collect()
    }

    async fn set_frame_value(
        &self,
        thread: ThreadId,
        frame: FrameId,
        slot: &LocalSlot,
        value: &RemoteValue,
    ) -> EvalResult<()> {
        self.enter("set_frame_value".to_string()).await?;
        let mut state = self.state();
        let frame = state.live_frame(thread, frame)?;
        let local = frame
            .locals
            .iter_mut()
            .find(|(v, _)| v.slot == slot.slot)
            .ok_or_else(|| EvaluationError::Protocol(format!("invalid slot {}", slot.slot)))?;
        local.1 = value.clone();
        Ok(())
    }

    async fn create_string(&self, text: &str) -> EvalResult<RemoteValue> {
        self.enter("create_string".to_string()).await?;
        Ok(self.new_string(text))
    }

    async fn string_value(&self, string: &ObjectHandle) -> EvalResult<String> {
        self.enter("string_value".to_string()).await?;
        self.state()
            .strings
            .get(&string.id)
            .cloned()
            .ok_or(EvaluationError::StaleHandle)
    }

    async fn type_signature(&self, value: &RemoteValue) -> EvalResult<String> {
        self.enter("type_signature".to_string()).await?;
        self.state().runtime_class(value)
    }

    async fn supertypes(&self, signature: &str) -> EvalResult<Vec<String>> {
        self.enter(format!("supertypes {}", signature)).await?;
        let state = self.state();
        let (_, class) = state.class(signature)?;
        Ok(class
            .superclass
            .iter()
            .chain(class.interfaces.iter())
            .cloned()
            .collect())
    }

    async fn array_length(&self, array: &ArrayHandle) -> EvalResult<i32> {
        self.enter("array_length".to_string()).await?;
        self.state()
            .arrays
            .get(&array.id)
            .map(|a| a.values.len() as i32)
            .ok_or(EvaluationError::StaleHandle)
    }

    async fn array_get(&self, array: &ArrayHandle, index: i32) -> EvalResult<RemoteValue> {
        self.enter(format!("array_get {}", index)).await?;
        let state = self.state();
        let array = state.arrays.get(&array.id).ok_or(EvaluationError::StaleHandle)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| array.values.get(i))
            .cloned()
            .ok_or_else(|| EvaluationError::Protocol("JDWP error 503 (INVALID_INDEX)".to_string()))
    }

    async fn array_set(
        &self,
        array: &ArrayHandle,
        index: i32,
        value: &RemoteValue,
    ) -> EvalResult<()> {
        self.enter(format!("array_set {}", index)).await?;
        let mut state = self.state();
        let array = state.arrays.get_mut(&array.id).ok_or(EvaluationError::StaleHandle)?;
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| array.values.get_mut(i))
            .ok_or_else(|| {
                EvaluationError::Protocol("JDWP error 503 (INVALID_INDEX)".to_string())
            })?;
        *slot = value.clone();
        Ok(())
    }

    async fn new_array(&self, signature: &str, length: i32) -> EvalResult<RemoteValue> {
        self.enter(format!("new_array {}", signature)).await?;
        let handle = ArrayHandle::from_signature(0, signature)?;
        let fill = match &handle.element {
            ElementType::Primitive(kind) => RemoteValue::Primitive(Primitive::default_of(*kind)),
            ElementType::Reference(_) => RemoteValue::Null,
        };
        let values = vec![fill; length.max(0) as usize];
        self.state().new_array(signature, values)
    }

    async fn instance_field(&self, receiver: &RemoteValue, name: &str) -> EvalResult<FieldRef> {
        self.enter(format!("instance_field {}", name)).await?;
        let class = self.state().runtime_class(receiver)?;
        if class.starts_with('[') {
            return Err(EvaluationError::NoSuchField(format!("{} in {}", name, class)));
        }
        self.find_field(&class, name)
    }

    async fn static_field(&self, class: &str, name: &str) -> EvalResult<FieldRef> {
        self.enter(format!("static_field {}", name)).await?;
        let field = self.find_field(class, name)?;
        if !field.is_static {
            return Err(EvaluationError::NoSuchField(format!("static {} in {}", name, class)));
        }
        Ok(field)
    }

    async fn get_field(
        &self,
        receiver: Option<&RemoteValue>,
        field: &FieldRef,
    ) -> EvalResult<RemoteValue> {
        self.enter(format!("get_field {}", field.name)).await?;
        let state = self.state();
        if field.is_static {
            return state
                .statics
                .get(&(field.declaring_type, field.name.clone()))
                .cloned()
                .ok_or_else(|| EvaluationError::NoSuchField(field.name.clone()));
        }
        let id = receiver
            .and_then(RemoteValue::object_id)
            .ok_or(EvaluationError::NullReceiver)?;
        state
            .objects
            .get(&id)
            .ok_or(EvaluationError::StaleHandle)?
            .fields
            .get(&field.name)
            .cloned()
            .ok_or_else(|| EvaluationError::NoSuchField(field.name.clone()))
    }

    async fn set_field(
        &self,
        receiver: Option<&RemoteValue>,
        field: &FieldRef,
        value: &RemoteValue,
    ) -> EvalResult<()> {
        self.enter(format!("set_field {}", field.name)).await?;
        let mut state = self.state();
        if field.is_static {
            state
                .statics
                .insert((field.declaring_type, field.name.clone()), value.clone());
            return Ok(());
        }
        let id = receiver
            .and_then(RemoteValue::object_id)
            .ok_or(EvaluationError::NullReceiver)?;
        state
            .objects
            .get_mut(&id)
            .ok_or(EvaluationError::StaleHandle)?
            .fields
            .insert(field.name.clone(), value.clone());
        Ok(())
    }

    async fn instance_method(
        &self,
        receiver: &RemoteValue,
        selector: &MethodSelector,
    ) -> EvalResult<MethodRef> {
        self.enter(format!("instance_method {}", selector.name)).await?;
        let class = self.state().runtime_class(receiver)?;
        // Arrays only have the methods of Object
        let class = if class.starts_with('[') { OBJECT.to_string() } else { class };
        self.find_method(&class, selector, false, true)
    }

    async fn static_method(&self, class: &str, selector: &MethodSelector) -> EvalResult<MethodRef> {
        self.enter(format!("static_method {}", selector.name)).await?;
        self.find_method(class, selector, true, true)
    }

    async fn constructor(&self, class: &str, selector: &MethodSelector) -> EvalResult<MethodRef> {
        self.enter(format!("constructor {}", class)).await?;
        self.find_method(class, selector, false, false)
    }

    async fn invoke(
        &self,
        _thread: ThreadId,
        receiver: Option<&RemoteValue>,
        method: &MethodRef,
        args: &[RemoteValue],
    ) -> EvalResult<InvokeOutcome> {
        self.enter(format!("invoke {}", method.name)).await?;
        let body = self.body(method)?;
        let receiver = receiver.cloned().unwrap_or(RemoteValue::Null);
        Ok(body(self, &receiver, args))
    }

    async fn new_instance(
        &self,
        _thread: ThreadId,
        constructor: &MethodRef,
        args: &[RemoteValue],
    ) -> EvalResult<InvokeOutcome> {
        self.enter("new_instance".to_string()).await?;
        let body = self.body(constructor)?;
        let class = self
            .state()
            .classes
            .get(&constructor.declaring_type)
            .map(|c| c.signature.clone())
            .ok_or_else(|| EvaluationError::NoSuchClass(constructor.name.clone()))?;
        let object = self.new_object(&class);

        Ok(match body(self, &object, args) {
            InvokeOutcome::Returned(_) => InvokeOutcome::Returned(object),
            threw => threw,
        })
    }
}
