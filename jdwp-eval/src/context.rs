// Evaluation context: one suspended (thread, frame) in the target
//
// The context resolves names against the frame, performs remote invocations
// on the bound thread, and re-validates the frame after every call that lets
// the thread run.

use crate::error::{EvalResult, EvaluationError};
use crate::numeric;
use crate::remote::{InvokeOutcome, MethodRef, MethodSelector, RemoteVm};
use crate::signature;
use crate::value::{ObjectHandle, PrimitiveKind, RemoteValue};
use jdwp_client::reftype::parameter_signatures;
use jdwp_client::types::{FrameId, FrameInfo, Location, ThreadId, Variable};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

/// Where a frame local lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSlot {
    pub slot: u32,
    pub signature: String,
}

/// Local variable names visible in the bound frame
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    slots: HashMap<String, LocalSlot>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables of a method's table that are live at `code_index`
    pub fn from_variables(variables: &[Variable], code_index: u64) -> Self {
        let slots = variables
            .iter()
            .filter(|v| v.is_live_at(code_index))
            .map(|v| {
                (
                    v.name.clone(),
                    LocalSlot {
                        slot: v.slot,
                        signature: v.signature.clone(),
                    },
                )
            })
            .collect();
        Self { slots }
    }

    pub fn insert(&mut self, name: impl Into<String>, slot: LocalSlot) {
        self.slots.insert(name.into(), slot);
    }

    pub fn get(&self, name: &str) -> Option<&LocalSlot> {
        self.slots.get(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// The suspended execution point an evaluation is bound to. The frame id may
/// change across invocations; the method it points into may not.
#[derive(Debug)]
pub struct FrameBinding {
    pub thread: ThreadId,
    pub depth: usize,
    pub location: Location,
    frame_id: AtomicU64,
}

impl FrameBinding {
    pub fn new(thread: ThreadId, depth: usize, frame: &FrameInfo) -> Self {
        Self {
            thread,
            depth,
            location: frame.location,
            frame_id: AtomicU64::new(frame.frame_id),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id.load(Ordering::SeqCst)
    }
}

pub struct EvaluationContext {
    vm: Arc<dyn RemoteVm>,
    binding: FrameBinding,
    symbols: SymbolTable,
    // Held for the context's lifetime; serializes evaluations per thread
    _thread_guard: Option<OwnedMutexGuard<()>>,
}

impl EvaluationContext {
    /// Build a context without taking the thread's evaluation lock. Callers
    /// that share a VM between tasks should go through `Evaluator::bind`.
    pub fn new(vm: Arc<dyn RemoteVm>, binding: FrameBinding, symbols: SymbolTable) -> Self {
        Self {
            vm,
            binding,
            symbols,
            _thread_guard: None,
        }
    }

    pub(crate) fn with_guard(mut self, guard: OwnedMutexGuard<()>) -> Self {
        self._thread_guard = Some(guard);
        self
    }

    pub fn vm(&self) -> &dyn RemoteVm {
        self.vm.as_ref()
    }

    pub fn thread(&self) -> ThreadId {
        self.binding.thread
    }

    pub fn binding(&self) -> &FrameBinding {
        &self.binding
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// `this` of the bound frame, `Null` in static frames
    pub async fn current_receiver(&self) -> EvalResult<RemoteValue> {
        self.vm
            .this_object(self.binding.thread, self.binding.frame_id())
            .await
    }

    fn slot(&self, name: &str) -> EvalResult<&LocalSlot> {
        self.symbols
            .get(name)
            .ok_or_else(|| EvaluationError::NoSuchVariable(name.to_string()))
    }

    pub async fn local_variable(&self, name: &str) -> EvalResult<RemoteValue> {
        let slot = self.slot(name)?.clone();
        let mut values = self
            .vm
            .frame_values(self.binding.thread, self.binding.frame_id(), &[slot])
            .await?;
        values
            .pop()
            .ok_or_else(|| {
                EvaluationError::Protocol(format!("no value returned for local {}", name))
            })
    }

    pub async fn set_local_variable(&self, name: &str, value: RemoteValue) -> EvalResult<()> {
        let slot = self.slot(name)?.clone();
        let value = self.assign(value, &slot.signature).await?;
        self.vm
            .set_frame_value(self.binding.thread, self.binding.frame_id(), &slot, &value)
            .await
    }

    /// Check that `value` can be stored where `declared` is the declared type,
    /// applying widening primitive conversion
    pub async fn assign(&self, value: RemoteValue, declared: &str) -> EvalResult<RemoteValue> {
        let mismatch = |value: &RemoteValue| {
            EvaluationError::TypeMismatch(format!(
                "{} is not assignable to {}",
                value.type_name(),
                signature::type_name(declared)
            ))
        };

        if let Some(kind) = PrimitiveKind::from_signature(declared) {
            return match value {
                RemoteValue::Primitive(p) if p.kind().widens_to(kind) => {
                    Ok(RemoteValue::Primitive(numeric::cast(p, kind)?))
                }
                other => Err(mismatch(&other)),
            };
        }

        match &value {
            RemoteValue::Null => Ok(value),
            RemoteValue::Object(_) | RemoteValue::Array(_) => {
                if self.instance_of(&value, declared).await? {
                    Ok(value)
                } else {
                    Err(mismatch(&value))
                }
            }
            RemoteValue::Primitive(_) | RemoteValue::Void => Err(mismatch(&value)),
        }
    }

    /// Runtime type test for an object or array against a reference type
    pub async fn instance_of(&self, value: &RemoteValue, target: &str) -> EvalResult<bool> {
        let runtime = self.vm.type_signature(value).await?;
        signature::is_assignable(self.vm.as_ref(), &runtime, target).await
    }

    /// Invoke an instance method on `receiver` in the bound thread
    pub async fn invoke(
        &self,
        receiver: &RemoteValue,
        selector: &MethodSelector,
        args: Vec<RemoteValue>,
    ) -> EvalResult<InvokeOutcome> {
        if receiver.is_null() {
            return Err(EvaluationError::NullReceiver);
        }
        if !matches!(receiver, RemoteValue::Object(_) | RemoteValue::Array(_)) {
            return Err(EvaluationError::TypeMismatch(format!(
                "cannot invoke {} on {}",
                selector,
                receiver.type_name()
            )));
        }

        let method = self.vm.instance_method(receiver, selector).await?;
        let args = self.convert_arguments(&method, args).await?;
        debug!("Invoking {} on thread {:x}", method.name, self.binding.thread);

        let outcome = self
            .vm
            .invoke(self.binding.thread, Some(receiver), &method, &args)
            .await?;
        self.revalidate().await?;
        Ok(outcome)
    }

    pub async fn invoke_static(
        &self,
        class: &str,
        selector: &MethodSelector,
        args: Vec<RemoteValue>,
    ) -> EvalResult<InvokeOutcome> {
        let method = self.vm.static_method(class, selector).await?;
        let args = self.convert_arguments(&method, args).await?;
        debug!("Invoking static {}.{}", signature::type_name(class), method.name);

        let outcome = self
            .vm
            .invoke(self.binding.thread, None, &method, &args)
            .await?;
        self.revalidate().await?;
        Ok(outcome)
    }

    /// Construct a new instance of `class`
    pub async fn construct(
        &self,
        class: &str,
        selector: &MethodSelector,
        args: Vec<RemoteValue>,
    ) -> EvalResult<InvokeOutcome> {
        let constructor = self.vm.constructor(class, selector).await?;
        let args = self.convert_arguments(&constructor, args).await?;
        debug!("Constructing {}", signature::type_name(class));

        let outcome = self
            .vm
            .new_instance(self.binding.thread, &constructor, &args)
            .await?;
        self.revalidate().await?;
        Ok(outcome)
    }

    async fn convert_arguments(
        &self,
        method: &MethodRef,
        args: Vec<RemoteValue>,
    ) -> EvalResult<Vec<RemoteValue>> {
        let params = parameter_signatures(&method.signature);
        if params.len() != args.len() {
            return Err(EvaluationError::NoSuchMethod(format!(
                "{}{} takes {} arguments, {} given",
                method.name,
                method.signature,
                params.len(),
                args.len()
            )));
        }

        let mut converted = Vec::with_capacity(args.len());
        for (arg, param) in args.into_iter().zip(params) {
            converted.push(self.assign(arg, param).await?);
        }
        Ok(converted)
    }

    /// Re-fetch the bound frame after the thread ran. The frame id may be
    /// reissued; a different method at the same depth means our frame is gone.
    async fn revalidate(&self) -> EvalResult<()> {
        let frame = self
            .vm
            .frame(self.binding.thread, self.binding.depth)
            .await?;

        if !frame.location.same_method(&self.binding.location) {
            warn!(
                "Frame {} of thread {:x} changed method during invocation",
                self.binding.depth, self.binding.thread
            );
            return Err(EvaluationError::StaleFrame(format!(
                "frame {} no longer executes the evaluated method",
                self.binding.depth
            )));
        }

        let previous = self.binding.frame_id.swap(frame.frame_id, Ordering::SeqCst);
        if previous != frame.frame_id {
            debug!("Frame id reissued: {:x} -> {:x}", previous, frame.frame_id);
        }
        Ok(())
    }

    /// `<class name>: <detail message>`, or just the class name when the
    /// exception carries no message
    pub async fn exception_description(&self, exception: &ObjectHandle) -> EvalResult<String> {
        let value = RemoteValue::Object(exception.clone());
        let class = signature::type_name(&self.vm.type_signature(&value).await?);

        let get_message = MethodSelector::with_signature("getMessage", "()Ljava/lang/String;");
        let message = match self.invoke(&value, &get_message, Vec::new()).await {
            Ok(InvokeOutcome::Returned(RemoteValue::Object(text))) => {
                Some(self.vm.string_value(&text).await?)
            }
            Ok(_) => None,
            Err(e) if e.is_connection_loss() => return Err(e),
            Err(e) => {
                debug!("No detail message for {}: {}", class, e);
                None
            }
        };

        Ok(match message {
            Some(message) => format!("{}: {}", class, message),
            None => class,
        })
    }

    /// Render a value for presentation, fetching class names and string
    /// contents as needed
    pub async fn describe(&self, value: &RemoteValue) -> EvalResult<String> {
        match value {
            RemoteValue::Object(handle) if handle.is_string() => {
                let text = self.vm.string_value(handle).await?;
                Ok(format!("{:?}", text))
            }
            RemoteValue::Object(handle) => {
                let signature = self.vm.type_signature(value).await?;
                Ok(format!("(object) {} @{:x}", signature, handle.id))
            }
            RemoteValue::Array(handle) => {
                let length = self.vm.array_length(handle).await?;
                Ok(format!("(array) {} @{:x} length {}", handle.signature(), handle.id, length))
            }
            other => Ok(other.to_string()),
        }
    }
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("binding", &self.binding)
            .field("symbols", &self.symbols.len())
            .finish()
    }
}
