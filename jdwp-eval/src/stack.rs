// Execution stack for one evaluation
//
// Holds the operand stack, a small table of instruction temporaries, the
// locals declared by the snippet itself and the exception-in-flight marker.
// None of these outlive the evaluation that created them.

use crate::error::{EvalResult, EvaluationError};
use crate::numeric;
use crate::value::{ObjectHandle, RemoteValue};
use std::collections::HashMap;

/// Number of temporary slots available to an instruction sequence
pub const TEMP_SLOTS: usize = 8;

#[derive(Debug, Default)]
pub struct ExecutionStack {
    values: Vec<RemoteValue>,
    temps: [Option<RemoteValue>; TEMP_SLOTS],
    locals: HashMap<String, RemoteValue>,
    exception: Option<ObjectHandle>,
}

impl ExecutionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: RemoteValue) {
        self.values.push(value);
    }

    pub fn pop(&mut self) -> EvalResult<RemoteValue> {
        self.values.pop().ok_or(EvaluationError::StackUnderflow)
    }

    /// Pop `count` values, returned in the order they were pushed
    pub fn pop_n(&mut self, count: usize) -> EvalResult<Vec<RemoteValue>> {
        if count > self.values.len() {
            return Err(EvaluationError::StackUnderflow);
        }
        let start = self.values.len() - count;
        Ok(self.values.split_off(start))
    }

    pub fn peek(&self) -> EvalResult<&RemoteValue> {
        self.values.last().ok_or(EvaluationError::StackUnderflow)
    }

    pub fn dup(&mut self) -> EvalResult<()> {
        let top = self.peek()?.clone();
        self.values.push(top);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the stack, yielding its only value
    pub fn into_result(mut self) -> EvalResult<RemoteValue> {
        match self.values.len() {
            1 => self.pop(),
            depth => Err(EvaluationError::MalformedResult { depth }),
        }
    }

    pub fn temp(&self, slot: usize) -> EvalResult<RemoteValue> {
        match self.temps.get(slot) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(EvaluationError::MalformedSequence(format!(
                "temporary slot {} read before it was written",
                slot
            ))),
            None => Err(slot_out_of_range(slot)),
        }
    }

    pub fn set_temp(&mut self, slot: usize, value: RemoteValue) -> EvalResult<()> {
        let entry = self.temps.get_mut(slot).ok_or_else(|| slot_out_of_range(slot))?;
        *entry = Some(value);
        Ok(())
    }

    pub fn declare_local(&mut self, name: &str, initial: RemoteValue) -> EvalResult<()> {
        if self.locals.contains_key(name) {
            return Err(EvaluationError::MalformedSequence(format!(
                "local {} declared twice",
                name
            )));
        }
        self.locals.insert(name.to_string(), initial);
        Ok(())
    }

    pub fn local(&self, name: &str) -> Option<&RemoteValue> {
        self.locals.get(name)
    }

    /// Assign a snippet local. Primitive locals keep the kind of their
    /// initializer and accept widening conversions; reference locals accept
    /// any reference. Returns false when no such local was declared.
    pub fn assign_local(&mut self, name: &str, value: RemoteValue) -> EvalResult<bool> {
        let Some(current) = self.locals.get_mut(name) else {
            return Ok(false);
        };

        let converted = match (&*current, value) {
            (RemoteValue::Primitive(old), RemoteValue::Primitive(new))
                if new.kind().widens_to(old.kind()) =>
            {
                RemoteValue::Primitive(numeric::cast(new, old.kind())?)
            }
            (old, new) if old.is_reference() && new.is_reference() => new,
            (old, new) => {
                return Err(EvaluationError::TypeMismatch(format!(
                    "cannot assign {} to local {} of type {}",
                    new.type_name(),
                    name,
                    old.type_name()
                )))
            }
        };
        *current = converted;
        Ok(true)
    }

    pub fn set_exception(&mut self, exception: ObjectHandle) {
        self.exception = Some(exception);
    }

    pub fn take_exception(&mut self) -> Option<ObjectHandle> {
        self.exception.take()
    }
}

fn slot_out_of_range(slot: usize) -> EvaluationError {
    EvaluationError::MalformedSequence(format!(
        "temporary slot {} out of range (0..{})",
        slot, TEMP_SLOTS
    ))
}
