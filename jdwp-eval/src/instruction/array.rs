// Array instructions
//
// Operand checks run in a fixed order: null array, non-array operand, index
// type, then bounds. All of them complete before any element is touched
// remotely, so an invalid index never reaches the target.

use crate::context::EvaluationContext;
use crate::error::{EvalResult, EvaluationError};
use crate::stack::ExecutionStack;
use crate::value::{ArrayHandle, RemoteValue};

fn pop_array(stack: &mut ExecutionStack) -> EvalResult<ArrayHandle> {
    match stack.pop()? {
        RemoteValue::Array(handle) => Ok(handle),
        RemoteValue::Null => Err(EvaluationError::NullArrayReference),
        other => Err(EvaluationError::NotAnArray(other.type_name())),
    }
}

/// Pop an int-typed operand (byte, short and char promote)
fn pop_int(stack: &mut ExecutionStack, what: &str) -> EvalResult<i32> {
    let value = stack.pop()?;
    match &value {
        RemoteValue::Primitive(p) => p.as_int_index(),
        _ => None,
    }
    .ok_or_else(|| {
        EvaluationError::TypeMismatch(format!("{} must be an int, got {}", what, value.type_name()))
    })
}

async fn check_bounds(ctx: &EvaluationContext, array: &ArrayHandle, index: i32) -> EvalResult<()> {
    let length = ctx.vm().array_length(array).await?;
    if index < 0 || index >= length {
        return Err(EvaluationError::IndexOutOfRange { index, length });
    }
    Ok(())
}

pub(super) async fn load(stack: &mut ExecutionStack, ctx: &EvaluationContext) -> EvalResult<()> {
    let array = pop_array(stack)?;
    let index = pop_int(stack, "array index")?;
    check_bounds(ctx, &array, index).await?;

    let element = ctx.vm().array_get(&array, index).await?;
    stack.push(element);
    Ok(())
}

pub(super) async fn store(stack: &mut ExecutionStack, ctx: &EvaluationContext) -> EvalResult<()> {
    let array = pop_array(stack)?;
    let index = pop_int(stack, "array index")?;
    let value = stack.pop()?;
    check_bounds(ctx, &array, index).await?;

    let value = ctx.assign(value, &array.element.signature()).await?;
    ctx.vm().array_set(&array, index, &value).await
}

pub(super) async fn length(stack: &mut ExecutionStack, ctx: &EvaluationContext) -> EvalResult<()> {
    let array = pop_array(stack)?;
    let length = ctx.vm().array_length(&array).await?;
    stack.push(RemoteValue::int(length));
    Ok(())
}

pub(super) async fn allocate(
    signature: &str,
    stack: &mut ExecutionStack,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    if !signature.starts_with('[') {
        return Err(EvaluationError::MalformedSequence(format!(
            "new_array needs an array type, got {}",
            signature
        )));
    }
    let length = pop_int(stack, "array size")?;
    if length < 0 {
        return Err(EvaluationError::NegativeArraySize(length));
    }

    let array = ctx.vm().new_array(signature, length).await?;
    stack.push(array);
    Ok(())
}
