// Field access and method invocation

use crate::context::EvaluationContext;
use crate::error::{EvalResult, EvaluationError};
use crate::remote::{InvokeOutcome, MethodSelector};
use crate::stack::ExecutionStack;
use crate::value::RemoteValue;

fn check_receiver(receiver: &RemoteValue, member: &str) -> EvalResult<()> {
    match receiver {
        RemoteValue::Object(_) | RemoteValue::Array(_) => Ok(()),
        RemoteValue::Null => Err(EvaluationError::NullReceiver),
        other => Err(EvaluationError::TypeMismatch(format!(
            "{} has no member {}",
            other.type_name(),
            member
        ))),
    }
}

pub(super) async fn get_field(
    name: &str,
    stack: &mut ExecutionStack,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let receiver = stack.pop()?;
    check_receiver(&receiver, name)?;

    if let RemoteValue::Array(array) = &receiver {
        if name == "length" {
            let length = ctx.vm().array_length(array).await?;
            stack.push(RemoteValue::int(length));
            return Ok(());
        }
    }

    let field = ctx.vm().instance_field(&receiver, name).await?;
    let value = ctx.vm().get_field(Some(&receiver), &field).await?;
    stack.push(value);
    Ok(())
}

pub(super) async fn set_field(
    name: &str,
    stack: &mut ExecutionStack,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let value = stack.pop()?;
    let receiver = stack.pop()?;
    check_receiver(&receiver, name)?;

    let field = ctx.vm().instance_field(&receiver, name).await?;
    let value = ctx.assign(value, &field.signature).await?;
    ctx.vm().set_field(Some(&receiver), &field, &value).await
}

pub(super) async fn get_static(
    class: &str,
    name: &str,
    stack: &mut ExecutionStack,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let field = ctx.vm().static_field(class, name).await?;
    let value = ctx.vm().get_field(None, &field).await?;
    stack.push(value);
    Ok(())
}

pub(super) async fn set_static(
    class: &str,
    name: &str,
    stack: &mut ExecutionStack,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let value = stack.pop()?;
    let field = ctx.vm().static_field(class, name).await?;
    let value = ctx.assign(value, &field.signature).await?;
    ctx.vm().set_field(None, &field, &value).await
}

/// Push the return value, or raise the in-flight exception marker
fn complete(stack: &mut ExecutionStack, outcome: InvokeOutcome) {
    match outcome {
        InvokeOutcome::Returned(value) => stack.push(value),
        InvokeOutcome::Threw(exception) => stack.set_exception(exception),
    }
}

pub(super) async fn invoke(
    selector: &MethodSelector,
    stack: &mut ExecutionStack,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let args = stack.pop_n(selector.arity)?;
    let receiver = stack.pop()?;
    let outcome = ctx.invoke(&receiver, selector, args).await?;
    complete(stack, outcome);
    Ok(())
}

pub(super) async fn invoke_static(
    class: &str,
    selector: &MethodSelector,
    stack: &mut ExecutionStack,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let args = stack.pop_n(selector.arity)?;
    let outcome = ctx.invoke_static(class, selector, args).await?;
    complete(stack, outcome);
    Ok(())
}

pub(super) async fn construct(
    class: &str,
    selector: &MethodSelector,
    stack: &mut ExecutionStack,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let args = stack.pop_n(selector.arity)?;
    let outcome = ctx.construct(class, selector, args).await?;
    complete(stack, outcome);
    Ok(())
}
