// Operators, casts and type tests

use crate::context::EvaluationContext;
use crate::error::{EvalResult, EvaluationError};
use crate::numeric::{self, BinaryOp, UnaryOp};
use crate::signature;
use crate::stack::ExecutionStack;
use crate::value::{Primitive, PrimitiveKind, RemoteValue};

pub(super) fn binary(op: BinaryOp, stack: &mut ExecutionStack) -> EvalResult<()> {
    let right = stack.pop()?;
    let left = stack.pop()?;

    let result = match (&left, &right) {
        (RemoteValue::Primitive(l), RemoteValue::Primitive(r)) => {
            RemoteValue::Primitive(numeric::binary(op, *l, *r)?)
        }
        // Reference equality compares handles, never contents
        (l, r)
            if l.is_reference()
                && r.is_reference()
                && matches!(op, BinaryOp::Eq | BinaryOp::Ne) =>
        {
            RemoteValue::boolean(l.same_object(r) == (op == BinaryOp::Eq))
        }
        (l, r) => {
            return Err(EvaluationError::TypeMismatch(format!(
                "bad operand types for {}: {} and {}",
                op.symbol(),
                l.type_name(),
                r.type_name()
            )))
        }
    };
    stack.push(result);
    Ok(())
}

pub(super) fn unary(op: UnaryOp, stack: &mut ExecutionStack) -> EvalResult<()> {
    match stack.pop()? {
        RemoteValue::Primitive(p) => {
            stack.push(RemoteValue::Primitive(numeric::unary(op, p)?));
            Ok(())
        }
        other => Err(EvaluationError::TypeMismatch(format!(
            "bad operand type {} for unary operator",
            other.type_name()
        ))),
    }
}

pub(super) async fn cast(
    target: &str,
    stack: &mut ExecutionStack,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let value = stack.pop()?;

    if let Some(kind) = PrimitiveKind::from_signature(target) {
        return match value {
            RemoteValue::Primitive(p) => {
                stack.push(RemoteValue::Primitive(numeric::cast(p, kind)?));
                Ok(())
            }
            other => Err(EvaluationError::IllegalCast {
                from: other.type_name(),
                to: kind.name().to_string(),
            }),
        };
    }

    match &value {
        RemoteValue::Null => {}
        RemoteValue::Object(_) | RemoteValue::Array(_) => {
            if !ctx.instance_of(&value, target).await? {
                let runtime = ctx.vm().type_signature(&value).await?;
                return Err(EvaluationError::IllegalCast {
                    from: signature::type_name(&runtime),
                    to: signature::type_name(target),
                });
            }
        }
        other => {
            return Err(EvaluationError::IllegalCast {
                from: other.type_name(),
                to: signature::type_name(target),
            })
        }
    }
    stack.push(value);
    Ok(())
}

pub(super) async fn instance_of(
    target: &str,
    stack: &mut ExecutionStack,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let value = stack.pop()?;
    let result = match &value {
        RemoteValue::Null => false,
        RemoteValue::Object(_) | RemoteValue::Array(_) => ctx.instance_of(&value, target).await?,
        other => {
            return Err(EvaluationError::TypeMismatch(format!(
                "instanceof needs a reference, got {}",
                other.type_name()
            )))
        }
    };
    stack.push(RemoteValue::boolean(result));
    Ok(())
}

pub(super) fn pop_condition(stack: &mut ExecutionStack) -> EvalResult<bool> {
    match stack.pop()? {
        RemoteValue::Primitive(Primitive::Boolean(b)) => Ok(b),
        other => Err(EvaluationError::TypeMismatch(format!(
            "condition must be boolean, got {}",
            other.type_name()
        ))),
    }
}
