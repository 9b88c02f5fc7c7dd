// Instruction set
//
// One compiled expression is a flat sequence of these. Each instruction pops
// its operands (listed bottom to top), performs at most a few remote round
// trips and pushes its result.

mod array;
mod member;
mod operator;

use crate::context::EvaluationContext;
use crate::error::EvalResult;
use crate::numeric::{BinaryOp, UnaryOp};
use crate::remote::MethodSelector;
use crate::stack::ExecutionStack;
use crate::value::RemoteValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    /// Push a value that needs no remote call
    PushLiteral(RemoteValue),
    /// Create a string in the target and push it
    PushString(String),
    PushThis,
    /// Snippet locals shadow frame locals
    PushLocal(String),
    StoreLocal(String),
    /// Pops the initializer
    DeclareLocal(String),
    LoadTemp(usize),
    StoreTemp(usize),
    Pop,
    Dup,
    /// index, array → element
    ArrayLoad,
    /// value, index, array → nothing
    ArrayStore,
    ArrayLength,
    /// length → new array of the given array type signature
    NewArray(String),
    /// receiver → value; `length` on an array reads its length
    FieldGet(String),
    /// receiver, value → nothing
    FieldSet(String),
    StaticFieldGet {
        class: String,
        name: String,
    },
    StaticFieldSet {
        class: String,
        name: String,
    },
    /// receiver, arg1..argN → return value
    Invoke(MethodSelector),
    InvokeStatic {
        class: String,
        method: MethodSelector,
    },
    New {
        class: String,
        constructor: MethodSelector,
    },
    Cast(String),
    InstanceOf(String),
    Binary(BinaryOp),
    Unary(UnaryOp),
    Jump(usize),
    JumpIfTrue(usize),
    JumpIfFalse(usize),
}

/// Where control goes after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Next,
    Jump(usize),
}

impl Instruction {
    pub(crate) async fn execute(
        &self,
        stack: &mut ExecutionStack,
        ctx: &EvaluationContext,
    ) -> EvalResult<Flow> {
        use Instruction::*;

        match self {
            PushLiteral(value) => stack.push(value.clone()),
            PushString(text) => {
                let string = ctx.vm().create_string(text).await?;
                stack.push(string);
            }
            PushThis => {
                let receiver = ctx.current_receiver().await?;
                stack.push(receiver);
            }
            PushLocal(name) => {
                let value = match stack.local(name) {
                    Some(value) => value.clone(),
                    None => ctx.local_variable(name).await?,
                };
                stack.push(value);
            }
            StoreLocal(name) => {
                let value = stack.pop()?;
                if !stack.assign_local(name, value.clone())? {
                    ctx.set_local_variable(name, value).await?;
                }
            }
            DeclareLocal(name) => {
                let initial = stack.pop()?;
                stack.declare_local(name, initial)?;
            }
            LoadTemp(slot) => {
                let value = stack.temp(*slot)?;
                stack.push(value);
            }
            StoreTemp(slot) => {
                let value = stack.pop()?;
                stack.set_temp(*slot, value)?;
            }
            Pop => {
                stack.pop()?;
            }
            Dup => stack.dup()?,
            ArrayLoad => array::load(stack, ctx).await?,
            ArrayStore => array::store(stack, ctx).await?,
            ArrayLength => array::length(stack, ctx).await?,
            NewArray(signature) => array::allocate(signature, stack, ctx).await?,
            FieldGet(name) => member::get_field(name, stack, ctx).await?,
            FieldSet(name) => member::set_field(name, stack, ctx).await?,
            StaticFieldGet { class, name } => member::get_static(class, name, stack, ctx).await?,
            StaticFieldSet { class, name } => member::set_static(class, name, stack, ctx).await?,
            Invoke(selector) => member::invoke(selector, stack, ctx).await?,
            InvokeStatic { class, method } => {
                member::invoke_static(class, method, stack, ctx).await?
            }
            New { class, constructor } => member::construct(class, constructor, stack, ctx).await?,
            Cast(signature) => operator::cast(signature, stack, ctx).await?,
            InstanceOf(signature) => operator::instance_of(signature, stack, ctx).await?,
            Binary(op) => operator::binary(*op, stack)?,
            Unary(op) => operator::unary(*op, stack)?,
            Jump(target) => return Ok(Flow::Jump(*target)),
            JumpIfTrue(target) => {
                if operator::pop_condition(stack)? {
                    return Ok(Flow::Jump(*target));
                }
            }
            JumpIfFalse(target) => {
                if !operator::pop_condition(stack)? {
                    return Ok(Flow::Jump(*target));
                }
            }
        }
        Ok(Flow::Next)
    }
}
