// Interpreter loop
//
// Ready -> Running -> Completed | Failed. Instructions run strictly in order.
// Cancellation is checked at every instruction boundary; a remote call that
// is already outstanding always runs to completion first.

use crate::context::EvaluationContext;
use crate::error::{EvalResult, EvaluationError};
use crate::instruction::{Flow, Instruction};
use crate::stack::ExecutionStack;
use crate::value::RemoteValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterState {
    Ready,
    Running { pc: usize },
    Completed,
    Failed,
}

pub struct Interpreter<'a> {
    instructions: &'a [Instruction],
    ctx: &'a EvaluationContext,
    cancel: Option<CancellationToken>,
    state: InterpreterState,
}

impl<'a> Interpreter<'a> {
    pub fn new(instructions: &'a [Instruction], ctx: &'a EvaluationContext) -> Self {
        Self {
            instructions,
            ctx,
            cancel: None,
            state: InterpreterState::Ready,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn state(&self) -> InterpreterState {
        self.state
    }

    /// Run the sequence to completion. An interpreter runs once.
    pub async fn run(&mut self) -> EvalResult<RemoteValue> {
        if self.state != InterpreterState::Ready {
            return Err(EvaluationError::MalformedSequence(format!(
                "interpreter is {:?}, not ready",
                self.state
            )));
        }
        debug!(
            "Evaluating {} instructions on thread {:x}",
            self.instructions.len(),
            self.ctx.thread()
        );

        let result = self.execute().await;
        match &result {
            Ok(value) => {
                self.state = InterpreterState::Completed;
                debug!("Evaluation completed: {}", value);
            }
            Err(e) => {
                let at = self.state;
                self.state = InterpreterState::Failed;
                if e.is_internal() {
                    error!("Malformed instruction sequence ({:?}): {}", at, e);
                } else if *e == EvaluationError::Cancelled {
                    debug!("Evaluation cancelled at {:?}", at);
                } else if e.is_connection_loss() {
                    warn!("Evaluation lost the target: {}", e);
                } else {
                    debug!("Evaluation failed at {:?}: {}", at, e);
                }
            }
        }
        result
    }

    async fn execute(&mut self) -> EvalResult<RemoteValue> {
        let mut stack = ExecutionStack::new();
        let len = self.instructions.len();
        let mut pc = 0;

        while pc < len {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                return Err(EvaluationError::Cancelled);
            }
            self.state = InterpreterState::Running { pc };

            let instruction = &self.instructions[pc];
            trace!("{:>4}: {:?}", pc, instruction);
            let flow = instruction.execute(&mut stack, self.ctx).await?;

            if let Some(exception) = stack.take_exception() {
                let description = self.ctx.exception_description(&exception).await?;
                return Err(EvaluationError::RemoteException {
                    description,
                    exception: exception.id,
                });
            }

            pc = match flow {
                Flow::Next => pc + 1,
                Flow::Jump(target) if target <= len => target,
                Flow::Jump(target) => {
                    return Err(EvaluationError::MalformedSequence(format!(
                        "jump from {} to {} outside 0..={}",
                        pc, target, len
                    )))
                }
            };
        }

        stack.into_result()
    }
}

/// Run `instructions` in `ctx` and return the single resulting value
pub async fn evaluate(
    instructions: &[Instruction],
    ctx: &EvaluationContext,
) -> EvalResult<RemoteValue> {
    Interpreter::new(instructions, ctx).run().await
}

pub async fn evaluate_with_cancel(
    instructions: &[Instruction],
    ctx: &EvaluationContext,
    cancel: &CancellationToken,
) -> EvalResult<RemoteValue> {
    Interpreter::new(instructions, ctx)
        .with_cancellation(cancel.clone())
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClass, MockFrame, MockVm};
    use crate::numeric::BinaryOp;
    use crate::remote::{InvokeOutcome, MethodSelector};
    use crate::session::Evaluator;
    use crate::value::{ObjectHandle, Primitive};
    use jdwp_client::types::ThreadId;
    use proptest::prelude::*;
    use std::sync::Arc;
    use Instruction::*;

    const THREAD: ThreadId = 1;

    fn int(v: i32) -> Instruction {
        PushLiteral(RemoteValue::int(v))
    }

    /// A thread stopped in `App.run()` with `this` and an int local `count`
    fn target() -> (Arc<MockVm>, RemoteValue) {
        let vm = Arc::new(MockVm::new());
        let app = vm.add_class(MockClass::new("LApp;").field("label", "Ljava/lang/String;"));
        let this = vm.new_object("LApp;");
        vm.push_frame(
            THREAD,
            MockFrame::new(app, 1)
                .this(this.clone())
                .local("count", "I", RemoteValue::int(3)),
        );
        (vm, this)
    }

    async fn run(vm: &Arc<MockVm>, program: &[Instruction]) -> EvalResult<RemoteValue> {
        let ctx = Evaluator::new(vm.clone()).bind(THREAD, 0).await?;
        evaluate(program, &ctx).await
    }

    #[tokio::test]
    async fn test_index_out_of_range_checked_before_remote_read() {
        let (vm, _) = target();
        let array = vm.new_int_array(&[1, 2, 3]);

        let result = run(&vm, &[int(5), PushLiteral(array), ArrayLoad]).await;
        assert_eq!(result, Err(EvaluationError::IndexOutOfRange { index: 5, length: 3 }));
        assert!(!vm.calls().iter().any(|c| c.starts_with("array_get")));
    }

    #[tokio::test]
    async fn test_array_load() {
        let (vm, _) = target();
        let array = vm.new_int_array(&[10, 20, 30]);

        let result = run(&vm, &[int(1), PushLiteral(array), ArrayLoad]).await;
        assert_eq!(result, Ok(RemoteValue::int(20)));
    }

    #[tokio::test]
    async fn test_field_of_null_receiver() {
        let (vm, _) = target();
        let result = run(&vm, &[PushLiteral(RemoteValue::Null), FieldGet("x".into())]).await;
        assert_eq!(result, Err(EvaluationError::NullReceiver));
    }

    #[tokio::test]
    async fn test_exception_in_target_is_not_connection_loss() {
        let (vm, _) = target();
        vm.add_class(
            MockClass::new("Ljava/lang/IllegalStateException;").method(
                "getMessage",
                "()Ljava/lang/String;",
                |vm, _, _| InvokeOutcome::Returned(vm.new_string("boom")),
            ),
        );
        let exception = vm.new_object("Ljava/lang/IllegalStateException;");
        let thrown = exception.object_id().unwrap();
        vm.add_class(MockClass::new("LWidget;").method("explode", "()V", move |_, _, _| {
            InvokeOutcome::Threw(ObjectHandle::new(thrown))
        }));
        let widget = vm.new_object("LWidget;");

        let err = run(
            &vm,
            &[
                PushLiteral(widget),
                Invoke(MethodSelector::new("explode", 0)),
                int(1),
            ],
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            EvaluationError::RemoteException {
                description: "java.lang.IllegalStateException: boom".into(),
                exception: thrown,
            }
        );
        assert!(!err.is_connection_loss());
    }

    #[tokio::test]
    async fn test_exception_without_message() {
        let (vm, _) = target();
        vm.add_class(
            MockClass::new("Ljava/lang/RuntimeException;").method(
                "getMessage",
                "()Ljava/lang/String;",
                |_, _, _| InvokeOutcome::Returned(RemoteValue::Null),
            ),
        );
        let exception = vm.new_object("Ljava/lang/RuntimeException;");
        let thrown = exception.object_id().unwrap();
        vm.add_class(MockClass::new("LWidget;").static_method("fail", "()I", move |_, _, _| {
            InvokeOutcome::Threw(ObjectHandle::new(thrown))
        }));

        let err = run(
            &vm,
            &[InvokeStatic {
                class: "LWidget;".into(),
                method: MethodSelector::new("fail", 0),
            }],
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::RemoteException { ref description, .. }
                if description == "java.lang.RuntimeException"
        ));
    }

    #[tokio::test]
    async fn test_disconnect_mid_evaluation() {
        let (vm, _) = target();
        let ctx = Evaluator::new(vm.clone()).bind(THREAD, 0).await.unwrap();
        vm.disconnect();

        let err = evaluate(&[PushThis], &ctx).await.unwrap_err();
        assert_eq!(err, EvaluationError::Disconnected);
        assert!(err.is_connection_loss());
    }

    #[tokio::test]
    async fn test_target_dies_during_invoke() {
        let vm = Arc::new(MockVm::new());
        let app = vm.add_class(MockClass::new("LApp;").method("shutdown", "()I", |vm, _, _| {
            vm.disconnect();
            InvokeOutcome::Returned(RemoteValue::int(0))
        }));
        let this = vm.new_object("LApp;");
        vm.push_frame(THREAD, MockFrame::new(app, 1).this(this));

        let err = run(
            &vm,
            &[PushThis, Invoke(MethodSelector::new("shutdown", 0)), int(1), Binary(BinaryOp::Add)],
        )
        .await
        .unwrap_err();
        assert_eq!(err, EvaluationError::Disconnected);
        assert!(err.is_connection_loss());
        assert_eq!(vm.calls().last().map(String::as_str), Some("invoke shutdown"));
    }

    #[tokio::test]
    async fn test_integer_division_by_zero() {
        let (vm, _) = target();
        let result = run(&vm, &[int(1), int(0), Binary(BinaryOp::Div)]).await;
        assert_eq!(result, Err(EvaluationError::DivideByZero));

        let float = run(
            &vm,
            &[
                PushLiteral(RemoteValue::Primitive(Primitive::Double(1.0))),
                int(0),
                Binary(BinaryOp::Div),
            ],
        )
        .await;
        assert_eq!(float, Ok(RemoteValue::Primitive(Primitive::Double(f64::INFINITY))));
    }

    #[tokio::test]
    async fn test_cancellation_between_instructions() {
        let (vm, _) = target();
        let token = CancellationToken::new();
        let trigger = token.clone();
        vm.add_class(MockClass::new("LTicker;").method("tick", "()I", move |_, _, _| {
            trigger.cancel();
            InvokeOutcome::Returned(RemoteValue::int(1))
        }));
        let ticker = vm.new_object("LTicker;");
        let program = [
            PushLiteral(ticker.clone()),
            Invoke(MethodSelector::new("tick", 0)),
            Pop,
            PushLiteral(ticker),
            Invoke(MethodSelector::new("tick", 0)),
        ];

        let ctx = Evaluator::new(vm.clone()).bind(THREAD, 0).await.unwrap();
        let mut interpreter = Interpreter::new(&program, &ctx).with_cancellation(token);
        assert_eq!(interpreter.run().await, Err(EvaluationError::Cancelled));
        assert_eq!(interpreter.state(), InterpreterState::Failed);

        let ticks = vm.calls().iter().filter(|c| *c == "invoke tick").count();
        assert_eq!(ticks, 1);
    }

    #[tokio::test]
    async fn test_final_stack_depth() {
        let (vm, _) = target();
        let ctx = Evaluator::new(vm.clone()).bind(THREAD, 0).await.unwrap();

        let two = [int(1), int(2)];
        let mut interpreter = Interpreter::new(&two, &ctx);
        let err = interpreter.run().await.unwrap_err();
        assert_eq!(err, EvaluationError::MalformedResult { depth: 2 });
        assert!(err.is_internal());
        assert_eq!(interpreter.state(), InterpreterState::Failed);

        // No second run, even after a failure
        assert!(matches!(
            interpreter.run().await,
            Err(EvaluationError::MalformedSequence(_))
        ));

        assert_eq!(
            evaluate(&[], &ctx).await,
            Err(EvaluationError::MalformedResult { depth: 0 })
        );
        assert_eq!(evaluate(&[Pop], &ctx).await, Err(EvaluationError::StackUnderflow));
    }

    #[tokio::test]
    async fn test_repeatable_on_unchanged_state() {
        let (vm, _) = target();
        let program = [PushLocal("count".into()), int(4), Binary(BinaryOp::Mul)];
        let first = run(&vm, &program).await;
        let second = run(&vm, &program).await;
        assert_eq!(first, Ok(RemoteValue::int(12)));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_loop_with_temps_and_jumps() {
        let (vm, _) = target();
        // sum = 0; for (i = 0; i < 5; i++) sum += i;
        let program = [
            int(0),
            StoreTemp(0),
            int(0),
            StoreTemp(1),
            LoadTemp(0),
            int(5),
            Binary(BinaryOp::Lt),
            JumpIfFalse(17),
            LoadTemp(1),
            LoadTemp(0),
            Binary(BinaryOp::Add),
            StoreTemp(1),
            LoadTemp(0),
            int(1),
            Binary(BinaryOp::Add),
            StoreTemp(0),
            Jump(4),
            LoadTemp(1),
        ];
        assert_eq!(run(&vm, &program).await, Ok(RemoteValue::int(10)));
    }

    #[tokio::test]
    async fn test_jump_outside_sequence() {
        let (vm, _) = target();
        assert!(matches!(
            run(&vm, &[int(1), Jump(3)]).await,
            Err(EvaluationError::MalformedSequence(_))
        ));
        // Jumping to the end is a normal exit
        assert_eq!(run(&vm, &[int(1), Jump(3), Pop]).await, Ok(RemoteValue::int(1)));
        assert!(matches!(
            run(&vm, &[int(1), JumpIfTrue(0)]).await,
            Err(EvaluationError::TypeMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_frame_locals() {
        let (vm, _) = target();
        let stored = run(
            &vm,
            &[
                PushLiteral(RemoteValue::Primitive(Primitive::Short(4))),
                StoreLocal("count".into()),
                PushLocal("count".into()),
            ],
        )
        .await;
        assert_eq!(stored, Ok(RemoteValue::int(4)));
        assert_eq!(vm.local_value(THREAD, 0, "count"), Some(RemoteValue::int(4)));

        let narrowing = run(
            &vm,
            &[
                PushLiteral(RemoteValue::Primitive(Primitive::Long(4))),
                StoreLocal("count".into()),
                PushLocal("count".into()),
            ],
        )
        .await;
        assert!(matches!(narrowing, Err(EvaluationError::TypeMismatch(_))));

        assert_eq!(
            run(&vm, &[PushLocal("missing".into())]).await,
            Err(EvaluationError::NoSuchVariable("missing".into()))
        );
    }

    #[tokio::test]
    async fn test_snippet_locals_shadow_frame() {
        let (vm, _) = target();
        let result = run(
            &vm,
            &[
                int(9),
                DeclareLocal("count".into()),
                int(10),
                StoreLocal("count".into()),
                PushLocal("count".into()),
            ],
        )
        .await;
        assert_eq!(result, Ok(RemoteValue::int(10)));
        assert_eq!(vm.local_value(THREAD, 0, "count"), Some(RemoteValue::int(3)));
    }

    #[tokio::test]
    async fn test_instance_fields() {
        let (vm, this) = target();
        vm.add_class(MockClass::new("LPoint;").field("x", "I"));
        let point = vm.new_object("LPoint;");

        let result = run(
            &vm,
            &[
                PushLiteral(point.clone()),
                PushLiteral(RemoteValue::Primitive(Primitive::Char(65))),
                FieldSet("x".into()),
                PushLiteral(point.clone()),
                FieldGet("x".into()),
            ],
        )
        .await;
        assert_eq!(result, Ok(RemoteValue::int(65)));
        assert_eq!(vm.field_value(&point, "x"), Some(RemoteValue::int(65)));

        let flag = RemoteValue::boolean(true).into_literal();
        let wrong = run(&vm, &[PushLiteral(point), flag, FieldSet("x".into())]).await;
        assert!(matches!(wrong, Err(EvaluationError::TypeMismatch(_))));

        // Reference fields check the runtime type of the stored value
        let label = run(
            &vm,
            &[PushThis, PushLiteral(this.clone()), FieldSet("label".into())],
        )
        .await;
        assert!(matches!(label, Err(EvaluationError::TypeMismatch(_))));
        let label = run(
            &vm,
            &[
                PushThis,
                PushString("hi".into()),
                FieldSet("label".into()),
                PushThis,
                FieldGet("label".into()),
            ],
        )
        .await
        .unwrap();
        assert!(matches!(label, RemoteValue::Object(ref h) if h.is_string()));

        assert!(matches!(
            run(&vm, &[PushThis, FieldGet("y".into())]).await,
            Err(EvaluationError::NoSuchField(_))
        ));
    }

    #[tokio::test]
    async fn test_static_fields_and_methods() {
        let (vm, _) = target();
        vm.add_class(
            MockClass::new("LCounter;")
                .static_field("hits", "I")
                .static_method("twice", "(J)J", |_, _, args| match args.first() {
                    Some(RemoteValue::Primitive(Primitive::Long(v))) => {
                        InvokeOutcome::Returned(RemoteValue::Primitive(Primitive::Long(v * 2)))
                    }
                    _ => InvokeOutcome::Returned(RemoteValue::Void),
                }),
        );
        let hits = || StaticFieldGet {
            class: "LCounter;".into(),
            name: "hits".into(),
        };

        let result = run(
            &vm,
            &[
                hits(),
                int(1),
                Binary(BinaryOp::Add),
                StaticFieldSet {
                    class: "LCounter;".into(),
                    name: "hits".into(),
                },
                hits(),
            ],
        )
        .await;
        assert_eq!(result, Ok(RemoteValue::int(1)));
        assert_eq!(vm.static_value("LCounter;", "hits"), Some(RemoteValue::int(1)));

        // int argument widens to the declared long parameter
        let twice = run(
            &vm,
            &[
                int(21),
                InvokeStatic {
                    class: "LCounter;".into(),
                    method: MethodSelector::new("twice", 1),
                },
            ],
        )
        .await;
        assert_eq!(twice, Ok(RemoteValue::Primitive(Primitive::Long(42))));
    }

    #[tokio::test]
    async fn test_construct_and_compare() {
        let (vm, _) = target();
        vm.add_class(
            MockClass::new("LPoint;")
                .field("x", "I")
                .constructor("(I)V", |vm, this, args| {
                    vm.set_field_value(this, "x", args[0].clone());
                    InvokeOutcome::Returned(RemoteValue::Void)
                }),
        );

        let x = run(
            &vm,
            &[
                int(5),
                New {
                    class: "LPoint;".into(),
                    constructor: MethodSelector::new("<init>", 1),
                },
                FieldGet("x".into()),
            ],
        )
        .await;
        assert_eq!(x, Ok(RemoteValue::int(5)));

        assert_eq!(
            run(&vm, &[PushThis, PushThis, Binary(BinaryOp::Eq)]).await,
            Ok(RemoteValue::boolean(true))
        );
        assert_eq!(
            run(&vm, &[PushThis, PushLiteral(RemoteValue::Null), Binary(BinaryOp::Ne)]).await,
            Ok(RemoteValue::boolean(true))
        );
        assert!(matches!(
            run(&vm, &[PushThis, int(1), Binary(BinaryOp::Eq)]).await,
            Err(EvaluationError::TypeMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_casts_and_type_tests() {
        let (vm, _) = target();
        assert_eq!(
            run(&vm, &[int(300), Cast("B".into())]).await,
            Ok(RemoteValue::Primitive(Primitive::Byte(44)))
        );
        assert_eq!(
            run(&vm, &[PushThis, Cast("Ljava/lang/String;".into())]).await,
            Err(EvaluationError::IllegalCast {
                from: "App".into(),
                to: "java.lang.String".into(),
            })
        );
        assert_eq!(
            run(
                &vm,
                &[PushThis, Cast("Ljava/lang/Object;".into()), InstanceOf("LApp;".into())],
            )
            .await,
            Ok(RemoteValue::boolean(true))
        );
        assert_eq!(
            run(&vm, &[PushLiteral(RemoteValue::Null), InstanceOf("LApp;".into())]).await,
            Ok(RemoteValue::boolean(false))
        );
        assert!(matches!(
            run(&vm, &[RemoteValue::boolean(true).into_literal(), Cast("I".into())]).await,
            Err(EvaluationError::IllegalCast { .. })
        ));
    }

    #[tokio::test]
    async fn test_array_store_and_allocation() {
        let (vm, _) = target();
        let array = vm.new_int_array(&[1, 2, 3]);

        let length = run(
            &vm,
            &[
                int(99),
                int(0),
                PushLiteral(array.clone()),
                ArrayStore,
                PushLiteral(array.clone()),
                FieldGet("length".into()),
            ],
        )
        .await;
        assert_eq!(length, Ok(RemoteValue::int(3)));
        assert_eq!(vm.array_values(&array)[0], RemoteValue::int(99));

        let store_null = [
            PushLiteral(RemoteValue::Null),
            int(0),
            PushLiteral(array.clone()),
            ArrayStore,
            int(0),
        ];
        assert!(matches!(
            run(&vm, &store_null).await,
            Err(EvaluationError::TypeMismatch(_))
        ));
        assert_eq!(
            run(&vm, &[int(0), PushThis, ArrayLoad]).await,
            Err(EvaluationError::NotAnArray("object".into()))
        );

        let strings = run(
            &vm,
            &[int(2), NewArray("[Ljava/lang/String;".into()), ArrayLength],
        )
        .await;
        assert_eq!(strings, Ok(RemoteValue::int(2)));
        assert_eq!(
            run(&vm, &[int(-1), NewArray("[I".into())]).await,
            Err(EvaluationError::NegativeArraySize(-1))
        );
    }

    #[tokio::test]
    async fn test_frame_id_reissued_after_invoke() {
        let (vm, _) = target();
        vm.add_class(MockClass::new("LRunner;").method("step", "()V", |vm, _, _| {
            vm.reissue_frame_ids(THREAD);
            InvokeOutcome::Returned(RemoteValue::Void)
        }));
        let runner = vm.new_object("LRunner;");

        let result = run(
            &vm,
            &[
                PushLiteral(runner),
                Invoke(MethodSelector::new("step", 0)),
                Pop,
                PushLocal("count".into()),
            ],
        )
        .await;
        assert_eq!(result, Ok(RemoteValue::int(3)));
    }

    #[tokio::test]
    async fn test_frame_gone_after_invoke() {
        let (vm, _) = target();
        let outer = vm.add_class(MockClass::new("LOuter;"));
        // The bound frame sits at depth 1 under a frame that returns
        vm.add_class(MockClass::new("LRunner;").method("unwind", "()V", |vm, _, _| {
            vm.pop_frame(THREAD);
            InvokeOutcome::Returned(RemoteValue::Void)
        }));
        vm.push_frame(THREAD, MockFrame::new(outer, 7));
        let runner = vm.new_object("LRunner;");

        let ctx = Evaluator::new(vm.clone()).bind(THREAD, 1).await.unwrap();
        let err = evaluate(&[PushLiteral(runner), Invoke(MethodSelector::new("unwind", 0))], &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::StaleFrame(_)));
    }

    #[tokio::test]
    async fn test_describe() {
        let (vm, this) = target();
        let ctx = Evaluator::new(vm.clone()).bind(THREAD, 0).await.unwrap();

        let text = evaluate(&[PushString("hi \"there\"".into())], &ctx).await.unwrap();
        assert_eq!(ctx.describe(&text).await.unwrap(), r#""hi \"there\"""#);
        assert_eq!(ctx.describe(&RemoteValue::int(5)).await.unwrap(), "(int) 5");

        let id = this.object_id().unwrap();
        assert_eq!(
            ctx.describe(&this).await.unwrap(),
            format!("(object) LApp; @{:x}", id)
        );
    }

    trait Literal {
        fn into_literal(self) -> Instruction;
    }

    impl Literal for RemoteValue {
        fn into_literal(self) -> Instruction {
            PushLiteral(self)
        }
    }

    proptest! {
        #[test]
        fn prop_array_load_bounds(length in 0usize..8, index in -4i32..12) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let (vm, _) = target();
                let values: Vec<i32> = (0..length as i32).map(|v| v * 10).collect();
                let array = vm.new_int_array(&values);

                let result = run(&vm, &[int(index), PushLiteral(array), ArrayLoad]).await;
                if index >= 0 && (index as usize) < length {
                    prop_assert_eq!(result, Ok(RemoteValue::int(index * 10)));
                } else {
                    prop_assert_eq!(
                        result,
                        Err(EvaluationError::IndexOutOfRange { index, length: length as i32 })
                    );
                    prop_assert!(!vm.calls().iter().any(|c| c.starts_with("array_get")));
                }

                let null = run(&vm, &[int(index), PushLiteral(RemoteValue::Null), ArrayLoad]).await;
                prop_assert_eq!(null, Err(EvaluationError::NullArrayReference));
                Ok(())
            })?;
        }
    }
}
