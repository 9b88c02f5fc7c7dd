// Expression evaluation against a suspended JVM
//
// A debugger front end compiles a watch expression or snippet into a flat
// instruction sequence; this crate runs that sequence against one suspended
// frame of the target, one remote round trip at a time:
// - Remote value model and Java numeric semantics
// - Execution stack and instruction set
// - Interpreter loop with cancellation at instruction boundaries
// - Evaluation context bound to a (thread, frame), serialized per thread

pub mod context;
pub mod error;
pub mod instruction;
pub mod interpreter;
pub mod jdwp;
pub mod numeric;
pub mod remote;
pub mod session;
pub mod signature;
pub mod stack;
pub mod value;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use context::{EvaluationContext, FrameBinding, LocalSlot, SymbolTable};
pub use error::{ErrorKind, EvalResult, EvaluationError};
pub use instruction::Instruction;
pub use interpreter::{evaluate, evaluate_with_cancel, Interpreter, InterpreterState};
pub use jdwp::{EvalConfig, JdwpVm};
pub use remote::{InvokeOutcome, MethodSelector, RemoteVm};
pub use session::{Evaluator, ThreadTable};
pub use value::{ArrayHandle, ObjectHandle, Primitive, PrimitiveKind, RemoteValue};
