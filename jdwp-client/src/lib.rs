// JDWP client library for Java debugging
//
// Implements the subset of the JDWP protocol an expression evaluator needs:
// - Connection management and a reply-routing event loop
// - Stack, local, field and array access
// - Method invocation that cannot be wedged by breakpoints in invoked code

pub mod connection;
pub mod protocol;
pub mod commands;
pub mod events;
pub mod types;
pub mod reader;
pub mod writer;
mod eventloop;
pub mod invoke;
pub mod vm;
pub mod reftype;
pub mod classtype;
pub mod method;
pub mod object;
pub mod string;
pub mod array;
pub mod thread;
pub mod stackframe;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use connection::{JdwpConfig, JdwpConnection};
pub use events::{EventSet, SuspendPolicy};
pub use invoke::{InvocationScope, InvokeReply, InvokingThreads};
pub use protocol::{JdwpError, JdwpResult};
