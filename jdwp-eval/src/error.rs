// Evaluation errors
//
// Four tiers: stack discipline (engine or compiler bugs), value semantics
// (the snippet's own runtime behavior), remote (resolution failures, remote
// exceptions, lost connection) and control (cancellation).

use jdwp_client::protocol::error_codes;
use jdwp_client::types::ObjectId;
use jdwp_client::JdwpError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvaluationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    StackDiscipline,
    ValueSemantics,
    Remote,
    Control,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("evaluation finished with {depth} values on the stack, expected exactly one")]
    MalformedResult { depth: usize },

    #[error("malformed instruction sequence: {0}")]
    MalformedSequence(String),

    #[error("null receiver")]
    NullReceiver,

    #[error("null array reference")]
    NullArrayReference,

    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfRange { index: i32, length: i32 },

    #[error("not an array: {0}")]
    NotAnArray(String),

    #[error("negative array size: {0}")]
    NegativeArraySize(i32),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("cannot cast {from} to {to}")]
    IllegalCast { from: String, to: String },

    #[error("division by zero")]
    DivideByZero,

    #[error("no such field: {0}")]
    NoSuchField(String),

    #[error("no such method: {0}")]
    NoSuchMethod(String),

    #[error("no such class: {0}")]
    NoSuchClass(String),

    #[error("no such variable: {0}")]
    NoSuchVariable(String),

    #[error("{description}")]
    RemoteException {
        description: String,
        exception: ObjectId,
    },

    #[error("target VM disconnected")]
    Disconnected,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("object handle is no longer valid")]
    StaleHandle,

    #[error("stack frame is no longer valid: {0}")]
    StaleFrame(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("evaluation cancelled")]
    Cancelled,
}

impl EvaluationError {
    pub fn kind(&self) -> ErrorKind {
        use EvaluationError::*;
        match self {
            StackUnderflow | MalformedResult { .. } | MalformedSequence(_) => {
                ErrorKind::StackDiscipline
            }
            NullReceiver
            | NullArrayReference
            | IndexOutOfRange { .. }
            | NotAnArray(_)
            | NegativeArraySize(_)
            | TypeMismatch(_)
            | IllegalCast { .. }
            | DivideByZero => ErrorKind::ValueSemantics,
            NoSuchField(_)
            | NoSuchMethod(_)
            | NoSuchClass(_)
            | NoSuchVariable(_)
            | RemoteException { .. }
            | Disconnected
            | Timeout(_)
            | StaleHandle
            | StaleFrame(_)
            | Protocol(_) => ErrorKind::Remote,
            Cancelled => ErrorKind::Control,
        }
    }

    /// True for failures that indicate a malformed instruction sequence
    /// rather than anything the snippet did
    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::StackDiscipline
    }

    /// True when the debugger lost the target, as opposed to the target
    /// reporting a failure
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            EvaluationError::Disconnected | EvaluationError::Timeout(_)
        )
    }
}

impl From<JdwpError> for EvaluationError {
    fn from(err: JdwpError) -> Self {
        match err {
            JdwpError::ConnectionClosed | JdwpError::Io(_) => EvaluationError::Disconnected,
            JdwpError::Timeout(elapsed) => EvaluationError::Timeout(elapsed),
            JdwpError::JdwpErrorCode(code, name) => match code {
                error_codes::VM_DEAD => EvaluationError::Disconnected,
                error_codes::INVALID_OBJECT => EvaluationError::StaleHandle,
                error_codes::INVALID_FRAMEID
                | error_codes::THREAD_NOT_SUSPENDED
                | error_codes::INVALID_THREAD => EvaluationError::StaleFrame(name),
                _ => EvaluationError::Protocol(format!("JDWP error {} ({})", code, name)),
            },
            other => EvaluationError::Protocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_mapping() {
        let closed: EvaluationError = JdwpError::ConnectionClosed.into();
        assert_eq!(closed, EvaluationError::Disconnected);

        let dead: EvaluationError = JdwpError::JdwpErrorCode(112, "VM_DEAD".into()).into();
        assert_eq!(dead, EvaluationError::Disconnected);

        let stale: EvaluationError = JdwpError::JdwpErrorCode(20, "INVALID_OBJECT".into()).into();
        assert_eq!(stale, EvaluationError::StaleHandle);

        let frame: EvaluationError = JdwpError::JdwpErrorCode(30, "INVALID_FRAMEID".into()).into();
        assert!(matches!(frame, EvaluationError::StaleFrame(_)));

        // A remote index failure is never reported as a bounds violation
        let index: EvaluationError = JdwpError::JdwpErrorCode(503, "INVALID_INDEX".into()).into();
        assert!(matches!(index, EvaluationError::Protocol(_)));
    }

    #[test]
    fn test_kinds() {
        assert!(EvaluationError::StackUnderflow.is_internal());
        assert!(EvaluationError::MalformedResult { depth: 2 }.is_internal());
        assert_eq!(EvaluationError::DivideByZero.kind(), ErrorKind::ValueSemantics);
        assert_eq!(EvaluationError::Cancelled.kind(), ErrorKind::Control);

        let thrown = EvaluationError::RemoteException {
            description: "java.lang.IllegalStateException: boom".into(),
            exception: 0x41,
        };
        assert_eq!(thrown.kind(), ErrorKind::Remote);
        assert!(!thrown.is_connection_loss());
        assert!(EvaluationError::Disconnected.is_connection_loss());
    }
}
