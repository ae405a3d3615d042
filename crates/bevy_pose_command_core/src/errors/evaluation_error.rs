use crate::command::Opcode;
use thiserror::Error;

/// Fatal errors raised while interpreting a command stream. Any of these aborts evaluation of the
/// character for the current frame.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Unknown instruction opcode {opcode:#04x} at byte offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("{opcode:?} record at byte offset {offset} runs past the end of the stream")]
    TruncatedRecord { opcode: Opcode, offset: usize },
    #[error("{opcode:?} selects unknown pose buffer {selector}")]
    InvalidBufferSelector { opcode: Opcode, selector: u8 },
    #[error("{opcode:?} has invalid {field} value {value}")]
    InvalidField {
        opcode: Opcode,
        field: &'static str,
        value: u8,
    },
    #[error("{opcode:?} uses the same pose buffer as source and target")]
    AliasedBuffers { opcode: Opcode },
    #[error("Pose buffers hold {buffers} joints but the skeleton has {skeleton}")]
    JointCountMismatch { buffers: usize, skeleton: usize },
    #[error("Joint {joint} failed pose verification: {reason}")]
    VerificationFailed { joint: usize, reason: &'static str },
}

pub type EvaluationResult<T> = Result<T, EvaluationError>;
