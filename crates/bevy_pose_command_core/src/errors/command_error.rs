use super::ArenaError;
use thiserror::Error;

/// Errors produced while recording a command buffer.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command stream is full: record needs {needed} bytes, {remaining} remaining")]
    BufferFull { needed: usize, remaining: usize },
    #[error("Command buffer cannot register more than {max} joint masks")]
    TooManyJointMasks { max: usize },
    #[error("Joint mask is not sorted or references joint {joint} outside the skeleton")]
    InvalidJointMask { joint: u16 },
    #[error("Layer {layer} mixes additive and non-additive clips")]
    MixedAdditivity { layer: usize },
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

pub type CommandResult<T> = Result<T, CommandError>;
