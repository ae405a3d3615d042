use bevy_pose_command_core::errors::CommandError;
use thiserror::Error;

/// Errors produced when driving a character's evaluation task.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaskError {
    #[error("The previous evaluation of this character is still executing")]
    StillExecuting,
    #[error("The pose cannot be read until the task is synchronized")]
    NotSynchronized,
    #[error("No pose has been evaluated for this character yet")]
    NoPose,
    #[error(transparent)]
    Command(#[from] CommandError),
}

pub type TaskResult<T> = Result<T, TaskError>;
