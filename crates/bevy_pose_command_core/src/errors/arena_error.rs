use thiserror::Error;

/// Errors produced by the per-frame arena.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("Failed to reserve an arena bucket of {requested} bytes")]
    OutOfMemory { requested: usize },
    #[error("Arena handle from frame {epoch} used during frame {current}")]
    StaleHandle { epoch: u64, current: u64 },
    #[error("Arena handle does not point into this arena")]
    ForeignHandle,
    #[error("Arena bucket {bucket} is still referenced by an evaluation job")]
    BucketInFlight { bucket: usize },
    #[error("Arena bucket {bucket} is shared with evaluation jobs and can no longer be written")]
    Sealed { bucket: usize },
}

pub type ArenaResult<T> = Result<T, ArenaError>;
