use thiserror::Error;

/// Errors produced while building or loading a skeleton definition.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SkeletonError {
    #[error("Could not parse RON: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("Skeleton has no joints")]
    Empty,
    #[error("Skeleton has {count} joints, at most {max} are supported")]
    TooManyJoints { count: usize, max: usize },
    #[error("Joint {name:?} appears more than once")]
    DuplicateJoint { name: String },
    #[error("Joint {joint} ({name:?}) has parent {parent}, which does not precede it")]
    ParentAfterChild {
        joint: usize,
        name: String,
        parent: usize,
    },
    #[error("Unknown joint {0:?}")]
    UnknownJoint(String),
    #[error("LOD mask {lod} is not sorted or references joint {joint} outside the skeleton")]
    InvalidLodMask { lod: usize, joint: usize },
    #[error("Limb handle {0:?} must be exactly four ASCII characters")]
    InvalidLimbHandle(String),
    #[error("Limb {0:?} is defined twice")]
    DuplicateLimb(String),
    #[error("Unknown IK solver tag {0:?}")]
    UnknownSolverTag(String),
    #[error("Limb {limb:?} chain of {found} joints is not valid for solver {solver}")]
    InvalidChainLength {
        limb: String,
        solver: String,
        found: usize,
    },
    #[error("Limb {limb:?} chain is broken: joint {joint} is not the parent of the next link")]
    DisconnectedChain { limb: String, joint: usize },
}

pub type SkeletonResult<T> = Result<T, SkeletonError>;
