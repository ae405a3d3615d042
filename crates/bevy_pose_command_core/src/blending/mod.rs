//! Pose blending algorithms behind the command buffer instructions.
//!
//! Rotations accumulate as weighted quaternion sums with hemisphere correction, and are only
//! normalized by an explicit `NormalizeFull`. Translations accumulate linearly. A buffer's
//! per-joint weights record how much has been accumulated on each channel so that layers can be
//! blended against each other joint by joint.

mod fold;
mod normalize;
mod sample;

pub use fold::*;
pub use normalize::*;
pub use sample::*;

use crate::pose::{JointFlags, PoseBuffer, PoseInit};

/// `ClearPoseBuffer`: resets every joint's transform, weights and flags.
pub fn clear_pose_buffer(buffer: &mut PoseBuffer, init: PoseInit, flags: JointFlags) {
    buffer.clear(init, flags);
}
