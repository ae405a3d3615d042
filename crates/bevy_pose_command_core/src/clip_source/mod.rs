mod library;

pub use library::*;

use bevy::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::pose::{JointFlags, JointTransform};

/// Index of an animation clip or single-frame pose asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId(pub u32);

/// Channels sampled from a clip for one joint. A `None` channel is not animated by the clip.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JointSample {
    pub rotation: Option<Quat>,
    pub translation: Option<Vec3>,
}

impl JointSample {
    pub const EMPTY: Self = Self {
        rotation: None,
        translation: None,
    };

    pub fn is_empty(&self) -> bool {
        self.rotation.is_none() && self.translation.is_none()
    }

    pub fn flags(&self) -> JointFlags {
        let mut flags = JointFlags::empty();
        flags.set(JointFlags::ORIENTATION, self.rotation.is_some());
        flags.set(JointFlags::POSITION, self.translation.is_some());
        flags
    }

    /// Fills missing channels from `base`.
    pub fn to_transform_with_base(&self, base: JointTransform) -> JointTransform {
        JointTransform {
            rotation: self.rotation.unwrap_or(base.rotation),
            translation: self.translation.unwrap_or(base.translation),
        }
    }

    /// Composes the sample as a delta on top of `base`.
    pub fn to_transform_additive(&self, base: JointTransform) -> JointTransform {
        JointTransform {
            rotation: self
                .rotation
                .map_or(base.rotation, |delta| delta * base.rotation),
            translation: base.translation + self.translation.unwrap_or(Vec3::ZERO),
        }
    }
}

/// Read-only access to animation data, shared by every evaluation job.
///
/// Clips are addressed by [`ClipId`] and sampled at a normalized time in `[0, 1]`. Sources are
/// expected to answer [`is_loaded`](ClipSource::is_loaded) with `false` for ids they do not know.
pub trait ClipSource: Send + Sync {
    fn is_loaded(&self, clip: ClipId) -> bool;

    /// Additive clips store rotation and translation deltas instead of absolute values.
    fn is_additive(&self, clip: ClipId) -> bool;

    fn sample_joint(&self, clip: ClipId, joint: usize, normalized_time: f32) -> JointSample;

    /// Length of the clip in seconds, used to advance its normalized time. `None` when unknown.
    fn duration(&self, _clip: ClipId) -> Option<f32> {
        None
    }

    /// Samples a single-frame pose asset. Defaults to the first frame of the clip.
    fn sample_pose_joint(&self, pose: ClipId, joint: usize) -> JointSample {
        self.sample_joint(pose, joint, 0.)
    }
}
