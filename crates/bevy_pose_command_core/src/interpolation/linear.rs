use bevy::math::{Quat, Vec3};

use crate::{clip_source::JointSample, pose::JointTransform};

pub trait InterpolateLinear {
    fn interpolate_linear(&self, other: &Self, f: f32) -> Self;
}

impl InterpolateLinear for Vec3 {
    fn interpolate_linear(&self, other: &Self, f: f32) -> Self {
        self.lerp(*other, f)
    }
}

impl InterpolateLinear for Quat {
    fn interpolate_linear(&self, other: &Self, f: f32) -> Self {
        self.slerp(*other, f)
    }
}

impl InterpolateLinear for JointTransform {
    fn interpolate_linear(&self, other: &Self, f: f32) -> Self {
        JointTransform {
            rotation: self.rotation.interpolate_linear(&other.rotation, f),
            translation: self.translation.interpolate_linear(&other.translation, f),
        }
    }
}

/// Channels missing on one side are taken from the other unchanged.
impl InterpolateLinear for JointSample {
    fn interpolate_linear(&self, other: &Self, f: f32) -> Self {
        JointSample {
            rotation: interpolate_channel(self.rotation, other.rotation, f),
            translation: interpolate_channel(self.translation, other.translation, f),
        }
    }
}

fn interpolate_channel<T>(a: Option<T>, b: Option<T>, f: f32) -> Option<T>
where
    T: InterpolateLinear + Copy,
{
    match (a, b) {
        (Some(a), Some(b)) => Some(a.interpolate_linear(&b, f)),
        (a, None) => a,
        (None, b) => b,
    }
}
