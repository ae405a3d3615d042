//! Quaternion accumulation helpers shared by the blending instructions.
//!
//! Rotations are blended by summing weighted quaternions and normalizing once at the end. Since
//! `q` and `-q` describe the same rotation, every sample is first flipped into the hemisphere of
//! the running sum so that opposite representations do not cancel out.

use bevy::math::Quat;

/// Returns `sample` or `-sample`, whichever lies in the same hemisphere as `reference`.
#[inline]
pub fn align_hemisphere(reference: Quat, sample: Quat) -> Quat {
    if reference.dot(sample) < 0. {
        -sample
    } else {
        sample
    }
}

/// Adds `weight * sample` to `sum` after hemisphere correction.
#[inline]
pub fn accumulate_rotation(sum: Quat, sample: Quat, weight: f32) -> Quat {
    sum + align_hemisphere(sum, sample) * weight
}

/// Normalizes an accumulated quaternion, substituting identity when its squared length is below
/// `epsilon`.
#[inline]
pub fn normalize_or_identity(rotation: Quat, epsilon: f32) -> Quat {
    let length_squared = rotation.length_squared();
    if length_squared.is_finite() && length_squared >= epsilon {
        rotation * length_squared.sqrt().recip()
    } else {
        Quat::IDENTITY
    }
}

/// Scales a rotation delta by `weight` around identity.
#[inline]
pub fn scale_delta(delta: Quat, weight: f32) -> Quat {
    Quat::IDENTITY.slerp(delta, weight)
}
