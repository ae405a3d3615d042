use crate::{
    errors::{EvaluationError, EvaluationResult},
    interpolation::accumulate::normalize_or_identity,
    pose::{JointFlags, PoseBuffer},
};

/// `NormalizeFull`: brings every accumulated rotation back to unit length. Rotations too short
/// to normalize become identity.
pub fn normalize_full(buffer: &mut PoseBuffer, epsilon: f32) {
    for joint in buffer.joints_mut() {
        joint.rotation = normalize_or_identity(joint.rotation, epsilon);
    }
}

/// `ScaleUniformFull`: scales the translation of every joint that has a position channel.
pub fn scale_uniform_full(buffer: &mut PoseBuffer, scale: f32) {
    let (joints, flags, _) = buffer.parts_mut();
    for (joint, flags) in joints.iter_mut().zip(flags.iter()) {
        if flags.contains(JointFlags::POSITION) {
            joint.translation *= scale;
        }
    }
}

/// `VerifyFull`: fails on the first joint holding a non-finite value or a rotation that is not
/// unit length within `tolerance`.
pub fn verify_full(buffer: &PoseBuffer, tolerance: f32) -> EvaluationResult<()> {
    for (index, joint) in buffer.joints().iter().enumerate() {
        if !joint.rotation.is_finite() {
            return Err(EvaluationError::VerificationFailed {
                joint: index,
                reason: "rotation is not finite",
            });
        }
        if !joint.translation.is_finite() {
            return Err(EvaluationError::VerificationFailed {
                joint: index,
                reason: "translation is not finite",
            });
        }
        if (joint.rotation.length_squared() - 1.).abs() > tolerance {
            return Err(EvaluationError::VerificationFailed {
                joint: index,
                reason: "rotation is not unit length",
            });
        }
    }
    Ok(())
}
