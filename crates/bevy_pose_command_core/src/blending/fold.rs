use bevy::math::Vec2;

use crate::{
    command::records::PerJointBlendMode,
    interpolation::accumulate::{
        accumulate_rotation, align_hemisphere, normalize_or_identity, scale_delta,
    },
    pose::{JointFlags, PoseBuffer},
};

/// `AddPoseBuffer`: folds `source` into `target` scaled by `weight`.
///
/// Regular joints are accumulated like any other sample. Joints flagged
/// [`JointFlags::ADDITIVE`] hold deltas, which are composed onto whatever `target` has
/// accumulated so far, with strength `weight` times the delta's own clamped weight. Additive
/// joints do not add to the target's weights.
pub fn add_pose_buffer(source: &PoseBuffer, target: &mut PoseBuffer, weight: f32, epsilon: f32) {
    let (joints, flags, weights) = target.parts_mut();

    for (joint, ((layer, layer_flags), layer_weight)) in source
        .joints()
        .iter()
        .zip(source.flags())
        .zip(source.weights())
        .enumerate()
    {
        if layer_flags.is_empty() {
            continue;
        }

        let current = &mut joints[joint];
        if layer_flags.contains(JointFlags::ADDITIVE) {
            if layer_flags.contains(JointFlags::ORIENTATION) {
                let delta = normalize_or_identity(layer.rotation, epsilon);
                let strength = layer_weight.x.clamp(0., 1.) * weight;
                current.rotation = scale_delta(delta, strength) * current.rotation;
            }
            if layer_flags.contains(JointFlags::POSITION) {
                current.translation += layer.translation * weight;
            }
        } else {
            if layer_flags.contains(JointFlags::ORIENTATION) {
                current.rotation = accumulate_rotation(current.rotation, layer.rotation, weight);
            }
            if layer_flags.contains(JointFlags::POSITION) {
                current.translation += layer.translation * weight;
            }
            weights[joint] += *layer_weight * weight;
        }

        flags[joint] |= layer_flags.difference(JointFlags::ADDITIVE);
    }
}

/// `PerJointBlending`: blends `source` into `target` using the source's own per-joint weights,
/// clamped to `[0, 1]`, as blend factors.
///
/// The layer's accumulated values are first divided by their weight, so a layer sampled at
/// partial weight still contributes its full pose where its weight reaches one.
pub fn per_joint_blend(
    source: &PoseBuffer,
    target: &mut PoseBuffer,
    mode: PerJointBlendMode,
    epsilon: f32,
) {
    let (joints, flags, _) = target.parts_mut();

    for (joint, ((layer, layer_flags), layer_weight)) in source
        .joints()
        .iter()
        .zip(source.flags())
        .zip(source.weights())
        .enumerate()
    {
        let Vec2 { x: rotation_weight, y: translation_weight } = *layer_weight;
        let current = &mut joints[joint];

        if layer_flags.contains(JointFlags::ORIENTATION) && rotation_weight > 0. {
            let factor = rotation_weight.min(1.);
            let layer_rotation = normalize_or_identity(layer.rotation, epsilon);
            current.rotation = match mode {
                PerJointBlendMode::Additive => {
                    scale_delta(layer_rotation, factor) * current.rotation
                }
                PerJointBlendMode::Override => {
                    let base = normalize_or_identity(current.rotation, epsilon);
                    let layer_rotation = align_hemisphere(base, layer_rotation);
                    normalize_or_identity(base * (1. - factor) + layer_rotation * factor, epsilon)
                }
            };
        }

        if layer_flags.contains(JointFlags::POSITION) && translation_weight > 0. {
            let factor = translation_weight.min(1.);
            let layer_translation = layer.translation / translation_weight;
            current.translation = match mode {
                PerJointBlendMode::Additive => current.translation + layer_translation * factor,
                PerJointBlendMode::Override => current.translation.lerp(layer_translation, factor),
            };
        }

        flags[joint] |= layer_flags.difference(JointFlags::ADDITIVE);
    }
}
