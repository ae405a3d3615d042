use bevy::math::Vec2;

use crate::{
    clip_source::{ClipId, ClipSource, JointSample},
    command::{EvaluationState, mask_contains},
    interpolation::accumulate::accumulate_rotation,
    pose::{JointFlags, JointTransform, PoseBuffer},
};

/// Where a sampling instruction reads its joint values from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleSource {
    Clip { clip: ClipId, normalized_time: f32 },
    /// Single-frame pose asset.
    Pose { pose: ClipId },
}

impl SampleSource {
    pub fn asset(&self) -> ClipId {
        match self {
            SampleSource::Clip { clip, .. } => *clip,
            SampleSource::Pose { pose } => *pose,
        }
    }

    pub fn sample(&self, clips: &dyn ClipSource, joint: usize) -> JointSample {
        match self {
            SampleSource::Clip {
                clip,
                normalized_time,
            } => clips.sample_joint(*clip, joint, *normalized_time),
            SampleSource::Pose { pose } => clips.sample_pose_joint(*pose, joint),
        }
    }

    fn sample_first_frame(&self, clips: &dyn ClipSource, joint: usize) -> JointSample {
        match self {
            SampleSource::Clip { clip, .. } => clips.sample_joint(*clip, joint, 0.),
            SampleSource::Pose { pose } => clips.sample_pose_joint(*pose, joint),
        }
    }
}

/// `SampleAddAnimFull` and `SampleAddPoseFull`.
///
/// Every joint that passes the active mask receives a complete transform: channels the clip does
/// not animate come from the bind pose, and additive clips are composed onto the bind pose. The
/// root joint keeps its bind pose unless `animation_driven_motion` is set, in which case the
/// clip's first frame seeds it.
pub fn sample_add_full(
    state: &EvaluationState,
    buffer: &mut PoseBuffer,
    source: SampleSource,
    weight: f32,
    animation_driven_motion: bool,
) {
    let clips = state.clips.as_ref();
    let mask = state.active_joint_mask();
    let additive = clips.is_additive(source.asset());
    let (joints, flags, weights) = buffer.parts_mut();

    for joint in 0..joints.len() {
        if !mask_contains(mask, joint) {
            continue;
        }

        let bind = state.skeleton.bind_pose(joint);
        let local = if joint == 0 && !animation_driven_motion {
            bind
        } else {
            let sample = if joint == 0 {
                source.sample_first_frame(clips, joint)
            } else {
                source.sample(clips, joint)
            };
            if additive {
                sample.to_transform_additive(bind)
            } else {
                sample.to_transform_with_base(bind)
            }
        };

        let current = &mut joints[joint];
        current.rotation = accumulate_rotation(current.rotation, local.rotation, weight);
        current.translation += local.translation * weight;
        flags[joint] |= JointFlags::PRESENT;
        weights[joint] += Vec2::splat(weight);
    }
}

/// `SampleAddAnimPart` and `SamplePosePart`: accumulates only the channels the clip animates.
/// Samples of additive clips are stored as deltas and flag the joint [`JointFlags::ADDITIVE`].
pub fn sample_add_part(
    state: &EvaluationState,
    buffer: &mut PoseBuffer,
    source: SampleSource,
    weight: f32,
) {
    let clips = state.clips.as_ref();
    let mask = state.active_joint_mask();
    let additive = clips.is_additive(source.asset());
    let (joints, flags, weights) = buffer.parts_mut();

    for joint in 0..joints.len() {
        if !mask_contains(mask, joint) {
            continue;
        }

        let sample = source.sample(clips, joint);
        if sample.is_empty() {
            continue;
        }

        let current = &mut joints[joint];
        if let Some(rotation) = sample.rotation {
            current.rotation = accumulate_rotation(current.rotation, rotation, weight);
            weights[joint].x += weight;
        }
        if let Some(translation) = sample.translation {
            current.translation += translation * weight;
            weights[joint].y += weight;
        }

        flags[joint] |= sample.flags();
        flags[joint].set(JointFlags::ADDITIVE, additive);
    }
}

/// `SampleReplaceAnimPart`: like [`sample_add_part`], but the weighted sample overwrites the
/// channel and its weight instead of accumulating.
pub fn sample_replace_part(
    state: &EvaluationState,
    buffer: &mut PoseBuffer,
    source: SampleSource,
    weight: f32,
) {
    let clips = state.clips.as_ref();
    let mask = state.active_joint_mask();
    let additive = clips.is_additive(source.asset());
    let (joints, flags, weights) = buffer.parts_mut();

    for joint in 0..joints.len() {
        if !mask_contains(mask, joint) {
            continue;
        }

        let sample = source.sample(clips, joint);
        if sample.is_empty() {
            continue;
        }

        let current = &mut joints[joint];
        if let Some(rotation) = sample.rotation {
            current.rotation = rotation * weight;
            weights[joint].x = weight;
        }
        if let Some(translation) = sample.translation {
            current.translation = translation * weight;
            weights[joint].y = weight;
        }

        flags[joint] |= sample.flags();
        flags[joint].set(JointFlags::ADDITIVE, additive);
    }
}
