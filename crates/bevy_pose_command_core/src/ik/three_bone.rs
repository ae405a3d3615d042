use bevy::math::{Quat, Vec3};

use super::two_bone::two_bone_ik;
use crate::pose::JointTransform;

/// Analytic IK on absolute transforms `[root, upper, lower, end]`.
///
/// The first two bones are solved with [`two_bone_ik`] against the goal offset by the last
/// segment, which keeps the last segment's orientation. The last segment is then swung onto the
/// goal to absorb whatever the two-bone pass could not reach.
pub fn three_bone_ik(chain: &mut [JointTransform], goal: Vec3, max_reach_offset: f32) {
    let [root, upper, lower, end] = chain else {
        return;
    };

    let last_segment = end.translation - lower.translation;
    let mut arm = [*root, *upper, *lower];
    two_bone_ik(&mut arm, goal - last_segment, max_reach_offset);
    *root = arm[0];
    *upper = arm[1];
    *lower = arm[2];

    // the end joint follows its parent, keeping its own absolute orientation
    end.translation = lower.translation + last_segment;

    let (Some(to_end), Some(to_goal)) = (
        (end.translation - lower.translation).try_normalize(),
        (goal - lower.translation).try_normalize(),
    ) else {
        return;
    };
    let swing = Quat::from_rotation_arc(to_end, to_goal);
    end.translation = lower.translation + swing * last_segment;
    lower.rotation = (swing * lower.rotation).normalize();
    end.rotation = (swing * end.rotation).normalize();
}
