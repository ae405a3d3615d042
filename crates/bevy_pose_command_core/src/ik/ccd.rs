use bevy::math::{Quat, Vec3};

use crate::pose::JointTransform;

/// Cyclic coordinate descent on absolute transforms. Each pass rotates every joint, from the one
/// nearest the end effector back to the root, so that the end effector points at `goal`.
pub fn solve_ccd(chain: &mut [JointTransform], goal: Vec3, iterations: u32, tolerance: f32) {
    let Some(end) = chain.len().checked_sub(1) else {
        return;
    };

    for _ in 0..iterations {
        if chain[end].translation.distance_squared(goal) <= tolerance * tolerance {
            break;
        }

        for pivot_index in (0..end).rev() {
            let pivot = chain[pivot_index].translation;
            let (Some(to_end), Some(to_goal)) = (
                (chain[end].translation - pivot).try_normalize(),
                (goal - pivot).try_normalize(),
            ) else {
                continue;
            };

            let swing = Quat::from_rotation_arc(to_end, to_goal);
            for joint in chain[pivot_index..].iter_mut() {
                joint.translation = pivot + swing * (joint.translation - pivot);
                joint.rotation = (swing * joint.rotation).normalize();
            }
        }
    }
}
