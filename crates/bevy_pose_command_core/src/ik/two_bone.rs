use bevy::math::{Quat, Vec3};

use crate::pose::JointTransform;

const MIN_BONE_LENGTH: f32 = 1e-5;

/// Analytic two-bone IK on absolute transforms `[root, mid, end]`.
///
/// The bend plane is kept from the input pose. Targets out of reach stretch the chain to
/// `max_reach_offset` short of full extension.
// Adapted from https://blog.littlepolygon.com/posts/twobone/
pub fn two_bone_ik(chain: &mut [JointTransform], target: Vec3, max_reach_offset: f32) {
    let [root, mid, end] = chain else {
        return;
    };

    let in_root_loc = root.translation;
    let in_mid_loc = mid.translation;
    let in_end_loc = end.translation;

    let upper_len = in_root_loc.distance(in_mid_loc);
    let lower_len = in_mid_loc.distance(in_end_loc);
    if upper_len < MIN_BONE_LENGTH || lower_len < MIN_BONE_LENGTH {
        return;
    }
    let max_len = (upper_len + lower_len - max_reach_offset).max(MIN_BONE_LENGTH);
    let min_len = (upper_len - lower_len).abs() + max_reach_offset;

    let Some(to_end) = (in_end_loc - in_root_loc).try_normalize() else {
        return;
    };
    let in_pole_vec = (in_mid_loc - in_root_loc)
        .reject_from_normalized(to_end)
        .try_normalize()
        .unwrap_or_else(|| to_end.any_orthonormal_vector());

    let to_target_offset = target - in_root_loc;
    let to_target_dist = to_target_offset.length().clamp(min_len.min(max_len), max_len);
    let Some(to_target) = to_target_offset.try_normalize() else {
        return;
    };
    let to_target_offset = to_target * to_target_dist;

    let to_target_swing = Quat::from_rotation_arc(to_end, to_target);
    let out_pole_vec = to_target_swing * in_pole_vec;

    // law of cosines for the angle at the root
    let cos_angle = ((to_target_dist * to_target_dist + upper_len * upper_len
        - lower_len * lower_len)
        / (2. * upper_len * to_target_dist))
        .clamp(-1., 1.);
    let angle = cos_angle.acos();

    let pole_dist = upper_len * angle.sin();
    let eff_dist = upper_len * cos_angle;
    let out_end_loc = in_root_loc + to_target_offset;
    let out_mid_loc = in_root_loc + eff_dist * to_target + pole_dist * out_pole_vec;

    let in_to_mid = in_mid_loc - in_root_loc;
    let out_to_mid = out_mid_loc - in_root_loc;
    let root_swing = Quat::from_rotation_arc(in_to_mid.normalize(), out_to_mid.normalize());
    let in_end_loc_with_root_swing = in_root_loc + root_swing * (in_end_loc - in_root_loc);
    let to_in_end = in_end_loc_with_root_swing - out_mid_loc;
    let to_out_end = out_end_loc - out_mid_loc;
    let mid_swing =
        Quat::from_rotation_arc(to_in_end.normalize(), to_out_end.normalize()) * root_swing;

    root.rotation = (root_swing * root.rotation).normalize();
    mid.translation = out_mid_loc;
    mid.rotation = (mid_swing * mid.rotation).normalize();
    end.translation = out_end_loc;
    end.rotation = (mid_swing * end.rotation).normalize();
}
