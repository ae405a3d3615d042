//! Conversions between relative (parent space) and absolute (character space) joint transforms.

use crate::{pose::JointTransform, skeleton::SkeletonDefinition};

/// Composes every joint with its ancestors. Relies on parents preceding their children.
pub fn relative_to_absolute(
    skeleton: &SkeletonDefinition,
    relative: &[JointTransform],
    absolute: &mut Vec<JointTransform>,
) {
    absolute.clear();
    absolute.reserve(relative.len());
    for (joint, local) in relative.iter().enumerate() {
        let global = match skeleton.parent(joint) {
            Some(parent) => absolute[parent] * *local,
            None => *local,
        };
        absolute.push(global);
    }
}

/// Relative transform of `joint` given the absolute transforms of it and its parent.
pub fn absolute_to_relative(
    skeleton: &SkeletonDefinition,
    joint: usize,
    absolute: &[JointTransform],
) -> JointTransform {
    match skeleton.parent(joint) {
        Some(parent) => absolute[parent].inverse() * absolute[joint],
        None => absolute[joint],
    }
}

/// Recomputes the absolute transforms of every descendant of `root` from their relative ones.
pub fn refresh_descendants(
    skeleton: &SkeletonDefinition,
    root: usize,
    relative: &[JointTransform],
    absolute: &mut [JointTransform],
) {
    let mut dirty = vec![false; absolute.len()];
    if let Some(flag) = dirty.get_mut(root) {
        *flag = true;
    }

    for joint in root + 1..absolute.len() {
        if let Some(parent) = skeleton.parent(joint) {
            if dirty[parent] {
                absolute[joint] = absolute[parent] * relative[joint];
                dirty[joint] = true;
            }
        }
    }
}
