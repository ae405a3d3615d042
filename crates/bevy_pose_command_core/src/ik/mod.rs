//! IK post-process, run on the absolute pose once the command stream has been interpreted.

mod ccd;
mod solver;
mod three_bone;
mod two_bone;

pub use ccd::solve_ccd;
pub use solver::SolverKind;
pub use three_bone::three_bone_ik;
pub use two_bone::two_bone_ik;

use bevy::{
    log::{trace, warn},
    math::{Quat, Vec3},
};

use crate::{
    config::IkConfig,
    pose::JointTransform,
    skeleton::{LimbHandle, SkeletonDefinition},
    space_conversion::{absolute_to_relative, refresh_descendants},
};

/// Goal for one limb of a character.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkTarget {
    pub limb: LimbHandle,
    /// End effector goal in character space.
    pub position: Vec3,
    /// End effector orientation in character space. `None` keeps the animated orientation.
    pub orientation: Option<Quat>,
    pub weight: f32,
    /// Joint whose relative translation along `x`, clamped to `[0, 1]`, scales `weight`. Lets
    /// animations fade IK in and out through a dedicated joint track.
    pub weight_joint: Option<u16>,
}

impl IkTarget {
    pub fn new(limb: LimbHandle, position: Vec3) -> Self {
        Self {
            limb,
            position,
            orientation: None,
            weight: 1.,
            weight_joint: None,
        }
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_weight_joint(mut self, joint: u16) -> Self {
        self.weight_joint = Some(joint);
        self
    }

    /// Weight after applying the driving joint, clamped to `[0, 1]`.
    pub fn effective_weight(&self, relative: &[JointTransform]) -> f32 {
        let driver = match self.weight_joint {
            Some(joint) => relative
                .get(joint as usize)
                .map_or(0., |transform| transform.translation.x.clamp(0., 1.)),
            None => 1.,
        };
        (self.weight * driver).clamp(0., 1.)
    }
}

/// Solves every target in order, updating both the relative and the absolute pose. Returns how
/// many targets were applied.
///
/// Targets at or below the configured weight threshold are skipped. The end effector is moved
/// toward the goal in proportion to the target's weight, and its orientation is blended toward
/// the target orientation by the same amount.
pub fn apply_ik(
    skeleton: &SkeletonDefinition,
    targets: &[IkTarget],
    relative: &mut [JointTransform],
    absolute: &mut [JointTransform],
    config: &IkConfig,
) -> usize {
    let mut applied = 0;
    let mut chain = Vec::new();

    for target in targets {
        let Some(limb) = skeleton.limb(target.limb) else {
            warn!("IK target refers to unknown limb {}, skipping it", target.limb);
            continue;
        };

        let weight = target.effective_weight(relative);
        if weight <= config.weight_threshold {
            trace!("IK target {} skipped at weight {}", target.limb, weight);
            continue;
        }

        let Some(&end) = limb.chain.last() else {
            continue;
        };
        let end = end as usize;
        if limb.chain.iter().any(|joint| *joint as usize >= absolute.len()) {
            continue;
        }

        chain.clear();
        chain.extend(limb.chain.iter().map(|joint| absolute[*joint as usize]));

        let goal = absolute[end].translation.lerp(target.position, weight);
        limb.solver.solve(&mut chain, goal, config);

        if let (Some(effector), Some(orientation)) = (chain.last_mut(), target.orientation) {
            effector.rotation = effector.rotation.slerp(orientation, weight).normalize();
        }

        for (joint, solved) in limb.chain.iter().zip(chain.iter()) {
            absolute[*joint as usize] = *solved;
        }
        for joint in limb.chain.iter() {
            let joint = *joint as usize;
            relative[joint] = absolute_to_relative(skeleton, joint, absolute);
        }
        if let Some(root) = limb.root() {
            refresh_descendants(skeleton, root, relative, absolute);
        }

        applied += 1;
    }

    applied
}
