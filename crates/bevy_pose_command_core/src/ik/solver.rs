use std::fmt;

use bevy::math::Vec3;

use super::{ccd::solve_ccd, three_bone::three_bone_ik, two_bone::two_bone_ik};
use crate::{config::IkConfig, pose::JointTransform};

/// IK algorithm used for a limb, identified in skeleton files by a four-character tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SolverKind {
    /// `2BIK`: analytic solver for a root, middle and end joint.
    TwoBone,
    /// `3BIK`: analytic solver for chains with one extra segment, such as a leg ending in a toe.
    ThreeBone,
    /// `CCDX`: cyclic coordinate descent over a chain of any length.
    Ccd,
}

impl SolverKind {
    pub const fn tag(self) -> &'static str {
        match self {
            SolverKind::TwoBone => "2BIK",
            SolverKind::ThreeBone => "3BIK",
            SolverKind::Ccd => "CCDX",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "2BIK" => Some(SolverKind::TwoBone),
            "3BIK" => Some(SolverKind::ThreeBone),
            "CCDX" => Some(SolverKind::Ccd),
            _ => None,
        }
    }

    pub fn accepts_chain_len(self, len: usize) -> bool {
        match self {
            SolverKind::TwoBone => len == 3,
            SolverKind::ThreeBone => len == 4,
            SolverKind::Ccd => len >= 2,
        }
    }

    /// Moves the absolute transforms of `chain` so that its last joint gets as close as possible
    /// to `goal`. The first joint keeps its position.
    pub fn solve(self, chain: &mut [JointTransform], goal: Vec3, config: &IkConfig) {
        if !self.accepts_chain_len(chain.len()) {
            return;
        }
        match self {
            SolverKind::TwoBone => two_bone_ik(chain, goal, config.max_reach_offset),
            SolverKind::ThreeBone => three_bone_ik(chain, goal, config.max_reach_offset),
            SolverKind::Ccd => solve_ccd(chain, goal, config.ccd_iterations, config.ccd_tolerance),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
