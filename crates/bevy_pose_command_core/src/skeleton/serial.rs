use bevy::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{JointDefinition, LimbDefinition, LimbHandle, SkeletonDefinition};
use crate::{
    errors::{SkeletonError, SkeletonResult},
    ik::SolverKind,
    pose::JointTransform,
};

/// RON representation of a skeleton. Joints, LOD masks and limb chains refer to joints by name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkeletonSerial {
    pub joints: Vec<JointSerial>,
    #[serde(default)]
    pub lod_masks: Vec<Vec<String>>,
    #[serde(default)]
    pub limbs: Vec<LimbSerial>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JointSerial {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Bind pose rotation as `(x, y, z, w)`.
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    #[serde(default)]
    pub translation: [f32; 3],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimbSerial {
    pub handle: String,
    /// One of `2BIK`, `3BIK` or `CCDX`.
    pub solver: String,
    pub chain: Vec<String>,
}

fn identity_rotation() -> [f32; 4] {
    [0., 0., 0., 1.]
}

impl TryFrom<SkeletonSerial> for SkeletonDefinition {
    type Error = SkeletonError;

    fn try_from(value: SkeletonSerial) -> SkeletonResult<Self> {
        let mut joints: Vec<JointDefinition> = Vec::with_capacity(value.joints.len());
        for joint in value.joints {
            let parent = joint
                .parent
                .as_deref()
                .map(|parent| {
                    joints
                        .iter()
                        .position(|candidate| candidate.name == parent)
                        .map(|index| index as u16)
                        .ok_or_else(|| SkeletonError::UnknownJoint(parent.to_string()))
                })
                .transpose()?;

            joints.push(JointDefinition {
                name: joint.name,
                parent,
                bind_pose: JointTransform::new(
                    Quat::from_array(joint.rotation).normalize(),
                    Vec3::from_array(joint.translation),
                ),
            });
        }

        let mut skeleton = SkeletonDefinition::new(joints)?;

        for names in value.lod_masks {
            let mut mask = resolve_names(&skeleton, &names)?;
            mask.sort_unstable();
            mask.dedup();
            skeleton = skeleton.with_lod_mask(mask)?;
        }

        for limb in value.limbs {
            let handle = LimbHandle::from_tag(&limb.handle)
                .ok_or_else(|| SkeletonError::InvalidLimbHandle(limb.handle.clone()))?;
            let solver = SolverKind::from_tag(&limb.solver)
                .ok_or_else(|| SkeletonError::UnknownSolverTag(limb.solver.clone()))?;
            let chain = resolve_names(&skeleton, &limb.chain)?;
            skeleton = skeleton.with_limb(LimbDefinition {
                handle,
                solver,
                chain,
            })?;
        }

        Ok(skeleton)
    }
}

fn resolve_names(skeleton: &SkeletonDefinition, names: &[String]) -> SkeletonResult<Vec<u16>> {
    names
        .iter()
        .map(|name| {
            skeleton
                .joint_index(name)
                .map(|index| index as u16)
                .ok_or_else(|| SkeletonError::UnknownJoint(name.clone()))
        })
        .collect()
}
