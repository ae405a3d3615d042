mod limb;
mod serial;

pub use limb::*;
pub use serial::*;

use crate::{
    errors::{SkeletonError, SkeletonResult},
    pose::JointTransform,
};

/// Largest joint count a skeleton may have. Joint masks store indices as `u16`.
pub const MAX_JOINTS: usize = u16::MAX as usize;

#[derive(Clone, Debug, PartialEq)]
pub struct JointDefinition {
    pub name: String,
    pub parent: Option<u16>,
    /// Relative transform of the joint when no animation is applied.
    pub bind_pose: JointTransform,
}

/// Static description of a character's joint hierarchy.
///
/// Joints are stored in an order where every parent precedes its children, which lets relative
/// and absolute poses be converted in a single forward pass. Level-of-detail masks list the
/// joints that stay animated at each LOD, sorted ascending so they can be used directly as joint
/// masks. LOD 0 animates every joint.
#[derive(Clone, Debug, PartialEq)]
pub struct SkeletonDefinition {
    joints: Vec<JointDefinition>,
    lod_masks: Vec<Vec<u16>>,
    limbs: Vec<LimbDefinition>,
}

impl SkeletonDefinition {
    pub fn new(joints: Vec<JointDefinition>) -> SkeletonResult<Self> {
        if joints.is_empty() {
            return Err(SkeletonError::Empty);
        }
        if joints.len() > MAX_JOINTS {
            return Err(SkeletonError::TooManyJoints {
                count: joints.len(),
                max: MAX_JOINTS,
            });
        }

        for (index, joint) in joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                if parent as usize >= index {
                    return Err(SkeletonError::ParentAfterChild {
                        joint: index,
                        name: joint.name.clone(),
                        parent: parent as usize,
                    });
                }
            }
            if joints[..index].iter().any(|other| other.name == joint.name) {
                return Err(SkeletonError::DuplicateJoint {
                    name: joint.name.clone(),
                });
            }
        }

        Ok(Self {
            joints,
            lod_masks: Vec::new(),
            limbs: Vec::new(),
        })
    }

    pub fn from_ron_str(source: &str) -> SkeletonResult<Self> {
        let serial: SkeletonSerial = ron::de::from_str(source)?;
        serial.try_into()
    }

    /// Appends the mask for the next LOD level, starting at LOD 1.
    pub fn with_lod_mask(mut self, mask: Vec<u16>) -> SkeletonResult<Self> {
        let lod = self.lod_masks.len() + 1;
        let mut previous: Option<u16> = None;
        for joint in mask.iter().copied() {
            if joint as usize >= self.joints.len() || previous.is_some_and(|p| p >= joint) {
                return Err(SkeletonError::InvalidLodMask {
                    lod,
                    joint: joint as usize,
                });
            }
            previous = Some(joint);
        }

        self.lod_masks.push(mask);
        Ok(self)
    }

    pub fn with_limb(mut self, limb: LimbDefinition) -> SkeletonResult<Self> {
        let name = limb.handle.to_string();
        if self.limb(limb.handle).is_some() {
            return Err(SkeletonError::DuplicateLimb(name));
        }
        if !limb.solver.accepts_chain_len(limb.chain.len()) {
            return Err(SkeletonError::InvalidChainLength {
                limb: name,
                solver: limb.solver.to_string(),
                found: limb.chain.len(),
            });
        }
        if let Some(joint) = limb
            .chain
            .iter()
            .find(|joint| **joint as usize >= self.joints.len())
        {
            return Err(SkeletonError::UnknownJoint(joint.to_string()));
        }
        for link in limb.chain.windows(2) {
            if self.parent(link[1] as usize) != Some(link[0] as usize) {
                return Err(SkeletonError::DisconnectedChain {
                    limb: name,
                    joint: link[0] as usize,
                });
            }
        }

        self.limbs.push(limb);
        Ok(self)
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joints(&self) -> &[JointDefinition] {
        &self.joints
    }

    pub fn joint(&self, index: usize) -> Option<&JointDefinition> {
        self.joints.get(index)
    }

    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|joint| joint.name == name)
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.joints
            .get(index)
            .and_then(|joint| joint.parent)
            .map(|parent| parent as usize)
    }

    pub fn bind_pose(&self, index: usize) -> JointTransform {
        self.joints
            .get(index)
            .map(|joint| joint.bind_pose)
            .unwrap_or_default()
    }

    /// Joints animated at `lod`. `None` means every joint is animated.
    pub fn lod_mask(&self, lod: u8) -> Option<&[u16]> {
        match lod {
            0 => None,
            lod => self
                .lod_masks
                .get(lod as usize - 1)
                .or(self.lod_masks.last())
                .map(Vec::as_slice),
        }
    }

    pub fn lod_count(&self) -> usize {
        self.lod_masks.len() + 1
    }

    pub fn limbs(&self) -> &[LimbDefinition] {
        &self.limbs
    }

    pub fn limb(&self, handle: LimbHandle) -> Option<&LimbDefinition> {
        self.limbs.iter().find(|limb| limb.handle == handle)
    }

    pub fn is_ancestor(&self, ancestor: usize, joint: usize) -> bool {
        let mut current = self.parent(joint);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }
}
