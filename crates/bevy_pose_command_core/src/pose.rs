use std::ops::Mul;

use bevy::math::{Quat, Vec2, Vec3};
use bitflags::bitflags;

/// Rotation and translation of a joint, relative to its parent unless stated otherwise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointTransform {
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Default for JointTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl JointTransform {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
    };

    /// Additive identity used as the starting point of weighted accumulation.
    pub const ZERO: Self = Self {
        rotation: Quat::from_xyzw(0., 0., 0., 0.),
        translation: Vec3::ZERO,
    };

    pub fn new(rotation: Quat, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.translation
    }

    pub fn is_finite(&self) -> bool {
        self.rotation.is_finite() && self.translation.is_finite()
    }
}

impl Mul for JointTransform {
    type Output = JointTransform;

    fn mul(self, rhs: JointTransform) -> JointTransform {
        JointTransform {
            rotation: self.rotation * rhs.rotation,
            translation: self.translation + self.rotation * rhs.translation,
        }
    }
}

bitflags! {
    /// Which channels of a joint have been written in a pose buffer.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct JointFlags: u8 {
        const ORIENTATION = 1 << 0;
        const POSITION = 1 << 1;
        const SCALE = 1 << 2;
        /// The stored channels are deltas to be composed onto another pose.
        const ADDITIVE = 1 << 3;
        const PRESENT = Self::ORIENTATION.bits() | Self::POSITION.bits();
    }
}

/// Initial rotation written by `ClearPoseBuffer`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum PoseInit {
    /// All-zero quaternion, the starting point for weighted accumulation.
    #[default]
    Zero = 0,
    Identity = 1,
}

impl PoseInit {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Zero),
            1 => Some(Self::Identity),
            _ => None,
        }
    }
}

/// Selects one of the two pose buffers an instruction operates on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BufferSelect {
    #[default]
    Target = 0,
    Temporary = 1,
}

impl BufferSelect {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Target),
            1 => Some(Self::Temporary),
            _ => None,
        }
    }
}

/// Per-joint working storage: transforms, channel flags and accumulated weights. The weight's `x`
/// tracks the orientation channel and `y` the position channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoseBuffer {
    joints: Vec<JointTransform>,
    flags: Vec<JointFlags>,
    weights: Vec<Vec2>,
}

impl PoseBuffer {
    pub fn new(joint_count: usize) -> Self {
        let mut buffer = Self::default();
        buffer.prepare(joint_count);
        buffer
    }

    /// Resizes to `joint_count` joints and clears everything, reusing the existing allocations.
    pub fn prepare(&mut self, joint_count: usize) {
        self.joints.resize(joint_count, JointTransform::ZERO);
        self.flags.resize(joint_count, JointFlags::empty());
        self.weights.resize(joint_count, Vec2::ZERO);
        self.clear(PoseInit::Zero, JointFlags::empty());
    }

    pub fn clear(&mut self, init: PoseInit, flags: JointFlags) {
        let initial = match init {
            PoseInit::Zero => JointTransform::ZERO,
            PoseInit::Identity => JointTransform::IDENTITY,
        };
        self.joints.fill(initial);
        self.flags.fill(flags);
        self.weights.fill(Vec2::ZERO);
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joints(&self) -> &[JointTransform] {
        &self.joints
    }

    pub fn joints_mut(&mut self) -> &mut [JointTransform] {
        &mut self.joints
    }

    pub fn flags(&self) -> &[JointFlags] {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut [JointFlags] {
        &mut self.flags
    }

    pub fn weights(&self) -> &[Vec2] {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut [Vec2] {
        &mut self.weights
    }

    pub fn joint(&self, index: usize) -> Option<&JointTransform> {
        self.joints.get(index)
    }

    /// Mutable access to all three channels at once.
    pub fn parts_mut(&mut self) -> (&mut [JointTransform], &mut [JointFlags], &mut [Vec2]) {
        (&mut self.joints, &mut self.flags, &mut self.weights)
    }
}

/// The target and temporary pose buffers owned by one evaluation job.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoseBuffers {
    pub target: PoseBuffer,
    pub temporary: PoseBuffer,
}

impl PoseBuffers {
    pub fn new(joint_count: usize) -> Self {
        Self {
            target: PoseBuffer::new(joint_count),
            temporary: PoseBuffer::new(joint_count),
        }
    }

    pub fn prepare(&mut self, joint_count: usize) {
        self.target.prepare(joint_count);
        self.temporary.prepare(joint_count);
    }

    pub fn joint_count(&self) -> usize {
        self.target.joint_count()
    }

    pub fn get(&self, select: BufferSelect) -> &PoseBuffer {
        match select {
            BufferSelect::Target => &self.target,
            BufferSelect::Temporary => &self.temporary,
        }
    }

    pub fn get_mut(&mut self, select: BufferSelect) -> &mut PoseBuffer {
        match select {
            BufferSelect::Target => &mut self.target,
            BufferSelect::Temporary => &mut self.temporary,
        }
    }

    /// Borrows `source` immutably and `target` mutably. Returns `None` when both name the same
    /// buffer.
    pub fn split(
        &mut self,
        source: BufferSelect,
        target: BufferSelect,
    ) -> Option<(&PoseBuffer, &mut PoseBuffer)> {
        match (source, target) {
            (BufferSelect::Temporary, BufferSelect::Target) => {
                Some((&self.temporary, &mut self.target))
            }
            (BufferSelect::Target, BufferSelect::Temporary) => {
                Some((&self.target, &mut self.temporary))
            }
            _ => None,
        }
    }
}
