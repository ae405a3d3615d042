//! Fixed-layout instruction records.
//!
//! Every record is plain old data whose first byte is its opcode, so a stream of records can be
//! walked by reading one byte and skipping `Opcode::record_size` bytes.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use super::Opcode;
use crate::{
    clip_source::ClipId,
    pose::{BufferSelect, JointFlags, PoseInit},
};

bitflags! {
    /// Options carried by the sampling instructions.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SampleFlags: u8 {
        /// Write into the temporary buffer instead of the target buffer.
        const TEMPORARY_BUFFER = 1 << 0;
        /// Seed the root joint from the clip's first frame instead of identity.
        const ANIMATION_DRIVEN_MOTION = 1 << 1;
    }
}

impl SampleFlags {
    pub fn buffer(self) -> BufferSelect {
        if self.contains(SampleFlags::TEMPORARY_BUFFER) {
            BufferSelect::Temporary
        } else {
            BufferSelect::Target
        }
    }
}

impl From<BufferSelect> for SampleFlags {
    fn from(value: BufferSelect) -> Self {
        match value {
            BufferSelect::Target => SampleFlags::empty(),
            BufferSelect::Temporary => SampleFlags::TEMPORARY_BUFFER,
        }
    }
}

/// How `PerJointBlending` combines a layer with the target pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PerJointBlendMode {
    /// Replaces the target, in proportion to each joint's layer weight.
    #[default]
    Override = 0,
    /// Composes the layer as a delta on top of the target.
    Additive = 1,
}

impl PerJointBlendMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Override),
            1 => Some(Self::Additive),
            _ => None,
        }
    }
}

/// Resets a pose buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ClearPoseBuffer {
    pub opcode: u8,
    pub buffer: u8,
    pub initial_flags: u8,
    pub pose_init: u8,
}

impl ClearPoseBuffer {
    pub fn new(buffer: BufferSelect, pose_init: PoseInit, initial_flags: JointFlags) -> Self {
        Self {
            opcode: Opcode::ClearPoseBuffer as u8,
            buffer: buffer as u8,
            initial_flags: initial_flags.bits(),
            pose_init: pose_init as u8,
        }
    }

    pub fn initial_flags(&self) -> JointFlags {
        JointFlags::from_bits_truncate(self.initial_flags)
    }
}

/// Samples every joint of a clip, falling back to the bind pose for unanimated channels.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SampleAddAnimFull {
    pub opcode: u8,
    pub flags: u8,
    pub _pad: [u8; 2],
    pub clip: u32,
    pub normalized_time: f32,
    pub weight: f32,
}

impl SampleAddAnimFull {
    pub fn new(clip: ClipId, normalized_time: f32, weight: f32, flags: SampleFlags) -> Self {
        Self {
            opcode: Opcode::SampleAddAnimFull as u8,
            flags: flags.bits(),
            _pad: [0; 2],
            clip: clip.0,
            normalized_time,
            weight,
        }
    }

    pub fn flags(&self) -> SampleFlags {
        SampleFlags::from_bits_truncate(self.flags)
    }
}

/// Samples only the channels a clip animates.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SampleAddAnimPart {
    pub opcode: u8,
    pub flags: u8,
    pub _pad: [u8; 2],
    pub clip: u32,
    pub normalized_time: f32,
    pub weight: f32,
}

impl SampleAddAnimPart {
    pub fn new(clip: ClipId, normalized_time: f32, weight: f32, buffer: BufferSelect) -> Self {
        Self {
            opcode: Opcode::SampleAddAnimPart as u8,
            flags: SampleFlags::from(buffer).bits(),
            _pad: [0; 2],
            clip: clip.0,
            normalized_time,
            weight,
        }
    }

    pub fn flags(&self) -> SampleFlags {
        SampleFlags::from_bits_truncate(self.flags)
    }
}

/// Overwrites the channels a clip animates instead of accumulating them.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SampleReplaceAnimPart {
    pub opcode: u8,
    pub flags: u8,
    pub _pad: [u8; 2],
    pub clip: u32,
    pub normalized_time: f32,
    pub weight: f32,
}

impl SampleReplaceAnimPart {
    pub fn new(clip: ClipId, normalized_time: f32, weight: f32, buffer: BufferSelect) -> Self {
        Self {
            opcode: Opcode::SampleReplaceAnimPart as u8,
            flags: SampleFlags::from(buffer).bits(),
            _pad: [0; 2],
            clip: clip.0,
            normalized_time,
            weight,
        }
    }

    pub fn flags(&self) -> SampleFlags {
        SampleFlags::from_bits_truncate(self.flags)
    }
}

/// Folds one pose buffer into the other with a weight.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct AddPoseBuffer {
    pub opcode: u8,
    pub source: u8,
    pub target: u8,
    pub _pad: u8,
    pub weight: f32,
}

impl AddPoseBuffer {
    pub fn new(source: BufferSelect, target: BufferSelect, weight: f32) -> Self {
        Self {
            opcode: Opcode::AddPoseBuffer as u8,
            source: source as u8,
            target: target as u8,
            _pad: 0,
            weight,
        }
    }
}

/// Blends a layer into the target using the layer's own per-joint weights.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PerJointBlending {
    pub opcode: u8,
    pub source: u8,
    pub target: u8,
    pub mode: u8,
}

impl PerJointBlending {
    pub fn new(source: BufferSelect, target: BufferSelect, mode: PerJointBlendMode) -> Self {
        Self {
            opcode: Opcode::PerJointBlending as u8,
            source: source as u8,
            target: target as u8,
            mode: mode as u8,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct NormalizeFull {
    pub opcode: u8,
    pub buffer: u8,
    pub _pad: [u8; 2],
}

impl NormalizeFull {
    pub fn new(buffer: BufferSelect) -> Self {
        Self {
            opcode: Opcode::NormalizeFull as u8,
            buffer: buffer as u8,
            _pad: [0; 2],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ScaleUniformFull {
    pub opcode: u8,
    pub buffer: u8,
    pub _pad: [u8; 2],
    pub scale: f32,
}

impl ScaleUniformFull {
    pub fn new(buffer: BufferSelect, scale: f32) -> Self {
        Self {
            opcode: Opcode::ScaleUniformFull as u8,
            buffer: buffer as u8,
            _pad: [0; 2],
            scale,
        }
    }
}

/// Installs a registered joint mask for the rest of the stream.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct JointMask {
    pub opcode: u8,
    pub _pad: u8,
    pub slot: u16,
}

impl JointMask {
    /// Slot value that removes the active mask.
    pub const CLEAR: u16 = u16::MAX;

    pub fn install(slot: u16) -> Self {
        Self {
            opcode: Opcode::JointMask as u8,
            _pad: 0,
            slot,
        }
    }

    pub fn clear() -> Self {
        Self::install(Self::CLEAR)
    }

    pub fn slot(&self) -> Option<usize> {
        (self.slot != Self::CLEAR).then_some(self.slot as usize)
    }
}

/// Runs the pose modifier registered at `slot` on a pose buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PoseModifier {
    pub opcode: u8,
    pub buffer: u8,
    pub slot: u16,
}

impl PoseModifier {
    pub fn new(buffer: BufferSelect, slot: u16) -> Self {
        Self {
            opcode: Opcode::PoseModifier as u8,
            buffer: buffer as u8,
            slot,
        }
    }
}

/// Full-skeleton sampling of a single-frame pose asset.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SampleAddPoseFull {
    pub opcode: u8,
    pub flags: u8,
    pub _pad: [u8; 2],
    pub pose: u32,
    pub weight: f32,
}

impl SampleAddPoseFull {
    pub fn new(pose: ClipId, weight: f32, flags: SampleFlags) -> Self {
        Self {
            opcode: Opcode::SampleAddPoseFull as u8,
            flags: flags.bits(),
            _pad: [0; 2],
            pose: pose.0,
            weight,
        }
    }

    pub fn flags(&self) -> SampleFlags {
        SampleFlags::from_bits_truncate(self.flags)
    }
}

/// Partial sampling of a single-frame pose asset.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SamplePosePart {
    pub opcode: u8,
    pub flags: u8,
    pub _pad: [u8; 2],
    pub pose: u32,
    pub weight: f32,
}

impl SamplePosePart {
    pub fn new(pose: ClipId, weight: f32, buffer: BufferSelect) -> Self {
        Self {
            opcode: Opcode::SamplePosePart as u8,
            flags: SampleFlags::from(buffer).bits(),
            _pad: [0; 2],
            pose: pose.0,
            weight,
        }
    }

    pub fn flags(&self) -> SampleFlags {
        SampleFlags::from_bits_truncate(self.flags)
    }
}

/// Checks a pose buffer for non-finite values and non-unit rotations. Only evaluated in debug
/// builds.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VerifyFull {
    pub opcode: u8,
    pub buffer: u8,
    pub _pad: [u8; 2],
}

impl VerifyFull {
    pub fn new(buffer: BufferSelect) -> Self {
        Self {
            opcode: Opcode::VerifyFull as u8,
            buffer: buffer as u8,
            _pad: [0; 2],
        }
    }
}
