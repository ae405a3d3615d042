use std::{fmt, sync::Arc};

use crate::{
    arena::FrameView,
    clip_source::ClipSource,
    pose::JointTransform,
    pose_modifier::PoseModifierStack,
    skeleton::SkeletonDefinition,
};

/// Identifies the character a command buffer evaluates, used in diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacterId(pub u64);

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "character {}", self.0)
    }
}

/// Per-frame context consulted by every instruction of a command buffer.
#[derive(Clone)]
pub struct EvaluationState {
    pub character: CharacterId,
    pub skeleton: Arc<SkeletonDefinition>,
    pub clips: Arc<dyn ClipSource>,
    pub modifiers: Arc<PoseModifierStack>,
    pub lod: u8,
    pub time_delta: f32,
    /// World transform of the character root.
    pub world: JointTransform,
    joint_masks: Vec<FrameView>,
    active_mask: Option<usize>,
}

impl EvaluationState {
    pub fn new(
        character: CharacterId,
        skeleton: Arc<SkeletonDefinition>,
        clips: Arc<dyn ClipSource>,
    ) -> Self {
        Self {
            character,
            skeleton,
            clips,
            modifiers: Arc::default(),
            lod: 0,
            time_delta: 0.,
            world: JointTransform::IDENTITY,
            joint_masks: Vec::new(),
            active_mask: None,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Arc<PoseModifierStack>) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_lod(mut self, lod: u8) -> Self {
        self.lod = lod;
        self
    }

    pub fn with_time_delta(mut self, time_delta: f32) -> Self {
        self.time_delta = time_delta;
        self
    }

    pub fn with_world(mut self, world: JointTransform) -> Self {
        self.world = world;
        self
    }

    pub fn joint_count(&self) -> usize {
        self.skeleton.joint_count()
    }

    pub(crate) fn register_joint_mask(&mut self, mask: FrameView) {
        self.joint_masks.push(mask);
    }

    pub fn joint_mask_count(&self) -> usize {
        self.joint_masks.len()
    }

    /// Installs the mask registered at `slot`, or removes the active mask when `slot` is `None`.
    /// Returns `false` if no mask is registered at `slot`.
    pub fn install_joint_mask(&mut self, slot: Option<usize>) -> bool {
        match slot {
            Some(slot) if slot >= self.joint_masks.len() => false,
            slot => {
                self.active_mask = slot;
                true
            }
        }
    }

    /// Sorted joint ids of the active mask, if any.
    pub fn active_joint_mask(&self) -> Option<&[u16]> {
        self.active_mask
            .and_then(|slot| self.joint_masks.get(slot))
            .map(|mask| mask.cast::<u16>().unwrap_or_default())
    }

    pub fn is_joint_active(&self, joint: usize) -> bool {
        mask_contains(self.active_joint_mask(), joint)
    }
}

/// Whether `joint` passes `mask`. No mask lets every joint through.
pub fn mask_contains(mask: Option<&[u16]>, joint: usize) -> bool {
    match mask {
        None => true,
        Some(mask) => u16::try_from(joint).is_ok_and(|joint| mask.binary_search(&joint).is_ok()),
    }
}

impl fmt::Debug for EvaluationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationState")
            .field("character", &self.character)
            .field("joints", &self.skeleton.joint_count())
            .field("lod", &self.lod)
            .field("time_delta", &self.time_delta)
            .field("world", &self.world)
            .field("joint_masks", &self.joint_masks.len())
            .field("active_mask", &self.active_mask)
            .finish()
    }
}
