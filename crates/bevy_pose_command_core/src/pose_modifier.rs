use std::{fmt, sync::Arc};

use bevy::log::warn;
use indexmap::IndexMap;

use crate::{
    command::CharacterId, errors::ModifierError, pose::JointTransform, pose::PoseBuffer,
    skeleton::SkeletonDefinition,
};

/// Everything a pose modifier may read or change while it runs.
pub struct PoseModifierParams<'a> {
    pub character: CharacterId,
    pub skeleton: &'a SkeletonDefinition,
    /// Relative pose being evaluated.
    pub pose: &'a mut PoseBuffer,
    pub time_delta: f32,
    pub world: JointTransform,
}

/// What a pose modifier sees on the scheduling thread, around the evaluation job.
#[derive(Clone, Copy)]
pub struct PoseModifierContext<'a> {
    pub character: CharacterId,
    pub skeleton: &'a SkeletonDefinition,
    pub time_delta: f32,
    pub world: JointTransform,
}

/// Procedural adjustment applied to a pose during evaluation, such as look-at or foot locking.
///
/// [`execute`](Self::execute) runs on the evaluation job's thread and must not reach back into
/// the data structures of the frame that scheduled it. Anything it needs from the frame is
/// snapshotted in [`prepare`](Self::prepare), before the job is submitted, and anything it
/// produces is published in [`synchronize`](Self::synchronize), after the job has been waited on.
pub trait PoseModifier: Send + Sync {
    fn prepare(&self, _context: PoseModifierContext<'_>) -> Result<(), ModifierError> {
        Ok(())
    }

    fn execute(&self, params: PoseModifierParams<'_>) -> Result<(), ModifierError>;

    fn synchronize(&self, _context: PoseModifierContext<'_>) {}
}

/// When a modifier runs relative to the IK post-process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ModifierStage {
    /// Invoked from the command stream through a `PoseModifier` instruction.
    #[default]
    BeforeIk,
    /// Invoked after IK has been solved, on the final relative pose.
    AfterIk,
}

#[derive(Clone)]
struct ModifierEntry {
    modifier: Arc<dyn PoseModifier>,
    stage: ModifierStage,
}

/// Named pose modifiers in registration order. A modifier's slot is its registration index and is
/// what `PoseModifier` instructions refer to.
#[derive(Clone, Default)]
pub struct PoseModifierStack {
    entries: IndexMap<String, ModifierEntry>,
}

impl PoseModifierStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `modifier` under `name`. Returns `false`, leaving the stack untouched, if the
    /// name is already taken.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        stage: ModifierStage,
        modifier: impl PoseModifier + 'static,
    ) -> bool {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return false;
        }
        self.entries.insert(
            name,
            ModifierEntry {
                modifier: Arc::new(modifier),
                stage,
            },
        );
        true
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        stage: ModifierStage,
        modifier: impl PoseModifier + 'static,
    ) -> Self {
        self.push(name, stage, modifier);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.entries.get_index_of(name)
    }

    pub fn get(&self, slot: usize) -> Option<(&str, &dyn PoseModifier, ModifierStage)> {
        self.entries
            .get_index(slot)
            .map(|(name, entry)| (name.as_str(), entry.modifier.as_ref(), entry.stage))
    }

    /// Prepares every modifier in registration order, whatever its stage.
    pub fn prepare(&self, context: PoseModifierContext<'_>) {
        for (name, entry) in self.entries.iter() {
            if let Err(err) = entry.modifier.prepare(context) {
                warn!(
                    "{}: pose modifier {:?} failed to prepare: {}",
                    context.character, name, err
                );
            }
        }
    }

    /// Synchronizes every modifier in registration order, whatever its stage.
    pub fn synchronize(&self, context: PoseModifierContext<'_>) {
        for entry in self.entries.values() {
            entry.modifier.synchronize(context);
        }
    }

    /// Slots of the modifiers registered for `stage`, in registration order.
    pub fn slots(&self, stage: ModifierStage) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .values()
            .enumerate()
            .filter(move |(_, entry)| entry.stage == stage)
            .map(|(slot, _)| slot)
    }
}

impl fmt::Debug for PoseModifierStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, entry)| (name, entry.stage)))
            .finish()
    }
}
