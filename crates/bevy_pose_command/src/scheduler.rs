use std::sync::Arc;

use bevy::{log::debug, prelude::Resource};
use bevy_pose_command_core::{arena::FrameArena, config::PoseCommandConfig, errors::ArenaError};

use crate::{
    animation::{CharacterAnimation, CharacterRig},
    errors::TaskResult,
    task::{EvaluationRequest, PoseTask},
};

/// Owns the frame memory that every character's command buffer is recorded into.
#[derive(Resource)]
pub struct PoseScheduler {
    arena: FrameArena,
    config: Arc<PoseCommandConfig>,
    frame: u64,
}

impl Default for PoseScheduler {
    fn default() -> Self {
        Self::new(PoseCommandConfig::default())
    }
}

impl PoseScheduler {
    pub fn new(config: PoseCommandConfig) -> Self {
        Self {
            arena: FrameArena::new(&config.arena),
            config: Arc::new(config),
            frame: 0,
        }
    }

    pub fn config(&self) -> &PoseCommandConfig {
        &self.config
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn arena(&self) -> &FrameArena {
        &self.arena
    }

    /// Finishes the previous frame of every task and recycles frame memory.
    pub fn begin_frame<'a>(
        &mut self,
        tasks: impl IntoIterator<Item = &'a mut PoseTask>,
    ) -> Result<(), ArenaError> {
        for task in tasks {
            task.finish_frame();
        }
        self.reset_arena()
    }

    /// Recycles frame memory. Fails while a command buffer of the current frame is alive.
    pub fn reset_arena(&mut self) -> Result<(), ArenaError> {
        self.arena.reset()?;
        self.frame += 1;
        debug!(
            "Pose frame {} started, {} bytes of frame memory in {} buckets",
            self.frame,
            self.arena.capacity(),
            self.arena.bucket_count()
        );
        Ok(())
    }

    pub fn schedule(
        &mut self,
        task: &mut PoseTask,
        rig: &CharacterRig,
        animation: &CharacterAnimation,
        request: EvaluationRequest,
    ) -> TaskResult<()> {
        task.begin(&mut self.arena, rig, animation, request, &self.config)
    }

    /// Waits for every task scheduled this frame.
    pub fn synchronize_all<'a>(&self, tasks: impl IntoIterator<Item = &'a mut PoseTask>) {
        for task in tasks {
            task.wait();
        }
    }
}
