use bevy::prelude::*;
use bevy_pose_command_core::{command::CharacterId, config::PoseCommandConfig};

use crate::{
    animation::{CharacterAnimation, CharacterRig},
    playback::CharacterPlayback,
    scheduler::PoseScheduler,
    task::{EvaluationRequest, PoseTask},
};

/// Evaluates every [`CharacterPose`] once per frame during `PostUpdate`.
#[derive(Default)]
pub struct PoseCommandPlugin {
    pub config: PoseCommandConfig,
}

impl Plugin for PoseCommandPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(PoseScheduler::new(self.config.clone()))
            .add_systems(
                PostUpdate,
                (
                    begin_pose_frame,
                    schedule_character_poses,
                    synchronize_character_poses,
                )
                    .chain(),
            );
    }
}

/// An animated character. Its evaluated pose is read through [`CharacterPose::task`].
///
/// With a [`CharacterPlayback`], the playback is advanced by [`EvaluationRequest::time_delta`]
/// every frame and replaces the base animations and layers of `animation`.
#[derive(Component)]
pub struct CharacterPose {
    pub rig: CharacterRig,
    pub animation: CharacterAnimation,
    pub playback: Option<CharacterPlayback>,
    pub request: EvaluationRequest,
    pub task: PoseTask,
}

impl CharacterPose {
    pub fn new(character: CharacterId, rig: CharacterRig, animation: CharacterAnimation) -> Self {
        Self {
            rig,
            animation,
            playback: None,
            request: EvaluationRequest::default(),
            task: PoseTask::new(character),
        }
    }

    pub fn with_playback(mut self, playback: CharacterPlayback) -> Self {
        self.playback = Some(playback);
        self
    }
}

pub fn begin_pose_frame(
    mut scheduler: ResMut<PoseScheduler>,
    mut characters: Query<&mut CharacterPose>,
) {
    let tasks = characters.iter_mut().map(|character| &mut character.into_inner().task);
    if let Err(err) = scheduler.begin_frame(tasks) {
        error!("Could not recycle pose frame memory: {err}");
    }
}

pub fn schedule_character_poses(
    mut scheduler: ResMut<PoseScheduler>,
    mut characters: Query<&mut CharacterPose>,
) {
    for character in characters.iter_mut() {
        let CharacterPose {
            rig,
            animation,
            playback,
            request,
            task,
        } = character.into_inner();
        if let Some(playback) = playback {
            playback.advance(request.time_delta, rig.clips.as_ref());
            playback.apply(animation);
        }
        if let Err(err) = scheduler.schedule(task, rig, animation, *request) {
            warn!("{}: pose evaluation was not scheduled: {err}", task.character());
        }
    }
}

pub fn synchronize_character_poses(
    scheduler: Res<PoseScheduler>,
    mut characters: Query<&mut CharacterPose>,
) {
    let tasks = characters.iter_mut().map(|character| &mut character.into_inner().task);
    scheduler.synchronize_all(tasks);
}
