//! Per-character pose evaluation for Bevy.
//!
//! Each frame, a [`CharacterAnimation`](animation::CharacterAnimation) is turned into a command
//! buffer by [`build_commands`](animation::build_commands) and handed to a
//! [`PoseTask`](task::PoseTask), which interprets it on the async compute pool, applies IK and
//! pose modifiers, and keeps the resulting pose until the next evaluation succeeds.
//! A [`CharacterPlayback`](playback::CharacterPlayback) can drive the animation instead, advancing
//! clip time and cross-fading queued clips and layers.
//! [`PoseCommandPlugin`](plugin::PoseCommandPlugin) runs this for every
//! [`CharacterPose`](plugin::CharacterPose) entity.

pub mod animation;
pub mod errors;
pub mod playback;
pub mod plugin;
pub mod scheduler;
pub mod task;

pub mod prelude {
    pub use crate::{
        animation::{
            ActiveAnimation, AnimationLayer, AnimationSource, CharacterAnimation, CharacterRig,
            LayerBlendMode, build_commands,
        },
        errors::{TaskError, TaskResult},
        playback::{CharacterPlayback, LayerPlayback, PlaybackParams, QueuedAnimation},
        plugin::{CharacterPose, PoseCommandPlugin},
        scheduler::PoseScheduler,
        task::{EvaluatedPose, EvaluationRequest, PoseTask, TaskState},
    };
    pub use bevy_pose_command_core::prelude::*;
}
