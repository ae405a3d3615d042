//! Core of the pose command buffer evaluator.
//!
//! Each frame, every animated character records a compact stream of instructions (sample this
//! clip, fold that layer in, normalize, ...) into a [`FrameArena`](arena::FrameArena). The
//! resulting [`CommandBuffer`](command::CommandBuffer) only holds read-only views of frame memory
//! and can be interpreted on a worker thread against a pair of
//! [`PoseBuffers`](pose::PoseBuffers). The interpreted pose is then handed to the
//! [IK post-process](ik) and to any registered [pose modifiers](pose_modifier).
//!
//! The `bevy_pose_command` crate builds the per-character task scheduling and the Bevy plugin on
//! top of this crate.

pub mod arena;
pub mod blending;
pub mod clip_source;
pub mod command;
pub mod config;
pub mod errors;
pub mod ik;
pub mod interpolation;
pub mod pose;
pub mod pose_modifier;
pub mod skeleton;
pub mod space_conversion;

pub mod prelude {
    pub use crate::{
        arena::{FrameArena, FrameBlock, FrameView},
        clip_source::{AnimationClip, ClipId, ClipLibrary, ClipSource, JointSample},
        command::{
            CharacterId, Command, CommandBuffer, CommandBuilder, EvaluationState, ExecutionStats,
            Opcode, PerJointBlendMode, SampleFlags, records,
        },
        config::{ArenaConfig, IkConfig, PoseCommandConfig},
        errors::*,
        ik::{IkTarget, SolverKind, apply_ik},
        pose::{BufferSelect, JointFlags, JointTransform, PoseBuffer, PoseBuffers, PoseInit},
        pose_modifier::{
            ModifierStage, PoseModifier, PoseModifierContext, PoseModifierParams,
            PoseModifierStack,
        },
        skeleton::{JointDefinition, LimbDefinition, LimbHandle, SkeletonDefinition},
    };
}
