use bevy::log::{trace, warn};

use super::{Command, CommandReader, EvaluationState, Opcode, records};
use crate::{
    blending::{self, SampleSource},
    clip_source::ClipId,
    config::PoseCommandConfig,
    errors::{EvaluationError, EvaluationResult},
    pose::{BufferSelect, PoseBuffer, PoseBuffers, PoseInit},
    pose_modifier::{ModifierStage, PoseModifierParams},
};

/// Counts of what happened while a command stream was interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub executed: usize,
    /// Instructions that contributed nothing because their data was missing.
    pub skipped: usize,
}

enum Outcome {
    Applied,
    Skipped,
}

pub(crate) fn execute_stream(
    bytes: &[u8],
    state: &mut EvaluationState,
    buffers: &mut PoseBuffers,
    config: &PoseCommandConfig,
) -> EvaluationResult<ExecutionStats> {
    let joint_count = state.joint_count();
    for buffer in [&buffers.target, &buffers.temporary] {
        if buffer.joint_count() != joint_count {
            return Err(EvaluationError::JointCountMismatch {
                buffers: buffer.joint_count(),
                skeleton: joint_count,
            });
        }
    }

    state.install_joint_mask(None);
    let mut stats = ExecutionStats::default();

    for entry in CommandReader::new(bytes) {
        let (offset, command) = entry?;
        trace!("{}: {:?} at byte {}", state.character, command.opcode(), offset);
        match dispatch(command, state, buffers, config)? {
            Outcome::Applied => stats.executed += 1,
            Outcome::Skipped => stats.skipped += 1,
        }
    }

    Ok(stats)
}

fn dispatch(
    command: Command,
    state: &mut EvaluationState,
    buffers: &mut PoseBuffers,
    config: &PoseCommandConfig,
) -> EvaluationResult<Outcome> {
    let opcode = command.opcode();

    match command {
        Command::ClearPoseBuffer(record) => {
            let buffer = select_mut(buffers, record.buffer, opcode)?;
            let init = PoseInit::from_u8(record.pose_init).ok_or(EvaluationError::InvalidField {
                opcode,
                field: "pose_init",
                value: record.pose_init,
            })?;
            blending::clear_pose_buffer(buffer, init, record.initial_flags());
        }
        Command::SampleAddAnimFull(record) => {
            let clip = ClipId(record.clip);
            if !clip_available(state, clip, opcode) {
                return Ok(Outcome::Skipped);
            }
            let flags = record.flags();
            blending::sample_add_full(
                state,
                buffers.get_mut(flags.buffer()),
                SampleSource::Clip {
                    clip,
                    normalized_time: record.normalized_time,
                },
                record.weight,
                flags.contains(records::SampleFlags::ANIMATION_DRIVEN_MOTION),
            );
        }
        Command::SampleAddAnimPart(record) => {
            let clip = ClipId(record.clip);
            if !clip_available(state, clip, opcode) {
                return Ok(Outcome::Skipped);
            }
            blending::sample_add_part(
                state,
                buffers.get_mut(record.flags().buffer()),
                SampleSource::Clip {
                    clip,
                    normalized_time: record.normalized_time,
                },
                record.weight,
            );
        }
        Command::SampleReplaceAnimPart(record) => {
            let clip = ClipId(record.clip);
            if !clip_available(state, clip, opcode) {
                return Ok(Outcome::Skipped);
            }
            blending::sample_replace_part(
                state,
                buffers.get_mut(record.flags().buffer()),
                SampleSource::Clip {
                    clip,
                    normalized_time: record.normalized_time,
                },
                record.weight,
            );
        }
        Command::SampleAddPoseFull(record) => {
            let pose = ClipId(record.pose);
            if !clip_available(state, pose, opcode) {
                return Ok(Outcome::Skipped);
            }
            let flags = record.flags();
            blending::sample_add_full(
                state,
                buffers.get_mut(flags.buffer()),
                SampleSource::Pose { pose },
                record.weight,
                flags.contains(records::SampleFlags::ANIMATION_DRIVEN_MOTION),
            );
        }
        Command::SamplePosePart(record) => {
            let pose = ClipId(record.pose);
            if !clip_available(state, pose, opcode) {
                return Ok(Outcome::Skipped);
            }
            blending::sample_add_part(
                state,
                buffers.get_mut(record.flags().buffer()),
                SampleSource::Pose { pose },
                record.weight,
            );
        }
        Command::AddPoseBuffer(record) => {
            let (source, target) = split(buffers, record.source, record.target, opcode)?;
            blending::add_pose_buffer(source, target, record.weight, config.normalize_epsilon);
        }
        Command::PerJointBlending(record) => {
            let mode = records::PerJointBlendMode::from_u8(record.mode).ok_or(
                EvaluationError::InvalidField {
                    opcode,
                    field: "mode",
                    value: record.mode,
                },
            )?;
            let (source, target) = split(buffers, record.source, record.target, opcode)?;
            blending::per_joint_blend(source, target, mode, config.normalize_epsilon);
        }
        Command::NormalizeFull(record) => {
            let buffer = select_mut(buffers, record.buffer, opcode)?;
            blending::normalize_full(buffer, config.normalize_epsilon);
        }
        Command::ScaleUniformFull(record) => {
            let buffer = select_mut(buffers, record.buffer, opcode)?;
            blending::scale_uniform_full(buffer, record.scale);
        }
        Command::JointMask(record) => {
            if !state.install_joint_mask(record.slot()) {
                warn!(
                    "{}: {:?} refers to unregistered joint mask {}, keeping the current mask",
                    state.character, opcode, record.slot
                );
                return Ok(Outcome::Skipped);
            }
        }
        Command::PoseModifier(record) => {
            let buffer = select_mut(buffers, record.buffer, opcode)?;
            return Ok(run_modifier(state, buffer, record.slot as usize));
        }
        Command::VerifyFull(record) => {
            let buffer = select_mut(buffers, record.buffer, opcode)?;
            #[cfg(debug_assertions)]
            blending::verify_full(buffer, config.verify_tolerance)?;
            #[cfg(not(debug_assertions))]
            let _ = buffer;
        }
    }

    Ok(Outcome::Applied)
}

fn select(selector: u8, opcode: Opcode) -> EvaluationResult<BufferSelect> {
    BufferSelect::from_u8(selector)
        .ok_or(EvaluationError::InvalidBufferSelector { opcode, selector })
}

fn select_mut(
    buffers: &mut PoseBuffers,
    selector: u8,
    opcode: Opcode,
) -> EvaluationResult<&mut PoseBuffer> {
    Ok(buffers.get_mut(select(selector, opcode)?))
}

fn split(
    buffers: &mut PoseBuffers,
    source: u8,
    target: u8,
    opcode: Opcode,
) -> EvaluationResult<(&PoseBuffer, &mut PoseBuffer)> {
    let source = select(source, opcode)?;
    let target = select(target, opcode)?;
    buffers
        .split(source, target)
        .ok_or(EvaluationError::AliasedBuffers { opcode })
}

/// Missing clips are not fatal: the instruction contributes nothing and evaluation goes on.
fn clip_available(state: &EvaluationState, clip: ClipId, opcode: Opcode) -> bool {
    if state.clips.is_loaded(clip) {
        return true;
    }
    warn!(
        "{}: {:?} samples clip {} which is not loaded, skipping it",
        state.character, opcode, clip.0
    );
    false
}

fn run_modifier(state: &EvaluationState, pose: &mut PoseBuffer, slot: usize) -> Outcome {
    let Some((name, modifier, stage)) = state.modifiers.get(slot) else {
        warn!(
            "{}: no pose modifier is registered at slot {}",
            state.character, slot
        );
        return Outcome::Skipped;
    };
    if stage != ModifierStage::BeforeIk {
        warn!(
            "{}: pose modifier {:?} runs after IK and cannot be invoked from the command stream",
            state.character, name
        );
        return Outcome::Skipped;
    }

    let params = PoseModifierParams {
        character: state.character,
        skeleton: &state.skeleton,
        pose,
        time_delta: state.time_delta,
        world: state.world,
    };

    match modifier.execute(params) {
        Ok(()) => Outcome::Applied,
        Err(err) => {
            warn!(
                "{}: pose modifier {:?} failed, skipping it: {}",
                state.character, name, err
            );
            Outcome::Skipped
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use bevy::math::{Quat, Vec2, Vec3};

    use super::*;
    use crate::{
        arena::FrameArena,
        blending::{
            normalize_full,
            test_support::{same_rotation, state},
        },
        clip_source::{AnimationClip, ClipLibrary},
        command::{CommandBuilder, records::SampleFlags},
        errors::ModifierError,
        pose::JointFlags,
        pose_modifier::{ModifierStage, PoseModifier, PoseModifierStack},
    };

    const X: ClipId = ClipId(1);
    const Y: ClipId = ClipId(2);
    const PENDING: ClipId = ClipId(3);

    fn library() -> ClipLibrary {
        let mut library = ClipLibrary::new()
            .with_clip(
                X,
                AnimationClip::new()
                    .with_rotation(0, Quat::IDENTITY)
                    .with_rotation(1, Quat::from_rotation_y(90f32.to_radians()))
                    .with_rotation(2, Quat::IDENTITY),
            )
            .with_clip(
                Y,
                AnimationClip::additive()
                    .with_rotation(1, Quat::from_rotation_y(10f32.to_radians())),
            );
        library.insert_pending(
            PENDING,
            AnimationClip::new().with_rotation(1, Quat::from_rotation_x(1.)),
        );
        library
    }

    #[test]
    fn additive_layer_on_top_of_full_sample() {
        let mut arena = FrameArena::default();
        let mut builder = CommandBuilder::new(&mut arena, state(library()), 256).unwrap();
        builder
            .append(records::ClearPoseBuffer::new(
                BufferSelect::Target,
                PoseInit::Zero,
                JointFlags::empty(),
            ))
            .unwrap();
        builder
            .append(records::SampleAddAnimFull::new(X, 0., 1., SampleFlags::empty()))
            .unwrap();
        builder
            .append(records::SampleAddAnimPart::new(Y, 0., 1., BufferSelect::Temporary))
            .unwrap();
        builder
            .append(records::AddPoseBuffer::new(
                BufferSelect::Temporary,
                BufferSelect::Target,
                1.,
            ))
            .unwrap();
        builder
            .append(records::NormalizeFull::new(BufferSelect::Target))
            .unwrap();
        let mut commands = builder.finish().unwrap();

        let mut buffers = PoseBuffers::new(3);
        let stats = commands
            .execute(&mut buffers, &PoseCommandConfig::default())
            .unwrap();

        assert_eq!(stats, ExecutionStats { executed: 5, skipped: 0 });
        let joints = buffers.target.joints();
        assert!(same_rotation(
            joints[1].rotation,
            Quat::from_rotation_y(100f32.to_radians())
        ));
        assert!(same_rotation(joints[0].rotation, Quat::IDENTITY));
        assert!(same_rotation(joints[2].rotation, Quat::IDENTITY));
        assert!(joints[2].translation.abs_diff_eq(Vec3::Y, 1e-6));
    }

    fn fold_quarter_layers(builder: &mut CommandBuilder<'_>, clips: &[ClipId]) {
        for clip in clips {
            builder
                .append(records::ClearPoseBuffer::new(
                    BufferSelect::Temporary,
                    PoseInit::Zero,
                    JointFlags::empty(),
                ))
                .unwrap();
            builder
                .append(records::SampleAddAnimPart::new(*clip, 0., 0.25, BufferSelect::Temporary))
                .unwrap();
            builder
                .append(records::AddPoseBuffer::new(
                    BufferSelect::Temporary,
                    BufferSelect::Target,
                    1.,
                ))
                .unwrap();
        }
    }

    #[test]
    fn folded_layers_conserve_weight() {
        let clips: Vec<ClipId> = (10..14).map(ClipId).collect();
        let mut library = ClipLibrary::new();
        for (clip, degrees) in clips.iter().zip([0f32, 20., 40., 60.]) {
            let rotation = Quat::from_rotation_y(degrees.to_radians());
            library = library.with_clip(*clip, AnimationClip::new().with_rotation(1, rotation));
        }
        let mut arena = FrameArena::default();
        let mut builder = CommandBuilder::new(&mut arena, state(library), 1024).unwrap();
        builder
            .append(records::ClearPoseBuffer::new(
                BufferSelect::Target,
                PoseInit::Zero,
                JointFlags::empty(),
            ))
            .unwrap();
        fold_quarter_layers(&mut builder, &clips);
        let mut commands = builder.finish().unwrap();

        let mut buffers = PoseBuffers::new(3);
        commands
            .execute(&mut buffers, &PoseCommandConfig::default())
            .unwrap();

        assert!((buffers.target.weights()[1].x - 1.).abs() < 1e-5);
        normalize_full(&mut buffers.target, 1e-8);
        assert!(same_rotation(
            buffers.target.joints()[1].rotation,
            Quat::from_rotation_y(30f32.to_radians())
        ));
    }

    #[test]
    fn folded_additive_layers_compose_without_adding_weight() {
        let mut arena = FrameArena::default();
        let mut builder = CommandBuilder::new(&mut arena, state(library()), 1024).unwrap();
        builder
            .append(records::ClearPoseBuffer::new(
                BufferSelect::Target,
                PoseInit::Zero,
                JointFlags::empty(),
            ))
            .unwrap();
        builder
            .append(records::SampleAddAnimFull::new(X, 0., 1., SampleFlags::empty()))
            .unwrap();
        fold_quarter_layers(&mut builder, &[Y; 4]);
        let mut commands = builder.finish().unwrap();

        let mut buffers = PoseBuffers::new(3);
        commands
            .execute(&mut buffers, &PoseCommandConfig::default())
            .unwrap();

        assert_eq!(buffers.target.weights()[1], Vec2::ONE);
        assert!(same_rotation(
            buffers.target.joints()[1].rotation,
            Quat::from_rotation_y(100f32.to_radians())
        ));
    }

    #[test]
    fn unloaded_clips_contribute_nothing() {
        let mut arena = FrameArena::default();
        let mut builder = CommandBuilder::new(&mut arena, state(library()), 256).unwrap();
        builder
            .append(records::SampleAddAnimPart::new(PENDING, 0., 1., BufferSelect::Target))
            .unwrap();
        builder
            .append(records::SampleAddAnimFull::new(ClipId(99), 0., 1., SampleFlags::empty()))
            .unwrap();
        let mut commands = builder.finish().unwrap();

        let mut buffers = PoseBuffers::new(3);
        let stats = commands
            .execute(&mut buffers, &PoseCommandConfig::default())
            .unwrap();

        assert_eq!(stats, ExecutionStats { executed: 0, skipped: 2 });
        assert_eq!(buffers, PoseBuffers::new(3));
    }

    #[test]
    fn unknown_opcode_aborts_evaluation() {
        let mut state = state(library());
        let mut buffers = PoseBuffers::new(3);
        let normalize = records::NormalizeFull::new(BufferSelect::Target);
        let mut bytes = bytemuck::bytes_of(&normalize).to_vec();
        bytes.extend_from_slice(&[0x7F, 0, 0, 0]);

        assert_eq!(
            execute_stream(&bytes, &mut state, &mut buffers, &PoseCommandConfig::default()),
            Err(EvaluationError::UnknownOpcode {
                opcode: 0x7F,
                offset: 4
            })
        );
    }

    #[test]
    fn invalid_selectors_are_fatal() {
        let mut state = state(library());
        let mut buffers = PoseBuffers::new(3);
        let mut record = records::NormalizeFull::new(BufferSelect::Target);
        record.buffer = 4;

        assert_eq!(
            execute_stream(
                bytemuck::bytes_of(&record),
                &mut state,
                &mut buffers,
                &PoseCommandConfig::default()
            ),
            Err(EvaluationError::InvalidBufferSelector {
                opcode: Opcode::NormalizeFull,
                selector: 4
            })
        );

        let aliased = records::AddPoseBuffer::new(BufferSelect::Target, BufferSelect::Target, 1.);
        assert_eq!(
            execute_stream(
                bytemuck::bytes_of(&aliased),
                &mut state,
                &mut buffers,
                &PoseCommandConfig::default()
            ),
            Err(EvaluationError::AliasedBuffers {
                opcode: Opcode::AddPoseBuffer
            })
        );
    }

    #[test]
    fn invalid_fields_are_fatal() {
        let mut state = state(library());
        let mut buffers = PoseBuffers::new(3);
        let config = PoseCommandConfig::default();

        let mut clear = records::ClearPoseBuffer::new(
            BufferSelect::Target,
            PoseInit::Zero,
            JointFlags::empty(),
        );
        clear.pose_init = 9;
        assert_eq!(
            execute_stream(bytemuck::bytes_of(&clear), &mut state, &mut buffers, &config),
            Err(EvaluationError::InvalidField {
                opcode: Opcode::ClearPoseBuffer,
                field: "pose_init",
                value: 9
            })
        );

        let mut blend = records::PerJointBlending::new(
            BufferSelect::Temporary,
            BufferSelect::Target,
            records::PerJointBlendMode::Override,
        );
        blend.mode = 5;
        assert_eq!(
            execute_stream(bytemuck::bytes_of(&blend), &mut state, &mut buffers, &config),
            Err(EvaluationError::InvalidField {
                opcode: Opcode::PerJointBlending,
                field: "mode",
                value: 5
            })
        );
    }

    #[test]
    fn joint_mask_limits_sampling() {
        let mut arena = FrameArena::default();
        let mut builder = CommandBuilder::new(&mut arena, state(library()), 256).unwrap();
        builder.push_joint_mask(&[1]).unwrap();
        builder
            .append(records::SampleAddAnimFull::new(X, 0., 1., SampleFlags::empty()))
            .unwrap();
        builder.clear_joint_mask().unwrap();
        builder
            .append(records::SampleAddAnimPart::new(X, 0., 0.5, BufferSelect::Temporary))
            .unwrap();
        let mut commands = builder.finish().unwrap();

        let mut buffers = PoseBuffers::new(3);
        commands
            .execute(&mut buffers, &PoseCommandConfig::default())
            .unwrap();

        let flags = buffers.target.flags();
        assert_eq!(flags[0], JointFlags::empty());
        assert_eq!(flags[1], JointFlags::PRESENT);
        assert_eq!(flags[2], JointFlags::empty());
        assert!(
            buffers
                .temporary
                .flags()
                .iter()
                .all(|flags| *flags == JointFlags::ORIENTATION)
        );
    }

    struct CountingModifier(Arc<AtomicUsize>);

    impl PoseModifier for CountingModifier {
        fn execute(&self, params: PoseModifierParams<'_>) -> Result<(), ModifierError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            params.pose.joints_mut()[2].translation = Vec3::Z;
            Ok(())
        }
    }

    struct FailingModifier;

    impl PoseModifier for FailingModifier {
        fn execute(&self, _: PoseModifierParams<'_>) -> Result<(), ModifierError> {
            Err(ModifierError::new("target lost"))
        }
    }

    #[test]
    fn pose_modifiers_run_by_slot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let late_calls = Arc::new(AtomicUsize::new(0));
        let modifiers = PoseModifierStack::new()
            .with("count", ModifierStage::BeforeIk, CountingModifier(calls.clone()))
            .with("fail", ModifierStage::BeforeIk, FailingModifier)
            .with("late", ModifierStage::AfterIk, CountingModifier(late_calls.clone()));

        let mut arena = FrameArena::default();
        let state = state(library()).with_modifiers(Arc::new(modifiers));
        let mut builder = CommandBuilder::new(&mut arena, state, 256).unwrap();
        for slot in [0, 1, 2, 7] {
            builder
                .append(records::PoseModifier::new(BufferSelect::Target, slot))
                .unwrap();
        }
        let mut commands = builder.finish().unwrap();

        let mut buffers = PoseBuffers::new(3);
        let stats = commands
            .execute(&mut buffers, &PoseCommandConfig::default())
            .unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        // after-IK modifiers only run once IK has been solved
        assert_eq!(late_calls.load(Ordering::Relaxed), 0);
        assert_eq!(stats, ExecutionStats { executed: 1, skipped: 3 });
        assert_eq!(buffers.target.joints()[2].translation, Vec3::Z);
    }
}
