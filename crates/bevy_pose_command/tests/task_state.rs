use std::sync::Arc;

use bevy::math::{Quat, Vec3};
use bevy_pose_command::prelude::*;

const WAVE: ClipId = ClipId(0);
const BROKEN: ClipId = ClipId(1);

fn rig() -> CharacterRig {
    let skeleton = SkeletonDefinition::from_ron_str(
        r#"(
            joints: [
                (name: "root", translation: (0., 0., 0.)),
                (name: "hand", parent: Some("root"), translation: (0., 1., 0.)),
            ],
        )"#,
    )
    .unwrap();
    let library = ClipLibrary::new()
        .with_clip(
            WAVE,
            AnimationClip::new().with_rotation(1, Quat::from_rotation_x(0.3)),
        )
        .with_clip(
            BROKEN,
            AnimationClip::new().with_translation(1, Vec3::new(f32::NAN, 0., 0.)),
        );
    CharacterRig::new(Arc::new(skeleton), Arc::new(library))
}

fn playing(clip: ClipId) -> CharacterAnimation {
    CharacterAnimation::default().with_base(ActiveAnimation::clip(clip, 0., 1.))
}

#[test]
fn a_running_task_cannot_be_restarted() {
    let rig = rig();
    let mut scheduler = PoseScheduler::default();
    let mut task = PoseTask::new(CharacterId(9));

    scheduler
        .schedule(&mut task, &rig, &playing(WAVE), EvaluationRequest::default())
        .unwrap();
    assert_eq!(task.state(), TaskState::Executing);
    assert_eq!(
        scheduler.schedule(&mut task, &rig, &playing(WAVE), EvaluationRequest::default()),
        Err(TaskError::StillExecuting)
    );
    assert_eq!(task.pose(), Err(TaskError::NotSynchronized));

    scheduler.synchronize_all([&mut task]);
    assert!(task.is_ready());
    assert!(task.pose().is_ok());

    scheduler.begin_frame([&mut task]).unwrap();
    assert_eq!(task.state(), TaskState::Idle);
    assert_eq!(scheduler.frame(), 1);
    assert!(task.pose().is_ok());
}

#[test]
fn a_synchronized_task_starts_the_next_frame() {
    let rig = rig();
    let mut scheduler = PoseScheduler::default();
    let mut task = PoseTask::new(CharacterId(9));
    let request = EvaluationRequest {
        immediate: true,
        ..Default::default()
    };

    scheduler.schedule(&mut task, &rig, &playing(WAVE), request).unwrap();
    assert_eq!(task.state(), TaskState::Synchronized);
    assert!(task.pose().is_ok());
    scheduler.schedule(&mut task, &rig, &playing(WAVE), request).unwrap();
    assert_eq!(task.state(), TaskState::Synchronized);
}

#[test]
fn oversized_streams_are_rejected_before_executing() {
    let config = PoseCommandConfig {
        command_stream_capacity: 8,
        ..Default::default()
    };
    let mut scheduler = PoseScheduler::new(config);
    let mut task = PoseTask::new(CharacterId(9));

    let request = EvaluationRequest::default();
    let result = scheduler.schedule(&mut task, &rig(), &playing(WAVE), request);
    assert!(matches!(
        result,
        Err(TaskError::Command(CommandError::BufferFull { .. }))
    ));
    assert_eq!(task.state(), TaskState::Idle);
    assert_eq!(task.pose(), Err(TaskError::NoPose));
    assert!(scheduler.reset_arena().is_ok());
}

#[cfg(debug_assertions)]
#[test]
fn failed_evaluations_keep_the_last_pose() {
    let rig = rig();
    let mut scheduler = PoseScheduler::default();
    let mut task = PoseTask::new(CharacterId(9));
    let request = EvaluationRequest {
        immediate: true,
        ..Default::default()
    };

    scheduler.schedule(&mut task, &rig, &playing(WAVE), request).unwrap();
    let good = task.pose().unwrap().clone();

    scheduler.begin_frame([&mut task]).unwrap();
    scheduler.schedule(&mut task, &rig, &playing(BROKEN), request).unwrap();

    assert_eq!(task.state(), TaskState::Synchronized);
    assert!(matches!(
        task.last_error(),
        Some(EvaluationError::VerificationFailed { joint: 1, .. })
    ));
    assert_eq!(task.pose(), Ok(&good));

    scheduler.begin_frame([&mut task]).unwrap();
    scheduler.schedule(&mut task, &rig, &playing(WAVE), request).unwrap();
    assert!(task.last_error().is_none());
}
