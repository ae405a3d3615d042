use std::sync::Arc;

use bevy::{
    app::App,
    math::{Quat, Vec3},
};
use bevy_pose_command::prelude::*;

fn rig() -> CharacterRig {
    let skeleton = SkeletonDefinition::new(vec![
        JointDefinition {
            name: "root".into(),
            parent: None,
            bind_pose: JointTransform::IDENTITY,
        },
        JointDefinition {
            name: "head".into(),
            parent: Some(0),
            bind_pose: JointTransform::from_translation(Vec3::Y),
        },
    ])
    .unwrap();
    let library = ClipLibrary::new().with_clip(
        ClipId(0),
        AnimationClip::new().with_rotation(1, Quat::from_rotation_y(0.4)),
    );
    CharacterRig::new(Arc::new(skeleton), Arc::new(library))
}

#[test]
fn characters_are_evaluated_every_update() {
    let mut app = App::new();
    app.add_plugins(PoseCommandPlugin::default());

    let animation =
        CharacterAnimation::default().with_base(ActiveAnimation::clip(ClipId(0), 0., 1.));
    let characters: Vec<_> = (0..4)
        .map(|id| {
            app.world_mut()
                .spawn(CharacterPose::new(CharacterId(id), rig(), animation.clone()))
                .id()
        })
        .collect();

    app.update();
    app.update();

    assert_eq!(app.world().resource::<PoseScheduler>().frame(), 2);
    for entity in characters {
        let character = app.world().get::<CharacterPose>(entity).unwrap();
        assert_eq!(character.task.state(), TaskState::Synchronized);
        let pose = character.task.pose().unwrap();
        assert!(pose.relative[1].rotation.angle_between(Quat::from_rotation_y(0.4)) < 1e-4);
        assert!(
            pose.absolute[1]
                .translation
                .abs_diff_eq(Vec3::Y, 1e-5)
        );
    }
}

#[test]
fn playback_drives_the_animation() {
    let mut app = App::new();
    app.add_plugins(PoseCommandPlugin::default());

    let mut playback = CharacterPlayback::new();
    playback.play(0, ClipId(0), PlaybackParams::default());
    let mut character = CharacterPose::new(CharacterId(0), rig(), CharacterAnimation::default())
        .with_playback(playback);
    character.request.time_delta = 0.25;
    let entity = app.world_mut().spawn(character).id();

    app.update();
    app.update();

    let character = app.world().get::<CharacterPose>(entity).unwrap();
    assert_eq!(character.animation.base.len(), 1);
    let AnimationSource::Clip {
        normalized_time, ..
    } = character.animation.base[0].source
    else {
        panic!("expected a clip");
    };
    assert!((normalized_time - 0.5).abs() < 1e-6);
    let pose = character.task.pose().unwrap();
    assert!(pose.relative[1].rotation.angle_between(Quat::from_rotation_y(0.4)) < 1e-4);
}
