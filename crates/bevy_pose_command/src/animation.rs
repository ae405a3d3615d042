use std::sync::Arc;

use bevy_pose_command_core::{
    clip_source::{ClipId, ClipSource},
    command::{CommandBuilder, PerJointBlendMode, SampleFlags, records},
    errors::{CommandError, CommandResult},
    ik::IkTarget,
    pose::{BufferSelect, JointFlags, PoseInit},
    pose_modifier::{ModifierStage, PoseModifierStack},
    skeleton::SkeletonDefinition,
};
use serde::{Deserialize, Serialize};

/// Static data a character is evaluated against.
#[derive(Clone)]
pub struct CharacterRig {
    pub skeleton: Arc<SkeletonDefinition>,
    pub clips: Arc<dyn ClipSource>,
    pub modifiers: Arc<PoseModifierStack>,
}

impl CharacterRig {
    pub fn new(skeleton: Arc<SkeletonDefinition>, clips: Arc<dyn ClipSource>) -> Self {
        Self {
            skeleton,
            clips,
            modifiers: Arc::default(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: PoseModifierStack) -> Self {
        self.modifiers = Arc::new(modifiers);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AnimationSource {
    Clip { clip: ClipId, normalized_time: f32 },
    /// Single-frame pose asset.
    Pose(ClipId),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveAnimation {
    pub source: AnimationSource,
    pub weight: f32,
}

impl ActiveAnimation {
    pub fn clip(clip: ClipId, normalized_time: f32, weight: f32) -> Self {
        Self {
            source: AnimationSource::Clip {
                clip,
                normalized_time,
            },
            weight,
        }
    }

    pub fn pose(pose: ClipId, weight: f32) -> Self {
        Self {
            source: AnimationSource::Pose(pose),
            weight,
        }
    }

    pub fn asset(&self) -> ClipId {
        match self.source {
            AnimationSource::Clip { clip, .. } => clip,
            AnimationSource::Pose(pose) => pose,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerBlendMode {
    /// Folded into the base pose before normalization, scaled by the layer weight.
    #[default]
    Accumulate,
    /// Replaces the base pose joint by joint, in proportion to the layer's per-joint weights.
    Override,
    /// Composed as a delta on top of the base pose.
    Additive,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationLayer {
    pub animations: Vec<ActiveAnimation>,
    pub weight: f32,
    pub blend_mode: LayerBlendMode,
    /// Sorted ids of the joints this layer affects. `None` affects every joint.
    pub joint_mask: Option<Vec<u16>>,
}

impl Default for AnimationLayer {
    fn default() -> Self {
        Self {
            animations: Vec::new(),
            weight: 1.,
            blend_mode: LayerBlendMode::default(),
            joint_mask: None,
        }
    }
}

impl AnimationLayer {
    pub fn new(blend_mode: LayerBlendMode) -> Self {
        Self {
            blend_mode,
            ..Self::default()
        }
    }

    pub fn with_animation(mut self, animation: ActiveAnimation) -> Self {
        self.animations.push(animation);
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_joint_mask(mut self, joints: Vec<u16>) -> Self {
        self.joint_mask = Some(joints);
        self
    }

    fn is_active(&self) -> bool {
        self.weight > 0. && !self.animations.is_empty()
    }
}

/// What a character plays this frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterAnimation {
    /// Sampled over the full skeleton and accumulated into the base pose.
    pub base: Vec<ActiveAnimation>,
    pub layers: Vec<AnimationLayer>,
    pub animation_driven_motion: bool,
    pub uniform_scale: f32,
    #[serde(skip)]
    pub ik_targets: Vec<IkTarget>,
}

impl Default for CharacterAnimation {
    fn default() -> Self {
        Self {
            base: Vec::new(),
            layers: Vec::new(),
            animation_driven_motion: false,
            uniform_scale: 1.,
            ik_targets: Vec::new(),
        }
    }
}

impl CharacterAnimation {
    pub fn with_base(mut self, animation: ActiveAnimation) -> Self {
        self.base.push(animation);
        self
    }

    pub fn with_layer(mut self, layer: AnimationLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_ik_target(mut self, target: IkTarget) -> Self {
        self.ik_targets.push(target);
        self
    }
}

/// Records the instruction stream that evaluates `animation`.
///
/// The base animations are sampled over the full skeleton into the target buffer. Accumulating
/// layers are sampled into the temporary buffer and folded in with their layer weight, after
/// which the target is normalized. Override and additive layers are then blended joint by joint.
/// The stream ends with uniform scaling, the `BeforeIk` pose modifiers and, in debug builds, a
/// verification pass.
pub fn build_commands(
    builder: &mut CommandBuilder<'_>,
    animation: &CharacterAnimation,
) -> CommandResult<()> {
    let state = builder.state();
    let lod_mask = state.skeleton.lod_mask(state.lod).map(<[u16]>::to_vec);
    let modifiers = state.modifiers.clone();

    // A layer is sampled into one buffer, which can only hold deltas or absolute values.
    for (index, layer) in animation.layers.iter().enumerate() {
        let mut additivity = layer
            .animations
            .iter()
            .map(|active| state.clips.is_additive(active.asset()));
        if let Some(first) = additivity.next()
            && additivity.any(|additive| additive != first)
        {
            return Err(CommandError::MixedAdditivity { layer: index });
        }
    }

    builder.append(records::ClearPoseBuffer::new(
        BufferSelect::Target,
        PoseInit::Zero,
        JointFlags::empty(),
    ))?;
    if let Some(mask) = lod_mask.as_deref() {
        builder.push_joint_mask(mask)?;
    }

    let mut base_flags = SampleFlags::empty();
    base_flags.set(
        SampleFlags::ANIMATION_DRIVEN_MOTION,
        animation.animation_driven_motion,
    );
    for active in animation.base.iter() {
        match active.source {
            AnimationSource::Clip {
                clip,
                normalized_time,
            } => builder.append(records::SampleAddAnimFull::new(
                clip,
                normalized_time,
                active.weight,
                base_flags,
            ))?,
            AnimationSource::Pose(pose) => builder.append(records::SampleAddPoseFull::new(
                pose,
                active.weight,
                base_flags,
            ))?,
        }
    }

    for layer in animation
        .layers
        .iter()
        .filter(|layer| layer.blend_mode == LayerBlendMode::Accumulate && layer.is_active())
    {
        record_layer(builder, layer, 1., lod_mask.as_deref())?;
        builder.append(records::AddPoseBuffer::new(
            BufferSelect::Temporary,
            BufferSelect::Target,
            layer.weight,
        ))?;
    }
    builder.append(records::NormalizeFull::new(BufferSelect::Target))?;

    let mut blended = false;
    for layer in animation.layers.iter().filter(|layer| layer.is_active()) {
        let mode = match layer.blend_mode {
            LayerBlendMode::Accumulate => continue,
            LayerBlendMode::Override => PerJointBlendMode::Override,
            LayerBlendMode::Additive => PerJointBlendMode::Additive,
        };
        record_layer(builder, layer, layer.weight, lod_mask.as_deref())?;
        builder.append(records::PerJointBlending::new(
            BufferSelect::Temporary,
            BufferSelect::Target,
            mode,
        ))?;
        blended = true;
    }
    if blended {
        builder.append(records::NormalizeFull::new(BufferSelect::Target))?;
    }

    if animation.uniform_scale != 1. {
        builder.append(records::ScaleUniformFull::new(
            BufferSelect::Target,
            animation.uniform_scale,
        ))?;
    }

    for slot in modifiers.slots(ModifierStage::BeforeIk) {
        let Ok(slot) = u16::try_from(slot) else {
            break;
        };
        builder.append(records::PoseModifier::new(BufferSelect::Target, slot))?;
    }

    if cfg!(debug_assertions) {
        builder.append(records::VerifyFull::new(BufferSelect::Target))?;
    }

    Ok(())
}

/// Samples a layer into the temporary buffer, with every weight scaled by `weight_scale`.
fn record_layer(
    builder: &mut CommandBuilder<'_>,
    layer: &AnimationLayer,
    weight_scale: f32,
    lod_mask: Option<&[u16]>,
) -> CommandResult<()> {
    builder.append(records::ClearPoseBuffer::new(
        BufferSelect::Temporary,
        PoseInit::Zero,
        JointFlags::empty(),
    ))?;

    if let Some(mask) = layer.joint_mask.as_deref() {
        match lod_mask {
            Some(lod_mask) => {
                let visible: Vec<u16> = mask
                    .iter()
                    .copied()
                    .filter(|joint| lod_mask.binary_search(joint).is_ok())
                    .collect();
                builder.push_joint_mask(&visible)?;
            }
            None => {
                builder.push_joint_mask(mask)?;
            }
        }
    }

    for active in layer.animations.iter() {
        let weight = active.weight * weight_scale;
        match active.source {
            AnimationSource::Clip {
                clip,
                normalized_time,
            } => builder.append(records::SampleAddAnimPart::new(
                clip,
                normalized_time,
                weight,
                BufferSelect::Temporary,
            ))?,
            AnimationSource::Pose(pose) => builder.append(records::SamplePosePart::new(
                pose,
                weight,
                BufferSelect::Temporary,
            ))?,
        }
    }

    if layer.joint_mask.is_some() {
        match lod_mask {
            Some(lod_mask) => {
                builder.push_joint_mask(lod_mask)?;
            }
            None => builder.clear_joint_mask()?,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use bevy_pose_command_core::{
        arena::FrameArena,
        clip_source::{AnimationClip, ClipLibrary},
        command::{CharacterId, Command, EvaluationState, Opcode},
        pose::JointTransform,
        skeleton::JointDefinition,
    };

    use super::*;

    fn state(lod: u8) -> EvaluationState {
        state_with(lod, ClipLibrary::new())
    }

    fn state_with(lod: u8, clips: ClipLibrary) -> EvaluationState {
        let joint = |name: &str, parent: Option<u16>| JointDefinition {
            name: name.into(),
            parent,
            bind_pose: JointTransform::IDENTITY,
        };
        let skeleton = SkeletonDefinition::new(vec![
            joint("root", None),
            joint("spine", Some(0)),
            joint("head", Some(1)),
        ])
        .unwrap()
        .with_lod_mask(vec![0, 1])
        .unwrap();

        EvaluationState::new(CharacterId(1), Arc::new(skeleton), Arc::new(clips)).with_lod(lod)
    }

    fn opcodes(lod: u8, animation: &CharacterAnimation) -> Vec<Opcode> {
        let mut arena = FrameArena::default();
        let mut builder = CommandBuilder::new(&mut arena, state(lod), 1024).unwrap();
        build_commands(&mut builder, animation).unwrap();
        let commands = builder.finish().unwrap();
        commands
            .decode_all()
            .unwrap()
            .iter()
            .map(Command::opcode)
            .filter(|opcode| *opcode != Opcode::VerifyFull)
            .collect()
    }

    #[test]
    fn layers_are_recorded_in_blend_order() {
        let animation = CharacterAnimation::default()
            .with_base(ActiveAnimation::clip(ClipId(0), 0.1, 1.))
            .with_layer(
                AnimationLayer::new(LayerBlendMode::Additive)
                    .with_animation(ActiveAnimation::clip(ClipId(1), 0.2, 1.)),
            )
            .with_layer(
                AnimationLayer::new(LayerBlendMode::Accumulate)
                    .with_animation(ActiveAnimation::pose(ClipId(2), 1.))
                    .with_weight(0.5),
            )
            .with_layer(
                AnimationLayer::new(LayerBlendMode::Override)
                    .with_animation(ActiveAnimation::clip(ClipId(3), 0., 1.))
                    .with_weight(0.),
            );

        assert_eq!(
            opcodes(0, &animation),
            vec![
                Opcode::ClearPoseBuffer,
                Opcode::SampleAddAnimFull,
                Opcode::ClearPoseBuffer,
                Opcode::SamplePosePart,
                Opcode::AddPoseBuffer,
                Opcode::NormalizeFull,
                Opcode::ClearPoseBuffer,
                Opcode::SampleAddAnimPart,
                Opcode::PerJointBlending,
                Opcode::NormalizeFull,
            ]
        );
    }

    #[test]
    fn lod_masks_wrap_layer_masks() {
        let animation = CharacterAnimation {
            uniform_scale: 2.,
            ..Default::default()
        }
        .with_layer(
            AnimationLayer::default()
                .with_animation(ActiveAnimation::clip(ClipId(1), 0., 1.))
                .with_joint_mask(vec![1, 2]),
        );

        assert_eq!(
            opcodes(1, &animation),
            vec![
                Opcode::ClearPoseBuffer,
                Opcode::JointMask,
                Opcode::ClearPoseBuffer,
                Opcode::JointMask,
                Opcode::SampleAddAnimPart,
                Opcode::JointMask,
                Opcode::AddPoseBuffer,
                Opcode::NormalizeFull,
                Opcode::ScaleUniformFull,
            ]
        );
    }

    #[test]
    fn layers_cannot_mix_additive_and_absolute_clips() {
        let clips = ClipLibrary::new()
            .with_clip(ClipId(1), AnimationClip::new())
            .with_clip(ClipId(2), AnimationClip::additive())
            .with_clip(ClipId(3), AnimationClip::additive());
        let build = |animation: &CharacterAnimation| {
            let mut arena = FrameArena::default();
            let mut builder =
                CommandBuilder::new(&mut arena, state_with(0, clips.clone()), 1024).unwrap();
            build_commands(&mut builder, animation)
        };

        let deltas = AnimationLayer::new(LayerBlendMode::Additive)
            .with_animation(ActiveAnimation::clip(ClipId(2), 0., 0.5))
            .with_animation(ActiveAnimation::clip(ClipId(3), 0., 0.5));
        assert!(build(&CharacterAnimation::default().with_layer(deltas)).is_ok());

        let mixed = AnimationLayer::new(LayerBlendMode::Accumulate)
            .with_animation(ActiveAnimation::clip(ClipId(1), 0., 0.5))
            .with_animation(ActiveAnimation::clip(ClipId(2), 0., 0.5));
        let animation = CharacterAnimation::default()
            .with_layer(AnimationLayer::default())
            .with_layer(mixed);
        assert!(matches!(
            build(&animation),
            Err(CommandError::MixedAdditivity { layer: 1 })
        ));
    }
}
