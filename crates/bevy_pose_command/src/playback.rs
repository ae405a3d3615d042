use bevy_pose_command_core::clip_source::{ClipId, ClipSource};
use serde::{Deserialize, Serialize};

use crate::animation::{
    ActiveAnimation, AnimationLayer, AnimationSource, CharacterAnimation, LayerBlendMode,
};

/// Used for clips whose [`ClipSource::duration`] is unknown.
pub const DEFAULT_CLIP_DURATION: f32 = 1.;

const MIN_DURATION: f32 = 1e-4;

/// How a queued animation plays and enters its layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackParams {
    pub looping: bool,
    /// Multiplies the frame delta. Negative values are treated as zero.
    pub playback_scale: f32,
    /// Seconds taken to blend over whatever the layer was playing. Also used to fade an inactive
    /// layer in, and to fade it out once a non-looping clip ends on an upper layer.
    pub transition_time: f32,
    /// Normalized time the animation starts at.
    pub start_time: f32,
}

impl Default for PlaybackParams {
    fn default() -> Self {
        Self {
            looping: true,
            playback_scale: 1.,
            transition_time: 0.2,
            start_time: 0.,
        }
    }
}

impl PlaybackParams {
    pub fn once() -> Self {
        Self {
            looping: false,
            ..Self::default()
        }
    }

    pub fn with_transition_time(mut self, seconds: f32) -> Self {
        self.transition_time = seconds;
        self
    }

    pub fn with_playback_scale(mut self, scale: f32) -> Self {
        self.playback_scale = scale;
        self
    }
}

/// An animation waiting in, or playing from, a layer's transition queue.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedAnimation {
    pub source: AnimationSource,
    pub params: PlaybackParams,
    normalized_time: f32,
    /// Rises from zero to one over the transition time once the animation is activated.
    priority: f32,
    weight: f32,
    activated: bool,
}

impl QueuedAnimation {
    fn new(asset: Asset, params: PlaybackParams) -> Self {
        let normalized_time = params.start_time.clamp(0., 1.);
        let source = match asset {
            Asset::Clip(clip) => AnimationSource::Clip {
                clip,
                normalized_time,
            },
            Asset::Pose(pose) => AnimationSource::Pose(pose),
        };
        Self {
            source,
            params,
            normalized_time,
            priority: 0.,
            weight: 0.,
            activated: false,
        }
    }

    pub fn asset(&self) -> ClipId {
        match self.source {
            AnimationSource::Clip { clip, .. } => clip,
            AnimationSource::Pose(pose) => pose,
        }
    }

    pub fn normalized_time(&self) -> f32 {
        self.normalized_time
    }

    /// Share of the layer this animation holds. The weights of a layer's queue sum to one once
    /// its front animation is activated.
    pub fn transition_weight(&self) -> f32 {
        self.weight
    }

    /// Whether the clip was loaded and the animation has started playing.
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    fn has_ended(&self) -> bool {
        !self.params.looping && self.normalized_time >= 1.
    }

    fn advance_time(&mut self, time_delta: f32, clips: &dyn ClipSource) {
        let AnimationSource::Clip {
            clip,
            normalized_time,
        } = &mut self.source
        else {
            return;
        };

        let duration = clips
            .duration(*clip)
            .unwrap_or(DEFAULT_CLIP_DURATION)
            .max(MIN_DURATION);
        let step = self.params.playback_scale.max(0.) * time_delta / duration;
        let time = self.normalized_time + step;
        self.normalized_time = if self.params.looping {
            time.fract()
        } else {
            time.min(1.)
        };
        *normalized_time = self.normalized_time;
    }
}

#[derive(Clone, Copy)]
enum Asset {
    Clip(ClipId),
    Pose(ClipId),
}

/// Playback state of one layer: a transition queue and the layer's own fade.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerPlayback {
    queue: Vec<QueuedAnimation>,
    pub blend_mode: LayerBlendMode,
    pub joint_mask: Option<Vec<u16>>,
    /// Multiplies the fade weight. See [`AnimationLayer::weight`].
    pub blend_weight: f32,
    fade_weight: f32,
    fade_time: f32,
    active: bool,
}

impl Default for LayerPlayback {
    fn default() -> Self {
        Self {
            queue: Vec::new(),
            blend_mode: LayerBlendMode::default(),
            joint_mask: None,
            blend_weight: 1.,
            fade_weight: 0.,
            fade_time: 0.,
            active: false,
        }
    }
}

impl LayerPlayback {
    pub fn queue(&self) -> &[QueuedAnimation] {
        &self.queue
    }

    pub fn fade_weight(&self) -> f32 {
        self.fade_weight
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn push(&mut self, animation: QueuedAnimation) {
        if !self.active {
            self.fade_time = animation.params.transition_time;
        }
        self.active = true;
        self.queue.push(animation);
    }

    fn stop(&mut self, fade_time: f32) {
        self.active = false;
        self.fade_time = fade_time;
    }

    fn advance(&mut self, time_delta: f32, clips: &dyn ClipSource, is_base: bool) {
        let mut activated = 0;
        for animation in self.queue.iter_mut() {
            if !animation.activated && !clips.is_loaded(animation.asset()) {
                break;
            }
            animation.activated = true;
            activated += 1;
        }

        if activated > 0 {
            self.update_transitions(activated, time_delta);
            for animation in self.queue.iter_mut().filter(|animation| animation.activated) {
                animation.advance_time(time_delta, clips);
            }
        }

        if is_base {
            self.fade_weight = 1.;
            return;
        }

        if let [animation] = self.queue.as_slice()
            && animation.has_ended()
            && self.active
        {
            let fade_time = animation.params.transition_time;
            self.stop(fade_time);
        }

        let step = if self.fade_time > 0. {
            time_delta / self.fade_time
        } else {
            1.
        };
        self.fade_weight = if self.active {
            (self.fade_weight + step).min(1.)
        } else {
            (self.fade_weight - step).max(0.)
        };
        if !self.active && self.fade_weight == 0. {
            self.queue.clear();
        }
    }

    /// Raises the priority of every activated animation and derives transition weights from it.
    /// A newer animation takes its share from all older ones, so once it reaches full priority
    /// the animations before it are dropped.
    fn update_transitions(&mut self, activated: usize, time_delta: f32) {
        for (index, animation) in self.queue[..activated].iter_mut().enumerate() {
            let transition_time = animation.params.transition_time;
            animation.priority = if index == 0 || transition_time <= 0. {
                1.
            } else {
                (animation.priority + time_delta / transition_time).min(1.)
            };
        }

        if let Some(last_full) = self.queue[..activated]
            .iter()
            .rposition(|animation| animation.priority >= 1.)
        {
            self.queue.drain(..last_full);
        }

        let mut remaining = 1.;
        for animation in self.queue.iter_mut().rev() {
            if !animation.activated {
                animation.weight = 0.;
                continue;
            }
            animation.weight = animation.priority * remaining;
            remaining *= 1. - animation.priority;
        }
    }

    fn active_animations(&self) -> Vec<ActiveAnimation> {
        self.queue
            .iter()
            .filter(|animation| animation.activated && animation.weight > 0.)
            .map(|animation| ActiveAnimation {
                source: animation.source,
                weight: animation.weight,
            })
            .collect()
    }
}

/// Per-character playback: layer 0 is the base layer, every other layer is blended on top of it
/// according to its [`LayerBlendMode`].
///
/// [`advance`](Self::advance) moves time forward, and [`apply`](Self::apply) writes the resulting
/// animations and weights into a [`CharacterAnimation`].
#[derive(Clone, Debug, PartialEq)]
pub struct CharacterPlayback {
    layers: Vec<LayerPlayback>,
}

impl Default for CharacterPlayback {
    fn default() -> Self {
        Self {
            layers: vec![LayerPlayback::default()],
        }
    }
}

impl CharacterPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a clip on `layer`. It starts blending in once its data is loaded and every
    /// animation queued before it has started.
    pub fn play(&mut self, layer: usize, clip: ClipId, params: PlaybackParams) -> &mut Self {
        self.layer_mut(layer)
            .push(QueuedAnimation::new(Asset::Clip(clip), params));
        self
    }

    /// Queues a single-frame pose asset on `layer`.
    pub fn play_pose(&mut self, layer: usize, pose: ClipId, params: PlaybackParams) -> &mut Self {
        self.layer_mut(layer)
            .push(QueuedAnimation::new(Asset::Pose(pose), params));
        self
    }

    /// Fades `layer` out over `fade_time` seconds, then drops its queue. The base layer stops
    /// immediately.
    pub fn stop(&mut self, layer: usize, fade_time: f32) -> &mut Self {
        if let Some(playback) = self.layers.get_mut(layer) {
            playback.stop(fade_time);
            if layer == 0 {
                playback.queue.clear();
            }
        }
        self
    }

    pub fn set_blend_mode(&mut self, layer: usize, blend_mode: LayerBlendMode) -> &mut Self {
        self.layer_mut(layer).blend_mode = blend_mode;
        self
    }

    pub fn set_blend_weight(&mut self, layer: usize, weight: f32) -> &mut Self {
        self.layer_mut(layer).blend_weight = weight.max(0.);
        self
    }

    pub fn set_joint_mask(&mut self, layer: usize, joints: Option<Vec<u16>>) -> &mut Self {
        self.layer_mut(layer).joint_mask = joints;
        self
    }

    pub fn layer(&self, layer: usize) -> Option<&LayerPlayback> {
        self.layers.get(layer)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layer_mut(&mut self, layer: usize) -> &mut LayerPlayback {
        if layer >= self.layers.len() {
            self.layers.resize_with(layer + 1, LayerPlayback::default);
        }
        &mut self.layers[layer]
    }

    /// Advances every layer by `time_delta` seconds.
    pub fn advance(&mut self, time_delta: f32, clips: &dyn ClipSource) {
        let time_delta = time_delta.max(0.);
        for (index, layer) in self.layers.iter_mut().enumerate() {
            layer.advance(time_delta, clips, index == 0);
        }
    }

    /// Replaces the base animations and layers of `animation` with the current playback state.
    pub fn apply(&self, animation: &mut CharacterAnimation) {
        animation.base.clear();
        animation.layers.clear();

        let mut layers = self.layers.iter();
        if let Some(base) = layers.next() {
            animation.base = base.active_animations();
        }
        animation.layers.extend(layers.map(|layer| AnimationLayer {
            animations: layer.active_animations(),
            weight: layer.blend_weight * layer.fade_weight,
            blend_mode: layer.blend_mode,
            joint_mask: layer.joint_mask.clone(),
        }));
    }
}
