use bevy::{
    math::{Quat, Vec3},
    platform::collections::HashMap,
};

use super::{ClipId, ClipSource, JointSample};
use crate::interpolation::linear::InterpolateLinear;

/// Keyframes of one channel, sorted by normalized time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Keyframes<T> {
    keys: Vec<(f32, T)>,
}

impl<T: InterpolateLinear + Copy> Keyframes<T> {
    pub fn insert(&mut self, time: f32, value: T) {
        let time = time.clamp(0., 1.);
        let index = self.keys.partition_point(|(key_time, _)| *key_time < time);
        match self.keys.get_mut(index) {
            Some((key_time, key_value)) if *key_time == time => *key_value = value,
            _ => self.keys.insert(index, (time, value)),
        }
    }

    pub fn sample(&self, time: f32) -> Option<T> {
        let next = self.keys.partition_point(|(key_time, _)| *key_time <= time);
        match (next.checked_sub(1).and_then(|i| self.keys.get(i)), self.keys.get(next)) {
            (Some((prev_time, prev)), Some((next_time, next))) => {
                let f = (time - prev_time) / (next_time - prev_time);
                Some(prev.interpolate_linear(next, f))
            }
            (Some((_, value)), None) | (None, Some((_, value))) => Some(*value),
            (None, None) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct JointTrack {
    pub rotation: Keyframes<Quat>,
    pub translation: Keyframes<Vec3>,
}

impl JointTrack {
    pub fn sample(&self, time: f32) -> JointSample {
        JointSample {
            rotation: self.rotation.sample(time),
            translation: self.translation.sample(time),
        }
    }
}

/// Keyframed animation for a subset of a skeleton's joints.
#[derive(Clone, Debug, Default)]
pub struct AnimationClip {
    tracks: HashMap<usize, JointTrack>,
    additive: bool,
    duration: Option<f32>,
}

impl AnimationClip {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clip whose keys are deltas composed onto another pose.
    pub fn additive() -> Self {
        Self {
            additive: true,
            ..Self::default()
        }
    }

    pub fn is_additive(&self) -> bool {
        self.additive
    }

    /// Length of the clip in seconds at a playback scale of one.
    pub fn with_duration(mut self, seconds: f32) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn duration(&self) -> Option<f32> {
        self.duration
    }

    pub fn with_rotation_key(mut self, joint: usize, time: f32, rotation: Quat) -> Self {
        self.track_mut(joint).rotation.insert(time, rotation);
        self
    }

    pub fn with_translation_key(mut self, joint: usize, time: f32, translation: Vec3) -> Self {
        self.track_mut(joint).translation.insert(time, translation);
        self
    }

    /// Constant rotation for the whole clip.
    pub fn with_rotation(self, joint: usize, rotation: Quat) -> Self {
        self.with_rotation_key(joint, 0., rotation)
    }

    pub fn with_translation(self, joint: usize, translation: Vec3) -> Self {
        self.with_translation_key(joint, 0., translation)
    }

    pub fn track(&self, joint: usize) -> Option<&JointTrack> {
        self.tracks.get(&joint)
    }

    pub fn track_mut(&mut self, joint: usize) -> &mut JointTrack {
        self.tracks.entry(joint).or_default()
    }

    pub fn sample_joint(&self, joint: usize, normalized_time: f32) -> JointSample {
        self.tracks
            .get(&joint)
            .map(|track| track.sample(normalized_time.clamp(0., 1.)))
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
struct ClipEntry {
    clip: AnimationClip,
    loaded: bool,
}

/// In-memory [`ClipSource`]. Clips can be registered before their data is marked as loaded,
/// mirroring assets that are still streaming in.
#[derive(Clone, Debug, Default)]
pub struct ClipLibrary {
    clips: HashMap<ClipId, ClipEntry>,
}

impl ClipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ClipId, clip: AnimationClip) {
        self.clips.insert(id, ClipEntry { clip, loaded: true });
    }

    pub fn with_clip(mut self, id: ClipId, clip: AnimationClip) -> Self {
        self.insert(id, clip);
        self
    }

    /// Registers a clip that is not yet available for sampling.
    pub fn insert_pending(&mut self, id: ClipId, clip: AnimationClip) {
        self.clips.insert(id, ClipEntry { clip, loaded: false });
    }

    pub fn set_loaded(&mut self, id: ClipId, loaded: bool) -> bool {
        match self.clips.get_mut(&id) {
            Some(entry) => {
                entry.loaded = loaded;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: ClipId) -> Option<&AnimationClip> {
        self.clips.get(&id).map(|entry| &entry.clip)
    }

    pub fn remove(&mut self, id: ClipId) -> Option<AnimationClip> {
        self.clips.remove(&id).map(|entry| entry.clip)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

impl ClipSource for ClipLibrary {
    fn is_loaded(&self, clip: ClipId) -> bool {
        self.clips.get(&clip).is_some_and(|entry| entry.loaded)
    }

    fn is_additive(&self, clip: ClipId) -> bool {
        self.get(clip).is_some_and(AnimationClip::is_additive)
    }

    fn duration(&self, clip: ClipId) -> Option<f32> {
        self.get(clip).and_then(AnimationClip::duration)
    }

    fn sample_joint(&self, clip: ClipId, joint: usize, normalized_time: f32) -> JointSample {
        self.clips
            .get(&clip)
            .filter(|entry| entry.loaded)
            .map(|entry| entry.clip.sample_joint(joint, normalized_time))
            .unwrap_or_default()
    }
}
