/// Typing blips — which clip to play, at what pitch, for a revealed unit.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::bridge::AudioCollaborator;
use crate::core::config::DialogueConfig;
use crate::schema::audio::AudioProfile;

/// One blip to play.
#[derive(Debug, Clone, PartialEq)]
pub struct BlipCue {
    pub clip: String,
    pub pitch: f32,
    /// Cut off whatever blip is still playing first.
    pub stop_previous: bool,
}

#[derive(Debug, Clone)]
enum BlipMode {
    /// Same character, same clip and pitch.
    Predictable,
    Random(StdRng),
}

#[derive(Debug, Clone)]
pub struct BlipSelector {
    mode: BlipMode,
}

impl BlipSelector {
    pub fn predictable() -> Self {
        Self {
            mode: BlipMode::Predictable,
        }
    }

    pub fn random(seed: u64) -> Self {
        Self {
            mode: BlipMode::Random(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_config(config: &DialogueConfig) -> Self {
        if config.predictable_audio {
            Self::predictable()
        } else {
            Self::random(config.audio_seed)
        }
    }

    /// Pick the blip for the unit at `index`, or `None` when this unit is
    /// skipped by the profile's frequency or the profile has no clips.
    pub fn select(&mut self, profile: &AudioProfile, index: usize, unit: char) -> Option<BlipCue> {
        if profile.clips.is_empty() {
            return None;
        }
        let frequency = profile.frequency_level.max(1) as usize;
        if index % frequency != 0 {
            return None;
        }

        let (clip_index, pitch) = match &mut self.mode {
            BlipMode::Predictable => {
                let code = unit as u64;
                let clip_index = (code % profile.clips.len() as u64) as usize;
                (clip_index, predictable_pitch(profile, code))
            }
            BlipMode::Random(rng) => {
                let clip_index = rng.gen_range(0..profile.clips.len());
                let pitch = if profile.min_pitch < profile.max_pitch {
                    rng.gen_range(profile.min_pitch..profile.max_pitch)
                } else {
                    profile.min_pitch
                };
                (clip_index, pitch)
            }
        };

        Some(BlipCue {
            clip: profile.clips[clip_index].clone(),
            pitch,
            stop_previous: profile.stop_audio_source,
        })
    }
}

/// Pitch in hundredths, picked from the character code so it never varies.
fn predictable_pitch(profile: &AudioProfile, code: u64) -> f32 {
    let min = (profile.min_pitch * 100.0) as i64;
    let max = (profile.max_pitch * 100.0) as i64;
    let range = (max - min).abs();
    if range == 0 {
        return profile.min_pitch;
    }
    let offset = (code as i64).rem_euclid(range);
    (min.min(max) + offset) as f32 / 100.0
}

/// An `AudioCollaborator` that turns revealed units into `BlipCue`s and
/// hands them to `play`.
pub struct BlipAudio<F: FnMut(&BlipCue)> {
    selector: BlipSelector,
    play: F,
}

impl<F: FnMut(&BlipCue)> BlipAudio<F> {
    pub fn new(selector: BlipSelector, play: F) -> Self {
        Self { selector, play }
    }
}

impl<F: FnMut(&BlipCue)> AudioCollaborator for BlipAudio<F> {
    fn unit_revealed(&mut self, index: usize, unit: char, profile: &AudioProfile) {
        if let Some(cue) = self.selector.select(profile, index, unit) {
            (self.play)(&cue);
        }
    }
}
