/// Audio profiles — per-voice typing-blip configuration.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// How a voice sounds while its text is being revealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioProfile {
    pub id: String,
    /// Clip identifiers the audio collaborator knows how to play.
    pub clips: Vec<String>,
    /// Play a blip every Nth revealed unit. 1 = every unit.
    #[serde(default = "default_frequency_level")]
    pub frequency_level: u32,
    #[serde(default = "default_pitch")]
    pub min_pitch: f32,
    #[serde(default = "default_pitch")]
    pub max_pitch: f32,
    /// Cut the previous blip off before playing the next one.
    #[serde(default)]
    pub stop_audio_source: bool,
}

fn default_frequency_level() -> u32 {
    2
}

fn default_pitch() -> f32 {
    1.0
}

impl AudioProfile {
    pub fn new(id: impl Into<String>, clips: Vec<String>) -> Self {
        Self {
            id: id.into(),
            clips,
            frequency_level: default_frequency_level(),
            min_pitch: default_pitch(),
            max_pitch: default_pitch(),
            stop_audio_source: false,
        }
    }

    pub fn with_pitch_range(mut self, min_pitch: f32, max_pitch: f32) -> Self {
        self.min_pitch = min_pitch;
        self.max_pitch = max_pitch;
        self
    }

    pub fn with_frequency_level(mut self, frequency_level: u32) -> Self {
        self.frequency_level = frequency_level;
        self
    }
}

/// Registry of known audio profiles plus the one used when nothing else
/// has been selected.
#[derive(Debug, Clone)]
pub struct AudioProfileRegistry {
    default_id: String,
    profiles: FxHashMap<String, AudioProfile>,
}

#[derive(Debug, thiserror::Error)]
pub enum AudioProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("audio profile '{0}' has no clips")]
    NoClips(String),
}

impl Default for AudioProfileRegistry {
    fn default() -> Self {
        Self::new(AudioProfile::new("default", Vec::new()))
    }
}

impl AudioProfileRegistry {
    pub fn new(default_profile: AudioProfile) -> Self {
        let default_id = default_profile.id.clone();
        let mut profiles = FxHashMap::default();
        profiles.insert(default_id.clone(), default_profile);
        Self {
            default_id,
            profiles,
        }
    }

    pub fn register(&mut self, profile: AudioProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn get(&self, id: &str) -> Option<&AudioProfile> {
        self.profiles.get(id)
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn default_profile(&self) -> &AudioProfile {
        // The default is inserted on construction and never removed.
        &self.profiles[&self.default_id]
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Load profiles from a RON file containing a list of `AudioProfile`s.
    /// Profiles without clips are rejected.
    pub fn load_from_ron(&mut self, path: &std::path::Path) -> Result<(), AudioProfileError> {
        let contents = std::fs::read_to_string(path)?;
        self.parse_ron(&contents)
    }

    pub fn parse_ron(&mut self, input: &str) -> Result<(), AudioProfileError> {
        let profiles: Vec<AudioProfile> = ron::from_str(input)?;
        if let Some(empty) = profiles.iter().find(|p| p.clips.is_empty()) {
            return Err(AudioProfileError::NoClips(empty.id.clone()));
        }
        for profile in profiles {
            self.register(profile);
        }
        Ok(())
    }
}
