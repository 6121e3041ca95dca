/// Session configuration and per-start overrides.
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for a dialogue session. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Delay between revealed units.
    pub typing_speed: f32,
    /// Continue signals closer together than this collapse into one.
    pub debounce_window: f32,
    /// Pause between the story ending and the session resetting.
    pub exit_grace: f32,
    /// Speaker name shown before any `speaker` tag.
    pub speaker_sentinel: String,
    /// Choice slots the presentation layer offers.
    pub choice_capacity: usize,
    /// Offer choices as soon as the line before them has finished revealing,
    /// instead of waiting for a continue.
    pub present_choices_with_line: bool,
    /// Derive blip clip and pitch from the revealed character instead of
    /// drawing them at random.
    pub predictable_audio: bool,
    pub audio_seed: u64,
    /// Quest referred to by bare `start_quest` / `complete_quest` tags.
    pub default_quest: Option<String>,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            typing_speed: 0.04,
            debounce_window: 0.5,
            exit_grace: 0.2,
            speaker_sentinel: "???".to_string(),
            choice_capacity: 4,
            present_choices_with_line: false,
            predictable_audio: false,
            audio_seed: 0,
            default_quest: None,
        }
    }
}

impl DialogueConfig {
    pub fn load_from_ron(path: &Path) -> Result<DialogueConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<DialogueConfig, ConfigError> {
        let config: DialogueConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, secs) in [
            ("typing_speed", self.typing_speed),
            ("debounce_window", self.debounce_window),
            ("exit_grace", self.exit_grace),
        ] {
            if seconds(secs).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative, representable number of seconds, got {secs}"
                )));
            }
        }
        if self.choice_capacity == 0 {
            return Err(ConfigError::Invalid(
                "choice_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    // Fields are public, so these fall back to the defaults instead of
    // trusting that `validate` ran.
    pub fn typing_delay(&self) -> Duration {
        seconds(self.typing_speed).unwrap_or(Duration::from_millis(40))
    }

    pub fn debounce(&self) -> Duration {
        seconds(self.debounce_window).unwrap_or(Duration::from_millis(500))
    }

    pub fn exit_delay(&self) -> Duration {
        seconds(self.exit_grace).unwrap_or(Duration::from_millis(200))
    }
}

/// `secs` as a `Duration`, or `None` when it is negative, NaN, infinite or
/// too large to represent.
pub fn seconds(secs: f32) -> Option<Duration> {
    Duration::try_from_secs_f32(secs).ok()
}

/// Per-conversation overrides, typically taken from the character being
/// talked to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartOptions {
    /// Knot to start from instead of the story's start knot.
    pub entry: Option<String>,
    /// Typing speed in seconds per unit.
    pub typing_speed: Option<f32>,
    /// Audio profile active before any `audio` tag.
    pub audio_profile: Option<String>,
    /// Quest referred to by bare quest keywords during this conversation.
    pub quest: Option<String>,
}

impl StartOptions {
    pub fn at(entry: impl Into<String>) -> Self {
        Self {
            entry: Some(entry.into()),
            ..Self::default()
        }
    }

    pub fn typing_speed(mut self, secs: f32) -> Self {
        self.typing_speed = Some(secs);
        self
    }

    pub fn audio_profile(mut self, id: impl Into<String>) -> Self {
        self.audio_profile = Some(id.into());
        self
    }

    pub fn quest(mut self, title: impl Into<String>) -> Self {
        self.quest = Some(title.into());
        self
    }
}
