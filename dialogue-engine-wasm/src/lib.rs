//! WASM bindings for dialogue-engine — powers the interactive web demo.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use wasm_bindgen::prelude::*;

use dialogue_engine::core::audio::{BlipAudio, BlipCue, BlipSelector};
use dialogue_engine::core::config::DialogueConfig;
use dialogue_engine::core::input::InputDecision;
use dialogue_engine::core::session::DialogueSession;
use dialogue_engine::core::variables::DialogueVariables;
use dialogue_engine::schema::audio::AudioProfileRegistry;
use dialogue_engine::schema::quest::{QuestLog, QuestStatus};
use dialogue_engine::schema::story::StoryGraph;

// ---------------------------------------------------------------------------
// Embedded scene data — compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const VILLAGE_SQUARE_STORY: &str =
        include_str!("../../story_data/village_square/story.ron");
    pub const VILLAGE_SQUARE_AUDIO: &str =
        include_str!("../../story_data/village_square/audio.ron");
    pub const VILLAGE_SQUARE_QUESTS: &str =
        include_str!("../../story_data/village_square/quests.ron");
    pub const VILLAGE_SQUARE_CONFIG: &str =
        include_str!("../../story_data/village_square/config.ron");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct CueInfo {
    clip: String,
    pitch: f32,
    stop_previous: bool,
}

#[derive(serde::Serialize)]
struct QuestInfo {
    title: String,
    description: String,
    status: QuestStatus,
}

fn decision_label(decision: InputDecision) -> &'static str {
    match decision {
        InputDecision::SkipReveal => "skip_reveal",
        InputDecision::AdvanceStory => "advance_story",
        InputDecision::SelectChoice(_) => "select_choice",
        InputDecision::Ignore => "ignore",
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// DialoguePlayer — the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct DialoguePlayer {
    session: DialogueSession,
    graph: Arc<StoryGraph>,
    quests: Rc<RefCell<QuestLog>>,
    variables: Rc<RefCell<DialogueVariables>>,
    cues: Rc<RefCell<Vec<BlipCue>>>,
    scene: String,
}

#[wasm_bindgen]
impl DialoguePlayer {
    /// Create a player for the given scene. `seed` drives blip selection
    /// when the scene does not use predictable audio.
    #[wasm_bindgen(constructor)]
    pub fn new(scene: &str, seed: u64) -> Result<DialoguePlayer, JsError> {
        let (story_src, audio_src, quests_src, config_src) = match scene {
            "village_square" => (
                data::VILLAGE_SQUARE_STORY,
                data::VILLAGE_SQUARE_AUDIO,
                data::VILLAGE_SQUARE_QUESTS,
                data::VILLAGE_SQUARE_CONFIG,
            ),
            _ => return Err(JsError::new(&format!("Unknown scene: {scene}"))),
        };

        let graph = StoryGraph::parse_ron(story_src)
            .map_err(|e| JsError::new(&format!("Story parse error: {e}")))?;
        graph
            .validate()
            .map_err(|e| JsError::new(&format!("Story validation error: {e}")))?;

        let mut profiles = AudioProfileRegistry::default();
        profiles
            .parse_ron(audio_src)
            .map_err(|e| JsError::new(&format!("Audio profile parse error: {e}")))?;

        let mut quest_log = QuestLog::new();
        quest_log
            .parse_ron(quests_src)
            .map_err(|e| JsError::new(&format!("Quest parse error: {e}")))?;

        let mut config = DialogueConfig::parse_ron(config_src)
            .map_err(|e| JsError::new(&format!("Config parse error: {e}")))?;
        config.audio_seed = seed;

        let quests = Rc::new(RefCell::new(quest_log));
        let variables = Rc::new(RefCell::new(DialogueVariables::new()));
        let cues: Rc<RefCell<Vec<BlipCue>>> = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&cues);
        let audio = BlipAudio::new(BlipSelector::from_config(&config), move |cue: &BlipCue| {
            sink.borrow_mut().push(cue.clone());
        });

        let session = DialogueSession::builder()
            .config(config)
            .audio_profiles(profiles)
            .quest_bridge(Rc::clone(&quests))
            .variables(Rc::clone(&variables))
            .audio(audio)
            .build()
            .map_err(|e| JsError::new(&format!("Session build error: {e}")))?;

        Ok(DialoguePlayer {
            session,
            graph: Arc::new(graph),
            quests,
            variables,
            cues,
            scene: scene.to_string(),
        })
    }

    /// Start a conversation at `entry`, or the story's start knot.
    pub fn start(&mut self, entry: Option<String>) -> Result<(), JsError> {
        self.session
            .start(Arc::clone(&self.graph), entry.as_deref())
            .map_err(|e| JsError::new(&format!("Start error: {e}")))
    }

    /// Advance virtual time by `ms` milliseconds.
    pub fn tick(&mut self, ms: f64) {
        if ms.is_finite() && ms > 0.0 {
            self.session.update(Duration::from_secs_f64(ms / 1000.0));
        }
    }

    /// Press continue. Returns what the press did.
    pub fn press_continue(&mut self) -> String {
        decision_label(self.session.continue_signal()).to_string()
    }

    pub fn confirm(&mut self) -> Result<String, JsError> {
        self.session
            .confirm_choice()
            .map(|d| decision_label(d).to_string())
            .map_err(|e| JsError::new(&format!("Choice error: {e}")))
    }

    pub fn choose(&mut self, index: usize) -> Result<(), JsError> {
        self.session
            .choose_choice(index)
            .map_err(|e| JsError::new(&format!("Choice error: {e}")))
    }

    pub fn highlight_next(&mut self) {
        self.session.highlight_next();
    }

    pub fn highlight_previous(&mut self) {
        self.session.highlight_previous();
    }

    pub fn exit(&mut self) {
        self.session.exit();
    }

    /// Return the current presentation frame as JSON.
    pub fn frame(&self) -> Result<String, JsError> {
        to_json(&self.session.snapshot())
    }

    /// Return and clear the blips played since the last call, as a JSON array.
    pub fn take_cues(&mut self) -> Result<String, JsError> {
        let cues: Vec<CueInfo> = self
            .cues
            .borrow_mut()
            .drain(..)
            .map(|cue| CueInfo {
                clip: cue.clip,
                pitch: cue.pitch,
                stop_previous: cue.stop_previous,
            })
            .collect();
        to_json(&cues)
    }

    /// Return every quest with its status as JSON.
    pub fn quests(&self) -> Result<String, JsError> {
        let quests = self.quests.borrow();
        let info: Vec<QuestInfo> = quests
            .quests()
            .into_iter()
            .map(|q| QuestInfo {
                title: q.title.clone(),
                description: q.description.clone(),
                status: q.status,
            })
            .collect();
        to_json(&info)
    }

    /// Return the persisted variables as RON text.
    pub fn variables(&self) -> Result<String, JsError> {
        self.variables
            .borrow()
            .to_ron()
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// Return JSON array of the knots a conversation can start from.
    pub fn entry_points(&self) -> String {
        let mut labels: Vec<&String> = self.graph.knots.keys().collect();
        labels.sort();
        serde_json::to_string(&labels).unwrap_or_else(|_| "[]".to_string())
    }

    /// Return JSON array of available scene identifiers.
    pub fn available_scenes() -> String {
        serde_json::to_string(&["village_square"]).unwrap_or_else(|_| "[]".to_string())
    }

    /// Rebuild the player from scratch with a new seed (same scene).
    pub fn reset(&mut self, seed: u64) -> Result<(), JsError> {
        *self = DialoguePlayer::new(&self.scene.clone(), seed)?;
        Ok(())
    }
}
