/// Session integration tests — full conversations driven through the public
/// API on the virtual clock.

use dialogue_engine::core::bridge::{
    AudioCollaborator, DialogueFrame, MovementLock, PresentationSink,
};
use dialogue_engine::core::config::{DialogueConfig, StartOptions};
use dialogue_engine::core::cursor::{Choice, CursorError, StoryCursor, StoryLine};
use dialogue_engine::core::input::InputDecision;
use dialogue_engine::core::session::{DialoguePhase, DialogueSession, SessionError};
use dialogue_engine::core::variables::DialogueVariables;
use dialogue_engine::schema::audio::{AudioProfile, AudioProfileRegistry};
use dialogue_engine::schema::quest::{QuestLog, QuestStatus};
use dialogue_engine::schema::story::{StoryGraph, Value};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// Long enough for any debounce window to pass.
const PAUSE: Duration = Duration::from_millis(600);
const STEP: Duration = Duration::from_millis(50);

/// Records every collaborator call in order.
#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
    units: Vec<(char, String)>,
    frames: Vec<DialogueFrame>,
}

impl MovementLock for Recorder {
    fn lock_movement(&mut self) {
        self.calls.push("lock".to_string());
    }

    fn unlock_movement(&mut self) {
        self.calls.push("unlock".to_string());
    }
}

impl AudioCollaborator for Recorder {
    fn unit_revealed(&mut self, _index: usize, unit: char, profile: &AudioProfile) {
        self.units.push((unit, profile.id.clone()));
    }
}

impl PresentationSink for Recorder {
    fn present(&mut self, frame: &DialogueFrame) {
        self.frames.push(frame.clone());
    }
}

fn edge_cases() -> Arc<StoryGraph> {
    Arc::new(StoryGraph::load_from_ron(Path::new("tests/fixtures/edge_cases.ron")).unwrap())
}

fn village() -> Arc<StoryGraph> {
    Arc::new(
        StoryGraph::load_from_ron(Path::new("story_data/village_square/story.ron")).unwrap(),
    )
}

fn fixture_profiles() -> AudioProfileRegistry {
    let mut profiles = AudioProfileRegistry::default();
    profiles
        .load_from_ron(Path::new("tests/fixtures/audio.ron"))
        .unwrap();
    profiles
}

fn fixture_quests() -> Rc<RefCell<QuestLog>> {
    let mut quests = QuestLog::new();
    quests
        .load_from_ron(Path::new("tests/fixtures/quests.ron"))
        .unwrap();
    Rc::new(RefCell::new(quests))
}

/// Step time until the current line has fully revealed.
fn finish_line(session: &mut DialogueSession) {
    for _ in 0..1000 {
        if session.phase() != DialoguePhase::Revealing {
            return;
        }
        session.update(STEP);
    }
    panic!("line never finished revealing");
}

/// Finish the current line and press continue once the debounce has passed.
fn next_line(session: &mut DialogueSession) {
    finish_line(session);
    assert_eq!(session.phase(), DialoguePhase::AwaitingInput);
    session.update(PAUSE);
    assert_eq!(session.continue_signal(), InputDecision::AdvanceStory);
}

fn run_to_idle(session: &mut DialogueSession) {
    for _ in 0..1000 {
        match session.phase() {
            DialoguePhase::Idle => return,
            DialoguePhase::Exiting | DialoguePhase::Revealing => session.update(STEP),
            other => panic!("conversation stalled in {:?}", other),
        }
    }
    panic!("conversation never reached idle");
}

#[test]
fn village_square_two_conversations() {
    let quests = Rc::new(RefCell::new(QuestLog::new()));
    quests
        .borrow_mut()
        .load_from_ron(Path::new("story_data/village_square/quests.ron"))
        .unwrap();
    let mut profiles = AudioProfileRegistry::default();
    profiles
        .load_from_ron(Path::new("story_data/village_square/audio.ron"))
        .unwrap();
    let variables = Rc::new(RefCell::new(DialogueVariables::new()));
    let player = Rc::new(RefCell::new(Recorder::default()));

    let config =
        DialogueConfig::load_from_ron(Path::new("story_data/village_square/config.ron")).unwrap();
    let mut session = DialogueSession::builder()
        .config(config)
        .audio_profiles(profiles)
        .quest_bridge(Rc::clone(&quests))
        .variables(Rc::clone(&variables))
        .movement(Rc::clone(&player))
        .build()
        .unwrap();
    let graph = village();

    // Mira asks for help; the first choice starts the quest.
    session.start(Arc::clone(&graph), None).unwrap();
    assert_eq!(session.speaker_name(), "Mira");
    assert_eq!(session.active_audio_profile().id, "mira");
    next_line(&mut session);
    next_line(&mut session);
    next_line(&mut session);
    assert_eq!(session.phase(), DialoguePhase::AwaitingChoice);
    assert_eq!(session.pending_choices().len(), 2);
    assert_eq!(session.variable("met_mira"), Some(Value::Bool(true)));

    assert_eq!(session.confirm_choice().unwrap(), InputDecision::SelectChoice(0));
    assert_eq!(quests.borrow().status("FindKey"), Some(QuestStatus::Active));
    next_line(&mut session);
    run_to_idle(&mut session);

    assert_eq!(session.speaker_name(), "???");
    assert_eq!(session.active_audio_profile().id, "default");
    assert_eq!(
        variables.borrow().variable_state("met_mira"),
        Some(&Value::Bool(true))
    );

    // Bram has the key; a bare `complete_quest` tag finishes the default quest.
    session.start(Arc::clone(&graph), Some("bram")).unwrap();
    assert_eq!(session.speaker_name(), "Bram");
    assert_eq!(session.variable("met_mira"), Some(Value::Bool(true)));
    next_line(&mut session);
    session.choose_choice(0).unwrap();
    next_line(&mut session);
    finish_line(&mut session);
    assert_eq!(quests.borrow().status("FindKey"), Some(QuestStatus::Completed));
    session.update(PAUSE);
    session.continue_signal();
    run_to_idle(&mut session);

    assert_eq!(
        variables.borrow().variable_state("key_found"),
        Some(&Value::Bool(true))
    );
    assert_eq!(player.borrow().calls, ["lock", "unlock", "lock", "unlock"]);
}

#[test]
fn restart_mid_reveal_discards_old_line() {
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let mut profiles = AudioProfileRegistry::default();
    profiles
        .load_from_ron(Path::new("story_data/village_square/audio.ron"))
        .unwrap();
    let mut session = DialogueSession::builder()
        .audio_profiles(profiles)
        .audio(Rc::clone(&recorder))
        .movement(Rc::clone(&recorder))
        .build()
        .unwrap();
    let graph = village();

    session.start(Arc::clone(&graph), None).unwrap();
    session.update(Duration::from_millis(100));
    assert_eq!(recorder.borrow().units.len(), 2);

    session.start(Arc::clone(&graph), Some("bram")).unwrap();
    session.update(Duration::from_secs(10));

    let bram_line = "Hrm. Another one looking for trouble?";
    assert_eq!(session.phase(), DialoguePhase::AwaitingInput);
    assert_eq!(session.revealed_text(), bram_line);

    let recorder = recorder.borrow();
    assert_eq!(recorder.units.len(), 2 + bram_line.chars().count());
    assert!(recorder.units[2..].iter().all(|(_, profile)| profile == "bram"));
    let revealed: String = recorder.units[2..].iter().map(|(c, _)| *c).collect();
    assert_eq!(revealed, bram_line);
    assert_eq!(recorder.calls, ["lock", "unlock", "lock"]);
}

#[test]
fn continue_skips_then_debounces() {
    let mut session = DialogueSession::builder().build().unwrap();
    session.start(edge_cases(), None).unwrap();
    assert_eq!(session.phase(), DialoguePhase::Revealing);

    assert_eq!(session.continue_signal(), InputDecision::SkipReveal);
    assert_eq!(session.phase(), DialoguePhase::AwaitingInput);
    assert_eq!(session.revealed_text(), "Hello");

    // Same instant: swallowed by the debounce window.
    assert_eq!(session.continue_signal(), InputDecision::Ignore);
    session.update(Duration::from_millis(200));
    assert_eq!(session.continue_signal(), InputDecision::Ignore);
    assert_eq!(session.phase(), DialoguePhase::AwaitingInput);

    session.update(Duration::from_millis(400));
    assert_eq!(session.continue_signal(), InputDecision::AdvanceStory);
    assert_eq!(session.phase(), DialoguePhase::AwaitingChoice);
}

#[test]
fn invalid_choice_has_no_side_effects() {
    let mut session = DialogueSession::builder().build().unwrap();
    session.start(edge_cases(), None).unwrap();
    next_line(&mut session);

    let err = session.choose_choice(5).unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidChoiceIndex {
            index: 5,
            available: 2
        }
    ));
    assert_eq!(session.phase(), DialoguePhase::AwaitingChoice);
    assert_eq!(session.pending_choices().len(), 2);

    session.choose_choice(0).unwrap();
    finish_line(&mut session);
    assert_eq!(session.revealed_text(), "Good.");
}

#[test]
fn start_preempts_exit_delay() {
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let mut session = DialogueSession::builder()
        .movement(Rc::clone(&recorder))
        .build()
        .unwrap();
    let graph = edge_cases();

    session.start(Arc::clone(&graph), Some("empty")).unwrap();
    assert_eq!(session.phase(), DialoguePhase::Exiting);

    session.start(Arc::clone(&graph), None).unwrap();
    assert_eq!(session.phase(), DialoguePhase::Revealing);
    session.update(Duration::from_secs(1));
    assert_eq!(session.phase(), DialoguePhase::AwaitingInput);
    assert_eq!(recorder.borrow().calls, ["lock", "unlock", "lock"]);
}

#[test]
fn exit_mid_reveal_hides_panel_after_grace() {
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let mut session = DialogueSession::builder()
        .presentation(Rc::clone(&recorder))
        .movement(Rc::clone(&recorder))
        .build()
        .unwrap();
    session.start(edge_cases(), None).unwrap();
    session.update(Duration::from_millis(50));

    session.exit();
    assert_eq!(session.phase(), DialoguePhase::Exiting);
    assert!(session.snapshot().panel_visible);

    session.update(Duration::from_millis(300));
    assert_eq!(session.phase(), DialoguePhase::Idle);

    let frame = session.snapshot();
    assert!(!frame.panel_visible);
    assert!(frame.revealed_text.is_empty());
    assert_eq!(frame.speaker_name, "???");

    let recorder = recorder.borrow();
    assert_eq!(recorder.calls, ["lock", "unlock"]);
    assert_eq!(recorder.frames.last().map(|f| f.phase), Some(DialoguePhase::Idle));
}

#[test]
fn bad_tags_are_skipped_without_stopping_dialogue() {
    let mut session = DialogueSession::builder()
        .audio_profiles(fixture_profiles())
        .build()
        .unwrap();
    session
        .start_with(
            edge_cases(),
            StartOptions::at("bad_tags").audio_profile("mira"),
        )
        .unwrap();

    assert_eq!(session.phase(), DialoguePhase::Revealing);
    assert_eq!(session.speaker_name(), "Iris");
    assert_eq!(session.active_audio_profile().id, "mira");

    next_line(&mut session);
    finish_line(&mut session);
    assert_eq!(session.revealed_text(), "After.");
}

#[test]
fn audio_tag_switches_profile() {
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let mut session = DialogueSession::builder()
        .audio_profiles(fixture_profiles())
        .audio(Rc::clone(&recorder))
        .build()
        .unwrap();
    session.start(edge_cases(), Some("voiced")).unwrap();
    finish_line(&mut session);

    let recorder = recorder.borrow();
    assert_eq!(
        recorder.units,
        [('H', "mira".to_string()), ('i', "mira".to_string())]
    );
}

#[test]
fn choice_tags_apply_before_the_branch_plays() {
    let quests = fixture_quests();
    let mut session = DialogueSession::builder()
        .quest_bridge(Rc::clone(&quests))
        .build()
        .unwrap();
    session.start(edge_cases(), Some("tagged_choice")).unwrap();
    assert_eq!(session.speaker_name(), "Guard");
    next_line(&mut session);

    session.choose_choice(0).unwrap();
    assert_eq!(session.speaker_name(), "Narrator");
    assert_eq!(quests.borrow().status("Patrol"), Some(QuestStatus::Active));
    finish_line(&mut session);
    assert_eq!(session.revealed_text(), "Pass, friend.");
}

#[test]
fn config_fixture_offers_choices_with_their_line() {
    let config = DialogueConfig::load_from_ron(Path::new("tests/fixtures/config.ron")).unwrap();
    let mut session = DialogueSession::builder().config(config).build().unwrap();
    session.start(edge_cases(), Some("crowd")).unwrap();

    // Five units at 50ms each.
    session.update(Duration::from_millis(200));
    assert_eq!(session.phase(), DialoguePhase::Revealing);
    finish_line(&mut session);

    // Three choices against a capacity of two: all are still offered.
    assert_eq!(session.phase(), DialoguePhase::AwaitingChoice);
    assert_eq!(session.pending_choices().len(), 3);
    assert_eq!(session.snapshot().visible_choices, ["Red", "Green", "Blue"]);
    assert_eq!(session.highlighted_choice(), Some(0));
}

#[test]
fn empty_line_completes_immediately() {
    let mut session = DialogueSession::builder().build().unwrap();
    session.start(edge_cases(), Some("blank")).unwrap();
    assert_eq!(session.phase(), DialoguePhase::AwaitingInput);
    assert_eq!(session.revealed_text(), "");
    assert!(session.snapshot().is_reveal_complete);

    assert_eq!(session.continue_signal(), InputDecision::AdvanceStory);
    assert_eq!(session.phase(), DialoguePhase::Revealing);
    finish_line(&mut session);
    assert_eq!(session.revealed_text(), "Then words.");
}

#[test]
fn typing_speed_override_slows_reveal() {
    let mut session = DialogueSession::builder().build().unwrap();
    session
        .start_with(edge_cases(), StartOptions::default().typing_speed(0.1))
        .unwrap();
    session.update(Duration::from_millis(250));
    assert_eq!(session.revealed_text(), "He");
    assert_eq!(session.phase(), DialoguePhase::Revealing);
}

#[test]
fn variables_sync_after_exit() {
    let variables = Rc::new(RefCell::new(DialogueVariables::new()));
    let mut session = DialogueSession::builder()
        .variables(Rc::clone(&variables))
        .build()
        .unwrap();
    session.start(edge_cases(), Some("counter")).unwrap();
    assert!(variables.borrow().is_listening());
    assert_eq!(session.variable("visits"), Some(Value::Int(1)));

    next_line(&mut session);
    run_to_idle(&mut session);
    assert!(!variables.borrow().is_listening());
    assert_eq!(
        variables.borrow().variable_state("visits"),
        Some(&Value::Int(1))
    );
}

#[test]
fn unknown_entry_leaves_running_conversation_alone() {
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let mut session = DialogueSession::builder()
        .movement(Rc::clone(&recorder))
        .build()
        .unwrap();
    session.start(edge_cases(), None).unwrap();
    session.update(Duration::from_millis(100));
    let before = session.snapshot();

    assert!(session.start(edge_cases(), Some("cellar")).is_err());
    assert_eq!(session.snapshot(), before);
    assert_eq!(recorder.borrow().calls, ["lock"]);
}

#[test]
fn story_assignments_win_over_saved_globals() {
    let mut saved = DialogueVariables::new();
    saved.set("visits", Value::Int(5));
    let variables = Rc::new(RefCell::new(saved));
    let mut session = DialogueSession::builder()
        .variables(Rc::clone(&variables))
        .build()
        .unwrap();

    session.start(edge_cases(), Some("counter")).unwrap();
    assert_eq!(session.variable("visits"), Some(Value::Int(1)));

    next_line(&mut session);
    run_to_idle(&mut session);
    assert_eq!(
        variables.borrow().variable_state("visits"),
        Some(&Value::Int(1))
    );
}

#[test]
fn entry_point_skips_the_start_knot() {
    let variables = Rc::new(RefCell::new(DialogueVariables::new()));
    let mut session = DialogueSession::builder()
        .variables(Rc::clone(&variables))
        .build()
        .unwrap();

    session.start(edge_cases(), Some("counter")).unwrap();
    assert_eq!(session.variable("greeted"), Some(Value::Bool(false)));
    next_line(&mut session);
    run_to_idle(&mut session);
    assert_eq!(
        variables.borrow().variable_state("greeted"),
        Some(&Value::Bool(false))
    );

    session.start(edge_cases(), None).unwrap();
    assert_eq!(session.variable("greeted"), Some(Value::Bool(true)));
}

#[test]
fn oversized_durations_never_reach_the_clock() {
    let config = DialogueConfig {
        exit_grace: 1e30,
        ..DialogueConfig::default()
    };
    assert!(DialogueSession::builder().config(config).build().is_err());

    let mut session = DialogueSession::builder().build().unwrap();
    session
        .start_with(edge_cases(), StartOptions::default().typing_speed(1e30))
        .unwrap();
    // Falls back to the configured 40ms per unit.
    session.update(Duration::from_millis(100));
    assert_eq!(session.revealed_text(), "He");

    session.start(edge_cases(), Some("empty")).unwrap();
    run_to_idle(&mut session);
}

/// Offers one tagged choice, then refuses every pick.
struct RefusingCursor;

impl StoryCursor for RefusingCursor {
    fn can_advance(&self) -> bool {
        false
    }

    fn advance(&mut self) -> Result<StoryLine, CursorError> {
        Err(CursorError::GraphExhausted)
    }

    fn current_choices(&self) -> Vec<Choice> {
        vec![Choice {
            index: 0,
            text: "A friend.".to_string(),
            tags: vec!["speaker: Narrator".to_string(), "start_quest: Patrol".to_string()],
        }]
    }

    fn choose(&mut self, index: usize) -> Result<(), CursorError> {
        Err(CursorError::InvalidChoiceIndex {
            index,
            available: 0,
        })
    }

    fn jump_to(&mut self, label: &str) -> Result<(), CursorError> {
        Err(CursorError::UnknownLabel(label.to_string()))
    }

    fn variable(&self, _name: &str) -> Option<Value> {
        None
    }

    fn set_variable(&mut self, _name: &str, _value: Value) {}

    fn variables(&self) -> Vec<(String, Value)> {
        Vec::new()
    }
}

#[test]
fn rejected_choice_leaves_its_tags_unapplied() {
    let quests = fixture_quests();
    let mut session = DialogueSession::builder()
        .quest_bridge(Rc::clone(&quests))
        .build()
        .unwrap();
    session
        .start_cursor(Box::new(RefusingCursor), StartOptions::default())
        .unwrap();
    assert_eq!(session.phase(), DialoguePhase::AwaitingChoice);

    let err = session.choose_choice(0).unwrap_err();
    assert!(matches!(err, SessionError::Cursor(CursorError::InvalidChoiceIndex { .. })));
    assert_eq!(session.phase(), DialoguePhase::AwaitingChoice);
    assert_eq!(session.speaker_name(), "???");
    assert_eq!(quests.borrow().status("Patrol"), Some(QuestStatus::Inactive));
}
