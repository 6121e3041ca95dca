//! Plays both conversations of the village square scene without a player,
//! always taking the first choice.
//!
//! Run with: cargo run --example village_square
//! Set RUST_LOG=dialogue_engine=debug to watch the session's transitions.

use dialogue_engine::core::bridge::{DialogueFrame, MovementLock, PresentationSink};
use dialogue_engine::core::config::{DialogueConfig, StartOptions};
use dialogue_engine::core::session::{DialoguePhase, DialogueSession};
use dialogue_engine::core::variables::DialogueVariables;
use dialogue_engine::schema::audio::AudioProfileRegistry;
use dialogue_engine::schema::quest::QuestLog;
use dialogue_engine::schema::story::StoryGraph;
use std::cell::RefCell;
use std::error::Error;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const FRAME: Duration = Duration::from_millis(16);

struct Transcript;

impl PresentationSink for Transcript {
    fn present(&mut self, frame: &DialogueFrame) {
        match frame.phase {
            DialoguePhase::AwaitingInput => {
                println!("{:>6}: {}", frame.speaker_name, frame.revealed_text)
            }
            DialoguePhase::AwaitingChoice => {
                for (i, choice) in frame.visible_choices.iter().enumerate() {
                    let marker = if frame.highlighted_choice == Some(i) { '>' } else { ' ' };
                    println!("        {marker} {choice}");
                }
            }
            _ => {}
        }
    }
}

#[derive(Default)]
struct Player {
    frozen: bool,
}

impl MovementLock for Player {
    fn lock_movement(&mut self) {
        self.frozen = true;
    }

    fn unlock_movement(&mut self) {
        self.frozen = false;
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("story_data/village_square");
    let graph = Arc::new(StoryGraph::load_from_ron(&data.join("story.ron"))?);
    graph.validate()?;

    let mut profiles = AudioProfileRegistry::default();
    profiles.load_from_ron(&data.join("audio.ron"))?;
    let mut quest_log = QuestLog::new();
    quest_log.load_from_ron(&data.join("quests.ron"))?;

    let quests = Rc::new(RefCell::new(quest_log));
    let variables = Rc::new(RefCell::new(DialogueVariables::new()));
    let player = Rc::new(RefCell::new(Player::default()));

    let mut session = DialogueSession::builder()
        .config(DialogueConfig::load_from_ron(&data.join("config.ron"))?)
        .audio_profiles(profiles)
        .quest_bridge(Rc::clone(&quests))
        .variables(Rc::clone(&variables))
        .movement(Rc::clone(&player))
        .presentation(Transcript)
        .build()?;

    for options in [
        StartOptions::default(),
        StartOptions::at("bram").typing_speed(0.06),
    ] {
        println!("--- {} ---", options.entry.as_deref().unwrap_or(graph.start.as_str()));
        session.start_with(Arc::clone(&graph), options)?;
        play_out(&mut session);
        println!("player frozen after exit: {}", player.borrow().frozen);
        for event in quests.borrow_mut().drain_events() {
            println!("quest event: {event:?}");
        }
    }

    println!("--- saved variables ---");
    println!("{}", variables.borrow().to_ron()?);
    Ok(())
}

/// Drive the session at a steady frame rate, pressing continue whenever a
/// line is waiting and taking the first choice whenever one is offered.
fn play_out(session: &mut DialogueSession) {
    while session.is_active() {
        match session.phase() {
            DialoguePhase::AwaitingInput => {
                session.continue_signal();
            }
            DialoguePhase::AwaitingChoice => {
                if let Err(e) = session.confirm_choice() {
                    eprintln!("choice failed: {e}");
                    session.exit();
                }
            }
            _ => {}
        }
        session.update(FRAME);
    }
}
