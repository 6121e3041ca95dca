/// Preview — interactive shell for playing a story the way a game would.
///
/// Usage: preview --story <path> [--audio <path>] [--quests <path>] [--config <path>]
///                [--variables <path>] [--blips]
///
/// Commands:
///   start [knot]      — start a conversation (at the start knot by default)
///   c                 — continue / skip the current reveal
///   tick <ms>         — advance virtual time
///   run               — advance time until the current line is fully shown
///   next | prev       — move the choice highlight
///   confirm           — confirm the highlighted choice
///   choose <n>        — pick choice n directly
///   exit              — end the conversation
///   frame             — print the current presentation frame
///   vars              — print story variables
///   quests            — print quest status
///   help              — list commands
///   quit              — leave the shell

use dialogue_engine::core::audio::{BlipAudio, BlipCue, BlipSelector};
use dialogue_engine::core::bridge::{DialogueFrame, PresentationSink};
use dialogue_engine::core::config::DialogueConfig;
use dialogue_engine::core::session::{DialoguePhase, DialogueSession};
use dialogue_engine::core::variables::DialogueVariables;
use dialogue_engine::schema::audio::AudioProfileRegistry;
use dialogue_engine::schema::quest::QuestLog;
use dialogue_engine::schema::story::StoryGraph;
use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Prints a frame whenever the phase changes.
#[derive(Default)]
struct ConsoleSink {
    last_phase: Option<DialoguePhase>,
}

impl PresentationSink for ConsoleSink {
    fn present(&mut self, frame: &DialogueFrame) {
        if self.last_phase == Some(frame.phase) {
            return;
        }
        self.last_phase = Some(frame.phase);
        match frame.phase {
            DialoguePhase::AwaitingInput => {
                println!("{}: {}", frame.speaker_name, frame.revealed_text);
            }
            DialoguePhase::AwaitingChoice => {
                if !frame.revealed_text.is_empty() {
                    println!("{}: {}", frame.speaker_name, frame.revealed_text);
                }
                for (i, choice) in frame.visible_choices.iter().enumerate() {
                    let marker = if frame.highlighted_choice == Some(i) { ">" } else { " " };
                    println!("  {} [{}] {}", marker, i, choice);
                }
            }
            DialoguePhase::Exiting => println!("-- conversation ending --"),
            DialoguePhase::Idle => println!("-- idle --"),
            DialoguePhase::Revealing | DialoguePhase::Advancing => {}
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut story_path = None;
    let mut audio_path = None;
    let mut quests_path = None;
    let mut config_path = None;
    let mut variables_path = None;
    let mut blips = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--story" if i + 1 < args.len() => {
                i += 1;
                story_path = Some(args[i].clone());
            }
            "--audio" if i + 1 < args.len() => {
                i += 1;
                audio_path = Some(args[i].clone());
            }
            "--quests" if i + 1 < args.len() => {
                i += 1;
                quests_path = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--variables" if i + 1 < args.len() => {
                i += 1;
                variables_path = Some(args[i].clone());
            }
            "--blips" => blips = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(story_path) = story_path else {
        eprintln!("ERROR: --story is required");
        print_usage();
        std::process::exit(1);
    };

    let graph = match StoryGraph::load_from_ron(Path::new(&story_path)) {
        Ok(graph) => Arc::new(graph),
        Err(e) => {
            eprintln!("ERROR: Failed to load story: {}", e);
            std::process::exit(1);
        }
    };

    let config = match config_path {
        Some(ref path) => DialogueConfig::load_from_ron(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("ERROR: Failed to load config: {}", e);
            std::process::exit(1);
        }),
        None => DialogueConfig::default(),
    };

    let mut profiles = AudioProfileRegistry::default();
    if let Some(ref path) = audio_path {
        if let Err(e) = profiles.load_from_ron(Path::new(path)) {
            eprintln!("ERROR: Failed to load audio profiles: {}", e);
            std::process::exit(1);
        }
    }

    let quests = Rc::new(RefCell::new(QuestLog::new()));
    if let Some(ref path) = quests_path {
        if let Err(e) = quests.borrow_mut().load_from_ron(Path::new(path)) {
            eprintln!("ERROR: Failed to load quests: {}", e);
            std::process::exit(1);
        }
    }

    let variables = Rc::new(RefCell::new(match variables_path {
        Some(ref path) if Path::new(path).exists() => {
            DialogueVariables::load_from_ron(Path::new(path)).unwrap_or_else(|e| {
                eprintln!("ERROR: Failed to load variables: {}", e);
                std::process::exit(1);
            })
        }
        _ => DialogueVariables::new(),
    }));

    let selector = BlipSelector::from_config(&config);
    let builder = DialogueSession::builder()
        .config(config)
        .audio_profiles(profiles)
        .quest_bridge(Rc::clone(&quests))
        .variables(Rc::clone(&variables))
        .presentation(ConsoleSink::default());
    let builder = if blips {
        builder.audio(BlipAudio::new(selector, |cue: &BlipCue| {
            println!("    ♪ {} @ {:.2}", cue.clip, cue.pitch);
        }))
    } else {
        builder
    };
    let mut session = match builder.build() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!("Loaded {} knots, start knot '{}'", graph.knots.len(), graph.start);
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "start" => {
                let entry = parts.get(1).copied();
                if let Err(e) = session.start(Arc::clone(&graph), entry) {
                    println!("ERROR: {}", e);
                }
            }
            "c" | "continue" => {
                let decision = session.continue_signal();
                println!("  ({:?})", decision);
            }
            "tick" => {
                let ms = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(40);
                session.update(Duration::from_millis(ms));
            }
            "run" => run_reveal(&mut session),
            "next" => session.highlight_next(),
            "prev" => session.highlight_previous(),
            "confirm" => match session.confirm_choice() {
                Ok(decision) => println!("  ({:?})", decision),
                Err(e) => println!("ERROR: {}", e),
            },
            "choose" => {
                let Some(index) = parts.get(1).and_then(|s| s.parse().ok()) else {
                    println!("Usage: choose <n>");
                    continue;
                };
                if let Err(e) = session.choose_choice(index) {
                    println!("ERROR: {}", e);
                }
            }
            "exit" => session.exit(),
            "frame" => println!("{:#?}", session.snapshot()),
            "vars" => {
                if session.is_active() {
                    println!("(story variables are synced back once the conversation ends)");
                }
                match variables.borrow().to_ron() {
                    Ok(text) => println!("{}", text),
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "quests" => {
                let mut quests = quests.borrow_mut();
                for event in quests.drain_events() {
                    println!("  event: {:?}", event);
                }
                if let Some(title) = session.config().default_quest.as_deref() {
                    println!("  {}: {:?}", title, quests.status(title));
                }
            }
            _ => println!("Unknown command: '{}'. Type 'help' for commands.", cmd),
        }
    }

    if let Some(ref path) = variables_path {
        if let Err(e) = variables.borrow().save(Path::new(path)) {
            eprintln!("ERROR: Failed to save variables: {}", e);
        }
    }
}

/// Step virtual time until the current line stops revealing, then let any
/// exit delay run out.
fn run_reveal(session: &mut DialogueSession) {
    let step = Duration::from_millis(10);
    for _ in 0..100_000 {
        match session.phase() {
            DialoguePhase::Revealing | DialoguePhase::Exiting => session.update(step),
            _ => return,
        }
    }
}

fn print_usage() {
    println!(
        "Usage: preview --story <path> [--audio <path>] [--quests <path>] [--config <path>] \
         [--variables <path>] [--blips]"
    );
}

fn print_help() {
    println!("Commands:");
    println!("  start [knot]   Start a conversation");
    println!("  c              Continue / skip the current reveal");
    println!("  tick <ms>      Advance virtual time");
    println!("  run            Advance time until the line is fully shown");
    println!("  next | prev    Move the choice highlight");
    println!("  confirm        Confirm the highlighted choice");
    println!("  choose <n>     Pick choice n");
    println!("  exit           End the conversation");
    println!("  frame          Print the current frame");
    println!("  vars           Print saved variables");
    println!("  quests         Print quest events and status");
    println!("  help           Show this help");
    println!("  quit           Leave the shell");
}
