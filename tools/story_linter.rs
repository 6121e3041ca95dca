/// Story Linter — validates story graphs and the tags they carry.
///
/// Usage: story_linter <story_file_or_dir> [--audio <file>] [--quests <file>]
///                     [--default-quest <title>] [--capacity <n>]
///
/// Set RUST_LOG=dialogue_engine=debug to see what the loaders are doing.

use dialogue_engine::core::tags::{TagDirective, TagDispatcher};
use dialogue_engine::schema::audio::AudioProfileRegistry;
use dialogue_engine::schema::quest::QuestLog;
use dialogue_engine::schema::story::{StoryError, StoryGraph, StoryNode};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

struct LintOptions {
    audio: Option<AudioProfileRegistry>,
    quests: Option<QuestLog>,
    default_quest: Option<String>,
    capacity: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!(
            "Usage: story_linter <story_file_or_dir> [--audio <file>] [--quests <file>] \
             [--default-quest <title>] [--capacity <n>]"
        );
        process::exit(0);
    }

    let story_path = Path::new(&args[1]);
    let mut options = LintOptions {
        audio: None,
        quests: None,
        default_quest: None,
        capacity: 4,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--audio" if i + 1 < args.len() => {
                i += 1;
                let mut registry = AudioProfileRegistry::default();
                if let Err(e) = registry.load_from_ron(Path::new(&args[i])) {
                    eprintln!("ERROR: Failed to load audio profiles: {}", e);
                    process::exit(1);
                }
                options.audio = Some(registry);
            }
            "--quests" if i + 1 < args.len() => {
                i += 1;
                let mut quests = QuestLog::new();
                if let Err(e) = quests.load_from_ron(Path::new(&args[i])) {
                    eprintln!("ERROR: Failed to load quests: {}", e);
                    process::exit(1);
                }
                options.quests = Some(quests);
            }
            "--default-quest" if i + 1 < args.len() => {
                i += 1;
                options.default_quest = Some(args[i].clone());
            }
            "--capacity" if i + 1 < args.len() => {
                i += 1;
                options.capacity = args[i].parse().unwrap_or(4);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let files = if story_path.is_file() {
        vec![story_path.to_path_buf()]
    } else if story_path.is_dir() {
        let mut files = Vec::new();
        collect_ron_files(story_path, &mut files);
        files
    } else {
        eprintln!("ERROR: Path '{}' does not exist", story_path.display());
        process::exit(1);
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for file in &files {
        let graph = match StoryGraph::load_from_ron(file) {
            Ok(graph) => {
                println!("  Loaded: {} ({} knots)", file.display(), graph.knots.len());
                graph
            }
            Err(e) => {
                errors.push(format!("{}: {}", file.display(), e));
                continue;
            }
        };
        let (file_errors, file_warnings) = lint_story(&graph, &options);
        errors.extend(file_errors.into_iter().map(|e| format!("{}: {}", file.display(), e)));
        warnings.extend(file_warnings.into_iter().map(|w| format!("{}: {}", file.display(), w)));
    }

    println!("\n=== Story Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} files, {} errors, {} warnings",
        files.len(),
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn collect_ron_files(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_ron_files(&path, files);
            } else if path.file_name().and_then(|s| s.to_str()) == Some("story.ron") {
                files.push(path);
            }
        }
    }
    files.sort();
}

fn lint_story(graph: &StoryGraph, options: &LintOptions) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // 1. Structural problems
    match graph.validate() {
        Ok(()) => {}
        Err(StoryError::Validation(problems)) => errors.extend(problems),
        Err(e) => errors.push(e.to_string()),
    }

    // 2. Tags must parse, and must name things that exist
    let mut dispatcher = TagDispatcher::new();
    dispatcher.set_current_quest(options.default_quest.clone());

    for (knot, raw) in graph.all_tags() {
        match dispatcher.parse(raw) {
            Ok(TagDirective::Audio(id)) => {
                if let Some(registry) = &options.audio {
                    if registry.get(&id).is_none() {
                        errors.push(format!("knot '{}': tag '{}' names unknown audio profile", knot, raw));
                    }
                }
            }
            Ok(TagDirective::StartQuest(title)) | Ok(TagDirective::CompleteQuest(title)) => {
                if let Some(quests) = &options.quests {
                    if quests.get(&title).is_none() {
                        errors.push(format!("knot '{}': tag '{}' names unknown quest", knot, raw));
                    }
                }
            }
            Ok(TagDirective::Speaker(_)) => {}
            Err(diagnostic) => warnings.push(format!("knot '{}': {}", knot, diagnostic)),
        }
    }

    // 3. Choice blocks the presentation cannot show in full
    let mut labels: Vec<&String> = graph.knots.keys().collect();
    labels.sort();
    for label in &labels {
        for node in &graph.knots[*label].nodes {
            if let StoryNode::Choices(options_in_block) = node {
                if options_in_block.len() > options.capacity {
                    warnings.push(format!(
                        "knot '{}': {} choices but only {} can be shown",
                        label,
                        options_in_block.len(),
                        options.capacity
                    ));
                }
            }
        }
    }

    // 4. Knots nothing diverts to
    let mut reachable: BTreeSet<&str> = BTreeSet::new();
    reachable.insert(graph.start.as_str());
    for knot in graph.knots.values() {
        for node in &knot.nodes {
            match node {
                StoryNode::Divert(target) => {
                    reachable.insert(target.as_str());
                }
                StoryNode::Choices(choices) => {
                    reachable.extend(choices.iter().filter_map(|c| c.divert.as_deref()));
                }
                _ => {}
            }
        }
    }
    for label in labels {
        if !reachable.contains(label.as_str()) {
            warnings.push(format!(
                "knot '{}' is never diverted to (fine if it is an entry point)",
                label
            ));
        }
    }

    (errors, warnings)
}
