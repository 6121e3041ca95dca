/// Compiled story graph — knots, lines, choice blocks, diverts, and variables.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("story failed validation: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// A dynamic value held by a narrative variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// One option inside a choice block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceSpec {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Knot to continue from once picked. `None` falls through to the node
    /// after the choice block.
    #[serde(default)]
    pub divert: Option<String>,
}

/// A single node in a knot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoryNode {
    /// A line of dialogue with its inline tags.
    Line {
        text: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    /// A branching point. The cursor stops here until a choice is made.
    Choices(Vec<ChoiceSpec>),
    /// Jump to the start of another knot.
    Divert(String),
    /// Assign a narrative variable.
    Set { name: String, value: Value },
    /// Stop the story.
    End,
}

/// A named sequence of nodes; the unit an entry label points at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Knot {
    pub nodes: Vec<StoryNode>,
}

/// A compiled, immutable story graph. Shared read-only with every cursor
/// playing it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryGraph {
    /// Knot used when a session starts without an explicit entry label.
    pub start: String,
    pub knots: FxHashMap<String, Knot>,
    /// Initial values for variables declared by the story.
    #[serde(default)]
    pub variables: FxHashMap<String, Value>,
}

impl StoryGraph {
    /// Load a story graph from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<StoryGraph, StoryError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a story graph from a RON string.
    pub fn parse_ron(input: &str) -> Result<StoryGraph, StoryError> {
        let graph: StoryGraph = ron::from_str(input)?;
        Ok(graph)
    }

    pub fn knot(&self, label: &str) -> Option<&Knot> {
        self.knots.get(label)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.knots.contains_key(label)
    }

    /// Check structural soundness: the start knot exists, every divert
    /// targets a known knot, and no choice block is empty.
    pub fn validate(&self) -> Result<(), StoryError> {
        let mut problems = Vec::new();

        if !self.has_label(&self.start) {
            problems.push(format!("start knot '{}' does not exist", self.start));
        }

        let mut labels: Vec<&String> = self.knots.keys().collect();
        labels.sort();

        for label in labels {
            let knot = &self.knots[label];
            for (i, node) in knot.nodes.iter().enumerate() {
                match node {
                    StoryNode::Divert(target) if !self.has_label(target) => {
                        problems.push(format!(
                            "{}[{}]: divert to unknown knot '{}'",
                            label, i, target
                        ));
                    }
                    StoryNode::Choices(options) => {
                        if options.is_empty() {
                            problems.push(format!("{}[{}]: empty choice block", label, i));
                        }
                        for option in options {
                            if let Some(target) = &option.divert {
                                if !self.has_label(target) {
                                    problems.push(format!(
                                        "{}[{}]: choice '{}' diverts to unknown knot '{}'",
                                        label, i, option.text, target
                                    ));
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(StoryError::Validation(problems))
        }
    }

    /// Every tag string in the graph, paired with the knot it appears in.
    pub fn all_tags(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        for (label, knot) in &self.knots {
            for node in &knot.nodes {
                match node {
                    StoryNode::Line { tags, .. } => {
                        out.extend(tags.iter().map(|t| (label.as_str(), t.as_str())));
                    }
                    StoryNode::Choices(options) => {
                        for option in options {
                            out.extend(option.tags.iter().map(|t| (label.as_str(), t.as_str())));
                        }
                    }
                    _ => {}
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_STORY: &str = r#"(
        start: "greeting",
        knots: {
            "greeting": (nodes: [
                Line(text: "Hello", tags: ["speaker: Mira"]),
                Choices([
                    (text: "Yes", divert: Some("yes")),
                    (text: "No", tags: ["complete_quest: FindKey"]),
                ]),
                End,
            ]),
            "yes": (nodes: [
                Set(name: "agreed", value: Bool(true)),
                Line(text: "Great."),
            ]),
        },
        variables: { "agreed": Bool(false) },
    )"#;

    #[test]
    fn parse_small_story() {
        let graph = StoryGraph::parse_ron(SMALL_STORY).unwrap();
        assert_eq!(graph.start, "greeting");
        assert_eq!(graph.knots.len(), 2);
        assert_eq!(graph.variables.get("agreed"), Some(&Value::Bool(false)));

        let greeting = graph.knot("greeting").unwrap();
        assert!(matches!(&greeting.nodes[0], StoryNode::Line { text, .. } if text == "Hello"));
        match &greeting.nodes[1] {
            StoryNode::Choices(options) => {
                assert_eq!(options.len(), 2);
                assert_eq!(options[0].divert.as_deref(), Some("yes"));
                assert!(options[1].divert.is_none());
            }
            other => panic!("expected choices, got {:?}", other),
        }
    }

    #[test]
    fn validate_accepts_sound_story() {
        let graph = StoryGraph::parse_ron(SMALL_STORY).unwrap();
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn validate_reports_dangling_diverts_and_empty_choices() {
        let graph = StoryGraph::parse_ron(
            r#"(
                start: "missing",
                knots: {
                    "a": (nodes: [Divert("nowhere"), Choices([])]),
                },
            )"#,
        )
        .unwrap();

        match graph.validate() {
            Err(StoryError::Validation(problems)) => {
                assert_eq!(problems.len(), 3);
                assert!(problems[0].contains("start knot"));
                assert!(problems.iter().any(|p| p.contains("nowhere")));
                assert!(problems.iter().any(|p| p.contains("empty choice block")));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn all_tags_includes_choice_tags() {
        let graph = StoryGraph::parse_ron(SMALL_STORY).unwrap();
        let tags: Vec<&str> = graph.all_tags().into_iter().map(|(_, t)| t).collect();
        assert!(tags.contains(&"speaker: Mira"));
        assert!(tags.contains(&"complete_quest: FindKey"));
    }

    #[test]
    fn value_display() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Str("key".to_string()).to_string(), "key");
        assert_eq!(Value::Bool(true).to_string(), "true");
    }
}
