/// Story cursor — the narrow surface a dialogue session drives a story
/// graph through, plus the cursor over compiled `StoryGraph`s.
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::schema::story::{StoryGraph, StoryNode, Value};

/// Diverts and assignments followed in one settle before the cursor gives up
/// on a story that loops without producing content.
const MAX_SETTLE_STEPS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("story has no further content")]
    GraphExhausted,
    #[error("choice index {index} is out of range ({available} available)")]
    InvalidChoiceIndex { index: usize, available: usize },
    #[error("unknown label: {0}")]
    UnknownLabel(String),
}

/// A line produced by one advance, with the tags that belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryLine {
    pub text: String,
    pub tags: Vec<String>,
}

/// A choice as currently offered. Indices are positional and only valid
/// until the cursor next moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub index: usize,
    pub text: String,
    pub tags: Vec<String>,
}

/// Adapter over an opaque story graph.
pub trait StoryCursor {
    fn can_advance(&self) -> bool;

    /// Produce the next line and its tags in one step.
    fn advance(&mut self) -> Result<StoryLine, CursorError>;

    /// Choices at the cursor's current position. Empty unless the cursor is
    /// stopped at a branching point.
    fn current_choices(&self) -> Vec<Choice>;

    fn choose(&mut self, index: usize) -> Result<(), CursorError>;

    /// Move to a named entry point. Leaves the cursor untouched on failure.
    /// Assignments at the entry run when the cursor first advances past them,
    /// so variables pushed in after the jump are seen by the story.
    fn jump_to(&mut self, label: &str) -> Result<(), CursorError>;

    fn variable(&self, name: &str) -> Option<Value>;
    fn set_variable(&mut self, name: &str, value: Value);
    fn variables(&self) -> Vec<(String, Value)>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Position {
    knot: String,
    index: usize,
}

/// Plays a compiled `StoryGraph`. The graph is shared; all mutable playback
/// state lives in the cursor.
#[derive(Debug, Clone)]
pub struct ScriptedCursor {
    graph: Arc<StoryGraph>,
    position: Option<Position>,
    variables: FxHashMap<String, Value>,
}

impl ScriptedCursor {
    /// Cursor positioned at the graph's start knot. Nothing runs until the
    /// first `advance` or `choose`.
    pub fn new(graph: Arc<StoryGraph>) -> Self {
        if !graph.has_label(&graph.start) {
            tracing::warn!(start = %graph.start, "story start knot does not exist");
        }
        let start = graph.start.clone();
        Self::positioned(graph, &start)
    }

    /// Cursor positioned at `label`, or the start knot when `label` is `None`.
    pub fn at_label(graph: Arc<StoryGraph>, label: Option<&str>) -> Result<Self, CursorError> {
        match label {
            Some(label) if !graph.has_label(label) => {
                Err(CursorError::UnknownLabel(label.to_string()))
            }
            Some(label) => Ok(Self::positioned(graph, label)),
            None => Ok(Self::new(graph)),
        }
    }

    fn positioned(graph: Arc<StoryGraph>, label: &str) -> Self {
        let variables = graph.variables.clone();
        let position = graph.has_label(label).then(|| Position {
            knot: label.to_string(),
            index: 0,
        });
        Self {
            graph,
            position,
            variables,
        }
    }

    pub fn graph(&self) -> &Arc<StoryGraph> {
        &self.graph
    }

    /// `true` once the story has ended.
    pub fn is_finished(&self) -> bool {
        self.resting().is_none()
    }

    fn node_at(&self, position: &Position) -> Option<&StoryNode> {
        self.graph.knot(&position.knot)?.nodes.get(position.index)
    }

    /// The line or choice block the cursor would stop on, without applying
    /// any assignment on the way.
    fn resting(&self) -> Option<Position> {
        let mut position = self.position.clone()?;
        for _ in 0..MAX_SETTLE_STEPS {
            match self.node_at(&position)? {
                StoryNode::Line { .. } | StoryNode::Choices(_) => return Some(position),
                StoryNode::Set { .. } => position.index += 1,
                StoryNode::Divert(target) if self.graph.has_label(target) => {
                    position = Position {
                        knot: target.clone(),
                        index: 0,
                    };
                }
                StoryNode::Divert(_) | StoryNode::End => return None,
            }
        }
        None
    }

    fn current_node(&self) -> Option<&StoryNode> {
        let position = self.resting()?;
        self.node_at(&position)
    }

    fn divert(&mut self, target: &str) {
        if self.graph.has_label(target) {
            self.position = Some(Position {
                knot: target.to_string(),
                index: 0,
            });
        } else {
            tracing::warn!(target = %target, "divert to unknown knot ends the story");
            self.position = None;
        }
    }

    /// Follow diverts and assignments until the cursor rests on a line, a
    /// choice block, or the end of the story.
    fn settle(&mut self) {
        let graph = Arc::clone(&self.graph);
        for _ in 0..MAX_SETTLE_STEPS {
            let Some(position) = self.position.as_mut() else {
                return;
            };
            let node = graph
                .knot(&position.knot)
                .and_then(|knot| knot.nodes.get(position.index));
            match node {
                Some(StoryNode::Line { .. }) | Some(StoryNode::Choices(_)) => return,
                Some(StoryNode::Set { name, value }) => {
                    self.variables.insert(name.clone(), value.clone());
                    position.index += 1;
                }
                Some(StoryNode::Divert(target)) => self.divert(target),
                Some(StoryNode::End) | None => self.position = None,
            }
        }
        tracing::warn!("story loops through diverts without content; ending it");
        self.position = None;
    }

    fn step_past_current(&mut self) {
        if let Some(position) = self.position.as_mut() {
            position.index += 1;
        }
    }
}

impl StoryCursor for ScriptedCursor {
    fn can_advance(&self) -> bool {
        matches!(self.current_node(), Some(StoryNode::Line { .. }))
    }

    fn advance(&mut self) -> Result<StoryLine, CursorError> {
        let line = match self.current_node() {
            Some(StoryNode::Line { text, tags }) => StoryLine {
                text: text.clone(),
                tags: tags.clone(),
            },
            _ => return Err(CursorError::GraphExhausted),
        };
        self.settle();
        self.step_past_current();
        self.settle();
        Ok(line)
    }

    fn current_choices(&self) -> Vec<Choice> {
        match self.current_node() {
            Some(StoryNode::Choices(options)) => options
                .iter()
                .enumerate()
                .map(|(index, option)| Choice {
                    index,
                    text: option.text.clone(),
                    tags: option.tags.clone(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn choose(&mut self, index: usize) -> Result<(), CursorError> {
        let divert = match self.current_node() {
            Some(StoryNode::Choices(options)) if index < options.len() => {
                options[index].divert.clone()
            }
            Some(StoryNode::Choices(options)) => {
                return Err(CursorError::InvalidChoiceIndex {
                    index,
                    available: options.len(),
                })
            }
            _ => {
                return Err(CursorError::InvalidChoiceIndex {
                    index,
                    available: 0,
                })
            }
        };
        self.settle();
        match divert {
            Some(target) => self.divert(&target),
            None => self.step_past_current(),
        }
        self.settle();
        Ok(())
    }

    /// Assignments at the head of `label` run on the next `advance`, not here.
    fn jump_to(&mut self, label: &str) -> Result<(), CursorError> {
        if !self.graph.has_label(label) {
            return Err(CursorError::UnknownLabel(label.to_string()));
        }
        self.position = Some(Position {
            knot: label.to_string(),
            index: 0,
        });
        Ok(())
    }

    fn variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    fn variables(&self) -> Vec<(String, Value)> {
        let mut out: Vec<(String, Value)> = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
