/// Global narrative variables that outlive a single conversation.
use rustc_hash::FxHashMap;
use std::path::Path;
use thiserror::Error;

use crate::core::bridge::VariableObserver;
use crate::core::cursor::StoryCursor;
use crate::schema::story::Value;

#[derive(Debug, Error)]
pub enum VariablesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    Serialize(#[from] ron::Error),
}

/// Globals are copied into the story when a session starts listening and
/// copied back out when it stops.
#[derive(Debug, Clone, Default)]
pub struct DialogueVariables {
    globals: FxHashMap<String, Value>,
    listening: bool,
}

impl DialogueVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_ron(path: &Path) -> Result<DialogueVariables, VariablesError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<DialogueVariables, VariablesError> {
        let globals: FxHashMap<String, Value> = ron::from_str(input)?;
        Ok(Self {
            globals,
            listening: false,
        })
    }

    pub fn to_ron(&self) -> Result<String, VariablesError> {
        let sorted: std::collections::BTreeMap<&String, &Value> = self.globals.iter().collect();
        Ok(ron::ser::to_string_pretty(
            &sorted,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn save(&self, path: &Path) -> Result<(), VariablesError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Look up a global, warning when it does not exist.
    pub fn variable_state(&self, name: &str) -> Option<&Value> {
        let value = self.globals.get(name);
        if value.is_none() {
            tracing::warn!(variable = %name, "narrative variable not found");
        }
        value
    }
}

impl VariableObserver for DialogueVariables {
    fn start_listening(&mut self, cursor: &mut dyn StoryCursor) {
        for (name, value) in &self.globals {
            cursor.set_variable(name, value.clone());
        }
        self.listening = true;
        tracing::debug!(count = self.globals.len(), "variables pushed into story");
    }

    fn stop_listening(&mut self, cursor: &dyn StoryCursor) {
        for (name, value) in cursor.variables() {
            self.globals.insert(name, value);
        }
        self.listening = false;
        tracing::debug!(count = self.globals.len(), "variables pulled from story");
    }
}
