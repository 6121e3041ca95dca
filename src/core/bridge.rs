/// Collaborator contracts — everything a dialogue session talks to but does
/// not own.
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

use crate::core::cursor::StoryCursor;
use crate::core::session::DialoguePhase;
use crate::schema::audio::AudioProfile;
use crate::schema::quest::QuestError;

/// What the presentation layer needs to draw the dialogue box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogueFrame {
    pub panel_visible: bool,
    pub speaker_name: String,
    pub revealed_text: String,
    pub is_reveal_complete: bool,
    pub visible_choices: Vec<String>,
    pub highlighted_choice: Option<usize>,
    pub phase: DialoguePhase,
}

/// Receives a frame on every transition and every reveal tick. Never touched
/// by diagnostics.
pub trait PresentationSink {
    fn present(&mut self, frame: &DialogueFrame);
}

/// Plays typing blips. The session only decides when a unit was revealed
/// and which profile is active.
pub trait AudioCollaborator {
    fn unit_revealed(&mut self, index: usize, unit: char, profile: &AudioProfile);
}

/// External quest state, addressed by quest identifier. Called synchronously
/// from tag dispatch; failures are logged by the caller and otherwise
/// ignored.
pub trait QuestBridge {
    fn start_quest(&mut self, identifier: &str) -> Result<(), QuestError>;
    fn complete_quest(&mut self, identifier: &str) -> Result<(), QuestError>;
}

/// Player movement is frozen for the lifetime of a session.
pub trait MovementLock {
    fn lock_movement(&mut self);
    fn unlock_movement(&mut self);
}

/// Persisted narrative variables. Notified before the first advance and
/// after the session has fully exited.
pub trait VariableObserver {
    fn start_listening(&mut self, cursor: &mut dyn StoryCursor);
    fn stop_listening(&mut self, cursor: &dyn StoryCursor);
}

/// A collaborator that does nothing. Stands in for every role a host has
/// not wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl PresentationSink for Detached {
    fn present(&mut self, _frame: &DialogueFrame) {}
}

impl AudioCollaborator for Detached {
    fn unit_revealed(&mut self, _index: usize, _unit: char, _profile: &AudioProfile) {}
}

impl QuestBridge for Detached {
    fn start_quest(&mut self, identifier: &str) -> Result<(), QuestError> {
        Err(QuestError::Rejected(format!(
            "no quest bridge attached (start '{identifier}')"
        )))
    }

    fn complete_quest(&mut self, identifier: &str) -> Result<(), QuestError> {
        Err(QuestError::Rejected(format!(
            "no quest bridge attached (complete '{identifier}')"
        )))
    }
}

impl MovementLock for Detached {
    fn lock_movement(&mut self) {}
    fn unlock_movement(&mut self) {}
}

impl VariableObserver for Detached {
    fn start_listening(&mut self, _cursor: &mut dyn StoryCursor) {}
    fn stop_listening(&mut self, _cursor: &dyn StoryCursor) {}
}

// Shared handles, so a host can keep reading a collaborator it lent out.

impl<T: PresentationSink> PresentationSink for Rc<RefCell<T>> {
    fn present(&mut self, frame: &DialogueFrame) {
        self.borrow_mut().present(frame);
    }
}

impl<T: AudioCollaborator> AudioCollaborator for Rc<RefCell<T>> {
    fn unit_revealed(&mut self, index: usize, unit: char, profile: &AudioProfile) {
        self.borrow_mut().unit_revealed(index, unit, profile);
    }
}

impl<T: QuestBridge> QuestBridge for Rc<RefCell<T>> {
    fn start_quest(&mut self, identifier: &str) -> Result<(), QuestError> {
        self.borrow_mut().start_quest(identifier)
    }

    fn complete_quest(&mut self, identifier: &str) -> Result<(), QuestError> {
        self.borrow_mut().complete_quest(identifier)
    }
}

impl<T: MovementLock> MovementLock for Rc<RefCell<T>> {
    fn lock_movement(&mut self) {
        self.borrow_mut().lock_movement();
    }

    fn unlock_movement(&mut self) {
        self.borrow_mut().unlock_movement();
    }
}

impl<T: VariableObserver> VariableObserver for Rc<RefCell<T>> {
    fn start_listening(&mut self, cursor: &mut dyn StoryCursor) {
        self.borrow_mut().start_listening(cursor);
    }

    fn stop_listening(&mut self, cursor: &dyn StoryCursor) {
        self.borrow_mut().stop_listening(cursor);
    }
}
