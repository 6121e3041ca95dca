/// Input gate — debounces the continue signal and decides what an input
/// means in the current phase.
use std::time::Duration;

use crate::core::session::DialoguePhase;

/// A discrete input event pushed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSignal {
    /// The single "continue / skip" button.
    Continue,
    /// Confirm the highlighted choice.
    ConfirmChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDecision {
    SkipReveal,
    AdvanceStory,
    SelectChoice(usize),
    Ignore,
}

/// What `signal` means in `phase`, ignoring timing.
pub fn decide(phase: DialoguePhase, signal: InputSignal, highlighted: Option<usize>) -> InputDecision {
    match (phase, signal) {
        (DialoguePhase::Revealing, InputSignal::Continue) => InputDecision::SkipReveal,
        (DialoguePhase::AwaitingInput, InputSignal::Continue) => InputDecision::AdvanceStory,
        (DialoguePhase::AwaitingChoice, InputSignal::ConfirmChoice) => match highlighted {
            Some(index) => InputDecision::SelectChoice(index),
            None => InputDecision::Ignore,
        },
        _ => InputDecision::Ignore,
    }
}

/// Collapses rapid repeats of the continue signal. Only accepted signals
/// open a new window.
#[derive(Debug, Clone)]
pub struct InputGate {
    window: Duration,
    last_accepted: Option<Duration>,
}

impl InputGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }

    pub fn on_signal(
        &mut self,
        now: Duration,
        phase: DialoguePhase,
        signal: InputSignal,
        highlighted: Option<usize>,
    ) -> InputDecision {
        if signal == InputSignal::Continue && self.is_debounced(now) {
            tracing::trace!(?now, "continue signal debounced");
            return InputDecision::Ignore;
        }
        let decision = decide(phase, signal, highlighted);
        if signal == InputSignal::Continue && decision != InputDecision::Ignore {
            self.last_accepted = Some(now);
        }
        decision
    }

    fn is_debounced(&self, now: Duration) -> bool {
        self.last_accepted
            .is_some_and(|last| now.saturating_sub(last) <= self.window)
    }
}
