/// The dialogue session — drives a story cursor through reveal, input and
/// choice handling, and turns tags into side effects.
///
/// All three event sources (timer ticks via `update`, input via the signal
/// methods, and `start` / `exit`) take `&mut self`, so they are serialized by
/// construction.
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::bridge::{
    AudioCollaborator, Detached, DialogueFrame, MovementLock, PresentationSink, QuestBridge,
    VariableObserver,
};
use crate::core::config::{seconds, ConfigError, DialogueConfig, StartOptions};
use crate::core::cursor::{Choice, CursorError, ScriptedCursor, StoryCursor};
use crate::core::input::{InputDecision, InputGate, InputSignal};
use crate::core::scheduler::{Scheduler, TimerHandle};
use crate::core::tags::{DirectiveTarget, DispatchReport, TagDirective, TagDispatcher};
use crate::core::typewriter::{RevealListener, TypewriterController};
use crate::schema::audio::{AudioProfile, AudioProfileRegistry};
use crate::schema::story::{StoryGraph, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DialoguePhase {
    Idle,
    Advancing,
    Revealing,
    AwaitingInput,
    AwaitingChoice,
    Exiting,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error("choice index {index} is out of range ({available} available)")]
    InvalidChoiceIndex { index: usize, available: usize },
    #[error("no choice is pending (phase {0:?})")]
    NotAwaitingChoice(DialoguePhase),
}

/// Applies directives to the session's speaker, audio profile and quests.
struct Effects<'a> {
    speaker: &'a mut String,
    active_profile: &'a mut String,
    profiles: &'a AudioProfileRegistry,
    quests: &'a mut dyn QuestBridge,
}

impl DirectiveTarget for Effects<'_> {
    fn apply(&mut self, directive: &TagDirective) {
        match directive {
            TagDirective::Speaker(name) => *self.speaker = name.clone(),
            TagDirective::Audio(id) => {
                if self.profiles.get(id).is_some() {
                    *self.active_profile = id.clone();
                } else {
                    tracing::warn!(profile = %id, "failed to find audio profile");
                }
            }
            TagDirective::StartQuest(quest) => {
                if let Err(err) = self.quests.start_quest(quest) {
                    tracing::warn!(quest = %quest, error = %err, "quest bridge failed to start quest");
                }
            }
            TagDirective::CompleteQuest(quest) => {
                if let Err(err) = self.quests.complete_quest(quest) {
                    tracing::warn!(quest = %quest, error = %err, "quest bridge failed to complete quest");
                }
            }
        }
    }
}

/// Forwards revealed units to audio and remembers whether the reveal ended.
struct RevealHooks<'a> {
    audio: &'a mut dyn AudioCollaborator,
    profile: &'a AudioProfile,
    units: usize,
    completed: Option<u64>,
}

impl RevealListener for RevealHooks<'_> {
    fn unit_revealed(&mut self, index: usize, unit: char) {
        self.units += 1;
        self.audio.unit_revealed(index, unit, self.profile);
    }

    fn reveal_complete(&mut self, generation: u64) {
        self.completed = Some(generation);
    }
}

pub struct DialogueSession {
    config: DialogueConfig,
    phase: DialoguePhase,
    /// Bumped on every start; stale exit timers carry an older value.
    generation: u64,
    cursor: Option<Box<dyn StoryCursor>>,
    typewriter: TypewriterController,
    gate: InputGate,
    dispatcher: TagDispatcher,
    exit_timer: Scheduler<u64>,
    exit_handle: Option<TimerHandle>,
    typing_delay: Duration,
    speaker: String,
    audio_profiles: AudioProfileRegistry,
    active_profile: String,
    pending_choices: Vec<Choice>,
    highlighted: Option<usize>,
    quests: Box<dyn QuestBridge>,
    presentation: Box<dyn PresentationSink>,
    audio: Box<dyn AudioCollaborator>,
    movement: Box<dyn MovementLock>,
    variables: Box<dyn VariableObserver>,
}

/// Builder for constructing a `DialogueSession`.
pub struct DialogueSessionBuilder {
    config: DialogueConfig,
    audio_profiles: AudioProfileRegistry,
    quests: Option<Box<dyn QuestBridge>>,
    presentation: Option<Box<dyn PresentationSink>>,
    audio: Option<Box<dyn AudioCollaborator>>,
    movement: Option<Box<dyn MovementLock>>,
    variables: Option<Box<dyn VariableObserver>>,
}

impl DialogueSessionBuilder {
    pub fn config(mut self, config: DialogueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn audio_profiles(mut self, profiles: AudioProfileRegistry) -> Self {
        self.audio_profiles = profiles;
        self
    }

    pub fn quest_bridge(mut self, bridge: impl QuestBridge + 'static) -> Self {
        self.quests = Some(Box::new(bridge));
        self
    }

    pub fn presentation(mut self, sink: impl PresentationSink + 'static) -> Self {
        self.presentation = Some(Box::new(sink));
        self
    }

    pub fn audio(mut self, audio: impl AudioCollaborator + 'static) -> Self {
        self.audio = Some(Box::new(audio));
        self
    }

    pub fn movement(mut self, movement: impl MovementLock + 'static) -> Self {
        self.movement = Some(Box::new(movement));
        self
    }

    pub fn variables(mut self, variables: impl VariableObserver + 'static) -> Self {
        self.variables = Some(Box::new(variables));
        self
    }

    pub fn build(self) -> Result<DialogueSession, ConfigError> {
        self.config.validate()?;
        let mut dispatcher = TagDispatcher::new();
        dispatcher.set_current_quest(self.config.default_quest.clone());

        Ok(DialogueSession {
            phase: DialoguePhase::Idle,
            generation: 0,
            cursor: None,
            typewriter: TypewriterController::new(),
            gate: InputGate::new(self.config.debounce()),
            dispatcher,
            exit_timer: Scheduler::new(),
            exit_handle: None,
            typing_delay: self.config.typing_delay(),
            speaker: self.config.speaker_sentinel.clone(),
            active_profile: self.audio_profiles.default_id().to_string(),
            audio_profiles: self.audio_profiles,
            pending_choices: Vec::new(),
            highlighted: None,
            quests: self.quests.unwrap_or_else(|| Box::new(Detached)),
            presentation: self.presentation.unwrap_or_else(|| Box::new(Detached)),
            audio: self.audio.unwrap_or_else(|| Box::new(Detached)),
            movement: self.movement.unwrap_or_else(|| Box::new(Detached)),
            variables: self.variables.unwrap_or_else(|| Box::new(Detached)),
            config: self.config,
        })
    }
}

impl DialogueSession {
    pub fn builder() -> DialogueSessionBuilder {
        DialogueSessionBuilder {
            config: DialogueConfig::default(),
            audio_profiles: AudioProfileRegistry::default(),
            quests: None,
            presentation: None,
            audio: None,
            movement: None,
            variables: None,
        }
    }

    pub fn phase(&self) -> DialoguePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != DialoguePhase::Idle
    }

    pub fn config(&self) -> &DialogueConfig {
        &self.config
    }

    pub fn speaker_name(&self) -> &str {
        &self.speaker
    }

    pub fn active_audio_profile(&self) -> &AudioProfile {
        self.audio_profiles
            .get(&self.active_profile)
            .unwrap_or_else(|| self.audio_profiles.default_profile())
    }

    pub fn pending_choices(&self) -> &[Choice] {
        &self.pending_choices
    }

    pub fn highlighted_choice(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn revealed_text(&self) -> String {
        self.typewriter.revealed_text()
    }

    /// Virtual time accumulated through `update`.
    pub fn now(&self) -> Duration {
        self.exit_timer.now()
    }

    /// Read a story variable from the running conversation.
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.cursor.as_ref().and_then(|c| c.variable(name))
    }

    /// The frame the presentation layer would currently show.
    pub fn snapshot(&self) -> DialogueFrame {
        let reveal = self.typewriter.state();
        DialogueFrame {
            panel_visible: self.phase != DialoguePhase::Idle,
            speaker_name: self.speaker.clone(),
            revealed_text: self.typewriter.revealed_text(),
            is_reveal_complete: reveal.is_some_and(|r| !r.is_active()),
            visible_choices: if self.phase == DialoguePhase::AwaitingChoice {
                self.pending_choices.iter().map(|c| c.text.clone()).collect()
            } else {
                Vec::new()
            },
            highlighted_choice: self.highlighted,
            phase: self.phase,
        }
    }

    /// Start playing `graph` from `entry`, or its start knot. An unknown
    /// entry fails before anything about the current session changes.
    pub fn start(&mut self, graph: Arc<StoryGraph>, entry: Option<&str>) -> Result<(), SessionError> {
        let cursor = ScriptedCursor::at_label(graph, entry)?;
        self.begin(Box::new(cursor), StartOptions::default());
        Ok(())
    }

    /// Start with explicit per-conversation overrides.
    pub fn start_with(
        &mut self,
        graph: Arc<StoryGraph>,
        options: StartOptions,
    ) -> Result<(), SessionError> {
        let cursor = ScriptedCursor::at_label(graph, options.entry.as_deref())?;
        self.begin(Box::new(cursor), options);
        Ok(())
    }

    /// Start on any cursor implementation.
    pub fn start_cursor(
        &mut self,
        mut cursor: Box<dyn StoryCursor>,
        options: StartOptions,
    ) -> Result<(), SessionError> {
        if let Some(entry) = options.entry.as_deref() {
            cursor.jump_to(entry)?;
        }
        self.begin(cursor, options);
        Ok(())
    }

    /// End the conversation early. The usual grace delay still applies.
    pub fn exit(&mut self) {
        match self.phase {
            DialoguePhase::Idle | DialoguePhase::Exiting => {}
            _ => {
                self.typewriter.cancel();
                self.begin_exit();
            }
        }
    }

    /// Move virtual time forward, firing reveal ticks and the exit delay.
    pub fn update(&mut self, delta: Duration) {
        let mut hooks = RevealHooks {
            audio: self.audio.as_mut(),
            profile: self
                .audio_profiles
                .get(&self.active_profile)
                .unwrap_or_else(|| self.audio_profiles.default_profile()),
            units: 0,
            completed: None,
        };
        self.typewriter.advance(delta, &mut hooks);
        let (units, completed) = (hooks.units, hooks.completed);

        if let Some(generation) = completed {
            self.on_reveal_complete(generation);
        } else if units > 0 {
            self.present();
        }

        let until = self.exit_timer.now() + delta;
        while let Some(fired) = self.exit_timer.pop_due(until) {
            self.finish_exit(fired.payload);
        }
        self.exit_timer.settle_at(until);
    }

    /// The continue / skip button.
    pub fn continue_signal(&mut self) -> InputDecision {
        let decision = self
            .gate
            .on_signal(self.now(), self.phase, InputSignal::Continue, self.highlighted);
        self.apply_decision(decision);
        decision
    }

    /// Confirm the highlighted choice.
    pub fn confirm_choice(&mut self) -> Result<InputDecision, SessionError> {
        let decision = self.gate.on_signal(
            self.now(),
            self.phase,
            InputSignal::ConfirmChoice,
            self.highlighted,
        );
        if let InputDecision::SelectChoice(index) = decision {
            self.choose_choice(index)?;
        }
        Ok(decision)
    }

    pub fn highlight(&mut self, index: usize) -> bool {
        if self.phase != DialoguePhase::AwaitingChoice || index >= self.pending_choices.len() {
            return false;
        }
        self.highlighted = Some(index);
        self.present();
        true
    }

    pub fn highlight_next(&mut self) {
        self.step_highlight(1);
    }

    pub fn highlight_previous(&mut self) {
        let len = self.pending_choices.len();
        if len > 0 {
            self.step_highlight(len - 1);
        }
    }

    fn step_highlight(&mut self, step: usize) {
        let len = self.pending_choices.len();
        if self.phase != DialoguePhase::AwaitingChoice || len == 0 {
            return;
        }
        let current = self.highlighted.unwrap_or(0);
        self.highlighted = Some((current + step) % len);
        self.present();
    }

    /// Resolve the pending decision. Fails without side effects when nothing
    /// is pending or the index is out of range.
    pub fn choose_choice(&mut self, index: usize) -> Result<(), SessionError> {
        if self.phase != DialoguePhase::AwaitingChoice {
            tracing::warn!(phase = ?self.phase, index, "choice made with no choice pending");
            return Err(SessionError::NotAwaitingChoice(self.phase));
        }
        let available = self.pending_choices.len();
        if index >= available {
            tracing::warn!(index, available, "rejected out-of-range choice");
            return Err(SessionError::InvalidChoiceIndex { index, available });
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Err(SessionError::NotAwaitingChoice(self.phase));
        };

        if let Err(err) = cursor.choose(index) {
            tracing::warn!(index, error = %err, "story rejected the choice");
            return Err(err.into());
        }

        // Choice tags take effect only once the story has accepted the choice.
        let choice = self.pending_choices[index].clone();
        tracing::info!(index, text = %choice.text, "choice made");
        let mut effects = Effects {
            speaker: &mut self.speaker,
            active_profile: &mut self.active_profile,
            profiles: &self.audio_profiles,
            quests: self.quests.as_mut(),
        };
        self.dispatcher.dispatch(&choice.tags, &mut effects);

        self.pending_choices.clear();
        self.highlighted = None;
        self.set_phase(DialoguePhase::Advancing);
        self.advance_story();
        Ok(())
    }

    fn apply_decision(&mut self, decision: InputDecision) {
        match decision {
            InputDecision::SkipReveal => {
                let mut hooks = RevealHooks {
                    audio: self.audio.as_mut(),
                    profile: self
                        .audio_profiles
                        .get(&self.active_profile)
                        .unwrap_or_else(|| self.audio_profiles.default_profile()),
                    units: 0,
                    completed: None,
                };
                self.typewriter.skip(&mut hooks);
                if let Some(generation) = hooks.completed {
                    self.on_reveal_complete(generation);
                }
            }
            InputDecision::AdvanceStory => {
                self.set_phase(DialoguePhase::Advancing);
                self.advance_story();
            }
            InputDecision::SelectChoice(index) => {
                if let Err(err) = self.choose_choice(index) {
                    tracing::warn!(error = %err, "choice selection failed");
                }
            }
            InputDecision::Ignore => {
                tracing::trace!(phase = ?self.phase, "input ignored");
            }
        }
    }

    fn begin(&mut self, mut cursor: Box<dyn StoryCursor>, options: StartOptions) {
        if self.phase != DialoguePhase::Idle {
            tracing::info!(phase = ?self.phase, "restarting an active dialogue");
            self.release();
        }

        self.generation += 1;
        self.speaker = self.config.speaker_sentinel.clone();
        self.active_profile = self.audio_profiles.default_id().to_string();
        if let Some(id) = options.audio_profile.as_deref() {
            if self.audio_profiles.get(id).is_some() {
                self.active_profile = id.to_string();
            } else {
                tracing::warn!(profile = %id, "failed to find audio profile");
            }
        }
        self.typing_delay = match options.typing_speed.map(|secs| (secs, seconds(secs))) {
            Some((_, Some(delay))) => delay,
            Some((secs, None)) => {
                tracing::warn!(typing_speed = secs, "ignoring unusable typing speed override");
                self.config.typing_delay()
            }
            None => self.config.typing_delay(),
        };
        self.dispatcher
            .set_current_quest(options.quest.or_else(|| self.config.default_quest.clone()));
        self.pending_choices.clear();
        self.highlighted = None;
        self.gate.reset();

        self.movement.lock_movement();
        self.variables.start_listening(cursor.as_mut());
        self.cursor = Some(cursor);

        tracing::info!(generation = self.generation, "dialogue started");
        self.set_phase(DialoguePhase::Advancing);
        self.advance_story();
    }

    /// The `Advancing` step: pull the next line, or settle on choices, or
    /// begin exiting.
    fn advance_story(&mut self) {
        let Some(cursor) = self.cursor.as_mut() else {
            self.begin_exit();
            return;
        };

        if !cursor.can_advance() {
            let choices = cursor.current_choices();
            if choices.is_empty() {
                self.begin_exit();
            } else {
                self.await_choice(choices);
            }
            return;
        }

        let line = match cursor.advance() {
            Ok(line) => line,
            Err(err) => {
                tracing::debug!(error = %err, "story exhausted while advancing");
                self.begin_exit();
                return;
            }
        };
        let pending = if self.config.present_choices_with_line && !cursor.can_advance() {
            cursor.current_choices()
        } else {
            Vec::new()
        };

        let mut effects = Effects {
            speaker: &mut self.speaker,
            active_profile: &mut self.active_profile,
            profiles: &self.audio_profiles,
            quests: self.quests.as_mut(),
        };
        let report: DispatchReport = self.dispatcher.dispatch(&line.tags, &mut effects);
        if !report.diagnostics.is_empty() {
            tracing::debug!(count = report.diagnostics.len(), line = %line.text, "line carried bad tags");
        }

        self.pending_choices = pending;
        self.highlighted = None;
        self.set_phase(DialoguePhase::Revealing);

        let mut hooks = RevealHooks {
            audio: self.audio.as_mut(),
            profile: self
                .audio_profiles
                .get(&self.active_profile)
                .unwrap_or_else(|| self.audio_profiles.default_profile()),
            units: 0,
            completed: None,
        };
        self.typewriter.reveal(&line.text, self.typing_delay, &mut hooks);
        match hooks.completed {
            Some(generation) => self.on_reveal_complete(generation),
            None => self.present(),
        }
    }

    fn on_reveal_complete(&mut self, generation: u64) {
        if generation != self.typewriter.generation() || self.phase != DialoguePhase::Revealing {
            tracing::debug!(generation, phase = ?self.phase, "ignoring stale reveal completion");
            return;
        }
        if self.pending_choices.is_empty() {
            self.set_phase(DialoguePhase::AwaitingInput);
            self.present();
        } else {
            let choices = std::mem::take(&mut self.pending_choices);
            self.await_choice(choices);
        }
    }

    fn await_choice(&mut self, choices: Vec<Choice>) {
        if choices.len() > self.config.choice_capacity {
            tracing::error!(
                given = choices.len(),
                capacity = self.config.choice_capacity,
                "more choices were given than the presentation can show"
            );
        }
        self.pending_choices = choices;
        self.highlighted = Some(0);
        self.set_phase(DialoguePhase::AwaitingChoice);
        self.present();
    }

    fn begin_exit(&mut self) {
        self.set_phase(DialoguePhase::Exiting);
        self.pending_choices.clear();
        self.highlighted = None;
        if let Some(handle) = self.exit_handle.take() {
            self.exit_timer.cancel(handle);
        }
        self.exit_handle = Some(
            self.exit_timer
                .schedule(self.config.exit_delay(), self.generation),
        );
        self.present();
    }

    fn finish_exit(&mut self, generation: u64) {
        if generation != self.generation || self.phase != DialoguePhase::Exiting {
            tracing::debug!(generation, current = self.generation, "dropping stale exit timer");
            return;
        }
        self.exit_handle = None;
        self.release();
        self.set_phase(DialoguePhase::Idle);
        tracing::info!(generation, "dialogue finished");
        self.present();
    }

    /// Tear down everything tied to the current conversation.
    fn release(&mut self) {
        self.typewriter.cancel();
        if let Some(handle) = self.exit_handle.take() {
            self.exit_timer.cancel(handle);
        }
        if let Some(cursor) = self.cursor.take() {
            self.variables.stop_listening(cursor.as_ref());
        }
        self.movement.unlock_movement();
        self.speaker = self.config.speaker_sentinel.clone();
        self.active_profile = self.audio_profiles.default_id().to_string();
        self.pending_choices.clear();
        self.highlighted = None;
    }

    fn set_phase(&mut self, phase: DialoguePhase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "phase transition");
            self.phase = phase;
        }
    }

    fn present(&mut self) {
        let frame = self.snapshot();
        self.presentation.present(&frame);
    }
}
