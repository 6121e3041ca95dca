/// Typewriter reveal — discloses a line one character at a time on a timer.
use std::time::Duration;

use crate::core::scheduler::{Scheduler, TimerHandle};

/// Callbacks for one reveal.
pub trait RevealListener {
    /// A unit became visible. `index` is the unit's position in the line.
    fn unit_revealed(&mut self, index: usize, unit: char);

    /// The line is fully visible. Called exactly once per `reveal`, whether
    /// the end was reached by ticking or by `skip`.
    fn reveal_complete(&mut self, generation: u64);
}

/// Progress of the line currently being revealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealState {
    units: Vec<char>,
    revealed_count: usize,
    active: bool,
}

impl RevealState {
    fn new(line: &str) -> Self {
        Self {
            units: line.chars().collect(),
            revealed_count: 0,
            active: true,
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn revealed_count(&self) -> usize {
        self.revealed_count
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn line(&self) -> String {
        self.units.iter().collect()
    }

    pub fn revealed_text(&self) -> String {
        self.units[..self.revealed_count].iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RevealTick {
    generation: u64,
}

/// Owns the reveal timer. Starting a new reveal always cancels the previous
/// one first, so at most one completion fires per `reveal` call.
#[derive(Debug, Clone, Default)]
pub struct TypewriterController {
    timers: Scheduler<RevealTick>,
    pending_tick: Option<TimerHandle>,
    state: Option<RevealState>,
    generation: u64,
    per_unit_delay: Duration,
}

impl TypewriterController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the most recent `reveal`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> Option<&RevealState> {
        self.state.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.active)
    }

    pub fn revealed_text(&self) -> String {
        self.state
            .as_ref()
            .map(RevealState::revealed_text)
            .unwrap_or_default()
    }

    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    /// Begin revealing `line`, one unit every `per_unit_delay`. An empty line
    /// completes immediately. Returns the generation of this reveal.
    pub fn reveal(
        &mut self,
        line: &str,
        per_unit_delay: Duration,
        listener: &mut dyn RevealListener,
    ) -> u64 {
        self.cancel_timer();
        self.generation += 1;
        self.per_unit_delay = per_unit_delay;
        self.state = Some(RevealState::new(line));
        tracing::debug!(generation = self.generation, units = line.chars().count(), "reveal started");

        if line.is_empty() {
            self.complete(listener);
        } else {
            self.schedule_tick();
        }
        self.generation
    }

    /// Move time forward by `delta`, revealing every unit that falls due.
    pub fn advance(&mut self, delta: Duration, listener: &mut dyn RevealListener) {
        let until = self.timers.now() + delta;
        while let Some(fired) = self.timers.pop_due(until) {
            if self.pending_tick == Some(fired.handle) {
                self.pending_tick = None;
            }
            if fired.payload.generation != self.generation || !self.is_active() {
                tracing::debug!(
                    stale = fired.payload.generation,
                    current = self.generation,
                    "dropping stale reveal tick"
                );
                continue;
            }
            self.reveal_next(listener);
        }
        self.timers.settle_at(until);
    }

    /// Show the whole line now. No-op unless a reveal is in progress.
    pub fn skip(&mut self, listener: &mut dyn RevealListener) -> bool {
        if !self.is_active() {
            return false;
        }
        self.cancel_timer();
        if let Some(state) = self.state.as_mut() {
            state.revealed_count = state.units.len();
        }
        self.complete(listener);
        true
    }

    /// Abandon the current reveal without completing it.
    pub fn cancel(&mut self) {
        self.cancel_timer();
        if self.state.take().is_some() {
            tracing::debug!(generation = self.generation, "reveal cancelled");
        }
    }

    fn reveal_next(&mut self, listener: &mut dyn RevealListener) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let index = state.revealed_count;
        let unit = state.units[index];
        state.revealed_count += 1;
        let finished = state.revealed_count == state.units.len();

        listener.unit_revealed(index, unit);
        if finished {
            self.complete(listener);
        } else {
            self.schedule_tick();
        }
    }

    fn complete(&mut self, listener: &mut dyn RevealListener) {
        if let Some(state) = self.state.as_mut() {
            state.active = false;
        }
        listener.reveal_complete(self.generation);
    }

    fn schedule_tick(&mut self) {
        let tick = RevealTick {
            generation: self.generation,
        };
        self.pending_tick = Some(self.timers.schedule(self.per_unit_delay, tick));
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.pending_tick.take() {
            self.timers.cancel(handle);
        }
    }
}
