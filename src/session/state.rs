//! Cooking session state and command dispatch
//!
//! Everything here is synchronous and clock-injected. Dispatching a command
//! mutates the session first and then returns the side effects the
//! controller has to carry out, in order, so spoken feedback always reflects
//! the post-mutation state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;

use crate::duration::DurationExtractor;
use crate::recipe::Recipe;
use crate::timer::SmartTimer;
use crate::voice::VoiceCommand;

pub const LAST_STEP_MESSAGE: &str = "That was the last step.";
pub const FIRST_STEP_MESSAGE: &str = "You are at the first step.";
pub const NO_TIMER_FOUND_MESSAGE: &str = "I didn't find a timer in this step.";
pub const NO_ACTIVE_TIMER_MESSAGE: &str = "There is no active timer.";
pub const TIMER_STOPPED_MESSAGE: &str = "Timer stopped";

/// Transient toast shown after a voice command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFeedback {
    pub command: VoiceCommand,
    pub label: String,
}

/// Side effect requested by a session mutation
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// The current step moved to this index
    StepChanged(usize),
    /// Ingredients or tips drawer visibility changed
    DrawersChanged,
    /// The smart timer was created, changed state, or removed
    TimerChanged,
    /// A feedback toast replaced any previous one
    FeedbackShown(CommandFeedback),
    Speak(String),
    CancelSpeech,
}

/// State of one open cooking view
#[derive(Debug, Clone)]
pub struct Session {
    recipe: Arc<Recipe>,
    current_step: usize,
    show_ingredients: bool,
    show_tips: bool,
    active_command: Option<CommandFeedback>,
    active_timer: Option<SmartTimer>,
}

impl Session {
    pub fn new(recipe: Arc<Recipe>) -> Self {
        Self {
            recipe,
            current_step: 0,
            show_ingredients: false,
            show_tips: false,
            active_command: None,
            active_timer: None,
        }
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Instruction text of the current step
    pub fn current_instruction(&self) -> Option<&str> {
        self.recipe.instruction(self.current_step)
    }

    pub fn show_ingredients(&self) -> bool {
        self.show_ingredients
    }

    pub fn show_tips(&self) -> bool {
        self.show_tips
    }

    pub fn active_command(&self) -> Option<&CommandFeedback> {
        self.active_command.as_ref()
    }

    pub fn active_timer(&self) -> Option<&SmartTimer> {
        self.active_timer.as_ref()
    }

    /// Advance one step. Returns false at the last step.
    pub fn next_step(&mut self) -> bool {
        if self.current_step + 1 < self.recipe.step_count() {
            self.current_step += 1;
            true
        } else {
            false
        }
    }

    /// Go back one step. Returns false at the first step.
    pub fn prev_step(&mut self) -> bool {
        if self.current_step > 0 {
            self.current_step -= 1;
            true
        } else {
            false
        }
    }

    /// Returns whether the value changed
    pub fn set_show_ingredients(&mut self, show: bool) -> bool {
        std::mem::replace(&mut self.show_ingredients, show) != show
    }

    /// Returns whether the value changed
    pub fn set_show_tips(&mut self, show: bool) -> bool {
        std::mem::replace(&mut self.show_tips, show) != show
    }

    /// Close both drawers. Returns whether either was open.
    pub fn close_drawers(&mut self) -> bool {
        let ingredients = self.set_show_ingredients(false);
        let tips = self.set_show_tips(false);
        ingredients || tips
    }

    /// Replace the active timer. Invalid lengths leave the current timer as is.
    pub fn start_smart_timer(&mut self, seconds: f64, label: &str, now: Instant) -> bool {
        match SmartTimer::start(seconds, label, now) {
            Some(timer) => {
                tracing::info!("Timer '{}' started for {}s", label, seconds);
                self.active_timer = Some(timer);
                true
            }
            None => {
                tracing::debug!("Ignoring timer request for {} seconds", seconds);
                false
            }
        }
    }

    /// Pause or resume the active timer. No-op without a timer.
    pub fn toggle_timer(&mut self, now: Instant) -> bool {
        self.active_timer
            .as_mut()
            .is_some_and(|timer| timer.toggle(now))
    }

    /// Remove the active timer. Returns whether there was one.
    pub fn stop_timer(&mut self) -> bool {
        let stopped = self.active_timer.take().is_some();
        if stopped {
            tracing::info!("Timer stopped");
        }
        stopped
    }

    /// Detect an overdue timer deadline
    ///
    /// Returns the finished timer's label on the transition to done.
    pub fn check_timer(&mut self, now: Instant) -> Option<String> {
        let timer = self.active_timer.as_mut()?;
        timer.check_expiry(now).then(|| timer.label().to_string())
    }

    /// Show a feedback toast for `command`, replacing any current one
    pub fn show_feedback(&mut self, command: VoiceCommand) -> Option<CommandFeedback> {
        let feedback = CommandFeedback {
            command,
            label: command.feedback_label()?.to_string(),
        };
        self.active_command = Some(feedback.clone());
        Some(feedback)
    }

    pub fn clear_feedback(&mut self) -> bool {
        self.active_command.take().is_some()
    }

    /// Apply a voice command and return the effects to carry out
    pub fn dispatch(
        &mut self,
        command: VoiceCommand,
        extractor: &dyn DurationExtractor,
        now: Instant,
    ) -> Vec<SessionEffect> {
        let mut effects = Vec::new();

        if command.closes_drawers() && self.close_drawers() {
            effects.push(SessionEffect::DrawersChanged);
        }

        match command {
            VoiceCommand::NextStep => {
                if self.next_step() {
                    effects.push(SessionEffect::StepChanged(self.current_step));
                    self.push_feedback(command, &mut effects);
                } else {
                    effects.push(SessionEffect::Speak(LAST_STEP_MESSAGE.to_string()));
                }
            }
            VoiceCommand::PrevStep => {
                if self.prev_step() {
                    effects.push(SessionEffect::StepChanged(self.current_step));
                    self.push_feedback(command, &mut effects);
                } else {
                    effects.push(SessionEffect::Speak(FIRST_STEP_MESSAGE.to_string()));
                }
            }
            VoiceCommand::ReadCurrent => {
                self.push_feedback(command, &mut effects);
                if let Some(text) = self.current_instruction() {
                    effects.push(SessionEffect::Speak(text.to_string()));
                }
            }
            VoiceCommand::ReadIngredients => {
                self.push_feedback(command, &mut effects);
                if self.set_show_ingredients(true) {
                    effects.push(SessionEffect::DrawersChanged);
                }
                effects.push(SessionEffect::Speak(self.recipe.ingredients_sentence()));
            }
            VoiceCommand::StartTimer => {
                let found = self
                    .current_instruction()
                    .and_then(|text| extractor.find_duration(text));
                match found {
                    Some(found) if self.start_smart_timer(found.seconds, &found.label, now) => {
                        effects.push(SessionEffect::TimerChanged);
                        self.push_feedback(command, &mut effects);
                        effects.push(SessionEffect::Speak(format!(
                            "Starting timer for {}",
                            found.label
                        )));
                    }
                    _ => effects.push(SessionEffect::Speak(NO_TIMER_FOUND_MESSAGE.to_string())),
                }
            }
            VoiceCommand::StopTimer => {
                if self.stop_timer() {
                    effects.push(SessionEffect::TimerChanged);
                    self.push_feedback(command, &mut effects);
                    effects.push(SessionEffect::Speak(TIMER_STOPPED_MESSAGE.to_string()));
                } else {
                    effects.push(SessionEffect::Speak(NO_ACTIVE_TIMER_MESSAGE.to_string()));
                }
            }
            VoiceCommand::PauseTimer => {
                let running = self.active_timer.as_ref().is_some_and(SmartTimer::is_running);
                if running && self.toggle_timer(now) {
                    effects.push(SessionEffect::TimerChanged);
                    self.push_feedback(command, &mut effects);
                }
            }
            VoiceCommand::ResumeTimer => {
                let paused = self.active_timer.as_ref().is_some_and(SmartTimer::is_paused);
                if paused && self.toggle_timer(now) {
                    effects.push(SessionEffect::TimerChanged);
                    self.push_feedback(command, &mut effects);
                }
            }
            VoiceCommand::StopTts => {
                self.push_feedback(command, &mut effects);
                effects.push(SessionEffect::CancelSpeech);
            }
            VoiceCommand::Unknown => {
                tracing::debug!("Unknown voice command, nothing to do");
            }
        }

        effects
    }

    fn push_feedback(&mut self, command: VoiceCommand, effects: &mut Vec<SessionEffect>) {
        if let Some(feedback) = self.show_feedback(command) {
            effects.push(SessionEffect::FeedbackShown(feedback));
        }
    }
}
