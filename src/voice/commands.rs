//! Voice command classification
//!
//! Maps a finalised utterance to one symbolic command. Rules are evaluated
//! in order and the first match wins, so the position of each rule in
//! [`RULES`] is part of its meaning: timer phrases sit above the bare
//! "stop" rule and above the navigation words they contain ("continue"
//! appears in both the resume-timer and next-step rules).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Symbolic command recognised from speech
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoiceCommand {
    NextStep,
    PrevStep,
    ReadCurrent,
    ReadIngredients,
    StopTts,
    StartTimer,
    StopTimer,
    PauseTimer,
    ResumeTimer,
    Unknown,
}

impl VoiceCommand {
    /// Label shown in the transient feedback toast
    pub fn feedback_label(&self) -> Option<&'static str> {
        match self {
            VoiceCommand::NextStep => Some("Next Step"),
            VoiceCommand::PrevStep => Some("Previous Step"),
            VoiceCommand::ReadCurrent => Some("Reading..."),
            VoiceCommand::ReadIngredients => Some("Ingredients"),
            VoiceCommand::StopTts => Some("Silence"),
            VoiceCommand::StartTimer => Some("Timer Started"),
            VoiceCommand::StopTimer => Some("Timer Stopped"),
            VoiceCommand::PauseTimer => Some("Paused"),
            VoiceCommand::ResumeTimer => Some("Resumed"),
            VoiceCommand::Unknown => None,
        }
    }

    /// Whether handling this command closes the ingredients and tips drawers
    pub fn closes_drawers(&self) -> bool {
        matches!(
            self,
            VoiceCommand::NextStep | VoiceCommand::PrevStep | VoiceCommand::ReadCurrent
        )
    }
}

/// Ordered classification rules, highest priority first
static RULES: LazyLock<Vec<(Regex, VoiceCommand)>> = LazyLock::new(|| {
    [
        // "read ingredients", "what do I need", "show shopping list"
        (r"ingredient|grocery|shopping|list|need", VoiceCommand::ReadIngredients),
        (r"(start|begin|set)\s+timer", VoiceCommand::StartTimer),
        (r"(stop|cancel|dismiss|end)\s+timer", VoiceCommand::StopTimer),
        (r"(pause|hold)\s+timer", VoiceCommand::PauseTimer),
        (r"(resume|restart|continue)\s+timer", VoiceCommand::ResumeTimer),
        // "stop", "be quiet", "shut up", "hush"
        (r"stop|quiet|hush|silence|off|shut", VoiceCommand::StopTts),
        (r"back|previous|return|last|behind", VoiceCommand::PrevStep),
        // Above the read rule so "read next step" moves forward
        (
            r"next|forward|continue|go|done|finish|okay|ok|check|skip",
            VoiceCommand::NextStep,
        ),
        (
            r"read|speak|tell|what|repeat|again|current|where",
            VoiceCommand::ReadCurrent,
        ),
    ]
    .into_iter()
    .map(|(pattern, command)| (Regex::new(pattern).unwrap(), command))
    .collect()
});

/// Classify an utterance. Matching is case-insensitive and total: anything
/// no rule claims is [`VoiceCommand::Unknown`].
pub fn classify(utterance: &str) -> VoiceCommand {
    let text = utterance.to_lowercase();
    RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(&text))
        .map(|(_, command)| *command)
        .unwrap_or(VoiceCommand::Unknown)
}
