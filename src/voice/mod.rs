//! Voice control
//!
//! Hands-free input and output for a cooking session:
//!
//! - [`commands`] turns a finalised utterance into a [`VoiceCommand`]
//! - [`recognizer`] keeps continuous recognition alive across engine restarts
//! - [`adapter`] wraps host speech engines into [`SpeechIo`]
//!
//! Speech engines themselves are supplied by the host through the
//! [`SpeechRecognizer`] and [`SpeechSynthesizer`] traits.

pub mod adapter;
pub mod commands;
pub mod recognizer;

pub use adapter::{
    RecognitionEvent, RecognizedCommand, SpeechError, SpeechIo, SpeechRecognizer,
    SpeechSynthesizer, SynthesisEvent, Utterance,
};
pub use commands::{classify, VoiceCommand};
pub use recognizer::{RecognitionErrorKind, RecognizerState};

/// Whether `text` contains CJK unified ideographs (U+4E00..=U+9FA5)
///
/// Used to pick the voice for an utterance and the phrasing of timer
/// announcements.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fa5}').contains(&c))
}
