//! Speech I/O adapter
//!
//! Wraps the host's recognition and synthesis engines behind one object with
//! the behaviour a hands-free kitchen needs: continuous recognition that
//! survives engine hiccups, and a single active utterance at a time.
//!
//! Engines report back through [`RecognitionEvent`] and [`SynthesisEvent`],
//! which the host forwards to the session. Either engine may be absent, in
//! which case the corresponding operations do nothing.

use serde::{Deserialize, Serialize};

use super::commands::{classify, VoiceCommand};
use super::contains_cjk;
use super::recognizer::{
    EngineAction, LifecycleEvent, RecognitionErrorKind, RecognizerMachine, RecognizerState,
};
use crate::config::SpeechConfig;

/// Errors returned by speech engines
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech recognition is already running")]
    AlreadyStarted,

    #[error("Microphone permission denied")]
    NotAllowed,

    #[error("Speech engine error: {0}")]
    Engine(String),
}

/// Continuous speech recognition engine
///
/// Implementations must deliver their [`RecognitionEvent`]s asynchronously,
/// never from inside `start`/`stop`/`abort`.
pub trait SpeechRecognizer: Send {
    /// Language to recognise (BCP 47 tag, e.g., "en-US"), applied on the next start
    fn set_language(&mut self, language: &str);
    fn start(&mut self) -> Result<(), SpeechError>;
    /// Stop gracefully, delivering any pending final result
    fn stop(&mut self);
    /// Stop immediately and discard pending results
    fn abort(&mut self);
}

/// Speech synthesis engine
///
/// Implementations must deliver their [`SynthesisEvent`]s asynchronously,
/// never from inside `speak`/`cancel`, tagged with the id of the
/// [`Utterance`] they belong to.
pub trait SpeechSynthesizer: Send {
    fn speak(&mut self, utterance: &Utterance);
    /// Silence the current utterance
    fn cancel(&mut self);
}

/// Notifications from the recognition engine
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Started,
    Result { transcript: String, is_final: bool },
    Error(RecognitionErrorKind),
    Ended,
}

/// Notifications from the synthesis engine, keyed by [`Utterance::id`]
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    Started { utterance_id: u64 },
    Ended { utterance_id: u64 },
    Error { utterance_id: u64, message: String },
}

impl SynthesisEvent {
    pub fn utterance_id(&self) -> u64 {
        match self {
            SynthesisEvent::Started { utterance_id }
            | SynthesisEvent::Ended { utterance_id }
            | SynthesisEvent::Error { utterance_id, .. } => *utterance_id,
        }
    }
}

/// Text to speak plus the voice parameters to speak it with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    /// Sequence number, unique per adapter
    pub id: u64,
    pub text: String,
    /// BCP 47 language tag (e.g., "en-US", "zh-HK")
    pub language: String,
    pub rate: f32,
    pub pitch: f32,
}

/// A classified, finalised utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedCommand {
    pub command: VoiceCommand,
    /// Normalised transcript the command was classified from
    pub text: String,
}

/// Speech I/O adapter over optional host engines
pub struct SpeechIo {
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    lifecycle: RecognizerMachine,
    is_speaking: bool,
    next_utterance_id: u64,
    current_utterance: Option<u64>,
    transcript: String,
    config: SpeechConfig,
}

impl SpeechIo {
    pub fn new(
        mut recognizer: Option<Box<dyn SpeechRecognizer>>,
        synthesizer: Option<Box<dyn SpeechSynthesizer>>,
        config: SpeechConfig,
    ) -> Self {
        match recognizer.as_mut() {
            Some(recognizer) => recognizer.set_language(&config.recognition_language),
            None => tracing::info!("Speech recognition unavailable, voice commands disabled"),
        }
        if synthesizer.is_none() {
            tracing::info!("Speech synthesis unavailable, spoken feedback disabled");
        }

        Self {
            recognizer,
            synthesizer,
            lifecycle: RecognizerMachine::new(config.auto_restart_recognition),
            is_speaking: false,
            next_utterance_id: 0,
            current_utterance: None,
            transcript: String::new(),
            config,
        }
    }

    /// Adapter for hosts without any speech support
    pub fn unavailable(config: SpeechConfig) -> Self {
        Self::new(None, None, config)
    }

    pub fn has_recognition(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn has_synthesis(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.lifecycle.state().is_listening()
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    /// Last finalised transcript
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn recognizer_state(&self) -> RecognizerState {
        self.lifecycle.state()
    }

    /// Switch continuous listening on or off
    pub fn toggle_listening(&mut self) {
        if self.recognizer.is_none() {
            tracing::debug!("Ignoring listening toggle, no recognizer available");
            return;
        }

        let event = if self.lifecycle.state().is_active() {
            LifecycleEvent::UserStop
        } else {
            LifecycleEvent::UserStart
        };
        let action = self.lifecycle.process_event(event);
        self.perform(action);
    }

    /// Stop listening as if the user asked for it. Used on session teardown.
    pub fn stop_listening(&mut self) {
        if self.lifecycle.state().is_active() {
            let action = self.lifecycle.process_event(LifecycleEvent::UserStop);
            self.perform(action);
        }
    }

    /// Speak `text`, cutting off whatever is currently being spoken
    pub fn speak(&mut self, text: &str) {
        if self.synthesizer.is_none() {
            tracing::debug!("No synthesizer, not speaking: {:?}", text);
            return;
        }

        self.next_utterance_id += 1;
        let utterance = self.utterance_for(self.next_utterance_id, text);
        self.cancel();
        self.current_utterance = Some(utterance.id);

        if let Some(synthesizer) = self.synthesizer.as_mut() {
            synthesizer.speak(&utterance);
        }
        tracing::debug!("Speaking ({}): {:?}", utterance.language, utterance.text);
    }

    /// Silence the current utterance
    pub fn cancel(&mut self) {
        if let Some(synthesizer) = self.synthesizer.as_mut() {
            synthesizer.cancel();
            self.is_speaking = false;
            self.current_utterance = None;
        }
    }

    /// Build the utterance for `text`, picking the voice by script
    pub fn utterance_for(&self, id: u64, text: &str) -> Utterance {
        let language = if contains_cjk(text) {
            &self.config.cjk_voice_language
        } else {
            &self.config.english_voice_language
        };

        Utterance {
            id,
            text: text.to_string(),
            language: language.clone(),
            rate: self.config.rate,
            pitch: self.config.pitch,
        }
    }

    /// Process a recognition engine notification
    ///
    /// Returns the classified command for a finalised, non-empty result.
    pub fn handle_recognition_event(
        &mut self,
        event: RecognitionEvent,
    ) -> Option<RecognizedCommand> {
        match event {
            RecognitionEvent::Started => {
                let action = self.lifecycle.process_event(LifecycleEvent::EngineStarted);
                self.perform(action);
                None
            }
            RecognitionEvent::Ended => {
                let action = self.lifecycle.process_event(LifecycleEvent::EngineEnded);
                self.perform(action);
                None
            }
            RecognitionEvent::Error(kind) => {
                if kind.is_terminal() {
                    tracing::warn!("Speech recognition error: {:?}", kind);
                } else {
                    tracing::debug!("Ignoring transient recognition error: {:?}", kind);
                }
                let action = self.lifecycle.process_event(LifecycleEvent::EngineError(kind));
                self.perform(action);
                None
            }
            RecognitionEvent::Result {
                transcript,
                is_final,
            } => {
                if !is_final {
                    return None;
                }
                let text = transcript.trim().to_lowercase();
                if text.is_empty() {
                    return None;
                }

                let command = classify(&text);
                tracing::info!("Heard {:?} -> {:?}", text, command);
                self.transcript = text.clone();
                Some(RecognizedCommand { command, text })
            }
        }
    }

    /// Process a synthesis engine notification
    ///
    /// Events for an utterance that was cancelled or replaced are ignored.
    pub fn handle_synthesis_event(&mut self, event: SynthesisEvent) {
        if self.current_utterance != Some(event.utterance_id()) {
            tracing::debug!("Ignoring event for superseded utterance: {:?}", event);
            return;
        }

        match event {
            SynthesisEvent::Started { .. } => self.is_speaking = true,
            SynthesisEvent::Ended { .. } => {
                self.is_speaking = false;
                self.current_utterance = None;
            }
            SynthesisEvent::Error { message, .. } => {
                tracing::warn!("Speech synthesis error: {}", message);
                self.is_speaking = false;
                self.current_utterance = None;
            }
        }
    }

    /// Stop recognition and silence synthesis for good
    pub fn shutdown(&mut self) {
        if self.lifecycle.state().is_active() {
            self.lifecycle.process_event(LifecycleEvent::UserStop);
        }
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.abort();
        }
        self.cancel();
    }

    fn perform(&mut self, action: EngineAction) {
        let Some(recognizer) = self.recognizer.as_mut() else {
            return;
        };

        match action {
            EngineAction::None => {}
            EngineAction::Stop => recognizer.stop(),
            EngineAction::Start => match recognizer.start() {
                Ok(()) => {}
                Err(SpeechError::AlreadyStarted) => {
                    tracing::debug!("Recognizer already running");
                    self.lifecycle.process_event(LifecycleEvent::EngineStarted);
                }
                Err(e) => {
                    tracing::warn!("Failed to start speech recognition: {}", e);
                    let kind = match e {
                        SpeechError::NotAllowed => RecognitionErrorKind::NotAllowed,
                        other => RecognitionErrorKind::Other(other.to_string()),
                    };
                    self.lifecycle.process_event(LifecycleEvent::StartFailed(kind));
                }
            },
        }
    }
}

impl std::fmt::Debug for SpeechIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechIo")
            .field("has_recognition", &self.has_recognition())
            .field("has_synthesis", &self.has_synthesis())
            .field("recognizer_state", &self.lifecycle.state())
            .field("is_speaking", &self.is_speaking)
            .field("transcript", &self.transcript)
            .finish()
    }
}
