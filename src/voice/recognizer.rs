//! Continuous recognition lifecycle
//!
//! Speech engines end recognition on their own (silence, transient faults,
//! platform limits). The adapter restarts them unless the user asked to stop
//! or the engine reported a terminal error. Modelling that as explicit states
//! keeps a stale "ended" notification from restarting a recogniser the user
//! has just switched off.
//!
//! ```text
//!          user start            engine started
//!   IDLE ─────────────► STARTING ─────────────► LISTENING ◄─┐
//!                          │                        │       │ engine ended
//!                          │ user stop              │       │ (auto-restart)
//!                          ▼                        ├───────┘
//!                   STOPPED_BY_USER ◄── user stop ──┤
//!                                                   │ permission denied
//!                                                   ▼
//!                                           STOPPED_BY_ERROR
//! ```

use serde::{Deserialize, Serialize};

/// Recogniser lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerState {
    /// Never started in this session
    #[default]
    Idle,
    /// Start requested, engine has not confirmed yet
    Starting,
    /// Engine is capturing audio
    Listening,
    /// User switched listening off
    StoppedByUser,
    /// Engine reported a terminal error (e.g., microphone permission denied)
    StoppedByError,
}

impl RecognizerState {
    /// Whether the engine is confirmed to be listening
    pub fn is_listening(&self) -> bool {
        matches!(self, RecognizerState::Listening)
    }

    /// Whether listening is wanted (requested or confirmed)
    pub fn is_active(&self) -> bool {
        matches!(self, RecognizerState::Starting | RecognizerState::Listening)
    }
}

/// Error categories reported by recognition engines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionErrorKind {
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    Other(String),
}

impl RecognitionErrorKind {
    /// Map a Web Speech style error code
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            "not-allowed" | "service-not-allowed" => Self::NotAllowed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Terminal errors end the listening session instead of being ridden out
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotAllowed)
    }
}

/// Inputs to the lifecycle machine
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    UserStart,
    UserStop,
    EngineStarted,
    EngineEnded,
    EngineError(RecognitionErrorKind),
    /// The engine refused to start
    StartFailed(RecognitionErrorKind),
}

/// What the adapter must do to the engine after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    None,
    Start,
    Stop,
}

/// Recogniser lifecycle state machine
#[derive(Debug, Clone)]
pub struct RecognizerMachine {
    state: RecognizerState,
    auto_restart: bool,
}

impl RecognizerMachine {
    pub fn new(auto_restart: bool) -> Self {
        Self {
            state: RecognizerState::Idle,
            auto_restart,
        }
    }

    pub fn state(&self) -> RecognizerState {
        self.state
    }

    /// Apply an event and return the engine action it calls for
    pub fn process_event(&mut self, event: LifecycleEvent) -> EngineAction {
        use RecognizerState::*;

        let (next, action) = match (self.state, event) {
            (Idle | StoppedByUser | StoppedByError, LifecycleEvent::UserStart) => {
                (Starting, EngineAction::Start)
            }
            (Starting | Listening, LifecycleEvent::UserStart) => (self.state, EngineAction::None),

            (Starting | Listening, LifecycleEvent::UserStop) => {
                (StoppedByUser, EngineAction::Stop)
            }

            (Starting | Listening, LifecycleEvent::EngineStarted) => {
                (Listening, EngineAction::None)
            }
            // Late start confirmation after the user or an error stopped us
            (Idle | StoppedByUser | StoppedByError, LifecycleEvent::EngineStarted) => {
                (self.state, EngineAction::Stop)
            }

            (Starting | Listening, LifecycleEvent::EngineEnded) if self.auto_restart => {
                (Listening, EngineAction::Start)
            }
            (Starting | Listening, LifecycleEvent::EngineEnded) => (Idle, EngineAction::None),

            (Starting | Listening, LifecycleEvent::EngineError(kind)) if kind.is_terminal() => {
                (StoppedByError, EngineAction::Stop)
            }

            (Starting | Listening, LifecycleEvent::StartFailed(kind)) if kind.is_terminal() => {
                (StoppedByError, EngineAction::None)
            }
            // A first start that failed can be retried by the user
            (Starting, LifecycleEvent::StartFailed(_)) => (Idle, EngineAction::None),

            // Stale end notifications, transient errors, redundant stops
            (state, _) => (state, EngineAction::None),
        };

        if next != self.state {
            tracing::info!("Recognizer state transition: {:?} -> {:?}", self.state, next);
            self.state = next;
        }

        action
    }
}

impl Default for RecognizerMachine {
    fn default() -> Self {
        Self::new(true)
    }
}
