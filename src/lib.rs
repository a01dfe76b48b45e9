//! Sous - Hands-free cooking sessions
//!
//! Step-by-step recipe navigation driven by voice commands, with spoken
//! feedback and a smart timer picked up from the recipe text. Speech engines
//! and the screen wake lock are supplied by the host through the traits in
//! [`voice`] and [`wake_lock`].

pub mod config;
pub mod duration;
pub mod logging;
pub mod recipe;
pub mod session;
pub mod timer;
pub mod voice;
pub mod wake_lock;

pub use duration::{find_duration_in_text, DurationExtractor, FoundDuration};
pub use recipe::{Ingredient, Recipe};
pub use session::{CookingSession, SessionBuilder, SessionError, SessionEvent, SessionSnapshot};
pub use timer::{SmartTimer, TimerPhase, TimerSnapshot};
pub use voice::{classify, RecognitionEvent, SynthesisEvent, VoiceCommand};

/// Session builder configured from the saved settings (`~/.sous/config.json`)
pub fn cooking_session(recipe: Recipe) -> SessionBuilder {
    SessionBuilder::new(recipe).settings(config::session_settings())
}
