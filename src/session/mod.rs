//! Cooking session
//!
//! Drives one open cooking view: the current step, the ingredients and tips
//! drawers, the smart timer, voice command feedback and read-aloud.
//!
//! ## Flow
//!
//! ```text
//! ┌────────────┐ final result ┌──────────┐ command ┌─────────┐ effects ┌────────────┐
//! │ recognizer │─────────────►│ classify │────────►│ Session │────────►│ controller │
//! └────────────┘              └──────────┘         └─────────┘         └────────────┘
//!       ▲                                               ▲                 │   │   │
//!       │ auto restart                   host actions   │          speak  │   │   │ events
//!       └───────────────────────────────────────────────┘◄── deferred ────┘   ▼   ▼
//!                                                            callbacks   synthesizer  UI
//! ```
//!
//! [`state`] holds the synchronous state and the command dispatch table;
//! [`controller`] wires it to speech, the wake lock and deferred callbacks.
//!
//! ## Events
//!
//! Subscribers of [`CookingSession::subscribe`] receive a [`SessionEvent`]
//! for every visible change: step moves, drawer toggles, feedback toasts,
//! timer state, recognition on/off and the final close.

pub mod controller;
pub mod state;

pub use controller::{
    CookingSession, SessionBuilder, SessionError, SessionEvent, SessionSnapshot,
};
pub use state::{
    CommandFeedback, Session, SessionEffect, FIRST_STEP_MESSAGE, LAST_STEP_MESSAGE,
    NO_ACTIVE_TIMER_MESSAGE, NO_TIMER_FOUND_MESSAGE, TIMER_STOPPED_MESSAGE,
};
