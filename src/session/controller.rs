//! Cooking session controller
//!
//! Owns a [`Session`], the speech adapter, the wake lock and the deferred
//! callbacks that keep them in sync, and exposes the actions a cooking view
//! needs. Host calls, engine events and deferred callbacks all take the
//! same lock and are applied one at a time. UI events are broadcast after
//! the lock is released.
//!
//! Deferred work is one tokio task per slot:
//!
//! - timer watch: wakes at the running timer's deadline
//! - auto-read: reads a newly selected step aloud after a short delay
//! - feedback clear: hides the command toast
//!
//! Re-arming a slot aborts the previous task. Each task also carries a token
//! that must still match its slot when it fires, which covers a task that
//! woke up just before being superseded.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::state::{CommandFeedback, Session, SessionEffect};
use crate::config::SessionSettings;
use crate::duration::{DurationExtractor, FoundDuration, TextDurationExtractor};
use crate::recipe::Recipe;
use crate::timer::{completion_announcement, TimerSnapshot};
use crate::voice::{
    RecognitionEvent, SpeechIo, SpeechRecognizer, SpeechSynthesizer, SynthesisEvent,
    VoiceCommand,
};
use crate::wake_lock::{WakeLock, WakeLockGuard};

/// Capacity of the UI event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Session construction errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A cooking session must be started from within a tokio runtime")]
    NoRuntime,
}

/// Events emitted to the hosting UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StepChanged {
        step: usize,
    },
    DrawersChanged {
        show_ingredients: bool,
        show_tips: bool,
    },
    CommandFeedback(CommandFeedback),
    FeedbackCleared,
    TimerChanged {
        timer: Option<TimerSnapshot>,
    },
    TimerFinished {
        label: String,
        announcement: String,
    },
    ListeningChanged {
        listening: bool,
    },
    Closed,
}

/// Everything the UI needs to render the cooking view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub recipe: Recipe,
    pub current_step: usize,
    pub show_ingredients: bool,
    pub show_tips: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_command: Option<CommandFeedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_timer: Option<TimerSnapshot>,
    pub is_listening: bool,
    pub is_speaking: bool,
    pub transcript: String,
    pub is_wake_lock_active: bool,
}

/// Callback run once when the view is closed
type CloseCallback = Box<dyn FnOnce() + Send>;

/// Builder for [`CookingSession`]
pub struct SessionBuilder {
    recipe: Recipe,
    settings: SessionSettings,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    wake_lock: Option<Box<dyn WakeLock>>,
    extractor: Box<dyn DurationExtractor>,
    on_close: Option<CloseCallback>,
}

impl SessionBuilder {
    pub fn new(recipe: Recipe) -> Self {
        Self {
            recipe,
            settings: SessionSettings::default(),
            recognizer: None,
            synthesizer: None,
            wake_lock: None,
            extractor: Box::new(TextDurationExtractor),
            on_close: None,
        }
    }

    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn recognizer(mut self, recognizer: impl SpeechRecognizer + 'static) -> Self {
        self.recognizer = Some(Box::new(recognizer));
        self
    }

    pub fn synthesizer(mut self, synthesizer: impl SpeechSynthesizer + 'static) -> Self {
        self.synthesizer = Some(Box::new(synthesizer));
        self
    }

    pub fn wake_lock(mut self, wake_lock: impl WakeLock + 'static) -> Self {
        self.wake_lock = Some(Box::new(wake_lock));
        self
    }

    pub fn duration_extractor(mut self, extractor: impl DurationExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Called once when the view is closed (e.g., to leave hands-free mode)
    pub fn on_close(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(callback));
        self
    }

    /// Open the session. Must be called from within a tokio runtime; deferred
    /// callbacks run on that runtime.
    pub fn build(self) -> Result<CookingSession, SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let id = Uuid::new_v4();
        let span = tracing::info_span!("cooking_session", %id);

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let inner = {
            let _entered = span.enter();
            tracing::info!(
                "Opening cooking session ({} steps, {} ingredients)",
                self.recipe.step_count(),
                self.recipe.ingredients.len()
            );

            Inner {
                session: Session::new(Arc::new(self.recipe)),
                extractor: self.extractor,
                resources: SessionResources {
                    speech: SpeechIo::new(
                        self.recognizer,
                        self.synthesizer,
                        self.settings.speech.clone(),
                    ),
                    wake_lock: WakeLockGuard::acquire(self.wake_lock),
                    tasks: DeferredTasks::default(),
                    released: false,
                },
                settings: self.settings,
                on_close: self.on_close,
                closed: false,
            }
        };

        Ok(CookingSession {
            shared: Arc::new(Shared {
                id,
                span,
                runtime,
                events,
                inner: Mutex::new(inner),
            }),
        })
    }
}

/// Handle to an open cooking session
///
/// Cloning yields another handle to the same session. The session is closed
/// by [`CookingSession::close_view`] or when the last handle is dropped.
#[derive(Clone)]
pub struct CookingSession {
    shared: Arc<Shared>,
}

impl CookingSession {
    pub fn builder(recipe: Recipe) -> SessionBuilder {
        SessionBuilder::new(recipe)
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Subscribe to UI events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Current view state
    pub fn state(&self) -> SessionSnapshot {
        self.shared
            .run(|_, inner, _| inner.snapshot())
            .unwrap_or_else(|| self.shared.inner.lock().snapshot())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }

    /// Advance one step. Returns false at the last step or once closed.
    pub fn next_step(&self) -> bool {
        self.shared
            .run(|shared, inner, events| {
                let moved = inner.session.next_step();
                if moved {
                    let step = inner.session.current_step();
                    shared.apply_effects(inner, vec![SessionEffect::StepChanged(step)], events);
                }
                moved
            })
            .unwrap_or(false)
    }

    /// Go back one step. Returns false at the first step or once closed.
    pub fn prev_step(&self) -> bool {
        self.shared
            .run(|shared, inner, events| {
                let moved = inner.session.prev_step();
                if moved {
                    let step = inner.session.current_step();
                    shared.apply_effects(inner, vec![SessionEffect::StepChanged(step)], events);
                }
                moved
            })
            .unwrap_or(false)
    }

    pub fn set_show_ingredients(&self, show: bool) {
        self.shared.run(|shared, inner, events| {
            if inner.session.set_show_ingredients(show) {
                shared.apply_effects(inner, vec![SessionEffect::DrawersChanged], events);
            }
        });
    }

    pub fn set_show_tips(&self, show: bool) {
        self.shared.run(|shared, inner, events| {
            if inner.session.set_show_tips(show) {
                shared.apply_effects(inner, vec![SessionEffect::DrawersChanged], events);
            }
        });
    }

    /// Start (or replace) the smart timer. Non-finite or non-positive
    /// lengths are ignored.
    pub fn start_smart_timer(&self, seconds: f64, label: &str) {
        self.shared.run(|shared, inner, events| {
            if inner.session.start_smart_timer(seconds, label, Instant::now()) {
                shared.apply_effects(inner, vec![SessionEffect::TimerChanged], events);
            }
        });
    }

    /// Pause a running timer or resume a paused one
    pub fn toggle_timer(&self) {
        self.shared.run(|shared, inner, events| {
            if inner.session.toggle_timer(Instant::now()) {
                shared.apply_effects(inner, vec![SessionEffect::TimerChanged], events);
            }
        });
    }

    /// Remove the smart timer, whatever its state
    pub fn stop_timer(&self) {
        self.shared.run(|shared, inner, events| {
            if inner.session.stop_timer() {
                shared.apply_effects(inner, vec![SessionEffect::TimerChanged], events);
            }
        });
    }

    /// Duration found in the current step, for a manual "start timer" button
    pub fn durations_in_current_step(&self) -> Option<FoundDuration> {
        self.shared
            .run(|_, inner, _| {
                let text = inner.session.current_instruction()?;
                inner.extractor.find_duration(text)
            })
            .flatten()
    }

    /// Switch voice control on or off
    pub fn toggle_listening(&self) {
        self.shared.run(|shared, inner, events| {
            let was_listening = inner.resources.speech.is_listening();
            inner.resources.speech.toggle_listening();
            shared.sync_listening(inner, was_listening, events);
        });
    }

    pub fn speak(&self, text: &str) {
        self.shared.run(|_, inner, _| inner.resources.speech.speak(text));
    }

    pub fn cancel_speech(&self) {
        self.shared.run(|_, inner, _| inner.resources.speech.cancel());
    }

    /// Apply a voice command as if it had been recognised
    pub fn dispatch_command(&self, command: VoiceCommand) {
        self.shared.run(|shared, inner, events| {
            shared.dispatch(inner, command, events);
        });
    }

    /// Feed a recognition engine notification into the session
    pub fn handle_recognition_event(&self, event: RecognitionEvent) {
        self.shared.run(|shared, inner, events| {
            let was_listening = inner.resources.speech.is_listening();
            let recognized = inner.resources.speech.handle_recognition_event(event);
            shared.sync_listening(inner, was_listening, events);

            if let Some(recognized) = recognized {
                shared.dispatch(inner, recognized.command, events);
            }
        });
    }

    /// Feed a synthesis engine notification into the session
    pub fn handle_synthesis_event(&self, event: SynthesisEvent) {
        self.shared
            .run(|_, inner, _| inner.resources.speech.handle_synthesis_event(event));
    }

    /// Leave the cooking view
    ///
    /// Cancels all deferred callbacks, stops recognition and synthesis,
    /// releases the wake lock and runs the close callback. Every later call
    /// on this session is a no-op.
    pub fn close_view(&self) {
        let on_close = self.shared.run(|_, inner, events| {
            inner.closed = true;
            inner.resources.release();
            events.push(SessionEvent::Closed);
            tracing::info!("Cooking session closed");
            inner.on_close.take()
        });

        if let Some(callback) = on_close.flatten() {
            callback();
        }
    }
}

impl std::fmt::Debug for CookingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookingSession")
            .field("id", &self.shared.id)
            .finish()
    }
}

struct Shared {
    id: Uuid,
    span: tracing::Span,
    runtime: Handle,
    events: broadcast::Sender<SessionEvent>,
    inner: Mutex<Inner>,
}

struct Inner {
    session: Session,
    extractor: Box<dyn DurationExtractor>,
    resources: SessionResources,
    settings: SessionSettings,
    on_close: Option<CloseCallback>,
    closed: bool,
}

impl Inner {
    fn snapshot(&self) -> SessionSnapshot {
        let now = Instant::now();
        let speech = &self.resources.speech;
        SessionSnapshot {
            recipe: self.session.recipe().clone(),
            current_step: self.session.current_step(),
            show_ingredients: self.session.show_ingredients(),
            show_tips: self.session.show_tips(),
            active_command: self.session.active_command().cloned(),
            active_timer: self.session.active_timer().map(|t| t.snapshot(now)),
            is_listening: speech.is_listening(),
            is_speaking: speech.is_speaking(),
            transcript: speech.transcript().to_string(),
            is_wake_lock_active: self.resources.wake_lock.is_active(),
        }
    }

    fn timer_snapshot(&self) -> Option<TimerSnapshot> {
        self.session
            .active_timer()
            .map(|t| t.snapshot(Instant::now()))
    }
}

/// Resources tied to the session lifetime, released together exactly once
struct SessionResources {
    speech: SpeechIo,
    wake_lock: WakeLockGuard,
    tasks: DeferredTasks,
    released: bool,
}

impl SessionResources {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.tasks.cancel_all();
        self.speech.shutdown();
        self.wake_lock.release();
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!("Cooking session dropped without closing, releasing resources");
        }
        self.release();
    }
}

/// Deferred callback slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    TimerWatch,
    AutoRead,
    FeedbackClear,
}

struct Deferred {
    token: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct DeferredTasks {
    next_token: u64,
    timer_watch: Option<Deferred>,
    auto_read: Option<Deferred>,
    feedback_clear: Option<Deferred>,
}

impl DeferredTasks {
    fn slot(&mut self, kind: TaskKind) -> &mut Option<Deferred> {
        match kind {
            TaskKind::TimerWatch => &mut self.timer_watch,
            TaskKind::AutoRead => &mut self.auto_read,
            TaskKind::FeedbackClear => &mut self.feedback_clear,
        }
    }

    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn replace(&mut self, kind: TaskKind, deferred: Deferred) {
        if let Some(previous) = self.slot(kind).replace(deferred) {
            previous.handle.abort();
        }
    }

    fn cancel(&mut self, kind: TaskKind) {
        if let Some(previous) = self.slot(kind).take() {
            previous.handle.abort();
        }
    }

    /// Claim the slot for a firing task. False if the task was superseded.
    fn claim(&mut self, kind: TaskKind, token: u64) -> bool {
        let slot = self.slot(kind);
        if slot.as_ref().is_some_and(|d| d.token == token) {
            *slot = None;
            true
        } else {
            false
        }
    }

    fn cancel_all(&mut self) {
        for kind in [TaskKind::TimerWatch, TaskKind::AutoRead, TaskKind::FeedbackClear] {
            self.cancel(kind);
        }
    }
}

impl Shared {
    /// Run `op` under the session lock
    ///
    /// Overdue timers are settled before `op` runs. Returns `None` without
    /// running `op` once the session is closed.
    fn run<R>(
        self: &Arc<Self>,
        op: impl FnOnce(&Arc<Self>, &mut Inner, &mut Vec<SessionEvent>) -> R,
    ) -> Option<R> {
        let _entered = self.span.enter();
        let mut events = Vec::new();

        let result = {
            let mut inner = self.inner.lock();
            if inner.closed {
                tracing::debug!("Ignoring call on closed cooking session");
                return None;
            }
            self.settle_timer(&mut *inner, &mut events);
            op(self, &mut *inner, &mut events)
        };

        // Lock released before notifying the UI
        for event in events {
            let _ = self.events.send(event);
        }

        Some(result)
    }

    fn dispatch(
        self: &Arc<Self>,
        inner: &mut Inner,
        command: VoiceCommand,
        events: &mut Vec<SessionEvent>,
    ) {
        let effects = inner
            .session
            .dispatch(command, &*inner.extractor, Instant::now());
        self.apply_effects(inner, effects, events);
    }

    fn apply_effects(
        self: &Arc<Self>,
        inner: &mut Inner,
        effects: Vec<SessionEffect>,
        events: &mut Vec<SessionEvent>,
    ) {
        for effect in effects {
            match effect {
                SessionEffect::StepChanged(step) => {
                    tracing::info!("Moved to step {}", step + 1);
                    events.push(SessionEvent::StepChanged { step });
                    self.schedule_auto_read(inner);
                }
                SessionEffect::DrawersChanged => {
                    events.push(SessionEvent::DrawersChanged {
                        show_ingredients: inner.session.show_ingredients(),
                        show_tips: inner.session.show_tips(),
                    });
                }
                SessionEffect::TimerChanged => {
                    events.push(SessionEvent::TimerChanged {
                        timer: inner.timer_snapshot(),
                    });
                    self.sync_timer_watch(inner, events);
                }
                SessionEffect::FeedbackShown(feedback) => {
                    events.push(SessionEvent::CommandFeedback(feedback));
                    let at = Instant::now() + inner.settings.feedback_clear;
                    self.schedule(inner, TaskKind::FeedbackClear, at);
                }
                SessionEffect::Speak(text) => inner.resources.speech.speak(&text),
                SessionEffect::CancelSpeech => inner.resources.speech.cancel(),
            }
        }
    }

    /// Re-arm the timer watch for the current timer state
    fn sync_timer_watch(self: &Arc<Self>, inner: &mut Inner, events: &mut Vec<SessionEvent>) {
        inner.resources.tasks.cancel(TaskKind::TimerWatch);

        let Some(deadline) = inner.session.active_timer().and_then(|t| t.deadline()) else {
            return;
        };
        if deadline <= Instant::now() {
            self.settle_timer(inner, events);
        } else {
            self.schedule(inner, TaskKind::TimerWatch, deadline);
        }
    }

    /// Finish an overdue timer and announce it
    fn settle_timer(&self, inner: &mut Inner, events: &mut Vec<SessionEvent>) {
        let Some(label) = inner.session.check_timer(Instant::now()) else {
            return;
        };
        inner.resources.tasks.cancel(TaskKind::TimerWatch);

        let announcement = completion_announcement(&label);
        events.push(SessionEvent::TimerChanged {
            timer: inner.timer_snapshot(),
        });
        events.push(SessionEvent::TimerFinished {
            label,
            announcement: announcement.clone(),
        });

        if inner.settings.announce_timer_completion {
            inner.resources.speech.speak(&announcement);
        }
    }

    /// React to the recogniser switching on or off
    fn sync_listening(
        self: &Arc<Self>,
        inner: &mut Inner,
        was_listening: bool,
        events: &mut Vec<SessionEvent>,
    ) {
        let listening = inner.resources.speech.is_listening();
        if listening == was_listening {
            return;
        }

        events.push(SessionEvent::ListeningChanged { listening });
        if listening {
            self.schedule_auto_read(inner);
        } else {
            inner.resources.tasks.cancel(TaskKind::AutoRead);
        }
    }

    /// Debounced read-aloud of the current step while listening
    fn schedule_auto_read(self: &Arc<Self>, inner: &mut Inner) {
        if !inner.settings.auto_read_on_navigation || !inner.resources.speech.is_listening() {
            return;
        }
        let at = Instant::now() + inner.settings.auto_read_delay;
        self.schedule(inner, TaskKind::AutoRead, at);
    }

    /// Spawn a deferred callback for `kind` at `at`, replacing any pending one
    fn schedule(self: &Arc<Self>, inner: &mut Inner, kind: TaskKind, at: Instant) {
        let token = inner.resources.tasks.issue_token();
        let weak: Weak<Self> = Arc::downgrade(self);

        let handle = self.runtime.spawn(async move {
            tokio::time::sleep_until(at).await;
            if let Some(shared) = weak.upgrade() {
                shared.fire(kind, token);
            }
        });

        inner.resources.tasks.replace(kind, Deferred { token, handle });
    }

    fn fire(self: &Arc<Self>, kind: TaskKind, token: u64) {
        self.run(|_, inner, events| {
            if !inner.resources.tasks.claim(kind, token) {
                return;
            }

            match kind {
                // Expiry itself is handled by the timer settlement in `run`
                TaskKind::TimerWatch => {}
                TaskKind::AutoRead => {
                    if inner.resources.speech.is_listening() {
                        if let Some(text) = inner.session.current_instruction() {
                            let text = text.to_string();
                            inner.resources.speech.speak(&text);
                        }
                    }
                }
                TaskKind::FeedbackClear => {
                    if inner.session.clear_feedback() {
                        events.push(SessionEvent::FeedbackCleared);
                    }
                }
            }
        });
    }
}
