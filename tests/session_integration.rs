//! Cooking session integration tests.
//!
//! Drives a full session through recording fakes for the speech engines and
//! the wake lock, with tokio's paused clock standing in for real time.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

use sous_lib::config::{Config, SessionSettings};
use sous_lib::session::{
    CookingSession, SessionEvent, FIRST_STEP_MESSAGE, LAST_STEP_MESSAGE,
    NO_ACTIVE_TIMER_MESSAGE, NO_TIMER_FOUND_MESSAGE,
};
use sous_lib::timer::TimerPhase;
use sous_lib::voice::{
    RecognitionErrorKind, RecognitionEvent, SpeechError, SpeechRecognizer, SpeechSynthesizer,
    SynthesisEvent, Utterance, VoiceCommand,
};
use sous_lib::wake_lock::{WakeLock, WakeLockError};
use sous_lib::{Ingredient, Recipe};

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct Calls {
    recognition_language: Option<String>,
    spoken: Vec<Utterance>,
    synth_cancels: usize,
    recognizer_starts: usize,
    recognizer_stops: usize,
    recognizer_aborts: usize,
    wake_lock_releases: usize,
}

type Recorder = Arc<Mutex<Calls>>;

struct FakeRecognizer {
    calls: Recorder,
    deny: bool,
}

impl SpeechRecognizer for FakeRecognizer {
    fn set_language(&mut self, language: &str) {
        self.calls.lock().recognition_language = Some(language.to_string());
    }

    fn start(&mut self) -> Result<(), SpeechError> {
        self.calls.lock().recognizer_starts += 1;
        if self.deny {
            Err(SpeechError::NotAllowed)
        } else {
            Ok(())
        }
    }

    fn stop(&mut self) {
        self.calls.lock().recognizer_stops += 1;
    }

    fn abort(&mut self) {
        self.calls.lock().recognizer_aborts += 1;
    }
}

struct FakeSynthesizer {
    calls: Recorder,
}

impl SpeechSynthesizer for FakeSynthesizer {
    fn speak(&mut self, utterance: &Utterance) {
        self.calls.lock().spoken.push(utterance.clone());
    }

    fn cancel(&mut self) {
        self.calls.lock().synth_cancels += 1;
    }
}

struct FakeWakeLock {
    calls: Recorder,
}

impl WakeLock for FakeWakeLock {
    fn request(&mut self) -> Result<(), WakeLockError> {
        Ok(())
    }

    fn release(&mut self) {
        self.calls.lock().wake_lock_releases += 1;
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn recipe(steps: &[&str]) -> Recipe {
    Recipe::new(
        steps.iter().map(|s| s.to_string()).collect(),
        vec![
            Ingredient::new("flour", "2", "cups"),
            Ingredient::new("salt", "1", "tsp"),
        ],
    )
}

fn three_steps() -> Recipe {
    recipe(&["Boil water", "Add pasta", "Drain and serve"])
}

fn open(recipe: Recipe) -> (CookingSession, Recorder) {
    let calls = Recorder::default();
    let session = CookingSession::builder(recipe)
        .recognizer(FakeRecognizer {
            calls: calls.clone(),
            deny: false,
        })
        .synthesizer(FakeSynthesizer {
            calls: calls.clone(),
        })
        .wake_lock(FakeWakeLock {
            calls: calls.clone(),
        })
        .build()
        .expect("session should open inside a runtime");
    (session, calls)
}

fn spoken(calls: &Recorder) -> Vec<String> {
    calls.lock().spoken.iter().map(|u| u.text.clone()).collect()
}

fn say(session: &CookingSession, transcript: &str) {
    session.handle_recognition_event(RecognitionEvent::Result {
        transcript: transcript.to_string(),
        is_final: true,
    });
}

fn start_listening(session: &CookingSession) {
    session.toggle_listening();
    session.handle_recognition_event(RecognitionEvent::Started);
}

fn drain(events: &mut Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

async fn wait_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// =============================================================================
// Navigation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_voice_navigation_stops_at_last_step() {
    let (session, calls) = open(three_steps());

    say(&session, "next");
    say(&session, "Next step please");
    assert_eq!(session.state().current_step, 2);
    assert!(spoken(&calls).is_empty());

    say(&session, "next");
    assert_eq!(session.state().current_step, 2);
    assert_eq!(spoken(&calls), vec![LAST_STEP_MESSAGE]);
}

#[tokio::test(start_paused = true)]
async fn test_prev_step_at_first_step_speaks() {
    let (session, calls) = open(three_steps());

    assert!(!session.prev_step());
    say(&session, "go back");

    assert_eq!(session.state().current_step, 0);
    assert_eq!(spoken(&calls), vec![FIRST_STEP_MESSAGE]);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_closes_drawers() {
    let (session, _calls) = open(three_steps());
    session.set_show_ingredients(true);
    session.set_show_tips(true);
    let mut events = session.subscribe();

    say(&session, "next");

    let state = session.state();
    assert!(!state.show_ingredients);
    assert!(!state.show_tips);
    assert_eq!(
        drain(&mut events)[..2],
        [
            SessionEvent::DrawersChanged {
                show_ingredients: false,
                show_tips: false
            },
            SessionEvent::StepChanged { step: 1 },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_read_commands() {
    let (session, calls) = open(three_steps());

    say(&session, "what do I need");
    assert!(session.state().show_ingredients);
    assert_eq!(
        spoken(&calls),
        vec!["You need: 2 cups of flour. 1 tsp of salt"]
    );

    say(&session, "read it again");
    assert!(!session.state().show_ingredients);
    assert_eq!(spoken(&calls).last().unwrap(), "Boil water");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_and_interim_results_do_nothing() {
    let (session, calls) = open(three_steps());
    let mut events = session.subscribe();

    say(&session, "hmm");
    session.handle_recognition_event(RecognitionEvent::Result {
        transcript: "next".to_string(),
        is_final: false,
    });
    say(&session, "   ");

    let state = session.state();
    assert_eq!(state.current_step, 0);
    assert!(state.active_command.is_none());
    assert_eq!(state.transcript, "hmm");
    assert!(spoken(&calls).is_empty());
    assert!(drain(&mut events).is_empty());
}

// =============================================================================
// Smart timer
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_timer_finishes_exactly_once() {
    let (session, calls) = open(three_steps());
    let mut events = session.subscribe();

    session.start_smart_timer(5.0, "Pasta");
    wait_ms(4_999).await;
    assert_eq!(
        session.state().active_timer.unwrap().status,
        TimerPhase::Running
    );

    wait_ms(2).await;
    wait_ms(10_000).await;

    let timer = session.state().active_timer.unwrap();
    assert_eq!(timer.status, TimerPhase::Done);
    assert_eq!(timer.remaining_ms, 0);

    let announcements: Vec<String> = spoken(&calls)
        .into_iter()
        .filter(|text| text.contains("Pasta"))
        .collect();
    assert_eq!(announcements, vec!["Pasta timer finished"]);

    let finished = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::TimerFinished { .. }))
        .count();
    assert_eq!(finished, 1);
}

// Real clock: the blocked runtime thread keeps the expiry task from running,
// so only the check on the next call can notice the deadline.
#[tokio::test]
async fn test_overdue_timer_detected_on_next_call_after_stall() {
    let (session, calls) = open(three_steps());
    let mut events = session.subscribe();

    session.start_smart_timer(0.05, "Pasta");
    std::thread::sleep(Duration::from_millis(120));

    let timer = session.state().active_timer.unwrap();
    assert_eq!(timer.status, TimerPhase::Done);
    assert_eq!(spoken(&calls), vec!["Pasta timer finished"]);

    // The superseded expiry task must not announce again
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.state();
    assert_eq!(spoken(&calls).len(), 1);

    let finished = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::TimerFinished { .. }))
        .count();
    assert_eq!(finished, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cjk_label_gets_cjk_announcement_and_voice() {
    let (session, calls) = open(three_steps());

    session.start_smart_timer(1.0, "麵");
    wait_ms(1_001).await;

    let spoken = calls.lock().spoken.clone();
    assert_eq!(spoken.len(), 1);
    assert_eq!(spoken[0].text, "麵 時間到");
    assert_eq!(spoken[0].language, "zh-HK");
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_conserve_remaining_time() {
    let (session, calls) = open(three_steps());

    session.start_smart_timer(10.0, "Rice");
    wait_ms(4_000).await;
    session.toggle_timer();

    let timer = session.state().active_timer.unwrap();
    assert_eq!(timer.status, TimerPhase::Paused);
    assert_eq!(timer.remaining_ms, 6_000);

    // Paused timers never expire
    wait_ms(60_000).await;
    assert_eq!(session.state().active_timer.unwrap().remaining_ms, 6_000);
    assert!(spoken(&calls).is_empty());

    session.toggle_timer();
    wait_ms(5_999).await;
    assert_eq!(
        session.state().active_timer.unwrap().status,
        TimerPhase::Running
    );

    wait_ms(2).await;
    assert_eq!(
        session.state().active_timer.unwrap().status,
        TimerPhase::Done
    );
    assert_eq!(spoken(&calls), vec!["Rice timer finished"]);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_timer_lengths_are_ignored() {
    let (session, _calls) = open(three_steps());
    let mut events = session.subscribe();

    for seconds in [0.0, -5.0, f64::NAN, f64::INFINITY] {
        session.start_smart_timer(seconds, "x");
    }

    assert!(session.state().active_timer.is_none());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_voice_timer_from_step_text() {
    let (session, calls) = open(recipe(&["Simmer for 10 minutes", "Serve"]));

    assert_eq!(
        session.durations_in_current_step().map(|d| d.seconds),
        Some(600.0)
    );

    say(&session, "start timer");

    let timer = session.state().active_timer.unwrap();
    assert_eq!(timer.label, "10 minutes");
    assert_eq!(timer.total_seconds, 600.0);
    assert_eq!(spoken(&calls), vec!["Starting timer for 10 minutes"]);

    say(&session, "pause timer");
    assert_eq!(
        session.state().active_timer.unwrap().status,
        TimerPhase::Paused
    );

    say(&session, "resume timer");
    assert_eq!(
        session.state().active_timer.unwrap().status,
        TimerPhase::Running
    );

    say(&session, "cancel timer");
    assert!(session.state().active_timer.is_none());
    assert_eq!(spoken(&calls).last().unwrap(), "Timer stopped");

    say(&session, "stop timer");
    assert_eq!(spoken(&calls).last().unwrap(), NO_ACTIVE_TIMER_MESSAGE);

    // Stopping the timer cancels its expiry watch
    wait_ms(700_000).await;
    assert_eq!(spoken(&calls).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_voice_timer_without_duration() {
    let (session, calls) = open(recipe(&["Salt to taste"]));

    assert!(session.durations_in_current_step().is_none());
    say(&session, "set timer");

    assert!(session.state().active_timer.is_none());
    assert_eq!(spoken(&calls), vec![NO_TIMER_FOUND_MESSAGE]);
}

// =============================================================================
// Feedback and auto-read
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_feedback_clears_after_delay() {
    let (session, _calls) = open(three_steps());
    let mut events = session.subscribe();

    say(&session, "next");
    let feedback = session.state().active_command.unwrap();
    assert_eq!(feedback.command, VoiceCommand::NextStep);
    assert_eq!(feedback.label, "Next Step");

    wait_ms(999).await;
    assert!(session.state().active_command.is_some());

    wait_ms(2).await;
    assert!(session.state().active_command.is_none());
    assert_eq!(drain(&mut events).last(), Some(&SessionEvent::FeedbackCleared));
}

#[tokio::test(start_paused = true)]
async fn test_new_feedback_restarts_clear_delay() {
    let (session, _calls) = open(three_steps());

    say(&session, "next");
    wait_ms(600).await;
    say(&session, "hush");

    wait_ms(600).await;
    assert_eq!(session.state().active_command.unwrap().label, "Silence");

    wait_ms(401).await;
    assert!(session.state().active_command.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_auto_read_while_listening_is_debounced() {
    let (session, calls) = open(three_steps());

    start_listening(&session);
    assert!(session.state().is_listening);

    wait_ms(301).await;
    assert_eq!(spoken(&calls), vec!["Boil water"]);

    session.next_step();
    wait_ms(100).await;
    session.next_step();
    wait_ms(299).await;
    assert_eq!(spoken(&calls).len(), 1);

    wait_ms(2).await;
    assert_eq!(spoken(&calls), vec!["Boil water", "Drain and serve"]);
}

#[tokio::test(start_paused = true)]
async fn test_no_auto_read_when_not_listening() {
    let (session, calls) = open(three_steps());

    session.next_step();
    wait_ms(1_000).await;

    assert!(spoken(&calls).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_listening_cancels_pending_auto_read() {
    let (session, calls) = open(three_steps());
    start_listening(&session);
    wait_ms(301).await;

    session.next_step();
    session.toggle_listening();
    wait_ms(1_000).await;

    assert!(!session.state().is_listening);
    assert_eq!(spoken(&calls), vec!["Boil water"]);
}

#[tokio::test(start_paused = true)]
async fn test_speaking_ignores_events_from_replaced_utterance() {
    let (session, calls) = open(three_steps());

    session.speak("Boil water");
    session.speak("Add pasta");
    let (first, second) = {
        let calls = calls.lock();
        (calls.spoken[0].id, calls.spoken[1].id)
    };

    session.handle_synthesis_event(SynthesisEvent::Started {
        utterance_id: second,
    });
    session.handle_synthesis_event(SynthesisEvent::Ended {
        utterance_id: first,
    });
    assert!(session.state().is_speaking);

    session.handle_synthesis_event(SynthesisEvent::Ended {
        utterance_id: second,
    });
    assert!(!session.state().is_speaking);
}

#[tokio::test(start_paused = true)]
async fn test_silence_cancels_speech() {
    let (session, calls) = open(three_steps());
    say(&session, "read");
    let cancels = calls.lock().synth_cancels;

    say(&session, "quiet");

    assert_eq!(calls.lock().synth_cancels, cancels + 1);
    assert_eq!(spoken(&calls), vec!["Boil water"]);
}

// =============================================================================
// Recognition lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_recognition_restarts_until_permission_denied() {
    let (session, calls) = open(three_steps());
    let mut events = session.subscribe();

    start_listening(&session);
    assert_eq!(calls.lock().recognizer_starts, 1);

    // Engine times out on its own and is restarted
    session.handle_recognition_event(RecognitionEvent::Ended);
    assert_eq!(calls.lock().recognizer_starts, 2);
    assert!(session.state().is_listening);

    session.handle_recognition_event(RecognitionEvent::Error(RecognitionErrorKind::NoSpeech));
    assert!(session.state().is_listening);

    session.handle_recognition_event(RecognitionEvent::Error(RecognitionErrorKind::NotAllowed));
    session.handle_recognition_event(RecognitionEvent::Ended);

    assert!(!session.state().is_listening);
    assert_eq!(calls.lock().recognizer_starts, 2);
    assert_eq!(
        drain(&mut events),
        vec![
            SessionEvent::ListeningChanged { listening: true },
            SessionEvent::ListeningChanged { listening: false },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_recognition_language_comes_from_settings() {
    let calls = Recorder::default();
    let mut config = Config::default();
    config.speech.recognition_language = "zh-HK".to_string();

    let _session = CookingSession::builder(three_steps())
        .settings(SessionSettings::from(&config))
        .recognizer(FakeRecognizer {
            calls: calls.clone(),
            deny: false,
        })
        .build()
        .unwrap();

    assert_eq!(calls.lock().recognition_language.as_deref(), Some("zh-HK"));
}

#[tokio::test(start_paused = true)]
async fn test_user_stop_is_not_restarted() {
    let (session, calls) = open(three_steps());
    start_listening(&session);

    session.toggle_listening();
    session.handle_recognition_event(RecognitionEvent::Ended);

    assert!(!session.state().is_listening);
    assert_eq!(calls.lock().recognizer_starts, 1);
    assert_eq!(calls.lock().recognizer_stops, 1);
}

#[tokio::test(start_paused = true)]
async fn test_denied_start_leaves_session_usable() {
    let calls = Recorder::default();
    let session = CookingSession::builder(three_steps())
        .recognizer(FakeRecognizer {
            calls: calls.clone(),
            deny: true,
        })
        .build()
        .unwrap();

    session.toggle_listening();

    assert!(!session.state().is_listening);
    assert!(session.next_step());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_view_releases_everything() {
    let calls = Recorder::default();
    let closed = Arc::new(Mutex::new(0usize));
    let closed_count = closed.clone();
    let session = CookingSession::builder(three_steps())
        .recognizer(FakeRecognizer {
            calls: calls.clone(),
            deny: false,
        })
        .synthesizer(FakeSynthesizer {
            calls: calls.clone(),
        })
        .wake_lock(FakeWakeLock {
            calls: calls.clone(),
        })
        .on_close(move || *closed_count.lock() += 1)
        .build()
        .unwrap();
    let mut events = session.subscribe();

    assert!(session.state().is_wake_lock_active);
    start_listening(&session);
    session.start_smart_timer(5.0, "Pasta");
    say(&session, "next");
    drain(&mut events);

    session.close_view();
    session.close_view();

    assert!(session.is_closed());
    assert_eq!(*closed.lock(), 1);
    assert_eq!(drain(&mut events), vec![SessionEvent::Closed]);
    {
        let calls = calls.lock();
        assert_eq!(calls.recognizer_aborts, 1);
        assert_eq!(calls.wake_lock_releases, 1);
    }

    let spoken_at_close = spoken(&calls).len();
    wait_ms(10_000).await;

    // No timer announcement, auto-read or feedback clear after closing
    assert_eq!(spoken(&calls).len(), spoken_at_close);
    assert!(!session.next_step());
    say(&session, "next");

    let state = session.state();
    assert_eq!(state.current_step, 1);
    assert!(!state.is_listening);
    assert!(!state.is_wake_lock_active);
    assert_eq!(state.active_timer.unwrap().status, TimerPhase::Running);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_handle_releases_wake_lock() {
    let (session, calls) = open(three_steps());
    let other = session.clone();
    session.start_smart_timer(1.0, "Eggs");

    drop(session);
    assert_eq!(calls.lock().wake_lock_releases, 0);

    drop(other);
    assert_eq!(calls.lock().wake_lock_releases, 1);
    assert_eq!(calls.lock().recognizer_aborts, 1);

    wait_ms(2_000).await;
    assert!(spoken(&calls).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_session_without_speech_capabilities() {
    let session = CookingSession::builder(three_steps()).build().unwrap();

    session.toggle_listening();
    say(&session, "next");
    session.speak("hello");

    let state = session.state();
    assert_eq!(state.current_step, 1);
    assert!(!state.is_listening);
    assert!(!state.is_speaking);
    assert!(!state.is_wake_lock_active);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_serialises_for_ui() {
    let (session, _calls) = open(three_steps());
    session.start_smart_timer(90.0, "Sauce");

    let json = serde_json::to_value(session.state()).unwrap();

    assert_eq!(json["current_step"], 0);
    assert_eq!(json["recipe"]["instructions"][1], "Add pasta");
    assert_eq!(json["active_timer"]["status"], "running");
    assert_eq!(json["active_timer"]["remaining_ms"], 90_000);
    assert!(json.get("active_command").is_none());
}
